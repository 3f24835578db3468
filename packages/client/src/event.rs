//! Lifecycle callbacks of a partner call.
//!
//! A [`RestEvent`] sink observes one call from request start to its terminal
//! outcome. The sink is wrapped in an [`EventHandle`], which is shared by the
//! request body stream and the [`RestResult`](crate::RestResult) and fires
//! the terminal callback at most once.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use partnerlink::Error;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use tracing::{debug, warn};

use crate::api::CallContext;
use crate::config::EventFactory;

// ---------------------------------------------------------------------------
// RestEvent
// ---------------------------------------------------------------------------

/// Observer of one call. Every callback has a no-op default.
///
/// Callbacks run synchronously on whichever task drives the call (the
/// transport's body pump for `request_read`, the reading task otherwise) and
/// must not block.
pub trait RestEvent: Send {
    fn request_start(&mut self, _method: &Method, _url: &str) {}

    /// Bytes of the outbound body, once per physical read.
    fn request_read(&mut self, _chunk: &[u8]) {}

    fn response_header(&mut self, _status: StatusCode, _headers: &HeaderMap) {}

    /// Bytes of the inbound body, once per physical read.
    fn response_read(&mut self, _chunk: &[u8]) {}

    fn finish_error(&mut self, _err: &Error) {}

    fn finish_success(&mut self) {}
}

/// The sink used when a config registers no event factory.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEvent;

impl RestEvent for NoopEvent {}

/// Logs each lifecycle step through `tracing`.
#[derive(Debug, Default)]
pub struct TracingEvent {
    request_bytes: usize,
    response_bytes: usize,
}

impl TracingEvent {
    pub fn new() -> Self {
        Self::default()
    }

    /// An event factory producing a fresh `TracingEvent` per call.
    pub fn factory() -> EventFactory {
        Arc::new(|_: &CallContext| Box::new(TracingEvent::new()) as Box<dyn RestEvent>)
    }
}

impl RestEvent for TracingEvent {
    fn request_start(&mut self, method: &Method, url: &str) {
        // The query of a GET url carries the signature.
        let target = url.split('?').next().unwrap_or(url);
        debug!("partner event: {method} {target}");
    }

    fn request_read(&mut self, chunk: &[u8]) {
        self.request_bytes += chunk.len();
    }

    fn response_header(&mut self, status: StatusCode, _headers: &HeaderMap) {
        debug!("partner event: response status {status}");
    }

    fn response_read(&mut self, chunk: &[u8]) {
        self.response_bytes += chunk.len();
    }

    fn finish_error(&mut self, err: &Error) {
        warn!(
            sent = self.request_bytes,
            received = self.response_bytes,
            "partner event: call failed: {err}"
        );
    }

    fn finish_success(&mut self) {
        debug!(
            sent = self.request_bytes,
            received = self.response_bytes,
            "partner event: call finished"
        );
    }
}

// ---------------------------------------------------------------------------
// RecordingEvent
// ---------------------------------------------------------------------------

/// Everything observed during one call.
#[derive(Debug, Clone, Default)]
pub struct CallRecord {
    pub method: String,
    pub url: String,
    pub status: Option<StatusCode>,
    pub headers: HeaderMap,
    /// Outbound body bytes.
    pub request: Vec<u8>,
    /// Inbound body bytes, as far as they were read.
    pub response: Vec<u8>,
    /// `None` on success.
    pub error: Option<Error>,
}

type RecordLogger = Arc<dyn Fn(CallRecord) + Send + Sync>;

/// Accumulates a [`CallRecord`] and hands it to a logger when the call
/// finishes.
pub struct RecordingEvent {
    record: CallRecord,
    logger: RecordLogger,
}

impl fmt::Debug for RecordingEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingEvent")
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}

impl RecordingEvent {
    pub fn new<F>(logger: F) -> Self
    where
        F: Fn(CallRecord) + Send + Sync + 'static,
    {
        Self::with_logger(Arc::new(logger))
    }

    fn with_logger(logger: RecordLogger) -> Self {
        Self {
            record: CallRecord::default(),
            logger,
        }
    }

    /// An event factory whose per-call sinks all report to `logger`.
    pub fn factory<F>(logger: F) -> EventFactory
    where
        F: Fn(CallRecord) + Send + Sync + 'static,
    {
        let logger: RecordLogger = Arc::new(logger);
        Arc::new(move |_: &CallContext| {
            Box::new(RecordingEvent::with_logger(Arc::clone(&logger))) as Box<dyn RestEvent>
        })
    }

    fn emit(&mut self) {
        (self.logger)(std::mem::take(&mut self.record));
    }
}

impl RestEvent for RecordingEvent {
    fn request_start(&mut self, method: &Method, url: &str) {
        self.record.method = method.to_string();
        self.record.url = url.to_string();
    }

    fn request_read(&mut self, chunk: &[u8]) {
        self.record.request.extend_from_slice(chunk);
    }

    fn response_header(&mut self, status: StatusCode, headers: &HeaderMap) {
        self.record.status = Some(status);
        self.record.headers = headers.clone();
    }

    fn response_read(&mut self, chunk: &[u8]) {
        self.record.response.extend_from_slice(chunk);
    }

    fn finish_error(&mut self, err: &Error) {
        self.record.error = Some(err.clone());
        self.emit();
    }

    fn finish_success(&mut self) {
        self.emit();
    }
}

// ---------------------------------------------------------------------------
// EventHandle
// ---------------------------------------------------------------------------

struct EventState {
    sink: Box<dyn RestEvent>,
    finished: bool,
}

/// Shared handle to the sink of one call.
///
/// Clones refer to the same sink. Only the first [`finish`](Self::finish)
/// reaches the sink; later ones are ignored.
#[derive(Clone)]
pub struct EventHandle {
    state: Arc<Mutex<EventState>>,
}

impl fmt::Debug for EventHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandle")
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl EventHandle {
    pub fn new(sink: Box<dyn RestEvent>) -> Self {
        Self {
            state: Arc::new(Mutex::new(EventState {
                sink,
                finished: false,
            })),
        }
    }

    pub fn noop() -> Self {
        Self::new(Box::new(NoopEvent))
    }

    fn lock(&self) -> MutexGuard<'_, EventState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn request_start(&self, method: &Method, url: &str) {
        self.lock().sink.request_start(method, url);
    }

    pub fn request_read(&self, chunk: &[u8]) {
        self.lock().sink.request_read(chunk);
    }

    pub fn response_header(&self, status: StatusCode, headers: &HeaderMap) {
        self.lock().sink.response_header(status, headers);
    }

    pub fn response_read(&self, chunk: &[u8]) {
        self.lock().sink.response_read(chunk);
    }

    /// Fire the terminal callback. Returns `false` when it had already fired.
    pub fn finish(&self, outcome: Result<(), &Error>) -> bool {
        let mut state = self.lock();
        if state.finished {
            return false;
        }
        state.finished = true;
        match outcome {
            Ok(()) => state.sink.finish_success(),
            Err(err) => state.sink.finish_error(err),
        }
        true
    }

    pub fn is_finished(&self) -> bool {
        self.lock().finished
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
