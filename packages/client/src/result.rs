//! [`RestResult`]: the lazy reader over one call's response.
//!
//! A result is built in one of three ways:
//!
//! - [`RestResult::from_response`] wraps a live response whose body has not
//!   been read yet. Reads pull chunks from the connection and report them to
//!   the event sink; end of data or a read error fires the terminal event.
//! - [`RestResult::from_body`] serves a body the caller already holds. The
//!   terminal event fires at construction.
//! - [`RestResult::from_error`] records a failed round trip. The terminal
//!   error event fires at construction.
//!
//! Once a result has recorded an error, every later read or extraction
//! returns that error without further I/O. Dropping a result whose terminal
//! event has not fired yet fires it then.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use partnerlink::path::join_path;
use partnerlink::{Error, JsonKey, JsonNode, JsonResult, ProtocolError, Validated, Validation};
use reqwest::header::HeaderMap;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::api::CheckResult;
use crate::event::EventHandle;

enum Source {
    Live { response: Response, pending: Bytes },
    Buffered { offset: usize },
    Drained,
}

pub struct RestResult {
    event: EventHandle,
    checker: Option<Arc<dyn CheckResult>>,
    base_path: String,
    status: Option<StatusCode>,
    headers: Option<HeaderMap>,
    source: Source,
    body: Option<Arc<str>>,
    checked: bool,
    err: Option<Error>,
}

impl fmt::Debug for RestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match &self.source {
            Source::Live { .. } => "live",
            Source::Buffered { .. } => "buffered",
            Source::Drained => "drained",
        };
        f.debug_struct("RestResult")
            .field("source", &source)
            .field("base_path", &self.base_path)
            .field("status", &self.status)
            .field("checker", &self.checker.is_some())
            .field("err", &self.err)
            .finish()
    }
}

impl RestResult {
    fn with_source(source: Source, event: EventHandle) -> Self {
        Self {
            event,
            checker: None,
            base_path: String::new(),
            status: None,
            headers: None,
            source,
            body: None,
            checked: false,
            err: None,
        }
    }

    /// A failed round trip. Fires the terminal error event now.
    pub fn from_error(err: Error, event: EventHandle) -> Self {
        event.finish(Err(&err));
        let mut result = Self::with_source(Source::Drained, event);
        result.err = Some(err);
        result
    }

    /// A result over a body that has already been read in full. Fires the
    /// terminal success event now.
    pub fn from_body(
        body: impl Into<Arc<str>>,
        base_path: impl Into<String>,
        checker: Option<Arc<dyn CheckResult>>,
        event: EventHandle,
    ) -> Self {
        event.finish(Ok(()));
        let mut result = Self::with_source(Source::Buffered { offset: 0 }, event);
        result.body = Some(body.into());
        result.base_path = base_path.into();
        result.checker = checker;
        result
    }

    /// A result over a live response. Fires the response-header event now.
    pub fn from_response(
        response: Response,
        base_path: impl Into<String>,
        checker: Option<Arc<dyn CheckResult>>,
        event: EventHandle,
    ) -> Self {
        event.response_header(response.status(), response.headers());
        let status = response.status();
        let headers = response.headers().clone();
        let mut result = Self::with_source(
            Source::Live {
                response,
                pending: Bytes::new(),
            },
            event,
        );
        result.status = Some(status);
        result.headers = Some(headers);
        result.base_path = base_path.into();
        result.checker = checker;
        result
    }

    /// The sticky error, if one was recorded.
    pub fn err(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn headers(&self) -> Option<&HeaderMap> {
        self.headers.as_ref()
    }

    /// Path every JSON extraction on this result is rooted at.
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Read up to `buf.len()` bytes of the body. Returns `0` at end of data.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        if let Some(err) = &self.err {
            return Err(err.clone());
        }
        if buf.is_empty() {
            return Ok(0);
        }
        if let Source::Buffered { offset } = &mut self.source {
            let bytes = self.body.as_deref().unwrap_or_default().as_bytes();
            let rest = &bytes[(*offset).min(bytes.len())..];
            let n = rest.len().min(buf.len());
            buf[..n].copy_from_slice(&rest[..n]);
            *offset += n;
            return Ok(n);
        }
        let Some(mut chunk) = self.next_chunk().await? else {
            return Ok(0);
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        let rest = chunk.split_off(n);
        if let Source::Live { pending, .. } = &mut self.source {
            *pending = rest;
        }
        Ok(n)
    }

    /// Drain the body and return it as text.
    ///
    /// The first call reads whatever is left of the stream; its text is kept
    /// and every later call returns it without touching the stream again.
    /// Bytes already consumed through [`read`](Self::read) on a live
    /// response are not part of the text.
    ///
    /// The conversion to text is lossy: invalid UTF-8 sequences are replaced
    /// with `U+FFFD`. Use [`read`](Self::read) or the event sink's
    /// `response_read` callback to see the raw bytes.
    pub async fn read_all(&mut self) -> Result<Arc<str>, Error> {
        if let Some(err) = &self.err {
            return Err(err.clone());
        }
        if let Some(body) = &self.body {
            return Ok(Arc::clone(body));
        }
        let mut out = Vec::new();
        while let Some(chunk) = self.next_chunk().await? {
            out.extend_from_slice(&chunk);
        }
        let body: Arc<str> = Arc::from(String::from_utf8_lossy(&out));
        self.body = Some(Arc::clone(&body));
        Ok(body)
    }

    /// Run the descriptor's business check on the body.
    ///
    /// Fails with [`ProtocolError::NoDescriptor`] when no checker is bound.
    /// A failing check becomes the sticky error.
    pub async fn business_check(&mut self) -> Result<(), Error> {
        if self.checker.is_none() {
            if let Some(err) = &self.err {
                return Err(err.clone());
            }
            return Err(ProtocolError::NoDescriptor.into());
        }
        self.checked_body().await.map(|_| ())
    }

    /// Drain the body, apply the business check if a checker is bound, and
    /// return an accessor rooted at `base_path.path`.
    pub async fn json_result(&mut self, path: &str) -> JsonResult {
        match self.checked_body().await {
            Ok(body) => JsonResult::new(body, join_path(&self.base_path, path)),
            Err(err) => JsonResult::from_error(err),
        }
    }

    pub async fn get_data(&mut self, key: impl Into<JsonKey>) -> Result<JsonNode, Error> {
        self.json_result("").await.get_data(key)
    }

    pub async fn get_struct<T: DeserializeOwned>(&mut self, path: &str) -> Result<T, Error> {
        self.json_result("").await.get_struct(path)
    }

    pub async fn get_struct_validated<T: Validated>(
        &mut self,
        path: &str,
        validation: Option<&Validation>,
    ) -> Result<T, Error> {
        self.json_result("")
            .await
            .get_struct_validated(path, validation)
    }

    async fn checked_body(&mut self) -> Result<Arc<str>, Error> {
        let body = self.read_all().await?;
        if !self.checked {
            if let Some(checker) = &self.checker {
                if let Err(err) = checker.check(&body) {
                    self.record(err.clone());
                    return Err(err);
                }
            }
            self.checked = true;
        }
        Ok(body)
    }

    /// Pull the next chunk of a live body: the pending remainder first, then
    /// the connection.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, Error> {
        let polled = match &mut self.source {
            Source::Live { response, pending } => {
                if !pending.is_empty() {
                    return Ok(Some(std::mem::take(pending)));
                }
                response.chunk().await
            }
            Source::Buffered { .. } | Source::Drained => return Ok(None),
        };
        match polled {
            Ok(Some(chunk)) => {
                self.event.response_read(&chunk);
                Ok(Some(chunk))
            }
            Ok(None) => {
                self.source = Source::Drained;
                self.event.finish(Ok(()));
                Ok(None)
            }
            Err(e) => {
                let err = Error::transport(e);
                self.record(err.clone());
                Err(err)
            }
        }
    }

    fn record(&mut self, err: Error) {
        self.source = Source::Drained;
        self.event.finish(Err(&err));
        self.err = Some(err);
    }
}

impl Drop for RestResult {
    fn drop(&mut self) {
        match &self.err {
            Some(err) => self.event.finish(Err(err)),
            None => self.event.finish(Ok(())),
        };
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
