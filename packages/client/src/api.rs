//! Collaborator capabilities: the Api an embedder implements, the call
//! descriptors it hands out, and the per-call context.

use std::collections::HashMap;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use async_trait::async_trait;
use partnerlink::{check_envelope, CallKey, Error};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::client::RestClient;
use crate::result::RestResult;

// ---------------------------------------------------------------------------
// CallContext
// ---------------------------------------------------------------------------

/// Ambient context of one call: a cancellation token and a string bag the
/// Api can consult to pick its config or token.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancel: CancellationToken,
    values: HashMap<String, String>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the call when `token` is cancelled.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

// ---------------------------------------------------------------------------
// CallerInfo
// ---------------------------------------------------------------------------

/// Source location of the code that started a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerInfo {
    pub file: &'static str,
    pub line: u32,
    pub column: u32,
}

impl CallerInfo {
    #[track_caller]
    pub fn capture() -> Self {
        let location = Location::caller();
        Self {
            file: location.file(),
            line: location.line(),
            column: location.column(),
        }
    }
}

impl fmt::Display for CallerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// A call payload, serialised to JSON when the request is built.
pub struct Payload {
    encode: Box<dyn Fn() -> serde_json::Result<String> + Send + Sync>,
}

impl Payload {
    pub fn new<P>(payload: P) -> Self
    where
        P: Serialize + Send + Sync + 'static,
    {
        Self {
            encode: Box::new(move || serde_json::to_string(&payload)),
        }
    }

    pub fn to_json(&self) -> Result<String, Error> {
        (self.encode)().map_err(Error::marshal)
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Payload")
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// A family of remote operations against one named service config.
///
/// Both the config name and the descriptor map are asked for on every call,
/// so either may depend on the context.
pub trait RestApi: Send + Sync {
    fn config_name(&self, ctx: &CallContext) -> Result<String, Error>;

    fn calls(&self, ctx: &CallContext) -> Result<HashMap<CallKey, Arc<dyn RestBuild>>, Error>;

    /// Auth token added to the signed parameters when `Some`.
    fn token(&self, _ctx: &CallContext) -> Result<Option<String>, Error> {
        Ok(None)
    }
}

/// A call descriptor: knows how to build, sign and dispatch one operation.
#[async_trait]
pub trait RestBuild: Send + Sync {
    /// Run the call. Failures are returned as a [`RestResult`] carrying the
    /// error, never as a panic.
    async fn build_request(
        &self,
        ctx: &CallContext,
        client: &RestClient,
        payload: &Payload,
        caller: &CallerInfo,
    ) -> RestResult;

    /// Business-status check applied to the body before JSON extraction.
    fn checker(&self) -> Option<Arc<dyn CheckResult>> {
        None
    }
}

/// Translates a failure embedded in a response body into an error.
pub trait CheckResult: Send + Sync {
    fn check(&self, body: &str) -> Result<(), Error>;
}

/// The `result_response.code == "200"` convention of the app protocol.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvelopeCheck;

impl CheckResult for EnvelopeCheck {
    fn check(&self, body: &str) -> Result<(), Error> {
        check_envelope(body)
    }
}
