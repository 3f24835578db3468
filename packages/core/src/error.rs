//! Error taxonomy shared by every layer of a partner call.
//!
//! [`Error`] is `Clone` so that a result reader can record it once and hand
//! the same value back from every later operation. Sources that are not
//! themselves clonable (`serde_json::Error`, transport errors) are held
//! behind an [`Arc`].

use std::sync::Arc;

use thiserror::Error;

use crate::CallKey;

/// A shared, type-erased error from the transport layer.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// The terminal error of a partner call, or of any read/extraction on its
/// result.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Network failure, timeout or cancellation. The message of the
    /// underlying error is surfaced verbatim.
    #[error("{0}")]
    Transport(BoxError),

    /// The call payload could not be serialised to JSON.
    #[error("failed to marshal call payload: {0}")]
    Marshal(Arc<serde_json::Error>),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The remote service answered, but declared a failure in its envelope.
    #[error("partner service returned failure (code {code:?}): {message}")]
    Business { code: String, message: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The body (or the subtree at `path`) could not be decoded into the
    /// requested type.
    #[error("failed to decode JSON at path {path:?}: {source}")]
    Decode {
        path: String,
        source: Arc<serde_json::Error>,
    },
}

impl Error {
    /// Wrap any transport-level error.
    pub fn transport<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Transport(Arc::new(err))
    }

    /// A transport error built from a plain message (timeouts, cancellation).
    pub fn transport_msg(msg: impl Into<String>) -> Self {
        Error::Transport(Arc::new(TransportMessage(msg.into())))
    }

    pub fn marshal(err: serde_json::Error) -> Self {
        Error::Marshal(Arc::new(err))
    }

    pub fn decode(path: impl Into<String>, err: serde_json::Error) -> Self {
        Error::Decode {
            path: path.into(),
            source: Arc::new(err),
        }
    }

    /// Short machine-readable code.
    ///
    /// Protocol and validation errors keep the numeric codes used on the
    /// wire by earlier clients; business errors report the code the remote
    /// service sent.
    pub fn code(&self) -> &str {
        match self {
            Error::Transport(_) => "transport",
            Error::Marshal(_) => "marshal",
            Error::Protocol(e) => e.code(),
            Error::Business { code, .. } => code,
            Error::Validation(_) => ValidationError::CODE,
            Error::Decode { .. } => "decode",
        }
    }
}

#[derive(Debug)]
struct TransportMessage(String);

impl std::fmt::Display for TransportMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for TransportMessage {}

// ---------------------------------------------------------------------------
// ProtocolError
// ---------------------------------------------------------------------------

/// Structured client-side protocol failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("no service config registered under {0:?}")]
    ConfigNotFound(String),

    #[error("no call descriptor bound to call key {0}")]
    CallNotFound(CallKey),

    #[error("request reader is empty")]
    EmptyReader,

    /// A business check was requested on a result that carries no
    /// descriptor checker.
    #[error("result has no call descriptor with a response check bound")]
    NoDescriptor,

    #[error("service config {name:?} is incomplete: {reason}")]
    InvalidConfig { name: String, reason: String },

    #[error("response body is not valid JSON: {0}")]
    NotJson(String),

    #[error("invalid validation tag {tag:?}: {reason}")]
    InvalidTag { tag: String, reason: String },
}

impl ProtocolError {
    pub fn code(&self) -> &'static str {
        match self {
            ProtocolError::ConfigNotFound(_) => "1",
            ProtocolError::CallNotFound(_) => "2",
            ProtocolError::EmptyReader => "10",
            ProtocolError::InvalidConfig { .. } => "11",
            ProtocolError::NoDescriptor => "11",
            ProtocolError::NotJson(_) => "12",
            ProtocolError::InvalidTag { .. } => "21",
        }
    }
}

// ---------------------------------------------------------------------------
// ValidationError
// ---------------------------------------------------------------------------

/// A value failed the rules of its validation tag.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error(
    "path:{path} field:{} tag:{tag} value:{value} error:{message}",
    .field.as_deref().unwrap_or("-")
)]
pub struct ValidationError {
    /// Fully joined JSON path of the checked value.
    pub path: String,
    /// Struct field name, when the check came from a schema.
    pub field: Option<String>,
    pub tag: String,
    /// The checked value, rendered as text.
    pub value: String,
    pub message: String,
}

impl ValidationError {
    pub const CODE: &'static str = "20";
}
