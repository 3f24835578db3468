//! Request signing for the partner app protocol.
//!
//! The signature is computed over the canonical parameter set: keys sorted by
//! byte value, form-encoded as `key=value` joined by `&`, with the shared
//! secret appended, then MD5-digested and rendered as lowercase hex. The
//! counter-party recomputes exactly this string, so neither the ordering,
//! the escaping nor the digest may change.

use std::collections::BTreeMap;

use chrono::Local;
use md5::{Digest, Md5};

use crate::encoding::encode_pairs;

/// Protocol version sent in every request.
pub const PROTOCOL_VERSION: &str = "1.0";

/// `chrono` format of the `timestamp` parameter (local time).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const APP_KEY: &str = "app_key";
pub const METHOD: &str = "method";
pub const VERSION: &str = "version";
pub const TIMESTAMP: &str = "timestamp";
pub const CONTENT: &str = "content";
pub const TOKEN: &str = "token";
pub const SIGN: &str = "sign";

/// A uniquely keyed parameter map that iterates in sorted key order.
///
/// Insertion order never matters: two sets holding the same pairs encode
/// and sign identically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalParams {
    params: BTreeMap<String, String>,
}

impl CanonicalParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a parameter.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Form-encode the set in sorted key order.
    pub fn encode(&self) -> String {
        encode_pairs(self.iter())
    }

    /// Compute the signature of this set under `secret`.
    pub fn sign(&self, secret: &str) -> String {
        sign(self, secret)
    }

    /// Return the on-wire parameter string: this set plus its `sign`
    /// parameter, encoded in sorted key order.
    pub fn signed_encoding(&self, secret: &str) -> String {
        let mut wire = self.clone();
        wire.insert(SIGN, self.sign(secret));
        wire.encode()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CanonicalParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = CanonicalParams::new();
        for (k, v) in iter {
            set.insert(k, v);
        }
        set
    }
}

/// Sign a canonical parameter set.
///
/// Returns the 32-character lowercase hex MD5 of
/// `encode(params) + secret`.
pub fn sign(params: &CanonicalParams, secret: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(params.encode().as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// The inputs of one app-protocol request, before signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppParams {
    pub app_key: String,
    /// Logical method name of the remote operation.
    pub method: String,
    /// Local time formatted with [`TIMESTAMP_FORMAT`].
    pub timestamp: String,
    /// JSON-encoded call payload.
    pub content: String,
    pub token: Option<String>,
}

impl AppParams {
    pub fn new(
        app_key: impl Into<String>,
        method: impl Into<String>,
        timestamp: impl Into<String>,
        content: impl Into<String>,
        token: Option<String>,
    ) -> Self {
        Self {
            app_key: app_key.into(),
            method: method.into(),
            timestamp: timestamp.into(),
            content: content.into(),
            token,
        }
    }

    /// Build the canonical set: `app_key`, `method`, `version`,
    /// `timestamp`, `content`, and `token` when present.
    pub fn canonical(&self) -> CanonicalParams {
        let mut set = CanonicalParams::new();
        set.insert(APP_KEY, self.app_key.as_str());
        set.insert(METHOD, self.method.as_str());
        set.insert(VERSION, PROTOCOL_VERSION);
        set.insert(TIMESTAMP, self.timestamp.as_str());
        set.insert(CONTENT, self.content.as_str());
        if let Some(token) = &self.token {
            set.insert(TOKEN, token.as_str());
        }
        set
    }
}

/// Current local time in the protocol's timestamp format.
pub fn timestamp_now() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
