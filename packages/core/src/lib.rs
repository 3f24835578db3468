//! Core of the partner app protocol client.
//!
//! This crate holds the pure logic of a partner call: the signing scheme,
//! the form encoding it depends on, and the JSON access, decoding and
//! validation layer used to read responses. It performs no I/O; the
//! `partnerlink-client` crate builds the HTTP client on top of it.
//!
//! # Crate layout
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`signing`] | Canonical parameter sets and MD5 request signatures |
//! | [`encoding`] | Query-escape form encoding and URL query appending |
//! | [`path`] | Dot-separated JSON path resolution |
//! | [`node`] | [`JsonNode`], a lenient view of one JSON subtree |
//! | [`validation`] | Tag parsing ([`Rules`]) and checking ([`Validator`]) |
//! | [`schema`] | Per-type field schemas for validated struct decoding |
//! | [`accessor`] | [`JsonResult`]: `get_data`, `get_struct`, `get_struct_validated` |
//! | [`envelope`] | The `result_response` success check |
//! | [`error`] | The shared [`Error`] taxonomy |
//!
//! # Quick start
//!
//! ```rust
//! use partnerlink::{AppParams, JsonKey, JsonResult};
//!
//! let params = AppParams::new("hjx", "detail", "2024-01-02 03:04:05", r#"{"id":"111"}"#, None);
//! assert_eq!(params.canonical().sign("secret").len(), 32);
//!
//! let res = JsonResult::new(r#"{"data":{"age":"42"}}"#, "data");
//! let age = res
//!     .get_data(JsonKey::new("age").transform(|n| n.as_i64().into()).tag("gte=0,lte=130"))
//!     .unwrap();
//! assert_eq!(age.as_i64(), 42);
//! ```

pub mod accessor;
pub mod encoding;
pub mod envelope;
pub mod error;
pub mod node;
pub mod path;
pub mod schema;
pub mod signing;
pub mod validation;

/// Abstract identifier of one remote operation within an Api.
pub type CallKey = u32;

pub use accessor::{JsonKey, JsonResult, Transform};
pub use envelope::check_envelope;
pub use error::{BoxError, Error, ProtocolError, ValidationError};
pub use node::JsonNode;
pub use schema::{JsonDefault, Schema, SchemaBuilder, Validated};
pub use signing::{sign, AppParams, CanonicalParams};
pub use validation::{Rules, Validation, ValidationContext, Validator};
