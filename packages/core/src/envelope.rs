//! The response envelope of the partner app protocol.
//!
//! A successful body carries `{"result_response": {"code": "200", ...}}`.
//! Any other code is a business failure described by `result_response.msg`.

use serde_json::Value;

use crate::error::{Error, ProtocolError};
use crate::node::JsonNode;
use crate::path::resolve;

pub const CODE_PATH: &str = "result_response.code";
pub const MESSAGE_PATH: &str = "result_response.msg";
pub const SUCCESS_CODE: &str = "200";

/// Check a raw body against the envelope convention.
///
/// The code may be sent as a string or a number.
pub fn check_envelope(body: &str) -> Result<(), Error> {
    let root: Value =
        serde_json::from_str(body).map_err(|e| ProtocolError::NotJson(e.to_string()))?;
    let code = JsonNode::new(resolve(&root, CODE_PATH)).as_string();
    if code == SUCCESS_CODE {
        return Ok(());
    }
    Err(Error::Business {
        code,
        message: JsonNode::new(resolve(&root, MESSAGE_PATH)).as_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_code_passes() {
        assert!(check_envelope(r#"{"result_response":{"code":"200","msg":"ok"}}"#).is_ok());
        assert!(check_envelope(r#"{"result_response":{"code":200}}"#).is_ok());
    }

    #[test]
    fn other_codes_are_business_failures() {
        let err = check_envelope(r#"{"result_response":{"code":"500","msg":"sold out"}}"#)
            .unwrap_err();
        match &err {
            Error::Business { code, message } => {
                assert_eq!(code, "500");
                assert_eq!(message, "sold out");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(err.code(), "500");
    }

    #[test]
    fn missing_envelope_is_a_failure() {
        let err = check_envelope(r#"{"data":1}"#).unwrap_err();
        assert!(matches!(err, Error::Business { ref code, .. } if code.is_empty()));
    }

    #[test]
    fn non_json_body_is_a_protocol_error() {
        let err = check_envelope("gateway timeout").unwrap_err();
        assert_eq!(err.code(), "12");
    }
}
