//! [`JsonNode`]: a read-only view of one JSON subtree.
//!
//! Conversions are lenient: a missing node reads as `""`, `0` or `false`
//! rather than failing, and strings holding numbers convert to numbers. Use
//! [`JsonNode::value`] when the distinction between "missing" and "zero"
//! matters.

use std::fmt;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::path;
use crate::schema::JsonDefault;

/// A subtree extracted from a response body, or a missing value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonNode {
    value: Option<Value>,
}

impl JsonNode {
    pub fn new(value: Option<Value>) -> Self {
        Self { value }
    }

    pub fn missing() -> Self {
        Self { value: None }
    }

    /// `true` when the path resolved to a value (including JSON `null`).
    pub fn exists(&self) -> bool {
        self.value.is_some()
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn into_value(self) -> Option<Value> {
        self.value
    }

    /// String form: strings raw, numbers as their literal text, booleans as
    /// `true`/`false`, objects and arrays as compact JSON, and `""` for
    /// `null` or missing.
    pub fn as_string(&self) -> String {
        match &self.value {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            Some(other) => other.to_string(),
        }
    }

    /// Raw JSON text of the node; empty when missing.
    pub fn raw(&self) -> String {
        self.value.as_ref().map(Value::to_string).unwrap_or_default()
    }

    pub fn as_i64(&self) -> i64 {
        match &self.value {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .unwrap_or(0),
            Some(Value::String(s)) => parse_i64(s),
            Some(Value::Bool(b)) => i64::from(*b),
            _ => 0,
        }
    }

    pub fn as_u64(&self) -> u64 {
        match &self.value {
            Some(Value::Number(n)) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
                .unwrap_or(0),
            Some(Value::String(s)) => {
                let s = s.trim();
                s.parse::<u64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().filter(|f| *f >= 0.0).map(|f| f as u64))
                    .unwrap_or(0)
            }
            Some(Value::Bool(b)) => u64::from(*b),
            _ => 0,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match &self.value {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
            Some(Value::Bool(b)) => f64::from(u8::from(*b)),
            _ => 0.0,
        }
    }

    pub fn as_bool(&self) -> bool {
        match &self.value {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
            Some(Value::String(s)) => {
                matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "t")
            }
            _ => false,
        }
    }

    /// Resolve a sub path below this node.
    pub fn get(&self, sub_path: &str) -> JsonNode {
        match &self.value {
            Some(v) => JsonNode::new(path::resolve(v, sub_path)),
            None => JsonNode::missing(),
        }
    }

    /// Elements of an array node. A scalar yields itself as the only element;
    /// `null` and missing yield nothing.
    pub fn array(&self) -> Vec<JsonNode> {
        match &self.value {
            Some(Value::Array(items)) => items.iter().cloned().map(JsonNode::from).collect(),
            None | Some(Value::Null) => Vec::new(),
            Some(other) => vec![JsonNode::from(other.clone())],
        }
    }
}

fn parse_i64(s: &str) -> i64 {
    let s = s.trim();
    s.parse::<i64>()
        .ok()
        .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
        .unwrap_or(0)
}

impl From<Value> for JsonNode {
    fn from(value: Value) -> Self {
        Self { value: Some(value) }
    }
}

impl fmt::Display for JsonNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

/// Struct fields typed as `JsonNode` capture whatever JSON sits at the field.
impl<'de> Deserialize<'de> for JsonNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(JsonNode::from)
    }
}

/// A missing `JsonNode` field is back-filled with JSON `null`.
impl JsonDefault for JsonNode {
    fn json_default() -> Value {
        Value::Null
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_forms() {
        assert_eq!(JsonNode::from(json!("11")).as_string(), "11");
        assert_eq!(JsonNode::from(json!(12.5)).as_string(), "12.5");
        assert_eq!(JsonNode::from(json!(true)).as_string(), "true");
        assert_eq!(JsonNode::from(json!({"a": 1})).as_string(), r#"{"a":1}"#);
        assert_eq!(JsonNode::from(Value::Null).as_string(), "");
        assert_eq!(JsonNode::missing().as_string(), "");
    }

    #[test]
    fn lenient_numbers() {
        assert_eq!(JsonNode::from(json!("11")).as_i64(), 11);
        assert_eq!(JsonNode::from(json!("7.9")).as_i64(), 7);
        assert_eq!(JsonNode::from(json!(-3)).as_i64(), -3);
        assert_eq!(JsonNode::from(json!("abc")).as_i64(), 0);
        assert_eq!(JsonNode::missing().as_i64(), 0);
        assert_eq!(JsonNode::from(json!("2.5")).as_f64(), 2.5);
        assert_eq!(JsonNode::from(json!("-1")).as_u64(), 0);
    }

    #[test]
    fn large_integers_keep_precision() {
        let node: JsonNode = serde_json::from_str("9007199254740993").unwrap();
        assert_eq!(node.as_string(), "9007199254740993");
        assert_eq!(node.as_i64(), 9_007_199_254_740_993);
    }

    #[test]
    fn bools() {
        assert!(JsonNode::from(json!("true")).as_bool());
        assert!(JsonNode::from(json!(1)).as_bool());
        assert!(!JsonNode::from(json!("no")).as_bool());
    }

    #[test]
    fn nested_get_and_array() {
        let node = JsonNode::from(json!({"list": [1, "two"]}));
        assert_eq!(node.get("list.1").as_string(), "two");
        assert_eq!(node.get("list").array().len(), 2);
        assert!(!node.get("nope").exists());
        assert!(node.get("nope").array().is_empty());
    }
}
