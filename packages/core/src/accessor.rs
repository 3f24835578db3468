//! Path-addressable access to a response body.
//!
//! [`JsonResult`] holds the full body text and a base path. The body is
//! parsed at most once, on the first extraction that needs it. A result
//! built from an error answers every extraction with that error.

use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Error, ProtocolError, ValidationError};
use crate::node::JsonNode;
use crate::path::{join_path, resolve};
use crate::schema::Validated;
use crate::validation::{text_of, CheckError, Rules, Validation};

/// Maps an extracted node to the value its tag is checked against.
pub type Transform = Arc<dyn Fn(&JsonNode) -> Value + Send + Sync>;

/// What to extract with [`JsonResult::get_data`].
///
/// `()` selects the whole body, a `&str`/`String` is a plain path, and
/// [`JsonKey::new`] starts a key that can carry a tag, a transform and a
/// validation setup.
#[derive(Clone, Default)]
pub struct JsonKey {
    path: String,
    tag: Option<String>,
    transform: Option<Transform>,
    validation: Option<Validation>,
}

impl JsonKey {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Check the extracted value against a validation tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Feed the tag check with `f(node)` instead of the node's string form.
    pub fn transform<F>(mut self, f: F) -> Self
    where
        F: Fn(&JsonNode) -> Value + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(f));
        self
    }

    pub fn validation(mut self, validation: Validation) -> Self {
        self.validation = Some(validation);
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Debug for JsonKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonKey")
            .field("path", &self.path)
            .field("tag", &self.tag)
            .field("transform", &self.transform.is_some())
            .field("validation", &self.validation)
            .finish()
    }
}

impl From<()> for JsonKey {
    fn from(_: ()) -> Self {
        JsonKey::default()
    }
}

impl From<&str> for JsonKey {
    fn from(path: &str) -> Self {
        JsonKey::new(path)
    }
}

impl From<String> for JsonKey {
    fn from(path: String) -> Self {
        JsonKey::new(path)
    }
}

impl From<&String> for JsonKey {
    fn from(path: &String) -> Self {
        JsonKey::new(path.as_str())
    }
}

/// A JSON view over a fully read response body.
pub struct JsonResult {
    body: Arc<str>,
    base_path: String,
    parsed: OnceLock<Result<Value, Arc<serde_json::Error>>>,
    err: Option<Error>,
}

impl fmt::Debug for JsonResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonResult")
            .field("base_path", &self.base_path)
            .field("body_len", &self.body.len())
            .field("err", &self.err)
            .finish()
    }
}

impl JsonResult {
    pub fn new(body: impl Into<Arc<str>>, base_path: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            base_path: base_path.into(),
            parsed: OnceLock::new(),
            err: None,
        }
    }

    /// A result that fails every extraction with `err`.
    pub fn from_error(err: Error) -> Self {
        Self {
            body: Arc::from(""),
            base_path: String::new(),
            parsed: OnceLock::new(),
            err: Some(err),
        }
    }

    pub fn err(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Extract the node at `base_path.key_path`.
    ///
    /// An empty joined path yields the whole body as a string node. When the
    /// key carries a tag, the transform output (or the node's string form)
    /// is checked against it before the node is returned.
    pub fn get_data(&self, key: impl Into<JsonKey>) -> Result<JsonNode, Error> {
        if let Some(err) = &self.err {
            return Err(err.clone());
        }
        let key = key.into();
        let full = join_path(&self.base_path, &key.path);
        let node = if full.is_empty() {
            JsonNode::from(Value::String(self.body.to_string()))
        } else {
            let root = self
                .root()
                .map_err(|e| ProtocolError::NotJson(e.to_string()))?;
            JsonNode::new(resolve(root, &full))
        };

        if let Some(tag) = key.tag.as_deref() {
            let rules = Rules::parse(tag)?;
            let input = match &key.transform {
                Some(f) => f(&node),
                None => Value::String(node.as_string()),
            };
            let fallback = Validation::default();
            let validation = key.validation.as_ref().unwrap_or(&fallback);
            match validation.resolved_validator().check(
                &input,
                &rules,
                validation.resolved_context(),
            ) {
                Ok(()) => {}
                Err(CheckError::Violated(message)) => {
                    return Err(ValidationError {
                        path: full,
                        field: None,
                        tag: tag.to_string(),
                        value: text_of(&input),
                        message,
                    }
                    .into())
                }
                Err(CheckError::UnknownRule(rule)) => {
                    return Err(ProtocolError::InvalidTag {
                        tag: tag.to_string(),
                        reason: format!("unknown rule `{rule}`"),
                    }
                    .into())
                }
            }
        }
        Ok(node)
    }

    /// Decode the subtree at `base_path.path` into `T`.
    ///
    /// Numbers keep their literal precision. A missing subtree decodes from
    /// `null`, and a string subtree holding a JSON object or array is decoded
    /// from its content.
    pub fn get_struct<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let (full, value) = self.subtree(path)?;
        serde_json::from_value(value).map_err(|e| Error::decode(full, e))
    }

    /// Decode like [`get_struct`](Self::get_struct), back-filling defaults
    /// before decoding and checking `T`'s schema afterwards.
    pub fn get_struct_validated<T: Validated>(
        &self,
        path: &str,
        validation: Option<&Validation>,
    ) -> Result<T, Error> {
        let (full, mut value) = self.subtree(path)?;
        let schema = T::schema();
        schema.apply_defaults(&mut value);
        let decoded: T =
            serde_json::from_value(value.clone()).map_err(|e| Error::decode(full.as_str(), e))?;
        let fallback = Validation::default();
        schema.validate(&full, &value, validation.unwrap_or(&fallback))?;
        Ok(decoded)
    }

    fn root(&self) -> Result<&Value, Arc<serde_json::Error>> {
        self.parsed
            .get_or_init(|| serde_json::from_str(&self.body).map_err(Arc::new))
            .as_ref()
            .map_err(Arc::clone)
    }

    fn subtree(&self, path: &str) -> Result<(String, Value), Error> {
        if let Some(err) = &self.err {
            return Err(err.clone());
        }
        let full = join_path(&self.base_path, path);
        let root = self.root().map_err(|source| Error::Decode {
            path: full.clone(),
            source,
        })?;
        let value = match resolve(root, &full) {
            Some(Value::String(s)) if looks_like_json(&s) => {
                serde_json::from_str(&s).map_err(|e| Error::decode(full.as_str(), e))?
            }
            Some(value) => value,
            None => Value::Null,
        };
        Ok((full, value))
    }
}

fn looks_like_json(s: &str) -> bool {
    matches!(s.trim_start().as_bytes().first(), Some(b'{' | b'['))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::LazyLock;

    #[derive(Debug, Deserialize)]
    struct A {
        #[serde(rename = "A")]
        a: String,
    }

    #[test]
    fn reads_plain_path_and_struct() {
        let res = JsonResult::new(r#"{"A":"11"}"#, "");
        assert_eq!(res.get_data("A").unwrap().as_string(), "11");
        let a: A = res.get_struct("").unwrap();
        assert_eq!(a.a, "11");
    }

    #[test]
    fn empty_key_yields_whole_body() {
        let res = JsonResult::new(r#"{"A":"11"}"#, "");
        assert_eq!(res.get_data(()).unwrap().as_string(), r#"{"A":"11"}"#);
    }

    #[test]
    fn base_path_prefixes_every_key() {
        let res = JsonResult::new(r#"{"data":{"list":[{"id":7}]}}"#, "data");
        assert_eq!(res.get_data("list.0.id").unwrap().as_i64(), 7);
        assert_eq!(res.get_data("list.#").unwrap().as_i64(), 1);
        assert!(!res.get_data("missing").unwrap().exists());
    }

    #[test]
    fn rich_key_validates_transformed_value() {
        let key = || {
            JsonKey::new("B")
                .transform(|n| json!(n.as_i64()))
                .tag("gte=0,lte=130")
        };
        let ok = JsonResult::new(r#"{"B":"11"}"#, "");
        assert_eq!(ok.get_data(key()).unwrap().as_i64(), 11);

        let bad = JsonResult::new(r#"{"B":"200"}"#, "");
        match bad.get_data(key()).unwrap_err() {
            Error::Validation(v) => {
                assert_eq!(v.path, "B");
                assert_eq!(v.tag, "gte=0,lte=130");
                assert_eq!(v.value, "200");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn untransformed_tag_checks_string_form() {
        let res = JsonResult::new(r#"{"mail":"sss@qq.com","n":""}"#, "");
        assert!(res.get_data(JsonKey::new("mail").tag("required,email")).is_ok());
        assert!(res.get_data(JsonKey::new("n").tag("required")).is_err());
    }

    #[test]
    fn malformed_tag_is_a_protocol_error() {
        let res = JsonResult::new(r#"{"B":1}"#, "");
        let err = res.get_data(JsonKey::new("B").tag("lte=abc")).unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::InvalidTag { .. })));
    }

    #[test]
    fn sticky_error_answers_every_extraction() {
        let res = JsonResult::from_error(Error::transport_msg("boom"));
        assert_eq!(res.get_data("A").unwrap_err().to_string(), "boom");
        assert_eq!(res.get_struct::<A>("").unwrap_err().to_string(), "boom");
        assert_eq!(res.err().map(Error::code), Some("transport"));
    }

    #[test]
    fn malformed_body_is_a_decode_error() {
        let res = JsonResult::new("<html>", "");
        assert!(matches!(res.get_struct::<A>(""), Err(Error::Decode { .. })));
        assert!(matches!(
            res.get_data("A"),
            Err(Error::Protocol(ProtocolError::NotJson(_)))
        ));
    }

    #[test]
    fn embedded_json_string_is_decoded() {
        let res = JsonResult::new(r#"{"payload":"{\"A\":\"x\"}"}"#, "");
        let a: A = res.get_struct("payload").unwrap();
        assert_eq!(a.a, "x");
    }

    #[test]
    fn struct_keeps_integer_precision() {
        #[derive(Deserialize)]
        struct Big {
            id: u64,
        }
        let res = JsonResult::new(r#"{"id":18446744073709551615}"#, "");
        assert_eq!(res.get_struct::<Big>("").unwrap().id, u64::MAX);
    }

    #[derive(Debug, Deserialize)]
    struct Person {
        name: String,
        age: i64,
        tags: Vec<String>,
    }

    static PERSON: LazyLock<Schema> = LazyLock::new(|| {
        Schema::builder()
            .field("name", "required")
            .field("age", "gte=0,lte=130")
            .defaulted::<Vec<String>>("tags", "")
            .build()
    });

    impl Validated for Person {
        fn schema() -> &'static Schema {
            &PERSON
        }
    }

    #[test]
    fn validated_struct_back_fills_and_checks() {
        let res = JsonResult::new(r#"{"data":{"name":"ann","age":30}}"#, "data");
        let p: Person = res.get_struct_validated("", None).unwrap();
        assert_eq!(p.name, "ann");
        assert_eq!(p.age, 30);
        assert!(p.tags.is_empty());

        let res = JsonResult::new(r#"{"data":{"name":"ann","age":300}}"#, "data");
        match res.get_struct_validated::<Person>("", None).unwrap_err() {
            Error::Validation(v) => assert_eq!(v.path, "data.age"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn validated_struct_reports_decode_before_validation() {
        let res = JsonResult::new(r#"{"name":"","age":"old"}"#, "");
        assert!(matches!(
            res.get_struct_validated::<Person>("", None),
            Err(Error::Decode { .. })
        ));
    }
}
