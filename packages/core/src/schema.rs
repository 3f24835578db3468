//! Field schemas for validated struct decoding.
//!
//! A [`Schema`] lists the JSON fields of a target type together with their
//! parsed validation rules, an optional default provider and an optional
//! nested schema. Types opt in by implementing [`Validated`], usually by
//! building their schema once in a `LazyLock` static:
//!
//! ```
//! use std::sync::LazyLock;
//! use partnerlink::schema::{Schema, Validated};
//!
//! #[derive(serde::Deserialize)]
//! struct Person {
//!     name: String,
//!     tags: Vec<String>,
//! }
//!
//! static PERSON: LazyLock<Schema> = LazyLock::new(|| {
//!     Schema::builder()
//!         .field("name", "required")
//!         .defaulted::<Vec<String>>("tags", "")
//!         .build()
//! });
//!
//! impl Validated for Person {
//!     fn schema() -> &'static Schema {
//!         &PERSON
//!     }
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{Error, ProtocolError, ValidationError};
use crate::path::join_path;
use crate::validation::{text_of, CheckError, Rules, Validation};

/// Per-type default used to back-fill a field that is missing or `null`.
pub trait JsonDefault {
    fn json_default() -> Value;
}

impl<T> JsonDefault for Vec<T> {
    fn json_default() -> Value {
        Value::Array(Vec::new())
    }
}

impl<K, V, S> JsonDefault for HashMap<K, V, S> {
    fn json_default() -> Value {
        Value::Object(Map::new())
    }
}

impl<K, V> JsonDefault for BTreeMap<K, V> {
    fn json_default() -> Value {
        Value::Object(Map::new())
    }
}

impl<T: JsonDefault> JsonDefault for Option<T> {
    fn json_default() -> Value {
        T::json_default()
    }
}

/// A type that can be decoded and then checked against a [`Schema`].
pub trait Validated: DeserializeOwned {
    fn schema() -> &'static Schema;
}

/// Produces the value a field's rules are checked against, from the field
/// name and the decoded field value.
pub type ConvertHook = dyn Fn(&str, &Value) -> Value + Send + Sync;

/// One declared field of a [`Schema`].
pub struct FieldSpec {
    name: String,
    rules: Rules,
    default: Option<fn() -> Value>,
    nested: Option<fn() -> &'static Schema>,
}

impl FieldSpec {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }
}

impl fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSpec")
            .field("name", &self.name)
            .field("tag", &self.rules.tag())
            .field("default", &self.default.is_some())
            .field("nested", &self.nested.is_some())
            .finish()
    }
}

/// The declared fields of a validated type.
///
/// A schema whose tags failed to parse still builds; the parse error is
/// kept and reported by every [`Schema::validate`] call.
pub struct Schema {
    fields: Vec<FieldSpec>,
    convert: Option<Arc<ConvertHook>>,
    error: Option<ProtocolError>,
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("fields", &self.fields)
            .field("convert", &self.convert.is_some())
            .field("error", &self.error)
            .finish()
    }
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// The first tag parse error met while building, if any.
    pub fn error(&self) -> Option<&ProtocolError> {
        self.error.as_ref()
    }

    /// Fill fields that are missing or `null` from their default providers,
    /// descending into nested schemas. Non-object values are left alone.
    pub fn apply_defaults(&self, value: &mut Value) {
        let Value::Object(map) = value else {
            return;
        };
        for field in &self.fields {
            if let Some(default) = field.default {
                let slot = map.entry(field.name.clone()).or_insert(Value::Null);
                if slot.is_null() {
                    *slot = default();
                }
            }
            if let (Some(nested), Some(child)) = (field.nested, map.get_mut(&field.name)) {
                let schema = nested();
                match child {
                    Value::Array(items) => items.iter_mut().for_each(|i| schema.apply_defaults(i)),
                    other => schema.apply_defaults(other),
                }
            }
        }
    }

    /// Check every field of `value` in declaration order, stopping at the
    /// first failure. `path` is the JSON path of `value` and prefixes the
    /// path reported in errors.
    pub fn validate(&self, path: &str, value: &Value, validation: &Validation) -> Result<(), Error> {
        if let Some(err) = &self.error {
            return Err(err.clone().into());
        }
        let validator = validation.resolved_validator();
        let ctx = validation.resolved_context();
        for field in &self.fields {
            let field_path = join_path(path, &field.name);
            let raw = value.get(&field.name).unwrap_or(&Value::Null);
            if !field.rules.is_empty() {
                let converted;
                let input = match &self.convert {
                    Some(hook) => {
                        converted = hook(&field.name, raw);
                        &converted
                    }
                    None => raw,
                };
                match validator.check(input, &field.rules, ctx) {
                    Ok(()) => {}
                    Err(CheckError::Violated(message)) => {
                        return Err(ValidationError {
                            path: field_path,
                            field: Some(field.name.clone()),
                            tag: field.rules.tag().to_string(),
                            value: text_of(input),
                            message,
                        }
                        .into())
                    }
                    Err(CheckError::UnknownRule(rule)) => {
                        return Err(ProtocolError::InvalidTag {
                            tag: field.rules.tag().to_string(),
                            reason: format!("unknown rule `{rule}`"),
                        }
                        .into())
                    }
                }
            }
            if let Some(nested) = field.nested {
                let schema = nested();
                match raw {
                    Value::Array(items) => {
                        for (i, item) in items.iter().enumerate() {
                            schema.validate(&join_path(&field_path, &i.to_string()), item, validation)?;
                        }
                    }
                    Value::Object(_) => schema.validate(&field_path, raw, validation)?,
                    _ => {}
                }
            }
        }
        Ok(())
    }
}

/// Builder for [`Schema`].
#[derive(Default)]
pub struct SchemaBuilder {
    fields: Vec<FieldSpec>,
    convert: Option<Arc<ConvertHook>>,
    error: Option<ProtocolError>,
}

impl SchemaBuilder {
    /// Declare a field checked against `tag`. An empty tag declares the field
    /// without rules.
    pub fn field(self, name: &str, tag: &str) -> Self {
        self.push(name, tag, None, None)
    }

    /// Declare a field back-filled from `T`'s [`JsonDefault`] when missing or
    /// `null`.
    pub fn defaulted<T: JsonDefault>(self, name: &str, tag: &str) -> Self {
        self.push(name, tag, Some(T::json_default), None)
    }

    /// Declare a field holding a `T` (or an array of `T`) whose own schema
    /// is applied below it.
    pub fn nested<T: Validated>(self, name: &str, tag: &str) -> Self {
        self.push(name, tag, None, Some(T::schema))
    }

    /// Route every field through `hook` before its rules are checked.
    pub fn convert_with<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &Value) -> Value + Send + Sync + 'static,
    {
        self.convert = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> Schema {
        Schema {
            fields: self.fields,
            convert: self.convert,
            error: self.error,
        }
    }

    fn push(
        mut self,
        name: &str,
        tag: &str,
        default: Option<fn() -> Value>,
        nested: Option<fn() -> &'static Schema>,
    ) -> Self {
        let rules = match Rules::parse(tag) {
            Ok(rules) => rules,
            Err(err) => {
                self.error.get_or_insert(err);
                Rules::default()
            }
        };
        self.fields.push(FieldSpec {
            name: name.to_string(),
            rules,
            default,
            nested,
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::Validator;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::LazyLock;

    #[derive(Debug, Deserialize)]
    #[allow(dead_code)]
    struct Item {
        sku: String,
    }

    static ITEM: LazyLock<Schema> =
        LazyLock::new(|| Schema::builder().field("sku", "required,len=4").build());

    impl Validated for Item {
        fn schema() -> &'static Schema {
            &ITEM
        }
    }

    fn order_schema() -> Schema {
        Schema::builder()
            .field("id", "required")
            .defaulted::<Vec<String>>("notes", "")
            .defaulted::<Option<HashMap<String, String>>>("extra", "")
            .nested::<Item>("items", "min=1")
            .build()
    }

    #[test]
    fn defaults_fill_missing_and_null_fields() {
        let mut value = json!({"id": "1", "notes": null});
        order_schema().apply_defaults(&mut value);
        assert_eq!(value["notes"], json!([]));
        assert_eq!(value["extra"], json!({}));
    }

    #[test]
    fn present_fields_keep_their_values() {
        let mut value = json!({"id": "1", "notes": ["a"]});
        order_schema().apply_defaults(&mut value);
        assert_eq!(value["notes"], json!(["a"]));
    }

    #[test]
    fn first_failing_field_is_reported() {
        let value = json!({"id": "", "items": []});
        let err = order_schema()
            .validate("data", &value, &Validation::default())
            .unwrap_err();
        match err {
            Error::Validation(v) => {
                assert_eq!(v.path, "data.id");
                assert_eq!(v.field.as_deref(), Some("id"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn nested_elements_are_validated_with_index_paths() {
        let value = json!({"id": "1", "items": [{"sku": "ABCD"}, {"sku": "X"}]});
        let err = order_schema()
            .validate("", &value, &Validation::default())
            .unwrap_err();
        match err {
            Error::Validation(v) => assert_eq!(v.path, "items.1.sku"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn conversion_hook_feeds_every_field() {
        let schema = Schema::builder()
            .field("age", "gte=0,lte=130")
            .field("name", "len=3")
            .convert_with(|name, value| match name {
                "age" => json!(text_of(value).parse::<i64>().unwrap_or(-1)),
                _ => json!(text_of(value).to_uppercase()),
            })
            .build();
        let ok = json!({"age": "42", "name": "bob"});
        assert!(schema.validate("", &ok, &Validation::default()).is_ok());
        let bad = json!({"age": "200", "name": "bob"});
        assert!(schema.validate("", &bad, &Validation::default()).is_err());
    }

    #[test]
    fn malformed_tag_is_kept_and_reported() {
        let schema = Schema::builder().field("a", "gte=x").build();
        assert!(schema.error().is_some());
        let err = schema
            .validate("", &json!({"a": 1}), &Validation::default())
            .unwrap_err();
        assert_eq!(err.code(), "21");
    }

    #[test]
    fn custom_validator_is_used() {
        let validator = Arc::new(Validator::new().with_rule("even", |v, _, _| {
            v.as_i64().is_some_and(|n| n % 2 == 0)
        }));
        let schema = Schema::builder().field("n", "even").build();
        let validation = Validation::new().validator(validator);
        assert!(schema.validate("", &json!({"n": 4}), &validation).is_ok());
        assert!(schema.validate("", &json!({"n": 3}), &validation).is_err());
        // Without the custom rule registered the tag is unknown.
        assert_eq!(
            schema
                .validate("", &json!({"n": 4}), &Validation::default())
                .unwrap_err()
                .code(),
            "21"
        );
    }
}
