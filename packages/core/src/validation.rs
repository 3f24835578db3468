use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::Value;

use crate::error::ProtocolError;

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// One rule of a validation tag.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    Required,
    /// Skip the remaining rules when the value is empty.
    OmitEmpty,
    Gte(f64),
    Lte(f64),
    Gt(f64),
    Lt(f64),
    /// Exact size: numeric value, character count or element count.
    Len(f64),
    Eq(String),
    Ne(String),
    OneOf(Vec<String>),
    Email,
    Url,
    Numeric,
    Alpha,
    Alphanum,
    Uuid,
    /// A rule resolved against the [`Validator`]'s custom rules at check time.
    Custom { name: String, param: Option<String> },
}

/// A parsed validation tag such as `"required,gte=0,lte=130"`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rules {
    tag: String,
    rules: Vec<Rule>,
}

impl Rules {
    /// Parse a comma-separated tag of `rule` or `rule=param` items.
    ///
    /// `min`/`max` are accepted as aliases of `gte`/`lte`.
    pub fn parse(tag: &str) -> Result<Self, ProtocolError> {
        let mut rules = Vec::new();
        for item in tag.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (name, param) = match item.split_once('=') {
                Some((n, p)) => (n.trim(), Some(p.trim())),
                None => (item, None),
            };
            let bound = || -> Result<f64, ProtocolError> {
                let raw = param.ok_or_else(|| invalid(tag, format!("rule `{name}` needs a parameter")))?;
                raw.parse::<f64>()
                    .map_err(|_| invalid(tag, format!("rule `{name}` expects a number, got {raw:?}")))
            };
            let text = || -> Result<String, ProtocolError> {
                param
                    .map(str::to_string)
                    .ok_or_else(|| invalid(tag, format!("rule `{name}` needs a parameter")))
            };
            let rule = match name {
                "required" => Rule::Required,
                "omitempty" => Rule::OmitEmpty,
                "gte" | "min" => Rule::Gte(bound()?),
                "lte" | "max" => Rule::Lte(bound()?),
                "gt" => Rule::Gt(bound()?),
                "lt" => Rule::Lt(bound()?),
                "len" => Rule::Len(bound()?),
                "eq" => Rule::Eq(text()?),
                "ne" => Rule::Ne(text()?),
                "oneof" => Rule::OneOf(text()?.split_whitespace().map(str::to_string).collect()),
                "email" => Rule::Email,
                "url" => Rule::Url,
                "numeric" => Rule::Numeric,
                "alpha" => Rule::Alpha,
                "alphanum" => Rule::Alphanum,
                "uuid" => Rule::Uuid,
                "" => return Err(invalid(tag, "empty rule name")),
                custom => Rule::Custom {
                    name: custom.to_string(),
                    param: param.map(str::to_string),
                },
            };
            rules.push(rule);
        }
        Ok(Self {
            tag: tag.to_string(),
            rules,
        })
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn invalid(tag: &str, reason: impl Into<String>) -> ProtocolError {
    ProtocolError::InvalidTag {
        tag: tag.to_string(),
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// Context and validator
// ---------------------------------------------------------------------------

/// Caller-supplied values made available to custom rules.
#[derive(Debug, Clone, Default)]
pub struct ValidationContext {
    values: HashMap<String, Value>,
}

impl ValidationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }
}

/// Signature of a custom rule: `(value, param, context) -> passes`.
pub type CustomRule = dyn Fn(&Value, Option<&str>, Option<&ValidationContext>) -> bool + Send + Sync;

/// Why a value did not pass its rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckError {
    /// The value broke a rule; the message names which.
    Violated(String),
    /// The tag names a rule this validator does not know.
    UnknownRule(String),
}

/// Checks values against parsed [`Rules`], with optional custom rules.
#[derive(Clone, Default)]
pub struct Validator {
    custom: HashMap<String, Arc<CustomRule>>,
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("custom", &self.custom.keys().collect::<Vec<_>>())
            .finish()
    }
}

static DEFAULT_VALIDATOR: LazyLock<Validator> = LazyLock::new(Validator::default);

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared validator with only the built-in rules.
    pub fn builtin() -> &'static Validator {
        &DEFAULT_VALIDATOR
    }

    /// Register a custom rule under `name`, replacing any previous one.
    pub fn with_rule<F>(mut self, name: impl Into<String>, rule: F) -> Self
    where
        F: Fn(&Value, Option<&str>, Option<&ValidationContext>) -> bool + Send + Sync + 'static,
    {
        self.custom.insert(name.into(), Arc::new(rule));
        self
    }

    /// Check `value` against every rule in order, stopping at the first
    /// failure.
    pub fn check(
        &self,
        value: &Value,
        rules: &Rules,
        ctx: Option<&ValidationContext>,
    ) -> Result<(), CheckError> {
        for rule in rules.rules() {
            match rule {
                Rule::OmitEmpty if is_empty(value) => return Ok(()),
                Rule::OmitEmpty => {}
                Rule::Required => {
                    if is_empty(value) {
                        return Err(CheckError::Violated("value is required".into()));
                    }
                }
                Rule::Gte(b) => compare(value, *b, "at least", |m, b| m >= b)?,
                Rule::Lte(b) => compare(value, *b, "at most", |m, b| m <= b)?,
                Rule::Gt(b) => compare(value, *b, "greater than", |m, b| m > b)?,
                Rule::Lt(b) => compare(value, *b, "less than", |m, b| m < b)?,
                Rule::Len(b) => compare(value, *b, "exactly", |m, b| m == b)?,
                Rule::Eq(p) => {
                    if !equals(value, p) {
                        return Err(CheckError::Violated(format!("must equal {p}")));
                    }
                }
                Rule::Ne(p) => {
                    if equals(value, p) {
                        return Err(CheckError::Violated(format!("must not equal {p}")));
                    }
                }
                Rule::OneOf(options) => {
                    let text = text_of(value);
                    if !options.iter().any(|o| *o == text) {
                        return Err(CheckError::Violated(format!(
                            "must be one of [{}]",
                            options.join(" ")
                        )));
                    }
                }
                Rule::Email => matches_re(value, &EMAIL_RE, "a valid email address")?,
                Rule::Url => matches_re(value, &URL_RE, "a valid URL")?,
                Rule::Numeric => matches_re(value, &NUMERIC_RE, "numeric")?,
                Rule::Alpha => matches_re(value, &ALPHA_RE, "alphabetic")?,
                Rule::Alphanum => matches_re(value, &ALPHANUM_RE, "alphanumeric")?,
                Rule::Uuid => {
                    if uuid::Uuid::parse_str(&text_of(value)).is_err() {
                        return Err(CheckError::Violated("must be a valid UUID".into()));
                    }
                }
                Rule::Custom { name, param } => {
                    let custom = self
                        .custom
                        .get(name)
                        .ok_or_else(|| CheckError::UnknownRule(name.clone()))?;
                    if !custom(value, param.as_deref(), ctx) {
                        return Err(CheckError::Violated(format!("failed rule `{name}`")));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Which validator and context to use for a check. Both fall back to the
/// built-in validator and no context.
#[derive(Debug, Clone, Default)]
pub struct Validation {
    validator: Option<Arc<Validator>>,
    context: Option<ValidationContext>,
}

impl Validation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validator(mut self, validator: Arc<Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn context(mut self, context: ValidationContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn resolved_validator(&self) -> &Validator {
        self.validator.as_deref().unwrap_or_else(|| Validator::builtin())
    }

    pub fn resolved_context(&self) -> Option<&ValidationContext> {
        self.context.as_ref()
    }
}

// --- helpers -----------------------------------------------------------------

/// Zero values count as empty: `null`, `""`, `0`, `false`, `[]`, `{}`.
pub(crate) fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::Bool(b) => !b,
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Render a value for messages and text rules: strings unquoted.
pub(crate) fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Numbers measure by value, strings by character count, arrays and objects
/// by element count.
fn measure(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => Some(s.chars().count() as f64),
        Value::Array(a) => Some(a.len() as f64),
        Value::Object(o) => Some(o.len() as f64),
        Value::Bool(_) | Value::Null => None,
    }
}

fn compare(
    value: &Value,
    bound: f64,
    relation: &str,
    ok: impl Fn(f64, f64) -> bool,
) -> Result<(), CheckError> {
    let m = measure(value)
        .ok_or_else(|| CheckError::Violated(format!("value cannot be compared with {bound}")))?;
    if ok(m, bound) {
        return Ok(());
    }
    let what = match value {
        Value::Number(_) => "must be",
        Value::String(_) => "length must be",
        _ => "size must be",
    };
    Err(CheckError::Violated(format!("{what} {relation} {bound}")))
}

fn equals(value: &Value, param: &str) -> bool {
    match value {
        Value::Number(n) => match (n.as_f64(), param.parse::<f64>()) {
            (Some(a), Ok(b)) => a == b,
            _ => n.to_string() == param,
        },
        Value::Array(a) => param.parse::<usize>().is_ok_and(|n| a.len() == n),
        other => text_of(other) == param,
    }
}

fn matches_re(value: &Value, re: &Regex, what: &str) -> Result<(), CheckError> {
    match value {
        Value::String(s) if re.is_match(s) => Ok(()),
        Value::Number(n) if re.is_match(&n.to_string()) => Ok(()),
        _ => Err(CheckError::Violated(format!("must be {what}"))),
    }
}

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
        .expect("invalid email regex")
});

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://\S+$").expect("invalid url regex"));

static NUMERIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-+]?[0-9]+(\.[0-9]+)?$").expect("invalid numeric regex"));

static ALPHA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]+$").expect("invalid alpha regex"));

static ALPHANUM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]+$").expect("invalid alphanum regex"));

// --- tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn check(value: Value, tag: &str) -> Result<(), CheckError> {
        Validator::builtin().check(&value, &Rules::parse(tag).unwrap(), None)
    }

    #[test]
    fn parses_rules_with_params() {
        let rules = Rules::parse("required, gte=0,lte=130").unwrap();
        assert_eq!(rules.rules(), &[Rule::Required, Rule::Gte(0.0), Rule::Lte(130.0)]);
        assert_eq!(rules.tag(), "required, gte=0,lte=130");
    }

    #[test]
    fn non_numeric_bound_is_an_invalid_tag() {
        assert!(matches!(
            Rules::parse("gte=ten"),
            Err(ProtocolError::InvalidTag { .. })
        ));
        assert!(matches!(Rules::parse("lte"), Err(ProtocolError::InvalidTag { .. })));
    }

    #[test]
    fn numeric_range() {
        assert_eq!(check(json!(11), "gte=0,lte=130"), Ok(()));
        assert!(matches!(check(json!(200), "gte=0,lte=130"), Err(CheckError::Violated(_))));
        assert!(matches!(check(json!(-1), "gte=0"), Err(CheckError::Violated(_))));
    }

    #[test]
    fn string_size_counts_characters() {
        assert_eq!(check(json!("héllo"), "len=5"), Ok(()));
        assert!(check(json!("abc"), "min=4").is_err());
        assert_eq!(check(json!("abc"), "max=3"), Ok(()));
    }

    #[test]
    fn required_rejects_zero_values() {
        assert!(check(json!(""), "required").is_err());
        assert!(check(json!(0), "required").is_err());
        assert!(check(Value::Null, "required").is_err());
        assert_eq!(check(json!("x"), "required"), Ok(()));
    }

    #[test]
    fn omitempty_skips_remaining_rules() {
        assert_eq!(check(json!(""), "omitempty,email"), Ok(()));
        assert!(check(json!("nope"), "omitempty,email").is_err());
    }

    #[test]
    fn formats() {
        assert_eq!(check(json!("sss@qq.com"), "required,email"), Ok(()));
        assert_eq!(check(json!("https://example.com/x"), "url"), Ok(()));
        assert_eq!(check(json!("-12.5"), "numeric"), Ok(()));
        assert!(check(json!("12a"), "numeric").is_err());
        assert_eq!(check(json!("abcXYZ"), "alpha"), Ok(()));
        assert_eq!(check(json!("abc123"), "alphanum"), Ok(()));
        assert_eq!(check(json!("550e8400-e29b-41d4-a716-446655440000"), "uuid"), Ok(()));
    }

    #[test]
    fn eq_ne_oneof() {
        assert_eq!(check(json!("200"), "eq=200"), Ok(()));
        assert_eq!(check(json!(200), "eq=200"), Ok(()));
        assert!(check(json!("500"), "eq=200").is_err());
        assert!(check(json!("x"), "ne=x").is_err());
        assert_eq!(check(json!("red"), "oneof=red green"), Ok(()));
        assert!(check(json!("blue"), "oneof=red green").is_err());
    }

    #[test]
    fn custom_rule_sees_param_and_context() {
        let validator = Validator::new().with_rule("prefix", |v, param, ctx| {
            let expected = ctx
                .and_then(|c| c.get("tenant"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            text_of(v).starts_with(&format!("{expected}{}", param.unwrap_or("")))
        });
        let rules = Rules::parse("prefix=-").unwrap();
        let ctx = ValidationContext::new().with("tenant", "acme");
        assert_eq!(validator.check(&json!("acme-1"), &rules, Some(&ctx)), Ok(()));
        assert!(validator.check(&json!("other-1"), &rules, Some(&ctx)).is_err());
    }

    #[test]
    fn unknown_custom_rule_is_reported() {
        assert_eq!(
            check(json!("x"), "shiny"),
            Err(CheckError::UnknownRule("shiny".into()))
        );
    }
}
