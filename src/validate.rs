//! Declarative payload validation.
//!
//! A [`Schema`] is a list of [`Field`] specifications. The same schema value
//! drives request validation and the generated OpenAPI document, so the two
//! cannot drift apart.
//!
//! ```rust
//! use roster::validate::{Field, Mode, Schema};
//!
//! let schema = Schema::new("Pet", vec![
//!     Field::integer("id").read_only(),
//!     Field::string("name").required().min_length(1).max_length(50),
//!     Field::integer("age").nullable().min(0.0),
//! ]).unwrap();
//!
//! let clean = schema.check(&serde_json::json!({ "name": "Rex" }), Mode::Full).unwrap();
//! assert_eq!(clean["name"], "Rex");
//! ```
//!
//! Validation is pure: it never touches a store and reports every violated
//! field, not just the first one.

use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern compiles")
});

// ── Field specification ───────────────────────────────────────────────────────

/// The JSON type a field accepts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    /// A string restricted to the listed variants.
    Enum(&'static [&'static str]),
    /// RFC 3339 timestamp. Only ever server-assigned, so always read-only.
    Timestamp,
}

impl FieldType {
    fn expected(self) -> &'static str {
        match self {
            Self::String | Self::Enum(_) | Self::Timestamp => "must be a string",
            Self::Integer => "must be an integer",
            Self::Number  => "must be a number",
            Self::Boolean => "must be a boolean",
        }
    }

    fn is_textual(self) -> bool {
        matches!(self, Self::String)
    }

    fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Number)
    }
}

/// A constraint applied after the type check passes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Constraint {
    MinLength(usize),
    MaxLength(usize),
    Min(f64),
    Max(f64),
    Email,
}

impl Constraint {
    fn check(self, value: &Value) -> Result<(), String> {
        match (self, value) {
            (Self::MinLength(1), Value::String(s)) if s.is_empty() => {
                Err("must not be empty".to_owned())
            }
            (Self::MinLength(n), Value::String(s)) if s.chars().count() < n => {
                Err(format!("must be at least {n} characters"))
            }
            (Self::MaxLength(n), Value::String(s)) if s.chars().count() > n => {
                Err(format!("must be at most {n} characters"))
            }
            (Self::Min(min), Value::Number(n)) if n.as_f64().is_some_and(|v| v < min) => {
                Err(format!("must be greater than or equal to {min}"))
            }
            (Self::Max(max), Value::Number(n)) if n.as_f64().is_some_and(|v| v > max) => {
                Err(format!("must be less than or equal to {max}"))
            }
            (Self::Email, Value::String(s)) if !EMAIL.is_match(s) => {
                Err("must be a valid email address".to_owned())
            }
            _ => Ok(()),
        }
    }
}

/// Declarative description of one payload field.
#[derive(Clone, Debug)]
pub struct Field {
    name: &'static str,
    ty: FieldType,
    required: bool,
    nullable: bool,
    read_only: bool,
    default: Option<Value>,
    description: &'static str,
    constraints: Vec<Constraint>,
}

impl Field {
    fn new(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            ty,
            required: false,
            nullable: false,
            read_only: false,
            default: None,
            description: "",
            constraints: Vec::new(),
        }
    }

    pub fn string(name: &'static str) -> Self { Self::new(name, FieldType::String) }
    pub fn integer(name: &'static str) -> Self { Self::new(name, FieldType::Integer) }
    pub fn number(name: &'static str) -> Self { Self::new(name, FieldType::Number) }
    pub fn boolean(name: &'static str) -> Self { Self::new(name, FieldType::Boolean) }

    pub fn one_of(name: &'static str, variants: &'static [&'static str]) -> Self {
        Self::new(name, FieldType::Enum(variants))
    }

    /// Server-assigned timestamp. Implies [`read_only`](Field::read_only).
    pub fn timestamp(name: &'static str) -> Self {
        Self::new(name, FieldType::Timestamp).read_only()
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Accept an explicit `null` (and omit the field in documentation's `required`).
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Assigned by the server; dropped from inbound payloads.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Value filled in by [`Mode::Full`] validation when the field is absent.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub fn min_length(self, n: usize) -> Self { self.constrain(Constraint::MinLength(n)) }
    pub fn max_length(self, n: usize) -> Self { self.constrain(Constraint::MaxLength(n)) }
    pub fn min(self, v: f64) -> Self { self.constrain(Constraint::Min(v)) }
    pub fn max(self, v: f64) -> Self { self.constrain(Constraint::Max(v)) }
    pub fn email(self) -> Self { self.constrain(Constraint::Email) }

    fn constrain(mut self, c: Constraint) -> Self {
        self.constraints.push(c);
        self
    }

    pub fn name(&self) -> &'static str { self.name }
    pub fn ty(&self) -> FieldType { self.ty }
    pub fn is_required(&self) -> bool { self.required }
    pub fn is_nullable(&self) -> bool { self.nullable }
    pub fn is_read_only(&self) -> bool { self.read_only }
    pub fn default_value(&self) -> Option<&Value> { self.default.as_ref() }
    pub fn description(&self) -> &'static str { self.description }
    pub fn constraints(&self) -> &[Constraint] { &self.constraints }

    /// Type check followed by every constraint. Returns the value to keep:
    /// a whole-number float such as `30.0` comes back as the integer `30`.
    fn check(&self, value: &Value) -> Result<Value, String> {
        if let (FieldType::Integer, Value::Number(n)) = (self.ty, value) {
            let value = whole_number(n).map(Value::from).ok_or_else(|| self.ty.expected().to_owned())?;
            self.constraints.iter().try_for_each(|c| c.check(&value))?;
            return Ok(value);
        }

        let type_ok = match (self.ty, value) {
            (FieldType::String | FieldType::Timestamp, Value::String(_)) => true,
            (FieldType::Number, Value::Number(_)) => true,
            (FieldType::Boolean, Value::Bool(_)) => true,
            (FieldType::Enum(variants), Value::String(s)) => {
                if !variants.contains(&s.as_str()) {
                    return Err(format!("must be one of: {}", variants.join(", ")));
                }
                true
            }
            _ => false,
        };
        if !type_ok {
            return Err(self.ty.expected().to_owned());
        }
        self.constraints.iter().try_for_each(|c| c.check(value))?;
        Ok(value.clone())
    }
}

/// `n` as an `i64`, accepting floats with no fractional part.
fn whole_number(n: &serde_json::Number) -> Option<i64> {
    if let Some(i) = n.as_i64() {
        return Some(i);
    }
    let f = n.as_f64()?;
    // 2^63 is exactly representable; anything at or past it overflows.
    let in_range = f >= i64::MIN as f64 && f < i64::MAX as f64;
    (f.fract() == 0.0 && in_range).then_some(f as i64)
}

// ── Schema ────────────────────────────────────────────────────────────────────

/// Whether absent fields are an error (`Full`, POST/PUT) or simply left
/// untouched (`Partial`, PATCH).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Mode {
    Full,
    Partial,
}

/// A misconfigured field specification. Always a programming defect.
#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    #[error("field `{0}` is declared twice")]
    DuplicateField(&'static str),

    #[error("field `{field}`: {detail}")]
    Invalid { field: &'static str, detail: String },
}

/// Ordered set of field specifications for one payload shape.
#[derive(Debug)]
pub struct Schema {
    name: &'static str,
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(name: &'static str, fields: Vec<Field>) -> Result<Self, SchemaError> {
        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.name) {
                return Err(SchemaError::DuplicateField(field.name));
            }
            lint(field).map_err(|detail| SchemaError::Invalid { field: field.name, detail })?;
        }
        Ok(Self { name, fields })
    }

    pub fn name(&self) -> &'static str { self.name }
    pub fn fields(&self) -> &[Field] { &self.fields }

    /// Validates `payload` and returns the cleaned object: writable, known
    /// fields only, with defaults applied in [`Mode::Full`].
    pub fn check(&self, payload: &Value, mode: Mode) -> Result<Map<String, Value>, ValidationError> {
        let Some(object) = payload.as_object() else {
            return Err(ValidationError::single("body", "must be a JSON object"));
        };

        let mut clean = Map::new();
        let mut errors = Vec::new();

        for field in self.fields.iter().filter(|f| !f.read_only) {
            match object.get(field.name) {
                None if mode == Mode::Partial => {}
                None if field.required => errors.push(FieldError::new(field.name, "field required")),
                None => {
                    if let Some(default) = &field.default {
                        clean.insert(field.name.to_owned(), default.clone());
                    }
                }
                Some(Value::Null) if field.nullable => {
                    clean.insert(field.name.to_owned(), Value::Null);
                }
                Some(Value::Null) => errors.push(FieldError::new(field.name, "must not be null")),
                Some(value) => match field.check(value) {
                    Ok(value) => {
                        clean.insert(field.name.to_owned(), value);
                    }
                    Err(message) => errors.push(FieldError::new(field.name, message)),
                },
            }
        }

        if errors.is_empty() {
            Ok(clean)
        } else {
            Err(ValidationError { errors })
        }
    }

    /// [`check`](Schema::check) followed by conversion into the typed record.
    pub fn validate<T: DeserializeOwned>(&self, payload: &Value, mode: Mode) -> Result<T, ValidationError> {
        let clean = self.check(payload, mode)?;
        serde_json::from_value(Value::Object(clean))
            .map_err(|e| ValidationError::single("body", e.to_string()))
    }
}

fn lint(field: &Field) -> Result<(), String> {
    if field.required && field.read_only {
        return Err("a read-only field cannot be required".to_owned());
    }
    if let FieldType::Enum(variants) = field.ty {
        if variants.is_empty() {
            return Err("enum has no variants".to_owned());
        }
    }

    let mut min_len = None;
    let mut max_len = None;
    let mut min = None;
    let mut max = None;
    for c in &field.constraints {
        match *c {
            Constraint::MinLength(n) => min_len = Some(n),
            Constraint::MaxLength(n) => max_len = Some(n),
            Constraint::Min(v) => min = Some(v),
            Constraint::Max(v) => max = Some(v),
            Constraint::Email => {}
        }
        let applicable = match c {
            Constraint::MinLength(_) | Constraint::MaxLength(_) | Constraint::Email => field.ty.is_textual(),
            Constraint::Min(_) | Constraint::Max(_) => field.ty.is_numeric(),
        };
        if !applicable {
            return Err(format!("{c:?} does not apply to {:?}", field.ty));
        }
    }
    if let (Some(lo), Some(hi)) = (min_len, max_len) {
        if lo > hi {
            return Err(format!("min_length {lo} exceeds max_length {hi}"));
        }
    }
    if let (Some(lo), Some(hi)) = (min, max) {
        if lo > hi {
            return Err(format!("min {lo} exceeds max {hi}"));
        }
    }
    if let Some(default) = &field.default {
        field.check(default).map_err(|m| format!("default value {m}"))?;
    }
    Ok(())
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// One violated field.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into() }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Every field a payload (or query string) got wrong.
#[derive(Clone, Debug, Error, PartialEq, Serialize)]
#[error("validation failed: {}", join(.errors))]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { errors: vec![FieldError::new(field, message)] }
    }

    /// `None` when `errors` is empty.
    pub fn from_errors(errors: Vec<FieldError>) -> Option<Self> {
        (!errors.is_empty()).then_some(Self { errors })
    }

    /// Nests every field under `prefix`, e.g. `title` → `tasks[2].title`.
    pub fn prefixed(mut self, prefix: &str) -> Self {
        for e in &mut self.errors {
            e.field = format!("{prefix}.{}", e.field);
        }
        self
    }

    pub fn message_for(&self, field: &str) -> Option<&str> {
        self.errors.iter().find(|e| e.field == field).map(|e| e.message.as_str())
    }
}

fn join(errors: &[FieldError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

/// Serde helper for PATCH records: distinguishes an absent field (`None`)
/// from an explicit `null` (`Some(None)`). Use with `#[serde(default)]`.
pub(crate) fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn pet() -> Schema {
        Schema::new("Pet", vec![
            Field::integer("id").read_only(),
            Field::string("name").required().min_length(1).max_length(10),
            Field::string("email").required().email(),
            Field::integer("age").nullable().min(0.0).max(150.0),
            Field::one_of("kind", &["cat", "dog"]).default("cat"),
            Field::timestamp("created_at"),
        ])
        .unwrap()
    }

    #[derive(Debug, Deserialize)]
    struct Pet {
        name: String,
        age: Option<i64>,
        kind: String,
    }

    #[test]
    fn valid_payload_becomes_typed_record() {
        let p: Pet = pet()
            .validate(&json!({ "name": "Rex", "email": "rex@example.com", "age": 3 }), Mode::Full)
            .unwrap();
        assert_eq!(p.name, "Rex");
        assert_eq!(p.age, Some(3));
        assert_eq!(p.kind, "cat");
    }

    #[test]
    fn reports_every_violated_field_with_distinct_messages() {
        let err = pet()
            .check(&json!({ "name": "", "email": "not-an-email", "age": -1 }), Mode::Full)
            .unwrap_err();

        assert_eq!(err.errors.len(), 3);
        assert_eq!(err.message_for("name"), Some("must not be empty"));
        assert_eq!(err.message_for("email"), Some("must be a valid email address"));
        assert_eq!(err.message_for("age"), Some("must be greater than or equal to 0"));
    }

    #[test]
    fn missing_required_and_wrong_types() {
        let err = pet().check(&json!({ "age": "old", "kind": "bird" }), Mode::Full).unwrap_err();
        assert_eq!(err.message_for("name"), Some("field required"));
        assert_eq!(err.message_for("email"), Some("field required"));
        assert_eq!(err.message_for("age"), Some("must be an integer"));
        assert_eq!(err.message_for("kind"), Some("must be one of: cat, dog"));
    }

    #[test]
    fn whole_number_floats_count_as_integers() {
        let p: Pet = pet()
            .validate(&json!({ "name": "Rex", "email": "rex@example.com", "age": 30.0 }), Mode::Full)
            .unwrap();
        assert_eq!(p.age, Some(30));

        let clean = pet().check(&json!({ "age": 3.0 }), Mode::Partial).unwrap();
        assert_eq!(clean["age"], json!(3));
        assert!(clean["age"].is_i64());

        for bad in [json!(30.5), json!(1e19), json!(u64::MAX)] {
            let err = pet().check(&json!({ "age": bad }), Mode::Partial).unwrap_err();
            assert_eq!(err.message_for("age"), Some("must be an integer"));
        }
        let err = pet().check(&json!({ "age": -1.0 }), Mode::Partial).unwrap_err();
        assert_eq!(err.message_for("age"), Some("must be greater than or equal to 0"));
    }

    #[test]
    fn read_only_and_unknown_fields_are_dropped() {
        let clean = pet()
            .check(&json!({ "id": 99, "name": "Rex", "email": "a@b.io", "colour": "red" }), Mode::Full)
            .unwrap();
        assert!(!clean.contains_key("id"));
        assert!(!clean.contains_key("colour"));
    }

    #[test]
    fn partial_mode_skips_absent_fields_and_defaults() {
        let clean = pet().check(&json!({ "age": null }), Mode::Partial).unwrap();
        assert_eq!(clean.len(), 1);
        assert_eq!(clean["age"], Value::Null);

        let err = pet().check(&json!({ "name": null }), Mode::Partial).unwrap_err();
        assert_eq!(err.message_for("name"), Some("must not be null"));
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let err = pet().check(&json!([1, 2]), Mode::Full).unwrap_err();
        assert_eq!(err.message_for("body"), Some("must be a JSON object"));
    }

    #[test]
    fn prefixed_nests_field_names() {
        let err = ValidationError::single("title", "field required").prefixed("tasks[2]");
        assert_eq!(err.errors[0].field, "tasks[2].title");
        assert_eq!(err.to_string(), "validation failed: tasks[2].title: field required");
    }

    #[test]
    fn misconfigured_schemas_are_rejected() {
        assert_eq!(
            Schema::new("X", vec![Field::string("a"), Field::string("a")]).unwrap_err(),
            SchemaError::DuplicateField("a"),
        );
        assert!(Schema::new("X", vec![Field::integer("n").min_length(1)]).is_err());
        assert!(Schema::new("X", vec![Field::string("s").min_length(5).max_length(2)]).is_err());
        assert!(Schema::new("X", vec![Field::number("p").min(10.0).max(1.0)]).is_err());
        assert!(Schema::new("X", vec![Field::one_of("e", &[])]).is_err());
        assert!(Schema::new("X", vec![Field::one_of("e", &["a"]).default("b")]).is_err());
        assert!(Schema::new("X", vec![Field::integer("id").read_only().required()]).is_err());
    }
}
