//! Incoming HTTP request type and query-string access.

use std::collections::HashMap;

use bytes::Bytes;
use serde_json::Value;

use crate::error::ApiError;
use crate::validate::{FieldError, ValidationError};

/// An incoming HTTP request with its body fully buffered and its path
/// parameters already extracted by the router.
pub struct Request {
    pub(crate) query: Query,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
}

impl Request {
    pub(crate) fn new(query: Option<&str>, body: Bytes, params: HashMap<String, String>) -> Self {
        Self { query: Query::parse(query.unwrap_or("")), body, params }
    }

    pub fn query(&self) -> &Query { &self.query }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Path parameter coerced to an identifier. A non-integer is a client
    /// error on that parameter, never a crash.
    pub fn id_param(&self, key: &str) -> Result<i64, ApiError> {
        let raw = self.param(key).unwrap_or_default();
        raw.parse::<i64>()
            .map_err(|_| ValidationError::single(key, format!("must be an integer, got `{raw}`")).into())
    }

    /// Parses the body as JSON. Schema checks happen later, in the validator.
    pub fn json(&self) -> Result<Value, ApiError> {
        if self.body.is_empty() {
            return Err(ApiError::BadRequest("request body is empty".to_owned()));
        }
        serde_json::from_slice(&self.body)
            .map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {e}")))
    }
}

// ── Query ─────────────────────────────────────────────────────────────────────

/// Decoded `application/x-www-form-urlencoded` query string.
///
/// Typed accessors return `Ok(None)` for an absent parameter and a
/// [`FieldError`] naming the parameter when a present one fails to coerce.
#[derive(Debug, Default)]
pub struct Query {
    pairs: Vec<(String, String)>,
}

impl Query {
    pub fn parse(raw: &str) -> Self {
        let pairs = url::form_urlencoded::parse(raw.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Self { pairs }
    }

    /// First value of `name`. Blank values count as absent.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs.iter()
            .find(|(k, v)| k == name && !v.trim().is_empty())
            .map(|(_, v)| v.as_str())
    }

    pub fn int(&self, name: &str) -> Result<Option<i64>, FieldError> {
        self.typed(name, "must be an integer", |v| v.parse().ok())
    }

    /// Like [`int`](Self::int), but a well-formed integer outside `i64`
    /// saturates to `i64::MIN`/`i64::MAX` instead of failing.
    pub fn saturating_int(&self, name: &str) -> Result<Option<i64>, FieldError> {
        self.typed(name, "must be an integer", |v| {
            let (negative, digits) = match v.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, v.strip_prefix('+').unwrap_or(v)),
            };
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            Some(v.parse().unwrap_or(if negative { i64::MIN } else { i64::MAX }))
        })
    }

    pub fn float(&self, name: &str) -> Result<Option<f64>, FieldError> {
        self.typed(name, "must be a number", |v| v.parse::<f64>().ok().filter(|f| f.is_finite()))
    }

    pub fn bool(&self, name: &str) -> Result<Option<bool>, FieldError> {
        self.typed(name, "must be a boolean", |v| match v.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        })
    }

    /// Value restricted to `variants`.
    pub fn one_of(&self, name: &str, variants: &[&str]) -> Result<Option<String>, FieldError> {
        match self.get(name) {
            None => Ok(None),
            Some(v) if variants.contains(&v) => Ok(Some(v.to_owned())),
            Some(_) => Err(FieldError::new(name, format!("must be one of: {}", variants.join(", ")))),
        }
    }

    fn typed<T>(
        &self,
        name: &str,
        expected: &str,
        parse: impl FnOnce(&str) -> Option<T>,
    ) -> Result<Option<T>, FieldError> {
        match self.get(name) {
            None => Ok(None),
            Some(v) => parse(v.trim()).map(Some).ok_or_else(|| FieldError::new(name, expected)),
        }
    }
}
