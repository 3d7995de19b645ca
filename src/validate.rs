//! Field validation.
//!
//! A [`Validator`] collects every failure instead of stopping at the first,
//! so a client learns about all bad fields in one round trip.
//!
//! ```rust
//! use bulwark::validate::Validator;
//!
//! let mut v = Validator::new();
//! v.required("name", "");
//! v.email("email", "not-an-email");
//! v.range("age", 7, 18, 130);
//!
//! assert_eq!(v.errors().len(), 3);
//! assert!(v.finish().is_err());
//! ```

use std::fmt;
use std::sync::LazyLock;

use http::StatusCode;
use regex::Regex;
use thiserror::Error;

use crate::response::{IntoResponse, Response};

static EMAIL: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}$").ok()
});

/// One failed rule.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("validation failed for field '{field}': {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

/// Every failed rule of one validation pass.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

impl IntoResponse for ValidationErrors {
    fn into_response(self) -> Response {
        Response::error(StatusCode::UNPROCESSABLE_ENTITY, "validation_failed", &self.to_string())
    }
}

#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<ValidationError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(ValidationError { field: field.to_owned(), message: message.into() });
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// All messages joined with `"; "`. Empty when valid.
    pub fn error_messages(&self) -> String {
        self.errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
    }

    /// Ends the pass.
    pub fn finish(self) -> Result<(), ValidationErrors> {
        if self.errors.is_empty() { Ok(()) } else { Err(ValidationErrors(self.errors)) }
    }

    /// Non-blank after trimming whitespace.
    pub fn required(&mut self, field: &str, value: &str) {
        if value.trim().is_empty() {
            self.add_error(field, "is required");
        }
    }

    /// At least `min` characters.
    pub fn min_length(&mut self, field: &str, value: &str, min: usize) {
        if value.chars().count() < min {
            self.add_error(field, format!("must be at least {min} characters"));
        }
    }

    /// At most `max` characters.
    pub fn max_length(&mut self, field: &str, value: &str, max: usize) {
        if value.chars().count() > max {
            self.add_error(field, format!("must not exceed {max} characters"));
        }
    }

    pub fn email(&mut self, field: &str, value: &str) {
        if !EMAIL.as_ref().is_some_and(|re| re.is_match(value)) {
            self.add_error(field, "must be a valid email address");
        }
    }

    /// `min <= value <= max`.
    pub fn range(&mut self, field: &str, value: i64, min: i64, max: i64) {
        if value < min || value > max {
            self.add_error(field, format!("must be between {min} and {max}"));
        }
    }

    /// `value` matches `pattern`; on mismatch `message` is recorded. An
    /// invalid pattern is itself recorded as a failure.
    pub fn pattern(&mut self, field: &str, value: &str, pattern: &str, message: &str) {
        match Regex::new(pattern) {
            Ok(re) if re.is_match(value) => {}
            Ok(_) => self.add_error(field, message),
            Err(_) => self.add_error(field, "pattern validation failed"),
        }
    }

    pub fn one_of(&mut self, field: &str, value: &str, allowed: &[&str]) {
        if !allowed.contains(&value) {
            self.add_error(field, format!("must be one of: {}", allowed.join(", ")));
        }
    }

    /// Records `message` unless `valid`.
    pub fn custom(&mut self, field: &str, valid: bool, message: &str) {
        if !valid {
            self.add_error(field, message);
        }
    }
}
