//! Strict JSON request body decoding.
//!
//! [`read_json`] turns a request body into a typed value or a [`DecodeError`]
//! that says precisely what was wrong, in words fit for an API client:
//!
//! | Problem | Error | Status |
//! |---|---|---|
//! | bad syntax | `malformed JSON at position 17` | 400 |
//! | wrong type | `invalid value for field "user.age"` | 400 |
//! | unexpected key | `unknown field "user.admin"` | 400 |
//! | missing key | `missing field "user.name"` | 400 |
//! | non-JSON `content-type` | `unsupported media type` | 415 |
//! | oversize body | `request body must not exceed 1048576 bytes` | 413 |
//!
//! Decoding is always strict: an object key the destination type does not
//! declare is rejected, whether or not the type carries
//! `#[serde(deny_unknown_fields)]`. Field names are dotted paths from the
//! root of the body.

use http::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::error::Category;
use serde_path_to_error::{Path, Segment};
use thiserror::Error;

use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// Body ceiling used when `read_json` is given `0`.
pub const DEFAULT_MAX_BYTES: usize = 1 << 20;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed JSON at position {offset}")]
    Malformed { offset: usize },

    #[error("invalid value for field {field:?}")]
    InvalidField { field: String },

    #[error("unknown field {field:?}")]
    UnknownField { field: String },

    #[error("missing field {field:?}")]
    MissingField { field: String },

    #[error("unsupported media type")]
    UnsupportedMediaType,

    #[error("request body must not exceed {limit} bytes")]
    TooLarge { limit: usize },

    #[error("request body must not be empty")]
    Empty,

    #[error("failed to decode JSON: {0}")]
    Other(String),
}

impl DecodeError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Machine-readable code for the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedMediaType => "unsupported_media_type",
            Self::TooLarge { .. } => "payload_too_large",
            _ => "invalid_json",
        }
    }
}

impl IntoResponse for DecodeError {
    fn into_response(self) -> Response {
        Response::error(self.status(), self.code(), &self.to_string())
    }
}

/// Decodes the request body as JSON into `T`.
///
/// `max_bytes == 0` means [`DEFAULT_MAX_BYTES`]. A `content-type` header, if
/// present, must be `application/json` or a `+json` type.
pub fn read_json<T: DeserializeOwned>(req: &Request, max_bytes: usize) -> Result<T, DecodeError> {
    if let Some(content_type) = req.header("content-type") {
        if !is_json(content_type) {
            return Err(DecodeError::UnsupportedMediaType);
        }
    }
    decode_slice(req.body(), max_bytes)
}

/// [`read_json`] for bytes that did not arrive in a [`Request`].
pub fn decode_slice<T: DeserializeOwned>(body: &[u8], max_bytes: usize) -> Result<T, DecodeError> {
    let limit = if max_bytes == 0 { DEFAULT_MAX_BYTES } else { max_bytes };
    if body.len() > limit {
        return Err(DecodeError::TooLarge { limit });
    }
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(DecodeError::Empty);
    }
    strict(body)
}

/// Deserializes `body`, tracking the path of every value and refusing keys
/// that `T` ignores.
fn strict<T: DeserializeOwned>(body: &[u8]) -> Result<T, DecodeError> {
    let mut de = serde_json::Deserializer::from_slice(body);
    let mut unknown = None;
    let mut on_ignored = |path: serde_ignored::Path<'_>| {
        unknown.get_or_insert_with(|| path.to_string());
    };
    let tracked = serde_ignored::Deserializer::new(&mut de, &mut on_ignored);
    let value = serde_path_to_error::deserialize(tracked).map_err(|e| classify(body, &e))?;
    de.end().map_err(|e| DecodeError::Malformed { offset: byte_offset(body, e.line(), e.column()) })?;

    match unknown {
        Some(field) => Err(DecodeError::UnknownField { field }),
        None => Ok(value),
    }
}

fn is_json(content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    essence == "application/json" || (essence.starts_with("application/") && essence.ends_with("+json"))
}

fn classify(body: &[u8], err: &serde_path_to_error::Error<serde_json::Error>) -> DecodeError {
    let inner = err.inner();
    let offset = byte_offset(body, inner.line(), inner.column());
    match inner.classify() {
        Category::Syntax | Category::Eof => DecodeError::Malformed { offset },
        Category::Data => {
            let msg = inner.to_string();
            if let Some(name) = quoted(&msg, "unknown field `") {
                DecodeError::UnknownField { field: qualify(err.path(), &name) }
            } else if let Some(name) = quoted(&msg, "missing field `") {
                DecodeError::MissingField { field: qualify(err.path(), &name) }
            } else if err.path().iter().next().is_some() {
                DecodeError::InvalidField { field: err.path().to_string() }
            } else {
                DecodeError::Other(msg)
            }
        }
        Category::Io => DecodeError::Other(inner.to_string()),
    }
}

/// serde_json reports 1-based line and byte column; turn that into a byte
/// offset from the start of the body.
fn byte_offset(body: &[u8], line: usize, column: usize) -> usize {
    let line_start = body
        .iter()
        .enumerate()
        .filter(|(_, b)| **b == b'\n')
        .nth(line.saturating_sub(2))
        .map(|(i, _)| i + 1)
        .filter(|_| line > 1)
        .unwrap_or(0);
    (line_start + column).min(body.len())
}

/// The name between `prefix` and the next backtick in a serde message.
fn quoted(msg: &str, prefix: &str) -> Option<String> {
    let rest = msg.strip_prefix(prefix)?;
    rest.split('`').next().map(str::to_owned)
}

/// `name` as a member of the object at `parent`.
fn qualify(parent: &Path, name: &str) -> String {
    match parent.iter().last() {
        None => name.to_owned(),
        Some(Segment::Map { key }) if key == name => parent.to_string(),
        Some(_) => format!("{parent}.{name}"),
    }
}
