//! Outgoing HTTP response type, the JSON envelope, and the [`IntoResponse`]
//! conversion trait.
//!
//! Every JSON body bulwark produces has the same shape:
//!
//! ```text
//! {"success":true,"data":…}
//! {"success":false,"error":{"code":"timeout","message":"Request timeout"}}
//! ```
//!
//! `data` and `error` are omitted when absent.

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use http_body_util::Full;
use serde::Serialize;

const JSON: &str = "application/json";
const TEXT: &str = "text/plain; charset=utf-8";

// ── Envelope ──────────────────────────────────────────────────────────────────

/// The `{success, data?, error?}` body shared by every JSON response.
#[derive(Debug, Serialize)]
pub struct Envelope<'a, T: Serialize + ?Sized> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<&'a T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo<'a>>,
}

/// The `error` member of a failed [`Envelope`].
#[derive(Debug, Serialize)]
pub struct ErrorInfo<'a> {
    pub code: &'a str,
    pub message: &'a str,
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// # Envelope shortcuts
///
/// ```rust
/// use bulwark::Response;
/// use http::StatusCode;
///
/// Response::success(&vec![1, 2, 3]);
/// Response::error(StatusCode::NOT_FOUND, "not_found", "No such user");
/// ```
///
/// # Builder (custom status or headers)
///
/// ```rust
/// use bulwark::Response;
/// use http::StatusCode;
///
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header("location", "/users/42")
///     .json(br#"{"id":42}"#.to_vec());
/// ```
#[derive(Debug)]
pub struct Response {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
}

impl Response {
    /// `200 OK` with `{"success":true,"data":…}`.
    pub fn success<T: Serialize + ?Sized>(data: &T) -> Self {
        let envelope = Envelope { success: true, data: Some(data), error: None };
        match serde_json::to_vec(&envelope) {
            Ok(body) => Self::builder().json(body),
            Err(e) => {
                tracing::error!(error = %e, "failed to encode response payload");
                Self::internal_error()
            }
        }
    }

    /// `{"success":false,"error":{"code":…,"message":…}}` with `status`.
    pub fn error(status: StatusCode, code: &str, message: &str) -> Self {
        let envelope = Envelope::<()> {
            success: false,
            data: None,
            error: Some(ErrorInfo { code, message }),
        };
        // Strings and a bool always serialize.
        let body = serde_json::to_vec(&envelope).unwrap_or_default();
        Self::builder().status(status).json(body)
    }

    /// The generic `500` every unexpected fault turns into. Never carries
    /// detail about the fault itself.
    pub fn internal_error() -> Self {
        Self::error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "Internal server error")
    }

    /// `200 OK`, `application/json`, body passed through untouched.
    pub fn json(body: impl Into<Bytes>) -> Self {
        Self::builder().json(body)
    }

    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self { status: code, headers: HeaderMap::new(), body: Bytes::new() }
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: HeaderMap::new(), status: StatusCode::OK }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }
    pub fn body(&self) -> &Bytes { &self.body }

    /// Converts into the `http` type hyper writes to the wire.
    pub fn into_inner(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(self.body));
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers;
        res
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`.
/// Terminated by a typed body method.
pub struct ResponseBuilder {
    headers: HeaderMap,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    /// Appends a header. Invalid names or values are dropped with a warning.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => tracing::warn!(name, "dropping invalid response header"),
        }
        self
    }

    /// Terminate with a JSON body (`application/json`).
    pub fn json(self, body: impl Into<Bytes>) -> Response {
        self.finish(JSON, body.into())
    }

    /// Terminate with a plain-text body (`text/plain; charset=utf-8`).
    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish(TEXT, Bytes::from(body.into()))
    }

    /// Terminate with no body (e.g. `204 No Content`, a CORS preflight).
    pub fn no_body(self) -> Response {
        Response { body: Bytes::new(), headers: self.headers, status: self.status }
    }

    fn finish(mut self, content_type: &'static str, body: Bytes) -> Response {
        self.headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        Response { body, headers: self.headers, status: self.status }
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
///
/// Implement on your own types to return them directly from handlers.
/// [`DecodeError`](crate::decode::DecodeError) and
/// [`ValidationErrors`](crate::validate::ValidationErrors) implement it, so a
/// handler returning `Result<Response, DecodeError>` can use `?` on
/// [`read_json`](crate::decode::read_json).
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

/// Return a status directly from a handler: `return StatusCode::NO_CONTENT`
impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}

impl<T, E> IntoResponse for Result<T, E>
where
    T: IntoResponse,
    E: IntoResponse,
{
    fn into_response(self) -> Response {
        match self {
            Ok(v) => v.into_response(),
            Err(e) => e.into_response(),
        }
    }
}

/// Success envelope around any serializable value.
///
/// ```rust,ignore
/// async fn get_user(_req: Request) -> Json<User> {
///     Json(User { id: 1, name: "alice".into() })
/// }
/// ```
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response { Response::success(&self.0) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_omits_error() {
        let res = Response::success("ok");
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(&res.body()[..], br#"{"success":true,"data":"ok"}"#);
    }

    #[test]
    fn error_envelope_omits_data() {
        let res = Response::error(StatusCode::REQUEST_TIMEOUT, "timeout", "Request timeout");
        assert_eq!(res.status_code(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(
            &res.body()[..],
            br#"{"success":false,"error":{"code":"timeout","message":"Request timeout"}}"#,
        );
    }

    #[test]
    fn internal_error_is_generic() {
        let res = Response::internal_error();
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            &res.body()[..],
            br#"{"success":false,"error":{"code":"internal_error","message":"Internal server error"}}"#,
        );
    }

    #[test]
    fn unserializable_payload_becomes_500() {
        use std::collections::HashMap;
        // JSON object keys must be strings.
        let mut bad = HashMap::new();
        bad.insert(vec![1u8], 1);
        assert_eq!(Response::success(&bad).status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn builder_keeps_extra_headers() {
        let res = Response::builder()
            .status(StatusCode::CREATED)
            .header("location", "/users/42")
            .header("bad header", "x")
            .json(b"{}".to_vec());
        assert_eq!(res.status_code(), StatusCode::CREATED);
        assert_eq!(res.headers()["location"], "/users/42");
        assert_eq!(res.headers().len(), 2);

        let inner = res.into_inner();
        assert_eq!(inner.status(), StatusCode::CREATED);
    }

    #[test]
    fn result_dispatches_to_either_side() {
        let ok: Result<StatusCode, StatusCode> = Ok(StatusCode::NO_CONTENT);
        let err: Result<StatusCode, StatusCode> = Err(StatusCode::BAD_REQUEST);
        assert_eq!(ok.into_response().status_code(), StatusCode::NO_CONTENT);
        assert_eq!(err.into_response().status_code(), StatusCode::BAD_REQUEST);
    }
}
