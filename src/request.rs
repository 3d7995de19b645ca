//! Incoming HTTP request type.

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::Method;

use crate::context::RequestContext;
use crate::middleware::RequestId;

/// An incoming HTTP request with its body already collected.
pub struct Request {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) context: RequestContext,
}

impl Request {
    pub(crate) fn from_parts(
        method: Method,
        path: String,
        headers: HeaderMap,
        body: Bytes,
        context: RequestContext,
    ) -> Self {
        Self { method, path, headers, body, context }
    }

    /// Builder for requests constructed in code (tests, in-process calls).
    pub fn builder(method: Method, path: impl Into<String>) -> RequestBuilder {
        RequestBuilder { method, path: path.into(), headers: HeaderMap::new(), body: Bytes::new() }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &Bytes { &self.body }

    /// Header lookup. Returns `None` for absent or non-UTF-8 values.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn context(&self) -> &RequestContext { &self.context }

    /// Replaces the request's context. Middleware uses this to hand a derived
    /// context (with a deadline or extra values) to the rest of the chain.
    pub fn set_context(&mut self, context: RequestContext) {
        self.context = context;
    }

    /// The correlation id attached by [`RequestIdTagger`](crate::middleware::RequestIdTagger).
    pub fn request_id(&self) -> Option<&str> {
        self.context.value::<RequestId>().map(RequestId::as_str)
    }
}

/// Fluent builder for [`Request`]. Obtain via [`Request::builder`].
pub struct RequestBuilder {
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Bytes,
}

impl RequestBuilder {
    /// Appends a header. Names or values that are not valid HTTP are dropped
    /// with a warning.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => tracing::warn!(name, "dropping invalid request header"),
        }
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Finishes the request with a fresh root context.
    pub fn build(self) -> Request {
        Request::from_parts(self.method, self.path, self.headers, self.body, RequestContext::background())
    }
}
