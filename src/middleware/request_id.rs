//! Request-id tagging.
//!
//! The id travels three ways:
//! 1. as a [`RequestId`] value in the request's context, for handlers
//!    ([`Request::request_id`](crate::Request::request_id)) and for
//!    [`Logger::for_context`](crate::logging::Logger::for_context);
//! 2. as a `request_id` field on a `request` tracing span wrapping the rest
//!    of the chain, so every event below is correlated automatically;
//! 3. back to the client in the response header.

use std::fmt;
use std::sync::Arc;

use http::header::{HeaderName, HeaderValue};
use tracing::Instrument;
use uuid::Uuid;

use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next};
use crate::request::Request;

/// Header used when none is configured.
pub const DEFAULT_HEADER: &str = "x-request-id";

/// The correlation id of the current request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RequestId(Arc<str>);

impl RequestId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// A fresh random (v4) UUID.
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reads the inbound correlation header, generating an id when it is absent
/// or empty, and writes it back on the response.
#[derive(Clone, Debug)]
pub struct RequestIdTagger {
    header: HeaderName,
}

impl RequestIdTagger {
    pub fn with_header(header: HeaderName) -> Self {
        Self { header }
    }
}

impl Default for RequestIdTagger {
    fn default() -> Self {
        Self::with_header(HeaderName::from_static(DEFAULT_HEADER))
    }
}

impl Middleware for RequestIdTagger {
    fn handle(&self, mut req: Request, next: Next) -> BoxFuture {
        let inbound = req
            .header(self.header.as_str())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(RequestId::new);
        let id = inbound.unwrap_or_else(RequestId::generate);

        let ctx = req.context().with_value(id.clone());
        req.set_context(ctx);

        let span = tracing::info_span!("request", request_id = %id, method = %req.method(), path = %req.path());
        let header = self.header.clone();

        Box::pin(
            async move {
                let mut res = next.run(req).await;
                // Ids come from a header or a UUID, both valid header values.
                if let Ok(value) = HeaderValue::from_str(id.as_str()) {
                    res.headers_mut().insert(header, value);
                }
                res
            }
            .instrument(span),
        )
    }
}
