//! Cross-origin resource sharing.

use std::sync::Arc;

use http::header::{self, HeaderMap, HeaderValue};
use http::{Method, StatusCode};

use crate::config::CorsConfig;
use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

pub(crate) const DEFAULT_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
pub(crate) const DEFAULT_HEADERS: &str = "Content-Type, Authorization";

/// Allow-list CORS.
///
/// - An `Origin` on the list (or any origin, if the list holds `"*"`) is
///   echoed back in `access-control-allow-origin`.
/// - Any other request gets the first configured origin, so browsers reject
///   it with a clear mismatch rather than a missing header.
/// - `OPTIONS` requests are answered here with a bare `200` and never reach
///   the handler.
#[derive(Clone, Debug)]
pub struct Cors {
    origins: Arc<[String]>,
    methods: HeaderValue,
    headers: HeaderValue,
}

impl Cors {
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            origins: origins.into_iter().map(Into::into).collect(),
            methods: HeaderValue::from_static(DEFAULT_METHODS),
            headers: HeaderValue::from_static(DEFAULT_HEADERS),
        }
    }

    /// Builds from configuration. Method or header lists that do not form a
    /// valid header value fall back to the defaults.
    pub fn from_config(config: &CorsConfig) -> Self {
        let mut cors = Self::new(config.allowed_origins.iter().cloned());
        if let Some(v) = joined(&config.allowed_methods) {
            cors.methods = v;
        }
        if let Some(v) = joined(&config.allowed_headers) {
            cors.headers = v;
        }
        cors
    }

    /// The value for `access-control-allow-origin`, if any.
    fn allow_origin(&self, origin: Option<&str>) -> Option<HeaderValue> {
        if let Some(origin) = origin {
            if self.origins.iter().any(|o| o == origin || o == "*") {
                return HeaderValue::from_str(origin).ok();
            }
        }
        self.origins.first().and_then(|o| HeaderValue::from_str(o).ok())
    }

    fn apply(&self, origin: Option<&str>, headers: &mut HeaderMap) {
        if let Some(v) = self.allow_origin(origin) {
            headers.entry(header::ACCESS_CONTROL_ALLOW_ORIGIN).or_insert(v);
        }
        headers.entry(header::ACCESS_CONTROL_ALLOW_METHODS).or_insert_with(|| self.methods.clone());
        headers.entry(header::ACCESS_CONTROL_ALLOW_HEADERS).or_insert_with(|| self.headers.clone());
        headers.append(header::VARY, HeaderValue::from_static("Origin"));
    }
}

fn joined(items: &[String]) -> Option<HeaderValue> {
    if items.is_empty() {
        return None;
    }
    HeaderValue::from_str(&items.join(", ")).ok()
}

impl Middleware for Cors {
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        let origin = req.header(header::ORIGIN.as_str()).map(str::to_owned);

        if *req.method() == Method::OPTIONS {
            let mut res = Response::builder().status(StatusCode::OK).no_body();
            self.apply(origin.as_deref(), res.headers_mut());
            return Box::pin(async move { res });
        }

        let cors = self.clone();
        Box::pin(async move {
            let mut res = next.run(req).await;
            // Headers the handler set itself win.
            cors.apply(origin.as_deref(), res.headers_mut());
            res
        })
    }
}
