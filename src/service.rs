//! hyper integration.
//!
//! bulwark does not accept connections. [`HttpService`] is the seam between a
//! connection you drive with hyper and a [`Stack`]:
//!
//! ```rust,ignore
//! let svc = HttpService::new(Stack::standard(app, &config), config.max_body_bytes);
//! hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
//!     .serve_connection(TokioIo::new(stream), svc)
//!     .await?;
//! ```

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::service::Service;

use crate::config::Config;
use crate::context::RequestContext;
use crate::middleware::Stack;
use crate::request::Request;
use crate::response::Response;

type ServiceFuture = Pin<Box<dyn Future<Output = Result<http::Response<Full<Bytes>>, Infallible>> + Send>>;

/// A hyper [`Service`] running every request through a [`Stack`].
///
/// The error type is [`Infallible`]: every failure (oversize body, broken
/// body stream, timeouts, panics) is answered with a response.
#[derive(Clone)]
pub struct HttpService {
    stack: Arc<Stack>,
    max_body_bytes: usize,
}

impl HttpService {
    pub fn new(stack: Stack, max_body_bytes: usize) -> Self {
        Self { stack: Arc::new(stack), max_body_bytes }
    }

    /// Uses the configured body ceiling.
    pub fn from_config(stack: Stack, config: &Config) -> Self {
        Self::new(stack, config.max_body_bytes)
    }
}

impl<B> Service<http::Request<B>> for HttpService
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    type Response = http::Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = ServiceFuture;

    fn call(&self, req: http::Request<B>) -> Self::Future {
        let stack = Arc::clone(&self.stack);
        let limit = self.max_body_bytes;
        Box::pin(async move { Ok(dispatch(stack, req, limit).await.into_inner()) })
    }
}

/// Collects the body, then hands the request to the stack.
async fn dispatch<B>(stack: Arc<Stack>, req: http::Request<B>, limit: usize) -> Response
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = req.into_parts();
    let path = parts
        .uri
        .path_and_query()
        .map_or_else(|| parts.uri.path().to_owned(), |pq| pq.as_str().to_owned());

    let body = match Limited::new(body, limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.is::<LengthLimitError>() => {
            return Response::error(
                StatusCode::PAYLOAD_TOO_LARGE,
                "payload_too_large",
                &format!("request body must not exceed {limit} bytes"),
            );
        }
        Err(e) => {
            tracing::debug!(error = %e, "failed to read request body");
            return Response::error(StatusCode::BAD_REQUEST, "invalid_body", "Failed to read request body");
        }
    };

    let req = Request::from_parts(parts.method, path, parts.headers, body, RequestContext::background());
    stack.call(req).await
}

#[cfg(test)]
mod tests {
    use http::Method;

    use super::*;

    async fn echo_len(req: Request) -> Response {
        Response::success(&req.body().len())
    }

    fn request(body: &'static str) -> http::Request<Full<Bytes>> {
        http::Request::builder()
            .method(Method::POST)
            .uri("/echo?x=1")
            .body(Full::new(Bytes::from_static(body.as_bytes())))
            .unwrap()
    }

    #[tokio::test]
    async fn body_is_collected_and_passed_on() {
        let svc = HttpService::new(Stack::new(echo_len), 64);
        let res = svc.call(request("hello")).await.unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        let body = res.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], br#"{"success":true,"data":5}"#);
    }

    #[tokio::test]
    async fn oversize_body_is_413() {
        let svc = HttpService::new(Stack::new(echo_len), 4);
        let res = svc.call(request("hello")).await.unwrap();
        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn query_string_is_kept_in_path() {
        let svc = HttpService::new(Stack::new(|req: Request| async move { req.path().to_owned() }), 64);
        let res = svc.call(request("")).await.unwrap();
        let body = res.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"/echo?x=1");
    }
}
