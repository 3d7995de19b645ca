//! Middleware layer.
//!
//! Middleware intercepts requests and responses and is the right place for
//! cross-cutting concerns. Built in:
//!
//! | Layer | Does |
//! |---|---|
//! | [`Recover`] | turns a panicking handler into `500 internal_error` |
//! | [`RequestIdTagger`] | reads or generates `x-request-id`, echoes it, scopes logs |
//! | [`Cors`] | allow-list origin echo, `OPTIONS` preflight short-circuit |
//! | [`TimeoutGuard`] | `408 timeout` when the handler misses its deadline |
//!
//! A [`Stack`] is one endpoint plus an ordered list of layers. The first layer
//! added is the outermost: it sees the request first and the response last.
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use bulwark::{Request, Response, Stack};
//! use bulwark::middleware::{Cors, Recover, RequestIdTagger, TimeoutGuard};
//!
//! async fn hello(_req: Request) -> Response { Response::success("hi") }
//!
//! let app = Stack::new(hello)
//!     .layer(Recover)
//!     .layer(RequestIdTagger::default())
//!     .layer(Cors::new(["https://a.test"]))
//!     .layer(TimeoutGuard::new(Duration::from_secs(5)));
//! ```

mod cors;
mod recover;
mod request_id;
mod timeout;

use std::sync::Arc;

use crate::config::Config;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler};
use crate::request::Request;
use crate::response::Response;

pub use cors::Cors;
pub use recover::Recover;
pub use request_id::{DEFAULT_HEADER as REQUEST_ID_HEADER, RequestId, RequestIdTagger};
pub use timeout::{RaceResult, TimeoutGuard};

/// A request interceptor.
///
/// Call `next.run(req)` to continue down the chain, or return a response of
/// your own to short-circuit it. The returned future must own everything it
/// uses; clone what you need out of `&self` before the `async move`.
pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, req: Request, next: Next) -> BoxFuture;
}

/// The remainder of the chain after the current middleware.
///
/// Owned and `'static`, so it can be moved onto another task.
#[derive(Clone)]
pub struct Next {
    endpoint: BoxedHandler,
    layers: Arc<[Arc<dyn Middleware>]>,
    index: usize,
}

impl Next {
    pub fn run(self, req: Request) -> BoxFuture {
        match self.layers.get(self.index) {
            Some(layer) => {
                let layer = Arc::clone(layer);
                let next = Next { index: self.index + 1, ..self };
                layer.handle(req, next)
            }
            None => self.endpoint.call(req),
        }
    }
}

/// An endpoint wrapped in an ordered list of middleware.
#[derive(Clone)]
pub struct Stack {
    endpoint: BoxedHandler,
    layers: Arc<[Arc<dyn Middleware>]>,
}

impl Stack {
    pub fn new(endpoint: impl Handler) -> Self {
        Self { endpoint: endpoint.into_boxed_handler(), layers: Arc::new([]) }
    }

    /// Adds `middleware` inside every layer added so far. Returns `self` for
    /// chaining.
    pub fn layer(self, middleware: impl Middleware) -> Self {
        let mut layers = self.layers.to_vec();
        layers.push(Arc::new(middleware));
        Self { endpoint: self.endpoint, layers: layers.into() }
    }

    /// The canonical chain, configured from `config`:
    ///
    /// ```text
    /// Recover → RequestIdTagger → Cors → TimeoutGuard → endpoint
    /// ```
    ///
    /// Recovery is outermost so a panic anywhere below (including one
    /// re-raised by the timeout guard) still produces a response. CORS sits
    /// outside the timeout so preflights never wait on a handler.
    pub fn standard(endpoint: impl Handler, config: &Config) -> Self {
        Self::new(endpoint)
            .layer(Recover)
            .layer(RequestIdTagger::with_header(config.request_id_header()))
            .layer(Cors::from_config(&config.cors))
            .layer(TimeoutGuard::new(config.request_timeout()))
    }

    /// Runs `req` through every layer and the endpoint.
    pub async fn call(&self, req: Request) -> Response {
        self.entry().run(req).await
    }

    fn entry(&self) -> Next {
        Next { endpoint: Arc::clone(&self.endpoint), layers: Arc::clone(&self.layers), index: 0 }
    }
}

impl ErasedHandler for Stack {
    fn call(&self, req: Request) -> BoxFuture {
        self.entry().run(req)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use http::{Method, StatusCode};

    use super::*;

    /// Records the order it sees requests and responses in.
    struct Probe {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Middleware for Probe {
        fn handle(&self, req: Request, next: Next) -> BoxFuture {
            let name = self.name;
            let log = Arc::clone(&self.log);
            Box::pin(async move {
                log.lock().unwrap().push(format!("{name} in"));
                let res = next.run(req).await;
                log.lock().unwrap().push(format!("{name} out"));
                res
            })
        }
    }

    struct Deny;

    impl Middleware for Deny {
        fn handle(&self, _req: Request, _next: Next) -> BoxFuture {
            Box::pin(async { Response::status(StatusCode::FORBIDDEN) })
        }
    }

    async fn ok(_req: Request) -> Response {
        Response::success("ok")
    }

    #[tokio::test]
    async fn first_layer_is_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let stack = Stack::new(ok)
            .layer(Probe { name: "a", log: Arc::clone(&log) })
            .layer(Probe { name: "b", log: Arc::clone(&log) });

        let res = stack.call(Request::builder(Method::GET, "/").build()).await;

        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(*log.lock().unwrap(), ["a in", "b in", "b out", "a out"]);
    }

    #[tokio::test]
    async fn middleware_can_short_circuit() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let stack = Stack::new(ok)
            .layer(Deny)
            .layer(Probe { name: "inner", log: Arc::clone(&log) });

        let res = stack.call(Request::builder(Method::GET, "/").build()).await;

        assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stacks_nest() {
        let inner = Stack::new(ok).layer(Deny);
        let outer = Stack::new(inner);
        let res = outer.call(Request::builder(Method::GET, "/").build()).await;
        assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
    }
}
