//! Panic recovery.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;

use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

/// Converts a panic anywhere inside it into
/// `500 {"success":false,"error":{"code":"internal_error",…}}`.
///
/// The panic message is logged at error level and never sent to the client.
#[derive(Clone, Copy, Debug, Default)]
pub struct Recover;

impl Middleware for Recover {
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        let method = req.method().clone();
        let path = req.path().to_owned();
        Box::pin(async move {
            // The request is moved into the chain, so nothing observable is
            // left half-updated on our side when it unwinds.
            match AssertUnwindSafe(next.run(req)).catch_unwind().await {
                Ok(res) => res,
                Err(payload) => {
                    tracing::error!(
                        %method,
                        path = %path,
                        panic = panic_message(payload.as_ref()),
                        "handler panicked"
                    );
                    Response::internal_error()
                }
            }
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}
