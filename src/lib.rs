//! # bulwark
//!
//! Middleware helpers for JSON HTTP services built on hyper.
//!
//! ## The contract
//!
//! bulwark does not route and does not listen on sockets. You bring the
//! endpoint and the connection loop; bulwark wraps the endpoint in the layers
//! every JSON API ends up writing by hand:
//!
//! - **One response envelope**: `{"success":…,"data":…,"error":{"code","message"}}`
//! - **Strict body decoding**: size ceiling, unknown keys rejected, errors that name the field
//! - **Panic recovery**: a crashing handler becomes `500`, the process lives on
//! - **Request ids**: read or generated, echoed, attached to every log line
//! - **CORS**: origin allow-list and `OPTIONS` preflight
//! - **Timeouts**: the handler races its deadline; exactly one response is ever sent
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use bulwark::{Config, HttpService, Json, Request, Response, Stack};
//! use bulwark::decode::{DecodeError, read_json};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Deserialize)]
//! #[serde(deny_unknown_fields)]
//! struct NewUser { name: String }
//!
//! #[derive(Serialize)]
//! struct User { id: u64, name: String }
//!
//! async fn create_user(req: Request) -> Result<Json<User>, DecodeError> {
//!     let input: NewUser = read_json(&req, 0)?;
//!     Ok(Json(User { id: 1, name: input.name }))
//! }
//!
//! let config = Config::default();
//! let svc = HttpService::from_config(Stack::standard(create_user, &config), &config);
//! // hand `svc` to hyper's `serve_connection`
//! # let _ = svc;
//! ```

mod context;
mod error;
mod handler;
mod request;
mod response;
mod service;
mod sink;

pub mod config;
pub mod decode;
pub mod logging;
pub mod middleware;
pub mod validate;

pub use config::{Config, CorsConfig};
pub use context::{ContextError, RequestContext};
pub use error::Error;
pub use handler::{BoxFuture, Handler};
pub use logging::{LogConfig, Logger};
pub use middleware::{Middleware, Next, Stack};
pub use request::{Request, RequestBuilder};
pub use response::{Envelope, ErrorInfo, IntoResponse, Json, Response, ResponseBuilder};
pub use service::HttpService;
pub use sink::{Committed, ResponseSink, SinkError};
