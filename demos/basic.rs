//! Minimal bulwark example: one JSON endpoint behind the standard stack.
//!
//! Run with:
//!   cargo run --example basic
//!
//! Try:
//!   curl -i http://localhost:3000/slow                 # 408 after 2 s
//!   curl -i http://localhost:3000/panic                # 500, server keeps running
//!   curl -i -X OPTIONS http://localhost:3000/users \
//!        -H 'origin: http://localhost:5173'            # preflight
//!   curl -i -X POST http://localhost:3000/users \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"alice","email":"alice@example.com"}'

use std::error::Error;

use bulwark::decode::{DecodeError, read_json};
use bulwark::validate::Validator;
use bulwark::{Config, HttpService, IntoResponse, Json, Logger, Request, Response, Stack};
use http::StatusCode;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

const CONFIG: &str = r#"
request_timeout_ms = 2000

[cors]
allowed_origins = ["http://localhost:5173"]

[log]
level = "debug"
environment = "development"
service = "users-api"
"#;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NewUser {
    name: String,
    email: String,
}

#[derive(Serialize)]
struct User {
    id: u64,
    name: String,
    email: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = Config::from_toml_str(CONFIG)?;
    let logger = Logger::from_config_or_baseline(&config.log);
    logger.install_global()?;

    let svc = HttpService::from_config(Stack::standard(app, &config), &config);
    let listener = TcpListener::bind("0.0.0.0:3000").await?;
    tracing::info!("listening on 0.0.0.0:3000");

    let mut tasks = tokio::task::JoinSet::new();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                tracing::info!(in_flight = tasks.len(), "shutting down, draining connections");
                break;
            }

            res = listener.accept() => {
                let (stream, peer) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::error!("accept error: {e}");
                        continue;
                    }
                };
                let svc = svc.clone();
                tasks.spawn(async move {
                    if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                        .serve_connection(TokioIo::new(stream), svc)
                        .await
                    {
                        tracing::error!(%peer, "connection error: {e}");
                    }
                });
            }

            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    while tasks.join_next().await.is_some() {}
    Ok(())
}

async fn app(req: Request) -> Response {
    match req.path() {
        "/users" => create_user(req).await.into_response(),
        "/slow" => {
            // Stops early once the deadline has passed; the 408 is already sent.
            tokio::select! {
                () = tokio::time::sleep(std::time::Duration::from_secs(10)) => {}
                () = req.context().done() => {
                    tracing::debug!(cause = ?req.context().err(), "slow handler gave up");
                }
            }
            Response::success("finally")
        }
        "/panic" => panic!("something broke"),
        _ => Response::error(StatusCode::NOT_FOUND, "not_found", "Not found"),
    }
}

async fn create_user(req: Request) -> Result<Response, DecodeError> {
    let input: NewUser = read_json(&req, 0)?;

    let mut v = Validator::new();
    v.required("name", &input.name);
    v.max_length("name", &input.name, 64);
    v.email("email", &input.email);
    if let Err(errors) = v.finish() {
        return Ok(errors.into_response());
    }

    Ok(Json(User { id: 99, name: input.name, email: input.email }).into_response())
}
