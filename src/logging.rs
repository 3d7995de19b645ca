//! Service logger.
//!
//! A [`Logger`] is an explicit handle, built once at startup and passed to
//! whatever needs it. It owns its own `tracing` dispatcher, so two loggers
//! with different levels or formats can coexist in one process (and in one
//! test binary). Binaries that want plain `tracing::info!` everywhere call
//! [`Logger::install_global`] once.
//!
//! Every event carries the service name; loggers derived with
//! [`with_request_id`](Logger::with_request_id) or
//! [`for_context`](Logger::for_context) add the request id.

use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};
use tracing::{Dispatch, Span};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;

use crate::context::RequestContext;
use crate::error::Error;
use crate::middleware::RequestId;

/// Logger settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// `debug`, `info`, `warn` or `error`. Empty means `info`.
    pub level: String,
    /// `production` (JSON lines) or `development` (human-readable).
    /// Anything else is treated as `production`.
    pub environment: String,
    /// Attached to every event. Required.
    pub service: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: "info".into(), environment: "development".into(), service: "app".into() }
    }
}

fn parse_level(level: &str) -> Result<LevelFilter, Error> {
    match level.trim().to_ascii_lowercase().as_str() {
        "" | "info" => Ok(LevelFilter::INFO),
        "debug"     => Ok(LevelFilter::DEBUG),
        "warn"      => Ok(LevelFilter::WARN),
        "error"     => Ok(LevelFilter::ERROR),
        other       => Err(Error::Logging(format!("unknown log level {other:?}"))),
    }
}

#[derive(Clone, Debug)]
pub struct Logger {
    dispatch: Dispatch,
    span: Span,
}

impl Logger {
    /// Builds a logger writing to stdout.
    pub fn new(config: &LogConfig) -> Result<Self, Error> {
        Self::with_writer(config, io::stdout)
    }

    /// Builds a logger writing to `writer`.
    pub fn with_writer<W>(config: &LogConfig, writer: W) -> Result<Self, Error>
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        if config.service.trim().is_empty() {
            return Err(Error::Logging("service name is required".into()));
        }
        let level = parse_level(&config.level)?;

        let builder = tracing_subscriber::fmt().with_max_level(level).with_writer(writer);
        let dispatch = if config.environment == "development" {
            Dispatch::new(builder.finish())
        } else {
            Dispatch::new(builder.json().finish())
        };

        let span = tracing::dispatcher::with_default(&dispatch, || {
            tracing::info_span!("service", service = %config.service)
        });
        Ok(Self { dispatch, span })
    }

    /// Development format, `info` level, service `"app"`, on stdout.
    pub fn baseline() -> Self {
        let dispatch = Dispatch::new(
            tracing_subscriber::fmt().with_max_level(LevelFilter::INFO).finish(),
        );
        let span = tracing::dispatcher::with_default(&dispatch, || {
            tracing::info_span!("service", service = "app")
        });
        Self { dispatch, span }
    }

    /// [`new`](Self::new), degrading to [`baseline`](Self::baseline) when the
    /// configuration is unusable. The problem is logged through the baseline.
    pub fn from_config_or_baseline(config: &LogConfig) -> Self {
        match Self::new(config) {
            Ok(logger) => logger,
            Err(e) => {
                let logger = Self::baseline();
                logger.warn(&format!("invalid log configuration, using baseline: {e}"));
                logger
            }
        }
    }

    /// A child logger whose events carry `request_id`.
    pub fn with_request_id(&self, id: &str) -> Self {
        let span = self.in_scope(|| tracing::info_span!("request", request_id = %id));
        Self { dispatch: self.dispatch.clone(), span }
    }

    /// A child logger whose events carry one extra `key`/`value` pair.
    ///
    /// `tracing` field names are fixed at compile time, so the pair is
    /// recorded on a `field` span as `key` and `value`. Chain calls for more
    /// than one pair; each adds a span.
    pub fn with(&self, key: &str, value: impl fmt::Display) -> Self {
        let span = self.in_scope(|| tracing::info_span!("field", key = %key, value = %value));
        Self { dispatch: self.dispatch.clone(), span }
    }

    /// [`with_request_id`](Self::with_request_id) for the id stored in `ctx`,
    /// or `self` unchanged when there is none.
    pub fn for_context(&self, ctx: &RequestContext) -> Self {
        match ctx.value::<RequestId>() {
            Some(id) => self.with_request_id(id.as_str()),
            None => self.clone(),
        }
    }

    /// Runs `f` with this logger as the active dispatcher and its span
    /// entered, so plain `tracing` macros inside `f` go through it.
    pub fn in_scope<R>(&self, f: impl FnOnce() -> R) -> R {
        tracing::dispatcher::with_default(&self.dispatch, || self.span.in_scope(f))
    }

    pub fn debug(&self, msg: &str) { self.in_scope(|| tracing::debug!("{msg}")) }
    pub fn info(&self, msg: &str)  { self.in_scope(|| tracing::info!("{msg}")) }
    pub fn warn(&self, msg: &str)  { self.in_scope(|| tracing::warn!("{msg}")) }
    pub fn error(&self, msg: &str) { self.in_scope(|| tracing::error!("{msg}")) }

    /// Makes this logger's dispatcher the process-wide default. Fails if one
    /// was already installed.
    pub fn install_global(&self) -> Result<(), Error> {
        tracing::dispatcher::set_global_default(self.dispatch.clone())
            .map_err(|e| Error::Logging(e.to_string()))
    }
}
