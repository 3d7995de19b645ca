//! Unified error type.

use thiserror::Error;

/// The error type returned by bulwark's fallible setup operations.
///
/// Request-level failures (bad JSON, timeouts, panics) are expressed as HTTP
/// [`Response`](crate::Response) values, not as `Error`s. This type surfaces
/// problems building the stack: reading or parsing configuration and
/// initializing logging.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("logging: {0}")]
    Logging(String),
}
