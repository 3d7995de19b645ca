//! Stack configuration.
//!
//! Every field has a default, so an empty file is a valid configuration:
//!
//! ```toml
//! request_timeout_ms = 5000
//! max_body_bytes = 1048576
//! request_id_header = "x-request-id"
//!
//! [cors]
//! allowed_origins = ["https://app.example.com"]
//!
//! [log]
//! level = "info"
//! environment = "production"
//! service = "billing"
//! ```

use std::path::Path;
use std::time::Duration;

use http::header::HeaderName;
use serde::{Deserialize, Serialize};

use crate::decode::DEFAULT_MAX_BYTES;
use crate::error::Error;
use crate::logging::LogConfig;
use crate::middleware::REQUEST_ID_HEADER as DEFAULT_HEADER;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Deadline for the timeout guard, in milliseconds. Must be positive.
    pub request_timeout_ms: u64,

    /// Ceiling on a collected request body, in bytes.
    pub max_body_bytes: usize,

    /// Correlation header read and written by the request-id tagger.
    pub request_id_header: String,

    pub cors: CorsConfig,

    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
            max_body_bytes: DEFAULT_MAX_BYTES,
            request_id_header: DEFAULT_HEADER.to_owned(),
            cors: CorsConfig::default(),
            log: LogConfig::default(),
        }
    }
}

/// CORS settings. Empty method or header lists mean the built-in defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
}

impl Config {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, Error> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.request_timeout_ms == 0 {
            return Err(Error::InvalidConfig("request_timeout_ms must be greater than zero".into()));
        }
        if self.max_body_bytes == 0 {
            return Err(Error::InvalidConfig("max_body_bytes must be greater than zero".into()));
        }
        if HeaderName::try_from(self.request_id_header.as_str()).is_err() {
            return Err(Error::InvalidConfig(format!(
                "request_id_header {:?} is not a valid header name",
                self.request_id_header,
            )));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// The configured correlation header, or the default when the configured
    /// one is not a valid header name.
    pub fn request_id_header(&self) -> HeaderName {
        HeaderName::try_from(self.request_id_header.as_str())
            .unwrap_or_else(|_| HeaderName::from_static(DEFAULT_HEADER))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_all_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.max_body_bytes, 1 << 20);
        assert_eq!(config.request_id_header(), "x-request-id");
        assert!(config.cors.allowed_origins.is_empty());
        assert_eq!(config.log.service, "app");
    }

    #[test]
    fn full_document() {
        let config = Config::from_toml_str(
            r#"
            request_timeout_ms = 250
            max_body_bytes = 4096
            request_id_header = "X-Correlation-Id"

            [cors]
            allowed_origins = ["https://a.test", "https://b.test"]
            allowed_methods = ["GET"]

            [log]
            level = "debug"
            environment = "development"
            service = "billing"
            "#,
        )
        .unwrap();

        assert_eq!(config.request_timeout(), Duration::from_millis(250));
        assert_eq!(config.max_body_bytes, 4096);
        assert_eq!(config.request_id_header(), "x-correlation-id");
        assert_eq!(config.cors.allowed_origins, ["https://a.test", "https://b.test"]);
        assert_eq!(config.cors.allowed_methods, ["GET"]);
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.service, "billing");
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = Config::from_toml_str("request_timeout_ms = 0").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn bad_header_name_is_rejected() {
        let err = Config::from_toml_str(r#"request_id_header = "not a header""#).unwrap_err();
        assert!(err.to_string().contains("not a valid header name"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Config::from_toml_str("request_timeout = 5").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }
}
