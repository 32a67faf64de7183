//! Stager configuration, loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file) is valid:
//!
//! ```toml
//! base_url = "https://d37ci6vzurychx.cloudfront.net/trip-data/"
//! staging_dir = "file-staging"
//! max_attempts = 3
//! not_found_statuses = [404, 410]
//!
//! [timeouts]
//! connect_secs = 10
//! read_secs = 30
//!
//! [retry]
//! base_delay_ms = 500
//! max_delay_ms = 30000
//! ```

use crate::backoff::Backoff;
use crate::fetcher::{Fetcher, DEFAULT_NOT_FOUND_STATUSES};
use crate::source::{SourceEndpoint, DEFAULT_BASE_URL};
use crate::staging::StagingDir;
use crate::transport::{HttpTransport, Timeouts, TransportError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors from loading or validating a config.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("build HTTP client: {0}")]
    Client(#[from] TransportError),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StagerConfig {
    pub base_url: String,
    pub staging_dir: PathBuf,
    pub max_attempts: u32,
    pub not_found_statuses: Vec<u16>,
    pub timeouts: TimeoutConfig,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    pub connect_secs: u64,
    pub read_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for StagerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            staging_dir: PathBuf::from("file-staging"),
            max_attempts: 3,
            not_found_statuses: DEFAULT_NOT_FOUND_STATUSES.to_vec(),
            timeouts: TimeoutConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        let t = Timeouts::default();
        Self {
            connect_secs: t.connect.as_secs(),
            read_secs: t.read.as_secs(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        let b = Backoff::default();
        Self {
            base_delay_ms: b.base_delay.as_millis() as u64,
            max_delay_ms: b.max_delay.as_millis() as u64,
        }
    }
}

impl StagerConfig {
    /// Load and validate a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".into()));
        }
        if self.timeouts.connect_secs == 0 || self.timeouts.read_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be non-zero".into()));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(ConfigError::Invalid(
                "retry.max_delay_ms must not be below retry.base_delay_ms".into(),
            ));
        }
        if let Some(code) = self
            .not_found_statuses
            .iter()
            .find(|c| !(400..600).contains(*c))
        {
            return Err(ConfigError::Invalid(format!(
                "not_found_statuses entry {code} is not an error status"
            )));
        }
        self.endpoint()?;
        Ok(())
    }

    pub fn endpoint(&self) -> Result<SourceEndpoint, ConfigError> {
        SourceEndpoint::new(&self.base_url).map_err(ConfigError::Invalid)
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            connect: Duration::from_secs(self.timeouts.connect_secs),
            read: Duration::from_secs(self.timeouts.read_secs),
        }
    }

    pub fn backoff(&self) -> Backoff {
        Backoff {
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
        }
    }

    /// Build an HTTP-backed fetcher from this config.
    pub fn build_fetcher(&self) -> Result<Fetcher<HttpTransport>, ConfigError> {
        self.validate()?;
        let transport = HttpTransport::new(self.timeouts())?;
        Ok(Fetcher::new(
            transport,
            self.endpoint()?,
            StagingDir::new(&self.staging_dir),
        )
        .with_backoff(self.backoff())
        .with_not_found_statuses(self.not_found_statuses.clone()))
    }

    /// Serialize back to TOML.
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("serialize config: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = StagerConfig::from_toml("").unwrap();
        assert_eq!(config, StagerConfig::default());
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.staging_dir, PathBuf::from("file-staging"));
        assert_eq!(config.timeouts().connect, Duration::from_secs(10));
        assert_eq!(config.timeouts().read, Duration::from_secs(30));
        assert_eq!(config.backoff(), Backoff::default());
    }

    #[test]
    fn partial_override() {
        let config = StagerConfig::from_toml(
            r#"
            max_attempts = 5
            staging_dir = "/data/tlc"

            [retry]
            base_delay_ms = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.staging_dir, PathBuf::from("/data/tlc"));
        assert_eq!(config.retry.base_delay_ms, 0);
        assert_eq!(config.retry.max_delay_ms, 30_000);
        assert_eq!(config.timeouts.read_secs, 30);
    }

    #[test]
    fn zero_attempts_rejected() {
        let err = StagerConfig::from_toml("max_attempts = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn bad_base_url_rejected() {
        let err = StagerConfig::from_toml(r#"base_url = "file:///tmp/""#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn success_status_cannot_mean_not_found() {
        let err = StagerConfig::from_toml("not_found_statuses = [200]").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn unknown_field_type_is_parse_error() {
        let err = StagerConfig::from_toml(r#"max_attempts = "three""#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn toml_roundtrip() {
        let config = StagerConfig::default();
        let text = config.to_toml().unwrap();
        assert_eq!(StagerConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = StagerConfig::from_file(Path::new("/nonexistent/taxistage.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
