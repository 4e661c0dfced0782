//! Layered client configuration.
//!
//! Values come from an optional JSON file, then from command-line flags and
//! environment variables, and are validated into a [`ClientConfig`].
//!
//! # Example
//!
//! ```
//! use agency_client::config::{ClientConfig, ConfigLayer};
//!
//! let file: ConfigLayer = serde_json::from_str(r#"{"id": 2, "server_address": "server:12345"}"#).unwrap();
//! let overrides = ConfigLayer { batch_max_amount: Some(50), ..ConfigLayer::default() };
//!
//! let config = ClientConfig::try_from(file.merge(overrides)).unwrap();
//! assert_eq!(config.batch_max_amount, 50);
//! assert_eq!(config.data_path.to_str(), Some("agency-2.csv"));
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{AgencyError, Result};
use crate::session::DEFAULT_BATCH_SIZE;
use crate::source::{agency_file_path, InvalidRecordPolicy};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "INFO";

/// Default grace delay between a shutdown request and a forced close.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// One source of configuration values; every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigLayer {
    pub id: Option<u8>,
    pub server_address: Option<String>,
    pub batch_max_amount: Option<usize>,
    pub log_level: Option<String>,
    pub data_path: Option<PathBuf>,
    pub shutdown_grace_ms: Option<u64>,
    pub invalid_records: Option<InvalidRecordPolicy>,
}

impl ConfigLayer {
    /// Read a layer from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Overlay `other` on top of `self`; values set in `other` win.
    pub fn merge(self, other: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            id: other.id.or(self.id),
            server_address: other.server_address.or(self.server_address),
            batch_max_amount: other.batch_max_amount.or(self.batch_max_amount),
            log_level: other.log_level.or(self.log_level),
            data_path: other.data_path.or(self.data_path),
            shutdown_grace_ms: other.shutdown_grace_ms.or(self.shutdown_grace_ms),
            invalid_records: other.invalid_records.or(self.invalid_records),
        }
    }
}

/// Validated client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Agency identifier; sender ID of every frame and finish payload.
    pub id: u8,
    /// Server `host:port`.
    pub server_address: String,
    /// Records per batch.
    pub batch_max_amount: usize,
    pub log_level: tracing::Level,
    /// Record source file.
    pub data_path: PathBuf,
    pub shutdown_grace: Duration,
    pub invalid_records: InvalidRecordPolicy,
}

impl TryFrom<ConfigLayer> for ClientConfig {
    type Error = AgencyError;

    fn try_from(layer: ConfigLayer) -> Result<Self> {
        let id = layer
            .id
            .ok_or_else(|| AgencyError::Config("missing client id".to_string()))?;

        let server_address = layer
            .server_address
            .filter(|addr| !addr.trim().is_empty())
            .ok_or_else(|| AgencyError::Config("missing server address".to_string()))?;

        let batch_max_amount = layer.batch_max_amount.unwrap_or(DEFAULT_BATCH_SIZE);
        if batch_max_amount == 0 {
            return Err(AgencyError::Config(
                "batch_max_amount must be at least 1".to_string(),
            ));
        }

        let level_text = layer.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL);
        let log_level = tracing::Level::from_str(level_text)
            .map_err(|_| AgencyError::Config(format!("invalid log level {level_text:?}")))?;

        Ok(Self {
            id,
            server_address,
            batch_max_amount,
            log_level,
            data_path: layer.data_path.unwrap_or_else(|| agency_file_path(id)),
            shutdown_grace: layer
                .shutdown_grace_ms
                .map_or(DEFAULT_SHUTDOWN_GRACE, Duration::from_millis),
            invalid_records: layer.invalid_records.unwrap_or_default(),
        })
    }
}
