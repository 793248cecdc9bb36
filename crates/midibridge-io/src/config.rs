//! Transport adapter configuration.

use crate::error::{Error, Result};
use midibridge_core::BridgeConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Path requested from a device to check that a bridge answers on it.
pub const DEFAULT_PROBE_PATH: &str = "__midibridge_probe__";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Engine settings for every connection the adapter creates.
    pub bridge: BridgeConfig,
    /// Requested during connect. Any finished transfer or reported error counts as an answer.
    pub probe_path: String,
    pub probe_chunk_size: usize,
    /// Suggested wait for a probe answer.
    pub connect_timeout_ms: u64,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            bridge: BridgeConfig::default(),
            probe_path: DEFAULT_PROBE_PATH.to_string(),
            probe_chunk_size: 64,
            connect_timeout_ms: 3000,
        }
    }
}

impl AdapterConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        self.bridge.validate()?;

        if self.probe_path.is_empty() {
            return Err(Error::InvalidConfig("probe_path must not be empty".to_string()));
        }
        if self.probe_chunk_size == 0 {
            return Err(Error::InvalidConfig(
                "probe_chunk_size must be positive".to_string(),
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "connect_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AdapterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.connect_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let config = AdapterConfig {
            probe_chunk_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = AdapterConfig {
            probe_path: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let mut config = AdapterConfig::default();
        config.bridge.transmission_timeout_ms = 0;
        assert!(matches!(config.validate(), Err(Error::Bridge(_))));
    }

    #[test]
    fn test_partial_json() {
        let config: AdapterConfig =
            serde_json::from_str(r#"{ "connect_timeout_ms": 250, "bridge": { "error_chunk_size": 8 } }"#)
                .unwrap();
        assert_eq!(config.connect_timeout_ms, 250);
        assert_eq!(config.bridge.error_chunk_size, 8);
        assert_eq!(config.probe_path, DEFAULT_PROBE_PATH);
    }
}
