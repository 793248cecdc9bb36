//! Bridge engine configuration.

use crate::error::{Error, Result};
use crate::frame::VendorTag;
use crate::packing::MAX_U24;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default 3-byte SysEx manufacturer ID for bridge traffic.
pub const DEFAULT_VENDOR_TAG: VendorTag = [0x00, 0x7D, 0x50];

/// Configuration for one bridge engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub vendor_tag: VendorTag,
    /// Inactivity after which a transmission is pruned.
    pub transmission_timeout_ms: u64,
    /// Chunk size for ERROR transmissions sent back to a peer.
    pub error_chunk_size: usize,
    /// Return per-message errors from `receive` instead of notifying the peer.
    pub rethrow_errors: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            vendor_tag: DEFAULT_VENDOR_TAG,
            transmission_timeout_ms: 5000,
            error_chunk_size: 16,
            rethrow_errors: false,
        }
    }
}

impl BridgeConfig {
    /// Config for deterministic tests of the receive path.
    pub fn testing() -> Self {
        Self {
            rethrow_errors: true,
            ..Self::default()
        }
    }

    pub fn transmission_timeout(&self) -> Duration {
        Duration::from_millis(self.transmission_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.vendor_tag.iter().any(|&b| b > 0x7F) {
            return Err(Error::InvalidConfig(format!(
                "vendor tag {:02X?} contains bytes above 0x7F",
                self.vendor_tag
            )));
        }
        if self.transmission_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "transmission_timeout_ms must be positive".to_string(),
            ));
        }
        if self.error_chunk_size == 0 || self.error_chunk_size > MAX_U24 as usize {
            return Err(Error::InvalidConfig(format!(
                "error_chunk_size {} out of range (1-{MAX_U24})",
                self.error_chunk_size
            )));
        }
        Ok(())
    }
}
