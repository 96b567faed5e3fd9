//! Bridge timing and protocol settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for one [`ManualControlBridge`][crate::bridge::ManualControlBridge].
///
/// All timeouts depend on the real latency of the transport; the defaults
/// suit a USB-attached module chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Upper bound on one device command round trip.
    pub device_timeout_ms: u64,
    /// Upper bound on fail-safe plus idle-pattern restore when a handle closes.
    pub cleanup_timeout_ms: u64,
    /// Upper bound on the operability probe performed by `openHub`.
    pub open_timeout_ms: u64,
    /// How long a pending program switch may take before it is abandoned.
    pub ownership_timeout_ms: u64,
    /// Protocol version reported to clients on `start`.
    pub api_version: u32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            device_timeout_ms: 100,
            cleanup_timeout_ms: 120,
            open_timeout_ms: 250,
            ownership_timeout_ms: 5_000,
            api_version: mancon_types::API_VERSION,
        }
    }
}

impl BridgeConfig {
    pub fn device_timeout(&self) -> Duration {
        Duration::from_millis(self.device_timeout_ms)
    }

    pub fn cleanup_timeout(&self) -> Duration {
        Duration::from_millis(self.cleanup_timeout_ms)
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    pub fn ownership_timeout(&self) -> Duration {
        Duration::from_millis(self.ownership_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_usb_transport() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.device_timeout(), Duration::from_millis(100));
        assert_eq!(cfg.cleanup_timeout(), Duration::from_millis(120));
        assert_eq!(cfg.api_version, mancon_types::API_VERSION);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let cfg: BridgeConfig = serde_json::from_str(r#"{"device_timeout_ms": 40}"#).unwrap();
        assert_eq!(cfg.device_timeout_ms, 40);
        assert_eq!(cfg.open_timeout_ms, 250);
    }
}
