//! Bridge configuration.

use serde::Deserialize;

use super::error::{BridgeError, BridgeResult};

/// Configuration for the reference registry and boundary contexts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// Locals a frame is expected to hold. Exceeding it logs a warning.
    pub local_frame_capacity: usize,
    /// Maximum live global handles across all contexts.
    pub max_global_refs: usize,
    /// Maximum live weak handles across all contexts.
    pub max_weak_refs: usize,
    /// Exception kind used when a native error is raised into foreign code.
    pub native_error_kind: String,
    /// Log every crossing call at debug level.
    pub trace_crossings: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            local_frame_capacity: 16,
            max_global_refs: 51_200,
            max_weak_refs: 51_200,
            native_error_kind: "java/lang/RuntimeException".to_string(),
            trace_crossings: false,
        }
    }
}

impl BridgeConfig {
    /// Parse a JSON configuration; missing fields take their defaults.
    pub fn from_json(json: &str) -> BridgeResult<Self> {
        let config: BridgeConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> BridgeResult<()> {
        if self.max_global_refs == 0 || self.max_weak_refs == 0 {
            return Err(BridgeError::Config(
                "reference table limits must be non-zero".to_string(),
            ));
        }
        if self.native_error_kind.is_empty() {
            return Err(BridgeError::Config("native_error_kind is empty".to_string()));
        }
        Ok(())
    }
}
