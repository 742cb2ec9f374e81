use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use zmanim_engine::EngineConfig;

use crate::error::ServiceError;

/// Service settings; the engine's own settings live under `[engine]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Limit for each collaborator call.
    pub collaborator_timeout_ms: u64,
    /// Event lookups in flight at once during a range.
    pub event_concurrency: usize,
    pub engine: EngineConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            collaborator_timeout_ms: 2_000,
            event_concurrency: 8,
            engine: EngineConfig::default(),
        }
    }
}

impl ServiceConfig {
    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_millis(self.collaborator_timeout_ms)
    }

    pub fn from_toml_str(src: &str) -> Result<Self, ServiceError> {
        let config: Self = toml::from_str(src).map_err(|e| ServiceError::ConfigLoad(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ServiceError> {
        let src = std::fs::read_to_string(path)
            .map_err(|e| ServiceError::ConfigLoad(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&src)
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.collaborator_timeout_ms == 0 {
            return Err(ServiceError::InvalidConfig(
                "collaborator_timeout_ms must be greater than zero",
            ));
        }
        if self.event_concurrency == 0 {
            return Err(ServiceError::InvalidConfig(
                "event_concurrency must be greater than zero",
            ));
        }
        self.engine.validate()?;
        Ok(())
    }
}
