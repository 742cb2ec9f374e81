//! Engine configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use zmanim_astro::SolarConfig;
use zmanim_dsl::NoCrossingPolicy;

use crate::error::EngineError;
use crate::ordering::{CategoryOrder, DEFAULT_CATEGORIES, UNKNOWN_CATEGORY_PRIORITY};
use crate::rounding::RoundingMode;

/// Engine configuration used at startup time.
///
/// Every field has a default, so a TOML file only needs the values it
/// changes:
///
/// ```toml
/// no_crossing = "civil_twilight_fallback"
/// max_range_days = 31
///
/// [solar]
/// elevation_correction = false
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Categories in display order; priority is position + 1.
    pub category_order: Vec<String>,
    pub unknown_category_priority: u32,
    /// Rounding for entries that do not set their own.
    pub default_rounding: RoundingMode,
    pub no_crossing: NoCrossingPolicy,
    pub solar: SolarConfig,
    /// Longest accepted range, inclusive of both ends.
    pub max_range_days: u32,
    /// Worker threads for range calculation; 0 uses available parallelism.
    pub range_workers: usize,
    pub preview_cache_capacity: usize,
    pub preview_ttl_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            category_order: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
            unknown_category_priority: UNKNOWN_CATEGORY_PRIORITY,
            default_rounding: RoundingMode::Math,
            no_crossing: NoCrossingPolicy::Propagate,
            solar: SolarConfig::default(),
            max_range_days: 366,
            range_workers: 0,
            preview_cache_capacity: 256,
            preview_ttl_secs: 300,
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document; missing fields take their defaults.
    pub fn from_toml_str(src: &str) -> Result<Self, EngineError> {
        let config: Self = toml::from_str(src).map_err(|e| EngineError::ConfigLoad(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let src = std::fs::read_to_string(path)
            .map_err(|e| EngineError::ConfigLoad(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&src)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.category_order.is_empty() {
            return Err(EngineError::InvalidConfig("category_order must not be empty"));
        }
        if self.category_order.iter().any(|c| c.trim().is_empty()) {
            return Err(EngineError::InvalidConfig(
                "category_order must not contain empty names",
            ));
        }
        let mut seen = std::collections::HashSet::new();
        if !self.category_order.iter().all(|c| seen.insert(c)) {
            return Err(EngineError::InvalidConfig(
                "category_order must not contain duplicates",
            ));
        }
        if (self.unknown_category_priority as usize) <= self.category_order.len() {
            return Err(EngineError::InvalidConfig(
                "unknown_category_priority must sort after every configured category",
            ));
        }
        if self.max_range_days == 0 {
            return Err(EngineError::InvalidConfig(
                "max_range_days must be greater than zero",
            ));
        }
        if !self.solar.refraction_arcmin.is_finite() || !self.solar.semidiameter_arcmin.is_finite() {
            return Err(EngineError::InvalidConfig("solar parameters must be finite"));
        }
        Ok(())
    }

    pub fn category_order(&self) -> CategoryOrder {
        CategoryOrder::new(self.category_order.iter().cloned(), self.unknown_category_priority)
    }

    /// Worker count for range calculation.
    pub fn workers(&self) -> usize {
        if self.range_workers > 0 {
            return self.range_workers;
        }
        std::thread::available_parallelism().map_or(1, |n| n.get())
    }
}
