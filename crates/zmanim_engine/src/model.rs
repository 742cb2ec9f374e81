//! Entries, calculation options, location context and result types.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use zmanim_astro::GeoLocation;
use zmanim_dsl::{EvaluationContext, Step};

use crate::config::EngineConfig;
use crate::error::{CalculationError, EngineError};
use crate::rounding::{RoundedTime, RoundingMode};

/// Stable identifier of an entry in the external store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A tag attached to an entry. `negated` marks a "not when" tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryTag {
    pub key: String,
    #[serde(default)]
    pub negated: bool,
}

impl EntryTag {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            negated: false,
        }
    }

    pub fn negated(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            negated: true,
        }
    }
}

/// One configurable time point of a publisher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    /// Reference name used by `@key` in other formulas.
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub hebrew_name: Option<String>,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<EntryTag>,
    /// Own formula; `None` for linked entries.
    #[serde(default)]
    pub formula: Option<String>,
    #[serde(default)]
    pub linked_source_id: Option<EntryId>,
    /// Own rounding mode; `None` uses the engine default.
    #[serde(default)]
    pub rounding: Option<RoundingMode>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub published: bool,
    #[serde(default)]
    pub beta: bool,
    #[serde(default)]
    pub deleted: bool,
}

fn default_true() -> bool {
    true
}

impl Entry {
    /// Enabled, published, non-beta entry with its own formula.
    pub fn new(
        id: u64,
        key: impl Into<String>,
        category: impl Into<String>,
        formula: impl Into<String>,
    ) -> Self {
        let key = key.into();
        Self {
            id: EntryId(id),
            name: key.clone(),
            key,
            hebrew_name: None,
            category: category.into(),
            tags: Vec::new(),
            formula: Some(formula.into()),
            linked_source_id: None,
            rounding: None,
            enabled: true,
            published: true,
            beta: false,
            deleted: false,
        }
    }

    /// Entry that takes its formula from `source`.
    pub fn linked(id: u64, key: impl Into<String>, category: impl Into<String>, source: EntryId) -> Self {
        let mut e = Self::new(id, key, category, "");
        e.formula = None;
        e.linked_source_id = Some(source);
        e
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_tag(mut self, tag: EntryTag) -> Self {
        self.tags.push(tag);
        self
    }

    pub fn with_rounding(mut self, mode: RoundingMode) -> Self {
        self.rounding = Some(mode);
        self
    }

    pub fn is_linked(&self) -> bool {
        self.linked_source_id.is_some()
    }
}

/// Visibility and rounding switches for one calculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalcOptions {
    pub include_disabled: bool,
    pub include_unpublished: bool,
    pub include_beta: bool,
    pub include_deleted: bool,
    /// Replaces every entry's own rounding mode.
    pub rounding_override: Option<RoundingMode>,
    /// Skip event filtering; `active_today` is still reported.
    pub include_inactive: bool,
    /// Event codes active for the date. `None` disables event filtering.
    pub active_event_codes: Option<BTreeSet<String>>,
}

impl Default for CalcOptions {
    fn default() -> Self {
        Self {
            include_disabled: false,
            include_unpublished: false,
            include_beta: true,
            include_deleted: false,
            rounding_override: None,
            include_inactive: false,
            active_event_codes: None,
        }
    }
}

impl CalcOptions {
    pub fn with_active_events<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.active_event_codes = Some(codes.into_iter().map(Into::into).collect());
        self
    }

    /// Whether an entry passes the visibility switches.
    pub fn admits(&self, entry: &Entry) -> bool {
        (self.include_deleted || !entry.deleted)
            && (self.include_disabled || entry.enabled)
            && (self.include_unpublished || entry.published)
            && (self.include_beta || !entry.beta)
    }

    /// Override, else the entry's own mode, else `default`.
    pub fn rounding_for(&self, entry: &Entry, default: RoundingMode) -> RoundingMode {
        self.rounding_override.or(entry.rounding).unwrap_or(default)
    }
}

/// Where to calculate: coordinates plus the display offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationContext {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub elevation: f64,
    /// Offset from UTC in seconds used for local display and rounding.
    #[serde(default)]
    pub utc_offset_seconds: i32,
    #[serde(default)]
    pub timezone: Option<String>,
}

impl LocationContext {
    pub fn new(latitude: f64, longitude: f64, elevation: f64, utc_offset_seconds: i32) -> Self {
        Self {
            latitude,
            longitude,
            elevation,
            utc_offset_seconds,
            timezone: None,
        }
    }

    pub fn with_timezone(mut self, name: impl Into<String>) -> Self {
        self.timezone = Some(name.into());
        self
    }

    pub fn geo(&self) -> GeoLocation {
        GeoLocation::new(self.latitude, self.longitude, self.elevation)
    }

    pub fn offset(&self) -> Result<FixedOffset, EngineError> {
        FixedOffset::east_opt(self.utc_offset_seconds).ok_or_else(|| {
            EngineError::InvalidContext(format!("utc offset {}s out of range", self.utc_offset_seconds))
        })
    }

    /// Build the evaluation context for one date under the engine settings.
    pub fn evaluation_context(
        &self,
        date: NaiveDate,
        config: &EngineConfig,
    ) -> Result<EvaluationContext, EngineError> {
        let ctx = EvaluationContext::new(date, self.geo(), self.offset()?)
            .map_err(|e| EngineError::InvalidContext(e.to_string()))?
            .with_solar_config(config.solar)
            .with_no_crossing_policy(config.no_crossing);
        Ok(match &self.timezone {
            Some(tz) => ctx.with_timezone(tz.clone()),
            None => ctx,
        })
    }

    /// Bit-exact identity used in cache keys.
    pub(crate) fn cache_identity(&self) -> LocationKey {
        LocationKey {
            latitude_bits: self.latitude.to_bits(),
            longitude_bits: self.longitude.to_bits(),
            elevation_bits: self.elevation.to_bits(),
            utc_offset_seconds: self.utc_offset_seconds,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct LocationKey {
    latitude_bits: u64,
    longitude_bits: u64,
    elevation_bits: u64,
    utc_offset_seconds: i32,
}

/// Per-entry output of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculatedResult {
    pub entry_id: EntryId,
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub hebrew_name: Option<String>,
    pub category: String,
    pub category_priority: u32,
    pub rounding: RoundingMode,
    /// Computed time, or the reason it could not be computed.
    pub outcome: Result<RoundedTime, CalculationError>,
    /// Whether the entry's event tags match the active events.
    pub active_today: bool,
    pub from_cache: bool,
    pub linked: bool,
}

impl CalculatedResult {
    pub fn time(&self) -> Option<&RoundedTime> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&CalculationError> {
        self.outcome.as_ref().err()
    }
}

/// Counters for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    /// Formulas evaluated (cache misses that reached the evaluator).
    pub evaluations: u64,
    pub cache_hits: u64,
    pub failures: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub date: NaiveDate,
    pub results: Vec<CalculatedResult>,
    pub stats: BatchStats,
}

impl BatchResult {
    pub fn get(&self, key: &str) -> Option<&CalculatedResult> {
        self.results.iter().find(|r| r.key == key)
    }
}

/// One date of a range calculation. A day with an invalid context carries
/// `error` and no results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayResult {
    pub date: NaiveDate,
    pub results: Vec<CalculatedResult>,
    pub stats: BatchStats,
    #[serde(default)]
    pub error: Option<String>,
}

impl From<BatchResult> for DayResult {
    fn from(b: BatchResult) -> Self {
        Self {
            date: b.date,
            results: b.results,
            stats: b.stats,
            error: None,
        }
    }
}

/// Single-formula authoring preview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaPreview {
    pub formula: String,
    pub date: NaiveDate,
    pub time: RoundedTime,
    #[serde(default)]
    pub breakdown: Option<Vec<Step>>,
    pub from_cache: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_hide_everything_but_beta() {
        let opts = CalcOptions::default();
        let base = Entry::new(1, "alos", "dawn", "alos_72");
        assert!(opts.admits(&base));

        let mut e = base.clone();
        e.beta = true;
        assert!(opts.admits(&e));

        for f in [
            |e: &mut Entry| e.enabled = false,
            |e: &mut Entry| e.published = false,
            |e: &mut Entry| e.deleted = true,
        ] {
            let mut e = base.clone();
            f(&mut e);
            assert!(!opts.admits(&e));
        }
    }

    #[test]
    fn include_switches() {
        let mut e = Entry::new(1, "alos", "dawn", "alos_72");
        e.enabled = false;
        e.deleted = true;
        let opts = CalcOptions {
            include_disabled: true,
            include_deleted: true,
            ..CalcOptions::default()
        };
        assert!(opts.admits(&e));
        let no_beta = CalcOptions {
            include_beta: false,
            ..CalcOptions::default()
        };
        e.beta = true;
        assert!(!no_beta.admits(&e));
    }

    #[test]
    fn rounding_override_wins() {
        let e = Entry::new(1, "a", "dawn", "sunrise").with_rounding(RoundingMode::Ceil);
        assert_eq!(
            CalcOptions::default().rounding_for(&e, RoundingMode::Math),
            RoundingMode::Ceil
        );
        let plain = Entry::new(2, "b", "dawn", "sunset");
        assert_eq!(
            CalcOptions::default().rounding_for(&plain, RoundingMode::Floor),
            RoundingMode::Floor
        );
        let opts = CalcOptions {
            rounding_override: Some(RoundingMode::Floor),
            ..CalcOptions::default()
        };
        assert_eq!(opts.rounding_for(&e, RoundingMode::Math), RoundingMode::Floor);
    }

    #[test]
    fn entry_deserializes_with_defaults() {
        let e: Entry = serde_json::from_str(
            r#"{"id": 7, "key": "alos", "name": "Alos", "category": "dawn", "formula": "alos_72"}"#,
        )
        .unwrap();
        assert!(e.enabled && e.published && !e.beta && !e.deleted);
        assert_eq!(e.rounding, None);
        assert_eq!(e.id, EntryId(7));
    }

    #[test]
    fn location_context_rejects_bad_latitude() {
        let loc = LocationContext::new(95.0, 0.0, 0.0, 0);
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let err = loc.evaluation_context(date, &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidContext(_)));
    }

    #[test]
    fn location_context_rejects_bad_offset() {
        let loc = LocationContext::new(31.0, 35.0, 0.0, 30 * 3600);
        assert!(loc.offset().is_err());
    }
}
