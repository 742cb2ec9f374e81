//! Calculation engine for publisher zmanim.
//!
//! Given a publisher's entries, a location and a date, [`Engine`] resolves
//! formula links, evaluates formulas in reference order, rounds, filters by
//! active calendar events and sorts for display. Successful results are
//! kept in a permanent cache that is invalidated per formula owner when a
//! formula changes.
//!
//! ```
//! use chrono::NaiveDate;
//! use zmanim_engine::{CalcOptions, Engine, EngineConfig, Entry, LocationContext};
//!
//! let engine = Engine::new(EngineConfig::default()).unwrap();
//! let entries = vec![
//!     Entry::new(1, "alos", "dawn", "alos_72"),
//!     Entry::new(2, "sunset", "sunset", "visible_sunset"),
//! ];
//! let location = LocationContext::new(31.778, 35.235, 0.0, 2 * 3600);
//! let date = NaiveDate::from_ymd_opt(2024, 3, 20).unwrap();
//! let batch = engine
//!     .calculate_batch(&entries, &location, date, &CalcOptions::default())
//!     .unwrap();
//! assert_eq!(batch.results[0].key, "alos");
//! ```

pub mod cache;
pub mod calculator;
pub mod config;
pub mod error;
pub mod filter;
pub mod linking;
pub mod model;
pub mod ordering;
pub mod rounding;

pub use cache::{CacheKey, CacheStats, PreviewCache, ResultCache};
pub use calculator::{DateRange, Engine};
pub use config::EngineConfig;
pub use error::{CalculationError, CalculationErrorKind, EngineError};
pub use filter::TagMappings;
pub use linking::{
    EffectiveFormula, EntryIndex, FormulaIdentity, LinkError, LinkMode, formula_digest, link_or_copy,
    resolve_effective_formula,
};
pub use model::{
    BatchResult, BatchStats, CalcOptions, CalculatedResult, DayResult, Entry, EntryId, EntryTag,
    FormulaPreview, LocationContext,
};
pub use ordering::CategoryOrder;
pub use rounding::{RoundedTime, RoundingMode, apply_rounding};
