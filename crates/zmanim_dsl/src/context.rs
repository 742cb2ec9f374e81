//! Immutable per-(date, location) evaluation context.

use chrono::{Datelike, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use zmanim_astro::{GeoLocation, SolarConfig, SunTimes};

use crate::error::DslError;

/// What to do when a depression-angle crossing does not happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoCrossingPolicy {
    /// Fail the formula with `NoCrossing`.
    #[default]
    Propagate,
    /// Substitute civil dawn or dusk; fail only if that is missing too.
    CivilTwilightFallback,
}

/// Date, place and solar settings a formula is evaluated against.
///
/// Horizon events are computed once at construction and shared by every
/// formula evaluated with this context.
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    date: NaiveDate,
    location: GeoLocation,
    utc_offset: FixedOffset,
    timezone: Option<String>,
    solar: SolarConfig,
    no_crossing: NoCrossingPolicy,
    sun: SunTimes,
}

impl EvaluationContext {
    /// Build a context with default solar settings.
    ///
    /// # Arguments
    /// * `date` - civil date in the location's time zone
    /// * `location` - observer position; validated here
    /// * `utc_offset` - offset used for display and rounding
    ///
    /// # Returns
    /// `InvalidContext` when the location is out of range.
    pub fn new(
        date: NaiveDate,
        location: GeoLocation,
        utc_offset: FixedOffset,
    ) -> Result<Self, DslError> {
        location.validate()?;
        let solar = SolarConfig::default();
        Ok(Self {
            date,
            sun: SunTimes::compute(date, &location, &solar),
            location,
            utc_offset,
            timezone: None,
            solar,
            no_crossing: NoCrossingPolicy::default(),
        })
    }

    /// Attach an IANA zone name (informational; arithmetic uses the fixed offset).
    pub fn with_timezone(mut self, name: impl Into<String>) -> Self {
        self.timezone = Some(name.into());
        self
    }

    pub fn with_solar_config(mut self, solar: SolarConfig) -> Self {
        self.sun = SunTimes::compute(self.date, &self.location, &solar);
        self.solar = solar;
        self
    }

    pub fn with_no_crossing_policy(mut self, policy: NoCrossingPolicy) -> Self {
        self.no_crossing = policy;
        self
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn location(&self) -> &GeoLocation {
        &self.location
    }

    pub fn utc_offset(&self) -> FixedOffset {
        self.utc_offset
    }

    pub fn timezone(&self) -> Option<&str> {
        self.timezone.as_deref()
    }

    pub fn solar_config(&self) -> &SolarConfig {
        &self.solar
    }

    pub fn no_crossing_policy(&self) -> NoCrossingPolicy {
        self.no_crossing
    }

    pub fn sun(&self) -> &SunTimes {
        &self.sun
    }

    /// Hemisphere-aware meteorological season name.
    pub fn season(&self) -> &'static str {
        season_for(self.date.month(), self.location.is_northern())
    }

    /// The same place and settings on another date.
    pub fn for_date(&self, date: NaiveDate) -> Self {
        Self {
            date,
            sun: SunTimes::compute(date, &self.location, &self.solar),
            location: self.location,
            utc_offset: self.utc_offset,
            timezone: self.timezone.clone(),
            solar: self.solar,
            no_crossing: self.no_crossing,
        }
    }
}

/// Season for a month; southern-hemisphere seasons are inverted.
pub fn season_for(month: u32, northern: bool) -> &'static str {
    let north = match month {
        3..=5 => "spring",
        6..=8 => "summer",
        9..=11 => "autumn",
        _ => "winter",
    };
    if northern {
        north
    } else {
        match north {
            "spring" => "autumn",
            "summer" => "winter",
            "autumn" => "spring",
            _ => "summer",
        }
    }
}
