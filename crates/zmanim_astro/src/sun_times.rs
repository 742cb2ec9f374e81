//! Daily bundle of the horizon events most formulas start from.

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::solar::{solar_noon, sun_crossing};
use crate::solar_types::{Crossing, GeoLocation, Horizon, SolarConfig, SolarResult};

/// Horizon events for one date at one location.
///
/// Computed once per evaluation context and shared by every formula
/// evaluated against it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SunTimes {
    pub date: NaiveDate,
    pub visible_sunrise: SolarResult,
    pub visible_sunset: SolarResult,
    pub geometric_sunrise: SolarResult,
    pub geometric_sunset: SolarResult,
    pub solar_noon: DateTime<Utc>,
}

impl SunTimes {
    /// Compute the horizon events for a date.
    pub fn compute(date: NaiveDate, location: &GeoLocation, config: &SolarConfig) -> Self {
        Self {
            date,
            visible_sunrise: sun_crossing(date, location, Horizon::Visible, Crossing::Rising, config),
            visible_sunset: sun_crossing(date, location, Horizon::Visible, Crossing::Setting, config),
            geometric_sunrise: sun_crossing(
                date,
                location,
                Horizon::Geometric,
                Crossing::Rising,
                config,
            ),
            geometric_sunset: sun_crossing(
                date,
                location,
                Horizon::Geometric,
                Crossing::Setting,
                config,
            ),
            solar_noon: solar_noon(date, location),
        }
    }

    /// Solar midnight preceding this date's solar noon.
    pub fn solar_midnight(&self) -> DateTime<Utc> {
        self.solar_noon - Duration::hours(12)
    }

    /// Sunrise and sunset for a horizon, if both occur.
    pub fn day_bounds(&self, horizon: Horizon) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let (rise, set) = match horizon {
            Horizon::Geometric => (self.geometric_sunrise, self.geometric_sunset),
            _ => (self.visible_sunrise, self.visible_sunset),
        };
        Some((rise.instant()?, set.instant()?))
    }

    /// Visible day length (sunrise to sunset) in minutes.
    pub fn day_length_minutes(&self) -> Option<f64> {
        let (rise, set) = self.day_bounds(Horizon::Visible)?;
        Some(minutes_between(rise, set))
    }
}

/// Signed minutes from `start` to `end`.
pub fn minutes_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_microseconds().map_or_else(
        || (end - start).num_milliseconds() as f64 / 60_000.0,
        |us| us as f64 / 60_000_000.0,
    )
}
