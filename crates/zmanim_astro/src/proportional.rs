//! Proportional ("seasonal") time subdivisions.
//!
//! A proportional hour is one twelfth of the interval between two reference
//! instants. The seasonal angle method scales an equinox-day angle offset by
//! the ratio of the current day length to the equinox day length.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};

use crate::error::AstroError;
use crate::solar::sun_crossing;
use crate::solar_types::{Crossing, GeoLocation, Horizon, SolarConfig, SolarResult};
use crate::sun_times::{SunTimes, minutes_between};

/// Month and day of the reference equinox for the seasonal method.
const EQUINOX_MONTH: u32 = 3;
const EQUINOX_DAY: u32 = 20;

/// Shift an instant by a fractional number of minutes.
///
/// Fails when the offset is not finite or the result leaves the
/// representable range.
pub fn add_minutes(t: DateTime<Utc>, minutes: f64) -> Result<DateTime<Utc>, AstroError> {
    let micros = (minutes * 60_000_000.0).round();
    if !micros.is_finite() || micros.abs() >= i64::MAX as f64 {
        return Err(AstroError::OutOfRange(format!("{minutes} minutes")));
    }
    t.checked_add_signed(Duration::microseconds(micros as i64))
        .ok_or_else(|| AstroError::OutOfRange(format!("{t} shifted by {minutes} minutes")))
}

/// Instant `hours` proportional hours after `start` in the day `start..end`.
///
/// `start + (end - start) / 12 * hours`
pub fn proportional_time(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    hours: f64,
) -> Result<DateTime<Utc>, AstroError> {
    if end <= start {
        return Err(AstroError::InvalidInterval("day end must follow day start"));
    }
    let hour_minutes = minutes_between(start, end) / 12.0;
    add_minutes(start, hour_minutes * hours)
}

/// Length of one proportional hour in minutes for the day `start..end`.
pub fn proportional_hour_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    minutes_between(start, end) / 12.0
}

/// Instant halfway between two instants (order independent).
pub fn midpoint(a: DateTime<Utc>, b: DateTime<Utc>) -> DateTime<Utc> {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    // never past `hi`
    lo + (hi - lo) / 2
}

/// Seasonal angle crossing.
///
/// Measures how many minutes the `degrees` crossing lies before sunrise
/// (or after sunset) at the equinox, scales that offset by
/// `day_length(date) / day_length(equinox)`, and applies it to the date's
/// own sunrise or sunset. `horizon` selects visible or geometric sunrise.
pub fn seasonal_crossing(
    date: NaiveDate,
    location: &GeoLocation,
    degrees: f64,
    horizon: Horizon,
    crossing: Crossing,
    config: &SolarConfig,
) -> Result<SolarResult, AstroError> {
    let equinox = NaiveDate::from_ymd_opt(date.year(), EQUINOX_MONTH, EQUINOX_DAY)
        .ok_or_else(|| AstroError::InvalidDate(format!("no equinox for {date}")))?;

    let today = SunTimes::compute(date, location, config);
    let reference = SunTimes::compute(equinox, location, config);

    let (Some((rise, set)), Some((eq_rise, eq_set))) =
        (today.day_bounds(horizon), reference.day_bounds(horizon))
    else {
        return Ok(SolarResult::NeverRises);
    };

    let angle = sun_crossing(equinox, location, Horizon::Depression(degrees), crossing, config);
    let Some(eq_angle) = angle.instant() else {
        return Ok(angle);
    };

    let ratio = minutes_between(rise, set) / minutes_between(eq_rise, eq_set);
    let t = match crossing {
        Crossing::Rising => add_minutes(rise, -minutes_between(eq_angle, eq_rise) * ratio)?,
        Crossing::Setting => add_minutes(set, minutes_between(eq_set, eq_angle) * ratio)?,
    };
    Ok(SolarResult::Event(t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 20, h, m, s).unwrap()
    }

    #[test]
    fn twelve_hour_day_hours_are_sixty_minutes() {
        let start = t(6, 0, 0);
        let end = t(18, 0, 0);
        assert_eq!(proportional_time(start, end, 3.0).unwrap(), t(9, 0, 0));
        assert_eq!(proportional_time(start, end, 6.0).unwrap(), t(12, 0, 0));
    }

    #[test]
    fn long_day_hours_stretch() {
        let start = t(5, 0, 0);
        let end = t(20, 0, 0);
        // 15 h day: one hour = 75 min
        assert_eq!(proportional_hour_minutes(start, end), 75.0);
        assert_eq!(proportional_time(start, end, 4.0).unwrap(), t(10, 0, 0));
    }

    #[test]
    fn inverted_interval_rejected() {
        assert!(proportional_time(t(18, 0, 0), t(6, 0, 0), 3.0).is_err());
    }

    #[test]
    fn huge_hour_counts_are_errors() {
        let start = t(6, 0, 0);
        let end = t(18, 0, 0);
        assert!(matches!(
            proportional_time(start, end, 1e10),
            Err(AstroError::OutOfRange(_))
        ));
        assert!(matches!(
            proportional_time(start, end, f64::INFINITY),
            Err(AstroError::OutOfRange(_))
        ));
        assert!(matches!(add_minutes(start, f64::NAN), Err(AstroError::OutOfRange(_))));
        assert_eq!(add_minutes(start, -30.0).unwrap(), t(5, 30, 0));
    }

    #[test]
    fn midpoint_order_independent() {
        let a = t(6, 0, 0);
        let b = t(7, 0, 30);
        assert_eq!(midpoint(a, b), t(6, 30, 15));
        assert_eq!(midpoint(b, a), t(6, 30, 15));
    }

    #[test]
    fn seasonal_equals_plain_at_equinox() {
        let loc = GeoLocation::new(31.778, 35.235, 0.0);
        let cfg = SolarConfig::default();
        let d = NaiveDate::from_ymd_opt(2024, 3, 20).unwrap();
        let seasonal = seasonal_crossing(d, &loc, 16.1, Horizon::Visible, Crossing::Rising, &cfg)
            .unwrap()
            .instant()
            .unwrap();
        let plain = sun_crossing(d, &loc, Horizon::Depression(16.1), Crossing::Rising, &cfg)
            .instant()
            .unwrap();
        assert!((minutes_between(plain, seasonal)).abs() < 1e-3);
    }

    #[test]
    fn seasonal_offset_scales_with_day_length() {
        let loc = GeoLocation::new(31.778, 35.235, 0.0);
        let cfg = SolarConfig::default();
        let summer = NaiveDate::from_ymd_opt(2024, 6, 21).unwrap();
        let st = SunTimes::compute(summer, &loc, &cfg);
        let (rise, _) = st.day_bounds(Horizon::Visible).unwrap();
        let seasonal = seasonal_crossing(summer, &loc, 16.1, Horizon::Visible, Crossing::Rising, &cfg)
            .unwrap()
            .instant()
            .unwrap();
        // Longer summer day: the seasonal offset exceeds the equinox offset.
        let offset = minutes_between(seasonal, rise);
        assert!(offset > 70.0 && offset < 95.0, "summer seasonal offset = {offset}");
    }
}
