//! Solar position and horizon crossings.
//!
//! Low-precision solar ephemeris from the NOAA solar calculator series
//! (declination and equation of time), accurate to well under a minute for
//! latitudes below the polar circles. Crossing times are found from the
//! hour angle at the target zenith and refined iteratively at the event
//! time, the same shape as the classical sunrise algorithm.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::solar_types::{Crossing, GeoLocation, Horizon, SolarConfig, SolarResult};

/// Maximum iterations for the crossing refinement loop.
const MAX_ITERATIONS: usize = 5;

/// Convergence threshold in minutes (0.1 seconds).
const CONVERGENCE_MINUTES: f64 = 0.1 / 60.0;

/// Julian Date of 0001-01-01 00:00 UT minus one day (`num_days_from_ce` is 1-based).
const JD_CE_EPOCH: f64 = 1_721_424.5;

/// J2000.0 epoch as a Julian Date.
const JD_J2000: f64 = 2_451_545.0;

/// Minutes in a day.
const MINUTES_PER_DAY: f64 = 1440.0;

/// Sun declination and equation of time at an instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolarCoordinates {
    /// Apparent declination in degrees.
    pub declination_deg: f64,
    /// Equation of time in minutes (apparent minus mean solar time).
    pub equation_of_time_min: f64,
}

/// Julian Date at 0h UT of a calendar date.
pub fn julian_day(date: NaiveDate) -> f64 {
    JD_CE_EPOCH + f64::from(date.num_days_from_ce())
}

/// UTC midnight at the start of a calendar date.
pub fn utc_midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

fn julian_centuries(jd: f64) -> f64 {
    (jd - JD_J2000) / 36_525.0
}

/// Compute solar declination and equation of time at a Julian Date.
pub fn solar_coordinates(jd: f64) -> SolarCoordinates {
    let t = julian_centuries(jd);

    let mean_long = (280.466_46 + t * (36_000.769_83 + t * 0.000_303_2)).rem_euclid(360.0);
    let mean_anom = 357.529_11 + t * (35_999.050_29 - 0.000_153_7 * t);
    let ecc = 0.016_708_634 - t * (0.000_042_037 + 0.000_000_126_7 * t);

    let m = mean_anom.to_radians();
    let center = m.sin() * (1.914_602 - t * (0.004_817 + 0.000_014 * t))
        + (2.0 * m).sin() * (0.019_993 - 0.000_101 * t)
        + (3.0 * m).sin() * 0.000_289;
    let true_long = mean_long + center;

    let omega = (125.04 - 1_934.136 * t).to_radians();
    let apparent_long = true_long - 0.005_69 - 0.004_78 * omega.sin();

    let seconds = 21.448 - t * (46.815 + t * (0.000_59 - t * 0.001_813));
    let mean_obliquity = 23.0 + (26.0 + seconds / 60.0) / 60.0;
    let obliquity = (mean_obliquity + 0.002_56 * omega.cos()).to_radians();

    let declination = (obliquity.sin() * apparent_long.to_radians().sin()).asin();

    let y = (obliquity / 2.0).tan().powi(2);
    let l0 = mean_long.to_radians();
    let eot_rad = y * (2.0 * l0).sin() - 2.0 * ecc * m.sin()
        + 4.0 * ecc * y * m.sin() * (2.0 * l0).cos()
        - 0.5 * y * y * (4.0 * l0).sin()
        - 1.25 * ecc * ecc * (2.0 * m).sin();

    SolarCoordinates {
        declination_deg: declination.to_degrees(),
        equation_of_time_min: 4.0 * eot_rad.to_degrees(),
    }
}

/// Cosine of the hour angle at which the sun reaches a zenith distance.
///
/// `cos(H) = [cos(z) - sin(phi) sin(dec)] / [cos(phi) cos(dec)]`
///
/// Values above 1 mean the zenith is never reached from above (the sun
/// stays below), values below -1 mean the sun never descends that far.
pub fn cos_hour_angle(latitude_deg: f64, declination_deg: f64, zenith_deg: f64) -> f64 {
    let phi = latitude_deg.to_radians();
    let dec = declination_deg.to_radians();
    (zenith_deg.to_radians().cos() - phi.sin() * dec.sin()) / (phi.cos() * dec.cos())
}

fn minutes_to_instant(date: NaiveDate, minutes: f64) -> DateTime<Utc> {
    utc_midnight(date) + Duration::microseconds((minutes * 60_000_000.0).round() as i64)
}

/// Solar noon (upper meridian transit) in minutes after 0h UT of `date`.
fn solar_noon_minutes(date: NaiveDate, longitude_deg: f64) -> f64 {
    let jd0 = julian_day(date);
    let mut noon = 720.0 - 4.0 * longitude_deg;
    for _ in 0..MAX_ITERATIONS {
        let coords = solar_coordinates(jd0 + noon / MINUTES_PER_DAY);
        let next = 720.0 - 4.0 * longitude_deg - coords.equation_of_time_min;
        let delta = next - noon;
        noon = next;
        if delta.abs() < CONVERGENCE_MINUTES {
            break;
        }
    }
    noon
}

/// Solar noon for a calendar date at a location.
pub fn solar_noon(date: NaiveDate, location: &GeoLocation) -> DateTime<Utc> {
    minutes_to_instant(date, solar_noon_minutes(date, location.longitude_deg))
}

/// Solar midnight preceding the solar noon of `date` (noon minus 12 hours).
pub fn solar_midnight(date: NaiveDate, location: &GeoLocation) -> DateTime<Utc> {
    solar_noon(date, location) - Duration::hours(12)
}

/// Compute a single horizon or angle crossing for a calendar date.
///
/// # Arguments
/// * `date` - local calendar date at the location
/// * `location` - observer geographic location
/// * `horizon` - visible, geometric, or an angle below the horizon
/// * `crossing` - morning (rising) or evening (setting)
/// * `config` - refraction, semidiameter and elevation parameters
///
/// # Returns
/// * `SolarResult::Event` with the crossing instant in UTC
/// * `SolarResult::NeverRises` if the sun stays below the target altitude
/// * `SolarResult::NeverSets` if the sun stays above the target altitude
pub fn sun_crossing(
    date: NaiveDate,
    location: &GeoLocation,
    horizon: Horizon,
    crossing: Crossing,
    config: &SolarConfig,
) -> SolarResult {
    let jd0 = julian_day(date);
    let zenith = config.zenith_deg(horizon, location.elevation_m);
    let noon = solar_noon_minutes(date, location.longitude_deg);

    let mut event = noon;
    for _ in 0..MAX_ITERATIONS {
        let coords = solar_coordinates(jd0 + event / MINUTES_PER_DAY);
        let cos_h = cos_hour_angle(location.latitude_deg, coords.declination_deg, zenith);
        if cos_h > 1.0 {
            return SolarResult::NeverRises;
        }
        if cos_h < -1.0 {
            return SolarResult::NeverSets;
        }
        let h_deg = cos_h.acos().to_degrees();

        let transit = 720.0 - 4.0 * location.longitude_deg - coords.equation_of_time_min;
        let next = if crossing.is_rising() {
            transit - 4.0 * h_deg
        } else {
            transit + 4.0 * h_deg
        };
        let delta = next - event;
        event = next;
        if delta.abs() < CONVERGENCE_MINUTES {
            break;
        }
    }

    SolarResult::Event(minutes_to_instant(date, event))
}

/// Sun altitude above the geometric horizon in degrees at an instant.
///
/// Used to sanity-check crossings; no refraction is applied.
pub fn solar_altitude_deg(instant: DateTime<Utc>, location: &GeoLocation) -> f64 {
    let date = instant.date_naive();
    let minutes = (instant - utc_midnight(date)).num_microseconds().unwrap_or(0) as f64 / 60e6;
    let coords = solar_coordinates(julian_day(date) + minutes / MINUTES_PER_DAY);

    let true_solar_minutes =
        minutes + coords.equation_of_time_min + 4.0 * location.longitude_deg;
    let hour_angle = (true_solar_minutes / 4.0 - 180.0).to_radians();

    let phi = location.latitude_rad();
    let dec = coords.declination_deg.to_radians();
    let cos_zenith = phi.sin() * dec.sin() + phi.cos() * dec.cos() * hour_angle.cos();
    90.0 - cos_zenith.clamp(-1.0, 1.0).acos().to_degrees()
}
