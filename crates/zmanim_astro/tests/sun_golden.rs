//! Golden sunrise/sunset values against published almanac times.
//!
//! Reference times are the USNO / timeanddate.com almanac values at sea
//! level, quoted to the minute. The NOAA series agrees to within about a
//! minute at these latitudes, so comparisons use a two-minute tolerance.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use zmanim_astro::{
    Crossing, GeoLocation, Horizon, SolarConfig, SolarResult, SunTimes, minutes_between,
    sun_crossing,
};

const TOLERANCE_MIN: f64 = 2.0;

fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

fn assert_near(label: &str, got: DateTime<Utc>, want: DateTime<Utc>) {
    let diff = minutes_between(want, got);
    assert!(
        diff.abs() < TOLERANCE_MIN,
        "{label}: got {got}, want {want} (diff {diff:.2} min)"
    );
}

#[test]
fn new_york_december() {
    // 2025-12-07: sunrise 07:06 EST, sunset 16:28 EST
    let loc = GeoLocation::new(40.7128, -74.006, 0.0);
    let d = NaiveDate::from_ymd_opt(2025, 12, 7).unwrap();
    let st = SunTimes::compute(d, &loc, &SolarConfig::default());
    assert_near("sunrise", st.visible_sunrise.instant().unwrap(), utc(2025, 12, 7, 12, 6));
    assert_near("sunset", st.visible_sunset.instant().unwrap(), utc(2025, 12, 7, 21, 28));
}

#[test]
fn jerusalem_equinox() {
    // 2024-03-20: sunrise 05:42 IST, sunset 17:50 IST (UTC+2), sea level
    let loc = GeoLocation::new(31.778, 35.235, 0.0);
    let d = NaiveDate::from_ymd_opt(2024, 3, 20).unwrap();
    let st = SunTimes::compute(d, &loc, &SolarConfig::default());
    assert_near("sunrise", st.visible_sunrise.instant().unwrap(), utc(2024, 3, 20, 3, 42));
    assert_near("sunset", st.visible_sunset.instant().unwrap(), utc(2024, 3, 20, 15, 50));
    assert_near("noon", st.solar_noon, utc(2024, 3, 20, 9, 46));
}

#[test]
fn london_summer_solstice() {
    // 2024-06-21: sunrise 04:43 BST, sunset 21:21 BST (UTC+1)
    let loc = GeoLocation::new(51.5074, -0.1278, 0.0);
    let d = NaiveDate::from_ymd_opt(2024, 6, 21).unwrap();
    let st = SunTimes::compute(d, &loc, &SolarConfig::default());
    assert_near("sunrise", st.visible_sunrise.instant().unwrap(), utc(2024, 6, 21, 3, 43));
    assert_near("sunset", st.visible_sunset.instant().unwrap(), utc(2024, 6, 21, 20, 21));
}

#[test]
fn jerusalem_dawn_and_nightfall_angles() {
    // Alos 16.1 deg and tzeis 8.5 deg at the equinox, sea level:
    // about 72 min before sunrise and 36 min after sunset.
    let loc = GeoLocation::new(31.778, 35.235, 0.0);
    let cfg = SolarConfig::default();
    let d = NaiveDate::from_ymd_opt(2024, 3, 20).unwrap();
    let alos = sun_crossing(d, &loc, Horizon::Depression(16.1), Crossing::Rising, &cfg)
        .instant()
        .unwrap();
    let tzeis = sun_crossing(d, &loc, Horizon::Depression(8.5), Crossing::Setting, &cfg)
        .instant()
        .unwrap();
    assert_near("alos 16.1", alos, utc(2024, 3, 20, 2, 30));
    assert_near("tzeis 8.5", tzeis, utc(2024, 3, 20, 16, 27));
}

#[test]
fn svalbard_polar_cases() {
    let loc = GeoLocation::new(78.2232, 15.6267, 0.0);
    let cfg = SolarConfig::default();
    let winter = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
    let summer = NaiveDate::from_ymd_opt(2024, 6, 5).unwrap();
    assert_eq!(
        sun_crossing(winter, &loc, Horizon::Visible, Crossing::Rising, &cfg),
        SolarResult::NeverRises
    );
    assert_eq!(
        sun_crossing(summer, &loc, Horizon::Visible, Crossing::Setting, &cfg),
        SolarResult::NeverSets
    );
}
