//! Astronomical primitives for zmanim calculation.
//!
//! This crate provides:
//! - Solar declination and equation of time (NOAA series)
//! - Horizon and solar-angle crossings with elevation dip
//! - The per-date [`SunTimes`] bundle (sunrise, sunset, solar noon)
//! - Proportional-hour subdivisions and the seasonal angle method
//!
//! All functions are pure and CPU-bound; nothing here performs I/O.

pub mod error;
pub mod proportional;
pub mod solar;
pub mod solar_types;
pub mod sun_times;

pub use error::AstroError;
pub use proportional::{
    add_minutes, midpoint, proportional_hour_minutes, proportional_time, seasonal_crossing,
};
pub use solar::{
    SolarCoordinates, cos_hour_angle, julian_day, solar_altitude_deg, solar_coordinates,
    solar_midnight, solar_noon, sun_crossing, utc_midnight,
};
pub use solar_types::{Crossing, GeoLocation, Horizon, SolarConfig, SolarResult};
pub use sun_times::{SunTimes, minutes_between};
