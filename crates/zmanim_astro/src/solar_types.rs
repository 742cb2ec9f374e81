//! Types for horizon and solar-angle crossing calculations.
//!
//! Provides the observer location, horizon definitions, configuration and
//! result types used by the crossing computation in [`crate::solar`].

use std::f64::consts::PI;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AstroError;

/// Mean Earth radius in meters (for geometric dip).
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Lowest accepted observer elevation (Dead Sea shore is about -430 m).
const MIN_ELEVATION_M: f64 = -500.0;

/// Geographic location on Earth's surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    /// Geodetic latitude in degrees, north positive. Range: [-90, 90].
    pub latitude_deg: f64,
    /// Geodetic longitude in degrees, east positive. Range: [-180, 180].
    pub longitude_deg: f64,
    /// Elevation above mean sea level in meters.
    #[serde(default)]
    pub elevation_m: f64,
}

impl GeoLocation {
    /// Create a new geographic location.
    pub fn new(latitude_deg: f64, longitude_deg: f64, elevation_m: f64) -> Self {
        Self {
            latitude_deg,
            longitude_deg,
            elevation_m,
        }
    }

    /// Latitude in radians.
    pub fn latitude_rad(&self) -> f64 {
        self.latitude_deg.to_radians()
    }

    /// Whether the location is in the northern hemisphere (equator counts as north).
    pub fn is_northern(&self) -> bool {
        self.latitude_deg >= 0.0
    }

    /// Reject coordinates that cannot describe a point on Earth.
    pub fn validate(&self) -> Result<(), AstroError> {
        if !self.latitude_deg.is_finite()
            || !self.longitude_deg.is_finite()
            || !self.elevation_m.is_finite()
        {
            return Err(AstroError::InvalidLocation("coordinates must be finite"));
        }
        if self.latitude_deg.abs() > 90.0 {
            return Err(AstroError::InvalidLocation("latitude must be within [-90, 90]"));
        }
        if self.longitude_deg.abs() > 180.0 {
            return Err(AstroError::InvalidLocation(
                "longitude must be within [-180, 180]",
            ));
        }
        if self.elevation_m < MIN_ELEVATION_M {
            return Err(AstroError::InvalidLocation("elevation below -500 m"));
        }
        Ok(())
    }
}

/// Reference horizon for a crossing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Horizon {
    /// Upper limb on the apparent horizon: refraction plus semidiameter.
    Visible,
    /// Sun center on the geometric horizon, no refraction.
    Geometric,
    /// Sun center the given number of degrees below the geometric horizon.
    Depression(f64),
}

impl Horizon {
    /// Civil twilight, sun center 6 deg below the horizon.
    pub const CIVIL: Self = Self::Depression(6.0);
    /// Nautical twilight, sun center 12 deg below the horizon.
    pub const NAUTICAL: Self = Self::Depression(12.0);
    /// Astronomical twilight, sun center 18 deg below the horizon.
    pub const ASTRONOMICAL: Self = Self::Depression(18.0);
}

/// Direction of a crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Crossing {
    /// Morning crossing (sun ascending).
    Rising,
    /// Evening crossing (sun descending).
    Setting,
}

impl Crossing {
    pub fn is_rising(self) -> bool {
        matches!(self, Self::Rising)
    }
}

/// Configurable parameters for crossing computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolarConfig {
    /// Atmospheric refraction at the horizon in arcminutes. Default: 34.0.
    pub refraction_arcmin: f64,
    /// Solar angular semi-diameter in arcminutes. Default: 16.0.
    pub semidiameter_arcmin: f64,
    /// Whether observer elevation lowers the apparent horizon.
    /// Dip approximation: sqrt(2h/R) radians. Applied to visible and
    /// depression crossings, never to the geometric horizon. Default: true.
    pub elevation_correction: bool,
}

impl Default for SolarConfig {
    fn default() -> Self {
        Self {
            refraction_arcmin: 34.0,
            semidiameter_arcmin: 16.0,
            elevation_correction: true,
        }
    }
}

impl SolarConfig {
    /// Geometric dip of the horizon in degrees for an observer elevation.
    pub fn dip_deg(&self, elevation_m: f64) -> f64 {
        if self.elevation_correction && elevation_m > 0.0 {
            (2.0 * elevation_m / EARTH_RADIUS_M).sqrt() * (180.0 / PI)
        } else {
            0.0
        }
    }

    /// Target zenith distance in degrees for a horizon at a given elevation.
    ///
    /// `zenith = 90 + depression + dip`
    pub fn zenith_deg(&self, horizon: Horizon, elevation_m: f64) -> f64 {
        match horizon {
            Horizon::Visible => {
                90.0 + (self.refraction_arcmin + self.semidiameter_arcmin) / 60.0
                    + self.dip_deg(elevation_m)
            }
            Horizon::Geometric => 90.0,
            Horizon::Depression(deg) => 90.0 + deg + self.dip_deg(elevation_m),
        }
    }
}

/// Result of a crossing computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SolarResult {
    /// The crossing occurs at the given instant.
    Event(DateTime<Utc>),
    /// The sun stays below the target altitude all day (polar night).
    NeverRises,
    /// The sun stays above the target altitude all day (midnight sun or
    /// a twilight angle that is never reached).
    NeverSets,
}

impl SolarResult {
    /// The instant, if the crossing occurs.
    pub fn instant(self) -> Option<DateTime<Utc>> {
        match self {
            Self::Event(t) => Some(t),
            Self::NeverRises | Self::NeverSets => None,
        }
    }

    /// Whether the crossing occurs.
    pub fn occurs(self) -> bool {
        matches!(self, Self::Event(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visible_zenith_sea_level() {
        let c = SolarConfig::default();
        let z = c.zenith_deg(Horizon::Visible, 0.0);
        assert!((z - (90.0 + 50.0 / 60.0)).abs() < 1e-12, "zenith = {z}");
    }

    #[test]
    fn geometric_ignores_elevation() {
        let c = SolarConfig::default();
        assert_eq!(c.zenith_deg(Horizon::Geometric, 2000.0), 90.0);
    }

    #[test]
    fn dip_1000m() {
        let c = SolarConfig::default();
        let d = c.dip_deg(1000.0);
        // sqrt(2*1000/6371000) = 0.01772 rad = 1.015 deg
        assert!(d > 0.9 && d < 1.2, "dip at 1000 m = {d}");
    }

    #[test]
    fn dip_disabled() {
        let c = SolarConfig {
            elevation_correction: false,
            ..Default::default()
        };
        assert_eq!(c.dip_deg(1000.0), 0.0);
        assert_eq!(c.zenith_deg(Horizon::Depression(16.1), 1000.0), 106.1);
    }

    #[test]
    fn depression_adds_dip() {
        let c = SolarConfig::default();
        let z = c.zenith_deg(Horizon::CIVIL, 800.0);
        assert!(z > 96.0, "civil zenith at 800 m = {z}");
    }

    #[test]
    fn location_validation() {
        assert!(GeoLocation::new(31.778, 35.235, 754.0).validate().is_ok());
        assert!(GeoLocation::new(91.0, 0.0, 0.0).validate().is_err());
        assert!(GeoLocation::new(0.0, -181.0, 0.0).validate().is_err());
        assert!(GeoLocation::new(f64::NAN, 0.0, 0.0).validate().is_err());
        assert!(GeoLocation::new(31.5, 35.5, -430.0).validate().is_ok());
        assert!(GeoLocation::new(31.5, 35.5, -600.0).validate().is_err());
    }

    #[test]
    fn hemisphere() {
        assert!(GeoLocation::new(0.0, 0.0, 0.0).is_northern());
        assert!(!GeoLocation::new(-33.9, 151.2, 0.0).is_northern());
    }

    #[test]
    fn result_instant() {
        assert!(SolarResult::NeverRises.instant().is_none());
        assert!(!SolarResult::NeverSets.occurs());
    }
}
