//! Minute rounding of computed instants.
//!
//! Rounding happens on local wall-clock time so minute boundaries line up
//! with what a reader sees, then converts back to UTC.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// How an exact instant is turned into a minute-granularity time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundingMode {
    /// Truncate to the minute.
    Floor,
    /// Advance to the next minute when any seconds remain.
    Ceil,
    /// Advance when seconds >= 30, else truncate.
    #[default]
    Math,
}

impl RoundingMode {
    pub const ALL: [Self; 3] = [Self::Floor, Self::Ceil, Self::Math];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Floor => "floor",
            Self::Ceil => "ceil",
            Self::Math => "math",
        }
    }
}

impl fmt::Display for RoundingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RoundingMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| EngineError::InvalidRounding(s.to_string()))
    }
}

/// Exact, rounded and display forms of one computed instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundedTime {
    /// Unrounded instant.
    pub exact: DateTime<Utc>,
    /// Minute-aligned instant after applying the mode.
    pub rounded: DateTime<Utc>,
    pub mode: RoundingMode,
    /// Exact local time, `HH:MM:SS`.
    pub exact_local: String,
    /// Rounded local time, `HH:MM:SS` (seconds always `00`).
    pub rounded_local: String,
    /// Rounded local time without seconds, `HH:MM`.
    pub display: String,
    /// 1 when rounding crossed local midnight, else 0.
    pub day_offset: i8,
}

fn truncate_to_minute(t: NaiveDateTime) -> NaiveDateTime {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

/// Round a local wall-clock time to the minute.
pub fn round_local(t: NaiveDateTime, mode: RoundingMode) -> NaiveDateTime {
    let floor = truncate_to_minute(t);
    let advance = match mode {
        RoundingMode::Floor => false,
        RoundingMode::Ceil => t.second() > 0 || t.nanosecond() > 0,
        RoundingMode::Math => t.second() >= 30,
    };
    if advance {
        floor + Duration::minutes(1)
    } else {
        floor
    }
}

/// Apply a rounding mode to an instant, displayed at `offset`.
///
/// # Arguments
/// * `instant` - exact computed time
/// * `mode` - rounding policy
/// * `offset` - local offset of the location
///
/// # Returns
/// All three representations plus the midnight rollover marker.
pub fn apply_rounding(instant: DateTime<Utc>, mode: RoundingMode, offset: FixedOffset) -> RoundedTime {
    let local = instant.with_timezone(&offset).naive_local();
    let rounded_local = round_local(local, mode);
    let rounded = rounded_local - offset_duration(offset);
    let day_offset = if rounded_local.date() > local.date() { 1 } else { 0 };
    RoundedTime {
        exact: instant,
        rounded: DateTime::from_naive_utc_and_offset(rounded, Utc),
        mode,
        exact_local: local.format("%H:%M:%S").to_string(),
        rounded_local: rounded_local.format("%H:%M:%S").to_string(),
        display: rounded_local.format("%H:%M").to_string(),
        day_offset,
    }
}

fn offset_duration(offset: FixedOffset) -> Duration {
    Duration::seconds(i64::from(offset.local_minus_utc()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn utc_hms(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 20, h, m, s).unwrap()
    }

    fn round(h: u32, m: u32, s: u32, mode: RoundingMode) -> RoundedTime {
        apply_rounding(utc_hms(h, m, s), mode, FixedOffset::east_opt(0).unwrap())
    }

    #[test]
    fn floor_truncates() {
        assert_eq!(round(6, 42, 59, RoundingMode::Floor).rounded_local, "06:42:00");
    }

    #[test]
    fn ceil_advances_only_with_remainder() {
        assert_eq!(round(6, 42, 0, RoundingMode::Ceil).rounded_local, "06:42:00");
        assert_eq!(round(6, 42, 1, RoundingMode::Ceil).rounded_local, "06:43:00");
    }

    #[test]
    fn ceil_sees_subsecond_remainder() {
        let t = utc_hms(6, 42, 0) + Duration::milliseconds(1);
        let r = apply_rounding(t, RoundingMode::Ceil, FixedOffset::east_opt(0).unwrap());
        assert_eq!(r.display, "06:43");
    }

    #[test]
    fn math_half_up() {
        assert_eq!(round(6, 42, 29, RoundingMode::Math).rounded_local, "06:42:00");
        assert_eq!(round(6, 42, 30, RoundingMode::Math).rounded_local, "06:43:00");
    }

    #[test]
    fn math_rolls_over_midnight() {
        let r = round(23, 59, 30, RoundingMode::Math);
        assert_eq!(r.rounded_local, "00:00:00");
        assert_eq!(r.display, "00:00");
        assert_eq!(r.day_offset, 1);
        assert_eq!(r.rounded, Utc.with_ymd_and_hms(2024, 3, 21, 0, 0, 0).unwrap());
    }

    #[test]
    fn display_drops_seconds_of_rounded() {
        let r = round(6, 42, 45, RoundingMode::Floor);
        assert_eq!(r.exact_local, "06:42:45");
        assert_eq!(r.display, "06:42");
        assert_eq!(r.day_offset, 0);
    }

    #[test]
    fn local_offset_applied() {
        let r = apply_rounding(
            utc_hms(3, 42, 30),
            RoundingMode::Math,
            FixedOffset::east_opt(2 * 3600).unwrap(),
        );
        assert_eq!(r.exact_local, "05:42:30");
        assert_eq!(r.display, "05:43");
        assert_eq!(r.rounded, utc_hms(3, 43, 0));
    }

    #[test]
    fn rounded_never_precedes_floor_nor_exceeds_a_minute() {
        for mode in RoundingMode::ALL {
            for s in [0, 1, 29, 30, 59] {
                let r = round(12, 0, s, mode);
                let delta = (r.rounded - r.exact).num_seconds();
                assert!((-59..=60).contains(&delta), "{mode} {s}: {delta}");
            }
        }
    }

    #[test]
    fn parse_and_display() {
        assert_eq!("CEIL".parse::<RoundingMode>().unwrap(), RoundingMode::Ceil);
        assert_eq!(RoundingMode::default().to_string(), "math");
        assert!("nearest".parse::<RoundingMode>().is_err());
        let json = serde_json::to_string(&RoundingMode::Floor).unwrap();
        assert_eq!(json, "\"floor\"");
    }

    #[test]
    fn round_local_naive() {
        let t = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(10, 15, 31)
            .unwrap();
        assert_eq!(round_local(t, RoundingMode::Math).minute(), 16);
    }
}
