//! Vocabulary of the formula language.
//!
//! Every keyword the lexer recognizes lives in one of these tables. Each
//! enum carries its canonical spelling, a `from_name` lookup (aliases
//! included) and an `ALL` list for documentation and completion.

use serde::{Deserialize, Serialize};
use zmanim_astro::{Crossing, Horizon};

use crate::ast::{Base, Call, Expr};

/// Astronomical primitives addressable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Primitive {
    VisibleSunrise,
    VisibleSunset,
    GeometricSunrise,
    GeometricSunset,
    SolarNoon,
    SolarMidnight,
    CivilDawn,
    CivilDusk,
    NauticalDawn,
    NauticalDusk,
    AstronomicalDawn,
    AstronomicalDusk,
}

impl Primitive {
    pub const ALL: [Self; 12] = [
        Self::VisibleSunrise,
        Self::VisibleSunset,
        Self::GeometricSunrise,
        Self::GeometricSunset,
        Self::SolarNoon,
        Self::SolarMidnight,
        Self::CivilDawn,
        Self::CivilDusk,
        Self::NauticalDawn,
        Self::NauticalDusk,
        Self::AstronomicalDawn,
        Self::AstronomicalDusk,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::VisibleSunrise => "visible_sunrise",
            Self::VisibleSunset => "visible_sunset",
            Self::GeometricSunrise => "geometric_sunrise",
            Self::GeometricSunset => "geometric_sunset",
            Self::SolarNoon => "solar_noon",
            Self::SolarMidnight => "solar_midnight",
            Self::CivilDawn => "civil_dawn",
            Self::CivilDusk => "civil_dusk",
            Self::NauticalDawn => "nautical_dawn",
            Self::NauticalDusk => "nautical_dusk",
            Self::AstronomicalDawn => "astronomical_dawn",
            Self::AstronomicalDusk => "astronomical_dusk",
        }
    }

    /// Look up a primitive by name, including the legacy aliases
    /// `sunrise`, `sunset`, `netz`, `shkia` and `chatzos`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sunrise" | "netz" => Some(Self::VisibleSunrise),
            "sunset" | "shkia" => Some(Self::VisibleSunset),
            "chatzos" => Some(Self::SolarNoon),
            "chatzos_layla" => Some(Self::SolarMidnight),
            _ => Self::ALL.into_iter().find(|p| p.name() == name),
        }
    }

    /// The horizon and direction of a crossing primitive; `None` for noon and midnight.
    pub fn crossing(self) -> Option<(Horizon, Crossing)> {
        match self {
            Self::VisibleSunrise => Some((Horizon::Visible, Crossing::Rising)),
            Self::VisibleSunset => Some((Horizon::Visible, Crossing::Setting)),
            Self::GeometricSunrise => Some((Horizon::Geometric, Crossing::Rising)),
            Self::GeometricSunset => Some((Horizon::Geometric, Crossing::Setting)),
            Self::CivilDawn => Some((Horizon::CIVIL, Crossing::Rising)),
            Self::CivilDusk => Some((Horizon::CIVIL, Crossing::Setting)),
            Self::NauticalDawn => Some((Horizon::NAUTICAL, Crossing::Rising)),
            Self::NauticalDusk => Some((Horizon::NAUTICAL, Crossing::Setting)),
            Self::AstronomicalDawn => Some((Horizon::ASTRONOMICAL, Crossing::Rising)),
            Self::AstronomicalDusk => Some((Horizon::ASTRONOMICAL, Crossing::Setting)),
            Self::SolarNoon | Self::SolarMidnight => None,
        }
    }
}

/// Built-in functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    Solar,
    SeasonalSolar,
    FixedOffset,
    ProportionalHours,
    ProportionalMinutes,
    Midpoint,
    FirstValid,
    EarlierOf,
    LaterOf,
}

impl Function {
    pub const ALL: [Self; 9] = [
        Self::Solar,
        Self::SeasonalSolar,
        Self::FixedOffset,
        Self::ProportionalHours,
        Self::ProportionalMinutes,
        Self::Midpoint,
        Self::FirstValid,
        Self::EarlierOf,
        Self::LaterOf,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Solar => "solar",
            Self::SeasonalSolar => "seasonal_solar",
            Self::FixedOffset => "fixed_offset",
            Self::ProportionalHours => "proportional_hours",
            Self::ProportionalMinutes => "proportional_minutes",
            Self::Midpoint => "midpoint",
            Self::FirstValid => "first_valid",
            Self::EarlierOf => "earlier_of",
            Self::LaterOf => "later_of",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }
}

/// Direction keywords used by `solar`, `seasonal_solar`, `fixed_offset`
/// and `proportional_minutes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    BeforeVisibleSunrise,
    AfterVisibleSunrise,
    BeforeVisibleSunset,
    AfterVisibleSunset,
    BeforeGeometricSunrise,
    AfterGeometricSunrise,
    BeforeGeometricSunset,
    AfterGeometricSunset,
    BeforeNoon,
    AfterNoon,
}

impl Direction {
    pub const ALL: [Self; 10] = [
        Self::BeforeVisibleSunrise,
        Self::AfterVisibleSunrise,
        Self::BeforeVisibleSunset,
        Self::AfterVisibleSunset,
        Self::BeforeGeometricSunrise,
        Self::AfterGeometricSunrise,
        Self::BeforeGeometricSunset,
        Self::AfterGeometricSunset,
        Self::BeforeNoon,
        Self::AfterNoon,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::BeforeVisibleSunrise => "before_visible_sunrise",
            Self::AfterVisibleSunrise => "after_visible_sunrise",
            Self::BeforeVisibleSunset => "before_visible_sunset",
            Self::AfterVisibleSunset => "after_visible_sunset",
            Self::BeforeGeometricSunrise => "before_geometric_sunrise",
            Self::AfterGeometricSunrise => "after_geometric_sunrise",
            Self::BeforeGeometricSunset => "before_geometric_sunset",
            Self::AfterGeometricSunset => "after_geometric_sunset",
            Self::BeforeNoon => "before_noon",
            Self::AfterNoon => "after_noon",
        }
    }

    /// Look up a direction, accepting the legacy `before_sunrise`,
    /// `after_sunrise`, `before_sunset` and `after_sunset` spellings.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "before_sunrise" => Some(Self::BeforeVisibleSunrise),
            "after_sunrise" => Some(Self::AfterVisibleSunrise),
            "before_sunset" => Some(Self::BeforeVisibleSunset),
            "after_sunset" => Some(Self::AfterVisibleSunset),
            _ => Self::ALL.into_iter().find(|d| d.name() == name),
        }
    }

    /// Morning directions select the rising crossing, evening ones the setting crossing.
    pub fn crossing(self) -> Crossing {
        match self {
            Self::BeforeVisibleSunrise
            | Self::AfterVisibleSunrise
            | Self::BeforeGeometricSunrise
            | Self::AfterGeometricSunrise
            | Self::BeforeNoon => Crossing::Rising,
            Self::BeforeVisibleSunset
            | Self::AfterVisibleSunset
            | Self::BeforeGeometricSunset
            | Self::AfterGeometricSunset
            | Self::AfterNoon => Crossing::Setting,
        }
    }

    /// Reference horizon; `None` for the noon directions.
    pub fn horizon(self) -> Option<Horizon> {
        match self {
            Self::BeforeVisibleSunrise
            | Self::AfterVisibleSunrise
            | Self::BeforeVisibleSunset
            | Self::AfterVisibleSunset => Some(Horizon::Visible),
            Self::BeforeGeometricSunrise
            | Self::AfterGeometricSunrise
            | Self::BeforeGeometricSunset
            | Self::AfterGeometricSunset => Some(Horizon::Geometric),
            Self::BeforeNoon | Self::AfterNoon => None,
        }
    }

    /// -1 for "before" directions, +1 for "after" directions.
    pub fn sign(self) -> f64 {
        if self.name().starts_with("before_") {
            -1.0
        } else {
            1.0
        }
    }

    /// Directions accepted by `seasonal_solar` and `proportional_minutes`.
    pub fn is_day_edge(self) -> bool {
        matches!(
            self,
            Self::BeforeVisibleSunrise
                | Self::AfterVisibleSunset
                | Self::BeforeGeometricSunrise
                | Self::AfterGeometricSunset
        )
    }
}

/// How a named day base defines its start and end.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DayBounds {
    /// Fixed minutes before visible sunrise and after visible sunset.
    FixedMinutes(f64),
    /// Sunrise and sunset widened by day length divided by the divisor.
    Zmanis(f64),
    /// Depression-angle dawn to the same angle at dusk.
    Angle(f64),
    /// Visible sunrise to visible sunset plus the given minutes.
    SunsetPlus(f64),
}

/// Named definitions of "the day" for proportional hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DayBase {
    Gra,
    Mga72,
    Mga60,
    Mga90,
    Mga96,
    Mga120,
    Mga72Zmanis,
    Mga90Zmanis,
    Mga96Zmanis,
    Mga16_1,
    Mga18,
    Mga19_8,
    Mga26,
    BaalHatanya,
    AteretTorah,
}

impl DayBase {
    pub const ALL: [Self; 15] = [
        Self::Gra,
        Self::Mga72,
        Self::Mga60,
        Self::Mga90,
        Self::Mga96,
        Self::Mga120,
        Self::Mga72Zmanis,
        Self::Mga90Zmanis,
        Self::Mga96Zmanis,
        Self::Mga16_1,
        Self::Mga18,
        Self::Mga19_8,
        Self::Mga26,
        Self::BaalHatanya,
        Self::AteretTorah,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Gra => "gra",
            Self::Mga72 => "mga_72",
            Self::Mga60 => "mga_60",
            Self::Mga90 => "mga_90",
            Self::Mga96 => "mga_96",
            Self::Mga120 => "mga_120",
            Self::Mga72Zmanis => "mga_72_zmanis",
            Self::Mga90Zmanis => "mga_90_zmanis",
            Self::Mga96Zmanis => "mga_96_zmanis",
            Self::Mga16_1 => "mga_16_1",
            Self::Mga18 => "mga_18",
            Self::Mga19_8 => "mga_19_8",
            Self::Mga26 => "mga_26",
            Self::BaalHatanya => "baal_hatanya",
            Self::AteretTorah => "ateret_torah",
        }
    }

    /// Look up a base; `mga` is an alias of `mga_72`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "mga" => Some(Self::Mga72),
            _ => Self::ALL.into_iter().find(|b| b.name() == name),
        }
    }

    pub fn bounds(self) -> DayBounds {
        match self {
            Self::Gra => DayBounds::FixedMinutes(0.0),
            Self::Mga72 => DayBounds::FixedMinutes(72.0),
            Self::Mga60 => DayBounds::FixedMinutes(60.0),
            Self::Mga90 => DayBounds::FixedMinutes(90.0),
            Self::Mga96 => DayBounds::FixedMinutes(96.0),
            Self::Mga120 => DayBounds::FixedMinutes(120.0),
            Self::Mga72Zmanis => DayBounds::Zmanis(10.0),
            Self::Mga90Zmanis => DayBounds::Zmanis(8.0),
            Self::Mga96Zmanis => DayBounds::Zmanis(7.5),
            Self::Mga16_1 => DayBounds::Angle(16.1),
            Self::Mga18 => DayBounds::Angle(18.0),
            Self::Mga19_8 => DayBounds::Angle(19.8),
            Self::Mga26 => DayBounds::Angle(26.0),
            Self::BaalHatanya => DayBounds::Angle(1.583),
            Self::AteretTorah => DayBounds::SunsetPlus(40.0),
        }
    }
}

/// Variables usable inside `if` conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionVar {
    Latitude,
    Longitude,
    Elevation,
    DayLength,
    Month,
    Day,
    DayOfYear,
    Date,
    Season,
}

impl ConditionVar {
    pub const ALL: [Self; 9] = [
        Self::Latitude,
        Self::Longitude,
        Self::Elevation,
        Self::DayLength,
        Self::Month,
        Self::Day,
        Self::DayOfYear,
        Self::Date,
        Self::Season,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Latitude => "latitude",
            Self::Longitude => "longitude",
            Self::Elevation => "elevation",
            Self::DayLength => "day_length",
            Self::Month => "month",
            Self::Day => "day",
            Self::DayOfYear => "day_of_year",
            Self::Date => "date",
            Self::Season => "season",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.name() == name)
    }
}

/// Convenience names that expand to a generic form.
///
/// Evaluating a named method evaluates exactly its [`expand`](Self::expand)
/// result, so `alos_72` and `fixed_offset(72, before_visible_sunrise)` are
/// the same computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedMethod {
    Alos72,
    Alos90,
    Alos120,
    Alos16_1,
    Alos18,
    Alos19_8,
    Misheyakir10_2,
    Misheyakir11,
    Misheyakir11_5,
    SofZmanShmaGra,
    SofZmanShmaMga,
    SofZmanTfilaGra,
    SofZmanTfilaMga,
    MinchaGedola,
    MinchaKetana,
    PlagHamincha,
    Tzeis7_083,
    Tzeis8_5,
    Tzeis42,
    Tzeis50,
    Tzeis72,
}

impl NamedMethod {
    pub const ALL: [Self; 21] = [
        Self::Alos72,
        Self::Alos90,
        Self::Alos120,
        Self::Alos16_1,
        Self::Alos18,
        Self::Alos19_8,
        Self::Misheyakir10_2,
        Self::Misheyakir11,
        Self::Misheyakir11_5,
        Self::SofZmanShmaGra,
        Self::SofZmanShmaMga,
        Self::SofZmanTfilaGra,
        Self::SofZmanTfilaMga,
        Self::MinchaGedola,
        Self::MinchaKetana,
        Self::PlagHamincha,
        Self::Tzeis7_083,
        Self::Tzeis8_5,
        Self::Tzeis42,
        Self::Tzeis50,
        Self::Tzeis72,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Alos72 => "alos_72",
            Self::Alos90 => "alos_90",
            Self::Alos120 => "alos_120",
            Self::Alos16_1 => "alos_16_1",
            Self::Alos18 => "alos_18",
            Self::Alos19_8 => "alos_19_8",
            Self::Misheyakir10_2 => "misheyakir_10_2",
            Self::Misheyakir11 => "misheyakir_11",
            Self::Misheyakir11_5 => "misheyakir_11_5",
            Self::SofZmanShmaGra => "sof_zman_shma_gra",
            Self::SofZmanShmaMga => "sof_zman_shma_mga",
            Self::SofZmanTfilaGra => "sof_zman_tfila_gra",
            Self::SofZmanTfilaMga => "sof_zman_tfila_mga",
            Self::MinchaGedola => "mincha_gedola",
            Self::MinchaKetana => "mincha_ketana",
            Self::PlagHamincha => "plag_hamincha",
            Self::Tzeis7_083 => "tzeis_7_083",
            Self::Tzeis8_5 => "tzeis_8_5",
            Self::Tzeis42 => "tzeis_42",
            Self::Tzeis50 => "tzeis_50",
            Self::Tzeis72 => "tzeis_72",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }

    /// The generic expression this name stands for.
    pub fn expand(self) -> Expr {
        use Direction::{AfterVisibleSunset, BeforeVisibleSunrise};
        match self {
            Self::Alos72 => fixed(72.0, BeforeVisibleSunrise),
            Self::Alos90 => fixed(90.0, BeforeVisibleSunrise),
            Self::Alos120 => fixed(120.0, BeforeVisibleSunrise),
            Self::Alos16_1 => solar(16.1, BeforeVisibleSunrise),
            Self::Alos18 => solar(18.0, BeforeVisibleSunrise),
            Self::Alos19_8 => solar(19.8, BeforeVisibleSunrise),
            Self::Misheyakir10_2 => solar(10.2, BeforeVisibleSunrise),
            Self::Misheyakir11 => solar(11.0, BeforeVisibleSunrise),
            Self::Misheyakir11_5 => solar(11.5, BeforeVisibleSunrise),
            Self::SofZmanShmaGra => hours(3.0, DayBase::Gra),
            Self::SofZmanShmaMga => hours(3.0, DayBase::Mga72),
            Self::SofZmanTfilaGra => hours(4.0, DayBase::Gra),
            Self::SofZmanTfilaMga => hours(4.0, DayBase::Mga72),
            Self::MinchaGedola => hours(6.5, DayBase::Gra),
            Self::MinchaKetana => hours(9.5, DayBase::Gra),
            Self::PlagHamincha => hours(10.75, DayBase::Gra),
            Self::Tzeis7_083 => solar(7.083, AfterVisibleSunset),
            Self::Tzeis8_5 => solar(8.5, AfterVisibleSunset),
            Self::Tzeis42 => fixed(42.0, AfterVisibleSunset),
            Self::Tzeis50 => fixed(50.0, AfterVisibleSunset),
            Self::Tzeis72 => fixed(72.0, AfterVisibleSunset),
        }
    }
}

fn solar(degrees: f64, direction: Direction) -> Expr {
    Expr::Call(Call::Solar {
        degrees: Box::new(Expr::Number(degrees)),
        direction,
    })
}

fn fixed(minutes: f64, direction: Direction) -> Expr {
    Expr::Call(Call::FixedOffset {
        minutes: Box::new(Expr::Number(minutes)),
        direction,
    })
}

fn hours(hours: f64, base: DayBase) -> Expr {
    Expr::Call(Call::ProportionalHours {
        hours: Box::new(Expr::Number(hours)),
        base: Base::Named(base),
    })
}

/// Month names accepted in date literals (`21-May`, `1-January`).
pub fn month_from_name(name: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "january",
        "february",
        "march",
        "april",
        "may",
        "june",
        "july",
        "august",
        "september",
        "october",
        "november",
        "december",
    ];
    let lower = name.to_ascii_lowercase();
    MONTHS
        .iter()
        .position(|m| *m == lower || (lower.len() == 3 && m.starts_with(&lower)))
        .map(|i| i as u32 + 1)
}

/// Short month name for display.
pub fn month_abbrev(month: u32) -> &'static str {
    const ABBREV: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];
    ABBREV
        .get(month.saturating_sub(1) as usize)
        .copied()
        .unwrap_or("???")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_names_round_trip() {
        for p in Primitive::ALL {
            assert_eq!(Primitive::from_name(p.name()), Some(p));
        }
    }

    #[test]
    fn primitive_aliases() {
        assert_eq!(Primitive::from_name("sunrise"), Some(Primitive::VisibleSunrise));
        assert_eq!(Primitive::from_name("sunset"), Some(Primitive::VisibleSunset));
        assert_eq!(Primitive::from_name("chatzos"), Some(Primitive::SolarNoon));
        assert_eq!(Primitive::from_name("moonrise"), None);
    }

    #[test]
    fn direction_legacy_aliases() {
        assert_eq!(
            Direction::from_name("before_sunrise"),
            Some(Direction::BeforeVisibleSunrise)
        );
        assert_eq!(
            Direction::from_name("after_sunset"),
            Some(Direction::AfterVisibleSunset)
        );
    }

    #[test]
    fn direction_geometry() {
        assert_eq!(Direction::BeforeNoon.crossing(), Crossing::Rising);
        assert_eq!(Direction::AfterNoon.crossing(), Crossing::Setting);
        assert_eq!(Direction::AfterGeometricSunset.horizon(), Some(Horizon::Geometric));
        assert_eq!(Direction::BeforeNoon.horizon(), None);
        assert_eq!(Direction::BeforeVisibleSunrise.sign(), -1.0);
        assert_eq!(Direction::AfterVisibleSunrise.sign(), 1.0);
    }

    #[test]
    fn mga_alias() {
        assert_eq!(DayBase::from_name("mga"), Some(DayBase::Mga72));
        assert_eq!(DayBase::Mga96Zmanis.bounds(), DayBounds::Zmanis(7.5));
    }

    #[test]
    fn every_name_is_unique_across_tables() {
        let mut seen = std::collections::HashSet::new();
        let names = Primitive::ALL
            .iter()
            .map(|p| p.name())
            .chain(Function::ALL.iter().map(|f| f.name()))
            .chain(Direction::ALL.iter().map(|d| d.name()))
            .chain(DayBase::ALL.iter().map(|b| b.name()))
            .chain(ConditionVar::ALL.iter().map(|v| v.name()))
            .chain(NamedMethod::ALL.iter().map(|m| m.name()));
        for name in names {
            assert!(seen.insert(name), "duplicate keyword {name}");
        }
    }

    #[test]
    fn months() {
        assert_eq!(month_from_name("May"), Some(5));
        assert_eq!(month_from_name("jan"), Some(1));
        assert_eq!(month_from_name("December"), Some(12));
        assert_eq!(month_from_name("Mayo"), None);
        assert_eq!(month_abbrev(2), "Feb");
    }
}
