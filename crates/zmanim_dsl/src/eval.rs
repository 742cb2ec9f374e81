//! Tree-walking evaluator.
//!
//! Evaluates a parsed formula against an [`EvaluationContext`] and the
//! instants already computed for other entries in the same run. Optionally
//! records a breakdown of every primitive, call, reference and arithmetic
//! result in evaluation order.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use zmanim_astro::{Crossing, Horizon, SolarResult, midpoint, proportional_time, seasonal_crossing, sun_crossing};

use crate::ast::{Base, Call, Cond, Expr};
use crate::catalog::{ConditionVar, DayBounds, Direction, Primitive, month_abbrev};
use crate::context::{EvaluationContext, NoCrossingPolicy};
use crate::error::DslError;
use crate::parser::parse;
use crate::value::{self, Value, duration_minutes, minutes, shift};

/// Instants of entries already computed in the current run, keyed by entry key.
pub type References = HashMap<String, DateTime<Utc>>;

/// One recorded sub-calculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub label: String,
    pub value: String,
}

/// Result of evaluating one formula.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub instant: DateTime<Utc>,
    pub breakdown: Option<Vec<Step>>,
}

/// Evaluate a parsed formula to an instant.
pub fn evaluate(
    expr: &Expr,
    ctx: &EvaluationContext,
    refs: &References,
) -> Result<DateTime<Utc>, DslError> {
    Evaluator::new(ctx, refs).instant(expr)
}

/// Evaluate a parsed formula and record its breakdown.
pub fn evaluate_with_breakdown(
    expr: &Expr,
    ctx: &EvaluationContext,
    refs: &References,
) -> Result<Evaluation, DslError> {
    let mut ev = Evaluator::new(ctx, refs).with_breakdown();
    let instant = ev.instant(expr)?;
    Ok(Evaluation {
        instant,
        breakdown: ev.steps,
    })
}

/// Parse and evaluate formula text.
///
/// # Arguments
/// * `src` - formula text
/// * `ctx` - date, location and solar settings
/// * `refs` - instants of referenced entries
/// * `breakdown` - whether to record intermediate steps
pub fn evaluate_formula(
    src: &str,
    ctx: &EvaluationContext,
    refs: &References,
    breakdown: bool,
) -> Result<Evaluation, DslError> {
    let expr = parse(src)?;
    if breakdown {
        evaluate_with_breakdown(&expr, ctx, refs)
    } else {
        Ok(Evaluation {
            instant: evaluate(&expr, ctx, refs)?,
            breakdown: None,
        })
    }
}

pub struct Evaluator<'a> {
    ctx: &'a EvaluationContext,
    refs: &'a References,
    steps: Option<Vec<Step>>,
}

impl<'a> Evaluator<'a> {
    pub fn new(ctx: &'a EvaluationContext, refs: &'a References) -> Self {
        Self {
            ctx,
            refs,
            steps: None,
        }
    }

    pub fn with_breakdown(mut self) -> Self {
        self.steps = Some(Vec::new());
        self
    }

    pub fn into_steps(self) -> Vec<Step> {
        self.steps.unwrap_or_default()
    }

    /// Evaluate an expression that must produce an instant.
    pub fn instant(&mut self, expr: &Expr) -> Result<DateTime<Utc>, DslError> {
        match self.eval(expr)? {
            Value::Time(t) => Ok(t),
            other => Err(DslError::Type(format!(
                "formula must evaluate to a time, got {}",
                other.kind()
            ))),
        }
    }

    pub fn eval(&mut self, expr: &Expr) -> Result<Value, DslError> {
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Duration(m) => Ok(Value::Duration(minutes(*m)?)),
            Expr::Text(s) => Ok(Value::Text(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::DateLiteral { day, month } => self.date_literal(*day, *month),
            Expr::Var(v) => self.var(*v),
            Expr::Primitive(p) => {
                let v = Value::Time(self.primitive(*p)?);
                self.record(|| p.name().to_string(), &v);
                Ok(v)
            }
            Expr::Named(m) => {
                let v = self.eval(&m.expand())?;
                self.record(|| m.name().to_string(), &v);
                Ok(v)
            }
            Expr::Reference(key) => {
                let t = self
                    .refs
                    .get(key)
                    .copied()
                    .ok_or_else(|| DslError::UndefinedReference(key.clone()))?;
                let v = Value::Time(t);
                self.record(|| format!("@{key}"), &v);
                Ok(v)
            }
            Expr::Call(call) => {
                let v = Value::Time(self.call(call)?);
                self.record(|| call.to_string(), &v);
                Ok(v)
            }
            Expr::Binary { op, lhs, rhs } => {
                let l = self.eval(lhs)?;
                let r = self.eval(rhs)?;
                let v = value::binary(*op, &l, &r)?;
                self.record(|| expr.to_string(), &v);
                Ok(v)
            }
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => {
                if self.condition(condition)? {
                    self.eval(then)
                } else {
                    match otherwise {
                        Some(e) => self.eval(e),
                        None => Err(DslError::MissingElse),
                    }
                }
            }
        }
    }

    fn record(&mut self, label: impl FnOnce() -> String, v: &Value) {
        if let Some(steps) = self.steps.as_mut() {
            steps.push(Step {
                label: label(),
                value: v.render(self.ctx.utc_offset()),
            });
        }
    }

    fn condition(&mut self, cond: &Cond) -> Result<bool, DslError> {
        match cond {
            Cond::Compare { op, lhs, rhs } => {
                let l = self.eval(lhs)?;
                let r = self.eval(rhs)?;
                value::compare(*op, &l, &r)
            }
            Cond::And(a, b) => Ok(self.condition(a)? && self.condition(b)?),
            Cond::Or(a, b) => Ok(self.condition(a)? || self.condition(b)?),
            Cond::Not(c) => Ok(!self.condition(c)?),
            Cond::Value(e) => match self.eval(e)? {
                Value::Bool(b) => Ok(b),
                other => Err(DslError::Type(format!(
                    "condition must be a boolean, got {}",
                    other.kind()
                ))),
            },
        }
    }

    fn date_literal(&self, day: u32, month: u32) -> Result<Value, DslError> {
        let year = self.ctx.date().year();
        NaiveDate::from_ymd_opt(year, month, day)
            .map(|d| Value::Number(f64::from(d.ordinal())))
            .ok_or_else(|| {
                DslError::InvalidDate(format!(
                    "{day}-{} does not exist in {year}",
                    month_abbrev(month)
                ))
            })
    }

    fn var(&self, v: ConditionVar) -> Result<Value, DslError> {
        let date = self.ctx.date();
        let loc = self.ctx.location();
        Ok(match v {
            ConditionVar::Latitude => Value::Number(loc.latitude_deg),
            ConditionVar::Longitude => Value::Number(loc.longitude_deg),
            ConditionVar::Elevation => Value::Number(loc.elevation_m),
            ConditionVar::DayLength => {
                let rise = self.horizon_event(Horizon::Visible, Crossing::Rising)?;
                let set = self.horizon_event(Horizon::Visible, Crossing::Setting)?;
                Value::Duration(set - rise)
            }
            ConditionVar::Month => Value::Number(f64::from(date.month())),
            ConditionVar::Day => Value::Number(f64::from(date.day())),
            ConditionVar::DayOfYear | ConditionVar::Date => Value::Number(f64::from(date.ordinal())),
            ConditionVar::Season => Value::Text(self.ctx.season().to_string()),
        })
    }

    fn no_crossing(&self, what: &str) -> DslError {
        DslError::NoCrossing(format!("{what} does not occur on {}", self.ctx.date()))
    }

    /// Visible or geometric sunrise/sunset.
    fn horizon_event(&self, horizon: Horizon, crossing: Crossing) -> Result<DateTime<Utc>, DslError> {
        let sun = self.ctx.sun();
        let (result, name) = match (horizon, crossing) {
            (Horizon::Geometric, Crossing::Rising) => (sun.geometric_sunrise, "geometric sunrise"),
            (Horizon::Geometric, Crossing::Setting) => (sun.geometric_sunset, "geometric sunset"),
            (_, Crossing::Rising) => (sun.visible_sunrise, "sunrise"),
            (_, Crossing::Setting) => (sun.visible_sunset, "sunset"),
        };
        result.instant().ok_or_else(|| self.no_crossing(name))
    }

    /// Depression-angle crossing, subject to the no-crossing policy.
    fn depression(&self, degrees: f64, crossing: Crossing) -> Result<DateTime<Utc>, DslError> {
        let result = sun_crossing(
            self.ctx.date(),
            self.ctx.location(),
            Horizon::Depression(degrees),
            crossing,
            self.ctx.solar_config(),
        );
        self.with_policy(result, crossing, &format!("{degrees}° crossing"))
    }

    fn with_policy(
        &self,
        result: SolarResult,
        crossing: Crossing,
        what: &str,
    ) -> Result<DateTime<Utc>, DslError> {
        if let Some(t) = result.instant() {
            return Ok(t);
        }
        if self.ctx.no_crossing_policy() == NoCrossingPolicy::CivilTwilightFallback {
            let civil = sun_crossing(
                self.ctx.date(),
                self.ctx.location(),
                Horizon::CIVIL,
                crossing,
                self.ctx.solar_config(),
            );
            if let Some(t) = civil.instant() {
                tracing::debug!(date = %self.ctx.date(), what, "substituting civil twilight");
                return Ok(t);
            }
        }
        Err(self.no_crossing(what))
    }

    fn primitive(&self, p: Primitive) -> Result<DateTime<Utc>, DslError> {
        match p {
            Primitive::SolarNoon => Ok(self.ctx.sun().solar_noon),
            Primitive::SolarMidnight => Ok(self.ctx.sun().solar_midnight()),
            _ => match p.crossing() {
                Some((Horizon::Depression(deg), crossing)) => self.depression(deg, crossing),
                Some((horizon, crossing)) => self.horizon_event(horizon, crossing),
                None => Ok(self.ctx.sun().solar_noon),
            },
        }
    }

    /// Sunrise/sunset named by a direction, or solar noon.
    fn anchor(&self, d: Direction) -> Result<DateTime<Utc>, DslError> {
        match d.horizon() {
            Some(h) => self.horizon_event(h, d.crossing()),
            None => Ok(self.ctx.sun().solar_noon),
        }
    }

    fn time_of(&mut self, e: &Expr, what: &str) -> Result<DateTime<Utc>, DslError> {
        match self.eval(e)? {
            Value::Time(t) => Ok(t),
            other => Err(DslError::Type(format!("{what} must be a time, got {}", other.kind()))),
        }
    }

    fn number_of(&mut self, e: &Expr, what: &str) -> Result<f64, DslError> {
        match self.eval(e)? {
            Value::Number(n) => Ok(n),
            other => Err(DslError::Type(format!("{what} must be a number, got {}", other.kind()))),
        }
    }

    fn degrees_of(&mut self, e: &Expr, what: &str) -> Result<f64, DslError> {
        let deg = self.number_of(e, what)?;
        if (0.0..=90.0).contains(&deg) {
            Ok(deg)
        } else {
            Err(DslError::InvalidArgument(format!(
                "{what} degrees must be between 0 and 90, got {deg}"
            )))
        }
    }

    /// Minutes given either as a number or a duration.
    fn offset_of(&mut self, e: &Expr, what: &str) -> Result<f64, DslError> {
        match self.eval(e)? {
            Value::Number(n) => Ok(n),
            Value::Duration(d) => Ok(duration_minutes(d)),
            other => Err(DslError::Type(format!(
                "{what} minutes must be a number or duration, got {}",
                other.kind()
            ))),
        }
    }

    fn day_bounds(&mut self, base: &Base) -> Result<(DateTime<Utc>, DateTime<Utc>), DslError> {
        let named = match base {
            Base::Custom(start, end) => {
                let s = self.time_of(start, "custom() start")?;
                let e = self.time_of(end, "custom() end")?;
                return Ok((s, e));
            }
            Base::Named(b) => b.bounds(),
        };
        if let DayBounds::Angle(deg) = named {
            return Ok((
                self.depression(deg, Crossing::Rising)?,
                self.depression(deg, Crossing::Setting)?,
            ));
        }
        let rise = self.horizon_event(Horizon::Visible, Crossing::Rising)?;
        let set = self.horizon_event(Horizon::Visible, Crossing::Setting)?;
        Ok(match named {
            DayBounds::FixedMinutes(m) => {
                let pad = minutes(m)?;
                (shift(rise, -pad)?, shift(set, pad)?)
            }
            DayBounds::Zmanis(divisor) => {
                let pad = minutes(duration_minutes(set - rise) / divisor)?;
                (shift(rise, -pad)?, shift(set, pad)?)
            }
            DayBounds::SunsetPlus(m) => (rise, shift(set, minutes(m)?)?),
            DayBounds::Angle(_) => (rise, set),
        })
    }

    fn shifted(&self, anchor: DateTime<Utc>, sign: f64, offset_min: f64) -> Result<DateTime<Utc>, DslError> {
        anchor
            .checked_add_signed(minutes(sign * offset_min)?)
            .ok_or_else(|| DslError::Overflow("instant out of range".into()))
    }

    fn call(&mut self, call: &Call) -> Result<DateTime<Utc>, DslError> {
        match call {
            Call::Solar { degrees, direction } => {
                let deg = self.degrees_of(degrees, "solar()")?;
                self.depression(deg, direction.crossing())
            }
            Call::SeasonalSolar { degrees, direction } => {
                let deg = self.degrees_of(degrees, "seasonal_solar()")?;
                let result = seasonal_crossing(
                    self.ctx.date(),
                    self.ctx.location(),
                    deg,
                    direction.horizon().unwrap_or(Horizon::Visible),
                    direction.crossing(),
                    self.ctx.solar_config(),
                )?;
                self.with_policy(result, direction.crossing(), &format!("seasonal {deg}° crossing"))
            }
            Call::FixedOffset { minutes: m, direction } => {
                let offset = self.offset_of(m, "fixed_offset()")?;
                let anchor = self.anchor(*direction)?;
                self.shifted(anchor, direction.sign(), offset)
            }
            Call::ProportionalHours { hours, base } => {
                let h = self.number_of(hours, "proportional_hours() hours")?;
                let (start, end) = self.day_bounds(base)?;
                Ok(proportional_time(start, end, h)?)
            }
            Call::ProportionalMinutes {
                minutes: m,
                direction,
                base,
            } => {
                let zmaniyos = self.offset_of(m, "proportional_minutes()")?;
                let day = match base {
                    Some(b) => self.day_bounds(b)?,
                    None => {
                        let h = direction.horizon().unwrap_or(Horizon::Visible);
                        (
                            self.horizon_event(h, Crossing::Rising)?,
                            self.horizon_event(h, Crossing::Setting)?,
                        )
                    }
                };
                let day_minutes = duration_minutes(day.1 - day.0);
                if day_minutes <= 0.0 {
                    return Err(DslError::InvalidArgument(
                        "proportional_minutes(): day end must follow day start".into(),
                    ));
                }
                let anchor = self.anchor(*direction)?;
                self.shifted(anchor, direction.sign(), day_minutes * zmaniyos / 720.0)
            }
            Call::Midpoint(a, b) => {
                let a = self.time_of(a, "midpoint() argument")?;
                let b = self.time_of(b, "midpoint() argument")?;
                Ok(midpoint(a, b))
            }
            Call::EarlierOf(a, b) => {
                let a = self.time_of(a, "earlier_of() argument")?;
                let b = self.time_of(b, "earlier_of() argument")?;
                Ok(a.min(b))
            }
            Call::LaterOf(a, b) => {
                let a = self.time_of(a, "later_of() argument")?;
                let b = self.time_of(b, "later_of() argument")?;
                Ok(a.max(b))
            }
            Call::FirstValid(alternatives) => {
                for (i, alt) in alternatives.iter().enumerate() {
                    let mark = self.steps.as_ref().map_or(0, Vec::len);
                    match self.time_of(alt, "first_valid() argument") {
                        Ok(t) => return Ok(t),
                        Err(e) => {
                            if let Some(steps) = self.steps.as_mut() {
                                steps.truncate(mark);
                            }
                            tracing::trace!(index = i, error = %e, "first_valid alternative failed");
                        }
                    }
                }
                Err(DslError::AllFailed)
            }
        }
    }
}
