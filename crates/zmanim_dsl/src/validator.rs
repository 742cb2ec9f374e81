//! Authoring-time checks and dependency ordering.
//!
//! The parser already rejects wrong arity and misplaced keywords. The
//! validator adds range checks on literal arguments, reference checks
//! against the keys known to the caller, and static type checks for
//! operand combinations that can never evaluate.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::ast::{Base, BinaryOp, Call, Expr};
use crate::catalog::ConditionVar;
use crate::error::DslError;
use crate::parser::parse;
use crate::value::ValueType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: None,
        }
    }

    fn suggest(mut self, s: impl Into<String>) -> Self {
        self.suggestion = Some(s.into());
        self
    }
}

/// Check a parsed formula.
///
/// # Arguments
/// * `current_key` - key of the entry being edited, for self-reference detection
/// * `available` - keys that may be referenced; `None` skips the check
pub fn validate(
    expr: &Expr,
    current_key: Option<&str>,
    available: Option<&BTreeSet<String>>,
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    expr.walk(&mut |node| check_node(node, current_key, available, &mut issues));
    if let Some(t) = static_type(expr) {
        if t != ValueType::Time {
            issues.push(ValidationIssue::new(format!(
                "formula must evaluate to a time, got {t}"
            )));
        }
    }
    issues
}

/// Parse and check formula text; a parse failure is reported as the only issue.
pub fn validate_formula(
    src: &str,
    current_key: Option<&str>,
    available: Option<&BTreeSet<String>>,
) -> Vec<ValidationIssue> {
    match parse(src) {
        Ok(expr) => validate(&expr, current_key, available),
        Err(DslError::UnknownSymbol(name)) => vec![
            ValidationIssue::new(format!("unknown symbol '{name}'"))
                .suggest("use a primitive, function, named method or @reference"),
        ],
        Err(e) => vec![ValidationIssue::new(e.to_string())],
    }
}

fn literal(e: &Expr) -> Option<f64> {
    match e {
        Expr::Number(n) | Expr::Duration(n) => Some(*n),
        _ => None,
    }
}

fn check_node(
    node: &Expr,
    current_key: Option<&str>,
    available: Option<&BTreeSet<String>>,
    issues: &mut Vec<ValidationIssue>,
) {
    match node {
        Expr::Reference(key) => {
            if current_key == Some(key.as_str()) {
                issues.push(ValidationIssue::new(format!("'@{key}' references itself")));
            } else if available.is_some_and(|keys| !keys.contains(key)) {
                issues.push(
                    ValidationIssue::new(format!("undefined reference '@{key}'"))
                        .suggest("reference an entry that exists in this publisher"),
                );
            }
        }
        Expr::Call(call) => check_call(call, issues),
        Expr::Binary { op, lhs, rhs } => {
            if let (Some(l), Some(r)) = (static_type(lhs), static_type(rhs)) {
                if binary_type(*op, l, r).is_none() {
                    issues.push(ValidationIssue::new(format!(
                        "cannot apply '{}' to {l} and {r}",
                        op.symbol()
                    )));
                }
            }
            if *op == BinaryOp::Div && literal(rhs) == Some(0.0) {
                issues.push(ValidationIssue::new("division by zero"));
            }
        }
        _ => {}
    }
}

fn check_call(call: &Call, issues: &mut Vec<ValidationIssue>) {
    match call {
        Call::Solar { degrees, .. } | Call::SeasonalSolar { degrees, .. } => {
            if let Some(d) = literal(degrees) {
                if !(0.0..=90.0).contains(&d) {
                    issues.push(
                        ValidationIssue::new(format!(
                            "{}() degrees must be between 0 and 90, got {d}",
                            call.name()
                        ))
                        .suggest("common values: 8.5 (tzeis), 11.5 (misheyakir), 16.1 (alos)"),
                    );
                }
            }
        }
        Call::ProportionalHours { hours, base } => {
            if let Some(h) = literal(hours) {
                if !(0.5..=12.0).contains(&h) {
                    issues.push(
                        ValidationIssue::new(format!(
                            "proportional_hours() hours must be between 0.5 and 12, got {h}"
                        ))
                        .suggest("common values: 3 (shema), 4 (tefila), 6.5 (mincha gedola), 10.75 (plag)"),
                    );
                }
            }
            check_base(base, issues);
        }
        Call::ProportionalMinutes { minutes, base, .. } => {
            if let Some(m) = literal(minutes) {
                if m <= 0.0 || m > 200.0 {
                    issues.push(
                        ValidationIssue::new(format!(
                            "proportional_minutes() minutes must be between 1 and 200, got {m}"
                        ))
                        .suggest("common values: 72, 90, 96, 120"),
                    );
                }
            }
            if let Some(b) = base {
                check_base(b, issues);
            }
        }
        Call::Midpoint(a, b) | Call::EarlierOf(a, b) | Call::LaterOf(a, b) => {
            for arg in [a, b] {
                require_time(call.name(), arg, issues);
            }
        }
        Call::FirstValid(args) => {
            for arg in args {
                require_time(call.name(), arg, issues);
            }
        }
        Call::FixedOffset { minutes, .. } => {
            if let Some(t @ (ValueType::Time | ValueType::Text | ValueType::Bool)) = static_type(minutes) {
                issues.push(ValidationIssue::new(format!(
                    "fixed_offset() minutes must be a number or duration, got {t}"
                )));
            }
        }
    }
}

fn check_base(base: &Base, issues: &mut Vec<ValidationIssue>) {
    if let Base::Custom(start, end) = base {
        require_time("custom", start, issues);
        require_time("custom", end, issues);
    }
}

fn require_time(func: &str, arg: &Expr, issues: &mut Vec<ValidationIssue>) {
    if let Some(t) = static_type(arg) {
        if t != ValueType::Time {
            issues.push(ValidationIssue::new(format!(
                "{func}() arguments must be times, got {t}"
            )));
        }
    }
}

/// Result type of an arithmetic operator, `None` when the combination is invalid.
pub fn binary_type(op: BinaryOp, lhs: ValueType, rhs: ValueType) -> Option<ValueType> {
    use ValueType::{Duration as Dur, Number as Num, Time};
    match (op, lhs, rhs) {
        (BinaryOp::Add, Time, Dur) | (BinaryOp::Add, Dur, Time) | (BinaryOp::Sub, Time, Dur) => {
            Some(Time)
        }
        (BinaryOp::Sub, Time, Time) => Some(Dur),
        (BinaryOp::Add | BinaryOp::Sub, Dur, Dur) => Some(Dur),
        (BinaryOp::Mul, Dur, Num) | (BinaryOp::Mul, Num, Dur) | (BinaryOp::Div, Dur, Num) => {
            Some(Dur)
        }
        (_, Num, Num) => Some(Num),
        _ => None,
    }
}

/// Statically known result type; `None` when unknown or already invalid.
pub fn static_type(expr: &Expr) -> Option<ValueType> {
    match expr {
        Expr::Number(_) | Expr::DateLiteral { .. } => Some(ValueType::Number),
        Expr::Duration(_) => Some(ValueType::Duration),
        Expr::Text(_) => Some(ValueType::Text),
        Expr::Bool(_) => Some(ValueType::Bool),
        Expr::Var(ConditionVar::DayLength) => Some(ValueType::Duration),
        Expr::Var(ConditionVar::Season) => Some(ValueType::Text),
        Expr::Var(_) => Some(ValueType::Number),
        Expr::Primitive(_) | Expr::Named(_) | Expr::Reference(_) | Expr::Call(_) => {
            Some(ValueType::Time)
        }
        Expr::Binary { op, lhs, rhs } => binary_type(*op, static_type(lhs)?, static_type(rhs)?),
        Expr::Conditional { then, .. } => static_type(then),
    }
}

/// Every `@key` the formula references.
pub fn extract_references(expr: &Expr) -> BTreeSet<String> {
    let mut refs = BTreeSet::new();
    expr.walk(&mut |node| {
        if let Expr::Reference(key) = node {
            refs.insert(key.clone());
        }
    });
    refs
}

/// References of formula text.
pub fn formula_references(src: &str) -> Result<BTreeSet<String>, DslError> {
    Ok(extract_references(&parse(src)?))
}

/// Evaluation order for a set of keyed formulas.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CalculationOrder {
    /// Keys whose dependencies all precede them.
    pub ordered: Vec<String>,
    /// Keys on a cycle or depending on one, sorted.
    pub cyclic: Vec<String>,
}

impl CalculationOrder {
    /// Fail if any key is caught in a cycle.
    pub fn into_result(self) -> Result<Vec<String>, DslError> {
        if self.cyclic.is_empty() {
            Ok(self.ordered)
        } else {
            Err(DslError::CircularDependency(self.cyclic))
        }
    }
}

/// Order keys so every key comes after the keys it depends on (Kahn's algorithm).
///
/// Only dependencies that are themselves keys of `deps` count; references to
/// keys outside the set are the caller's concern. Ties are broken by key
/// order, so the result is deterministic.
pub fn calculation_order(deps: &BTreeMap<String, BTreeSet<String>>) -> CalculationOrder {
    let mut indegree: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (key, ds) in deps {
        let in_set: Vec<&str> = ds
            .iter()
            .map(String::as_str)
            .filter(|d| deps.contains_key(*d))
            .collect();
        indegree.insert(key.as_str(), in_set.len());
        for d in in_set {
            dependents.entry(d).or_default().push(key.as_str());
        }
    }

    let mut queue: VecDeque<&str> = indegree
        .iter()
        .filter(|(_, n)| **n == 0)
        .map(|(k, _)| *k)
        .collect();
    let mut ordered = Vec::with_capacity(deps.len());
    while let Some(key) = queue.pop_front() {
        ordered.push(key.to_string());
        for dependent in dependents.get(key).into_iter().flatten() {
            if let Some(n) = indegree.get_mut(dependent) {
                *n -= 1;
                if *n == 0 {
                    queue.push_back(dependent);
                }
            }
        }
    }

    let cyclic = indegree
        .into_iter()
        .filter(|(_, n)| *n > 0)
        .map(|(k, _)| k.to_string())
        .collect();
    CalculationOrder { ordered, cyclic }
}

/// Parse each formula and order them, failing on any cycle.
pub fn order_formulas(formulas: &BTreeMap<String, String>) -> Result<Vec<String>, DslError> {
    let mut deps = BTreeMap::new();
    for (key, src) in formulas {
        deps.insert(key.clone(), formula_references(src)?);
    }
    calculation_order(&deps).into_result()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn messages(src: &str, current: Option<&str>, available: Option<&BTreeSet<String>>) -> Vec<String> {
        validate_formula(src, current, available)
            .into_iter()
            .map(|i| i.message)
            .collect()
    }

    #[test]
    fn valid_formula_has_no_issues() {
        let avail = keys(&["alos"]);
        assert!(messages("@alos + 10min", Some("misheyakir"), Some(&avail)).is_empty());
        assert!(messages("proportional_hours(3, gra)", None, None).is_empty());
    }

    #[test]
    fn degree_range() {
        let m = messages("solar(95, before_sunrise)", None, None);
        assert_eq!(m.len(), 1);
        assert!(m[0].contains("between 0 and 90"), "{m:?}");
    }

    #[test]
    fn hours_range() {
        assert!(!messages("proportional_hours(13, gra)", None, None).is_empty());
        assert!(!messages("proportional_hours(0.25, gra)", None, None).is_empty());
        assert!(messages("proportional_hours(10.75, gra)", None, None).is_empty());
    }

    #[test]
    fn self_and_undefined_references() {
        let avail = keys(&["alos", "tzeis"]);
        let m = messages("@alos + 5min", Some("alos"), Some(&avail));
        assert!(m[0].contains("itself"), "{m:?}");
        let m = messages("@missing", Some("x"), Some(&avail));
        assert!(m[0].contains("undefined reference"), "{m:?}");
    }

    #[test]
    fn static_type_errors() {
        assert!(messages("sunrise + sunset", None, None)[0].contains("cannot apply '+'"));
        assert!(messages("sunrise / 2", None, None)[0].contains("cannot apply '/'"));
        assert!(messages("sunset - sunrise", None, None)[0].contains("must evaluate to a time"));
        assert!(messages("midpoint(sunrise, 5min)", None, None)[0].contains("must be times"));
    }

    #[test]
    fn parse_errors_become_issues() {
        let m = messages("solar(16.1)", None, None);
        assert_eq!(m.len(), 1);
        assert!(m[0].contains("exactly 2"), "{m:?}");
        let m = messages("foo + 5min", None, None);
        assert!(m[0].contains("unknown symbol"), "{m:?}");
    }

    #[test]
    fn references_extracted() {
        let refs = formula_references("midpoint(@alos, @tzeis) + (@alos - @netz)").unwrap();
        assert_eq!(refs, keys(&["alos", "netz", "tzeis"]));
    }

    #[test]
    fn ordering_respects_dependencies() {
        let mut deps = BTreeMap::new();
        deps.insert("c".to_string(), keys(&["b"]));
        deps.insert("b".to_string(), keys(&["a"]));
        deps.insert("a".to_string(), keys(&[]));
        deps.insert("d".to_string(), keys(&["external"]));
        let order = calculation_order(&deps);
        assert_eq!(order.ordered, vec!["a", "d", "b", "c"]);
        assert!(order.cyclic.is_empty());
    }

    #[test]
    fn cycle_isolated_to_members() {
        let mut deps = BTreeMap::new();
        deps.insert("a".to_string(), keys(&["b"]));
        deps.insert("b".to_string(), keys(&["a"]));
        deps.insert("c".to_string(), keys(&["c"]));
        deps.insert("ok".to_string(), keys(&[]));
        let order = calculation_order(&deps);
        assert_eq!(order.ordered, vec!["ok"]);
        assert_eq!(order.cyclic, vec!["a", "b", "c"]);
        assert!(matches!(
            order.into_result(),
            Err(DslError::CircularDependency(keys)) if keys == vec!["a", "b", "c"]
        ));
    }

    #[test]
    fn order_formulas_end_to_end() {
        let mut f = BTreeMap::new();
        f.insert("shema".to_string(), "proportional_hours(3, custom(@alos, @tzeis))".to_string());
        f.insert("alos".to_string(), "solar(16.1, before_sunrise)".to_string());
        f.insert("tzeis".to_string(), "solar(8.5, after_sunset)".to_string());
        assert_eq!(order_formulas(&f).unwrap(), vec!["alos", "tzeis", "shema"]);
    }
}
