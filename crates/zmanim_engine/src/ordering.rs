//! Deterministic ordering of batch results.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use crate::model::CalculatedResult;

/// Categories of the day in display order, dawn through midnight.
pub const DEFAULT_CATEGORIES: [&str; 8] = [
    "dawn",
    "sunrise",
    "morning",
    "midday",
    "afternoon",
    "sunset",
    "nightfall",
    "midnight",
];

pub const UNKNOWN_CATEGORY_PRIORITY: u32 = 99;

#[derive(Debug)]
struct CategoryTable {
    priorities: HashMap<String, u32>,
    unknown: u32,
}

/// Category priority lookup, built once and shared.
///
/// Cloning is cheap; every clone reads the same table.
#[derive(Debug, Clone)]
pub struct CategoryOrder {
    table: Arc<CategoryTable>,
}

impl Default for CategoryOrder {
    fn default() -> Self {
        Self::new(DEFAULT_CATEGORIES, UNKNOWN_CATEGORY_PRIORITY)
    }
}

impl CategoryOrder {
    /// Priorities follow list position, starting at 1.
    pub fn new<I, S>(categories: I, unknown: u32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let priorities = categories
            .into_iter()
            .zip(1u32..)
            .map(|(c, p)| (c.into(), p))
            .collect();
        Self {
            table: Arc::new(CategoryTable { priorities, unknown }),
        }
    }

    pub fn priority(&self, category: &str) -> u32 {
        self.table
            .priorities
            .get(category)
            .copied()
            .unwrap_or(self.table.unknown)
    }

    pub fn unknown_priority(&self) -> u32 {
        self.table.unknown
    }

    /// Sort results in place. Stable: ties keep input order.
    ///
    /// Key: category priority, then exact instant (computed before failed),
    /// then display name. Rounding never participates.
    pub fn sort(&self, results: &mut [CalculatedResult]) {
        results.sort_by(|a, b| compare(a, b));
    }
}

fn display_key(r: &CalculatedResult) -> &str {
    r.hebrew_name.as_deref().unwrap_or(&r.name)
}

/// Ordering used by [`CategoryOrder::sort`]; expects `category_priority`
/// to be filled in.
pub fn compare(a: &CalculatedResult, b: &CalculatedResult) -> Ordering {
    let by_time = match (a.time(), b.time()) {
        (Some(x), Some(y)) => x.exact.cmp(&y.exact),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    a.category_priority
        .cmp(&b.category_priority)
        .then(by_time)
        .then_with(|| display_key(a).cmp(display_key(b)))
}
