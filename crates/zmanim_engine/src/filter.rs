//! Tag-driven visibility for calendar events.
//!
//! Whether an entry shows on a date is decided from data only: a table
//! mapping behavior tags to event codes, and the codes active that day.
//! Adding a rule means adding a row to [`TagMappings`].

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::model::EntryTag;

/// Behavior tag and timing modifier tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagMappings {
    /// Behavior tag -> event codes, any one of which satisfies the tag.
    pub behaviors: BTreeMap<String, BTreeSet<String>>,
    /// Timing modifier tag -> prefix applied to the codes of the entry's
    /// other positive tags, e.g. `day_before` -> `erev_`.
    pub timing: BTreeMap<String, String>,
}

impl TagMappings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or extend a behavior tag mapping.
    pub fn with_behavior<I, S>(mut self, tag: impl Into<String>, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.behaviors
            .entry(tag.into())
            .or_default()
            .extend(codes.into_iter().map(Into::into));
        self
    }

    pub fn with_timing(mut self, tag: impl Into<String>, prefix: impl Into<String>) -> Self {
        self.timing.insert(tag.into(), prefix.into());
        self
    }

    /// The built-in modifiers: `day_before` -> `erev_`, `motzei` -> no prefix.
    pub fn with_default_timing(self) -> Self {
        self.with_timing("day_before", "erev_").with_timing("motzei", "")
    }

    pub fn is_empty(&self) -> bool {
        self.behaviors.is_empty()
    }

    /// Whether an entry with `tags` shows when `active` codes are in effect.
    ///
    /// - every positive behavior tag needs at least one of its codes active
    ///   (after applying timing prefixes)
    /// - a negated behavior tag hides the entry when any of its codes is
    ///   active
    /// - tags absent from the table are display-only and ignored
    pub fn should_include(&self, tags: &[EntryTag], active: &BTreeSet<String>) -> bool {
        let prefixes: Vec<&str> = tags
            .iter()
            .filter(|t| !t.negated)
            .filter_map(|t| self.timing.get(&t.key).map(String::as_str))
            .collect();

        for tag in tags {
            if self.timing.contains_key(&tag.key) {
                continue;
            }
            let Some(codes) = self.behaviors.get(&tag.key) else {
                continue;
            };
            if tag.negated {
                if codes.iter().any(|c| active.contains(c)) {
                    return false;
                }
            } else if !requirement_met(codes, &prefixes, active) {
                return false;
            }
        }
        true
    }
}

fn requirement_met(codes: &BTreeSet<String>, prefixes: &[&str], active: &BTreeSet<String>) -> bool {
    if prefixes.is_empty() {
        return codes.iter().any(|c| active.contains(c));
    }
    codes.iter().any(|c| {
        prefixes
            .iter()
            .any(|p| active.contains(format!("{p}{c}").as_str()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active(codes: &[&str]) -> BTreeSet<String> {
        codes.iter().map(|c| c.to_string()).collect()
    }

    fn mappings() -> TagMappings {
        TagMappings::new()
            .with_behavior("candle_lighting", ["erev_shabbos", "erev_yom_tov"])
            .with_behavior("shabbos", ["shabbos"])
            .with_behavior("fast_day", ["taanis", "yom_kippur"])
            .with_behavior("chanukah", ["chanukah"])
            .with_default_timing()
    }

    #[test]
    fn untagged_always_shows() {
        assert!(mappings().should_include(&[], &active(&[])));
    }

    #[test]
    fn positive_tag_needs_a_code() {
        let m = mappings();
        let tags = [EntryTag::new("candle_lighting")];
        assert!(m.should_include(&tags, &active(&["erev_shabbos"])));
        assert!(m.should_include(&tags, &active(&["erev_yom_tov"])));
        assert!(!m.should_include(&tags, &active(&["shabbos"])));
    }

    #[test]
    fn negated_tag_hides() {
        let m = mappings();
        let tags = [EntryTag::negated("shabbos")];
        assert!(m.should_include(&tags, &active(&[])));
        assert!(!m.should_include(&tags, &active(&["shabbos"])));
    }

    #[test]
    fn every_positive_tag_must_hold() {
        let m = mappings();
        let tags = [EntryTag::new("fast_day"), EntryTag::new("chanukah")];
        assert!(!m.should_include(&tags, &active(&["taanis"])));
        assert!(m.should_include(&tags, &active(&["taanis", "chanukah"])));
    }

    #[test]
    fn unknown_tags_are_ignored() {
        let m = mappings();
        let tags = [EntryTag::new("hidden_gem"), EntryTag::negated("also_unknown")];
        assert!(m.should_include(&tags, &active(&[])));
    }

    #[test]
    fn day_before_modifier_prefixes_codes() {
        let m = mappings();
        let tags = [EntryTag::new("day_before"), EntryTag::new("shabbos")];
        assert!(m.should_include(&tags, &active(&["erev_shabbos"])));
        assert!(!m.should_include(&tags, &active(&["shabbos"])));
    }

    #[test]
    fn motzei_modifier_matches_directly() {
        let m = mappings();
        let tags = [EntryTag::new("motzei"), EntryTag::new("shabbos")];
        assert!(m.should_include(&tags, &active(&["shabbos"])));
    }

    #[test]
    fn new_rule_is_a_new_row() {
        let tags = [EntryTag::new("selichos")];
        let before = mappings();
        // unmapped: display only
        assert!(before.should_include(&tags, &active(&[])));
        let after = before.with_behavior("selichos", ["selichos"]);
        assert!(!after.should_include(&tags, &active(&[])));
        assert!(after.should_include(&tags, &active(&["selichos"])));
    }

    #[test]
    fn mappings_round_trip_json() {
        let m = mappings();
        let json = serde_json::to_string(&m).unwrap();
        let back: TagMappings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
        let partial: TagMappings =
            serde_json::from_str(r#"{"behaviors": {"shabbos": ["shabbos"]}}"#).unwrap();
        assert!(partial.timing.is_empty());
    }
}
