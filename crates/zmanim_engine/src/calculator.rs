//! Batch, range and preview calculation.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{FixedOffset, NaiveDate};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use zmanim_dsl::{
    DslError, EvaluationContext, Expr, References, calculation_order, evaluate, evaluate_with_breakdown,
    extract_references, order_formulas, parse,
};

use crate::cache::{CacheKey, CacheStats, PreviewCache, ResultCache, preview_key};
use crate::config::EngineConfig;
use crate::error::{CalculationError, CalculationErrorKind, EngineError};
use crate::filter::TagMappings;
use crate::linking::{EffectiveFormula, EntryIndex, resolve_effective_formula};
use crate::model::{
    BatchResult, BatchStats, CalcOptions, CalculatedResult, DayResult, Entry, EntryId, FormulaPreview,
    LocationContext,
};
use crate::ordering::CategoryOrder;
use crate::rounding::{RoundedTime, RoundingMode, apply_rounding};

/// Inclusive span of civil dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn single(date: NaiveDate) -> Self {
        Self::new(date, date)
    }

    /// Number of dates, or `None` when `end` precedes `start`.
    pub fn day_count(&self) -> Option<usize> {
        let days = (self.end - self.start).num_days();
        usize::try_from(days).ok().map(|d| d + 1)
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        let n = self.day_count().unwrap_or(0);
        self.start.iter_days().take(n).collect()
    }
}

/// Calculation engine.
///
/// `Engine` is [`Send`] + [`Sync`] and meant to be shared via `Arc<Engine>`.
/// The result cache is the only state shared between calls; tag mappings
/// can be swapped at runtime without blocking running batches.
pub struct Engine {
    config: EngineConfig,
    categories: CategoryOrder,
    tag_mappings: RwLock<Arc<TagMappings>>,
    cache: ResultCache,
    previews: PreviewCache,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            categories: config.category_order(),
            tag_mappings: RwLock::new(Arc::new(TagMappings::new().with_default_timing())),
            cache: ResultCache::new(),
            previews: PreviewCache::new(
                config.preview_cache_capacity,
                Duration::from_secs(config.preview_ttl_secs),
            ),
            config,
        })
    }

    pub fn with_tag_mappings(self, mappings: TagMappings) -> Self {
        self.set_tag_mappings(mappings);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn categories(&self) -> &CategoryOrder {
        &self.categories
    }

    /// Snapshot of the current tag mappings.
    pub fn tag_mappings(&self) -> Arc<TagMappings> {
        match self.tag_mappings.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Replace the tag mappings; batches already running keep their snapshot.
    pub fn set_tag_mappings(&self, mappings: TagMappings) {
        let next = Arc::new(mappings);
        match self.tag_mappings.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drop cached results derived from `owner`'s formula.
    ///
    /// Call after committing an edit to that entry. Returns the number of
    /// cache entries removed.
    pub fn invalidate(&self, owner: EntryId) -> usize {
        self.cache.invalidate(owner)
    }

    /// Calculate every admitted entry for one date.
    ///
    /// # Arguments
    /// * `entries` - the publisher's entries; `@key` references resolve here
    /// * `location` - coordinates and display offset
    /// * `date` - civil date
    /// * `options` - visibility, rounding and event switches
    ///
    /// # Returns
    /// Per-entry results sorted for display. Only an invalid context fails
    /// the whole batch; every other failure is carried on its entry.
    pub fn calculate_batch(
        &self,
        entries: &[Entry],
        location: &LocationContext,
        date: NaiveDate,
        options: &CalcOptions,
    ) -> Result<BatchResult, EngineError> {
        self.calculate_batch_with_sources(entries, &[], location, date, options)
    }

    /// Like [`Engine::calculate_batch`], with extra entries that links may
    /// point at (typically another publisher's).
    pub fn calculate_batch_with_sources(
        &self,
        entries: &[Entry],
        sources: &[Entry],
        location: &LocationContext,
        date: NaiveDate,
        options: &CalcOptions,
    ) -> Result<BatchResult, EngineError> {
        let ctx = location.evaluation_context(date, &self.config)?;
        let index = EntryIndex::new(entries.iter().chain(sources));
        let mappings = self.tag_mappings();
        Ok(self.run_batch(entries, &index, location, &ctx, options, &mappings))
    }

    fn run_batch(
        &self,
        entries: &[Entry],
        index: &EntryIndex<'_>,
        location: &LocationContext,
        ctx: &EvaluationContext,
        options: &CalcOptions,
        mappings: &TagMappings,
    ) -> BatchResult {
        let plan = Plan::build(entries, index, options);
        let mut run = Run {
            cache: &self.cache,
            ctx,
            location,
            outcomes: vec![None; plan.nodes.len()],
            lineage: vec![None; plan.nodes.len()],
            refs: References::new(),
            stats: BatchStats::default(),
        };
        for &i in &plan.order {
            let rounding = options.rounding_for(plan.nodes[i].entry, self.config.default_rounding);
            let outcome = match plan.cyclic.get(&i) {
                Some(e) => Outcome::failed(e.clone()),
                None => run.evaluate(&plan, i, rounding),
            };
            run.outcomes[i] = Some(outcome);
        }

        let mut results = Vec::new();
        for (i, node) in plan.nodes.iter().enumerate() {
            if !node.requested {
                continue;
            }
            let entry = node.entry;
            let active_today = options
                .active_event_codes
                .as_ref()
                .is_none_or(|codes| mappings.should_include(&entry.tags, codes));
            if !active_today && !options.include_inactive {
                debug!(key = %entry.key, "hidden by event filter");
                continue;
            }
            let outcome = run.outcomes[i].take().unwrap_or_else(|| {
                Outcome::failed(CalculationError::new(
                    CalculationErrorKind::Evaluation,
                    "entry was not scheduled",
                ))
            });
            if let Err(e) = &outcome.result {
                run.stats.failures += 1;
                warn!(key = %entry.key, kind = %e.kind, error = %e.message, "entry failed");
            }
            results.push(CalculatedResult {
                entry_id: entry.id,
                key: entry.key.clone(),
                name: entry.name.clone(),
                hebrew_name: entry.hebrew_name.clone(),
                category: entry.category.clone(),
                category_priority: self.categories.priority(&entry.category),
                rounding: options.rounding_for(entry, self.config.default_rounding),
                outcome: outcome.result,
                active_today,
                from_cache: outcome.from_cache,
                linked: entry.is_linked(),
            });
        }
        self.categories.sort(&mut results);
        debug!(
            date = %ctx.date(),
            results = results.len(),
            evaluations = run.stats.evaluations,
            cache_hits = run.stats.cache_hits,
            "batch complete"
        );
        BatchResult {
            date: ctx.date(),
            results,
            stats: run.stats,
        }
    }

    /// Number of dates in `range`, if the engine accepts it.
    pub fn check_range(&self, range: DateRange) -> Result<usize, EngineError> {
        let days = range
            .day_count()
            .ok_or_else(|| EngineError::InvalidRange(format!("{} is before {}", range.end, range.start)))?;
        if days > self.config.max_range_days as usize {
            return Err(EngineError::InvalidRange(format!(
                "{days} days exceeds the limit of {}",
                self.config.max_range_days
            )));
        }
        Ok(days)
    }

    /// Calculate a batch for each date of a range on worker threads.
    ///
    /// # Arguments
    /// * `entries`, `sources` - as for [`Engine::calculate_batch_with_sources`]
    /// * `range` - inclusive dates, at most `max_range_days` long
    /// * `options` - shared by every date
    /// * `events_by_date` - active event codes per date; a date missing from
    ///   the map has none. `None` keeps the codes in `options`.
    ///
    /// # Returns
    /// One [`DayResult`] per date in date order. A date whose context cannot
    /// be built carries the error instead of results.
    pub fn calculate_range(
        &self,
        entries: &[Entry],
        sources: &[Entry],
        location: &LocationContext,
        range: DateRange,
        options: &CalcOptions,
        events_by_date: Option<&BTreeMap<NaiveDate, BTreeSet<String>>>,
    ) -> Result<Vec<DayResult>, EngineError> {
        self.check_range(range)?;
        let dates = range.dates();
        let index = EntryIndex::new(entries.iter().chain(sources));
        let mappings = self.tag_mappings();
        let next = AtomicUsize::new(0);
        let workers = self.config.workers().clamp(1, dates.len().max(1));

        let day = |date: NaiveDate| -> DayResult {
            let mut opts = options.clone();
            if let Some(events) = events_by_date {
                opts.active_event_codes = Some(events.get(&date).cloned().unwrap_or_default());
            }
            match location.evaluation_context(date, &self.config) {
                Ok(ctx) => self
                    .run_batch(entries, &index, location, &ctx, &opts, &mappings)
                    .into(),
                Err(e) => {
                    warn!(%date, error = %e, "day skipped");
                    DayResult {
                        date,
                        results: Vec::new(),
                        stats: BatchStats::default(),
                        error: Some(e.to_string()),
                    }
                }
            }
        };

        let joined = std::thread::scope(|s| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    s.spawn(|| {
                        let mut done = Vec::new();
                        loop {
                            let i = next.fetch_add(1, Ordering::Relaxed);
                            let Some(&date) = dates.get(i) else { break };
                            done.push((i, day(date)));
                        }
                        done
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join()).collect::<Vec<_>>()
        });

        let mut slots: Vec<Option<DayResult>> = vec![None; dates.len()];
        for part in joined {
            let part = part.map_err(|_| EngineError::Internal("range worker panicked".into()))?;
            for (i, result) in part {
                slots[i] = Some(result);
            }
        }
        slots
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| EngineError::Internal("range date left unprocessed".into()))
    }

    /// Evaluate formula text outside any entry, for authoring previews.
    ///
    /// # Arguments
    /// * `formula` - text to evaluate; syntax errors are returned as-is
    /// * `location`, `date` - where and when
    /// * `rounding` - `None` uses the configured default
    /// * `references` - formulas available as `@key`, evaluated first
    /// * `breakdown` - record intermediate steps
    ///
    /// # Returns
    /// The rounded preview. Results live only in the bounded preview cache.
    pub fn calculate_single_formula(
        &self,
        formula: &str,
        location: &LocationContext,
        date: NaiveDate,
        rounding: Option<RoundingMode>,
        references: &BTreeMap<String, String>,
        breakdown: bool,
    ) -> Result<FormulaPreview, EngineError> {
        let expr = parse(formula)?;
        let ctx = location.evaluation_context(date, &self.config)?;
        let rounding = rounding.unwrap_or(self.config.default_rounding);

        let refs_part = references
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("\n");
        let date_part = date.to_string();
        let location_part = format!("{location:?}");
        let key = preview_key(
            formula,
            &[
                date_part.as_str(),
                location_part.as_str(),
                rounding.name(),
                if breakdown { "breakdown" } else { "plain" },
                refs_part.as_str(),
            ],
        );
        if let Some(mut hit) = self.previews.get(&key) {
            hit.from_cache = true;
            return Ok(hit);
        }

        let refs = evaluate_references(references, &ctx)?;
        let (instant, steps) = if breakdown {
            let e = evaluate_with_breakdown(&expr, &ctx, &refs)?;
            (e.instant, e.breakdown)
        } else {
            (evaluate(&expr, &ctx, &refs)?, None)
        };
        let preview = FormulaPreview {
            formula: formula.to_string(),
            date,
            time: apply_rounding(instant, rounding, ctx.utc_offset()),
            breakdown: steps,
            from_cache: false,
        };
        self.previews.insert(key, preview.clone());
        Ok(preview)
    }
}

fn evaluate_references(
    references: &BTreeMap<String, String>,
    ctx: &EvaluationContext,
) -> Result<References, DslError> {
    let mut refs = References::new();
    for key in order_formulas(references)? {
        let Some(src) = references.get(&key) else { continue };
        let t = evaluate(&parse(src)?, ctx, &refs)?;
        refs.insert(key, t);
    }
    Ok(refs)
}

struct Prepared {
    formula: EffectiveFormula,
    expr: Expr,
    refs: BTreeSet<String>,
}

struct Node<'e> {
    entry: &'e Entry,
    requested: bool,
    prepared: Result<Prepared, CalculationError>,
}

impl<'e> Node<'e> {
    fn new(entry: &'e Entry, requested: bool, index: &EntryIndex<'_>) -> Self {
        Self {
            entry,
            requested,
            prepared: prepare(entry, index),
        }
    }

    fn refs(&self) -> impl Iterator<Item = &String> {
        self.prepared.iter().flat_map(|p| p.refs.iter())
    }
}

fn prepare(entry: &Entry, index: &EntryIndex<'_>) -> Result<Prepared, CalculationError> {
    let formula = resolve_effective_formula(entry, index)?;
    let expr = parse(&formula.text)?;
    let refs = extract_references(&expr);
    Ok(Prepared { formula, expr, refs })
}

/// Which entries to evaluate and in what order.
struct Plan<'e> {
    nodes: Vec<Node<'e>>,
    /// Key -> node that answers `@key`.
    by_key: HashMap<&'e str, usize>,
    order: Vec<usize>,
    cyclic: HashMap<usize, CalculationError>,
}

impl<'e> Plan<'e> {
    /// Admitted entries, plus any non-admitted entries they reference
    /// (evaluated for their value but not reported).
    fn build(entries: &'e [Entry], index: &EntryIndex<'_>, options: &CalcOptions) -> Self {
        let mut nodes = Vec::new();
        let mut by_key: HashMap<&'e str, usize> = HashMap::new();
        for entry in entries.iter().filter(|e| options.admits(e)) {
            by_key.entry(entry.key.as_str()).or_insert(nodes.len());
            nodes.push(Node::new(entry, true, index));
        }

        let mut support: HashMap<&'e str, &'e Entry> = HashMap::new();
        for entry in entries
            .iter()
            .filter(|e| !options.admits(e) && (options.include_deleted || !e.deleted))
        {
            support.entry(entry.key.as_str()).or_insert(entry);
        }
        let mut i = 0;
        while i < nodes.len() {
            let wanted: Vec<&'e Entry> = nodes[i]
                .refs()
                .filter(|r| !by_key.contains_key(r.as_str()))
                .filter_map(|r| support.get(r.as_str()).copied())
                .collect();
            for entry in wanted {
                if !by_key.contains_key(entry.key.as_str()) {
                    by_key.insert(entry.key.as_str(), nodes.len());
                    nodes.push(Node::new(entry, false, index));
                }
            }
            i += 1;
        }

        let deps: BTreeMap<String, BTreeSet<String>> = by_key
            .iter()
            .map(|(&k, &i)| (k.to_string(), nodes[i].refs().cloned().collect()))
            .collect();
        let computed = calculation_order(&deps);

        let mut order: Vec<usize> = computed
            .ordered
            .iter()
            .filter_map(|k| by_key.get(k.as_str()).copied())
            .collect();
        let mut cyclic = HashMap::new();
        if !computed.cyclic.is_empty() {
            let err = CalculationError::from(DslError::CircularDependency(computed.cyclic.clone()));
            for k in &computed.cyclic {
                if let Some(&i) = by_key.get(k.as_str()) {
                    cyclic.insert(i, err.clone());
                    order.push(i);
                }
            }
        }
        // Entries whose key is shadowed by an earlier one: nothing can
        // reference them, so they go last.
        for (i, node) in nodes.iter().enumerate() {
            if by_key.get(node.entry.key.as_str()) != Some(&i) {
                order.push(i);
            }
        }

        Self {
            nodes,
            by_key,
            order,
            cyclic,
        }
    }
}

#[derive(Debug, Clone)]
struct Outcome {
    result: Result<RoundedTime, CalculationError>,
    from_cache: bool,
}

impl Outcome {
    fn failed(e: CalculationError) -> Self {
        Self {
            result: Err(e),
            from_cache: false,
        }
    }
}

/// Cache lineage of a computed node: what its value was derived from.
#[derive(Debug, Clone)]
struct Lineage {
    fingerprint: String,
    watched: BTreeMap<EntryId, u64>,
}

/// Mutable state of one batch evaluation.
struct Run<'a> {
    cache: &'a ResultCache,
    ctx: &'a EvaluationContext,
    location: &'a LocationContext,
    outcomes: Vec<Option<Outcome>>,
    lineage: Vec<Option<Lineage>>,
    refs: References,
    stats: BatchStats,
}

impl Run<'_> {
    fn evaluate(&mut self, plan: &Plan<'_>, i: usize, rounding: RoundingMode) -> Outcome {
        let node = &plan.nodes[i];
        let prepared = match &node.prepared {
            Ok(p) => p,
            Err(e) => return Outcome::failed(e.clone()),
        };

        let owner = prepared.formula.identity.owner;
        let generation = self.cache.generation(owner);
        let mut watched = BTreeMap::from([(owner, generation)]);
        let mut deps = Sha256::new();
        for r in &prepared.refs {
            // unknown keys are reported by the evaluator
            let Some(&j) = plan.by_key.get(r.as_str()) else {
                continue;
            };
            let dep_ok = matches!(&self.outcomes[j], Some(Outcome { result: Ok(_), .. }));
            match (&self.lineage[j], dep_ok) {
                (Some(l), true) => {
                    deps.update(r.as_bytes());
                    deps.update([0u8]);
                    deps.update(l.fingerprint.as_bytes());
                    watched.extend(l.watched.iter().map(|(k, v)| (*k, *v)));
                }
                _ => {
                    return Outcome::failed(CalculationError::new(
                        CalculationErrorKind::Evaluation,
                        format!("reference @{r} could not be calculated"),
                    ));
                }
            }
        }
        let dependencies = hex::encode(deps.finalize());
        let fingerprint = {
            let mut h = Sha256::new();
            h.update(prepared.formula.identity.to_string().as_bytes());
            h.update(generation.to_le_bytes());
            h.update(dependencies.as_bytes());
            hex::encode(h.finalize())
        };

        let key = CacheKey {
            identity: prepared.formula.identity.clone(),
            generation,
            dependencies,
            location: self.location.cache_identity(),
            date: self.ctx.date(),
            rounding,
        };
        let entry_key = node.entry.key.as_str();
        self.lineage[i] = Some(Lineage {
            fingerprint,
            watched: watched.clone(),
        });

        if let Some(hit) = self.cache.get(&key) {
            debug!(key = entry_key, "cache hit");
            self.stats.cache_hits += 1;
            self.refs.insert(entry_key.to_string(), hit.exact);
            return Outcome {
                result: Ok(hit),
                from_cache: true,
            };
        }

        self.stats.evaluations += 1;
        match evaluate(&prepared.expr, self.ctx, &self.refs) {
            Ok(instant) => {
                let rounded = apply_rounding(instant, rounding, self.offset());
                let watched: Vec<(EntryId, u64)> = watched.into_iter().collect();
                if !self.cache.insert(key, rounded.clone(), &watched) {
                    debug!(key = entry_key, "result not cached: formula changed during evaluation");
                }
                self.refs.insert(entry_key.to_string(), instant);
                Outcome {
                    result: Ok(rounded),
                    from_cache: false,
                }
            }
            Err(e) => Outcome::failed(e.into()),
        }
    }

    fn offset(&self) -> FixedOffset {
        self.ctx.utc_offset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntryTag;

    fn engine() -> Engine {
        Engine::new(EngineConfig::default()).unwrap()
    }

    fn jerusalem() -> LocationContext {
        LocationContext::new(31.778, 35.235, 0.0, 2 * 3600).with_timezone("Asia/Jerusalem")
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 20).unwrap()
    }

    #[test]
    fn engine_rejects_invalid_config() {
        let config = EngineConfig {
            max_range_days: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(Engine::new(config), Err(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn references_follow_dependencies() {
        let entries = vec![
            Entry::new(2, "shema", "morning", "proportional_hours(3, custom(@alos, @tzeis))"),
            Entry::new(1, "alos", "dawn", "solar(16.1, before_sunrise)"),
            Entry::new(3, "tzeis", "nightfall", "solar(16.1, after_sunset)"),
        ];
        let batch = engine()
            .calculate_batch(&entries, &jerusalem(), date(), &CalcOptions::default())
            .unwrap();
        assert_eq!(batch.results.len(), 3);
        assert!(batch.results.iter().all(|r| r.outcome.is_ok()));
        // sorted by category
        let keys: Vec<_> = batch.results.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["alos", "shema", "tzeis"]);
    }

    #[test]
    fn hidden_entry_still_serves_references() {
        let mut alos = Entry::new(1, "alos", "dawn", "alos_72");
        alos.published = false;
        let entries = vec![alos, Entry::new(2, "misheyakir", "dawn", "@alos + 30min")];
        let batch = engine()
            .calculate_batch(&entries, &jerusalem(), date(), &CalcOptions::default())
            .unwrap();
        assert_eq!(batch.results.len(), 1);
        assert!(batch.get("misheyakir").unwrap().outcome.is_ok());
    }

    #[test]
    fn cycle_members_fail_others_succeed() {
        let entries = vec![
            Entry::new(1, "a", "morning", "@b + 1min"),
            Entry::new(2, "b", "morning", "@a - 1min"),
            Entry::new(3, "c", "morning", "sunrise"),
            Entry::new(4, "d", "morning", "@d"),
        ];
        let batch = engine()
            .calculate_batch(&entries, &jerusalem(), date(), &CalcOptions::default())
            .unwrap();
        for k in ["a", "b", "d"] {
            let e = batch.get(k).unwrap().error().unwrap();
            assert_eq!(e.kind, CalculationErrorKind::CircularDependency, "{k}");
        }
        assert!(batch.get("c").unwrap().outcome.is_ok());
        assert_eq!(batch.stats.failures, 3);
    }

    #[test]
    fn dependent_of_failed_entry_reports_it() {
        let entries = vec![
            Entry::new(1, "broken", "dawn", "moonrise"),
            Entry::new(2, "later", "dawn", "@broken + 5min"),
        ];
        let batch = engine()
            .calculate_batch(&entries, &jerusalem(), date(), &CalcOptions::default())
            .unwrap();
        assert_eq!(
            batch.get("broken").unwrap().error().unwrap().kind,
            CalculationErrorKind::UnknownSymbol
        );
        let later = batch.get("later").unwrap().error().unwrap();
        assert_eq!(later.kind, CalculationErrorKind::Evaluation);
        assert!(later.message.contains("@broken"));
    }

    #[test]
    fn invalid_location_fails_whole_batch() {
        let loc = LocationContext::new(123.0, 0.0, 0.0, 0);
        let err = engine()
            .calculate_batch(&[], &loc, date(), &CalcOptions::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidContext(_)));
    }

    #[test]
    fn inactive_entries_kept_when_requested() {
        let engine = engine().with_tag_mappings(
            TagMappings::new()
                .with_behavior("candle_lighting", ["erev_shabbos"])
                .with_default_timing(),
        );
        let entries = vec![
            Entry::new(1, "candles", "sunset", "sunset - 18min").with_tag(EntryTag::new("candle_lighting")),
        ];
        let opts = CalcOptions {
            include_inactive: true,
            ..CalcOptions::default().with_active_events(["chanukah"])
        };
        let batch = engine.calculate_batch(&entries, &jerusalem(), date(), &opts).unwrap();
        assert_eq!(batch.results.len(), 1);
        assert!(!batch.results[0].active_today);
    }

    #[test]
    fn preview_parse_error_is_synchronous() {
        let err = engine()
            .calculate_single_formula("sunrise +", &jerusalem(), date(), None, &BTreeMap::new(), false)
            .unwrap_err();
        match err {
            EngineError::Formula(e) => assert_eq!(e.kind(), zmanim_dsl::ErrorKind::Parse),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn preview_uses_reference_formulas_and_cache() {
        let engine = engine();
        let refs = BTreeMap::from([("alos".to_string(), "sunrise - 72min".to_string())]);
        let first = engine
            .calculate_single_formula("@alos + 30min", &jerusalem(), date(), None, &refs, true)
            .unwrap();
        assert!(!first.from_cache);
        assert!(first.breakdown.as_ref().is_some_and(|b| !b.is_empty()));
        let second = engine
            .calculate_single_formula("@alos + 30min", &jerusalem(), date(), None, &refs, true)
            .unwrap();
        assert!(second.from_cache);
        assert_eq!(first.time, second.time);
        // never touches the permanent cache
        assert_eq!(engine.cache_stats().entries, 0);
    }

    #[test]
    fn range_rejects_reversed_and_oversized() {
        let engine = engine();
        let start = date();
        let reversed = DateRange::new(start, start.pred_opt().unwrap());
        assert!(matches!(
            engine.calculate_range(&[], &[], &jerusalem(), reversed, &CalcOptions::default(), None),
            Err(EngineError::InvalidRange(_))
        ));
        let long = DateRange::new(start, start + chrono::Duration::days(366));
        assert!(matches!(
            engine.calculate_range(&[], &[], &jerusalem(), long, &CalcOptions::default(), None),
            Err(EngineError::InvalidRange(_))
        ));
    }

    #[test]
    fn date_range_day_count() {
        let d = date();
        assert_eq!(DateRange::single(d).day_count(), Some(1));
        assert_eq!(DateRange::new(d, d + chrono::Duration::days(6)).dates().len(), 7);
        assert_eq!(DateRange::new(d, d.pred_opt().unwrap()).day_count(), None);
    }

    // Compile-time assertion: Engine must be Send + Sync.
    #[allow(dead_code)]
    const _: () = {
        fn assert_send_sync<T: Send + Sync>() {}
        fn check() {
            assert_send_sync::<Engine>();
        }
    };
}
