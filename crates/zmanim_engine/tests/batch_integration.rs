//! End-to-end batch behavior: caching, invalidation, linking, failures,
//! event filtering, ordering and ranges.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Timelike};
use zmanim_engine::{
    CalcOptions, CalculationErrorKind, DateRange, Engine, EngineConfig, Entry, EntryId, EntryTag,
    LocationContext, RoundingMode, TagMappings,
};

fn engine() -> Engine {
    Engine::new(EngineConfig::default())
        .unwrap()
        .with_tag_mappings(
            TagMappings::new()
                .with_behavior("candle_lighting", ["erev_shabbos", "erev_yom_tov"])
                .with_behavior("shabbos", ["shabbos"])
                .with_default_timing(),
        )
}

fn jerusalem() -> LocationContext {
    LocationContext::new(31.778, 35.235, 0.0, 2 * 3600).with_timezone("Asia/Jerusalem")
}

fn wednesday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 20).unwrap()
}

fn publisher() -> Vec<Entry> {
    vec![
        Entry::new(1, "alos", "dawn", "solar(16.1, before_sunrise)"),
        Entry::new(2, "sunrise", "sunrise", "visible_sunrise"),
        Entry::new(3, "shema", "morning", "proportional_hours(3, gra)"),
        Entry::new(4, "misheyakir", "dawn", "@alos + 30min"),
        Entry::new(5, "sunset", "sunset", "visible_sunset"),
        Entry::new(6, "tzeis", "nightfall", "solar(8.5, after_sunset)"),
    ]
}

#[test]
fn second_batch_is_identical_and_cached() {
    let engine = engine();
    let entries = publisher();
    let opts = CalcOptions::default();
    let first = engine.calculate_batch(&entries, &jerusalem(), wednesday(), &opts).unwrap();
    let second = engine.calculate_batch(&entries, &jerusalem(), wednesday(), &opts).unwrap();

    assert_eq!(first.stats.evaluations, 6);
    assert_eq!(second.stats.evaluations, 0);
    assert_eq!(second.stats.cache_hits, 6);
    assert!(second.results.iter().all(|r| r.from_cache));
    let strip = |b: &zmanim_engine::BatchResult| {
        b.results
            .iter()
            .map(|r| (r.key.clone(), r.outcome.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(strip(&first), strip(&second));
}

#[test]
fn rounding_override_changes_display_not_order() {
    let engine = engine();
    let entries = publisher();
    let order = |mode| {
        let opts = CalcOptions {
            rounding_override: Some(mode),
            ..CalcOptions::default()
        };
        let b = engine.calculate_batch(&entries, &jerusalem(), wednesday(), &opts).unwrap();
        for r in &b.results {
            let t = r.time().unwrap();
            assert_eq!(t.rounded.second(), 0);
            assert_eq!(t.mode, mode);
        }
        b.results.iter().map(|r| r.key.clone()).collect::<Vec<_>>()
    };
    let floor = order(RoundingMode::Floor);
    assert_eq!(floor, order(RoundingMode::Ceil));
    assert_eq!(floor, order(RoundingMode::Math));
    assert_eq!(
        floor,
        vec!["alos", "misheyakir", "sunrise", "shema", "sunset", "tzeis"]
    );
}

#[test]
fn invalidation_is_scoped_to_formula_owner() {
    let engine = engine();
    let mut entries = publisher();
    let opts = CalcOptions::default();
    engine.calculate_batch(&entries, &jerusalem(), wednesday(), &opts).unwrap();

    // alos (1) and misheyakir (4, references @alos) depend on owner 1
    assert_eq!(engine.invalidate(EntryId(1)), 2);

    entries[0].formula = Some("sunrise - 72min".into());
    let after = engine.calculate_batch(&entries, &jerusalem(), wednesday(), &opts).unwrap();
    for r in &after.results {
        let expect_cached = !matches!(r.key.as_str(), "alos" | "misheyakir");
        assert_eq!(r.from_cache, expect_cached, "{}", r.key);
    }
    let alos = after.get("alos").unwrap().time().unwrap().exact;
    let sunrise = after.get("sunrise").unwrap().time().unwrap().exact;
    assert_eq!((sunrise - alos).num_minutes(), 72);
    let mish = after.get("misheyakir").unwrap().time().unwrap().exact;
    assert_eq!((mish - alos).num_minutes(), 30);
}

#[test]
fn invalidation_without_text_change_still_recomputes() {
    let engine = engine();
    let entries = publisher();
    let opts = CalcOptions::default();
    engine.calculate_batch(&entries, &jerusalem(), wednesday(), &opts).unwrap();
    engine.invalidate(EntryId(2));
    let after = engine.calculate_batch(&entries, &jerusalem(), wednesday(), &opts).unwrap();
    assert!(!after.get("sunrise").unwrap().from_cache);
    assert_eq!(after.stats.evaluations, 1);
}

#[test]
fn linkers_share_the_source_cache_entry() {
    let engine = engine();
    let source = vec![Entry::new(100, "alos", "dawn", "alos_16_1")];
    let mine = vec![
        Entry::linked(1, "alos", "dawn", EntryId(100)),
        Entry::linked(2, "alos_again", "dawn", EntryId(100)),
    ];
    let opts = CalcOptions::default();
    let batch = engine
        .calculate_batch_with_sources(&mine, &source, &jerusalem(), wednesday(), &opts)
        .unwrap();
    assert_eq!(batch.stats.evaluations, 1);
    assert_eq!(batch.stats.cache_hits, 1);
    assert!(batch.results.iter().all(|r| r.linked));

    // the source's publisher hits the same entry
    let theirs = engine
        .calculate_batch(&source, &jerusalem(), wednesday(), &opts)
        .unwrap();
    assert!(theirs.results[0].from_cache);

    // editing the source drops it for everyone
    assert_eq!(engine.invalidate(EntryId(100)), 1);
    let again = engine
        .calculate_batch_with_sources(&mine, &source, &jerusalem(), wednesday(), &opts)
        .unwrap();
    assert_eq!(again.stats.evaluations, 1);
}

#[test]
fn broken_link_is_reported_not_hidden() {
    let engine = engine();
    let mut entries = publisher();
    entries.push(Entry::linked(7, "orphan", "morning", EntryId(999)));
    let batch = engine
        .calculate_batch(&entries, &jerusalem(), wednesday(), &CalcOptions::default())
        .unwrap();
    assert_eq!(batch.results.len(), 7);
    let orphan = batch.get("orphan").unwrap();
    assert_eq!(orphan.error().unwrap().kind, CalculationErrorKind::BrokenLink);
    assert_eq!(batch.stats.failures, 1);
    assert!(
        batch
            .results
            .iter()
            .filter(|r| r.key != "orphan")
            .all(|r| r.outcome.is_ok())
    );
}

#[test]
fn failures_are_isolated_and_never_cached() {
    let engine = engine();
    let mut entries = publisher();
    entries.push(Entry::new(8, "bad_ref", "morning", "@nowhere + 5min"));
    entries.push(Entry::new(9, "bad_type", "morning", "sunrise + sunset"));
    let opts = CalcOptions::default();
    let first = engine.calculate_batch(&entries, &jerusalem(), wednesday(), &opts).unwrap();
    assert_eq!(
        first.get("bad_ref").unwrap().error().unwrap().kind,
        CalculationErrorKind::UnknownSymbol
    );
    assert_eq!(
        first.get("bad_type").unwrap().error().unwrap().kind,
        CalculationErrorKind::Evaluation
    );
    assert_eq!(first.stats.failures, 2);

    let second = engine.calculate_batch(&entries, &jerusalem(), wednesday(), &opts).unwrap();
    assert_eq!(second.stats.evaluations, 2);
    assert!(!second.get("bad_ref").unwrap().from_cache);
    // failed entries sort after timed ones in their category
    let morning: Vec<_> = second
        .results
        .iter()
        .filter(|r| r.category == "morning")
        .map(|r| r.key.as_str())
        .collect();
    assert_eq!(morning[0], "shema");
}

#[test]
fn polar_dawn_fails_alone_or_falls_back() {
    let stockholm = LocationContext::new(59.3293, 18.0686, 0.0, 2 * 3600);
    let solstice = NaiveDate::from_ymd_opt(2024, 6, 21).unwrap();
    let entries = vec![
        Entry::new(1, "alos", "dawn", "alos_16_1"),
        Entry::new(2, "sunrise", "sunrise", "sunrise"),
    ];

    let strict = engine();
    let batch = strict
        .calculate_batch(&entries, &stockholm, solstice, &CalcOptions::default())
        .unwrap();
    assert_eq!(
        batch.get("alos").unwrap().error().unwrap().kind,
        CalculationErrorKind::NoCrossing
    );
    assert!(batch.get("sunrise").unwrap().outcome.is_ok());

    let lenient = Engine::new(EngineConfig {
        no_crossing: zmanim_dsl::NoCrossingPolicy::CivilTwilightFallback,
        ..EngineConfig::default()
    })
    .unwrap();
    let batch = lenient
        .calculate_batch(&entries, &stockholm, solstice, &CalcOptions::default())
        .unwrap();
    let alos = batch.get("alos").unwrap().time().unwrap().exact;
    let sunrise = batch.get("sunrise").unwrap().time().unwrap().exact;
    assert!(alos < sunrise);
}

#[test]
fn event_tag_follows_active_codes() {
    let engine = engine();
    let mut entries = publisher();
    entries.push(
        Entry::new(10, "candles", "sunset", "sunset - 18min")
            .with_tag(EntryTag::new("candle_lighting")),
    );
    let location = jerusalem();

    let friday = CalcOptions::default().with_active_events(["erev_shabbos"]);
    let batch = engine.calculate_batch(&entries, &location, wednesday(), &friday).unwrap();
    assert!(batch.get("candles").unwrap().active_today);

    let weekday = CalcOptions::default().with_active_events(Vec::<String>::new());
    let batch = engine.calculate_batch(&entries, &location, wednesday(), &weekday).unwrap();
    assert!(batch.get("candles").is_none());
    assert_eq!(batch.results.len(), 6);

    // no event context at all: nothing is filtered
    let batch = engine
        .calculate_batch(&entries, &location, wednesday(), &CalcOptions::default())
        .unwrap();
    assert!(batch.get("candles").is_some());
}

#[test]
fn oversized_hour_count_fails_only_its_entry() {
    let engine = engine();
    let entries = vec![
        Entry::new(1, "sunrise", "sunrise", "visible_sunrise"),
        Entry::new(2, "runaway", "morning", "proportional_hours(10000000000, gra)"),
        Entry::new(3, "shema", "morning", "proportional_hours(3, gra)"),
    ];
    let batch = engine
        .calculate_batch(&entries, &jerusalem(), wednesday(), &CalcOptions::default())
        .unwrap();

    assert_eq!(
        batch.get("runaway").unwrap().error().unwrap().kind,
        CalculationErrorKind::Evaluation
    );
    assert!(batch.get("sunrise").unwrap().outcome.is_ok());
    assert!(batch.get("shema").unwrap().outcome.is_ok());

    // the failure is not cached as a value; a retry reports it again
    let again = engine
        .calculate_batch(&entries, &jerusalem(), wednesday(), &CalcOptions::default())
        .unwrap();
    assert!(again.get("runaway").unwrap().outcome.is_err());
}

#[test]
fn new_rule_needs_only_a_mapping_row() {
    let engine = engine();
    let entries = vec![
        Entry::new(1, "selichos", "dawn", "solar_midnight + 30min").with_tag(EntryTag::new("selichos")),
    ];
    let opts = CalcOptions::default().with_active_events(Vec::<String>::new());
    let shown = engine.calculate_batch(&entries, &jerusalem(), wednesday(), &opts).unwrap();
    assert_eq!(shown.results.len(), 1);

    let current = engine.tag_mappings();
    engine.set_tag_mappings((*current).clone().with_behavior("selichos", ["selichos"]));
    let hidden = engine.calculate_batch(&entries, &jerusalem(), wednesday(), &opts).unwrap();
    assert!(hidden.results.is_empty());
}

#[test]
fn range_is_ordered_and_uses_per_date_events() {
    let engine = engine();
    let mut entries = publisher();
    entries.push(
        Entry::new(10, "candles", "sunset", "sunset - 18min")
            .with_tag(EntryTag::new("candle_lighting")),
    );
    // fails on the 21st only
    entries.push(Entry::new(11, "quirk", "morning", "if (day == 21) { @missing } else { sunrise + 1h }"));

    let start = wednesday();
    let end = NaiveDate::from_ymd_opt(2024, 3, 26).unwrap();
    let friday = NaiveDate::from_ymd_opt(2024, 3, 22).unwrap();
    let events: BTreeMap<NaiveDate, BTreeSet<String>> =
        BTreeMap::from([(friday, BTreeSet::from(["erev_shabbos".to_string()]))]);

    let days = engine
        .calculate_range(
            &entries,
            &[],
            &jerusalem(),
            DateRange::new(start, end),
            &CalcOptions::default(),
            Some(&events),
        )
        .unwrap();
    assert_eq!(days.len(), 7);
    for (i, day) in days.iter().enumerate() {
        assert_eq!(day.date, start + chrono::Duration::days(i as i64));
        assert!(day.error.is_none());
        assert_eq!(day.results.iter().any(|r| r.key == "candles"), day.date == friday);
        let quirk = day.results.iter().find(|r| r.key == "quirk").unwrap();
        assert_eq!(quirk.outcome.is_err(), day.date.day() == 21, "{}", day.date);
        assert!(day.results.iter().filter(|r| r.key != "quirk").all(|r| r.outcome.is_ok()));
    }

    // sunrise moves earlier through late March
    let first = days[0].results.iter().find(|r| r.key == "sunrise").unwrap();
    let last = days[6].results.iter().find(|r| r.key == "sunrise").unwrap();
    let tod = |r: &zmanim_engine::CalculatedResult| r.time().unwrap().exact.time();
    assert!(tod(last) < tod(first));
}

#[test]
fn range_workers_share_one_engine() {
    let engine = Arc::new(
        Engine::new(EngineConfig {
            range_workers: 3,
            ..EngineConfig::default()
        })
        .unwrap(),
    );
    let entries = publisher();
    let range = DateRange::new(wednesday(), NaiveDate::from_ymd_opt(2024, 4, 19).unwrap());
    let days = engine
        .calculate_range(&entries, &[], &jerusalem(), range, &CalcOptions::default(), None)
        .unwrap();
    assert_eq!(days.len(), 31);
    assert!(days.windows(2).all(|w| w[0].date < w[1].date));

    let again = engine
        .calculate_range(&entries, &[], &jerusalem(), range, &CalcOptions::default(), None)
        .unwrap();
    assert!(again.iter().all(|d| d.stats.evaluations == 0));
}

#[test]
fn concurrent_batches_converge() {
    let engine = Arc::new(engine());
    let entries = Arc::new(publisher());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let entries = Arc::clone(&entries);
            std::thread::spawn(move || {
                engine
                    .calculate_batch(&entries, &jerusalem(), wednesday(), &CalcOptions::default())
                    .unwrap()
            })
        })
        .collect();
    let batches: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for b in &batches[1..] {
        let times = |b: &zmanim_engine::BatchResult| {
            b.results
                .iter()
                .map(|r| r.time().unwrap().exact)
                .collect::<Vec<_>>()
        };
        assert_eq!(times(b), times(&batches[0]));
    }
    assert_eq!(engine.cache_stats().entries, 6);
}
