use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use async_trait::async_trait;
use chrono::{FixedOffset, NaiveDate};
use clap::{Args, Parser, Subcommand};
use tracing::debug;
use zmanim_astro::{SolarResult, SunTimes};
use zmanim_engine::{CalcOptions, Entry, LocationContext, RoundedTime, RoundingMode, TagMappings, apply_rounding};
use zmanim_service::{
    CalculateRequest, CollaboratorError, EventClassifier, MemoryEntryStore, MemoryTagMappings,
    PreviewRequest, RangeRequest, ServiceConfig, StaticEvents, StaticLocations, ZmanimService,
};

const PUBLISHER: u64 = 0;
const LOCALITY: u64 = 0;

#[derive(Parser)]
#[command(name = "zmanim", about = "Zmanim formula calculator")]
struct Cli {
    /// Service config (TOML); engine settings go under [engine]
    #[arg(long, global = true, env = "ZMANIM_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct Place {
    /// Latitude in degrees, north positive
    #[arg(long, allow_hyphen_values = true)]
    lat: f64,
    /// Longitude in degrees, east positive
    #[arg(long, allow_hyphen_values = true)]
    lon: f64,
    /// Elevation in meters
    #[arg(long, default_value = "0")]
    elevation: f64,
    /// UTC offset in minutes used for local times
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    offset_minutes: i32,
    /// IANA zone name, reported only
    #[arg(long)]
    timezone: Option<String>,
}

impl Place {
    fn location(&self) -> anyhow::Result<LocationContext> {
        let Some(offset_seconds) = self.offset_minutes.checked_mul(60) else {
            bail!("--offset-minutes {} is out of range", self.offset_minutes);
        };
        let location = LocationContext::new(self.lat, self.lon, self.elevation, offset_seconds);
        location.geo().validate()?;
        location.offset()?;
        Ok(match &self.timezone {
            Some(tz) => location.with_timezone(tz.clone()),
            None => location,
        })
    }
}

#[derive(Args)]
struct EventArgs {
    /// Active event codes (comma separated)
    #[arg(long, value_delimiter = ',')]
    events: Vec<String>,
    /// Add erev_shabbos on Fridays and shabbos on Saturdays
    #[arg(long)]
    weekly_shabbos: bool,
    /// Tag mappings file (JSON)
    #[arg(long)]
    tags: Option<PathBuf>,
    /// Show entries regardless of events
    #[arg(long)]
    include_inactive: bool,
    /// Rounding mode applied to every entry
    #[arg(long)]
    rounding: Option<RoundingMode>,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate one formula
    Eval {
        formula: String,
        #[command(flatten)]
        place: Place,
        /// Date (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        rounding: Option<RoundingMode>,
        /// Reference formula as key=formula, repeatable
        #[arg(long = "ref", value_name = "KEY=FORMULA")]
        refs: Vec<String>,
        /// Print evaluation steps
        #[arg(long)]
        breakdown: bool,
    },
    /// Horizon events for a date
    Sun {
        #[command(flatten)]
        place: Place,
        #[arg(long)]
        date: NaiveDate,
    },
    /// Check a formula without evaluating it
    Validate {
        formula: String,
        /// Key of the entry being edited
        #[arg(long)]
        key: Option<String>,
        /// Keys that may be referenced (comma separated)
        #[arg(long, value_delimiter = ',')]
        available: Option<Vec<String>>,
    },
    /// Calculate a set of entries (JSON file) for one date
    Batch {
        /// Entries file (JSON array)
        #[arg(long)]
        entries: PathBuf,
        #[command(flatten)]
        place: Place,
        #[arg(long)]
        date: NaiveDate,
        #[command(flatten)]
        events: EventArgs,
    },
    /// Calculate a set of entries for each date of a range
    Range {
        #[arg(long)]
        entries: PathBuf,
        #[command(flatten)]
        place: Place,
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
        /// Report only this key
        #[arg(long)]
        key: Option<String>,
        #[command(flatten)]
        events: EventArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("warn".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ServiceConfig::load(path)?,
        None => ServiceConfig::default(),
    };

    match cli.command {
        Commands::Eval {
            formula,
            place,
            date,
            rounding,
            refs,
            breakdown,
        } => {
            let location = place.location()?;
            let service = build_service(config, location.clone(), Vec::new(), None).await?;
            let preview = service
                .preview(&PreviewRequest {
                    formula,
                    location,
                    date,
                    rounding,
                    references: parse_refs(&refs)?,
                    breakdown,
                })
                .await?;
            print_json(&preview)?;
        }

        Commands::Sun { place, date } => {
            let location = place.location()?;
            let offset = location.offset()?;
            let times = SunTimes::compute(date, &location.geo(), &config.engine.solar);
            let mode = config.engine.default_rounding;
            let row = |r: SolarResult| match r {
                SolarResult::Event(t) => local(t, mode, offset),
                SolarResult::NeverRises => "never rises".to_string(),
                SolarResult::NeverSets => "never sets".to_string(),
            };
            println!("date              {date}");
            println!("visible sunrise   {}", row(times.visible_sunrise));
            println!("geometric sunrise {}", row(times.geometric_sunrise));
            println!("solar noon        {}", local(times.solar_noon, mode, offset));
            println!("geometric sunset  {}", row(times.geometric_sunset));
            println!("visible sunset    {}", row(times.visible_sunset));
            if let Some(minutes) = times.day_length_minutes() {
                println!("day length        {minutes:.1} min");
            }
        }

        Commands::Validate {
            formula,
            key,
            available,
        } => {
            let available: Option<BTreeSet<String>> = available.map(|keys| keys.into_iter().collect());
            let issues = zmanim_dsl::validate_formula(&formula, key.as_deref(), available.as_ref());
            if issues.is_empty() {
                println!("ok");
            } else {
                for issue in &issues {
                    match &issue.suggestion {
                        Some(s) => println!("{} (did you mean '{s}'?)", issue.message),
                        None => println!("{}", issue.message),
                    }
                }
                bail!("{} issue(s)", issues.len());
            }
        }

        Commands::Batch {
            entries,
            place,
            date,
            events,
        } => {
            let entries = read_entries(&entries)?;
            let service = build_service(config, place.location()?, entries, Some(&events)).await?;
            let batch = service
                .calculate(&CalculateRequest {
                    publisher_id: PUBLISHER,
                    locality_id: LOCALITY,
                    date,
                    options: events.options(),
                })
                .await?;
            print_json(&batch)?;
        }

        Commands::Range {
            entries,
            place,
            start,
            end,
            key,
            events,
        } => {
            let entries = read_entries(&entries)?;
            let service = build_service(config, place.location()?, entries, Some(&events)).await?;
            let days = service
                .calculate_range(&RangeRequest {
                    publisher_id: PUBLISHER,
                    locality_id: LOCALITY,
                    start,
                    end,
                    options: events.options(),
                    key,
                })
                .await?;
            print_json(&days)?;
        }
    }

    Ok(())
}

impl EventArgs {
    fn options(&self) -> CalcOptions {
        CalcOptions {
            include_inactive: self.include_inactive,
            rounding_override: self.rounding,
            ..CalcOptions::default()
        }
    }

    fn classifier(&self) -> StaticEvents {
        let mut events = StaticEvents::new();
        if self.weekly_shabbos {
            events = events.with_weekly_shabbos();
        }
        events
    }

    fn mappings(&self) -> anyhow::Result<TagMappings> {
        let Some(path) = &self.tags else {
            return Ok(TagMappings::new().with_default_timing());
        };
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }
}

/// A service over one in-memory publisher and one locality.
///
/// Codes given with `--events` are active on every date of the request.
async fn build_service(
    config: ServiceConfig,
    location: LocationContext,
    entries: Vec<Entry>,
    events: Option<&EventArgs>,
) -> anyhow::Result<ZmanimService> {
    let store = Arc::new(MemoryEntryStore::new());
    store.insert_publisher(PUBLISHER, entries).await;
    let (classifier, mappings) = match events {
        Some(args) => (args.classifier(), args.mappings()?),
        None => (StaticEvents::new(), TagMappings::new()),
    };
    let classifier: Arc<dyn EventClassifier> = match events {
        Some(args) if !args.events.is_empty() => Arc::new(AlwaysActive {
            codes: args.events.iter().cloned().collect(),
            inner: classifier,
        }),
        _ => Arc::new(classifier),
    };
    let service = ZmanimService::new(
        config,
        store,
        Arc::new(StaticLocations::new().with(LOCALITY, location)),
        classifier,
        Arc::new(MemoryTagMappings::new(mappings)),
    )
    .await?;
    debug!("service ready");
    Ok(service)
}

/// Adds fixed codes to every date's classification.
struct AlwaysActive {
    codes: BTreeSet<String>,
    inner: StaticEvents,
}

#[async_trait]
impl EventClassifier for AlwaysActive {
    async fn active_event_codes(
        &self,
        date: NaiveDate,
        _location: &LocationContext,
    ) -> Result<BTreeSet<String>, CollaboratorError> {
        let mut codes = self.inner.codes_for(date);
        codes.extend(self.codes.iter().cloned());
        Ok(codes)
    }
}

fn parse_refs(refs: &[String]) -> anyhow::Result<BTreeMap<String, String>> {
    refs.iter()
        .map(|r| match r.split_once('=') {
            Some((key, formula)) if !key.trim().is_empty() => {
                Ok((key.trim().trim_start_matches('@').to_string(), formula.trim().to_string()))
            }
            _ => bail!("reference '{r}' must be KEY=FORMULA"),
        })
        .collect()
}

fn read_entries(path: &Path) -> anyhow::Result<Vec<Entry>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing entries in {}", path.display()))
}

fn local(t: chrono::DateTime<chrono::Utc>, mode: RoundingMode, offset: FixedOffset) -> String {
    let RoundedTime { exact_local, display, .. } = apply_rounding(t, mode, offset);
    format!("{exact_local} ({display})")
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
