//! Async facade: loads inputs from collaborators, runs the engine on the
//! blocking pool.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::future::Future;
use std::sync::Arc;

use chrono::NaiveDate;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use zmanim_engine::{
    BatchResult, CalcOptions, DateRange, DayResult, Engine, Entry, EntryId, FormulaPreview,
    LocationContext, RoundingMode,
};

use crate::collaborators::{EntryFilter, EntryStore, EventClassifier, LocationResolver, TagMappingStore};
use crate::config::ServiceConfig;
use crate::error::{CollaboratorError, ServiceError};

/// Batch for one publisher, place and date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculateRequest {
    pub publisher_id: u64,
    pub locality_id: u64,
    pub date: NaiveDate,
    /// When `active_event_codes` is unset, the classifier supplies them.
    #[serde(default)]
    pub options: CalcOptions,
}

/// One formula at a place and date, outside any publisher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewRequest {
    pub formula: String,
    pub location: LocationContext,
    pub date: NaiveDate,
    #[serde(default)]
    pub rounding: Option<RoundingMode>,
    /// Formulas usable as `@key`.
    #[serde(default)]
    pub references: BTreeMap<String, String>,
    #[serde(default)]
    pub breakdown: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeRequest {
    pub publisher_id: u64,
    pub locality_id: u64,
    pub start: NaiveDate,
    pub end: NaiveDate,
    #[serde(default)]
    pub options: CalcOptions,
    /// Report only this entry key.
    #[serde(default)]
    pub key: Option<String>,
}

/// Calculation service over external collaborators.
pub struct ZmanimService {
    engine: Arc<Engine>,
    config: ServiceConfig,
    entries: Arc<dyn EntryStore>,
    locations: Arc<dyn LocationResolver>,
    events: Arc<dyn EventClassifier>,
    tags: Arc<dyn TagMappingStore>,
}

impl ZmanimService {
    /// Build the engine and load tag mappings once.
    pub async fn new(
        config: ServiceConfig,
        entries: Arc<dyn EntryStore>,
        locations: Arc<dyn LocationResolver>,
        events: Arc<dyn EventClassifier>,
        tags: Arc<dyn TagMappingStore>,
    ) -> Result<Self, ServiceError> {
        config.validate()?;
        let service = Self {
            engine: Arc::new(Engine::new(config.engine.clone())?),
            config,
            entries,
            locations,
            events,
            tags,
        };
        service.refresh_tag_mappings().await?;
        Ok(service)
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Run a collaborator call under the configured timeout.
    async fn call<T, F>(&self, operation: &'static str, fut: F) -> Result<T, ServiceError>
    where
        F: Future<Output = Result<T, CollaboratorError>>,
    {
        let after = self.config.collaborator_timeout();
        match tokio::time::timeout(after, fut).await {
            Ok(result) => result.map_err(ServiceError::from),
            Err(_) => {
                warn!(operation, ?after, "collaborator timed out");
                Err(ServiceError::Timeout { operation, after })
            }
        }
    }

    /// Reload tag mappings from the store; returns the number of behavior tags.
    #[instrument(skip(self))]
    pub async fn refresh_tag_mappings(&self) -> Result<usize, ServiceError> {
        let mut mappings = self
            .call("behavior_tag_mappings", self.tags.behavior_tag_mappings())
            .await?;
        if mappings.timing.is_empty() {
            mappings = mappings.with_default_timing();
        }
        let count = mappings.behaviors.len();
        self.engine.set_tag_mappings(mappings);
        info!(behaviors = count, "tag mappings loaded");
        Ok(count)
    }

    /// Drop cached results after a committed formula edit.
    #[instrument(skip(self))]
    pub fn on_formula_changed(&self, entry_id: EntryId) -> usize {
        let removed = self.engine.invalidate(entry_id);
        debug!(removed, "formula change applied to cache");
        removed
    }

    /// Publisher entries plus the link sources they point at outside the set.
    async fn load_entries(&self, publisher_id: u64) -> Result<(Vec<Entry>, Vec<Entry>), ServiceError> {
        let entries = self
            .call(
                "get_entries",
                self.entries.get_entries(EntryFilter { publisher_id }),
            )
            .await?;
        let local: HashSet<EntryId> = entries.iter().map(|e| e.id).collect();
        let missing: BTreeSet<EntryId> = entries
            .iter()
            .filter_map(|e| e.linked_source_id)
            .filter(|id| !local.contains(id))
            .collect();

        let sources: Vec<Entry> = stream::iter(missing)
            .map(|id| self.call("get_entry", self.entries.get_entry(id)))
            .buffer_unordered(self.config.event_concurrency)
            .try_filter_map(|found| async move { Ok(found) })
            .try_collect()
            .await?;
        Ok((entries, sources))
    }

    #[instrument(skip(self, request), fields(publisher = request.publisher_id, date = %request.date))]
    pub async fn calculate(&self, request: &CalculateRequest) -> Result<BatchResult, ServiceError> {
        let location = self
            .call(
                "location_context",
                self.locations.location_context(request.locality_id),
            )
            .await?;
        let (entries, sources) = self.load_entries(request.publisher_id).await?;

        let mut options = request.options.clone();
        if options.active_event_codes.is_none() {
            let codes = self
                .call(
                    "active_event_codes",
                    self.events.active_event_codes(request.date, &location),
                )
                .await?;
            options.active_event_codes = Some(codes);
        }

        let engine = Arc::clone(&self.engine);
        let date = request.date;
        let batch = tokio::task::spawn_blocking(move || {
            engine.calculate_batch_with_sources(&entries, &sources, &location, date, &options)
        })
        .await
        .map_err(|e| ServiceError::Internal(e.to_string()))??;
        Ok(batch)
    }

    #[instrument(skip(self, request), fields(date = %request.date))]
    pub async fn preview(&self, request: &PreviewRequest) -> Result<FormulaPreview, ServiceError> {
        let engine = Arc::clone(&self.engine);
        let request = request.clone();
        let preview = tokio::task::spawn_blocking(move || {
            engine.calculate_single_formula(
                &request.formula,
                &request.location,
                request.date,
                request.rounding,
                &request.references,
                request.breakdown,
            )
        })
        .await
        .map_err(|e| ServiceError::Internal(e.to_string()))??;
        Ok(preview)
    }

    /// Calculate every date of a range; event codes for all dates are
    /// fetched concurrently before the engine runs.
    #[instrument(skip(self, request), fields(publisher = request.publisher_id, start = %request.start, end = %request.end))]
    pub async fn calculate_range(&self, request: &RangeRequest) -> Result<Vec<DayResult>, ServiceError> {
        let range = DateRange::new(request.start, request.end);
        self.engine.check_range(range)?;

        let location = self
            .call(
                "location_context",
                self.locations.location_context(request.locality_id),
            )
            .await?;
        let (entries, sources) = self.load_entries(request.publisher_id).await?;

        let events = if request.options.active_event_codes.is_some() {
            None
        } else {
            let location = &location;
            let by_date: BTreeMap<NaiveDate, BTreeSet<String>> = stream::iter(range.dates())
                .map(|date| async move {
                    let codes = self
                        .call(
                            "active_event_codes",
                            self.events.active_event_codes(date, location),
                        )
                        .await?;
                    Ok::<_, ServiceError>((date, codes))
                })
                .buffered(self.config.event_concurrency)
                .try_collect()
                .await?;
            Some(by_date)
        };

        let engine = Arc::clone(&self.engine);
        let options = request.options.clone();
        let mut days = tokio::task::spawn_blocking(move || {
            engine.calculate_range(&entries, &sources, &location, range, &options, events.as_ref())
        })
        .await
        .map_err(|e| ServiceError::Internal(e.to_string()))??;

        if let Some(key) = &request.key {
            for day in &mut days {
                day.results.retain(|r| &r.key == key);
            }
        }
        Ok(days)
    }
}
