//! Interfaces to the systems the service depends on, plus in-memory
//! implementations for tests and local use.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Weekday};
use tokio::sync::RwLock;
use zmanim_engine::{Entry, EntryId, LocationContext, TagMappings};

use crate::error::CollaboratorError;

/// Which entries to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryFilter {
    pub publisher_id: u64,
}

/// Source of entries and their formulas.
#[async_trait]
pub trait EntryStore: Send + Sync {
    async fn get_entries(&self, filter: EntryFilter) -> Result<Vec<Entry>, CollaboratorError>;
    async fn get_entry(&self, id: EntryId) -> Result<Option<Entry>, CollaboratorError>;
}

/// Locality id to coordinates and offset.
#[async_trait]
pub trait LocationResolver: Send + Sync {
    async fn location_context(&self, locality_id: u64) -> Result<LocationContext, CollaboratorError>;
}

/// Calendar events active on a date at a place.
#[async_trait]
pub trait EventClassifier: Send + Sync {
    async fn active_event_codes(
        &self,
        date: NaiveDate,
        location: &LocationContext,
    ) -> Result<BTreeSet<String>, CollaboratorError>;
}

#[async_trait]
pub trait TagMappingStore: Send + Sync {
    async fn behavior_tag_mappings(&self) -> Result<TagMappings, CollaboratorError>;
}

/// Entries held in memory, grouped by publisher.
#[derive(Debug, Default)]
pub struct MemoryEntryStore {
    publishers: RwLock<HashMap<u64, Vec<Entry>>>,
}

impl MemoryEntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_publisher(&self, publisher_id: u64, entries: Vec<Entry>) {
        self.publishers.write().await.insert(publisher_id, entries);
    }

    /// Replace the entry with the same id, or append it.
    pub async fn upsert(&self, publisher_id: u64, entry: Entry) {
        let mut publishers = self.publishers.write().await;
        let entries = publishers.entry(publisher_id).or_default();
        match entries.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
    }
}

#[async_trait]
impl EntryStore for MemoryEntryStore {
    async fn get_entries(&self, filter: EntryFilter) -> Result<Vec<Entry>, CollaboratorError> {
        Ok(self
            .publishers
            .read()
            .await
            .get(&filter.publisher_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_entry(&self, id: EntryId) -> Result<Option<Entry>, CollaboratorError> {
        Ok(self
            .publishers
            .read()
            .await
            .values()
            .flatten()
            .find(|e| e.id == id)
            .cloned())
    }
}

/// Fixed locality table.
#[derive(Debug, Clone, Default)]
pub struct StaticLocations {
    by_id: HashMap<u64, LocationContext>,
}

impl StaticLocations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, locality_id: u64, location: LocationContext) -> Self {
        self.by_id.insert(locality_id, location);
        self
    }
}

#[async_trait]
impl LocationResolver for StaticLocations {
    async fn location_context(&self, locality_id: u64) -> Result<LocationContext, CollaboratorError> {
        self.by_id
            .get(&locality_id)
            .cloned()
            .ok_or_else(|| CollaboratorError::NotFound(format!("locality {locality_id}")))
    }
}

/// Event codes from a date table, optionally with the weekly
/// `erev_shabbos` (Friday) and `shabbos` (Saturday) codes.
#[derive(Debug, Clone, Default)]
pub struct StaticEvents {
    by_date: BTreeMap<NaiveDate, BTreeSet<String>>,
    weekly_shabbos: bool,
}

impl StaticEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weekly_shabbos(mut self) -> Self {
        self.weekly_shabbos = true;
        self
    }

    pub fn with_event(mut self, date: NaiveDate, code: impl Into<String>) -> Self {
        self.by_date.entry(date).or_default().insert(code.into());
        self
    }

    pub fn codes_for(&self, date: NaiveDate) -> BTreeSet<String> {
        let mut codes = self.by_date.get(&date).cloned().unwrap_or_default();
        if self.weekly_shabbos {
            match date.weekday() {
                Weekday::Fri => {
                    codes.insert("erev_shabbos".to_string());
                }
                Weekday::Sat => {
                    codes.insert("shabbos".to_string());
                }
                _ => {}
            }
        }
        codes
    }
}

#[async_trait]
impl EventClassifier for StaticEvents {
    async fn active_event_codes(
        &self,
        date: NaiveDate,
        _location: &LocationContext,
    ) -> Result<BTreeSet<String>, CollaboratorError> {
        Ok(self.codes_for(date))
    }
}

/// Tag mappings held in memory; replace them to simulate an edit.
#[derive(Debug, Default)]
pub struct MemoryTagMappings {
    mappings: RwLock<TagMappings>,
}

impl MemoryTagMappings {
    pub fn new(mappings: TagMappings) -> Self {
        Self {
            mappings: RwLock::new(mappings),
        }
    }

    pub async fn replace(&self, mappings: TagMappings) {
        *self.mappings.write().await = mappings;
    }
}

#[async_trait]
impl TagMappingStore for MemoryTagMappings {
    async fn behavior_tag_mappings(&self) -> Result<TagMappings, CollaboratorError> {
        Ok(self.mappings.read().await.clone())
    }
}
