//! Result caches.
//!
//! [`ResultCache`] is permanent: entries never expire and are removed only
//! by [`ResultCache::invalidate`]. Every key carries the generation of each
//! formula owner it depends on; invalidation bumps the owner's generation
//! before removing keys, so a read that starts after an invalidation can
//! only build keys that no pre-edit insert could have produced.
//!
//! [`PreviewCache`] holds short-lived authoring previews keyed by a hash
//! of the formula text and is bounded in size.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::linking::FormulaIdentity;
use crate::model::{EntryId, FormulaPreview, LocationKey};
use crate::rounding::{RoundedTime, RoundingMode};

/// Key of one cached result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub(crate) identity: FormulaIdentity,
    pub(crate) generation: u64,
    /// Hash over the identities and generations of referenced formulas.
    pub(crate) dependencies: String,
    pub(crate) location: LocationKey,
    pub(crate) date: NaiveDate,
    pub(crate) rounding: RoundingMode,
}

impl CacheKey {
    pub fn identity(&self) -> &FormulaIdentity {
        &self.identity
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }
}

/// Cache counters since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    /// Inserts dropped because a watched owner changed generation.
    pub stale_inserts: u64,
    pub invalidations: u64,
    /// Keys removed by invalidation.
    pub evicted: u64,
    /// Owner-to-key links in the invalidation index.
    pub indexed: usize,
}

/// Permanent, invalidate-on-write cache of rounded results.
#[derive(Debug, Default)]
pub struct ResultCache {
    /// Value plus the owners whose index sets list the key.
    entries: DashMap<CacheKey, (RoundedTime, Vec<EntryId>)>,
    generations: DashMap<EntryId, u64>,
    by_owner: DashMap<EntryId, HashSet<CacheKey>>,
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    stale_inserts: AtomicU64,
    invalidations: AtomicU64,
    evicted: AtomicU64,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current generation of a formula owner; starts at 0.
    pub fn generation(&self, owner: EntryId) -> u64 {
        self.generations.get(&owner).map_or(0, |g| *g)
    }

    pub fn get(&self, key: &CacheKey) -> Option<RoundedTime> {
        let hit = self.entries.get(key).map(|v| v.value().0.clone());
        if hit.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        hit
    }

    fn is_current(&self, watched: &[(EntryId, u64)]) -> bool {
        watched.iter().all(|&(owner, seen)| self.generation(owner) == seen)
    }

    /// Store a successful result.
    ///
    /// # Arguments
    /// * `key` - cache key built from the generations in `watched`
    /// * `value` - rounded result
    /// * `watched` - every owner the value depends on, with the generation
    ///   observed when the computation started
    ///
    /// # Returns
    /// `false` when an owner was invalidated meanwhile and the value was
    /// discarded.
    pub fn insert(&self, key: CacheKey, value: RoundedTime, watched: &[(EntryId, u64)]) -> bool {
        if !self.is_current(watched) {
            self.stale_inserts.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        let owners: Vec<EntryId> = watched.iter().map(|&(owner, _)| owner).collect();
        self.entries.insert(key.clone(), (value, owners.clone()));
        for &owner in &owners {
            self.by_owner.entry(owner).or_default().insert(key.clone());
        }
        // An invalidation may have run between the check and the index update.
        if !self.is_current(watched) {
            self.entries.remove(&key);
            for &owner in &owners {
                self.unlink(owner, &key);
            }
            self.stale_inserts.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        self.inserts.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Drop every result computed from `owner`'s formula, directly or
    /// through a reference, and return how many were removed.
    pub fn invalidate(&self, owner: EntryId) -> usize {
        *self.generations.entry(owner).or_insert(0) += 1;
        self.invalidations.fetch_add(1, Ordering::Relaxed);

        let keys = self.by_owner.remove(&owner).map(|(_, keys)| keys).unwrap_or_default();
        let mut removed = 0;
        for key in &keys {
            let Some((_, (_, owners))) = self.entries.remove(key) else {
                continue;
            };
            removed += 1;
            for &other in owners.iter().filter(|&&o| o != owner) {
                self.unlink(other, key);
            }
        }
        self.evicted.fetch_add(removed as u64, Ordering::Relaxed);
        debug!(%owner, removed, "cache invalidated");
        removed
    }

    /// Drop `key` from `owner`'s index set, and the set once empty.
    fn unlink(&self, owner: EntryId, key: &CacheKey) {
        if let Some(mut keys) = self.by_owner.get_mut(&owner) {
            keys.remove(key);
        }
        self.by_owner.remove_if(&owner, |_, keys| keys.is_empty());
    }

    /// Number of owner-to-key links held for invalidation.
    pub fn index_len(&self) -> usize {
        self.by_owner.iter().map(|keys| keys.len()).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove all entries. Generations are kept so in-flight inserts stay
    /// rejected.
    pub fn clear(&self) {
        self.entries.clear();
        self.by_owner.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            stale_inserts: self.stale_inserts.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            indexed: self.index_len(),
        }
    }
}

/// Hash of preview inputs: formula text plus everything else that
/// changes the answer.
pub fn preview_key(text: &str, parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    for p in parts {
        hasher.update([0u8]);
        hasher.update(p.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Bounded, expiring cache of formula previews.
#[derive(Debug)]
pub struct PreviewCache {
    entries: DashMap<String, (Instant, FormulaPreview)>,
    capacity: usize,
    ttl: Duration,
}

impl PreviewCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: DashMap::with_capacity(capacity),
            capacity,
            ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<FormulaPreview> {
        let fresh = self
            .entries
            .get(key)
            .map(|e| (e.0.elapsed() < self.ttl, e.1.clone()));
        match fresh {
            Some((true, preview)) => Some(preview),
            Some((false, _)) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: String, preview: FormulaPreview) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            self.entries.retain(|_, (at, _)| at.elapsed() < self.ttl);
            if self.entries.len() >= self.capacity {
                self.evict_oldest();
            }
        }
        self.entries.insert(key, (Instant::now(), preview));
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|e| e.value().0)
            .map(|e| e.key().clone());
        if let Some(k) = oldest {
            self.entries.remove(&k);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
