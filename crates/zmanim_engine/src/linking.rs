//! Resolution of an entry's effective formula through single-hop links.
//!
//! A linked entry has no formula of its own; it evaluates its source's
//! formula and shares the source's [`FormulaIdentity`], so every linker of
//! one source hits the same cache entries and is invalidated with it.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::model::{Entry, EntryId};

/// Cache identity of a formula: the entry that owns the text plus a digest
/// of the text itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FormulaIdentity {
    pub owner: EntryId,
    pub digest: String,
}

impl FormulaIdentity {
    pub fn new(owner: EntryId, text: &str) -> Self {
        Self {
            owner,
            digest: formula_digest(text),
        }
    }
}

impl fmt::Display for FormulaIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.owner, self.digest)
    }
}

/// First 8 bytes of the SHA-256 of the formula text, hex encoded.
pub fn formula_digest(text: &str) -> String {
    let hash = Sha256::digest(text.as_bytes());
    hex::encode(&hash[..8])
}

/// The formula an entry actually evaluates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveFormula {
    pub identity: FormulaIdentity,
    pub text: String,
    /// Taken from a link source rather than the entry itself.
    pub linked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum LinkError {
    #[error("entry {entry} links to {source_id}, which is missing or deleted")]
    BrokenLink { entry: EntryId, source_id: EntryId },
    #[error("entry {entry} links to {source_id}, which is itself linked")]
    ChainedLink { entry: EntryId, source_id: EntryId },
    #[error("entry {entry} has no formula")]
    MissingFormula { entry: EntryId },
}

/// Entries addressable by id, including link sources outside the batch.
#[derive(Debug, Default)]
pub struct EntryIndex<'a> {
    by_id: HashMap<EntryId, &'a Entry>,
}

impl<'a> EntryIndex<'a> {
    pub fn new<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = &'a Entry>,
    {
        Self {
            by_id: entries.into_iter().map(|e| (e.id, e)).collect(),
        }
    }

    pub fn get(&self, id: EntryId) -> Option<&'a Entry> {
        self.by_id.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

fn own_formula(entry: &Entry) -> Result<&str, LinkError> {
    entry
        .formula
        .as_deref()
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .ok_or(LinkError::MissingFormula { entry: entry.id })
}

/// Resolve the formula `entry` evaluates.
///
/// # Arguments
/// * `entry` - entry to resolve
/// * `index` - every entry a link may point at
///
/// # Returns
/// The effective formula with its cache identity, or why it cannot be
/// resolved. Links are followed exactly one hop.
pub fn resolve_effective_formula(entry: &Entry, index: &EntryIndex<'_>) -> Result<EffectiveFormula, LinkError> {
    let Some(source_id) = entry.linked_source_id else {
        let text = own_formula(entry)?;
        return Ok(EffectiveFormula {
            identity: FormulaIdentity::new(entry.id, text),
            text: text.to_string(),
            linked: false,
        });
    };

    let source = index
        .get(source_id)
        .filter(|s| !s.deleted)
        .ok_or(LinkError::BrokenLink {
            entry: entry.id,
            source_id,
        })?;
    if source.linked_source_id.is_some() {
        return Err(LinkError::ChainedLink {
            entry: entry.id,
            source_id,
        });
    }
    let text = own_formula(source)?;
    Ok(EffectiveFormula {
        identity: FormulaIdentity::new(source.id, text),
        text: text.to_string(),
        linked: true,
    })
}

/// How a new entry adopts another entry's formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkMode {
    /// Follow the source; edits to it propagate.
    Link,
    /// Take a private copy of the formula text.
    Copy,
}

/// Create a new entry from `source`, keeping its key, names and category.
///
/// Linking to an entry that is itself linked is rejected so links stay a
/// single hop.
pub fn link_or_copy(source: &Entry, new_id: EntryId, mode: LinkMode) -> Result<Entry, LinkError> {
    if source.deleted {
        return Err(LinkError::BrokenLink {
            entry: new_id,
            source_id: source.id,
        });
    }
    if source.linked_source_id.is_some() {
        return Err(LinkError::ChainedLink {
            entry: new_id,
            source_id: source.id,
        });
    }
    let text = own_formula(source)?.to_string();
    let (formula, linked_source_id) = match mode {
        LinkMode::Link => (None, Some(source.id)),
        LinkMode::Copy => (Some(text), None),
    };
    Ok(Entry {
        id: new_id,
        formula,
        linked_source_id,
        enabled: true,
        published: false,
        beta: false,
        deleted: false,
        ..source.clone()
    })
}
