//! Async service facade over the zmanim engine.
//!
//! [`ZmanimService`] fetches entries, locations, event codes and tag
//! mappings through collaborator traits, bounds every such call with a
//! timeout, and runs the CPU-bound engine on tokio's blocking pool.

pub mod collaborators;
pub mod config;
pub mod error;
pub mod service;

pub use collaborators::{
    EntryFilter, EntryStore, EventClassifier, LocationResolver, MemoryEntryStore, MemoryTagMappings,
    StaticEvents, StaticLocations, TagMappingStore,
};
pub use config::ServiceConfig;
pub use error::{CollaboratorError, ServiceError};
pub use service::{CalculateRequest, PreviewRequest, RangeRequest, ZmanimService};
