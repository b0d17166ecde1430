// src/lib.rs
// Public library surface for the binary and the integration tests.

pub mod api;
pub mod config;
pub mod error;
pub mod fetch;
pub mod linker;
pub mod merge;
pub mod metrics;
pub mod model;
pub mod normalize;
pub mod registry;
pub mod sources;
pub mod store;
pub mod sync;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::config::EnrichmentConfig;
pub use crate::error::{DecodeError, FetchError, RegistryError, StoreError, SyncError};
pub use crate::linker::{EntityLinker, LinkOutcome, LinkResult};
pub use crate::merge::{EnrichmentMergeEngine, MergeDiff};
pub use crate::registry::OrganizationRegistry;
pub use crate::store::InMemoryStore;
pub use crate::sync::{SyncKind, SyncOrchestrator, SyncService};
