//! Session management module.
//!
//! This module provides the per-client session registry together with the
//! records it stores: page history, REST journals and memoized fragments.

mod entry;
mod id;
mod journal;
mod record;
mod registry;
mod snapshot;
mod state;

pub use entry::{
    is_full_document, EntryKind, FragmentCache, HistoryEntry, RequestSnapshot, ResponsePayload,
    RestKind, RestMetadata, RestMutationRecord, RestQueryRecord,
};
pub use id::SessionId;
pub use journal::{Journal, DEFAULT_JOURNAL_CAPACITY};
pub use record::Session;
pub use registry::{
    AppendOptions, PruneReport, RegistryConfig, RenderCommit, RestState, RestTurn, ReusableCaches,
    SessionRegistry, SessionSummary,
};
pub use snapshot::{SessionSnapshot, Snapshot, SNAPSHOT_VERSION};
pub use state::SessionState;
