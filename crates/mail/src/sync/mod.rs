//! Sync engine for reconciling a remote mailbox with local storage
//!
//! Provides idempotent full and incremental sync passes that can be
//! safely retried, a session registry for cancellation and advisory
//! per-account mutual exclusion, and cooldown timing helpers.

mod changes;
mod engine;
mod full;
mod incremental;
mod retry;
mod sessions;
mod timing;

pub use changes::{ChangeSet, partition_events};
pub use engine::{FullSyncReport, IncrementalSyncReport, SyncEngine, SyncFailure, SyncOutcome};
pub use sessions::{CancelToken, SessionGuard, SyncSessions};
pub use timing::cooldown_elapsed;
