//! Mailbuddy sync engine
//!
//! Keeps a local mirror of a remote mailbox in sync: a full sync
//! enumerates every message and backfills recent content, then
//! incremental syncs replay the provider's change feed from a stored
//! cursor. All engine mutations are idempotent, so interrupted passes
//! can be re-run safely.
//!
//! The engine is provider-agnostic behind the [`mailbox::Mailbox`] and
//! [`mailbox::TokenProvider`] traits; [`gmail`] supplies the Gmail
//! implementation. Storage sits behind [`storage::MailStore`], with
//! SQLite and in-memory implementations.

pub mod config;
pub mod enrich;
pub mod gmail;
pub mod mailbox;
pub mod models;
pub mod normalize;
pub mod storage;
pub mod sync;

pub use enrich::{EnrichmentHook, NoopEnrichment};
pub use mailbox::{Mailbox, TokenProvider};
pub use storage::{InMemoryMailStore, MailStore, SqliteMailStore};
pub use sync::{
    FullSyncReport, IncrementalSyncReport, SyncEngine, SyncFailure, SyncOutcome, SyncSessions,
};
