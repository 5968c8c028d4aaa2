//! nettune-engine: Stores and the Apply Engine
//!
//! Provides:
//! - Profile store (validation, persistence, built-in seeding)
//! - Snapshot store (state capture, file backups, sorted index)
//! - History log (append-only apply/rollback record)
//! - Apply engine (plan, mutate, verify, auto-rollback, exclusion)

pub mod apply;
mod fakes;
pub mod history;
pub mod profile;
pub mod snapshot;

pub use apply::ApplyEngine;
pub use history::HistoryLog;
pub use profile::{validate, ProfileStore};
pub use snapshot::SnapshotStore;
