//! Local profile-consistency engine.
//!
//! An editor turns host calls into a normalized operation log; a
//! transactional merge applies the log to persisted state under strict
//! volume limits with all-or-nothing rollback; a change detector decides
//! whether a remote sync is warranted; a serialized task queue gives
//! read-modify-write cycles atomicity against the shared store; and a small
//! reconciliation protocol (OK/BUMP/RESEND/RECHECK) keeps local and remote
//! attribute state convergent under a monotonic version counter.

#![forbid(unsafe_code)]

pub mod config;
pub mod core;
pub mod error;
pub mod queue;
pub mod store;
pub mod sync;
pub mod telemetry;

pub use error::{Effect, Error, Transience};
pub type Result<T> = std::result::Result<T, Error>;

// Re-export the working set at crate root for convenience.
pub use crate::config::{Config, LogFormat, LoggingConfig};
pub use crate::core::{
    ApplyError, AttrKey, Attribute, AttributeType, AttributeValue, CollectionName, CoreError,
    Limits, Operation, ProfileEditor, ProfileSnapshot, TxnId, apply_operations, check_payload,
    has_changed, sync_payload,
};
pub use crate::queue::{SerialQueue, TaskError, TaskHandle};
pub use crate::store::{FileStore, KvStore, MemoryStore, ProfileStore, StoreError};
pub use crate::sync::{
    CheckAction, CommitOutcome, NextStep, RetryPolicy, SyncEngine, SyncError,
};
