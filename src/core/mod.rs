//! Core domain types and the merge engine.
//!
//! Module order follows type dependency:
//! - identity: AttrKey, CollectionName, TxnId
//! - value: AttributeType, AttributeValue, Attribute
//! - limits: volume limits with normative defaults
//! - ops: normalized edit operations
//! - editor: operation log builder
//! - snapshot: canonical attribute map
//! - apply: transactional merge
//! - diff: change detection
//! - wire: outbound payload shapes

pub mod apply;
pub mod editor;
pub mod error;
pub mod identity;
pub mod limits;
pub mod ops;
pub mod snapshot;
pub mod value;
pub mod wire;

mod diff;

pub use apply::{ApplyError, apply_operations};
pub use diff::has_changed;
pub use editor::ProfileEditor;
pub use error::{CoreError, InvalidKey, InvalidValue};
pub use identity::{AttrKey, CollectionName, MAX_KEY_LEN, TxnId};
pub use limits::Limits;
pub use ops::Operation;
pub use snapshot::ProfileSnapshot;
pub use value::{Attribute, AttributeType, AttributeValue};
pub use wire::{check_payload, sync_payload};
