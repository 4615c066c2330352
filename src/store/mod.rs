//! Persistent attribute/tag store.

pub mod kv;
pub mod profile;

pub use kv::{FileStore, KvStore, MemoryStore, StoreError};
pub use profile::{
    KEY_ATTRIBUTES, KEY_LAST_CHECK, KEY_LEGACY_TAGS, KEY_TXN_ID, KEY_VERSION, ProfileStore,
};
