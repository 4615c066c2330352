//! Typed profile state over a raw key/value store.
//!
//! Owns the fixed key set and the one-time legacy tag migration. SyncState
//! (`ver`, `txid`, `last_atc`) is mutated only from inside queued tasks.

use std::collections::BTreeSet;

use serde_json::Value;
use tracing::{debug, warn};

use super::kv::{KvStore, StoreError};
use crate::core::{AttrKey, Attribute, AttributeValue, ProfileSnapshot, TxnId};

pub const KEY_ATTRIBUTES: &str = "attributes";
pub const KEY_VERSION: &str = "ver";
pub const KEY_TXN_ID: &str = "txid";
pub const KEY_LAST_CHECK: &str = "last_atc";
/// Legacy tag collections; removed by the first successful migration.
pub const KEY_LEGACY_TAGS: &str = "tags";

pub struct ProfileStore<S: KvStore> {
    kv: S,
}

impl<S: KvStore> ProfileStore<S> {
    pub fn new(kv: S) -> Self {
        Self { kv }
    }

    pub fn kv(&self) -> &S {
        &self.kv
    }

    /// Current snapshot; empty if nothing was ever persisted.
    pub fn load_snapshot(&self) -> Result<ProfileSnapshot, StoreError> {
        match self.kv.get(KEY_ATTRIBUTES)? {
            None => Ok(ProfileSnapshot::new()),
            Some(value) => {
                serde_json::from_value(value).map_err(|err| StoreError::Corrupt {
                    reason: format!("attributes: {err}"),
                })
            }
        }
    }

    pub fn save_snapshot(&self, snapshot: &ProfileSnapshot) -> Result<(), StoreError> {
        let value = serde_json::to_value(snapshot).map_err(|err| StoreError::Corrupt {
            reason: format!("attributes encode: {err}"),
        })?;
        self.kv.set(KEY_ATTRIBUTES, value)
    }

    /// Monotonic sync version; 0 when absent.
    pub fn version(&self) -> Result<u64, StoreError> {
        match self.kv.get(KEY_VERSION)? {
            None => Ok(0),
            Some(value) => value.as_u64().ok_or_else(|| StoreError::Corrupt {
                reason: format!("ver is not a non-negative integer: {value}"),
            }),
        }
    }

    pub fn set_version(&self, ver: u64) -> Result<(), StoreError> {
        self.kv.set(KEY_VERSION, Value::from(ver))
    }

    pub fn txn_id(&self) -> Result<Option<TxnId>, StoreError> {
        match self.kv.get(KEY_TXN_ID)? {
            None => Ok(None),
            Some(Value::String(s)) => TxnId::new(s).map(Some).map_err(|err| StoreError::Corrupt {
                reason: format!("txid: {err}"),
            }),
            Some(other) => Err(StoreError::Corrupt {
                reason: format!("txid is not a string: {other}"),
            }),
        }
    }

    pub fn set_txn_id(&self, txid: Option<&TxnId>) -> Result<(), StoreError> {
        match txid {
            Some(txid) => self.kv.set(KEY_TXN_ID, Value::from(txid.as_str())),
            None => self.kv.remove(KEY_TXN_ID),
        }
    }

    pub fn last_check(&self) -> Result<Option<i64>, StoreError> {
        Ok(self.kv.get(KEY_LAST_CHECK)?.and_then(|v| v.as_i64()))
    }

    pub fn set_last_check(&self, epoch_ms: i64) -> Result<(), StoreError> {
        self.kv.set(KEY_LAST_CHECK, Value::from(epoch_ms))
    }

    /// One-time legacy migration: convert each legacy tag collection into an
    /// ARRAY attribute, merge into the snapshot (an existing attribute under
    /// the same key wins), persist, delete the legacy key. Idempotent: with
    /// the legacy key absent this is a no-op. Failures are logged and
    /// absorbed - the profile must stay usable even if migration fails.
    pub fn migrate_tags_if_needed(&self) {
        if let Err(err) = self.try_migrate_tags() {
            warn!(%err, "legacy tag migration failed; continuing with current state");
        }
    }

    fn try_migrate_tags(&self) -> Result<(), StoreError> {
        let Some(legacy) = self.kv.get(KEY_LEGACY_TAGS)? else {
            return Ok(());
        };
        let Some(collections) = legacy.as_object() else {
            // Unrecognized legacy shape: drop it rather than block the profile.
            warn!("legacy tags key is not an object; discarding");
            return self.kv.remove(KEY_LEGACY_TAGS);
        };

        let mut snapshot = self.load_snapshot()?;
        for (name, tags) in collections {
            let Ok(key) = AttrKey::parse(name) else {
                debug!(name = name.as_str(), "skipping legacy collection with invalid name");
                continue;
            };
            if snapshot.get(&key).is_some_and(|a| !a.is_tombstone()) {
                debug!(%key, "skipping legacy collection; attribute already present");
                continue;
            }
            let set: BTreeSet<String> = tags
                .as_array()
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|v| v.as_str())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            snapshot.insert(key, Attribute::new(AttributeValue::Array(set)));
        }

        self.save_snapshot(&snapshot)?;
        self.kv.remove(KEY_LEGACY_TAGS)
    }
}
