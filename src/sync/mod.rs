//! Version reconciliation and the sync engine.
//!
//! The engine owns the serialized task queue and the profile store; every
//! snapshot or SyncState mutation runs as a queued unit so concurrent
//! callers can never observe or lose intermediate state. Network calls are
//! the host's business and never hold the queue - the engine exchanges
//! payloads and verdicts, not sockets.

pub mod check;

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

pub use check::CheckAction;

use crate::core::{
    Limits, Operation, ProfileSnapshot, TxnId, apply_operations, has_changed, sync_payload,
};
use crate::error::{Effect, Transience};
use crate::queue::SerialQueue;
use crate::store::{KvStore, ProfileStore};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    #[error("malformed check response: {reason}")]
    MalformedResponse { reason: String },
}

impl SyncError {
    pub fn transience(&self) -> Transience {
        Transience::Permanent
    }

    pub fn effect(&self) -> Effect {
        // Malformed input is rejected before any state mutation.
        Effect::None
    }
}

/// Bounded retry schedule for the host's RECHECK loop and outbound sends:
/// a small fixed number of attempts with increasing delay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            factor: 2,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based), or `None` once the
    /// budget is exhausted.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let factor = u64::from(self.factor).saturating_pow(attempt);
        Some(Duration::from_millis(self.base_delay_ms.saturating_mul(factor)))
    }
}

/// Result of one committed operation log.
#[derive(Clone, Debug)]
pub struct CommitOutcome {
    /// Whether the snapshot differs from the persisted one - i.e. whether a
    /// profile-changed sync event is warranted.
    pub changed: bool,
    /// Full payload for transport, present only when changed.
    pub payload: Option<Value>,
    /// Transaction id stamped for this exchange, present only when changed.
    pub txid: Option<TxnId>,
}

/// Local action decided from a check response.
#[derive(Clone, Debug, PartialEq)]
pub enum NextStep {
    /// Nothing to do; remote and local are consistent.
    UpToDate,
    /// Resend the full current attribute set with this payload.
    Resend { payload: Value },
    /// Retry the check call, subject to the retry policy.
    Recheck,
}

pub struct SyncEngine<S: KvStore + 'static> {
    store: Arc<ProfileStore<S>>,
    queue: SerialQueue,
    limits: Limits,
    retry: RetryPolicy,
}

impl<S: KvStore + 'static> SyncEngine<S> {
    /// Build the engine and run the one-time legacy migration as the first
    /// queued unit, so every later read sees post-migration state.
    pub fn new(kv: S, limits: Limits, retry: RetryPolicy) -> Self {
        let store = Arc::new(ProfileStore::new(kv));
        let queue = SerialQueue::new();
        {
            let store = store.clone();
            // Result intentionally not awaited; ordering alone guarantees
            // visibility to later units.
            drop(queue.post(move || store.migrate_tags_if_needed()));
        }
        Self {
            store,
            queue,
            limits,
            retry,
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Read the persisted snapshot (queued, so it serializes after any
    /// in-flight commit).
    pub fn snapshot(&self) -> crate::Result<ProfileSnapshot> {
        let store = self.store.clone();
        self.queue
            .post(move || store.load_snapshot())
            .join()?
            .map_err(Into::into)
    }

    /// Atomically apply an operation log: read the current snapshot, merge,
    /// persist on success, and report whether a sync is warranted. The whole
    /// read-modify-write cycle is one queued unit; a limit violation leaves
    /// the persisted state untouched.
    pub fn commit(&self, ops: Vec<Operation>) -> crate::Result<CommitOutcome> {
        let store = self.store.clone();
        let limits = self.limits.clone();
        self.queue
            .post(move || -> crate::Result<CommitOutcome> {
                let current = store.load_snapshot()?;
                let next = apply_operations(&current, &ops, &limits)?;
                if !has_changed(&current, &next) {
                    debug!("commit produced no observable change; skipping sync");
                    return Ok(CommitOutcome {
                        changed: false,
                        payload: None,
                        txid: None,
                    });
                }

                let ver = store.version()?;
                let txid = TxnId::generate();
                // Persist live state only; tombstones travel on the wire.
                store.save_snapshot(&next.pruned())?;
                store.set_txn_id(Some(&txid))?;
                info!(%txid, ver, "profile changed; sync warranted");
                Ok(CommitOutcome {
                    changed: true,
                    payload: Some(sync_payload(&next, ver)),
                    txid: Some(txid),
                })
            })
            .join()?
    }

    /// Interpret a version-check response. Malformed responses are rejected
    /// here, before any queued mutation, so `ver`/`txid` stay untouched.
    pub fn handle_check_response(&self, response: &Value) -> crate::Result<NextStep> {
        let action = CheckAction::parse(response)?;
        let store = self.store.clone();
        self.queue
            .post(move || -> crate::Result<NextStep> {
                match action {
                    CheckAction::Ok => {
                        store.set_last_check(now_ms())?;
                        store.set_txn_id(None)?;
                        Ok(NextStep::UpToDate)
                    }
                    CheckAction::Bump { ver } => {
                        info!(ver, "adopting remote version; full resend scheduled");
                        store.set_version(ver)?;
                        let snapshot = store.load_snapshot()?;
                        Ok(NextStep::Resend {
                            payload: sync_payload(&snapshot, ver),
                        })
                    }
                    CheckAction::Resend => {
                        let ver = store.version()?;
                        let snapshot = store.load_snapshot()?;
                        Ok(NextStep::Resend {
                            payload: sync_payload(&snapshot, ver),
                        })
                    }
                    CheckAction::Recheck => Ok(NextStep::Recheck),
                }
            })
            .join()?
    }

    /// Record a successful send: adopt the version the payload went out
    /// under, clear the in-flight transaction, stamp the check time.
    pub fn mark_sent(&self, ver: u64) -> crate::Result<()> {
        let store = self.store.clone();
        self.queue
            .post(move || -> crate::Result<()> {
                store.set_version(ver)?;
                store.set_txn_id(None)?;
                store.set_last_check(now_ms())?;
                Ok(())
            })
            .join()?
    }

    /// Payload for the next version-check call.
    pub fn check_request(&self) -> crate::Result<Value> {
        let store = self.store.clone();
        self.queue
            .post(move || -> crate::Result<Value> {
                let ver = store.version()?;
                let txid = store.txn_id()?;
                Ok(crate::core::check_payload(ver, txid.as_ref()))
            })
            .join()?
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::core::{AttrKey, ProfileEditor};
    use crate::store::MemoryStore;

    fn engine() -> SyncEngine<MemoryStore> {
        SyncEngine::new(MemoryStore::new(), Limits::default(), RetryPolicy::default())
    }

    fn key(s: &str) -> AttrKey {
        AttrKey::parse(s).unwrap()
    }

    #[test]
    fn commit_persists_and_reports_change() {
        let engine = engine();
        let mut editor = ProfileEditor::new();
        editor.set_attribute("age", 23i64);

        let outcome = engine.commit(editor.into_operations()).unwrap();
        assert!(outcome.changed);
        let payload = outcome.payload.unwrap();
        assert_eq!(payload["attrs"]["age.i"], 23);
        assert_eq!(payload["ver"], 0);

        let snapshot = engine.snapshot().unwrap();
        assert!(snapshot.contains(&key("age")));
    }

    #[test]
    fn noop_commit_reports_unchanged() {
        let engine = engine();
        let mut editor = ProfileEditor::new();
        editor.set_attribute("age", 23i64);
        engine.commit(editor.into_operations()).unwrap();

        let mut again = ProfileEditor::new();
        again.set_attribute("age", 23i64);
        let outcome = engine.commit(again.into_operations()).unwrap();
        assert!(!outcome.changed);
        assert!(outcome.payload.is_none());
    }

    #[test]
    fn failed_commit_leaves_state_untouched() {
        let engine = SyncEngine::new(
            MemoryStore::new(),
            Limits {
                max_attributes: 1,
                ..Limits::default()
            },
            RetryPolicy::default(),
        );
        let mut editor = ProfileEditor::new();
        editor.set_attribute("a", 1i64).set_attribute("b", 2i64);

        let err = engine.commit(editor.into_operations()).unwrap_err();
        assert!(err.to_string().contains("cannot hold more than 1 attributes"));
        assert!(engine.snapshot().unwrap().is_empty());
    }

    #[test]
    fn bump_adopts_version_and_resends() {
        let engine = engine();
        let mut editor = ProfileEditor::new();
        editor.set_attribute("age", 23i64);
        engine.commit(editor.into_operations()).unwrap();

        let step = engine
            .handle_check_response(&json!({"action": "BUMP", "ver": 12}))
            .unwrap();
        let NextStep::Resend { payload } = step else {
            panic!("expected resend");
        };
        assert_eq!(payload["ver"], 12);
        assert_eq!(payload["attrs"]["age.i"], 23);
    }

    #[test]
    fn ok_clears_pending_txn() {
        let engine = engine();
        let mut editor = ProfileEditor::new();
        editor.set_attribute("age", 23i64);
        let outcome = engine.commit(editor.into_operations()).unwrap();
        assert!(outcome.txid.is_some());

        let step = engine.handle_check_response(&json!({"action": "OK"})).unwrap();
        assert_eq!(step, NextStep::UpToDate);
        // Next check request carries no txid.
        let check = engine.check_request().unwrap();
        assert!(check.get("txid").is_none());
    }

    #[test]
    fn malformed_response_mutates_nothing() {
        let engine = engine();
        engine.mark_sent(5).unwrap();

        let err = engine.handle_check_response(&json!({"action": "BUMP"})).unwrap_err();
        assert!(err.to_string().contains("malformed check response"));
        assert_eq!(engine.check_request().unwrap()["ver"], 5);
    }

    #[test]
    fn recheck_is_surfaced_for_the_retry_loop() {
        let engine = engine();
        let step = engine
            .handle_check_response(&json!({"action": "RECHECK"}))
            .unwrap();
        assert_eq!(step, NextStep::Recheck);
    }

    #[test]
    fn retry_policy_bounds_and_grows() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Some(Duration::from_millis(1_000)));
        assert_eq!(policy.delay_for(1), Some(Duration::from_millis(2_000)));
        assert_eq!(policy.delay_for(2), Some(Duration::from_millis(4_000)));
        assert_eq!(policy.delay_for(3), None);
    }

    #[test]
    fn mark_sent_records_sync_state() {
        let engine = engine();
        let mut editor = ProfileEditor::new();
        editor.set_attribute("age", 23i64);
        engine.commit(editor.into_operations()).unwrap();

        engine.mark_sent(1).unwrap();
        let check = engine.check_request().unwrap();
        assert_eq!(check["ver"], 1);
        assert!(check.get("txid").is_none());
    }
}
