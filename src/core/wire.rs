//! Outbound payload shapes.
//!
//! The sync payload flattens each attribute to `"<key>.<code>": value` and
//! carries the legacy `tags` compatibility map alongside. Tombstones
//! serialize as null so the remote side observes deletions.

use serde_json::{Map, Value, json};

use super::identity::TxnId;
use super::snapshot::ProfileSnapshot;

/// Full-state payload for a send: `{ attrs, tags, ver }`.
pub fn sync_payload(snapshot: &ProfileSnapshot, ver: u64) -> Value {
    let mut attrs = Map::new();
    for (key, attr) in snapshot.iter() {
        let wire_key = format!("{}.{}", key, attr.ty.code());
        let value = attr.value.as_ref().map_or(Value::Null, |v| v.to_json());
        attrs.insert(wire_key, value);
    }

    let mut tags = Map::new();
    for (name, set) in snapshot.tag_collections() {
        tags.insert(
            name.as_str().to_string(),
            Value::Array(set.into_iter().map(Value::String).collect()),
        );
    }

    json!({ "attrs": attrs, "tags": tags, "ver": ver })
}

/// Payload for a version-check call.
pub fn check_payload(ver: u64, txid: Option<&TxnId>) -> Value {
    match txid {
        Some(txid) => json!({ "ver": ver, "txid": txid.as_str() }),
        None => json!({ "ver": ver }),
    }
}
