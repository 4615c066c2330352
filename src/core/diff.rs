//! Change detection between two snapshots.
//!
//! Structural comparison over live entries: same keys, same types, same
//! values (set members compared irrespective of order). Decides whether a
//! successful transaction warrants a remote sync.

use super::snapshot::ProfileSnapshot;

/// True when `new` differs structurally from `old`. Reflexive: a snapshot
/// never differs from itself, and two empty snapshots are unchanged.
/// Tombstones count as absence, so a tombstone replacing a live key reads as
/// a removed key.
pub fn has_changed(old: &ProfileSnapshot, new: &ProfileSnapshot) -> bool {
    let mut old_live = old.live_iter();
    let mut new_live = new.live_iter();
    loop {
        match (old_live.next(), new_live.next()) {
            (None, None) => return false,
            (Some((ok, oa)), Some((nk, na))) => {
                if ok != nk || oa != na {
                    return true;
                }
            }
            _ => return true,
        }
    }
}
