//! Canonical profile snapshot.
//!
//! One map from normalized key to typed attribute. ARRAY-typed entries are
//! the tag collections; `tag_collections` derives the legacy compatibility
//! view. Snapshots are mutated only through the merge engine and persisted
//! atomically after each successful transaction.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::identity::{AttrKey, CollectionName};
use super::value::{Attribute, AttributeType};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileSnapshot {
    attrs: BTreeMap<AttrKey, Attribute>,
}

impl ProfileSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &AttrKey) -> Option<&Attribute> {
        self.attrs.get(key)
    }

    pub fn insert(&mut self, key: AttrKey, attr: Attribute) {
        self.attrs.insert(key, attr);
    }

    pub fn remove(&mut self, key: &AttrKey) -> Option<Attribute> {
        self.attrs.remove(key)
    }

    pub fn contains(&self, key: &AttrKey) -> bool {
        self.attrs.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AttrKey, &Attribute)> {
        self.attrs.iter()
    }

    /// Entries that still carry a value (tombstones excluded).
    pub fn live_iter(&self) -> impl Iterator<Item = (&AttrKey, &Attribute)> {
        self.attrs.iter().filter(|(_, a)| !a.is_tombstone())
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    /// Live plain (non-array) attribute count, for limit checks.
    pub fn live_attr_count(&self) -> usize {
        self.live_iter()
            .filter(|(_, a)| a.ty != AttributeType::Array)
            .count()
    }

    /// Live ARRAY attribute count (tag collections), for limit checks.
    pub fn collection_count(&self) -> usize {
        self.live_iter()
            .filter(|(_, a)| a.ty == AttributeType::Array)
            .count()
    }

    /// Legacy compatibility view: collection name to tag set, live ARRAY
    /// entries only.
    pub fn tag_collections(&self) -> BTreeMap<CollectionName, BTreeSet<String>> {
        self.live_iter()
            .filter_map(|(key, attr)| {
                let set = attr.as_array()?;
                let name = CollectionName::parse(key.as_str()).ok()?;
                Some((name, set.clone()))
            })
            .collect()
    }

    /// Copy with tombstones dropped - the form that gets persisted.
    pub fn pruned(&self) -> Self {
        Self {
            attrs: self
                .attrs
                .iter()
                .filter(|(_, a)| !a.is_tombstone())
                .map(|(k, a)| (k.clone(), a.clone()))
                .collect(),
        }
    }
}

impl FromIterator<(AttrKey, Attribute)> for ProfileSnapshot {
    fn from_iter<I: IntoIterator<Item = (AttrKey, Attribute)>>(iter: I) -> Self {
        Self {
            attrs: iter.into_iter().collect(),
        }
    }
}
