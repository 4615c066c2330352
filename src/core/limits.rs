//! Profile volume limits (normative defaults).
//!
//! Counts are validated once against the aggregate result of a whole
//! operation log; any violation rolls the transaction back. Length caps are
//! enforced earlier, at editor build time, where violating inputs are
//! silently dropped.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Max distinct plain (non-array) attributes in a snapshot.
    pub max_attributes: usize,
    /// Max distinct tag collections / ARRAY attributes.
    pub max_tag_collections: usize,
    /// Max tags in one collection.
    pub max_tags_per_collection: usize,
    /// Max items in one ARRAY attribute (collections and arrays share the
    /// namespace; both caps apply to every ARRAY entry).
    pub max_array_items: usize,

    /// Max chars in a STRING value.
    pub max_string_len: usize,
    /// Max chars in a URL value.
    pub max_url_len: usize,
    /// Max chars in a single tag or array item.
    pub max_tag_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_attributes: 50,
            max_tag_collections: 50,
            max_tags_per_collection: 100,
            max_array_items: 100,

            max_string_len: 64,
            max_url_len: 2048,
            max_tag_len: 64,
        }
    }
}
