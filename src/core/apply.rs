//! Transactional application of an operation log onto a snapshot.
//!
//! Three phases over a working copy (the caller's snapshot is never
//! mutated):
//! 1. replay every operation, in order
//! 2. validate aggregate volume limits on the result
//! 3. hand the result back, tombstones included, ready for wire tagging
//!
//! Any limit violation rejects the whole transaction; there is no partial
//! application.

use thiserror::Error;

use super::identity::AttrKey;
use super::limits::Limits;
use super::ops::Operation;
use super::snapshot::ProfileSnapshot;
use super::value::{Attribute, AttributeType, AttributeValue};
use crate::error::{Effect, Transience};

#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum ApplyError {
    #[error("cannot hold more than {max} {what}, rolling back transaction")]
    LimitExceeded { what: String, max: usize },
}

impl ApplyError {
    pub fn transience(&self) -> Transience {
        Transience::Permanent
    }

    pub fn effect(&self) -> Effect {
        // Rejection happens before anything is persisted.
        Effect::None
    }
}

/// Apply `ops` to `current`, returning the merged snapshot or rolling the
/// whole transaction back on a limit violation.
pub fn apply_operations(
    current: &ProfileSnapshot,
    ops: &[Operation],
    limits: &Limits,
) -> Result<ProfileSnapshot, ApplyError> {
    let mut next = current.clone();
    for op in ops {
        replay(&mut next, current, op);
    }
    validate_limits(&next, limits)?;
    Ok(next)
}

fn replay(next: &mut ProfileSnapshot, original: &ProfileSnapshot, op: &Operation) {
    match op {
        Operation::SetAttribute { key, value } => {
            // Cross-type overwrite is allowed; the last write wins.
            next.insert(key.clone(), Attribute::new(value.clone()));
        }
        Operation::RemoveAttribute { key } => {
            remove_key(next, original, key);
        }
        Operation::ClearAttributes => {
            let plain: Vec<AttrKey> = next
                .iter()
                .filter(|(_, a)| a.ty != AttributeType::Array)
                .map(|(k, _)| k.clone())
                .collect();
            for key in plain {
                remove_key(next, original, &key);
            }
        }
        Operation::AddTag { collection, tag } => {
            add_items(next, &collection.as_key(), std::iter::once(tag.clone()));
        }
        Operation::RemoveTag { collection, tag } => {
            remove_items(next, &collection.as_key(), std::iter::once(tag.as_str()));
        }
        Operation::ClearTagCollection { collection } => {
            remove_key(next, original, &collection.as_key());
        }
        Operation::ClearTags => {
            let collections: Vec<AttrKey> = next
                .iter()
                .filter(|(_, a)| a.ty == AttributeType::Array)
                .map(|(k, _)| k.clone())
                .collect();
            for key in collections {
                remove_key(next, original, &key);
            }
        }
        Operation::AddToArray { key, values } => {
            add_items(next, key, values.iter().cloned());
        }
        Operation::RemoveFromArray { key, values } => {
            remove_items(next, key, values.iter().map(String::as_str));
        }
    }
}

/// Removal with deletion observability: keys that pre-existed the
/// transaction leave a tombstone (type retained, value nulled) so the remote
/// side sees the delete; keys created within this transaction vanish without
/// a trace; absent keys produce nothing.
fn remove_key(next: &mut ProfileSnapshot, original: &ProfileSnapshot, key: &AttrKey) {
    if let Some(orig) = original.get(key) {
        let ty = next.get(key).map_or(orig.ty, |a| a.ty);
        next.insert(key.clone(), Attribute::tombstone(ty));
    } else if next.contains(key) {
        next.remove(key);
    }
}

/// Insert into the set value under `key`. A non-array or tombstoned entry is
/// overwritten with a fresh array; removing the last member elsewhere leaves
/// an empty set in place (only an explicit clear removes the key).
fn add_items(next: &mut ProfileSnapshot, key: &AttrKey, items: impl Iterator<Item = String>) {
    let mut set = next
        .get(key)
        .and_then(Attribute::as_array)
        .cloned()
        .unwrap_or_default();
    set.extend(items);
    next.insert(key.clone(), Attribute::new(AttributeValue::Array(set)));
}

fn remove_items<'a>(
    next: &mut ProfileSnapshot,
    key: &AttrKey,
    items: impl Iterator<Item = &'a str>,
) {
    let Some(existing) = next.get(key).and_then(Attribute::as_array) else {
        return;
    };
    let mut set = existing.clone();
    for item in items {
        set.remove(item);
    }
    next.insert(key.clone(), Attribute::new(AttributeValue::Array(set)));
}

fn validate_limits(next: &ProfileSnapshot, limits: &Limits) -> Result<(), ApplyError> {
    if next.live_attr_count() > limits.max_attributes {
        return Err(ApplyError::LimitExceeded {
            what: "attributes".into(),
            max: limits.max_attributes,
        });
    }
    if next.collection_count() > limits.max_tag_collections {
        return Err(ApplyError::LimitExceeded {
            what: "tag collections".into(),
            max: limits.max_tag_collections,
        });
    }
    for (key, attr) in next.live_iter() {
        let Some(set) = attr.as_array() else {
            continue;
        };
        if set.len() > limits.max_tags_per_collection {
            return Err(ApplyError::LimitExceeded {
                what: format!("tags in collection `{key}`"),
                max: limits.max_tags_per_collection,
            });
        }
        if set.len() > limits.max_array_items {
            return Err(ApplyError::LimitExceeded {
                what: format!("items in array `{key}`"),
                max: limits.max_array_items,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::core::editor::ProfileEditor;

    fn key(s: &str) -> AttrKey {
        AttrKey::parse(s).unwrap()
    }

    fn set_of(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn apply(current: &ProfileSnapshot, editor: ProfileEditor) -> ProfileSnapshot {
        apply_operations(current, editor.operations(), &Limits::default()).unwrap()
    }

    #[test]
    fn set_then_remove_on_empty_source_leaves_no_trace() {
        let mut editor = ProfileEditor::new();
        editor
            .set_attribute("interests", "sports")
            .set_attribute("age", AttributeValue::Int(23))
            .remove_attribute("interests");

        let result = apply(&ProfileSnapshot::new(), editor);
        assert!(!result.contains(&key("interests")));
        let age = result.get(&key("age")).unwrap();
        assert_eq!(age.ty, AttributeType::Integer);
        assert_eq!(age.value, Some(AttributeValue::Int(23)));
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn remove_of_preexisting_key_leaves_tombstone() {
        let mut current = ProfileSnapshot::new();
        current.insert(key("foo"), Attribute::new(AttributeValue::Str("bar".into())));

        let mut editor = ProfileEditor::new();
        editor.remove_attribute("foo");
        let result = apply(&current, editor);

        let foo = result.get(&key("foo")).unwrap();
        assert!(foo.is_tombstone());
        assert_eq!(foo.ty, AttributeType::String);
        // Caller's snapshot untouched.
        assert!(!current.get(&key("foo")).unwrap().is_tombstone());
    }

    #[test]
    fn cross_type_overwrite_wins_last() {
        let mut current = ProfileSnapshot::new();
        current.insert(key("age"), Attribute::new(AttributeValue::Str("old".into())));

        let mut editor = ProfileEditor::new();
        editor.set_attribute("age", AttributeValue::Int(23));
        let result = apply(&current, editor);
        assert_eq!(result.get(&key("age")).unwrap().ty, AttributeType::Integer);
    }

    #[test]
    fn add_tag_is_idempotent() {
        let mut editor = ProfileEditor::new();
        editor.add_tag("os", "linux").add_tag("os", "linux");
        let result = apply(&ProfileSnapshot::new(), editor);
        assert_eq!(result.get(&key("os")).unwrap().as_array().unwrap().len(), 1);
    }

    #[test]
    fn removing_last_tag_keeps_collection() {
        let mut current = ProfileSnapshot::new();
        current.insert(
            key("os"),
            Attribute::new(AttributeValue::Array(set_of(&["linux"]))),
        );

        let mut editor = ProfileEditor::new();
        editor.remove_tag("os", "linux");
        let result = apply(&current, editor);

        let os = result.get(&key("os")).unwrap();
        assert_eq!(os.as_array().unwrap().len(), 0);
        assert!(!os.is_tombstone());
    }

    #[test]
    fn clear_tag_collection_tombstones_preexisting() {
        let mut current = ProfileSnapshot::new();
        current.insert(
            key("os"),
            Attribute::new(AttributeValue::Array(set_of(&["linux"]))),
        );

        let mut editor = ProfileEditor::new();
        editor.clear_tag_collection("os");
        let result = apply(&current, editor);
        assert!(result.get(&key("os")).unwrap().is_tombstone());
    }

    #[test]
    fn clear_attributes_spares_collections() {
        let mut current = ProfileSnapshot::new();
        current.insert(key("age"), Attribute::new(AttributeValue::Int(23)));
        current.insert(
            key("os"),
            Attribute::new(AttributeValue::Array(set_of(&["linux"]))),
        );

        let mut editor = ProfileEditor::new();
        editor.clear_attributes();
        let result = apply(&current, editor);

        assert!(result.get(&key("age")).unwrap().is_tombstone());
        assert!(!result.get(&key("os")).unwrap().is_tombstone());
    }

    #[test]
    fn clear_tags_spares_plain_attributes() {
        let mut current = ProfileSnapshot::new();
        current.insert(key("age"), Attribute::new(AttributeValue::Int(23)));
        current.insert(
            key("os"),
            Attribute::new(AttributeValue::Array(set_of(&["linux"]))),
        );

        let mut editor = ProfileEditor::new();
        editor.clear_tags();
        let result = apply(&current, editor);

        assert!(!result.get(&key("age")).unwrap().is_tombstone());
        assert!(result.get(&key("os")).unwrap().is_tombstone());
    }

    #[test]
    fn add_to_array_over_non_array_overwrites() {
        let mut current = ProfileSnapshot::new();
        current.insert(key("langs"), Attribute::new(AttributeValue::Str("en".into())));

        let mut editor = ProfileEditor::new();
        editor.add_to_array("langs", vec!["de"]);
        let result = apply(&current, editor);
        assert_eq!(result.get(&key("langs")).unwrap().as_array().unwrap(), &set_of(&["de"]));
    }

    #[test]
    fn replaying_same_log_twice_converges() {
        let mut editor = ProfileEditor::new();
        editor.add_tag("os", "linux").set_attribute("age", AttributeValue::Int(23));
        let ops = editor.into_operations();

        let limits = Limits::default();
        let once = apply_operations(&ProfileSnapshot::new(), &ops, &limits).unwrap();
        let twice = apply_operations(&once, &ops, &limits).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn attribute_limit_rolls_back_whole_transaction() {
        let limits = Limits {
            max_attributes: 50,
            ..Limits::default()
        };
        let mut editor = ProfileEditor::new();
        for i in 0..51i64 {
            editor.set_attribute(&format!("attr_{i}"), AttributeValue::Int(i));
        }

        let current = ProfileSnapshot::new();
        let err = apply_operations(&current, editor.operations(), &limits).unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot hold more than 50 attributes, rolling back transaction"
        );
        assert!(current.is_empty());
    }

    #[test]
    fn collection_limit_is_named_in_error() {
        let limits = Limits {
            max_tag_collections: 2,
            ..Limits::default()
        };
        let mut editor = ProfileEditor::new();
        editor.add_tag("a", "x").add_tag("b", "x").add_tag("c", "x");
        let err =
            apply_operations(&ProfileSnapshot::new(), editor.operations(), &limits).unwrap_err();
        assert!(err.to_string().contains("2 tag collections"));
    }

    #[test]
    fn per_collection_tag_limit_is_named_in_error() {
        let limits = Limits {
            max_tags_per_collection: 3,
            ..Limits::default()
        };
        let mut editor = ProfileEditor::new();
        for i in 0..4 {
            editor.add_tag("os", &format!("tag{i}"));
        }
        let err =
            apply_operations(&ProfileSnapshot::new(), editor.operations(), &limits).unwrap_err();
        assert!(err.to_string().contains("tags in collection `os`"));
    }

    #[test]
    fn remove_then_readd_within_transaction_passes_limits() {
        // Apply-then-validate: only the aggregate result is checked.
        let limits = Limits {
            max_attributes: 1,
            ..Limits::default()
        };
        let mut current = ProfileSnapshot::new();
        current.insert(key("a"), Attribute::new(AttributeValue::Int(1)));

        let mut editor = ProfileEditor::new();
        editor
            .remove_attribute("a")
            .set_attribute("b", AttributeValue::Int(2));
        let result = apply_operations(&current, editor.operations(), &limits).unwrap();
        assert!(result.get(&key("a")).unwrap().is_tombstone());
        assert_eq!(result.live_attr_count(), 1);
    }
}
