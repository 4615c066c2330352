//! Operation log builder.
//!
//! Fluent editing surface: each call validates and normalizes its inputs
//! into zero or one `Operation`. Invalid input is dropped silently (a debug
//! log line, no error) - a deliberate ergonomic contract, not an oversight.
//! Appended operations are never retroactively removed by later failures.

use std::collections::BTreeSet;

use tracing::debug;

use super::identity::{AttrKey, CollectionName};
use super::limits::Limits;
use super::ops::Operation;
use super::value::AttributeValue;

#[derive(Debug, Default)]
pub struct ProfileEditor {
    limits: Limits,
    ops: Vec<Operation>,
}

impl ProfileEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: Limits) -> Self {
        Self {
            limits,
            ops: Vec::new(),
        }
    }

    /// Operations accumulated so far, in append order. Repeatable read:
    /// calling this does not mutate the builder.
    pub fn operations(&self) -> &[Operation] {
        &self.ops
    }

    pub fn into_operations(self) -> Vec<Operation> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Set a typed attribute. The value union carries its own type tag, so
    /// structural mismatch cannot occur here; only key validity and length
    /// caps can drop the call.
    pub fn set_attribute(&mut self, key: &str, value: impl Into<AttributeValue>) -> &mut Self {
        let value = value.into();
        let Some(key) = self.checked_key(key) else {
            return self;
        };
        let Some(value) = self.checked_value(&key, value) else {
            return self;
        };
        self.ops.push(Operation::SetAttribute { key, value });
        self
    }

    /// Set a DATE attribute from epoch milliseconds.
    pub fn set_date(&mut self, key: &str, epoch_ms: i64) -> &mut Self {
        self.set_attribute(key, AttributeValue::Date(epoch_ms))
    }

    /// Set a URL attribute. Longer than the URL cap is dropped.
    pub fn set_url(&mut self, key: &str, url: &str) -> &mut Self {
        self.set_attribute(key, AttributeValue::Url(url.to_string()))
    }

    pub fn remove_attribute(&mut self, key: &str) -> &mut Self {
        if let Some(key) = self.checked_key(key) {
            self.ops.push(Operation::RemoveAttribute { key });
        }
        self
    }

    pub fn clear_attributes(&mut self) -> &mut Self {
        self.ops.push(Operation::ClearAttributes);
        self
    }

    pub fn add_tag(&mut self, collection: &str, tag: &str) -> &mut Self {
        let Some(collection) = self.checked_collection(collection) else {
            return self;
        };
        let Some(tag) = self.checked_tag(tag) else {
            return self;
        };
        self.ops.push(Operation::AddTag { collection, tag });
        self
    }

    pub fn remove_tag(&mut self, collection: &str, tag: &str) -> &mut Self {
        let Some(collection) = self.checked_collection(collection) else {
            return self;
        };
        let Some(tag) = self.checked_tag(tag) else {
            return self;
        };
        self.ops.push(Operation::RemoveTag { collection, tag });
        self
    }

    pub fn clear_tag_collection(&mut self, collection: &str) -> &mut Self {
        if let Some(collection) = self.checked_collection(collection) {
            self.ops.push(Operation::ClearTagCollection { collection });
        }
        self
    }

    pub fn clear_tags(&mut self) -> &mut Self {
        self.ops.push(Operation::ClearTags);
        self
    }

    pub fn add_to_array<I, S>(&mut self, key: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let Some(key) = self.checked_key(key) else {
            return self;
        };
        let Some(values) = self.checked_items(values) else {
            return self;
        };
        self.ops.push(Operation::AddToArray { key, values });
        self
    }

    pub fn remove_from_array<I, S>(&mut self, key: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let Some(key) = self.checked_key(key) else {
            return self;
        };
        let Some(values) = self.checked_items(values) else {
            return self;
        };
        self.ops.push(Operation::RemoveFromArray { key, values });
        self
    }

    fn checked_key(&self, raw: &str) -> Option<AttrKey> {
        match AttrKey::parse(raw) {
            Ok(key) => Some(key),
            Err(err) => {
                debug!(raw, %err, "dropping edit: invalid key");
                None
            }
        }
    }

    fn checked_collection(&self, raw: &str) -> Option<CollectionName> {
        match CollectionName::parse(raw) {
            Ok(name) => Some(name),
            Err(err) => {
                debug!(raw, %err, "dropping edit: invalid collection name");
                None
            }
        }
    }

    fn checked_tag(&self, raw: &str) -> Option<String> {
        if raw.is_empty() || raw.chars().count() > self.limits.max_tag_len {
            debug!(raw, "dropping edit: empty or overlong tag");
            return None;
        }
        Some(raw.to_string())
    }

    fn checked_value(&self, key: &AttrKey, value: AttributeValue) -> Option<AttributeValue> {
        match &value {
            AttributeValue::Str(s) if s.chars().count() > self.limits.max_string_len => {
                debug!(%key, "dropping edit: string value over length cap");
                None
            }
            // NaN and infinities have no JSON representation; a null on the
            // wire would read back as a deletion tombstone.
            AttributeValue::Float(x) if !x.is_finite() => {
                debug!(%key, "dropping edit: non-finite float value");
                None
            }
            AttributeValue::Url(u) if u.chars().count() > self.limits.max_url_len => {
                debug!(%key, "dropping edit: url value over length cap");
                None
            }
            AttributeValue::Array(set) => {
                let filtered: BTreeSet<String> = set
                    .iter()
                    .filter(|s| !s.is_empty() && s.chars().count() <= self.limits.max_tag_len)
                    .cloned()
                    .collect();
                if filtered.is_empty() {
                    debug!(%key, "dropping edit: array value has no valid items");
                    return None;
                }
                Some(AttributeValue::Array(filtered))
            }
            _ => Some(value),
        }
    }

    fn checked_items<I, S>(&self, values: I) -> Option<BTreeSet<String>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let filtered: BTreeSet<String> = values
            .into_iter()
            .map(Into::into)
            .filter(|s| !s.is_empty() && s.chars().count() <= self.limits.max_tag_len)
            .collect();
        if filtered.is_empty() {
            debug!("dropping edit: no valid array items");
            return None;
        }
        Some(filtered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chained_calls_append_in_order() {
        let mut editor = ProfileEditor::new();
        editor
            .set_attribute("interests", "sports")
            .set_attribute("age", AttributeValue::Int(23))
            .remove_attribute("interests");

        let ops = editor.operations();
        assert_eq!(ops.len(), 3);
        assert!(matches!(&ops[0], Operation::SetAttribute { key, .. } if key.as_str() == "interests"));
        assert!(matches!(&ops[1], Operation::SetAttribute { key, .. } if key.as_str() == "age"));
        assert!(matches!(&ops[2], Operation::RemoveAttribute { key } if key.as_str() == "interests"));
    }

    #[test]
    fn invalid_key_is_dropped_silently() {
        let mut editor = ProfileEditor::new();
        editor
            .set_attribute("", "x")
            .set_attribute("has space", "x")
            .set_attribute(&"k".repeat(31), "x")
            .remove_attribute("bad-key");
        assert!(editor.is_empty());
    }

    #[test]
    fn overlong_string_is_dropped() {
        let mut editor = ProfileEditor::new();
        editor.set_attribute("bio", "x".repeat(65).as_str());
        assert!(editor.is_empty());
        editor.set_attribute("bio", "x".repeat(64).as_str());
        assert_eq!(editor.len(), 1);
    }

    #[test]
    fn overlong_url_is_dropped() {
        let mut editor = ProfileEditor::new();
        editor.set_url("home", &format!("https://example.com/{}", "x".repeat(2048)));
        assert!(editor.is_empty());
        editor.set_url("home", "https://example.com/");
        assert_eq!(editor.len(), 1);
    }

    #[test]
    fn non_finite_float_is_dropped() {
        let mut editor = ProfileEditor::new();
        editor
            .set_attribute("score", f64::NAN)
            .set_attribute("rate", f64::INFINITY)
            .set_attribute("dip", f64::NEG_INFINITY);
        assert!(editor.is_empty());
        editor.set_attribute("score", 0.5);
        assert_eq!(editor.len(), 1);
    }

    #[test]
    fn length_caps_count_chars_not_bytes() {
        // 64 chars, 128 bytes: within every cap.
        let multibyte = "é".repeat(64);
        let mut editor = ProfileEditor::new();
        editor
            .set_attribute("bio", multibyte.as_str())
            .add_tag("os", &multibyte)
            .add_to_array("langs", vec![multibyte.as_str()]);
        assert_eq!(editor.len(), 3);

        let mut editor = ProfileEditor::new();
        editor.add_tag("os", &"é".repeat(65));
        assert!(editor.is_empty());
    }

    #[test]
    fn keys_are_case_normalized() {
        let mut editor = ProfileEditor::new();
        editor.set_attribute("FavoriteTeam", "reds");
        let Operation::SetAttribute { key, .. } = &editor.operations()[0] else {
            panic!("expected set");
        };
        assert_eq!(key.as_str(), "favoriteteam");
    }

    #[test]
    fn empty_tag_is_dropped_but_earlier_ops_stay() {
        let mut editor = ProfileEditor::new();
        editor.add_tag("os", "linux").add_tag("os", "");
        assert_eq!(editor.len(), 1);
    }

    #[test]
    fn array_items_are_filtered() {
        let mut editor = ProfileEditor::new();
        editor.add_to_array("langs", vec!["en", "", "de"]);
        let Operation::AddToArray { values, .. } = &editor.operations()[0] else {
            panic!("expected add_to_array");
        };
        assert_eq!(values.len(), 2);

        editor.add_to_array("empty", Vec::<String>::new());
        assert_eq!(editor.len(), 1);
    }

    #[test]
    fn operations_is_repeatable_read() {
        let mut editor = ProfileEditor::new();
        editor.set_attribute("a", "1");
        let first = editor.operations().to_vec();
        let second = editor.operations().to_vec();
        assert_eq!(first, second);
    }
}
