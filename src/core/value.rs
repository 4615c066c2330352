//! Typed attribute values.
//!
//! AttributeType: declared type with a one-character wire code
//! AttributeValue: tagged value union
//! Attribute: type + optional value; `value: None` is a removal tombstone

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{CoreError, InvalidValue};

/// Declared attribute type.
///
/// The wire code is the single character appended to the key in outbound
/// payloads (`"age.i"`, `"city.s"`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    String,
    Boolean,
    Integer,
    Float,
    Date,
    Url,
    Array,
}

impl AttributeType {
    pub fn code(self) -> char {
        match self {
            AttributeType::String => 's',
            AttributeType::Boolean => 'b',
            AttributeType::Integer => 'i',
            AttributeType::Float => 'f',
            AttributeType::Date => 't',
            AttributeType::Url => 'u',
            AttributeType::Array => 'a',
        }
    }

    pub fn from_code(c: char) -> Option<Self> {
        match c {
            's' => Some(AttributeType::String),
            'b' => Some(AttributeType::Boolean),
            'i' => Some(AttributeType::Integer),
            'f' => Some(AttributeType::Float),
            't' => Some(AttributeType::Date),
            'u' => Some(AttributeType::Url),
            'a' => Some(AttributeType::Array),
            _ => None,
        }
    }
}

/// Tagged attribute value.
///
/// Dates are epoch milliseconds. Arrays are deduplicated, unordered sets of
/// short strings.
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeValue {
    Str(String),
    Bool(bool),
    Int(i64),
    Float(f64),
    Date(i64),
    Url(String),
    Array(BTreeSet<String>),
}

impl AttributeValue {
    pub fn attribute_type(&self) -> AttributeType {
        match self {
            AttributeValue::Str(_) => AttributeType::String,
            AttributeValue::Bool(_) => AttributeType::Boolean,
            AttributeValue::Int(_) => AttributeType::Integer,
            AttributeValue::Float(_) => AttributeType::Float,
            AttributeValue::Date(_) => AttributeType::Date,
            AttributeValue::Url(_) => AttributeType::Url,
            AttributeValue::Array(_) => AttributeType::Array,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            AttributeValue::Str(s) | AttributeValue::Url(s) => Value::String(s.clone()),
            AttributeValue::Bool(b) => Value::Bool(*b),
            AttributeValue::Int(n) => Value::from(*n),
            AttributeValue::Float(x) => {
                serde_json::Number::from_f64(*x).map_or(Value::Null, Value::Number)
            }
            AttributeValue::Date(ms) => Value::from(*ms),
            AttributeValue::Array(set) => {
                Value::Array(set.iter().cloned().map(Value::String).collect())
            }
        }
    }

    /// Decode a stored JSON value under a declared type.
    pub fn from_json(ty: AttributeType, value: &Value) -> Result<Self, CoreError> {
        let mismatch = |expected: &str| InvalidValue {
            reason: format!("expected {expected}, got {value}"),
        };
        match ty {
            AttributeType::String => value
                .as_str()
                .map(|s| AttributeValue::Str(s.to_string()))
                .ok_or_else(|| mismatch("string").into()),
            AttributeType::Url => value
                .as_str()
                .map(|s| AttributeValue::Url(s.to_string()))
                .ok_or_else(|| mismatch("url string").into()),
            AttributeType::Boolean => value
                .as_bool()
                .map(AttributeValue::Bool)
                .ok_or_else(|| mismatch("boolean").into()),
            AttributeType::Integer => value
                .as_i64()
                .map(AttributeValue::Int)
                .ok_or_else(|| mismatch("integer").into()),
            AttributeType::Float => value
                .as_f64()
                .map(AttributeValue::Float)
                .ok_or_else(|| mismatch("number").into()),
            AttributeType::Date => value
                .as_i64()
                .map(AttributeValue::Date)
                .ok_or_else(|| mismatch("epoch milliseconds").into()),
            AttributeType::Array => {
                let items = value.as_array().ok_or_else(|| mismatch("array"))?;
                let mut set = BTreeSet::new();
                for item in items {
                    let s = item.as_str().ok_or_else(|| mismatch("array of strings"))?;
                    set.insert(s.to_string());
                }
                Ok(AttributeValue::Array(set))
            }
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::Str(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::Str(s)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Bool(b)
    }
}

impl From<i64> for AttributeValue {
    fn from(n: i64) -> Self {
        AttributeValue::Int(n)
    }
}

impl From<i32> for AttributeValue {
    fn from(n: i32) -> Self {
        AttributeValue::Int(n as i64)
    }
}

impl From<f64> for AttributeValue {
    fn from(x: f64) -> Self {
        AttributeValue::Float(x)
    }
}

/// One attribute as held in a snapshot.
///
/// `value: None` marks a removal for a key that pre-existed the transaction:
/// the type is retained and the wire value is null so the remote side can
/// observe the deletion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredAttr", into = "StoredAttr")]
pub struct Attribute {
    pub ty: AttributeType,
    pub value: Option<AttributeValue>,
}

impl Attribute {
    pub fn new(value: AttributeValue) -> Self {
        Self {
            ty: value.attribute_type(),
            value: Some(value),
        }
    }

    pub fn tombstone(ty: AttributeType) -> Self {
        Self { ty, value: None }
    }

    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    /// Set-valued payload, when this is a live ARRAY attribute.
    pub fn as_array(&self) -> Option<&BTreeSet<String>> {
        match &self.value {
            Some(AttributeValue::Array(set)) => Some(set),
            _ => None,
        }
    }
}

/// Stored form: `{"type": "i", "value": 23}`.
#[derive(Serialize, Deserialize)]
struct StoredAttr {
    #[serde(rename = "type")]
    ty: String,
    value: Value,
}

impl From<Attribute> for StoredAttr {
    fn from(attr: Attribute) -> Self {
        StoredAttr {
            ty: attr.ty.code().to_string(),
            value: attr.value.as_ref().map_or(Value::Null, |v| v.to_json()),
        }
    }
}

impl TryFrom<StoredAttr> for Attribute {
    type Error = CoreError;

    fn try_from(stored: StoredAttr) -> Result<Self, Self::Error> {
        let mut chars = stored.ty.chars();
        let ty = match (chars.next(), chars.next()) {
            (Some(c), None) => AttributeType::from_code(c),
            _ => None,
        }
        .ok_or_else(|| InvalidValue {
            reason: format!("unknown type code `{}`", stored.ty),
        })?;
        if stored.value.is_null() {
            return Ok(Attribute::tombstone(ty));
        }
        Ok(Attribute {
            ty,
            value: Some(AttributeValue::from_json(ty, &stored.value)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_codes_round_trip() {
        for ty in [
            AttributeType::String,
            AttributeType::Boolean,
            AttributeType::Integer,
            AttributeType::Float,
            AttributeType::Date,
            AttributeType::Url,
            AttributeType::Array,
        ] {
            assert_eq!(AttributeType::from_code(ty.code()), Some(ty));
        }
        assert_eq!(AttributeType::from_code('x'), None);
    }

    #[test]
    fn attribute_serde_round_trip() {
        let attr = Attribute::new(AttributeValue::Int(23));
        let json = serde_json::to_value(&attr).unwrap();
        assert_eq!(json, serde_json::json!({"type": "i", "value": 23}));
        let back: Attribute = serde_json::from_value(json).unwrap();
        assert_eq!(back, attr);
    }

    #[test]
    fn tombstone_serializes_as_null() {
        let attr = Attribute::tombstone(AttributeType::String);
        let json = serde_json::to_value(&attr).unwrap();
        assert_eq!(json, serde_json::json!({"type": "s", "value": null}));
        let back: Attribute = serde_json::from_value(json).unwrap();
        assert!(back.is_tombstone());
        assert_eq!(back.ty, AttributeType::String);
    }

    #[test]
    fn array_from_json_dedupes() {
        let value = serde_json::json!(["b", "a", "b"]);
        let decoded = AttributeValue::from_json(AttributeType::Array, &value).unwrap();
        let AttributeValue::Array(set) = decoded else {
            panic!("expected array");
        };
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn from_json_rejects_shape_mismatch() {
        assert!(AttributeValue::from_json(AttributeType::Integer, &Value::from("x")).is_err());
        assert!(AttributeValue::from_json(AttributeType::Boolean, &Value::from(1)).is_err());
        assert!(
            AttributeValue::from_json(AttributeType::Array, &serde_json::json!([1, 2])).is_err()
        );
    }
}
