//! Normalized edit operations.
//!
//! Operations are immutable once built and replay strictly in append order;
//! within one transaction, later operations override earlier ones on the
//! same key ("last write wins").

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::identity::{AttrKey, CollectionName};
use super::value::AttributeValue;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    SetAttribute {
        key: AttrKey,
        #[serde(with = "attr_value_serde")]
        value: AttributeValue,
    },
    RemoveAttribute {
        key: AttrKey,
    },
    ClearAttributes,
    AddTag {
        collection: CollectionName,
        tag: String,
    },
    RemoveTag {
        collection: CollectionName,
        tag: String,
    },
    ClearTagCollection {
        collection: CollectionName,
    },
    ClearTags,
    AddToArray {
        key: AttrKey,
        values: BTreeSet<String>,
    },
    RemoveFromArray {
        key: AttrKey,
        values: BTreeSet<String>,
    },
}

mod attr_value_serde {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::core::value::{Attribute, AttributeValue};

    pub fn serialize<S: Serializer>(value: &AttributeValue, ser: S) -> Result<S::Ok, S::Error> {
        serde::Serialize::serialize(&Attribute::new(value.clone()), ser)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<AttributeValue, D::Error> {
        let attr = Attribute::deserialize(de)?;
        attr.value
            .ok_or_else(|| D::Error::custom("set operation carries no value"))
    }
}
