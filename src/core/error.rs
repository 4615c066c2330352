//! Core capability errors (key validation, value validation).
//!
//! These represent domain/refusal states, not library implementation
//! details. Builder-level input mistakes never surface as errors at all:
//! the editor drops them silently.

use thiserror::Error;

use crate::error::{Effect, Transience};

/// Invalid attribute key, collection name, or identifier.
#[derive(Debug, Error, Clone)]
#[error("{kind} `{raw}` is invalid: {reason}")]
pub struct InvalidKey {
    pub kind: &'static str,
    pub raw: String,
    pub reason: String,
}

/// Invalid attribute value (length cap, empty member, type mismatch).
#[derive(Debug, Error, Clone)]
#[error("invalid value: {reason}")]
pub struct InvalidValue {
    pub reason: String,
}

/// Canonical error enum for the core capability.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum CoreError {
    #[error(transparent)]
    InvalidKey(#[from] InvalidKey),
    #[error(transparent)]
    InvalidValue(#[from] InvalidValue),
}

impl CoreError {
    pub fn transience(&self) -> Transience {
        // Pure input failures; retrying without changing inputs never helps.
        Transience::Permanent
    }

    pub fn effect(&self) -> Effect {
        Effect::None
    }
}
