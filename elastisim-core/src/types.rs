// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Newtype wrappers for validated inputs.
//!
//! Identifiers crossing the allocator boundary are validated at creation time,
//! so everything past `assign` can rely on them being well-formed.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::HardValidationError;

/// Maximum accepted requester identifier length.
const MAX_REQUESTER_ID_LEN: usize = 128;

/// Validated identifier of the party submitting a request.
/// Must be non-empty, at most 128 chars, with no control characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RequesterId(String);

impl RequesterId {
    /// Create a new RequesterId with validation.
    pub fn new(id: impl Into<String>) -> Result<Self, HardValidationError> {
        let id = id.into();

        if id.is_empty() {
            return Err(HardValidationError::InvalidFieldValue {
                field: "requester_id",
                value: id,
                reason: "Requester ID cannot be empty".to_string(),
            });
        }

        if id.chars().count() > MAX_REQUESTER_ID_LEN {
            return Err(HardValidationError::InvalidFieldValue {
                field: "requester_id",
                value: id.clone(),
                reason: format!(
                    "Requester ID too long: {} chars (max {})",
                    id.chars().count(),
                    MAX_REQUESTER_ID_LEN
                ),
            });
        }

        if id.chars().any(char::is_control) {
            return Err(HardValidationError::InvalidFieldValue {
                field: "requester_id",
                value: id.escape_debug().to_string(),
                reason: "Requester ID must not contain control characters".to_string(),
            });
        }

        Ok(Self(id))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequesterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for RequesterId {
    type Error = HardValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for RequesterId {
    type Error = HardValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RequesterId> for String {
    fn from(id: RequesterId) -> Self {
        id.0
    }
}

/// Position-derived server identifier.
///
/// A new server receives the pool size before growth, so ids are reused after
/// a shrink followed by a grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(usize);

impl ServerId {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Get the pool index this id was assigned from.
    pub const fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for ServerId {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

/// Unique identifier minted for every admitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
