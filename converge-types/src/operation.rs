//! Operations exchanged between replicas and hubs.
//!
//! An operation is the unit of replication. It is immutable once created and
//! carries everything a replica or hub needs to apply it: the element key,
//! the value for adds, and the ordering key deciding which write wins.

use crate::{Error, OrderingKey, ReplicaId, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What an operation does to its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Insert or overwrite the value of a key.
    Add,
    /// Remove the key, leaving a tombstone.
    Remove,
}

impl OperationKind {
    /// Decodes the numeric op codes used by driving harnesses:
    /// `0` add, `1` remove, `2` update (an upsert, applied as an add).
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0 | 2 => Ok(Self::Add),
            1 => Ok(Self::Remove),
            other => Err(Error::InvalidKind(other.to_string())),
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => f.write_str("add"),
            Self::Remove => f.write_str("remove"),
        }
    }
}

impl FromStr for OperationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        if let Ok(code) = normalized.parse::<i64>() {
            return Self::from_code(code);
        }
        match normalized.as_str() {
            "add" | "update" | "upsert" => Ok(Self::Add),
            "remove" | "delete" => Ok(Self::Remove),
            _ => Err(Error::InvalidKind(normalized)),
        }
    }
}

/// A single add or remove, stamped with its ordering key.
///
/// An add always carries a value and a remove never does. Deserialization
/// applies the same checks as [`Operation::from_parts`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "OperationRecord")]
pub struct Operation {
    kind: OperationKind,
    key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    ordering_key: OrderingKey,
}

/// Wire shape of an [`Operation`] before validation.
#[derive(Deserialize)]
struct OperationRecord {
    kind: OperationKind,
    key: String,
    #[serde(default)]
    value: Option<String>,
    ordering_key: OrderingKey,
}

impl TryFrom<OperationRecord> for Operation {
    type Error = Error;

    fn try_from(record: OperationRecord) -> Result<Self> {
        Self::from_parts(record.kind, record.key, record.value, record.ordering_key)
    }
}

impl Operation {
    /// Creates an add operation.
    #[must_use]
    pub fn add(key: impl Into<String>, value: impl Into<String>, ordering_key: OrderingKey) -> Self {
        Self {
            kind: OperationKind::Add,
            key: key.into(),
            value: Some(value.into()),
            ordering_key,
        }
    }

    /// Creates a remove operation.
    #[must_use]
    pub fn remove(key: impl Into<String>, ordering_key: OrderingKey) -> Self {
        Self {
            kind: OperationKind::Remove,
            key: key.into(),
            value: None,
            ordering_key,
        }
    }

    /// Builds an operation from loose parts, rejecting malformed combinations.
    ///
    /// The key must be non-empty, an add needs a value, a remove must not
    /// carry one, and the ordering key needs an origin.
    pub fn from_parts(
        kind: OperationKind,
        key: impl Into<String>,
        value: Option<String>,
        ordering_key: OrderingKey,
    ) -> Result<Self> {
        let op = Self {
            kind,
            key: key.into(),
            value,
            ordering_key,
        };
        op.validate()?;
        Ok(op)
    }

    /// Checks the structural invariants of an operation.
    pub fn validate(&self) -> Result<()> {
        if self.key.is_empty() {
            return Err(Error::MalformedOperation("missing key".into()));
        }
        if self.ordering_key.origin().is_empty() {
            return Err(Error::MalformedOperation("missing origin".into()));
        }
        match (self.kind, &self.value) {
            (OperationKind::Add, None) => Err(Error::MalformedOperation(format!(
                "add of '{}' carries no value",
                self.key
            ))),
            (OperationKind::Remove, Some(_)) => Err(Error::MalformedOperation(format!(
                "remove of '{}' carries a value",
                self.key
            ))),
            _ => Ok(()),
        }
    }

    /// The operation kind.
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// The element key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The value, present for adds only.
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// The ordering key.
    #[must_use]
    pub fn ordering_key(&self) -> &OrderingKey {
        &self.ordering_key
    }

    /// The replica that issued the operation.
    #[must_use]
    pub fn origin(&self) -> &ReplicaId {
        self.ordering_key.origin()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(v) => write!(f, "{} {}={} @ {}", self.kind, self.key, v, self.ordering_key),
            None => write!(f, "{} {} @ {}", self.kind, self.key, self.ordering_key),
        }
    }
}
