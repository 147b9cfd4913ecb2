//! Last-Writer-Wins Element Set (LWW-Element-Set).
//!
//! A key-value set built from two LWW registries per key: one for add intents
//! (carrying the value) and one for remove intents (carrying a tombstone).
//! Each registry only ever moves forward in ordering key, so applying the same
//! writes in any order, any number of times, yields the same state.
//!
//! A key is visible when its add outranks its remove:
//! - no add: absent
//! - add but no remove: present
//! - both: present only if the add timestamp is strictly later than the remove
//!   timestamp. An add and a remove with the same timestamp from different
//!   replicas resolve to absent (remove bias), whatever their origin ids.

use crate::LWWRegister;
use converge_types::{Operation, OperationKind, OrderingKey};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Marker stored in the remove registry in place of a value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tombstone;

/// A Last-Writer-Wins Element Set over string keys and values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LWWElementSet {
    /// Latest add intent per key.
    adds: HashMap<String, LWWRegister<String>>,
    /// Latest remove intent per key.
    removes: HashMap<String, LWWRegister<Tombstone>>,
}

impl LWWElementSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an add intent for `key`.
    ///
    /// Replaces the stored add only if `ordering_key` is strictly greater.
    /// Returns true if the add registry changed.
    pub fn apply_add(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
        ordering_key: OrderingKey,
    ) -> bool {
        upsert(&mut self.adds, key.into(), value.into(), ordering_key)
    }

    /// Records a remove intent (tombstone) for `key`.
    ///
    /// Removing a key that was never added is allowed; the tombstone still
    /// outranks any older add that arrives later.
    pub fn apply_remove(&mut self, key: impl Into<String>, ordering_key: OrderingKey) -> bool {
        upsert(&mut self.removes, key.into(), Tombstone, ordering_key)
    }

    /// Applies an operation through `apply_add` or `apply_remove`.
    ///
    /// Every constructor of [`Operation`], deserialization included, pairs
    /// an add with its value.
    pub fn apply(&mut self, op: &Operation) -> bool {
        match op.kind() {
            OperationKind::Add => match op.value() {
                Some(value) => self.apply_add(op.key(), value, op.ordering_key().clone()),
                None => false,
            },
            OperationKind::Remove => self.apply_remove(op.key(), op.ordering_key().clone()),
        }
    }

    /// Returns the visible value of `key`, if any.
    #[must_use]
    pub fn query(&self, key: &str) -> Option<&str> {
        let add = self.adds.get(key)?;
        match self.removes.get(key) {
            None => Some(add.value().as_str()),
            Some(remove) if add_outranks(add.ordering_key(), remove.ordering_key()) => {
                Some(add.value().as_str())
            }
            Some(_) => None,
        }
    }

    /// Returns true if `key` is visible.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.query(key).is_some()
    }

    /// Returns every visible key with its value, sorted by key.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.adds
            .keys()
            .filter_map(|key| self.query(key).map(|v| (key.clone(), v.to_owned())))
            .collect()
    }

    /// Returns the number of visible keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.adds.keys().filter(|key| self.contains(key)).count()
    }

    /// Returns true if no key is visible.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Merges another set into this one, entry by entry.
    ///
    /// This is the join of the two states:
    /// - Commutative: merge(a, b) == merge(b, a)
    /// - Associative: merge(merge(a, b), c) == merge(a, merge(b, c))
    /// - Idempotent: merge(a, a) == a
    pub fn merge(&mut self, other: &Self) {
        for (key, add) in &other.adds {
            self.apply_add(key.as_str(), add.value().as_str(), add.ordering_key().clone());
        }
        for (key, remove) in &other.removes {
            self.apply_remove(key.as_str(), remove.ordering_key().clone());
        }
    }

    /// Creates a new set that is the merge of this and another.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.merge(other);
        result
    }

    /// Returns the stored add intent for `key` (for replication/debugging).
    #[must_use]
    pub fn add_entry(&self, key: &str) -> Option<&LWWRegister<String>> {
        self.adds.get(key)
    }

    /// Returns the stored remove intent for `key` (for replication/debugging).
    #[must_use]
    pub fn remove_entry(&self, key: &str) -> Option<&LWWRegister<Tombstone>> {
        self.removes.get(key)
    }

    /// Number of tombstones held, including those for keys that are visible again.
    #[must_use]
    pub fn tombstone_count(&self) -> usize {
        self.removes.len()
    }

    /// Re-expresses the whole state as operations, sorted by ordering key.
    ///
    /// Applying them to an empty set reproduces this set exactly.
    #[must_use]
    pub fn operations(&self) -> Vec<Operation> {
        let adds = self.adds.iter().map(|(key, reg)| {
            Operation::add(key.as_str(), reg.value().as_str(), reg.ordering_key().clone())
        });
        let removes = self
            .removes
            .iter()
            .map(|(key, reg)| Operation::remove(key.as_str(), reg.ordering_key().clone()));
        let mut ops: Vec<Operation> = adds.chain(removes).collect();
        ops.sort_by(|a, b| {
            a.ordering_key()
                .cmp(b.ordering_key())
                .then_with(|| a.key().cmp(b.key()))
        });
        ops
    }
}

impl FromIterator<Operation> for LWWElementSet {
    fn from_iter<I: IntoIterator<Item = Operation>>(iter: I) -> Self {
        let mut set = Self::new();
        for op in iter {
            set.apply(&op);
        }
        set
    }
}

fn upsert<T>(
    registry: &mut HashMap<String, LWWRegister<T>>,
    key: String,
    value: T,
    ordering_key: OrderingKey,
) -> bool {
    match registry.get_mut(&key) {
        Some(existing) => existing.set(value, ordering_key),
        None => {
            registry.insert(key, LWWRegister::new(value, ordering_key));
            true
        }
    }
}

/// Decides an add/remove conflict on the same key.
///
/// Identical keys can only be the same write, so the add stands. Otherwise
/// the add needs a strictly later timestamp: equal timestamps go to the remove.
fn add_outranks(add: &OrderingKey, remove: &OrderingKey) -> bool {
    add == remove || add.timestamp() > remove.timestamp()
}
