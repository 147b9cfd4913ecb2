//! Last-Writer-Wins Register (LWW-Register).
//!
//! Stores a single payload together with the [`OrderingKey`] of the write that
//! produced it. Concurrent writes are resolved by comparing ordering keys: the
//! strictly greater key wins, and an equal key is the same write seen again.
//!
//! The element set keeps one register per key in each of its two registries.

use converge_types::OrderingKey;
use serde::{Deserialize, Serialize};

/// A Last-Writer-Wins Register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LWWRegister<T> {
    /// The current payload.
    value: T,
    /// Ordering key of the winning write.
    ordering_key: OrderingKey,
}

impl<T> LWWRegister<T> {
    /// Creates a register holding `value`, written at `ordering_key`.
    #[must_use]
    pub fn new(value: T, ordering_key: OrderingKey) -> Self {
        Self {
            value,
            ordering_key,
        }
    }

    /// Returns a reference to the current payload.
    #[must_use]
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Returns the ordering key of the last winning write.
    #[must_use]
    pub fn ordering_key(&self) -> &OrderingKey {
        &self.ordering_key
    }

    /// Offers a write to the register.
    ///
    /// Only updates if `ordering_key` is strictly greater than the stored one,
    /// so replaying a write or offering an older one is a no-op.
    /// Returns true if the payload was replaced.
    pub fn set(&mut self, value: T, ordering_key: OrderingKey) -> bool {
        if self.should_update(&ordering_key) {
            self.value = value;
            self.ordering_key = ordering_key;
            true
        } else {
            false
        }
    }

    fn should_update(&self, ordering_key: &OrderingKey) -> bool {
        *ordering_key > self.ordering_key
    }

    /// Consumes the register, returning its payload and ordering key.
    #[must_use]
    pub fn into_parts(self) -> (T, OrderingKey) {
        (self.value, self.ordering_key)
    }
}

impl<T: Clone> LWWRegister<T> {
    /// Merges another register into this one.
    ///
    /// The write with the greater ordering key wins. This operation is:
    /// - Commutative: merge(a, b) == merge(b, a)
    /// - Associative: merge(merge(a, b), c) == merge(a, merge(b, c))
    /// - Idempotent: merge(a, a) == a
    pub fn merge(&mut self, other: &Self) {
        if self.should_update(&other.ordering_key) {
            self.value = other.value.clone();
            self.ordering_key = other.ordering_key.clone();
        }
    }

    /// Creates a new register that is the merge of this and another.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.merge(other);
        result
    }
}
