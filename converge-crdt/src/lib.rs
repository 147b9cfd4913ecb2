//! CRDT implementations for converge.
//!
//! This crate provides the Conflict-free Replicated Data Types behind a
//! replicated key-value set:
//!
//! - [`LWWRegister<T>`]: Last-Writer-Wins Register keyed by an ordering key
//! - [`LWWElementSet`]: Last-Writer-Wins Element Set of string keys and values
//!
//! Merging satisfies the following properties:
//! - **Commutative**: merge(a, b) == merge(b, a)
//! - **Associative**: merge(merge(a, b), c) == merge(a, merge(b, c))
//! - **Idempotent**: merge(a, a) == a
//!
//! These properties ensure that replicas will converge to the same state
//! regardless of the order in which operations are received, or how often.
//! None of the operations here can fail.

mod element_set;
mod lww_register;

pub use element_set::{LWWElementSet, Tombstone};
pub use lww_register::LWWRegister;
