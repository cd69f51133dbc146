//! Collection aliases used across the crate.
//!
//! Hash maps use the Fx hasher; anything that is persisted or printed uses the
//! ordered std maps so the output is deterministic.

pub use std::collections::BTreeMap;

pub type HashMap<K, V> = rustc_hash::FxHashMap<K, V>;
pub type HashSet<T> = rustc_hash::FxHashSet<T>;
