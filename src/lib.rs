#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

/// A hash map implementation using linear probing with per-slot metadata.
///
/// This module provides a `HashMap` that wraps the `HashTable` and provides
/// a key-value map interface with configurable hashers and typed errors.
pub mod hash_map;

pub mod hash_table;

pub use hash_map::Error;
pub use hash_map::HashMap;
pub use hash_table::HashTable;

/// The default hasher builder used by [`HashMap`].
#[cfg(feature = "foldhash")]
pub type DefaultHashBuilder = foldhash::fast::RandomState;

/// Placeholder standing in for the default hasher builder when the
/// `foldhash` feature is disabled. It cannot be constructed; supply a hasher
/// explicitly via [`HashMap::with_hasher`].
#[cfg(not(feature = "foldhash"))]
pub enum DefaultHashBuilder {}
