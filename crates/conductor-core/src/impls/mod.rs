//! Impls - in-memory port implementations for development and tests.
//!
//! A database-backed store would live in its own crate next to this one.

pub mod inmem_task_store;
pub mod inmem_universe_store;

pub use self::inmem_task_store::InMemoryTaskStore;
pub use self::inmem_universe_store::InMemoryUniverseStore;
