//! Ports - seams to collaborators outside the engine.
//!
//! Each trait hides a dependency (database, wall clock, id source) so the
//! executor can run against in-memory implementations in tests.

pub mod clock;
pub mod id_generator;
pub mod task_store;
pub mod universe_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::task_store::TaskStore;
pub use self::universe_store::UniverseStore;
