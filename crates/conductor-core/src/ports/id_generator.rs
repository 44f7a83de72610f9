//! IdGenerator port.
//!
//! IDs are ULIDs whose timestamp half comes from the injected `Clock`, so a
//! `FixedClock` yields IDs with a known timestamp and a random tail.

use ulid::Ulid;

use crate::domain::{TaskId, UniverseId};
use crate::ports::Clock;

pub trait IdGenerator: Send + Sync {
    fn generate_task_id(&self) -> TaskId;

    fn generate_universe_id(&self) -> UniverseId;
}

pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_task_id(&self) -> TaskId {
        TaskId::from(self.next())
    }

    fn generate_universe_id(&self) -> UniverseId {
        UniverseId::from(self.next())
    }
}
