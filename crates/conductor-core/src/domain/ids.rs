//! Domain identifiers (strongly-typed IDs).
//!
//! All identifiers are ULIDs wrapped in a phantom-typed `Id<T>`, so a `TaskId`
//! can never be passed where a `UniverseId` is expected. ULIDs sort by creation
//! time, which keeps registry dumps and store scans in submission order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

/// Marker trait for each identifier kind.
///
/// Provides the prefix used by `Display` ("task-", "universe-").
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// Generic identifier.
///
/// `T` only exists at compile time; `Id<T>` has the same size as a `Ulid`.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    /// Fresh identifier from the system clock and thread RNG.
    pub fn generate() -> Self {
        Self::from_ulid(Ulid::new())
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Parses both the prefixed display form and a bare ULID.
impl<T: IdMarker> FromStr for Id<T> {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(T::prefix()).unwrap_or(s);
        Ulid::from_string(raw).map(Self::from_ulid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {}

impl IdMarker for Task {
    fn prefix() -> &'static str {
        "task-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Universe {}

impl IdMarker for Universe {
    fn prefix() -> &'static str {
        "universe-"
    }
}

/// Identifier of a task, root or subtask.
pub type TaskId = Id<Task>;

/// Identifier of a managed cluster.
pub type UniverseId = Id<Universe>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types() {
        let ulid1 = Ulid::new();
        let ulid2 = Ulid::new();

        let task = TaskId::from_ulid(ulid1);
        let universe = UniverseId::from_ulid(ulid2);

        assert_eq!(task.as_ulid(), ulid1);
        assert_eq!(universe.as_ulid(), ulid2);
        assert!(task.to_string().starts_with("task-"));
        assert!(universe.to_string().starts_with("universe-"));

        // let _: UniverseId = task; // <- does not compile
    }

    #[test]
    fn ulid_ids_are_sortable() {
        let id1 = TaskId::generate();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = TaskId::generate();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id3 = TaskId::generate();

        assert!(id1 < id2);
        assert!(id2 < id3);
    }

    #[test]
    fn display_form_parses_back() {
        let id = UniverseId::generate();
        let parsed: UniverseId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);

        let bare: UniverseId = id.as_ulid().to_string().parse().unwrap();
        assert_eq!(bare, id);

        assert!("universe-not-a-ulid".parse::<UniverseId>().is_err());
    }

    #[test]
    fn serializes_as_plain_ulid_string() {
        let id = TaskId::generate();
        let v = serde_json::to_value(id).unwrap();
        assert_eq!(v, serde_json::Value::String(id.as_ulid().to_string()));
    }

    #[test]
    fn phantom_data_does_not_consume_memory() {
        use std::mem::size_of;
        assert_eq!(size_of::<TaskId>(), size_of::<Ulid>());
        assert_eq!(size_of::<UniverseId>(), 16);
    }
}
