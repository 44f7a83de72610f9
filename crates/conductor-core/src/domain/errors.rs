//! Operational error classification.

use serde::{Deserialize, Serialize};

/// How an error should be treated by whoever reads it off a task.
///
/// - Transient: retrying later may succeed (admission denied, abort timed out)
/// - Permanent: retrying the same request cannot succeed
/// - Infrastructure: the store or runtime failed underneath the task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
}
