use async_trait::async_trait;

use crate::domain::{AdmissionRecord, UniverseId};
use crate::error::ConductorError;

/// Persistence for per-universe admission records.
///
/// Callers serialize read-modify-write per universe; implementations only
/// need atomic single-record load and save.
#[async_trait]
pub trait UniverseStore: Send + Sync {
    async fn load(&self, universe_id: UniverseId) -> Result<Option<AdmissionRecord>, ConductorError>;

    async fn save(&self, record: AdmissionRecord) -> Result<(), ConductorError>;

    async fn frozen(&self) -> Result<Vec<AdmissionRecord>, ConductorError>;
}
