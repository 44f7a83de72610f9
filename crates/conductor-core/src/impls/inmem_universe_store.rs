use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{AdmissionRecord, UniverseId};
use crate::error::ConductorError;
use crate::ports::UniverseStore;

/// Admission records in a process-local map.
#[derive(Default)]
pub struct InMemoryUniverseStore {
    records: Mutex<HashMap<UniverseId, AdmissionRecord>>,
}

impl InMemoryUniverseStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UniverseStore for InMemoryUniverseStore {
    async fn load(&self, universe_id: UniverseId) -> Result<Option<AdmissionRecord>, ConductorError> {
        Ok(self.records.lock().await.get(&universe_id).cloned())
    }

    async fn save(&self, record: AdmissionRecord) -> Result<(), ConductorError> {
        self.records.lock().await.insert(record.universe_id, record);
        Ok(())
    }

    async fn frozen(&self) -> Result<Vec<AdmissionRecord>, ConductorError> {
        let records = self.records.lock().await;
        let mut frozen: Vec<AdmissionRecord> =
            records.values().filter(|r| r.frozen).cloned().collect();
        frozen.sort_by_key(|r| r.universe_id);
        Ok(frozen)
    }
}
