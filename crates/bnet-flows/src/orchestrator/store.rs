//! Saga persistence

use async_trait::async_trait;
use bnet_core::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::saga::{CreateNetworkSaga, SagaId};

/// Durable storage for saga records
#[async_trait]
pub trait SagaStore: Send + Sync {
    /// Insert or replace a saga record
    async fn save(&self, saga: &CreateNetworkSaga) -> Result<()>;

    /// Load a saga record
    async fn load(&self, id: SagaId) -> Result<Option<CreateNetworkSaga>>;

    /// Every stored saga record
    async fn list(&self) -> Result<Vec<CreateNetworkSaga>>;
}

/// Saga records serialized into memory
#[derive(Debug, Clone, Default)]
pub struct MemorySagaStore {
    records: Arc<RwLock<HashMap<SagaId, Vec<u8>>>>,
}

impl MemorySagaStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SagaStore for MemorySagaStore {
    async fn save(&self, saga: &CreateNetworkSaga) -> Result<()> {
        let bytes = saga.to_bytes()?;
        self.records.write().await.insert(saga.id, bytes);
        Ok(())
    }

    async fn load(&self, id: SagaId) -> Result<Option<CreateNetworkSaga>> {
        let records = self.records.read().await;
        records
            .get(&id)
            .map(|bytes| CreateNetworkSaga::from_bytes(bytes))
            .transpose()
    }

    async fn list(&self) -> Result<Vec<CreateNetworkSaga>> {
        let records = self.records.read().await;
        let mut sagas = records
            .values()
            .map(|bytes| CreateNetworkSaga::from_bytes(bytes))
            .collect::<Result<Vec<_>>>()?;
        sagas.sort_by_key(|saga| saga.created_at);
        Ok(sagas)
    }
}
