//! Backend w pamięci – testy i instalacje bez bazy (`database.backend = "memory"`).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{DuplicateRecord, DuplicateStore};
use crate::error::StoreError;
use crate::fingerprint::FingerprintHash;

#[derive(Debug, Default)]
pub struct MemoryDuplicateStore {
    rows: RwLock<HashMap<(i64, i64, FingerprintHash), Vec<DuplicateRecord>>>,
}

impl MemoryDuplicateStore {
    /// Liczba fizycznie trzymanych rekordów.
    pub async fn len(&self) -> usize {
        self.rows.read().await.values().map(Vec::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl DuplicateStore for MemoryDuplicateStore {
    async fn latest_since(
        &self,
        group_id: i64,
        user_id: i64,
        hash: &FingerprintHash,
        since: DateTime<Utc>,
    ) -> Result<Option<DuplicateRecord>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows
            .get(&(group_id, user_id, *hash))
            .and_then(|list| {
                list.iter()
                    .filter(|r| r.created_at > since)
                    .max_by_key(|r| r.created_at)
            })
            .cloned())
    }

    async fn insert(&self, record: &DuplicateRecord) -> Result<(), StoreError> {
        let mut rows = self.rows.write().await;
        rows.entry((record.group_id, record.user_id, record.fingerprint_hash))
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut rows = self.rows.write().await;
        let mut removed = 0u64;
        rows.retain(|_, list| {
            let before = list.len();
            list.retain(|r| r.created_at > cutoff);
            removed += (before - list.len()) as u64;
            !list.is_empty()
        });
        Ok(removed)
    }
}
