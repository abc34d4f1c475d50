// src/dupstore/mod.rs
//! Magazyn odcisków wiadomości z oknem czasowym.
//!
//! Okno detekcji 24h, retencja 25h – godzina zapasu, żeby sprzątanie (z dryfem zegara/uśpienia)
//! nigdy nie usunęło rekordu, do którego okno jeszcze sięga.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::fingerprint::{ContentFingerprint, ContentKind, FingerprintHash};

pub mod memory;
pub mod pg;

pub use memory::MemoryDuplicateStore;
pub use pg::PgDuplicateStore;

pub const WINDOW_HOURS: i64 = 24;
pub const RETENTION_HOURS: i64 = 25;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateRecord {
    pub group_id: i64,
    pub user_id: i64,
    pub fingerprint_hash: FingerprintHash,
    pub kind: ContentKind,
    pub preview: String,
    pub created_at: DateTime<Utc>,
}

/// Backend. Czas zawsze podany jawnie – "teraz" ustala `DuplicateWindow`.
#[async_trait]
pub trait DuplicateStore: Send + Sync {
    /// Najnowszy rekord dla klucza z `created_at > since`.
    async fn latest_since(
        &self,
        group_id: i64,
        user_id: i64,
        hash: &FingerprintHash,
        since: DateTime<Utc>,
    ) -> Result<Option<DuplicateRecord>, StoreError>;

    async fn insert(&self, record: &DuplicateRecord) -> Result<(), StoreError>;

    /// Usuwa rekordy z `created_at <= cutoff`, zwraca ich liczbę.
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

type LockKey = (i64, i64, FingerprintHash);

pub struct DuplicateWindow {
    store: Arc<dyn DuplicateStore>,
    window: Duration,
    retention: Duration,
    // sprawdzenie + zapis dla tego samego klucza muszą być atomowe
    locks: DashMap<LockKey, Arc<Mutex<()>>>,
}

impl DuplicateWindow {
    pub fn new(store: Arc<dyn DuplicateStore>) -> Self {
        Self::with_hours(store, WINDOW_HOURS, RETENTION_HOURS)
    }

    pub fn with_hours(store: Arc<dyn DuplicateStore>, window_hours: i64, retention_hours: i64) -> Self {
        Self {
            store,
            window: Duration::hours(window_hours),
            retention: Duration::hours(retention_hours),
            locks: DashMap::new(),
        }
    }

    pub async fn check_duplicate(
        &self,
        group_id: i64,
        user_id: i64,
        hash: &FingerprintHash,
    ) -> Result<Option<DuplicateRecord>, StoreError> {
        self.check_duplicate_at(group_id, user_id, hash, Utc::now()).await
    }

    pub async fn check_duplicate_at(
        &self,
        group_id: i64,
        user_id: i64,
        hash: &FingerprintHash,
        now: DateTime<Utc>,
    ) -> Result<Option<DuplicateRecord>, StoreError> {
        self.store
            .latest_since(group_id, user_id, hash, now - self.window)
            .await
    }

    pub async fn record_at(
        &self,
        group_id: i64,
        user_id: i64,
        fp: &ContentFingerprint,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.store
            .insert(&DuplicateRecord {
                group_id,
                user_id,
                fingerprint_hash: fp.hash,
                kind: fp.kind,
                preview: fp.preview.clone(),
                created_at: at,
            })
            .await
    }

    /// Sprawdź i – jeśli to nie duplikat – zapisz. Trafienie zwraca poprzedni rekord.
    pub async fn check_and_record(
        &self,
        group_id: i64,
        user_id: i64,
        fp: &ContentFingerprint,
    ) -> Result<Option<DuplicateRecord>, StoreError> {
        self.check_and_record_at(group_id, user_id, fp, Utc::now()).await
    }

    pub async fn check_and_record_at(
        &self,
        group_id: i64,
        user_id: i64,
        fp: &ContentFingerprint,
        now: DateTime<Utc>,
    ) -> Result<Option<DuplicateRecord>, StoreError> {
        let lock = self.lock_for((group_id, user_id, fp.hash));
        let _guard = lock.lock().await;

        if let Some(prev) = self.check_duplicate_at(group_id, user_id, &fp.hash, now).await? {
            debug!(group_id, user_id, hash = %fp.hash, "duplicate hit");
            return Ok(Some(prev));
        }
        self.record_at(group_id, user_id, fp, now).await?;
        Ok(None)
    }

    pub async fn compact(&self) -> Result<u64, StoreError> {
        self.compact_at(Utc::now()).await
    }

    /// Fizycznie usuwa rekordy starsze niż retencja; przy okazji sprząta nieużywane locki.
    pub async fn compact_at(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let removed = self.store.purge_before(now - self.retention).await?;
        self.locks.retain(|_, m| Arc::strong_count(m) > 1);
        if removed > 0 {
            info!(removed, "expired duplicate records purged");
        }
        Ok(removed)
    }

    pub fn lock_count(&self) -> usize {
        self.locks.len()
    }

    fn lock_for(&self, key: LockKey) -> Arc<Mutex<()>> {
        self.locks.entry(key).or_default().clone()
    }
}
