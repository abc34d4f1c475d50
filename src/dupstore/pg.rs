//! Backend Postgres (tabela `tgg.duplicate_records`, patrz migrations/).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{DuplicateRecord, DuplicateStore};
use crate::db::Db;
use crate::error::StoreError;
use crate::fingerprint::{ContentKind, FingerprintHash};

#[derive(Clone)]
pub struct PgDuplicateStore {
    db: Db,
}

impl PgDuplicateStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DuplicateStore for PgDuplicateStore {
    async fn latest_since(
        &self,
        group_id: i64,
        user_id: i64,
        hash: &FingerprintHash,
        since: DateTime<Utc>,
    ) -> Result<Option<DuplicateRecord>, StoreError> {
        let row: Option<(String, String, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT kind, preview, created_at
              FROM tgg.duplicate_records
             WHERE group_id = $1
               AND user_id = $2
               AND fingerprint_hash = $3
               AND created_at > $4
             ORDER BY created_at DESC
             LIMIT 1
            "#,
        )
        .bind(group_id)
        .bind(user_id)
        .bind(hash.to_hex())
        .bind(since)
        .fetch_optional(&self.db)
        .await?;

        row.map(|(kind, preview, created_at)| -> Result<DuplicateRecord, StoreError> {
            let kind = ContentKind::parse(&kind)
                .ok_or_else(|| StoreError::Corrupted(format!("unknown kind `{kind}`")))?;
            Ok(DuplicateRecord {
                group_id,
                user_id,
                fingerprint_hash: *hash,
                kind,
                preview,
                created_at,
            })
        })
        .transpose()
    }

    async fn insert(&self, record: &DuplicateRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO tgg.duplicate_records
              (group_id, user_id, fingerprint_hash, kind, preview, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.group_id)
        .bind(record.user_id)
        .bind(record.fingerprint_hash.to_hex())
        .bind(record.kind.as_str())
        .bind(&record.preview)
        .bind(record.created_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let res = sqlx::query("DELETE FROM tgg.duplicate_records WHERE created_at <= $1")
            .bind(cutoff)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected())
    }
}
