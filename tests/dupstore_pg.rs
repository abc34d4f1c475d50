#![cfg(feature = "pg-tests")]

use std::sync::Arc;

use chrono::{Duration, Utc};
use sqlx::PgPool;
use tigris_groupguard::dupstore::{DuplicateWindow, PgDuplicateStore};
use tigris_groupguard::fingerprint::{ContentFingerprint, ContentKind, FingerprintHash};

fn fp(text: &str, kind: ContentKind) -> ContentFingerprint {
    ContentFingerprint {
        hash: FingerprintHash::of(text),
        kind,
        preview: format!("text:{text}"),
    }
}

#[sqlx::test(migrations = "./migrations")]
async fn window_semantics_on_postgres(pool: PgPool) {
    let window = DuplicateWindow::new(Arc::new(PgDuplicateStore::new(pool.clone())));
    let t0 = Utc::now();
    let f = fp("hello", ContentKind::Text);

    assert!(window.check_and_record_at(1, 2, &f, t0).await.unwrap().is_none());
    let hit = window
        .check_and_record_at(1, 2, &f, t0 + Duration::hours(23))
        .await
        .unwrap()
        .expect("duplicate inside the window");
    assert_eq!(hit.kind, ContentKind::Text);
    assert_eq!(hit.preview, "text:hello");

    // po 24h okno już nie sięga
    assert!(window.check_duplicate_at(1, 2, &f.hash, t0 + Duration::hours(24)).await.unwrap().is_none());
}

#[sqlx::test(migrations = "./migrations")]
async fn compaction_deletes_rows_past_retention(pool: PgPool) {
    let window = DuplicateWindow::new(Arc::new(PgDuplicateStore::new(pool.clone())));
    let t0 = Utc::now();
    window.record_at(1, 2, &fp("old", ContentKind::Image), t0).await.unwrap();
    window
        .record_at(1, 2, &fp("new", ContentKind::Image), t0 + Duration::hours(3))
        .await
        .unwrap();

    assert_eq!(window.compact_at(t0 + Duration::hours(24)).await.unwrap(), 0);
    assert_eq!(window.compact_at(t0 + Duration::hours(25)).await.unwrap(), 1);

    let (left,): (i64,) = sqlx::query_as("SELECT count(*) FROM tgg.duplicate_records")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(left, 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn unknown_kind_is_reported_as_corruption(pool: PgPool) {
    let hash = FingerprintHash::of("weird");
    sqlx::query(
        "INSERT INTO tgg.duplicate_records (group_id, user_id, fingerprint_hash, kind) VALUES (1, 2, $1, 'hologram')",
    )
    .bind(hash.to_hex())
    .execute(&pool)
    .await
    .unwrap();

    let window = DuplicateWindow::new(Arc::new(PgDuplicateStore::new(pool)));
    assert!(window.check_duplicate(1, 2, &hash).await.is_err());
}
