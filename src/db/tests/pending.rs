use crate::db::*;
use crate::types::{Category, QueueEntry};
use chrono::{Duration, Utc};
use std::path::PathBuf;
use tempfile::NamedTempFile;

fn entry(name: &str, category: Category) -> QueueEntry {
    QueueEntry::new(name, PathBuf::from("/downloads").join(category.as_str()), category)
}

#[tokio::test]
async fn test_save_and_load_preserves_order_and_fields() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    let mut first = entry("Show.S01E01.mkv", Category::Sonarr);
    first.first_seen_at = Some(Utc::now() - Duration::minutes(5));
    let second = entry("Movie.2024.mkv", Category::Radarr);
    let third = entry("Show.S01E02.mkv", Category::Sonarr);

    db.save_pending(&[first.clone(), second.clone(), third.clone()])
        .await
        .unwrap();

    let loaded = db.load_pending().await.unwrap();
    assert_eq!(loaded.len(), 3);
    assert_eq!(loaded[0].expected_filename, "show.s01e01.mkv");
    assert_eq!(loaded[1].expected_filename, "movie.2024.mkv");
    assert_eq!(loaded[2].expected_filename, "show.s01e02.mkv");

    assert_eq!(loaded[0].category, Category::Sonarr);
    assert_eq!(loaded[1].destination_folder, PathBuf::from("/downloads/radarr"));
    // Millisecond precision survives the round trip
    assert_eq!(
        loaded[0].first_seen_at.map(|t| t.timestamp_millis()),
        first.first_seen_at.map(|t| t.timestamp_millis())
    );
    assert!(loaded[1].first_seen_at.is_none());
    assert_eq!(
        loaded[2].enqueued_at.timestamp_millis(),
        third.enqueued_at.timestamp_millis()
    );

    db.close().await;
}

#[tokio::test]
async fn test_save_replaces_previous_snapshot() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    db.save_pending(&[
        entry("a.mkv", Category::Radarr),
        entry("b.mkv", Category::Radarr),
    ])
    .await
    .unwrap();
    db.save_pending(&[entry("c.mkv", Category::Sonarr)])
        .await
        .unwrap();

    let loaded = db.load_pending().await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].expected_filename, "c.mkv");
    assert_eq!(db.count_pending().await.unwrap(), 1);

    db.close().await;
}

#[tokio::test]
async fn test_save_empty_snapshot_clears_table() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    db.save_pending(&[entry("a.mkv", Category::Radarr)])
        .await
        .unwrap();
    db.save_pending(&[]).await.unwrap();

    assert!(db.load_pending().await.unwrap().is_empty());

    db.close().await;
}

#[tokio::test]
async fn test_load_skips_unknown_category() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    db.save_pending(&[entry("good.mkv", Category::Radarr)])
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO pending_entries (expected_filename, destination_folder, category, enqueued_at, position) VALUES ('bad.mkv', '/x', 'lidarr', 0, 1)",
    )
    .execute(db.pool())
    .await
    .unwrap();

    let loaded = db.load_pending().await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].expected_filename, "good.mkv");

    db.close().await;
}

#[tokio::test]
async fn test_snapshot_survives_reopen() {
    let temp_file = NamedTempFile::new().unwrap();

    let db = Database::new(temp_file.path()).await.unwrap();
    db.save_pending(&[entry("persisted.mkv", Category::Sonarr)])
        .await
        .unwrap();
    db.close().await;

    let db = Database::new(temp_file.path()).await.unwrap();
    let loaded = db.load_pending().await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].expected_filename, "persisted.mkv");
    db.close().await;
}
