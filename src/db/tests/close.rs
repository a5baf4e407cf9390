use crate::db::*;
use tempfile::NamedTempFile;

/// Querying after the pool is closed returns an error rather than hanging
#[tokio::test]
async fn test_load_pending_after_pool_close_returns_error() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    db.pool().close().await;

    let result = db.load_pending().await;
    assert!(
        result.is_err(),
        "load_pending after pool close should return an error, got: {:?}",
        result
    );
}

#[tokio::test]
async fn test_save_pending_after_pool_close_returns_error() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    db.pool().close().await;

    let result = db.save_pending(&[]).await;
    assert!(result.is_err());
}
