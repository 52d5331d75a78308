//! Integration tests for the JSON-file table store.

use chaos_storage::{FileTableStore, StoreError, TableRow, TableStore};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Scheduled {
    target: String,
    action: String,
}

fn row(pk: &str, target: &str, action: &str) -> TableRow {
    let entity = Scheduled {
        target: target.to_string(),
        action: action.to_string(),
    };
    TableRow::from_entity(pk, target.replace('/', "!"), &entity).unwrap()
}

#[tokio::test]
async fn rows_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = FileTableStore::new(dir.path()).unwrap();
        store
            .upsert_batch("scheduledrules", "rg-1", vec![row("rg-1", "/vm/a", "PowerOff")])
            .await
            .unwrap();
    }

    let reopened = FileTableStore::new(dir.path()).unwrap();
    let rows = reopened.query_partition("scheduledrules", "rg-1").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].row_key, "!vm!a");
    let entity: Scheduled = rows[0].decode().unwrap();
    assert_eq!(entity.action, "PowerOff");
    assert!(dir.path().join("tables/scheduledrules.json").exists());
}

#[tokio::test]
async fn upsert_replaces_by_target() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileTableStore::new(dir.path()).unwrap();

    store
        .upsert_batch("scheduledrules", "rg-1", vec![row("rg-1", "/vm/a", "PowerOff"), row("rg-1", "/vm/b", "Start")])
        .await
        .unwrap();
    store
        .upsert_batch("scheduledrules", "rg-1", vec![row("rg-1", "/vm/a", "Start")])
        .await
        .unwrap();

    let rows = store.query_table("scheduledrules").await.unwrap();
    assert_eq!(rows.len(), 2);
    let a: Scheduled = rows.iter().find(|r| r.row_key == "!vm!a").unwrap().decode().unwrap();
    assert_eq!(a.action, "Start");
}

#[tokio::test]
async fn partitions_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileTableStore::new(dir.path()).unwrap();

    store.upsert_batch("t", "p1", vec![row("p1", "/vm/a", "Start")]).await.unwrap();
    store.upsert_batch("t", "p2", vec![row("p2", "/vm/a", "PowerOff")]).await.unwrap();

    assert_eq!(store.query_partition("t", "p1").await.unwrap().len(), 1);
    assert_eq!(store.query_partition("t", "p2").await.unwrap().len(), 1);
    assert_eq!(store.query_table("t").await.unwrap().len(), 2);
}

#[tokio::test]
async fn invalid_batches_leave_file_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileTableStore::new(dir.path()).unwrap().with_max_batch_size(1);

    let err = store
        .upsert_batch("t", "p", vec![row("p", "/vm/a", "Start"), row("p", "/vm/b", "Start")])
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::BatchTooLarge { .. }));
    assert!(!dir.path().join("tables/t.json").exists());

    let err = store.upsert_batch("../t", "p", vec![]).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidTable(_)));
}

#[tokio::test]
async fn missing_table_reads_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileTableStore::new(dir.path()).unwrap();
    assert!(store.query_table("never-written").await.unwrap().is_empty());
}
