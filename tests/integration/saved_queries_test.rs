//! Saved query store tests against an on-disk state database.

use sqlgate::persistence::SavedQueryStore;
use tempfile::tempdir;

#[tokio::test]
async fn test_saved_queries_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.db");

    let store = SavedQueryStore::open(&path).await.unwrap();
    let id = store
        .save_query(
            "top customers",
            Some("retail"),
            "SELECT CUSTOMER, SUM(AMOUNT) FROM ORDERS GROUP BY CUSTOMER",
            Some("alice"),
            None,
        )
        .await
        .unwrap();
    store.close().await;

    let store = SavedQueryStore::open(&path).await.unwrap();
    let queries = store.list_queries("alice").await.unwrap();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].id, id.to_string());
    assert_eq!(queries[0].project, "retail");
    assert_eq!(queries[0].description, "");
    assert_eq!(queries[0].created_date.len(), "2024-01-01 00:00:00".len());

    assert!(store.remove_query(id).await.unwrap());
    assert!(store.list_queries("alice").await.unwrap().is_empty());
    store.close().await;
}

#[tokio::test]
async fn test_queries_without_creator_are_not_listed() {
    let dir = tempdir().unwrap();
    let store = SavedQueryStore::open(&dir.path().join("state.db"))
        .await
        .unwrap();

    store
        .save_query("anonymous", None, "SELECT 1", None, None)
        .await
        .unwrap();

    assert!(store.list_queries("").await.unwrap().is_empty());
    store.close().await;
}
