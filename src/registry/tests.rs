use super::*;
use chrono::{Duration, Utc};
use std::collections::HashSet;
use tempfile::TempDir;

const NS_1: &str = "11111111111111111111111111111111";
const NS_2: &str = "22222222222222222222222222222222";
const NS_3: &str = "33333333333333333333333333333333";

async fn create_test_registry() -> (TempDir, Registry) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let registry = Registry::open(temp_dir.path().join("metadata.db"))
        .await
        .expect("should open registry");
    (temp_dir, registry)
}

fn record(id: &str, owner: &str, files: &[&str]) -> NamespaceRecord {
    NamespaceRecord::new(
        id,
        owner,
        files.iter().map(ToString::to_string).collect(),
        files.len() as u64 * 10,
    )
}

#[tokio::test]
async fn schema_migration_creates_tables() {
    let (_temp_dir, registry) = create_test_registry().await;

    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' AND name NOT LIKE '_sqlx%'",
    )
    .fetch_all(registry.pool())
    .await
    .expect("should list tables");

    let actual: HashSet<&str> = tables.iter().map(String::as_str).collect();
    let expected: HashSet<&str> = ["namespaces", "namespace_files"].into_iter().collect();
    assert_eq!(actual, expected);
}

#[tokio::test]
async fn put_then_get() {
    let (_temp_dir, registry) = create_test_registry().await;
    let original = record(NS_1, "alice", &["/docs/lease.pdf", "/docs/annex.docx"]);

    registry.put(&original).await.expect("put should succeed");

    let loaded = registry
        .get(NS_1)
        .await
        .expect("get should succeed")
        .expect("record should exist");
    assert_eq!(loaded.id, NS_1);
    assert_eq!(loaded.owner, "alice");
    assert_eq!(
        loaded.source_file_paths,
        vec!["/docs/lease.pdf", "/docs/annex.docx"]
    );
    assert_eq!(loaded.chunk_count, 20);
    assert_eq!(loaded.status, NamespaceStatus::Ready);
    assert_eq!(loaded.created_at, original.created_at);
}

#[tokio::test]
async fn missing_namespace_is_none() {
    let (_temp_dir, registry) = create_test_registry().await;
    assert!(registry.get(NS_1).await.expect("get").is_none());
    assert!(!registry.contains(NS_1).await.expect("contains"));
}

#[tokio::test]
async fn ids_are_unique_and_owner_is_immutable() {
    let (_temp_dir, registry) = create_test_registry().await;
    registry
        .put(&record(NS_1, "alice", &["a.pdf"]))
        .await
        .expect("first put should succeed");

    let err = registry
        .put(&record(NS_1, "mallory", &["b.pdf"]))
        .await
        .expect_err("second put should fail");
    assert!(matches!(err, DocsError::Database(_)));

    let loaded = registry
        .get(NS_1)
        .await
        .expect("get should succeed")
        .expect("record should exist");
    assert_eq!(loaded.owner, "alice");
    assert_eq!(loaded.source_file_paths, vec!["a.pdf"]);
}

#[tokio::test]
async fn list_by_owner_is_scoped_and_newest_first() {
    let (_temp_dir, registry) = create_test_registry().await;
    let now = Utc::now();

    let mut older = record(NS_1, "alice", &["old.pdf"]);
    older.created_at = now - Duration::minutes(5);
    let mut newer = record(NS_2, "alice", &["new.pdf"]);
    newer.created_at = now;
    let other = record(NS_3, "bob", &["bob.pdf"]);

    registry.put(&older).await.expect("put");
    registry.put(&other).await.expect("put");
    registry.put(&newer).await.expect("put");

    let ids: Vec<String> = registry
        .list_by_owner("alice")
        .await
        .expect("list should succeed")
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, vec![NS_2.to_string(), NS_1.to_string()]);

    assert!(registry.list_by_owner("carol").await.expect("list").is_empty());
}

#[tokio::test]
async fn delete_cascades_file_rows() {
    let (_temp_dir, registry) = create_test_registry().await;
    registry
        .put(&record(NS_1, "alice", &["a.pdf", "b.pdf"]))
        .await
        .expect("put");

    assert!(registry.delete(NS_1).await.expect("delete"));
    assert!(!registry.delete(NS_1).await.expect("second delete"));
    assert!(registry.get(NS_1).await.expect("get").is_none());

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM namespace_files")
        .fetch_one(registry.pool())
        .await
        .expect("count");
    assert_eq!(remaining, 0);
}

#[tokio::test]
async fn empty_file_list_is_allowed() {
    let (_temp_dir, registry) = create_test_registry().await;
    let mut empty = record(NS_1, "alice", &[]);
    empty.chunk_count = 0;

    registry.put(&empty).await.expect("put");
    let loaded = registry
        .get(NS_1)
        .await
        .expect("get")
        .expect("record should exist");
    assert!(loaded.source_file_paths.is_empty());
    assert_eq!(loaded.chunk_count, 0);
    assert_eq!(registry.list_ids().await.expect("ids"), vec![NS_1.to_string()]);
}
