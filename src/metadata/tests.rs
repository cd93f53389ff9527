use super::versioner::{parse_timestamp, Versioner, MAX_HISTORY};
use super::*;
use crate::error::ApiError;
use serde_json::json;

fn meta(pairs: &[(&str, serde_json::Value)]) -> JsonMap {
    let mut map = JsonMap::new();
    for (key, value) in pairs {
        map.insert(key.to_string(), value.clone());
    }
    map
}

#[test]
fn test_first_write_gets_version_one() {
    let record = Versioner::compose(
        meta(&[("doc_id", json!("doc-A")), ("author", json!("Alice"))]),
        None,
    )
    .unwrap();

    assert_eq!(record["version"], json!(1));
    assert_eq!(record["createdAt"], record["lastUpdated"]);
    assert!(record.get("version_history").is_none());
    assert_eq!(record["author"], json!("Alice"));
}

#[test]
fn test_rewrite_bumps_version_and_records_changes() {
    let v1 = Versioner::compose(
        meta(&[
            ("doc_id", json!("doc-A")),
            ("author", json!("Alice")),
            ("original_text", json!("hello world")),
        ]),
        None,
    )
    .unwrap();

    let v2 = Versioner::compose(
        meta(&[
            ("doc_id", json!("doc-A")),
            ("author", json!("Alice")),
            ("category", json!("greetings")),
            ("original_text", json!("hello world!")),
        ]),
        Some(&v1),
    )
    .unwrap();

    assert_eq!(v2["version"], json!(2));

    let history = v2["version_history"].as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["version"], json!(1));
    assert_eq!(history[0]["timestamp"], v1["lastUpdated"]);

    let changes: Vec<&str> = history[0]["changes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c.as_str().unwrap())
        .collect();
    assert!(changes.contains(&"added:category"));
    assert!(changes.contains(&"modified:original_text"));
}

#[test]
fn test_created_at_is_preserved_across_versions() {
    let v1 = Versioner::compose(meta(&[("doc_id", json!("d"))]), None).unwrap();
    let v2 = Versioner::compose(meta(&[("doc_id", json!("d"))]), Some(&v1)).unwrap();
    let v3 = Versioner::compose(meta(&[("doc_id", json!("d"))]), Some(&v2)).unwrap();

    assert_eq!(v3["createdAt"], v1["createdAt"]);
}

#[test]
fn test_history_is_truncated_to_ten_entries() {
    let mut record = Versioner::compose(meta(&[("doc_id", json!("d"))]), None).unwrap();

    for i in 0..15u64 {
        let next = meta(&[("doc_id", json!("d")), ("counter", json!(i))]);
        record = Versioner::compose(next, Some(&record)).unwrap();
    }

    let history = record["version_history"].as_array().unwrap();
    assert_eq!(history.len(), MAX_HISTORY);

    // Oldest entries are dropped first
    assert_eq!(history[0]["version"], json!(6));
    assert_eq!(history[MAX_HISTORY - 1]["version"], json!(15));
}

#[test]
fn test_supplied_version_must_be_prior_plus_one() {
    let v1 = Versioner::compose(meta(&[("doc_id", json!("d"))]), None).unwrap();

    // Correct increment passes
    let ok = Versioner::compose(
        meta(&[("doc_id", json!("d")), ("version", json!(2))]),
        Some(&v1),
    );
    assert!(ok.is_ok());

    // Skip fails
    let skip = Versioner::compose(
        meta(&[("doc_id", json!("d")), ("version", json!(5))]),
        Some(&v1),
    );
    assert!(matches!(skip, Err(ApiError::VersionConflict(_))));

    // Decrease fails
    let v2 = ok.unwrap();
    let decrease = Versioner::compose(
        meta(&[("doc_id", json!("d")), ("version", json!(1))]),
        Some(&v2),
    );
    assert!(matches!(decrease, Err(ApiError::VersionConflict(_))));
}

#[test]
fn test_validation_rejects_missing_doc_id() {
    let result = Versioner::compose(meta(&[("author", json!("Alice"))]), None);
    assert!(matches!(result, Err(ApiError::MetadataInvalid(_))));
}

#[test]
fn test_validation_rejects_oversized_content() {
    let result = Versioner::compose(
        meta(&[
            ("doc_id", json!("d")),
            ("original_text", json!("x".repeat(50_001))),
        ]),
        None,
    );
    assert!(matches!(result, Err(ApiError::MetadataInvalid(_))));
}

#[test]
fn test_validation_rejects_oversized_level() {
    let result = Versioner::compose(
        meta(&[("doc_id", json!("d")), ("level_1", json!("x".repeat(101)))]),
        None,
    );
    assert!(matches!(result, Err(ApiError::MetadataInvalid(_))));
}

#[test]
fn test_validation_rejects_bad_timestamp() {
    let result = Versioner::compose(
        meta(&[("doc_id", json!("d")), ("createdAt", json!("yesterday"))]),
        None,
    );
    assert!(matches!(result, Err(ApiError::MetadataInvalid(_))));
}

#[test]
fn test_hierarchy_synthesis_from_fields() {
    let record = Versioner::compose(
        meta(&[
            ("doc_id", json!("d")),
            ("category", json!("science")),
            ("tag", json!("physics")),
            ("author", json!("Alice")),
            ("year", json!(2024)),
            ("language", json!("en")),
            ("format", json!("pdf")),
        ]),
        None,
    )
    .unwrap();

    assert_eq!(record["level_1"], json!("science"));
    assert_eq!(record["level_2"], json!("physics"));
    assert_eq!(record["level_3"], json!("Alice"));
    assert_eq!(record["level_4"], json!("2024"));
    assert_eq!(record["level_5"], json!("en"));
    assert_eq!(record["level_6"], json!("pdf"));
}

#[test]
fn test_level_one_defaults_to_document() {
    let record = Versioner::compose(meta(&[("doc_id", json!("d"))]), None).unwrap();
    assert_eq!(record["level_1"], json!("document"));
    assert_eq!(record["level_2"], json!(null));
}

#[test]
fn test_prior_levels_win_over_resynthesis() {
    let v1 = Versioner::compose(meta(&[("doc_id", json!("d"))]), None).unwrap();
    assert_eq!(v1["level_1"], json!("document"));

    // A category arriving later does not overwrite the established level
    let v2 = Versioner::compose(
        meta(&[("doc_id", json!("d")), ("category", json!("greetings"))]),
        Some(&v1),
    )
    .unwrap();
    assert_eq!(v2["level_1"], json!("document"));
}

#[test]
fn test_change_sets_are_symmetric() {
    let a = meta(&[
        ("doc_id", json!("d")),
        ("kept", json!(1)),
        ("changed", json!("old")),
        ("only_a", json!(true)),
    ]);
    let b = meta(&[
        ("doc_id", json!("d")),
        ("kept", json!(1)),
        ("changed", json!("new")),
        ("only_b", json!(true)),
    ]);

    let forward = Versioner::detect_changes(&a, &b);
    let backward = Versioner::detect_changes(&b, &a);

    // changes(A, B) equals changes(B, A) with added/removed swapped
    let swapped: Vec<String> = backward
        .iter()
        .map(|change| {
            if let Some(key) = change.strip_prefix("added:") {
                format!("removed:{}", key)
            } else if let Some(key) = change.strip_prefix("removed:") {
                format!("added:{}", key)
            } else {
                change.clone()
            }
        })
        .collect();

    let mut forward_sorted = forward.clone();
    forward_sorted.sort();
    let mut swapped_sorted = swapped;
    swapped_sorted.sort();
    assert_eq!(forward_sorted, swapped_sorted);
}

#[test]
fn test_parse_timestamp_accepts_both_forms() {
    assert!(parse_timestamp("2026-08-01T12:00:00+00:00").is_some());
    assert!(parse_timestamp("2026-08-01T12:00:00Z").is_some());
    assert!(parse_timestamp("2026-08-01T12:00:00.123456").is_some());
    assert!(parse_timestamp("not a timestamp").is_none());
}

#[tokio::test]
async fn test_memory_store_roundtrip() {
    let store = InMemoryMetadataStore::new();

    store
        .set("d1", meta(&[("doc_id", json!("d1")), ("v", json!(1))]))
        .await
        .unwrap();

    let record = store.get("d1").await.unwrap().unwrap();
    assert_eq!(record["v"], json!(1));
    assert!(store.get("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_memory_store_batch_get_skips_missing() {
    let store = InMemoryMetadataStore::new();
    store.set("d1", meta(&[("doc_id", json!("d1"))])).await.unwrap();
    store.set("d3", meta(&[("doc_id", json!("d3"))])).await.unwrap();

    let ids = vec!["d1".to_string(), "d2".to_string(), "d3".to_string()];
    let records = store.batch_get(&ids).await.unwrap();

    assert_eq!(records.len(), 2);
    assert!(records.contains_key("d1"));
    assert!(!records.contains_key("d2"));
}

#[tokio::test]
async fn test_memory_store_batch_exists() {
    let store = InMemoryMetadataStore::new();
    store.set("d1", JsonMap::new()).await.unwrap();

    let ids = vec!["d1".to_string(), "d2".to_string()];
    let existence = store.batch_exists(&ids).await.unwrap();

    assert_eq!(existence["d1"], true);
    assert_eq!(existence["d2"], false);
}

#[tokio::test]
async fn test_memory_store_query_with_projection() {
    let store = InMemoryMetadataStore::new();
    store
        .set(
            "d1",
            meta(&[
                ("doc_id", json!("d1")),
                ("category", json!("science")),
                ("author", json!("Alice")),
            ]),
        )
        .await
        .unwrap();
    store
        .set(
            "d2",
            meta(&[("doc_id", json!("d2")), ("category", json!("history"))]),
        )
        .await
        .unwrap();

    let filter = vec![("category".to_string(), json!("science"))];
    let projection = vec!["doc_id".to_string()];
    let results = store.query(&filter, Some(&projection)).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["doc_id"], json!("d1"));
    assert!(results[0].get("author").is_none());
}

#[tokio::test]
async fn test_memory_store_delete_is_idempotent() {
    let store = InMemoryMetadataStore::new();
    store.set("d1", JsonMap::new()).await.unwrap();

    store.delete("d1").await.unwrap();
    store.delete("d1").await.unwrap();
    assert!(store.is_empty());
}

async fn seed_tree_store() -> InMemoryMetadataStore {
    let store = InMemoryMetadataStore::new();

    let docs = [
        ("d1", "science", Some("physics"), 1u64),
        ("d2", "science", Some("chemistry"), 3),
        ("d3", "history", None, 1),
    ];
    for (doc_id, level_1, level_2, version) in docs {
        let mut record = meta(&[
            ("doc_id", json!(doc_id)),
            ("level_1", json!(level_1)),
            ("version", json!(version)),
            ("content_preview", json!(format!("preview of {}", doc_id))),
            ("lastUpdated", json!("2026-01-01T00:00:00+00:00")),
            ("createdAt", json!("2025-01-01T00:00:00+00:00")),
        ]);
        if let Some(level_2) = level_2 {
            record.insert("level_2".to_string(), json!(level_2));
        }
        store.set(doc_id, record).await.unwrap();
    }

    store
}

#[tokio::test]
async fn test_hierarchy_tree_nests_by_levels() {
    let store = seed_tree_store().await;

    let root = tree::hierarchy_tree(&store, &[]).await.unwrap();

    let science = &root.children["science"];
    assert_eq!(science.children.len(), 2);
    assert_eq!(science.children["physics"].documents[0].doc_id, "d1");
    assert_eq!(science.children["chemistry"].documents[0].version, 3);

    // A document with no level_2 is filed at its level_1 node
    let history = &root.children["history"];
    assert_eq!(history.documents.len(), 1);
    assert_eq!(history.documents[0].doc_id, "d3");
}

#[tokio::test]
async fn test_hierarchy_tree_level_filter() {
    let store = seed_tree_store().await;

    let filter = vec![("level_1".to_string(), json!("history"))];
    let root = tree::hierarchy_tree(&store, &filter).await.unwrap();

    assert_eq!(root.children.len(), 1);
    assert!(root.children.contains_key("history"));

    // Non-hierarchy fields are ignored by the filter
    let bogus = vec![("author".to_string(), json!("Alice"))];
    let root = tree::hierarchy_tree(&store, &bogus).await.unwrap();
    assert_eq!(root.children.len(), 2);
}

#[tokio::test]
async fn test_collection_statistics() {
    let store = seed_tree_store().await;

    let stats = tree::collection_statistics(&store).await.unwrap();

    assert_eq!(stats.total_documents, 3);
    assert_eq!(stats.hierarchy_distribution["science"], 2);
    assert_eq!(stats.hierarchy_distribution["history"], 1);
    assert_eq!(stats.version_distribution[&1], 2);
    assert_eq!(stats.version_distribution[&3], 1);
    assert_eq!(
        stats.latest_update.as_deref(),
        Some("2026-01-01T00:00:00+00:00")
    );
    assert_eq!(
        stats.oldest_document.as_deref(),
        Some("2025-01-01T00:00:00+00:00")
    );
}
