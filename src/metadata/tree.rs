use super::MetadataStore;
use crate::error::ApiResult;
use crate::types::JsonMap;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

const HIERARCHY_LEVELS: [&str; 6] = [
    "level_1", "level_2", "level_3", "level_4", "level_5", "level_6",
];

/// One node of the hierarchy tree: the documents filed at this level and
/// the child levels below it
#[derive(Debug, Default, Clone, Serialize)]
pub struct TreeNode {
    pub documents: Vec<TreeDocument>,
    pub children: BTreeMap<String, TreeNode>,
}

/// Summary of a document as listed in the tree
#[derive(Debug, Clone, Serialize)]
pub struct TreeDocument {
    pub doc_id: String,
    pub version: u64,
    pub last_updated: Option<String>,
    pub summary: String,
}

/// Aggregate statistics over the metadata collection
#[derive(Debug, Default, Clone, Serialize)]
pub struct CollectionStatistics {
    pub total_documents: u64,
    pub hierarchy_distribution: BTreeMap<String, u64>,
    pub version_distribution: BTreeMap<u64, u64>,
    pub latest_update: Option<String>,
    pub oldest_document: Option<String>,
}

/// Build the navigational tree for every document matching the optional
/// hierarchy-level filter
pub async fn hierarchy_tree(
    store: &dyn MetadataStore,
    level_filter: &[(String, Value)],
) -> ApiResult<TreeNode> {
    let filter: Vec<(String, Value)> = level_filter
        .iter()
        .filter(|(level, _)| HIERARCHY_LEVELS.contains(&level.as_str()))
        .cloned()
        .collect();

    let records = store.query(&filter, None).await?;

    let mut root = TreeNode::default();
    for record in &records {
        add_to_tree(&mut root, record);
    }
    Ok(root)
}

fn add_to_tree(root: &mut TreeNode, record: &JsonMap) {
    let mut node = root;

    for level in HIERARCHY_LEVELS {
        let Some(value) = record.get(level).and_then(|v| v.as_str()) else {
            break;
        };
        node = node.children.entry(value.to_string()).or_default();
    }

    let summary = record
        .get("content_preview")
        .and_then(|v| v.as_str())
        .map(|preview| preview.chars().take(100).collect())
        .unwrap_or_default();

    node.documents.push(TreeDocument {
        doc_id: record
            .get("doc_id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        version: record.get("version").and_then(|v| v.as_u64()).unwrap_or(1),
        last_updated: record
            .get("lastUpdated")
            .and_then(|v| v.as_str())
            .map(String::from),
        summary,
    });
}

/// Aggregate versioning and hierarchy statistics over the collection
pub async fn collection_statistics(store: &dyn MetadataStore) -> ApiResult<CollectionStatistics> {
    let records = store.query(&[], None).await?;

    let mut stats = CollectionStatistics::default();
    for record in &records {
        stats.total_documents += 1;

        let level_1 = record
            .get("level_1")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        *stats
            .hierarchy_distribution
            .entry(level_1.to_string())
            .or_insert(0) += 1;

        let version = record.get("version").and_then(|v| v.as_u64()).unwrap_or(1);
        *stats.version_distribution.entry(version).or_insert(0) += 1;

        if let Some(updated) = record.get("lastUpdated").and_then(|v| v.as_str()) {
            if stats
                .latest_update
                .as_deref()
                .map_or(true, |latest| updated > latest)
            {
                stats.latest_update = Some(updated.to_string());
            }
        }

        if let Some(created) = record.get("createdAt").and_then(|v| v.as_str()) {
            if stats
                .oldest_document
                .as_deref()
                .map_or(true, |oldest| created < oldest)
            {
                stats.oldest_document = Some(created.to_string());
            }
        }
    }

    Ok(stats)
}
