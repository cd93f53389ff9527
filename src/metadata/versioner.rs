use crate::error::{ApiError, ApiResult};
use crate::types::JsonMap;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{json, Value};

/// Number of prior versions retained in `version_history`
pub const MAX_HISTORY: usize = 10;

/// Upper bound on stored document content, bytes
pub const MAX_CONTENT_BYTES: usize = 50_000;

/// Upper bound on a hierarchy level value, characters
pub const MAX_LEVEL_CHARS: usize = 100;

const HIERARCHY_LEVELS: [&str; 6] = [
    "level_1", "level_2", "level_3", "level_4", "level_5", "level_6",
];

/// Fields owned by the versioner itself, skipped by change detection
const VERSIONING_FIELDS: [&str; 3] = ["version", "lastUpdated", "version_history"];

/// Pure metadata transformation applied on every write: validation,
/// hierarchy synthesis, change detection and version bookkeeping. Does
/// no I/O; callers read the prior record and persist the result.
pub struct Versioner;

impl Versioner {
    /// Produce the record to persist from the incoming metadata and the
    /// prior stored record (if any).
    pub fn compose(new_metadata: JsonMap, prior: Option<&JsonMap>) -> ApiResult<JsonMap> {
        Self::validate(&new_metadata, prior)?;

        let mut record = new_metadata;
        let now = Utc::now().to_rfc3339();

        let prior_version = prior
            .and_then(|p| p.get("version"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0);

        let created_at = prior
            .and_then(|p| p.get("createdAt"))
            .cloned()
            .or_else(|| record.get("createdAt").cloned())
            .unwrap_or(json!(now));
        record.insert("createdAt".to_string(), created_at);

        Self::synthesize_hierarchy(&mut record, prior);

        // Change detection runs on the settled record so inherited
        // hierarchy levels and the preserved createdAt do not show up as
        // differences.
        if let Some(prior) = prior {
            let mut history = record
                .get("version_history")
                .and_then(|h| h.as_array())
                .cloned()
                .or_else(|| {
                    prior
                        .get("version_history")
                        .and_then(|h| h.as_array())
                        .cloned()
                })
                .unwrap_or_default();

            let entry = json!({
                "version": prior_version,
                "timestamp": prior.get("lastUpdated").cloned().unwrap_or(json!(now)),
                "changes": Self::detect_changes(prior, &record),
            });
            history.push(entry);

            // Keep only the most recent entries
            if history.len() > MAX_HISTORY {
                history.drain(..history.len() - MAX_HISTORY);
            }
            record.insert("version_history".to_string(), Value::Array(history));
        }

        record.insert("version".to_string(), json!(prior_version + 1));
        record.insert("lastUpdated".to_string(), json!(now));

        Ok(record)
    }

    /// Validate metadata shape and the version increment rule
    fn validate(metadata: &JsonMap, prior: Option<&JsonMap>) -> ApiResult<()> {
        match metadata.get("doc_id") {
            Some(Value::String(_)) => {}
            Some(_) => {
                return Err(ApiError::MetadataInvalid("doc_id must be a string".to_string()))
            }
            None => {
                return Err(ApiError::MetadataInvalid(
                    "Missing required field: doc_id".to_string(),
                ))
            }
        }

        for field in ["original_text", "content"] {
            if let Some(Value::String(text)) = metadata.get(field) {
                if text.len() > MAX_CONTENT_BYTES {
                    return Err(ApiError::MetadataInvalid(format!(
                        "{} exceeds 50KB limit",
                        field
                    )));
                }
            }
        }

        for level in HIERARCHY_LEVELS {
            match metadata.get(level) {
                None | Some(Value::Null) => {}
                Some(Value::String(value)) => {
                    if value.chars().count() > MAX_LEVEL_CHARS {
                        return Err(ApiError::MetadataInvalid(format!(
                            "{} must be 100 characters or less",
                            level
                        )));
                    }
                }
                Some(_) => {
                    return Err(ApiError::MetadataInvalid(format!(
                        "{} must be a string or null",
                        level
                    )))
                }
            }
        }

        for field in ["lastUpdated", "createdAt"] {
            if let Some(Value::String(raw)) = metadata.get(field) {
                if parse_timestamp(raw).is_none() {
                    return Err(ApiError::MetadataInvalid(format!(
                        "{} must be a valid ISO format timestamp",
                        field
                    )));
                }
            }
        }

        if let Some(supplied) = metadata.get("version") {
            let supplied = supplied.as_u64().ok_or_else(|| {
                ApiError::MetadataInvalid("version must be an integer".to_string())
            })?;

            let prior_version = prior
                .and_then(|p| p.get("version"))
                .and_then(|v| v.as_u64())
                .unwrap_or(0);

            if supplied != prior_version + 1 {
                return Err(ApiError::VersionConflict(format!(
                    "version must be {} (supplied {})",
                    prior_version + 1,
                    supplied
                )));
            }
        }

        Ok(())
    }

    /// Describe the differences between two records as
    /// `added:K` / `removed:K` / `modified:K` descriptors
    pub fn detect_changes(old: &JsonMap, new: &JsonMap) -> Vec<String> {
        let mut changes = Vec::new();

        for (key, new_value) in new {
            if VERSIONING_FIELDS.contains(&key.as_str()) {
                continue;
            }
            match old.get(key) {
                Some(old_value) if old_value != new_value => {
                    changes.push(format!("modified:{}", key))
                }
                Some(_) => {}
                None => changes.push(format!("added:{}", key)),
            }
        }

        for key in old.keys() {
            if !new.contains_key(key) && !VERSIONING_FIELDS.contains(&key.as_str()) {
                changes.push(format!("removed:{}", key));
            }
        }

        changes
    }

    /// Fill null hierarchy levels: values carried by the prior version
    /// win, then well-known metadata fields. `level_1` is always
    /// populated.
    fn synthesize_hierarchy(metadata: &mut JsonMap, prior: Option<&JsonMap>) {
        for level in HIERARCHY_LEVELS {
            metadata.entry(level.to_string()).or_insert(Value::Null);
        }

        if let Some(prior) = prior {
            for level in HIERARCHY_LEVELS {
                if metadata[level].is_null() {
                    if let Some(value) = prior.get(level).filter(|v| !v.is_null()) {
                        metadata.insert(level.to_string(), value.clone());
                    }
                }
            }
        }

        if metadata["level_1"].is_null() {
            let level_1 = ["doc_type", "category", "source"]
                .iter()
                .find_map(|field| metadata.get(*field).filter(|v| v.is_string()).cloned())
                .unwrap_or(json!("document"));
            metadata.insert("level_1".to_string(), level_1);
        }

        let sources: [(&str, Option<Value>); 5] = [
            ("level_2", metadata.get("tag").cloned()),
            ("level_3", metadata.get("author").cloned()),
            (
                "level_4",
                metadata.get("year").map(|year| match year {
                    Value::String(s) => json!(s),
                    other => json!(other.to_string()),
                }),
            ),
            ("level_5", metadata.get("language").cloned()),
            ("level_6", metadata.get("format").cloned()),
        ];

        for (level, source) in sources {
            if metadata[level].is_null() {
                if let Some(value) = source.filter(|v| !v.is_null()) {
                    metadata.insert(level.to_string(), value);
                }
            }
        }
    }
}

/// Accept both RFC 3339 timestamps and zone-less ISO-8601 strings
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.naive_utc())
        .ok()
        .or_else(|| raw.parse::<NaiveDateTime>().ok())
}

/// Age of a stored timestamp relative to now; `None` when unparseable
pub fn timestamp_age(raw: &str) -> Option<chrono::Duration> {
    parse_timestamp(raw).map(|then| Utc::now().naive_utc() - then)
}
