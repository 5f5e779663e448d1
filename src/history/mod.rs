//! Processed-file history
//!
//! Results a user chose to keep are stored under
//! `users/{uid}/history/{id}_{fileName}` and listed newest first.

mod store;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use store::HistoryRepository;

use crate::storage::sanitize_file_name;

/// Items older than this are removed by cleanup
pub const HISTORY_RETENTION_DAYS: i64 = 7;

/// A stored result file
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub id: String,
    #[serde(skip_serializing)]
    pub user_id: String,
    pub file_name: String,
    pub file_url: String,
    pub file_type: String,
    pub file_size: i64,
    pub tool_type: String,
    pub storage_path: String,
    pub created_at: String,
}

impl HistoryItem {
    pub fn new(
        user_id: &str,
        file_name: &str,
        file_type: &str,
        file_size: i64,
        tool_type: &str,
        file_url: &str,
        created_at: DateTime<Utc>,
    ) -> Self {
        let id = Uuid::new_v4().to_string();
        Self {
            storage_path: history_key(user_id, &id, file_name),
            id,
            user_id: user_id.to_string(),
            file_name: file_name.to_string(),
            file_url: file_url.to_string(),
            file_type: file_type.to_string(),
            file_size,
            tool_type: tool_type.to_string(),
            created_at: created_at.to_rfc3339(),
        }
    }
}

/// Object key for a history file
pub fn history_key(user_id: &str, id: &str, file_name: &str) -> String {
    format!("users/{}/history/{}_{}", user_id, id, sanitize_file_name(file_name))
}

/// Cutoff timestamp for cleanup relative to `now`
pub fn retention_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(HISTORY_RETENTION_DAYS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_key_layout() {
        assert_eq!(
            history_key("u1", "abc", "my file.pdf"),
            "users/u1/history/abc_my_file.pdf"
        );
    }

    #[test]
    fn test_new_item_path_uses_its_id() {
        let item = HistoryItem::new("u1", "a.pdf", "application/pdf", 3, "merge", "", Utc::now());
        assert_eq!(item.storage_path, format!("users/u1/history/{}_a.pdf", item.id));
    }
}
