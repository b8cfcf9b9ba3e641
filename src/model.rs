use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One remote board bound to a tenant account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub tenant: String,
    pub owner_login: String,
    pub project_number: i64,
    pub node_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Ordered column names derived from the status field, always ending in
    /// a terminal "Done" column. None until the board declares a status
    /// single-select.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_columns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// One card on a board, wrapping an issue, pull request, or draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectItem {
    pub id: i64,
    pub project_id: i64,
    pub node_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default)]
    pub assignees: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration_start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration_end: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epic_option_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epic_name: Option<String>,
    /// Raw name→value map for every field on the item, whatever its role.
    #[serde(default)]
    pub field_values: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_local_edit_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_local_edit_by: Option<String>,
}

/// One item as fetched and parsed from the remote system, ready to upsert.
#[derive(Debug, Clone, Default)]
pub struct ItemPayload {
    pub node_id: String,
    pub content_node_id: Option<String>,
    pub content_type: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub status: Option<String>,
    pub assignees: Vec<String>,
    pub iteration: Option<String>,
    pub iteration_id: Option<String>,
    pub iteration_start: Option<DateTime<Utc>>,
    pub iteration_end: Option<DateTime<Utc>>,
    pub estimate: Option<f64>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub epic_option_id: Option<String>,
    pub epic_name: Option<String>,
    pub field_values: BTreeMap<String, Value>,
    pub updated_at: Option<DateTime<Utc>>,
    pub remote_updated_at: Option<DateTime<Utc>>,
}

/// A partial update to one item. The outer `Option` distinguishes "leave
/// untouched" from "set" — `Some(None)` clears the attribute.
#[derive(Debug, Clone, Default)]
pub struct ItemChangeset {
    pub status: Option<Option<String>>,
    pub start_date: Option<Option<DateTime<Utc>>>,
    pub end_date: Option<Option<DateTime<Utc>>>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub iteration_id: Option<Option<String>>,
    /// Display override used when the iteration title should not come from
    /// the cached option list.
    pub iteration_title: Option<String>,
    pub epic_option_id: Option<Option<String>>,
    pub epic_name: Option<Option<String>>,
    /// Optimistic-concurrency guard: the remote timestamp the caller edited
    /// against. When the stored copy is newer the edit is rejected.
    pub known_remote_updated_at: Option<DateTime<Utc>>,
}

impl ItemChangeset {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
            && self.due_date.is_none()
            && self.iteration_id.is_none()
            && self.epic_option_id.is_none()
            && self.epic_name.is_none()
    }
}

/// One entry from the remote project listing.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectSummary {
    pub node_id: String,
    pub number: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Locally cached epic grouping. Under the single-select scheme `option_id`
/// points at the remote option; under the label scheme `label_name` is the
/// repository label applied across linked repositories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpicOptionRecord {
    pub id: i64,
    pub project_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub option_id: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
