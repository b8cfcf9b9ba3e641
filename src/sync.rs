//! Board synchronization: fetch remote metadata and items, parse them, and
//! mirror the result into the local store.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::SyncError;
use crate::fields::{self, ProjectField};
use crate::model::{ItemPayload, Project, ProjectSummary};
use crate::remote::{queries, GraphQl};
use crate::store::Store;
use crate::values;

const ITEMS_PAGE_SIZE: i64 = 50;
const DEFAULT_COMMENT_LIMIT: i64 = 20;

/// Remote board metadata: identity plus the full field catalog.
#[derive(Debug, Clone)]
pub struct ProjectMetadata {
    pub node_id: String,
    pub name: Option<String>,
    pub fields: Vec<ProjectField>,
}

/// Fetches one board's metadata by owner login and number. The owner is
/// queried as both organization and user; whichever root resolves wins.
pub async fn fetch_project_metadata(
    gql: &dyn GraphQl,
    owner: &str,
    number: i64,
) -> Result<ProjectMetadata, SyncError> {
    let data = gql
        .execute(
            queries::PROJECT_METADATA,
            json!({ "owner": owner, "number": number }),
        )
        .await?;

    let node = ["organization", "user"]
        .iter()
        .filter_map(|root| data.get(root))
        .filter_map(|root| root.get("projectV2"))
        .find(|project| !project.is_null())
        .ok_or_else(|| {
            SyncError::NotFound(format!("project {number} not found for owner {owner}"))
        })?;

    let node_id = node
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| SyncError::RemoteRejected("project node carried no id".into()))?
        .to_string();
    let name = node
        .get("title")
        .and_then(Value::as_str)
        .map(str::to_string);
    let fields = node
        .get("fields")
        .and_then(|f| f.get("nodes"))
        .and_then(Value::as_array)
        .map(|nodes| nodes.iter().filter_map(ProjectField::from_node).collect())
        .unwrap_or_default();

    Ok(ProjectMetadata {
        node_id,
        name,
        fields,
    })
}

/// Lists the boards visible under an owner login, merging the organization
/// and user roots.
pub async fn list_projects(
    gql: &dyn GraphQl,
    owner: &str,
) -> Result<Vec<ProjectSummary>, SyncError> {
    let data = gql
        .execute(queries::LIST_PROJECTS, json!({ "owner": owner }))
        .await?;

    let mut summaries = Vec::new();
    for root in ["organization", "user"] {
        let Some(nodes) = data
            .get(root)
            .and_then(|r| r.get("projectsV2"))
            .and_then(|p| p.get("nodes"))
            .and_then(Value::as_array)
        else {
            continue;
        };
        for node in nodes {
            let (Some(node_id), Some(number)) = (
                node.get("id").and_then(Value::as_str),
                node.get("number").and_then(Value::as_i64),
            ) else {
                continue;
            };
            summaries.push(ProjectSummary {
                node_id: node_id.to_string(),
                number,
                title: node
                    .get("title")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                updated_at: parse_timestamp(node.get("updatedAt")),
            });
        }
    }
    Ok(summaries)
}

/// Pages through every item on a board and parses each into a flat payload.
pub async fn fetch_project_items(
    gql: &dyn GraphQl,
    project_node_id: &str,
) -> Result<Vec<ItemPayload>, SyncError> {
    let mut payloads = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let data = gql
            .execute(
                queries::PROJECT_ITEMS_PAGE,
                json!({
                    "projectId": project_node_id,
                    "first": ITEMS_PAGE_SIZE,
                    "after": cursor,
                }),
            )
            .await?;

        // A null node means the board vanished between pages; what was
        // fetched so far stands and the loop ends.
        let Some(items) = data.get("node").and_then(|n| n.get("items")) else {
            break;
        };

        if let Some(nodes) = items.get("nodes").and_then(Value::as_array) {
            for node in nodes {
                if let Some(payload) = parse_item_node(node) {
                    payloads.push(payload);
                }
            }
        }

        let page_info = items.get("pageInfo");
        let has_next = page_info
            .and_then(|p| p.get("hasNextPage"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !has_next {
            break;
        }
        cursor = page_info
            .and_then(|p| p.get("endCursor"))
            .and_then(Value::as_str)
            .map(str::to_string);
        if cursor.is_none() {
            break;
        }
    }

    Ok(payloads)
}

/// Converts one raw item node into an upsert-ready payload. Items without an
/// id are skipped.
fn parse_item_node(node: &Value) -> Option<ItemPayload> {
    let node_id = node.get("id")?.as_str()?.to_string();
    let item_updated_at = parse_timestamp(node.get("updatedAt"));

    let content = node.get("content").filter(|c| !c.is_null());
    let content_node_id = content
        .and_then(|c| c.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let content_type = content
        .and_then(|c| c.get("__typename"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let title = content
        .and_then(|c| c.get("title"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let url = content
        .and_then(|c| c.get("url"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let assignees: Vec<String> = content
        .and_then(|c| c.get("assignees"))
        .and_then(|a| a.get("nodes"))
        .and_then(Value::as_array)
        .map(|nodes| {
            nodes
                .iter()
                .filter_map(|n| n.get("login").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let content_updated_at = content.and_then(|c| parse_timestamp(c.get("updatedAt")));

    let empty = Vec::new();
    let value_nodes = node
        .get("fieldValues")
        .and_then(|f| f.get("nodes"))
        .and_then(Value::as_array)
        .unwrap_or(&empty);
    let (field_values, details) = values::parse_field_values(value_nodes);

    let status = field_values
        .get("Status")
        .and_then(Value::as_str)
        .map(str::to_string);
    let estimate = field_values.get("Estimate").and_then(Value::as_f64);
    let iteration = details.iteration_title.clone().or_else(|| {
        field_values
            .get("Iteration")
            .and_then(Value::as_str)
            .map(str::to_string)
    });
    let epic_name = details.epic_name.clone().or_else(|| {
        field_values
            .get("Epic")
            .and_then(Value::as_str)
            .map(str::to_string)
    });

    Some(ItemPayload {
        node_id,
        content_node_id,
        content_type,
        title,
        url,
        status,
        assignees,
        iteration,
        iteration_id: details.iteration_id,
        iteration_start: details.iteration_start,
        iteration_end: details.iteration_end,
        estimate,
        start_date: details.start_date,
        end_date: details.end_date,
        due_date: details.due_date,
        epic_option_id: details.epic_option_id,
        epic_name,
        field_values,
        updated_at: content_updated_at.or(item_updated_at),
        remote_updated_at: item_updated_at,
    })
}

/// Registers (or re-resolves) a board for a tenant: fetches metadata, stores
/// the project row, and refreshes the field cache.
pub async fn configure_project(
    store: &Store,
    gql: &dyn GraphQl,
    tenant: &str,
    owner: &str,
    number: i64,
) -> Result<Project, SyncError> {
    let metadata = fetch_project_metadata(gql, owner, number).await?;
    let status_columns = fields::extract_status_columns(&metadata.fields);
    let project = store
        .upsert_project(
            tenant,
            owner,
            number,
            &metadata.node_id,
            metadata.name.as_deref(),
            status_columns.as_deref(),
        )
        .await?;
    store.replace_fields(project.id, &metadata.fields).await?;
    info!(
        owner,
        number,
        fields = metadata.fields.len(),
        "project configured"
    );
    Ok(project)
}

/// Runs one full synchronization pass for a board: refresh the field cache,
/// then upsert every item. Returns the number of items written. The project
/// sync stamp moves only after the whole pass succeeds.
pub async fn sync_project(
    store: &Store,
    gql: &dyn GraphQl,
    project: &Project,
) -> Result<usize, SyncError> {
    let metadata = fetch_project_metadata(gql, &project.owner_login, project.project_number).await?;
    let status_columns = fields::extract_status_columns(&metadata.fields);
    let project = store
        .upsert_project(
            &project.tenant,
            &project.owner_login,
            project.project_number,
            &metadata.node_id,
            metadata.name.as_deref(),
            status_columns.as_deref(),
        )
        .await?;
    store.replace_fields(project.id, &metadata.fields).await?;

    let payloads = fetch_project_items(gql, &metadata.node_id).await?;
    let now = Utc::now();
    for payload in &payloads {
        store.upsert_item(project.id, payload, now).await?;
    }
    store.set_project_synced(project.id, now).await?;

    debug!(
        owner = project.owner_login,
        number = project.project_number,
        items = payloads.len(),
        "sync pass complete"
    );
    Ok(payloads.len())
}

/// Fetches the full detail payload for one issue or pull request node.
pub async fn fetch_item_details(gql: &dyn GraphQl, node_id: &str) -> Result<Value, SyncError> {
    let data = gql
        .execute(queries::ITEM_DETAILS, json!({ "id": node_id }))
        .await?;
    match data.get("node") {
        Some(node) if !node.is_null() => Ok(node.clone()),
        _ => Err(SyncError::NotFound(format!("content node {node_id}"))),
    }
}

/// Fetches the most recent comments on one issue or pull request node.
pub async fn fetch_item_comments(
    gql: &dyn GraphQl,
    node_id: &str,
    limit: Option<i64>,
) -> Result<Vec<Value>, SyncError> {
    let data = gql
        .execute(
            queries::ITEM_COMMENTS,
            json!({ "id": node_id, "limit": limit.unwrap_or(DEFAULT_COMMENT_LIMIT) }),
        )
        .await?;
    let node = match data.get("node") {
        Some(node) if !node.is_null() => node,
        _ => return Err(SyncError::NotFound(format!("content node {node_id}"))),
    };
    Ok(node
        .get("comments")
        .and_then(|c| c.get("nodes"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default())
}

fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    value
        .and_then(Value::as_str)
        .and_then(fields::parse_date_value)
}
