//! Local edit propagation. Edits are validated against the cached field
//! catalog, mirrored to the remote board, and only then committed locally —
//! a failed remote mutation leaves the local row untouched.

use chrono::Utc;
use serde_json::json;
use tracing::debug;

use crate::error::SyncError;
use crate::fields;
use crate::model::{ItemChangeset, Project, ProjectItem};
use crate::remote::{queries, GraphQl};
use crate::store::Store;

/// Applies a partial edit to one item. Remote mutations run before the local
/// write; all mutations are set-operations, so a retry after a transport
/// failure converges rather than double-applies.
pub async fn apply_item_edit(
    store: &Store,
    gql: &dyn GraphQl,
    project: &Project,
    item_node_id: &str,
    changeset: &ItemChangeset,
    editor: Option<&str>,
) -> Result<ProjectItem, SyncError> {
    let mut item = store
        .item_by_node_id(item_node_id)
        .await?
        .ok_or_else(|| SyncError::NotFound(format!("item {item_node_id}")))?;

    if changeset.is_empty() {
        return Ok(item);
    }

    // Optimistic concurrency: an edit made against a stale snapshot of the
    // item is rejected before anything mutates.
    if let (Some(known), Some(stored)) =
        (changeset.known_remote_updated_at, item.remote_updated_at)
    {
        if stored > known {
            return Err(SyncError::Conflict);
        }
    }

    // Only an edit supplying both ends of the range is range-checked; a
    // lone date may legitimately land before a stale stored counterpart.
    if let (Some(Some(start)), Some(Some(end))) = (changeset.start_date, changeset.end_date) {
        if end < start {
            return Err(SyncError::Validation(
                "end date precedes start date".into(),
            ));
        }
    }

    let new_status = match &changeset.status {
        Some(Some(raw)) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                Some(None)
            } else {
                let columns = project.status_columns.as_deref().unwrap_or_default();
                let matched = columns
                    .iter()
                    .find(|column| column.eq_ignore_ascii_case(trimmed))
                    .cloned()
                    .ok_or_else(|| {
                        SyncError::Validation(format!("unknown status column: {trimmed}"))
                    })?;
                Some(Some(matched))
            }
        }
        Some(None) => Some(None),
        None => None,
    };
    // A status "change" to the current value is a no-op, not a mutation.
    let new_status = match new_status {
        Some(target) if target == item.status => None,
        other => other,
    };

    let catalog = store.load_fields(project.id).await?;

    // Collect every remote mutation before issuing any, so validation
    // failures cannot leave the boards half-updated.
    let mut mutations: Vec<(&str, serde_json::Value)> = Vec::new();

    if let Some(status) = &new_status {
        let field = fields::status_field(&catalog).ok_or_else(|| {
            SyncError::Configuration("board has no status field".into())
        })?;
        match status {
            Some(name) => {
                let option_id = fields::match_status_option(field, name).ok_or_else(|| {
                    SyncError::Validation(format!("status {name} has no remote option"))
                })?;
                mutations.push((
                    queries::UPDATE_ITEM_FIELD_VALUE,
                    json!({ "input": {
                        "projectId": project.node_id,
                        "itemId": item.node_id,
                        "fieldId": field.field_id,
                        "value": { "singleSelectOptionId": option_id },
                    }}),
                ));
            }
            None => {
                mutations.push((
                    queries::CLEAR_ITEM_FIELD_VALUE,
                    json!({ "input": {
                        "projectId": project.node_id,
                        "itemId": item.node_id,
                        "fieldId": field.field_id,
                    }}),
                ));
            }
        }
    }

    let mut new_iteration: Option<Option<fields::IterationOption>> = None;
    if let Some(iteration_change) = &changeset.iteration_id {
        let field = fields::iteration_field(&catalog).ok_or_else(|| {
            SyncError::Configuration("board has no iteration field".into())
        })?;
        match iteration_change {
            Some(iteration_id) => {
                let option =
                    fields::resolve_iteration_option(field, iteration_id).ok_or_else(|| {
                        SyncError::Validation(format!("unknown iteration: {iteration_id}"))
                    })?;
                mutations.push((
                    queries::UPDATE_ITEM_FIELD_VALUE,
                    json!({ "input": {
                        "projectId": project.node_id,
                        "itemId": item.node_id,
                        "fieldId": field.field_id,
                        "value": { "iterationId": iteration_id },
                    }}),
                ));
                new_iteration = Some(Some(option));
            }
            None => {
                mutations.push((
                    queries::CLEAR_ITEM_FIELD_VALUE,
                    json!({ "input": {
                        "projectId": project.node_id,
                        "itemId": item.node_id,
                        "fieldId": field.field_id,
                    }}),
                ));
                new_iteration = Some(None);
            }
        }
    }

    for (query, variables) in mutations {
        gql.execute(query, variables).await?;
    }

    // Remote side accepted everything; commit locally.
    if let Some(status) = new_status {
        item.status = status;
    }
    if let Some(iteration) = new_iteration {
        match iteration {
            Some(option) => {
                item.iteration_id = Some(option.id);
                item.iteration = changeset
                    .iteration_title
                    .clone()
                    .or(Some(option.title));
                item.iteration_start = option.start_date;
                item.iteration_end = option.end_date;
            }
            None => {
                item.iteration_id = None;
                item.iteration = None;
                item.iteration_start = None;
                item.iteration_end = None;
            }
        }
    }
    if let Some(start_date) = changeset.start_date {
        item.start_date = start_date;
    }
    if let Some(end_date) = changeset.end_date {
        item.end_date = end_date;
    }
    if let Some(due_date) = changeset.due_date {
        item.due_date = due_date;
    }
    if let Some(epic_change) = &changeset.epic_option_id {
        item.epic_option_id = epic_change.clone();
        item.epic_name = match epic_change {
            Some(option_id) => fields::epic_field(&catalog)
                .and_then(|field| fields::resolve_epic_option(field, option_id))
                .map(|option| option.name),
            None => None,
        };
    }
    if let Some(epic_name) = &changeset.epic_name {
        item.epic_name = epic_name.clone();
    }

    item.last_local_edit_at = Some(Utc::now());
    item.last_local_edit_by = editor.map(str::to_string);
    store.save_item(&item).await?;

    debug!(item = item.node_id, "local edit applied");
    Ok(item)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{FieldKind, IterationEntry, ProjectField, SelectOption};
    use crate::model::ItemPayload;
    use crate::remote::tests::MockGraphQl;
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::json;

    fn catalog() -> Vec<ProjectField> {
        vec![
            ProjectField {
                field_id: "f-status".into(),
                name: "Status".into(),
                kind: FieldKind::SingleSelect {
                    options: vec![
                        SelectOption {
                            id: "o-b".into(),
                            name: "Backlog".into(),
                            color: None,
                        },
                        SelectOption {
                            id: "o-d".into(),
                            name: "Done".into(),
                            color: None,
                        },
                    ],
                },
            },
            ProjectField {
                field_id: "f-it".into(),
                name: "Iteration".into(),
                kind: FieldKind::Iteration {
                    iterations: vec![IterationEntry {
                        id: "it-1".into(),
                        title: "Sprint 1".into(),
                        start_date: Some("2025-01-01".into()),
                        duration: Some(14),
                    }],
                },
            },
            ProjectField {
                field_id: "f-epic".into(),
                name: "Epic".into(),
                kind: FieldKind::SingleSelect {
                    options: vec![SelectOption {
                        id: "o-pay".into(),
                        name: "Payments".into(),
                        color: Some("BLUE".into()),
                    }],
                },
            },
        ]
    }

    async fn seed(store: &Store) -> Project {
        let columns = vec![
            "Backlog".to_string(),
            "In Progress".to_string(),
            "Done".to_string(),
        ];
        let project = store
            .upsert_project("acme", "acme-org", 7, "p-1", Some("Roadmap"), Some(&columns))
            .await
            .unwrap();
        store.replace_fields(project.id, &catalog()).await.unwrap();
        let payload = ItemPayload {
            node_id: "item-1".into(),
            status: Some("Backlog".into()),
            remote_updated_at: Some(ts("2025-03-01T10:00:00Z")),
            ..Default::default()
        };
        store.upsert_item(project.id, &payload, Utc::now()).await.unwrap();
        project
    }

    fn ts(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
    }

    #[tokio::test]
    async fn status_edit_mirrors_remotely_then_commits() {
        let store = Store::open_in_memory().unwrap();
        let project = seed(&store).await;
        let gql = MockGraphQl::new();

        let changeset = ItemChangeset {
            status: Some(Some("done".into())),
            ..Default::default()
        };
        let item = apply_item_edit(&store, &gql, &project, "item-1", &changeset, Some("alice"))
            .await
            .unwrap();

        // Name is normalized to the canonical column spelling.
        assert_eq!(item.status.as_deref(), Some("Done"));
        assert_eq!(item.last_local_edit_by.as_deref(), Some("alice"));

        let recorded = gql.recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].1["input"]["fieldId"], json!("f-status"));
        assert_eq!(
            recorded[0].1["input"]["value"]["singleSelectOptionId"],
            json!("o-d")
        );

        let stored = store.item_by_node_id("item-1").await.unwrap().unwrap();
        assert_eq!(stored.status.as_deref(), Some("Done"));
    }

    #[tokio::test]
    async fn unknown_status_is_rejected_before_any_remote_call() {
        let store = Store::open_in_memory().unwrap();
        let project = seed(&store).await;
        let gql = MockGraphQl::new();

        let changeset = ItemChangeset {
            status: Some(Some("Blocked".into())),
            ..Default::default()
        };
        let err = apply_item_edit(&store, &gql, &project, "item-1", &changeset, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
        assert_eq!(gql.call_count(), 0);

        let stored = store.item_by_node_id("item-1").await.unwrap().unwrap();
        assert_eq!(stored.status.as_deref(), Some("Backlog"));
    }

    #[tokio::test]
    async fn status_in_columns_but_not_remote_is_rejected() {
        let store = Store::open_in_memory().unwrap();
        let project = seed(&store).await;
        let gql = MockGraphQl::new();

        // "In Progress" is a local column with no matching remote option.
        let changeset = ItemChangeset {
            status: Some(Some("In Progress".into())),
            ..Default::default()
        };
        let err = apply_item_edit(&store, &gql, &project, "item-1", &changeset, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
        assert_eq!(gql.call_count(), 0);
    }

    #[tokio::test]
    async fn editing_status_to_its_current_value_issues_no_mutation() {
        let store = Store::open_in_memory().unwrap();
        let project = seed(&store).await;
        let gql = MockGraphQl::new();

        let changeset = ItemChangeset {
            status: Some(Some("backlog".into())),
            ..Default::default()
        };
        let item = apply_item_edit(&store, &gql, &project, "item-1", &changeset, None)
            .await
            .unwrap();
        assert_eq!(item.status.as_deref(), Some("Backlog"));
        assert_eq!(gql.call_count(), 0);
    }

    #[tokio::test]
    async fn clearing_status_issues_a_clear_mutation() {
        let store = Store::open_in_memory().unwrap();
        let project = seed(&store).await;
        let gql = MockGraphQl::new();

        let changeset = ItemChangeset {
            status: Some(None),
            ..Default::default()
        };
        let item = apply_item_edit(&store, &gql, &project, "item-1", &changeset, None)
            .await
            .unwrap();
        assert!(item.status.is_none());

        let recorded = gql.recorded();
        assert_eq!(recorded.len(), 1);
        assert!(recorded[0].0.contains("clearProjectV2ItemFieldValue"));
    }

    #[tokio::test]
    async fn iteration_edit_resolves_the_cached_range() {
        let store = Store::open_in_memory().unwrap();
        let project = seed(&store).await;
        let gql = MockGraphQl::new();

        let changeset = ItemChangeset {
            iteration_id: Some(Some("it-1".into())),
            ..Default::default()
        };
        let item = apply_item_edit(&store, &gql, &project, "item-1", &changeset, None)
            .await
            .unwrap();
        assert_eq!(item.iteration.as_deref(), Some("Sprint 1"));
        assert_eq!(
            item.iteration_end.unwrap(),
            Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap()
        );

        let recorded = gql.recorded();
        assert_eq!(recorded[0].1["input"]["value"]["iterationId"], json!("it-1"));
    }

    #[tokio::test]
    async fn remote_failure_aborts_the_local_write() {
        let store = Store::open_in_memory().unwrap();
        let project = seed(&store).await;
        let gql = MockGraphQl::new();
        gql.push_error(SyncError::Transport("timed out".into()));

        let changeset = ItemChangeset {
            status: Some(Some("Done".into())),
            ..Default::default()
        };
        let err = apply_item_edit(&store, &gql, &project, "item-1", &changeset, None)
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        let stored = store.item_by_node_id("item-1").await.unwrap().unwrap();
        assert_eq!(stored.status.as_deref(), Some("Backlog"));
        assert!(stored.last_local_edit_at.is_none());
    }

    #[tokio::test]
    async fn stale_edits_are_rejected_as_conflicts() {
        let store = Store::open_in_memory().unwrap();
        let project = seed(&store).await;
        let gql = MockGraphQl::new();

        let changeset = ItemChangeset {
            status: Some(Some("Done".into())),
            known_remote_updated_at: Some(ts("2025-02-01T00:00:00Z")),
            ..Default::default()
        };
        let err = apply_item_edit(&store, &gql, &project, "item-1", &changeset, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Conflict));
        assert_eq!(gql.call_count(), 0);
    }

    #[tokio::test]
    async fn end_before_start_is_invalid() {
        let store = Store::open_in_memory().unwrap();
        let project = seed(&store).await;
        let gql = MockGraphQl::new();

        let changeset = ItemChangeset {
            start_date: Some(Some(ts("2025-04-10T00:00:00Z"))),
            end_date: Some(Some(ts("2025-04-01T00:00:00Z"))),
            ..Default::default()
        };
        let err = apply_item_edit(&store, &gql, &project, "item-1", &changeset, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
        assert_eq!(gql.call_count(), 0);
    }

    #[tokio::test]
    async fn lone_end_date_before_a_stored_start_is_accepted() {
        let store = Store::open_in_memory().unwrap();
        let project = seed(&store).await;
        let payload = ItemPayload {
            node_id: "item-2".into(),
            start_date: Some(ts("2025-04-10T00:00:00Z")),
            ..Default::default()
        };
        store.upsert_item(project.id, &payload, Utc::now()).await.unwrap();

        let gql = MockGraphQl::new();
        let changeset = ItemChangeset {
            end_date: Some(Some(ts("2025-04-01T00:00:00Z"))),
            ..Default::default()
        };
        let item = apply_item_edit(&store, &gql, &project, "item-2", &changeset, None)
            .await
            .unwrap();
        assert_eq!(item.end_date.unwrap(), ts("2025-04-01T00:00:00Z"));
        assert_eq!(item.start_date.unwrap(), ts("2025-04-10T00:00:00Z"));
    }

    #[tokio::test]
    async fn epic_edit_is_local_only_and_resolves_the_name() {
        let store = Store::open_in_memory().unwrap();
        let project = seed(&store).await;
        let gql = MockGraphQl::new();

        let changeset = ItemChangeset {
            epic_option_id: Some(Some("o-pay".into())),
            ..Default::default()
        };
        let item = apply_item_edit(&store, &gql, &project, "item-1", &changeset, None)
            .await
            .unwrap();
        assert_eq!(item.epic_option_id.as_deref(), Some("o-pay"));
        assert_eq!(item.epic_name.as_deref(), Some("Payments"));
        assert_eq!(gql.call_count(), 0);
    }

    #[tokio::test]
    async fn date_edits_persist_without_remote_calls() {
        let store = Store::open_in_memory().unwrap();
        let project = seed(&store).await;
        let gql = MockGraphQl::new();

        let changeset = ItemChangeset {
            start_date: Some(Some(ts("2025-04-01T00:00:00Z"))),
            due_date: Some(Some(ts("2025-04-10T00:00:00Z"))),
            ..Default::default()
        };
        let item = apply_item_edit(&store, &gql, &project, "item-1", &changeset, None)
            .await
            .unwrap();
        assert!(item.start_date.is_some());
        assert!(item.due_date.is_some());
        assert_eq!(gql.call_count(), 0);
    }

    #[tokio::test]
    async fn missing_item_is_not_found() {
        let store = Store::open_in_memory().unwrap();
        let project = seed(&store).await;
        let gql = MockGraphQl::new();
        let changeset = ItemChangeset {
            status: Some(None),
            ..Default::default()
        };
        let err = apply_item_edit(&store, &gql, &project, "ghost", &changeset, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
    }
}
