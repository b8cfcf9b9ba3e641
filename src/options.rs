//! Epic grouping management. Two schemes exist: epics as options of a
//! single-select field on the board, or epics as repository labels tracked
//! locally. The single-select scheme mutates the remote field and refreshes
//! the cache; the label scheme only touches local rows.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::error::SyncError;
use crate::fields::{self, SINGLE_SELECT_COLORS};
use crate::model::{EpicOptionRecord, Project};
use crate::remote::{queries, GraphQl};
use crate::store::Store;
use crate::sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpicScheme {
    #[default]
    SingleSelect,
    RepoLabels,
}

/// Starter options for a freshly created epic field. The remote API rejects
/// a single-select created with an empty option list.
const DEFAULT_EPIC_OPTIONS: &[(&str, &str)] = &[
    ("Feature", "BLUE"),
    ("Bug Fix", "RED"),
    ("Tech Debt", "YELLOW"),
];

/// Outcome of a field-setup pass: which standard fields were created and
/// which already existed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SetupReport {
    pub created: Vec<String>,
    pub existing: Vec<String>,
}

/// Uppercases and validates a color against the remote palette. Out-of-range
/// colors are rejected before any remote call.
pub fn normalize_select_color(raw: &str) -> Result<String, SyncError> {
    let color = raw.trim().to_uppercase();
    if SINGLE_SELECT_COLORS.contains(&color.as_str()) {
        Ok(color)
    } else {
        Err(SyncError::Validation(format!(
            "color {raw} is not in the single-select palette"
        )))
    }
}

/// Validates a repository-label color: six hex digits, leading '#' allowed.
fn normalize_label_color(raw: &str) -> Result<String, SyncError> {
    let color = raw.trim().trim_start_matches('#').to_lowercase();
    if color.len() == 6 && color.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(color)
    } else {
        Err(SyncError::Validation(format!(
            "color {raw} is not a six-digit hex value"
        )))
    }
}

fn label_name_for(name: &str) -> String {
    let slug: String = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .collect();
    format!("epic:{slug}")
}

/// Re-fetches the board's field catalog and rebuilds the local caches.
pub async fn refresh_field_cache(
    store: &Store,
    gql: &dyn GraphQl,
    project: &Project,
) -> Result<(), SyncError> {
    let metadata =
        sync::fetch_project_metadata(gql, &project.owner_login, project.project_number).await?;
    store.replace_fields(project.id, &metadata.fields).await
}

pub async fn create_epic_option(
    store: &Store,
    gql: &dyn GraphQl,
    scheme: EpicScheme,
    project: &Project,
    name: &str,
    color: Option<&str>,
    description: Option<&str>,
) -> Result<EpicOptionRecord, SyncError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(SyncError::Validation("epic name is empty".into()));
    }

    match scheme {
        EpicScheme::SingleSelect => {
            let color = color.map(normalize_select_color).transpose()?;
            let catalog = store.load_fields(project.id).await?;
            let field = fields::epic_field(&catalog).ok_or_else(|| {
                SyncError::Configuration("board has no epic single-select field".into())
            })?;

            gql.execute(
                queries::UPSERT_SINGLE_SELECT_OPTION,
                json!({ "input": {
                    "fieldId": field.field_id,
                    "name": name,
                    "color": color.as_deref().unwrap_or("GRAY"),
                    "description": description.unwrap_or(""),
                }}),
            )
            .await?;

            refresh_field_cache(store, gql, project).await?;
            find_by_name(store, project.id, name).await
        }
        EpicScheme::RepoLabels => {
            let color = color.map(normalize_label_color).transpose()?;
            let record = store
                .insert_epic_label(
                    project.id,
                    name,
                    &label_name_for(name),
                    color.as_deref(),
                    description,
                )
                .await?;
            info!(epic = name, "epic label registered");
            Ok(record)
        }
    }
}

pub async fn update_epic_option(
    store: &Store,
    gql: &dyn GraphQl,
    scheme: EpicScheme,
    project: &Project,
    record_id: i64,
    name: Option<&str>,
    color: Option<&str>,
    description: Option<&str>,
) -> Result<EpicOptionRecord, SyncError> {
    let record = store
        .epic_option_by_id(record_id)
        .await?
        .ok_or_else(|| SyncError::NotFound(format!("epic option {record_id}")))?;

    match scheme {
        EpicScheme::SingleSelect => {
            let option_id = record.option_id.as_deref().ok_or_else(|| {
                SyncError::Validation("record is not backed by a remote option".into())
            })?;
            let color = color.map(normalize_select_color).transpose()?;
            let catalog = store.load_fields(project.id).await?;
            let field = fields::epic_field(&catalog).ok_or_else(|| {
                SyncError::Configuration("board has no epic single-select field".into())
            })?;

            let new_name = name.unwrap_or(&record.name);
            gql.execute(
                queries::UPSERT_SINGLE_SELECT_OPTION,
                json!({ "input": {
                    "fieldId": field.field_id,
                    "optionId": option_id,
                    "name": new_name,
                    "color": color.as_deref().or(record.color.as_deref()).unwrap_or("GRAY"),
                    "description": description.unwrap_or(""),
                }}),
            )
            .await?;

            refresh_field_cache(store, gql, project).await?;
            find_by_name(store, project.id, new_name).await
        }
        EpicScheme::RepoLabels => {
            let color = color.map(normalize_label_color).transpose()?;
            store
                .update_epic_label(record_id, name, color.as_deref(), description)
                .await?;
            store
                .epic_option_by_id(record_id)
                .await?
                .ok_or_else(|| SyncError::NotFound(format!("epic option {record_id}")))
        }
    }
}

pub async fn delete_epic_option(
    store: &Store,
    gql: &dyn GraphQl,
    scheme: EpicScheme,
    project: &Project,
    record_id: i64,
) -> Result<(), SyncError> {
    let record = store
        .epic_option_by_id(record_id)
        .await?
        .ok_or_else(|| SyncError::NotFound(format!("epic option {record_id}")))?;

    match scheme {
        EpicScheme::SingleSelect => {
            let option_id = record.option_id.as_deref().ok_or_else(|| {
                SyncError::Validation("record is not backed by a remote option".into())
            })?;
            let catalog = store.load_fields(project.id).await?;
            let field = fields::epic_field(&catalog).ok_or_else(|| {
                SyncError::Configuration("board has no epic single-select field".into())
            })?;

            gql.execute(
                queries::DELETE_SINGLE_SELECT_OPTION,
                json!({ "input": {
                    "fieldId": field.field_id,
                    "optionId": option_id,
                }}),
            )
            .await?;

            refresh_field_cache(store, gql, project).await
        }
        EpicScheme::RepoLabels => store.delete_epic_option_row(record_id).await,
    }
}

/// Ensures the standard planning fields exist on a board, creating any that
/// are missing, then refreshes the cache.
pub async fn setup_project_fields(
    store: &Store,
    gql: &dyn GraphQl,
    project: &Project,
    scheme: EpicScheme,
) -> Result<SetupReport, SyncError> {
    let catalog = store.load_fields(project.id).await?;
    let mut report = SetupReport::default();

    if fields::iteration_field(&catalog).is_some() {
        report.existing.push("Iteration".into());
    } else {
        gql.execute(
            queries::CREATE_ITERATION_FIELD,
            json!({ "input": {
                "projectId": project.node_id,
                "dataType": "ITERATION",
                "name": "Iteration",
            }}),
        )
        .await?;
        report.created.push("Iteration".into());
    }

    if fields::estimate_field(&catalog).is_some() {
        report.existing.push("Estimate".into());
    } else {
        gql.execute(
            queries::CREATE_NUMBER_FIELD,
            json!({ "input": {
                "projectId": project.node_id,
                "dataType": "NUMBER",
                "name": "Estimate",
            }}),
        )
        .await?;
        report.created.push("Estimate".into());
    }

    // Under the label scheme epics never live on the board, so no field is
    // created for them.
    if scheme == EpicScheme::SingleSelect {
        if fields::epic_field(&catalog).is_some() {
            report.existing.push("Epic".into());
        } else {
            let starter_options: Vec<_> = DEFAULT_EPIC_OPTIONS
                .iter()
                .map(|(name, color)| json!({"name": name, "color": color, "description": ""}))
                .collect();
            gql.execute(
                queries::CREATE_SINGLE_SELECT_FIELD,
                json!({ "input": {
                    "projectId": project.node_id,
                    "dataType": "SINGLE_SELECT",
                    "name": "Epic",
                    "singleSelectOptions": starter_options,
                }}),
            )
            .await?;
            report.created.push("Epic".into());
        }
    }

    if !report.created.is_empty() {
        refresh_field_cache(store, gql, project).await?;
        info!(created = ?report.created, "project fields created");
    }
    Ok(report)
}

async fn find_by_name(
    store: &Store,
    project_id: i64,
    name: &str,
) -> Result<EpicOptionRecord, SyncError> {
    store
        .epic_options(project_id)
        .await?
        .into_iter()
        .find(|record| record.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| SyncError::NotFound(format!("epic option {name}")))
}
