//! Local HTTP API over the mirror and the edit/option/sync operations.
//! Engine errors map onto HTTP statuses here and nowhere else.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};

use crate::edits;
use crate::error::SyncError;
use crate::model::{
    EpicOptionRecord, ItemChangeset, Project, ProjectItem, ProjectSummary,
};
use crate::options::{self, SetupReport};
use crate::remote::GithubClient;
use crate::sync;
use crate::webhook::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/projects", get(list_projects))
        .route("/projects/{id}", get(get_project))
        .route("/projects/{id}/sync", post(sync_now))
        .route("/projects/{id}/setup", post(setup_fields))
        .route("/projects/{id}/items", get(list_items))
        .route("/projects/{id}/items/{node_id}", patch(edit_item))
        .route("/projects/{id}/epics", get(list_epics).post(create_epic))
        .route(
            "/projects/{id}/epics/{epic_id}",
            patch(update_epic).delete(delete_epic),
        )
        .route("/items/{node_id}/details", get(item_details))
        .route("/items/{node_id}/comments", get(item_comments))
        .route("/tenants/{tenant}/projects", get(remote_projects))
        .with_state(state)
}

#[derive(Debug)]
pub struct ApiError(SyncError);

impl From<SyncError> for ApiError {
    fn from(error: SyncError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SyncError::Validation(_) => StatusCode::BAD_REQUEST,
            SyncError::NotFound(_) => StatusCode::NOT_FOUND,
            SyncError::Conflict => StatusCode::CONFLICT,
            SyncError::Configuration(_) => StatusCode::UNPROCESSABLE_ENTITY,
            SyncError::Transport(_) | SyncError::RemoteRejected(_) => StatusCode::BAD_GATEWAY,
            SyncError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

/// Distinguishes an absent key from an explicit `null`: absent means "leave
/// untouched", `null` means "clear".
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EditRequest {
    #[serde(default, deserialize_with = "double_option")]
    pub status: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub start_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    pub end_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    pub due_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    pub iteration_id: Option<Option<String>>,
    pub iteration_title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub epic_option_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub epic_name: Option<Option<String>>,
    pub known_remote_updated_at: Option<DateTime<Utc>>,
    pub editor: Option<String>,
}

impl EditRequest {
    fn into_changeset(self) -> ItemChangeset {
        ItemChangeset {
            status: self.status,
            start_date: self.start_date,
            end_date: self.end_date,
            due_date: self.due_date,
            iteration_id: self.iteration_id,
            iteration_title: self.iteration_title,
            epic_option_id: self.epic_option_id,
            epic_name: self.epic_name,
            known_remote_updated_at: self.known_remote_updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateEpicRequest {
    pub name: String,
    pub color: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateEpicRequest {
    pub name: Option<String>,
    pub color: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    pub owner: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CommentsQuery {
    pub limit: Option<i64>,
}

async fn project_or_404(state: &AppState, id: i64) -> Result<Project, ApiError> {
    state
        .store
        .project_by_id(id)
        .await?
        .ok_or_else(|| ApiError(SyncError::NotFound(format!("project {id}"))))
}

async fn client_for(state: &AppState, tenant: &str) -> Result<GithubClient, ApiError> {
    let token = state.tokens.token(tenant).await?;
    Ok(GithubClient::new(&token)?)
}

async fn list_projects(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Project>>, ApiError> {
    Ok(Json(state.store.list_projects().await?))
}

async fn get_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Project>, ApiError> {
    Ok(Json(project_or_404(&state, id).await?))
}

async fn sync_now(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let project = project_or_404(&state, id).await?;
    let client = client_for(&state, &project.tenant).await?;
    let items = sync::sync_project(&state.store, &client, &project).await?;
    Ok(Json(json!({"status": "synced", "items": items})))
}

async fn setup_fields(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<SetupReport>, ApiError> {
    let project = project_or_404(&state, id).await?;
    let client = client_for(&state, &project.tenant).await?;
    let report =
        options::setup_project_fields(&state.store, &client, &project, state.epic_scheme).await?;
    Ok(Json(report))
}

async fn list_items(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<ProjectItem>>, ApiError> {
    let project = project_or_404(&state, id).await?;
    Ok(Json(state.store.list_items(project.id).await?))
}

async fn edit_item(
    State(state): State<Arc<AppState>>,
    Path((id, node_id)): Path<(i64, String)>,
    Json(request): Json<EditRequest>,
) -> Result<Json<ProjectItem>, ApiError> {
    let project = project_or_404(&state, id).await?;
    let client = client_for(&state, &project.tenant).await?;
    let editor = request.editor.clone();
    let changeset = request.into_changeset();
    let item = edits::apply_item_edit(
        &state.store,
        &client,
        &project,
        &node_id,
        &changeset,
        editor.as_deref(),
    )
    .await?;
    Ok(Json(item))
}

async fn list_epics(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<EpicOptionRecord>>, ApiError> {
    let project = project_or_404(&state, id).await?;
    Ok(Json(state.store.epic_options(project.id).await?))
}

async fn create_epic(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(request): Json<CreateEpicRequest>,
) -> Result<Json<EpicOptionRecord>, ApiError> {
    let project = project_or_404(&state, id).await?;
    let client = client_for(&state, &project.tenant).await?;
    let record = options::create_epic_option(
        &state.store,
        &client,
        state.epic_scheme,
        &project,
        &request.name,
        request.color.as_deref(),
        request.description.as_deref(),
    )
    .await?;
    Ok(Json(record))
}

async fn update_epic(
    State(state): State<Arc<AppState>>,
    Path((id, epic_id)): Path<(i64, i64)>,
    Json(request): Json<UpdateEpicRequest>,
) -> Result<Json<EpicOptionRecord>, ApiError> {
    let project = project_or_404(&state, id).await?;
    let client = client_for(&state, &project.tenant).await?;
    let record = options::update_epic_option(
        &state.store,
        &client,
        state.epic_scheme,
        &project,
        epic_id,
        request.name.as_deref(),
        request.color.as_deref(),
        request.description.as_deref(),
    )
    .await?;
    Ok(Json(record))
}

async fn delete_epic(
    State(state): State<Arc<AppState>>,
    Path((id, epic_id)): Path<(i64, i64)>,
) -> Result<Json<Value>, ApiError> {
    let project = project_or_404(&state, id).await?;
    let client = client_for(&state, &project.tenant).await?;
    options::delete_epic_option(&state.store, &client, state.epic_scheme, &project, epic_id)
        .await?;
    Ok(Json(json!({"status": "deleted"})))
}

/// Resolves the item's board to pick the right tenant credentials, then
/// fetches the underlying issue or pull request.
async fn item_details(
    State(state): State<Arc<AppState>>,
    Path(node_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let (content_node_id, tenant) = content_lookup(&state, &node_id).await?;
    let client = client_for(&state, &tenant).await?;
    Ok(Json(sync::fetch_item_details(&client, &content_node_id).await?))
}

async fn item_comments(
    State(state): State<Arc<AppState>>,
    Path(node_id): Path<String>,
    Query(query): Query<CommentsQuery>,
) -> Result<Json<Vec<Value>>, ApiError> {
    let (content_node_id, tenant) = content_lookup(&state, &node_id).await?;
    let client = client_for(&state, &tenant).await?;
    Ok(Json(
        sync::fetch_item_comments(&client, &content_node_id, query.limit).await?,
    ))
}

async fn content_lookup(state: &AppState, node_id: &str) -> Result<(String, String), ApiError> {
    let item = state
        .store
        .item_by_node_id(node_id)
        .await?
        .ok_or_else(|| ApiError(SyncError::NotFound(format!("item {node_id}"))))?;
    let content_node_id = item.content_node_id.ok_or_else(|| {
        ApiError(SyncError::Validation(
            "item has no linked issue or pull request".into(),
        ))
    })?;
    let project = state
        .store
        .project_by_id(item.project_id)
        .await?
        .ok_or_else(|| ApiError(SyncError::NotFound(format!("project {}", item.project_id))))?;
    Ok((content_node_id, project.tenant))
}

async fn remote_projects(
    State(state): State<Arc<AppState>>,
    Path(tenant): Path<String>,
    Query(query): Query<OwnerQuery>,
) -> Result<Json<Vec<ProjectSummary>>, ApiError> {
    let client = client_for(&state, &tenant).await?;
    Ok(Json(sync::list_projects(&client, &query.owner).await?))
}
