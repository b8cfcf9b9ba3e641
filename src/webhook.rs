//! Inbound webhook endpoint. Every request is HMAC-verified before the body
//! is parsed; recognized events trigger targeted resynchronization. Handler
//! failures after verification are acknowledged with 200 so the remote side
//! does not retry storms at us; the error rides in the response body.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{info, warn};

use crate::credentials::TokenSource;
use crate::error::SyncError;
use crate::model::Project;
use crate::remote::GithubClient;
use crate::store::Store;
use crate::sync;

const SIGNATURE_HEADER: &str = "x-hub-signature-256";
const EVENT_HEADER: &str = "x-github-event";

/// Shared state behind the HTTP surface.
pub struct AppState {
    pub store: Arc<Store>,
    pub tokens: Arc<dyn TokenSource>,
    pub webhook_secret: Option<String>,
    pub epic_scheme: crate::options::EpicScheme,
}

/// Constant-time check of the `sha256=<hex>` signature header against the
/// raw request body.
pub fn verify_signature(secret: &str, body: &[u8], header: &str) -> bool {
    let Some(hex_digest) = header.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

pub async fn github_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let Some(secret) = state.webhook_secret.as_deref() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "webhook secret not configured"})),
        );
    };

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !verify_signature(secret, &body, signature) {
        warn!("webhook rejected: bad signature");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "invalid signature"})),
        );
    }

    let Some(event) = headers.get(EVENT_HEADER).and_then(|v| v.to_str().ok()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "missing event header"})),
        );
    };

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "body is not valid JSON"})),
            );
        }
    };

    match dispatch(&state, event, &payload).await {
        Ok(result) => (StatusCode::OK, Json(result)),
        Err(error) => {
            warn!(event, %error, "webhook handler failed");
            (
                StatusCode::OK,
                Json(json!({"status": "error", "detail": error.to_string()})),
            )
        }
    }
}

async fn dispatch(state: &AppState, event: &str, payload: &Value) -> Result<Value, SyncError> {
    match event {
        "projects_v2_item" => handle_board_item(state, payload).await,
        "issues" | "pull_request" => handle_content_change(state, event, payload).await,
        other => {
            info!(event = other, "webhook event ignored");
            Ok(json!({"status": "ignored", "event": other}))
        }
    }
}

/// Board-item events carry the item node id and its board's node id. A
/// deleted item is dropped locally; any other action resynchronizes the
/// whole board, which converges regardless of what the action was.
async fn handle_board_item(state: &AppState, payload: &Value) -> Result<Value, SyncError> {
    let action = payload
        .get("action")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let item = payload.get("projects_v2_item").unwrap_or(&Value::Null);
    let node_id = item.get("node_id").and_then(Value::as_str);

    if action == "deleted" {
        let Some(node_id) = node_id else {
            return Ok(json!({"status": "ignored", "reason": "no item node id"}));
        };
        let removed = state.store.delete_item_by_node_id(node_id).await?;
        return Ok(json!({"status": "deleted", "removed": removed}));
    }

    let Some(project_node_id) = item.get("project_node_id").and_then(Value::as_str) else {
        return Ok(json!({"status": "ignored", "reason": "no project node id"}));
    };
    let Some(project) = state.store.project_by_node_id(project_node_id).await? else {
        return Ok(json!({"status": "ignored", "reason": "project not tracked"}));
    };

    let written = resync(state, &project).await?;
    Ok(json!({"status": "synced", "action": action, "items": written}))
}

/// Issue and pull-request events do not name a board, so the content node id
/// is mapped back through the local mirror to every board carrying it.
async fn handle_content_change(
    state: &AppState,
    event: &str,
    payload: &Value,
) -> Result<Value, SyncError> {
    let key = if event == "issues" { "issue" } else { "pull_request" };
    let Some(content_node_id) = payload
        .get(key)
        .and_then(|c| c.get("node_id"))
        .and_then(Value::as_str)
    else {
        return Ok(json!({"status": "ignored", "reason": "no content node id"}));
    };

    let items = state.store.items_by_content_node_id(content_node_id).await?;
    let mut project_ids: Vec<i64> = items.iter().map(|item| item.project_id).collect();
    project_ids.sort_unstable();
    project_ids.dedup();

    let mut synced = 0usize;
    for project_id in project_ids {
        let Some(project) = state.store.project_by_id(project_id).await? else {
            continue;
        };
        resync(state, &project).await?;
        synced += 1;
    }
    Ok(json!({"status": "synced", "projects": synced}))
}

async fn resync(state: &AppState, project: &Project) -> Result<usize, SyncError> {
    let token = state.tokens.token(&project.tenant).await?;
    let client = GithubClient::new(&token)?;
    sync::sync_project(&state.store, &client, project).await
}
