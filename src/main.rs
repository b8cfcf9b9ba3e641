mod api;
mod config;
mod credentials;
mod edits;
mod error;
mod fields;
mod model;
mod options;
mod remote;
mod scheduler;
mod store;
mod sync;
mod values;
mod webhook;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::credentials::{ConfigTokens, TokenSource};
use crate::remote::GithubClient;
use crate::scheduler::{Scheduler, SchedulerStatus};
use crate::store::Store;
use crate::webhook::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("boardsync=info")),
        )
        .init();

    let config = config::load_config()?;

    let db_path = config
        .database
        .path
        .clone()
        .unwrap_or_else(|| config::data_dir().join("boardsync.db"));
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let store = Arc::new(Store::open(&db_path)?);
    info!(path = %db_path.display(), "database opened");

    let tokens: Arc<dyn TokenSource> = Arc::new(ConfigTokens::new(&config.tenants));

    // Register every board named in the config. A failing tenant is logged
    // and skipped; the webhook and scheduler still serve the rest.
    for tenant in &config.tenants {
        let (Some(owner), Some(number)) = (&tenant.owner, tenant.project_number) else {
            continue;
        };
        let result = async {
            let token = tokens.token(&tenant.name).await?;
            let client = GithubClient::new(&token)?;
            sync::configure_project(&store, &client, &tenant.name, owner, number).await
        }
        .await;
        if let Err(error) = result {
            warn!(tenant = tenant.name, owner, number, %error, "could not register project");
        }
    }

    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&store),
        Arc::clone(&tokens),
        Duration::from_secs(config.sync.interval_minutes * 60),
    ));
    scheduler.start().await;

    let state = Arc::new(AppState {
        store,
        tokens,
        webhook_secret: config.webhook.map(|w| w.secret),
        epic_scheme: config.epics.scheme,
    });

    let app = Router::new()
        .route("/webhooks/github", post(webhook::github_webhook))
        .with_state(Arc::clone(&state))
        .merge(api::router(state))
        .merge(
            Router::new()
                .route("/scheduler", get(scheduler_status))
                .with_state(Arc::clone(&scheduler)),
        )
        .route("/healthz", get(|| async { "ok" }));

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!(bind = config.server.bind, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    scheduler.stop().await;
    Ok(())
}

async fn scheduler_status(State(scheduler): State<Arc<Scheduler>>) -> Json<SchedulerStatus> {
    Json(scheduler.status().await)
}
