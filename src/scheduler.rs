//! Periodic full synchronization. One background task ticks at a fixed
//! interval and resyncs every registered board; a failed board is logged and
//! skipped so one bad tenant cannot stall the others.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{info, warn};

use crate::credentials::TokenSource;
use crate::remote::GithubClient;
use crate::store::Store;
use crate::sync;

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_run: Option<DateTime<Utc>>,
}

struct RunningJob {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct Scheduler {
    store: Arc<Store>,
    tokens: Arc<dyn TokenSource>,
    interval: Duration,
    job: Mutex<Option<RunningJob>>,
    next_run: Arc<StdMutex<Option<DateTime<Utc>>>>,
}

impl Scheduler {
    pub fn new(store: Arc<Store>, tokens: Arc<dyn TokenSource>, interval: Duration) -> Self {
        Self {
            store,
            tokens,
            interval,
            job: Mutex::new(None),
            next_run: Arc::new(StdMutex::new(None)),
        }
    }

    /// Starts the periodic task. The first run fires one full interval out,
    /// not immediately; startup already performs its own sync. Starting an
    /// already-running scheduler is a logged no-op.
    pub async fn start(&self) {
        let mut job = self.job.lock().await;
        if job.is_some() {
            warn!("scheduler already running");
            return;
        }

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let store = Arc::clone(&self.store);
        let tokens = Arc::clone(&self.tokens);
        let interval = self.interval;
        let next_run = Arc::clone(&self.next_run);

        *next_run.lock().unwrap() = Some(Utc::now() + period_delta(interval));

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        sync_all_projects(&store, tokens.as_ref()).await;
                        *next_run.lock().unwrap() = Some(Utc::now() + period_delta(interval));
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        });

        *job = Some(RunningJob { shutdown, handle });
        info!(interval_secs = self.interval.as_secs(), "scheduler started");
    }

    /// Stops the periodic task. Stopping a stopped scheduler is a logged
    /// no-op.
    pub async fn stop(&self) {
        let mut job = self.job.lock().await;
        match job.take() {
            Some(running) => {
                let _ = running.shutdown.send(true);
                running.handle.abort();
                *self.next_run.lock().unwrap() = None;
                info!("scheduler stopped");
            }
            None => warn!("scheduler not running"),
        }
    }

    pub async fn status(&self) -> SchedulerStatus {
        let running = self.job.lock().await.is_some();
        SchedulerStatus {
            running,
            next_run: if running {
                *self.next_run.lock().unwrap()
            } else {
                None
            },
        }
    }
}

fn period_delta(interval: Duration) -> chrono::Duration {
    chrono::Duration::from_std(interval).unwrap_or_else(|_| chrono::Duration::zero())
}

/// One pass over every registered board. Per-board failures are logged and
/// swallowed.
pub async fn sync_all_projects(store: &Store, tokens: &dyn TokenSource) {
    let projects = match store.list_projects().await {
        Ok(projects) => projects,
        Err(error) => {
            warn!(%error, "could not list projects for scheduled sync");
            return;
        }
    };

    for project in projects {
        let result = async {
            let token = tokens.token(&project.tenant).await?;
            let client = GithubClient::new(&token)?;
            sync::sync_project(store, &client, &project).await
        }
        .await;

        match result {
            Ok(items) => info!(
                owner = project.owner_login,
                number = project.project_number,
                items,
                "scheduled sync complete"
            ),
            Err(error) => warn!(
                owner = project.owner_login,
                number = project.project_number,
                %error,
                "scheduled sync failed"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::ConfigTokens;

    fn scheduler() -> Scheduler {
        Scheduler::new(
            Arc::new(Store::open_in_memory().unwrap()),
            Arc::new(ConfigTokens::new(&[])),
            Duration::from_secs(900),
        )
    }

    #[tokio::test]
    async fn status_reflects_the_lifecycle() {
        let scheduler = scheduler();
        let status = scheduler.status().await;
        assert!(!status.running);
        assert!(status.next_run.is_none());

        scheduler.start().await;
        let status = scheduler.status().await;
        assert!(status.running);
        assert!(status.next_run.unwrap() > Utc::now());

        scheduler.stop().await;
        let status = scheduler.status().await;
        assert!(!status.running);
        assert!(status.next_run.is_none());
    }

    #[tokio::test]
    async fn double_start_and_double_stop_are_no_ops() {
        let scheduler = scheduler();
        scheduler.start().await;
        scheduler.start().await;
        assert!(scheduler.status().await.running);

        scheduler.stop().await;
        scheduler.stop().await;
        assert!(!scheduler.status().await.running);
    }

    #[tokio::test]
    async fn restart_after_stop_works() {
        let scheduler = scheduler();
        scheduler.start().await;
        scheduler.stop().await;
        scheduler.start().await;
        assert!(scheduler.status().await.running);
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn sync_pass_with_no_projects_is_quiet() {
        let store = Store::open_in_memory().unwrap();
        let tokens = ConfigTokens::new(&[]);
        sync_all_projects(&store, &tokens).await;
    }
}
