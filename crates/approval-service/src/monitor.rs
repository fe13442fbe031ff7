//! Build-completion monitor.
//!
//! After an assembly creates a new repo, the provider builds the image on
//! its own schedule. One driver task per request polls the repo's build
//! history until a qualifying build appears, then fires the completion
//! handler exactly once and retires itself.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chainctl_gateway::{BuildRecord, BuildResult, BuildTool, GatewayError};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::models::{Request, RequestStatus, RequestUpdate};
use crate::store::RequestStore;

/// Called at most once, when the monitored repo produces a successful
/// build newer than the monitoring start.
pub type CompletionHandler = Box<dyn FnOnce(Request, BuildRecord) + Send + 'static>;

/// Timing for monitor tasks: one early check, then a fixed interval
/// between checks, with a hard stop.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub initial_delay: Duration,
    pub poll_interval: Duration,
    pub max_duration: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2 * 60),
            poll_interval: Duration::from_secs(5 * 60),
            max_duration: Duration::from_secs(24 * 60 * 60),
        }
    }
}

struct MonitorTask {
    repo_name: String,
    handle: JoinHandle<()>,
}

enum TickOutcome {
    Continue,
    Done,
}

/// Watches repositories for build completion, one task per request.
pub struct BuildMonitor {
    tool: Arc<dyn BuildTool>,
    store: Arc<dyn RequestStore>,
    config: MonitorConfig,
    tasks: Mutex<HashMap<String, MonitorTask>>,
}

impl BuildMonitor {
    pub fn new(tool: Arc<dyn BuildTool>, store: Arc<dyn RequestStore>, config: MonitorConfig) -> Self {
        Self {
            tool,
            store,
            config,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Start watching `repo_name` for a build completing after now.
    ///
    /// A request has at most one monitor task: starting again for the same
    /// request cancels the previous task before installing the new one.
    pub async fn start_monitoring(
        self: &Arc<Self>,
        request_id: &str,
        repo_name: &str,
        on_complete: CompletionHandler,
    ) {
        let started_at = Utc::now();
        let mut tasks = self.tasks.lock().await;
        if let Some(previous) = tasks.remove(request_id) {
            info!(
                "Replacing monitor for request {} (was watching {})",
                request_id, previous.repo_name
            );
            previous.handle.abort();
        }

        info!(
            "Monitoring builds for request {} on repo {} (first check in {:?})",
            request_id, repo_name, self.config.initial_delay
        );
        let handle = {
            let monitor = Arc::clone(self);
            let request_id = request_id.to_string();
            let repo_name = repo_name.to_string();
            tokio::spawn(async move {
                monitor
                    .run_task(request_id, repo_name, started_at, on_complete)
                    .await;
            })
        };
        tasks.insert(
            request_id.to_string(),
            MonitorTask {
                repo_name: repo_name.to_string(),
                handle,
            },
        );
    }

    /// Cancel one request's monitor. Safe to call repeatedly.
    pub async fn stop_monitoring(&self, request_id: &str) {
        if let Some(task) = self.tasks.lock().await.remove(request_id) {
            task.handle.abort();
            info!("Stopped monitoring request {}", request_id);
        }
    }

    /// Cancel every monitor task, for shutdown.
    pub async fn stop_all(&self) {
        let mut tasks = self.tasks.lock().await;
        for (request_id, task) in tasks.drain() {
            task.handle.abort();
            info!("Stopped monitoring request {}", request_id);
        }
    }

    pub async fn is_monitoring(&self, request_id: &str) -> bool {
        self.tasks.lock().await.contains_key(request_id)
    }

    pub async fn active_count(&self) -> usize {
        self.tasks.lock().await.len()
    }

    async fn run_task(
        self: Arc<Self>,
        request_id: String,
        repo_name: String,
        started_at: DateTime<Utc>,
        on_complete: CompletionHandler,
    ) {
        let start = Instant::now();
        let deadline = start + self.config.max_duration;
        let mut on_complete = Some(on_complete);
        let mut next_check = start + self.config.initial_delay;

        loop {
            if next_check >= deadline {
                info!(
                    "Monitoring window elapsed for request {} without a completed build",
                    request_id
                );
                break;
            }
            tokio::time::sleep_until(next_check).await;

            match self
                .check_for_new_builds(&request_id, &repo_name, started_at, &mut on_complete)
                .await
            {
                Ok(TickOutcome::Continue) => {}
                Ok(TickOutcome::Done) => return,
                Err(e) => {
                    // Keep polling; listing failures are usually transient
                    error!("Error checking builds for {}: {:#}", request_id, e);
                }
            }

            next_check += self.config.poll_interval;
        }

        self.remove_task(&request_id).await;
    }

    async fn check_for_new_builds(
        &self,
        request_id: &str,
        repo_name: &str,
        started_at: DateTime<Utc>,
        on_complete: &mut Option<CompletionHandler>,
    ) -> Result<TickOutcome, GatewayError> {
        // A vanished or already-complete request means nobody is waiting.
        let Ok(request) = self.store.get(request_id).await else {
            info!("Request {} no longer exists, stopping monitor", request_id);
            self.remove_task(request_id).await;
            return Ok(TickOutcome::Done);
        };
        if request.status == RequestStatus::BuildComplete {
            self.remove_task(request_id).await;
            return Ok(TickOutcome::Done);
        }

        debug!("Checking for new builds on {}", repo_name);
        let builds = self.tool.list_builds(repo_name).await?;

        let mut qualifying: Vec<BuildRecord> = builds
            .into_iter()
            .filter(|b| b.result == BuildResult::Success)
            .filter(|b| b.completion_time.is_some_and(|t| t > started_at))
            .collect();
        if qualifying.is_empty() {
            debug!("No new builds yet for {}", repo_name);
            return Ok(TickOutcome::Continue);
        }

        // Latest completion wins; the tool's listing order is unspecified
        qualifying.sort_by(|a, b| b.completion_time.cmp(&a.completion_time));
        let build = qualifying.remove(0);

        info!(
            "Build completed for request {} on repo {} at {:?}",
            request_id, repo_name, build.completion_time
        );
        let updated = match self
            .store
            .update(
                request_id,
                RequestUpdate {
                    status: Some(RequestStatus::BuildComplete),
                    build_completed_at: build.completion_time,
                    ..Default::default()
                },
            )
            .await
        {
            Ok(updated) => updated,
            Err(e) => {
                info!("Request {} vanished mid-update: {}", request_id, e);
                self.remove_task(request_id).await;
                return Ok(TickOutcome::Done);
            }
        };

        if let Some(handler) = on_complete.take() {
            handler(updated, build);
        }
        self.remove_task(request_id).await;
        Ok(TickOutcome::Done)
    }

    async fn remove_task(&self, request_id: &str) {
        self.tasks.lock().await.remove(request_id);
    }
}
