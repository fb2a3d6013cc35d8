//! Worker schedulers: one periodic task-creation loop per scheduled worker
//! type.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use adno_agent_client::{ControlPlaneClient, TaskCreationStatus};
use adno_agent_core::model::{AgentConfig, TaskPriority, WorkerType};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct RunningScheduler {
    interval_ms: u64,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

/// Owns at most one active scheduler per scheduled worker type.
pub struct SchedulerSet {
    client: Arc<ControlPlaneClient>,
    running: Mutex<HashMap<WorkerType, RunningScheduler>>,
}

impl SchedulerSet {
    pub fn new(client: Arc<ControlPlaneClient>) -> Self {
        SchedulerSet {
            client,
            running: Mutex::new(HashMap::new()),
        }
    }

    /// Apply the start/stop/restart rules for every scheduled worker type
    /// against `config`. Safe to call with the same config repeatedly:
    /// unchanged worker types are left untouched.
    pub async fn reconcile(&self, config: &AgentConfig) {
        let mut running = self.running.lock().await;
        for worker_type in WorkerType::ALL.into_iter().filter(|w| w.is_scheduled()) {
            let settings = config.worker(worker_type);
            let desired_interval = settings.schedule_interval_ms;

            match (running.get(&worker_type), settings.enabled, desired_interval) {
                (None, true, Some(interval_ms)) => {
                    let handle = self.spawn(worker_type, interval_ms);
                    running.insert(worker_type, handle);
                }
                (Some(_), false, _) => {
                    if let Some(handle) = running.remove(&worker_type) {
                        Self::stop(handle).await;
                    }
                }
                (Some(current), true, Some(interval_ms)) if current.interval_ms != interval_ms => {
                    if let Some(handle) = running.remove(&worker_type) {
                        Self::stop(handle).await;
                    }
                    let handle = self.spawn(worker_type, interval_ms);
                    running.insert(worker_type, handle);
                }
                _ => {
                    // enabled stayed true with the same interval, or stayed
                    // false while not running: no-op.
                }
            }
        }
    }

    /// Stop every scheduler. Used during shutdown.
    pub async fn stop_all(&self) {
        let mut running = self.running.lock().await;
        for (_, handle) in running.drain() {
            Self::stop(handle).await;
        }
    }

    async fn stop(handle: RunningScheduler) {
        handle.cancel.cancel();
        let _ = handle.join.await;
    }

    fn spawn(&self, worker_type: WorkerType, interval_ms: u64) -> RunningScheduler {
        let cancel = CancellationToken::new();
        let client = self.client.clone();
        let task_cancel = cancel.clone();
        let join = tokio::spawn(async move {
            run_scheduler_loop(client, worker_type, interval_ms, task_cancel).await;
        });
        RunningScheduler {
            interval_ms,
            cancel,
            join,
        }
    }
}

async fn run_scheduler_loop(
    client: Arc<ControlPlaneClient>,
    worker_type: WorkerType,
    interval_ms: u64,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if cancel.is_cancelled() {
                    break;
                }
                create_once(&client, worker_type).await;
            }
            _ = cancel.cancelled() => break,
        }
    }
}

async fn create_once(client: &ControlPlaneClient, worker_type: WorkerType) {
    match client
        .create_task(worker_type, TaskPriority::NORMAL, serde_json::json!({}))
        .await
    {
        Ok(result) => match result.status {
            TaskCreationStatus::Pending => {
                tracing::debug!(worker_type = %worker_type, task_id = %result.task_id, "scheduled task created");
            }
            TaskCreationStatus::AlreadyPending => {
                tracing::debug!(worker_type = %worker_type, "scheduled task already pending");
            }
        },
        Err(err) => {
            tracing::warn!(worker_type = %worker_type, error = %err, "scheduled createTask failed");
        }
    }
}
