//! Runtime supervisor: start/stop, config application, interval
//! reconciliation, heartbeat, backoff coordination, and graceful shutdown.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use adno_agent_client::{ClientError, ControlPlaneClient};
use adno_agent_core::model::{AgentConfig, WorkspaceConfig};
use adno_agent_core::signal::Signal;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::dispatcher::{Dispatcher, PollOutcome};
use crate::scheduler::SchedulerSet;

const SHUTDOWN_DRAIN_DEADLINE: Duration = Duration::from_secs(30);
const POLL_BACKOFF_CEILING_MS: u64 = 3_600_000;

struct TimerHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

async fn stop_timer(handle: Option<TimerHandle>) {
    if let Some(handle) = handle {
        handle.cancel.cancel();
        let _ = handle.join.await;
    }
}

pub struct Supervisor {
    client: Arc<ControlPlaneClient>,
    dispatcher: Arc<Dispatcher>,
    schedulers: Arc<SchedulerSet>,
    agent_config: RwLock<Option<Arc<AgentConfig>>>,
    workspace_config: RwLock<Option<Arc<WorkspaceConfig>>>,
    apply_lock: Mutex<()>,
    shutting_down: AtomicBool,
    base_poll_interval_ms: AtomicU64,
    current_poll_interval_ms: AtomicU64,
    consecutive_polling_failures: AtomicU32,
    heartbeat_timer: Mutex<Option<TimerHandle>>,
    poll_timer: Mutex<Option<TimerHandle>>,
    /// Wakes the poll loop when `current_poll_interval_ms` changes so a
    /// piggybacked interval or a backoff adjustment takes effect on the next
    /// wait rather than the one after. The poll loop's own task is the one
    /// that most often triggers this (a piggybacked config arrives mid-poll),
    /// so reconciliation must not require that task to join itself.
    poll_interval_changed: Notify,
    started_at: Instant,
}

impl Supervisor {
    pub fn new(
        client: Arc<ControlPlaneClient>,
        dispatcher: Arc<Dispatcher>,
        schedulers: Arc<SchedulerSet>,
    ) -> Arc<Self> {
        Arc::new(Supervisor {
            client,
            dispatcher,
            schedulers,
            agent_config: RwLock::new(None),
            workspace_config: RwLock::new(None),
            apply_lock: Mutex::new(()),
            shutting_down: AtomicBool::new(false),
            base_poll_interval_ms: AtomicU64::new(0),
            current_poll_interval_ms: AtomicU64::new(0),
            consecutive_polling_failures: AtomicU32::new(0),
            heartbeat_timer: Mutex::new(None),
            poll_timer: Mutex::new(None),
            poll_interval_changed: Notify::new(),
            started_at: Instant::now(),
        })
    }

    pub async fn config(&self) -> Arc<AgentConfig> {
        self.agent_config
            .read()
            .await
            .clone()
            .expect("config() called before start() completed")
    }

    async fn workspace_config_snapshot(&self) -> Arc<WorkspaceConfig> {
        self.workspace_config
            .read()
            .await
            .clone()
            .expect("workspace config read before start() completed")
    }

    /// (1) authenticate; (2) load workspace config; (3) load initial config
    /// and apply it; (4) send `agent_starting`; (5) start heartbeat, task
    /// poll, and worker schedulers. `workspace_overrides` carries the
    /// process's own environment-sourced credentials; they are merged into
    /// the server-delivered workspace config and take precedence over
    /// same-named fields.
    pub async fn start(
        self: &Arc<Self>,
        workspace_overrides: serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), ClientError> {
        self.client.authenticate().await?;

        let mut workspace_config = self.client.get_workspace_config().await?;
        workspace_config.fields.extend(workspace_overrides);
        *self.workspace_config.write().await = Some(Arc::new(workspace_config));

        let config = self.client.get_config().await?;
        self.apply_config(config, true).await;

        if let Err(err) = self
            .client
            .send_signals(&[Signal::lifecycle("agent_starting", None)])
            .await
        {
            tracing::warn!(error = %err, "failed to send agent_starting signal");
        }

        let config = self.config().await;
        self.set_heartbeat_timer(config.heartbeat_interval_ms).await;
        self.spawn_poll_timer().await;

        Ok(())
    }

    /// Replace the current config and reconcile schedulers/timers. `initial`
    /// suppresses interval-change detection on the very first load, since no
    /// timers are running yet to reconcile.
    pub async fn apply_config(self: &Arc<Self>, config: AgentConfig, initial: bool) {
        let _guard = self.apply_lock.lock().await;

        if let Some(info) = &config.version_info {
            if info.required && info.recommended_version != env!("CARGO_PKG_VERSION") {
                tracing::warn!(
                    recommended = %info.recommended_version,
                    running = env!("CARGO_PKG_VERSION"),
                    "a required agent update is available"
                );
            }
        }

        let previous = self.agent_config.read().await.clone();
        let new_config = Arc::new(config);
        self.base_poll_interval_ms
            .store(new_config.task_poll_interval_ms, Ordering::SeqCst);
        if initial {
            self.current_poll_interval_ms
                .store(new_config.task_poll_interval_ms, Ordering::SeqCst);
        }

        *self.agent_config.write().await = Some(new_config.clone());
        self.schedulers.reconcile(&new_config).await;

        if let Some(previous) = previous {
            if previous.heartbeat_interval_ms != new_config.heartbeat_interval_ms {
                self.set_heartbeat_timer(new_config.heartbeat_interval_ms)
                    .await;
            }
            if previous.task_poll_interval_ms != new_config.task_poll_interval_ms {
                self.consecutive_polling_failures.store(0, Ordering::SeqCst);
                self.restart_poll_interval(new_config.task_poll_interval_ms);
            }
        }
    }

    async fn set_heartbeat_timer(self: &Arc<Self>, interval_ms: u64) {
        let mut slot = self.heartbeat_timer.lock().await;
        stop_timer(slot.take()).await;
        let cancel = CancellationToken::new();
        let supervisor = self.clone();
        let task_cancel = cancel.clone();
        let join = tokio::spawn(async move {
            run_heartbeat_loop(supervisor, interval_ms, task_cancel).await;
        });
        *slot = Some(TimerHandle { cancel, join });
    }

    /// Spawns the poll loop task once, at startup. The loop reads
    /// `current_poll_interval_ms` on every iteration, so later interval
    /// changes go through [`Self::restart_poll_interval`] instead of
    /// respawning this task.
    async fn spawn_poll_timer(self: &Arc<Self>) {
        let mut slot = self.poll_timer.lock().await;
        stop_timer(slot.take()).await;
        let cancel = CancellationToken::new();
        let supervisor = self.clone();
        let task_cancel = cancel.clone();
        let join = tokio::spawn(async move {
            run_poll_loop(supervisor, task_cancel).await;
        });
        *slot = Some(TimerHandle { cancel, join });
    }

    /// Updates the interval the poll loop waits on and wakes it immediately,
    /// without touching the loop task itself. Safe to call from inside the
    /// poll loop's own task (a piggybacked config is discovered there), which
    /// `spawn_poll_timer`'s join-on-respawn is not.
    fn restart_poll_interval(&self, interval_ms: u64) {
        self.current_poll_interval_ms.store(interval_ms, Ordering::SeqCst);
        self.poll_interval_changed.notify_one();
    }

    async fn send_heartbeat(self: &Arc<Self>) {
        let config = self.config().await;
        let payload = serde_json::json!({
            "version": config.version,
            "in_flight": self.dispatcher.in_flight_count(),
            "max_concurrent_tasks": config.max_concurrent_tasks,
            "uptime_secs": self.started_at.elapsed().as_secs(),
            "memory": memory_usage(),
        });
        if let Err(err) = self
            .client
            .send_signals(&[Signal::lifecycle("heartbeat", Some(payload))])
            .await
        {
            tracing::warn!(error = %err, "failed to send heartbeat signal");
        }
    }

    async fn poll_once(self: &Arc<Self>) {
        let config = self.config().await;
        let workspace_config = self.workspace_config_snapshot().await;
        match self.dispatcher.poll_once(config, workspace_config).await {
            PollOutcome::Success { piggyback_config } => {
                self.reset_polling_backoff().await;
                if let Some(config) = piggyback_config {
                    self.apply_config(config, false).await;
                }
            }
            PollOutcome::Failed(err) => {
                tracing::warn!(error = %err, "getTasks failed");
                self.bump_polling_backoff().await;
            }
        }
    }

    /// After N consecutive failures, restart the poll timer at
    /// `min(base * 2^N, 1h)`.
    async fn bump_polling_backoff(self: &Arc<Self>) {
        let failures = self.consecutive_polling_failures.fetch_add(1, Ordering::SeqCst) + 1;
        let base = self.base_poll_interval_ms.load(Ordering::SeqCst);
        let mut backoff_ms = base.max(1);
        for _ in 0..failures {
            if backoff_ms >= POLL_BACKOFF_CEILING_MS {
                backoff_ms = POLL_BACKOFF_CEILING_MS;
                break;
            }
            backoff_ms = backoff_ms.saturating_mul(2);
        }
        backoff_ms = backoff_ms.min(POLL_BACKOFF_CEILING_MS);
        self.restart_poll_interval(backoff_ms);
    }

    async fn reset_polling_backoff(self: &Arc<Self>) {
        let had_failures = self.consecutive_polling_failures.swap(0, Ordering::SeqCst) > 0;
        if had_failures {
            let base = self.base_poll_interval_ms.load(Ordering::SeqCst);
            self.restart_poll_interval(base);
        }
    }

    /// Idempotent: a shutdown already in progress returns immediately.
    pub async fn shutdown(self: &Arc<Self>) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }

        stop_timer(self.heartbeat_timer.lock().await.take()).await;
        stop_timer(self.poll_timer.lock().await.take()).await;
        self.schedulers.stop_all().await;

        self.dispatcher.cancel_all();
        let remaining = self.dispatcher.wait_for_drain(SHUTDOWN_DRAIN_DEADLINE).await;
        if !remaining.is_empty() {
            tracing::warn!(ids = ?remaining, "shutdown deadline elapsed with tasks still in flight");
        }

        let in_flight = self.dispatcher.in_flight_count();
        if let Err(err) = self
            .client
            .send_signals(&[Signal::lifecycle(
                "agent_stopping",
                Some(serde_json::json!({"in_flight": in_flight})),
            )])
            .await
        {
            tracing::warn!(error = %err, "failed to send agent_stopping signal");
        }
    }
}

async fn run_heartbeat_loop(supervisor: Arc<Supervisor>, interval_ms: u64, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if cancel.is_cancelled() {
                    break;
                }
                supervisor.send_heartbeat().await;
            }
            _ = cancel.cancelled() => break,
        }
    }
}

/// Unlike the heartbeat loop, this one reads its own wait interval from
/// `supervisor.current_poll_interval_ms` on every iteration rather than
/// capturing a fixed duration at spawn time. `poll_once` (run inline below,
/// in this very task) can change that interval via a piggybacked config or
/// a backoff adjustment; re-reading it here lets the change take effect
/// without this task ever needing to await its own `JoinHandle`.
async fn run_poll_loop(supervisor: Arc<Supervisor>, cancel: CancellationToken) {
    loop {
        let interval_ms = supervisor.current_poll_interval_ms.load(Ordering::SeqCst).max(1);
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(interval_ms)) => {}
            _ = supervisor.poll_interval_changed.notified() => continue,
            _ = cancel.cancelled() => break,
        }
        if cancel.is_cancelled() {
            break;
        }
        supervisor.poll_once().await;
    }
}

#[cfg(target_os = "linux")]
fn memory_usage() -> serde_json::Value {
    match read_resident_set_bytes() {
        Some(bytes) => serde_json::json!({ "resident_bytes": bytes }),
        None => serde_json::json!({}),
    }
}

#[cfg(not(target_os = "linux"))]
fn memory_usage() -> serde_json::Value {
    serde_json::json!({})
}

#[cfg(target_os = "linux")]
fn read_resident_set_bytes() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let resident_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(resident_pages.saturating_mul(4096))
}
