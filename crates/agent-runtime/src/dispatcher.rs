//! Task dispatcher: poll, claim, execute under a concurrency cap, and report
//! outcomes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use adno_agent_client::{ClientError, ControlPlaneClient};
use adno_agent_core::model::{AgentConfig, AgentTask, WorkspaceConfig};
use adno_agent_core::signal::{Signal, SignalSeverity};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::handler::{HandlerContext, HandlerRegistry};

/// Outcome of one poll tick, used by the supervisor to drive backoff.
pub enum PollOutcome {
    /// `getTasks` succeeded (even if it claimed zero tasks — an at-capacity
    /// tick is still a success for backoff purposes).
    Success { piggyback_config: Option<AgentConfig> },
    Failed(ClientError),
}

struct InFlightGuard {
    id: String,
    set: Arc<Mutex<HashMap<String, CancellationToken>>>,
    notify: Arc<Notify>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.lock().unwrap().remove(&self.id);
        self.notify.notify_waiters();
    }
}

pub struct Dispatcher {
    client: Arc<ControlPlaneClient>,
    registry: Arc<HandlerRegistry>,
    in_flight: Arc<Mutex<HashMap<String, CancellationToken>>>,
    drained: Arc<Notify>,
}

impl Dispatcher {
    pub fn new(client: Arc<ControlPlaneClient>, registry: Arc<HandlerRegistry>) -> Self {
        Dispatcher {
            client,
            registry,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            drained: Arc::new(Notify::new()),
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().unwrap().len()
    }

    /// One poll tick: fetch up to `available` tasks and spawn each as an
    /// independent concurrent execution. Admission beyond `available` is the
    /// caller's responsibility — the dispatcher never exceeds the capacity
    /// it was handed.
    pub async fn poll_once(
        &self,
        agent_config: Arc<AgentConfig>,
        workspace_config: Arc<WorkspaceConfig>,
    ) -> PollOutcome {
        let cap = agent_config.max_concurrent_tasks as usize;
        let available = cap.saturating_sub(self.in_flight_count());
        if available == 0 {
            return PollOutcome::Success {
                piggyback_config: None,
            };
        }

        match self.client.get_tasks(available as u32).await {
            Ok(result) => {
                let piggyback_config = result.config;
                for task in result.tasks.into_iter().take(available) {
                    self.spawn_execution(task, agent_config.clone(), workspace_config.clone());
                }
                PollOutcome::Success { piggyback_config }
            }
            Err(err) => PollOutcome::Failed(err),
        }
    }

    fn spawn_execution(
        &self,
        task: AgentTask,
        agent_config: Arc<AgentConfig>,
        workspace_config: Arc<WorkspaceConfig>,
    ) {
        let client = self.client.clone();
        let registry = self.registry.clone();
        let in_flight = self.in_flight.clone();
        let drained = self.drained.clone();

        tokio::spawn(async move {
            let task_id = task.id.clone();
            let task_type = task.task_type;

            let claimed = match client.claim_task(&task_id).await {
                Ok(Some(claimed)) => claimed,
                Ok(None) => return, // another agent claimed it first
                Err(err) => {
                    tracing::warn!(task_id = %task_id, error = %err, "claimTask failed");
                    return;
                }
            };

            let token = CancellationToken::new();
            in_flight.lock().unwrap().insert(task_id.clone(), token.clone());
            let _guard = InFlightGuard {
                id: task_id.clone(),
                set: in_flight,
                notify: drained,
            };

            if let Err(err) = client
                .send_signals(&[Signal::lifecycle(
                    "task_started",
                    Some(serde_json::json!({"task_id": task_id, "type": task_type.as_str()})),
                )])
                .await
            {
                tracing::warn!(task_id = %task_id, error = %err, "failed to send task_started signal");
            }

            let Some(handler) = registry.get(task_type) else {
                let message = format!("no handler registered for worker type {task_type}");
                if let Err(err) = client.fail_task(&task_id, &message, true).await {
                    tracing::warn!(task_id = %task_id, error = %err, "failTask failed");
                }
                return;
            };

            let ctx = HandlerContext {
                agent_config,
                workspace_config,
                control_plane: client.clone(),
                cancellation: token.clone(),
            };

            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    report_cancelled(&client, &task_id).await;
                }
                result = handler.handle(claimed, ctx) => {
                    report_finished(&client, &task_id, result).await;
                }
            }
        });
    }
}

async fn report_cancelled(client: &ControlPlaneClient, task_id: &str) {
    if let Err(err) = client
        .fail_task(task_id, "Task cancelled during shutdown", false)
        .await
    {
        tracing::warn!(task_id, error = %err, "failTask (cancellation) failed");
    }
}

async fn report_finished(
    client: &ControlPlaneClient,
    task_id: &str,
    result: Result<serde_json::Value, crate::handler::HandlerError>,
) {
    match result {
        Ok(value) => {
            if let Err(err) = client.complete_task(task_id, &value).await {
                tracing::warn!(task_id, error = %err, "completeTask failed");
            }
            if let Err(err) = client
                .send_signals(&[Signal::lifecycle(
                    "task_completed",
                    Some(serde_json::json!({"task_id": task_id})),
                )])
                .await
            {
                tracing::warn!(task_id, error = %err, "failed to send task_completed signal");
            }
        }
        Err(handler_err) => {
            if let Err(err) = client.fail_task(task_id, handler_err.message(), true).await {
                tracing::warn!(task_id, error = %err, "failTask failed");
            }
            if let Err(err) = client
                .send_signals(&[Signal::lifecycle_with_severity(
                    "task_failed",
                    Some(serde_json::json!({"task_id": task_id, "error": handler_err.message()})),
                    Some(SignalSeverity::Error),
                )])
                .await
            {
                tracing::warn!(task_id, error = %err, "failed to send task_failed signal");
            }
        }
    }
}

impl Dispatcher {
    /// Trip every in-flight task's cancellation token (shutdown step 3).
    pub fn cancel_all(&self) {
        for token in self.in_flight.lock().unwrap().values() {
            token.cancel();
        }
    }

    /// Wait until the in-flight set is empty or `deadline` elapses. Returns
    /// the remaining in-flight ids if the deadline won (shutdown step 4).
    pub async fn wait_for_drain(&self, deadline: Duration) -> Vec<String> {
        let started = Instant::now();
        loop {
            {
                let guard = self.in_flight.lock().unwrap();
                if guard.is_empty() {
                    return Vec::new();
                }
                let elapsed = started.elapsed();
                if elapsed >= deadline {
                    return guard.keys().cloned().collect();
                }
            }
            let remaining = deadline.saturating_sub(started.elapsed());
            tokio::select! {
                _ = self.drained.notified() => {}
                _ = tokio::time::sleep(remaining) => {}
            }
        }
    }
}
