//! Control-plane client: typed operations against the control plane.

use std::sync::Arc;

use adno_agent_core::model::{AgentConfig, AgentTask, TaskPriority, WorkerType, WorkspaceConfig};
use adno_agent_core::signal::Signal;
use adno_agent_transport::HttpClientChain;
use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::error::ClientError;
use crate::version::ConfigVersionStore;

#[derive(Debug, Serialize)]
struct CreateTaskRequest {
    #[serde(rename = "type")]
    task_type: WorkerType,
    priority: TaskPriority,
    payload: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCreationStatus {
    Pending,
    AlreadyPending,
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskResult {
    pub task_id: String,
    pub status: TaskCreationStatus,
}

#[derive(Debug, Deserialize)]
pub struct GetTasksResult {
    pub tasks: Vec<AgentTask>,
    #[serde(default)]
    pub config: Option<AgentConfig>,
}

#[derive(Debug, Serialize)]
struct FailTaskRequest<'a> {
    error: &'a str,
    retryable: bool,
}

#[derive(Debug, Serialize)]
struct CompleteTaskRequest<'a> {
    result: &'a serde_json::Value,
}

/// Typed operations against the control plane. Every method is issued through
/// the [`HttpClientChain`] and returns a structured result rather than
/// unwinding — the scheduler, dispatcher, and supervisor loops treat a
/// failure as "nothing happened this tick" and log it at the call site.
pub struct ControlPlaneClient {
    chain: Arc<HttpClientChain>,
    versions: Arc<ConfigVersionStore>,
}

impl ControlPlaneClient {
    pub fn new(chain: Arc<HttpClientChain>, versions: Arc<ConfigVersionStore>) -> Self {
        ControlPlaneClient { chain, versions }
    }

    pub fn versions(&self) -> &Arc<ConfigVersionStore> {
        &self.versions
    }

    /// GET `/api/agent/config`. Success means the credential is valid; the
    /// returned version seeds the version store.
    pub async fn authenticate(&self) -> Result<(), ClientError> {
        let config = self.get_config().await?;
        self.versions.set(config.version).await;
        Ok(())
    }

    pub async fn get_config(&self) -> Result<AgentConfig, ClientError> {
        let empty: Option<&()> = None;
        self.chain
            .execute(Method::GET, "api/agent/config", empty)
            .await
            .map_err(ClientError::from)
            .inspect_err(|err| tracing::warn!(error = %err, "getConfig failed"))
    }

    pub async fn get_workspace_config(&self) -> Result<WorkspaceConfig, ClientError> {
        let empty: Option<&()> = None;
        self.chain
            .execute(Method::GET, "api/agent/workspace-config", empty)
            .await
            .map_err(ClientError::from)
            .inspect_err(|err| tracing::warn!(error = %err, "getWorkspaceConfig failed"))
    }

    /// GET `/api/agent/tasks?limit=L&config_version=V`. Piggybacks a fresh
    /// config whenever the server-side version has moved past `V`.
    pub async fn get_tasks(&self, limit: u32) -> Result<GetTasksResult, ClientError> {
        let version = self.versions.get().await.unwrap_or_default();
        let path = format!("api/agent/tasks?limit={limit}&config_version={version}");
        let empty: Option<&()> = None;
        let result: GetTasksResult = self
            .chain
            .execute(Method::GET, &path, empty)
            .await
            .inspect_err(|err| tracing::warn!(error = %err, "getTasks failed"))?;
        if let Some(config) = &result.config {
            tracing::debug!(version = %config.version, "getTasks piggybacked a config update");
            self.versions.set(config.version.clone()).await;
        }
        Ok(result)
    }

    pub async fn create_task(
        &self,
        task_type: WorkerType,
        priority: TaskPriority,
        payload: serde_json::Value,
    ) -> Result<CreateTaskResult, ClientError> {
        let body = CreateTaskRequest {
            task_type,
            priority,
            payload,
        };
        self.chain
            .execute(Method::POST, "api/agent/tasks", Some(&body))
            .await
            .map_err(ClientError::from)
            .inspect_err(|err| tracing::warn!(worker_type = %task_type, error = %err, "createTask failed"))
    }

    /// Returns the task iff the claim succeeded; `Ok(None)` means another
    /// agent claimed it first and is not an error.
    pub async fn claim_task(&self, task_id: &str) -> Result<Option<AgentTask>, ClientError> {
        let empty: Option<&()> = None;
        let path = format!("api/agent/tasks/{task_id}/claim");
        match self
            .chain
            .execute::<AgentTask>(Method::POST, &path, empty)
            .await
        {
            Ok(task) => Ok(Some(task)),
            Err(adno_agent_transport::TransportError::Http { status: 409, .. }) => {
                tracing::debug!(task_id, "claimTask lost the race to another agent");
                Ok(None)
            }
            Err(err) => {
                let err = ClientError::from(err);
                tracing::warn!(task_id, error = %err, "claimTask failed");
                Err(err)
            }
        }
    }

    pub async fn complete_task(
        &self,
        task_id: &str,
        result: &serde_json::Value,
    ) -> Result<(), ClientError> {
        let path = format!("api/agent/tasks/{task_id}/complete");
        let body = CompleteTaskRequest { result };
        self.chain
            .execute_discard(Method::POST, &path, Some(&body))
            .await
            .map_err(ClientError::from)
            .inspect_err(|err| tracing::warn!(task_id, error = %err, "completeTask failed"))
    }

    pub async fn fail_task(
        &self,
        task_id: &str,
        error: &str,
        retryable: bool,
    ) -> Result<(), ClientError> {
        let path = format!("api/agent/tasks/{task_id}/fail");
        let body = FailTaskRequest { error, retryable };
        self.chain
            .execute_discard(Method::POST, &path, Some(&body))
            .await
            .map_err(ClientError::from)
            .inspect_err(|err| tracing::warn!(task_id, error = %err, "failTask failed"))
    }

    pub async fn send_signals(&self, signals: &[Signal]) -> Result<(), ClientError> {
        if signals.is_empty() {
            return Ok(());
        }
        self.chain
            .execute_discard(Method::POST, "api/agent/signal", Some(&signals))
            .await
            .map_err(ClientError::from)
            .inspect_err(|err| tracing::warn!(error = %err, "sendSignals failed"))
    }
}
