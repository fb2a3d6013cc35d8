//! Handler registry: map a worker-type tag to a task-handler capability.
//!
//! Task body logic is out of scope here; this module only defines the seam
//! and a registry built once at startup.

use std::collections::HashMap;
use std::sync::Arc;

use adno_agent_client::ControlPlaneClient;
use adno_agent_core::model::{AgentConfig, AgentTask, WorkerType, WorkspaceConfig};
use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct HandlerError(String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        HandlerError(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        HandlerError(format!("{err:#}"))
    }
}

/// Everything a handler invocation needs besides the task itself: the current
/// config snapshot, workspace credentials, a control-plane client reference
/// for handlers that need to create follow-up tasks, and the cancellation
/// token for this specific execution.
#[derive(Clone)]
pub struct HandlerContext {
    pub agent_config: Arc<AgentConfig>,
    pub workspace_config: Arc<WorkspaceConfig>,
    pub control_plane: Arc<ControlPlaneClient>,
    pub cancellation: CancellationToken,
}

/// "Given a task and a context bundle, produce a result object or fail."
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(
        &self,
        task: AgentTask,
        ctx: HandlerContext,
    ) -> Result<serde_json::Value, HandlerError>;
}

/// Registry mutations are startup-only; lookups happen on every claimed task.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<WorkerType, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        HandlerRegistry::default()
    }

    pub fn register(&mut self, worker_type: WorkerType, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(worker_type, handler);
    }

    pub fn get(&self, worker_type: WorkerType) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(&worker_type).cloned()
    }
}
