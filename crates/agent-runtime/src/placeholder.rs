//! Placeholder handlers: task body logic is out of scope here. These exist
//! so the dispatcher has something registered for every worker type and can
//! be exercised end-to-end; real handlers replace them without touching the
//! scheduler, dispatcher, or supervisor.

use std::sync::Arc;

use adno_agent_core::model::{AgentTask, WorkerType};
use async_trait::async_trait;

use crate::handler::{HandlerContext, HandlerError, HandlerRegistry, TaskHandler};

struct NoopHandler;

#[async_trait]
impl TaskHandler for NoopHandler {
    async fn handle(
        &self,
        task: AgentTask,
        ctx: HandlerContext,
    ) -> Result<serde_json::Value, HandlerError> {
        if ctx.cancellation.is_cancelled() {
            tracing::debug!(task_id = %task.id, "placeholder handler observed a tripped cancellation token");
        }
        Ok(serde_json::json!({}))
    }
}

/// A registry with a no-op handler bound to every recognized worker type.
pub fn noop_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    for worker_type in WorkerType::ALL {
        registry.register(worker_type, Arc::new(NoopHandler));
    }
    registry
}
