//! Configuration, task, and workspace shapes exchanged with the control plane.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One of the five recognized worker-type tags.
///
/// `Fetcher`, `Logger`, and `Maintain` are scheduled: the runtime owns a
/// periodic `createTask` loop for each. `Suggestion` and `Apply` are
/// event-driven: tasks for them are created by other producers and only ever
/// pulled off the queue by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerType {
    Fetcher,
    Suggestion,
    Apply,
    Logger,
    Maintain,
}

impl WorkerType {
    /// All recognized tags, in a stable order used for deterministic iteration
    /// (e.g. when reconciling schedulers on a config change).
    pub const ALL: [WorkerType; 5] = [
        WorkerType::Fetcher,
        WorkerType::Suggestion,
        WorkerType::Apply,
        WorkerType::Logger,
        WorkerType::Maintain,
    ];

    /// Whether this worker type has its own periodic task-creation scheduler,
    /// as opposed to being driven purely by externally created tasks.
    pub fn is_scheduled(self) -> bool {
        matches!(
            self,
            WorkerType::Fetcher | WorkerType::Logger | WorkerType::Maintain
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkerType::Fetcher => "fetcher",
            WorkerType::Suggestion => "suggestion",
            WorkerType::Apply => "apply",
            WorkerType::Logger => "logger",
            WorkerType::Maintain => "maintain",
        }
    }
}

impl std::fmt::Display for WorkerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-worker-type settings. `schedule_interval_ms` is only meaningful for
/// [`WorkerType::is_scheduled`] types; the runtime ignores it otherwise.
/// `extra` carries worker-specific fields (log level, retention days, batch
/// cap, …) that are opaque to the runtime and forwarded to handlers untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSettings {
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_interval_ms: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl WorkerSettings {
    pub fn disabled() -> Self {
        WorkerSettings {
            enabled: false,
            schedule_interval_ms: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// Server-authored update advisory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub recommended_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default)]
    pub required: bool,
}

/// Server-authored, versioned, immutable-per-version configuration.
/// `version` inequality, not ordering, is what the runtime treats as
/// "changed" — the server's version string is opaque to us.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub version: String,
    pub heartbeat_interval_ms: u64,
    pub task_poll_interval_ms: u64,
    pub max_concurrent_tasks: u32,
    pub workers: HashMap<WorkerType, WorkerSettings>,
    #[serde(default)]
    pub limits: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_info: Option<VersionInfo>,
}

impl AgentConfig {
    pub fn worker(&self, ty: WorkerType) -> WorkerSettings {
        self.workers
            .get(&ty)
            .cloned()
            .unwrap_or_else(WorkerSettings::disabled)
    }
}

/// Credentials and endpoints for external systems handlers use. Opaque to the
/// runtime past being loaded once at startup and handed to every handler
/// invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Task priority — higher is more urgent. The control plane is expected to
/// sort by priority server-side; the runtime never reorders tasks it
/// receives from `getTasks`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskPriority(pub i32);

impl TaskPriority {
    pub const NORMAL: TaskPriority = TaskPriority(0);
}

impl Default for TaskPriority {
    fn default() -> Self {
        TaskPriority::NORMAL
    }
}

/// A task as seen by the runtime: an opaque id, a worker-type tag, and an
/// opaque payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTask {
    pub id: String,
    #[serde(rename = "type")]
    pub task_type: WorkerType,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub priority: TaskPriority,
    pub scheduled_at: chrono::DateTime<chrono::Utc>,
}
