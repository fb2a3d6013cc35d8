//! Shared data model and error taxonomy for the agent runtime.
//!
//! Every type here is plain data: no I/O, no scheduling, no retry logic.
//! [`adno_agent_transport`](https://docs.rs/adno-agent-transport) and
//! [`adno_agent_runtime`](https://docs.rs/adno-agent-runtime) build behavior on
//! top of these shapes.

pub mod error;
pub mod model;
pub mod signal;

pub use error::ConfigError;
pub use model::{
    AgentConfig, AgentTask, TaskPriority, VersionInfo, WorkerSettings, WorkspaceConfig,
};
pub use signal::{Signal, SignalCategory, SignalSeverity};
