//! Typed control-plane operations and the config version store backing them.

pub mod client;
pub mod error;
pub mod version;

pub use client::{ControlPlaneClient, CreateTaskResult, GetTasksResult, TaskCreationStatus};
pub use error::ClientError;
pub use version::ConfigVersionStore;
