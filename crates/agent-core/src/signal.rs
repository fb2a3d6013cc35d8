//! Out-of-band events posted to the control plane.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalCategory {
    Lifecycle,
    Log,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalSeverity {
    Debug,
    Info,
    Warn,
    Error,
}

/// A single event in the signal stream: `agent_starting`, `heartbeat`,
/// `task_started`, `task_completed`, `task_failed`, `agent_stopping`, or an
/// application log line (`category = log`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub category: SignalCategory,
    #[serde(rename = "type")]
    pub signal_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<SignalSeverity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl Signal {
    pub fn lifecycle(signal_type: impl Into<String>, payload: Option<serde_json::Value>) -> Self {
        Self::lifecycle_with_severity(signal_type, payload, None)
    }

    /// Like [`Signal::lifecycle`], but for lifecycle events that carry their
    /// own severity — `task_failed` is reported at `error`, for instance,
    /// while `task_started`/`task_completed` carry none.
    pub fn lifecycle_with_severity(
        signal_type: impl Into<String>,
        payload: Option<serde_json::Value>,
        severity: Option<SignalSeverity>,
    ) -> Self {
        Signal {
            category: SignalCategory::Lifecycle,
            signal_type: signal_type.into(),
            severity,
            message: None,
            payload,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn log(severity: SignalSeverity, message: impl Into<String>) -> Self {
        Signal {
            category: SignalCategory::Log,
            signal_type: "log".to_string(),
            severity: Some(severity),
            message: Some(message.into()),
            payload: None,
            timestamp: chrono::Utc::now(),
        }
    }
}
