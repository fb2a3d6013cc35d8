//! Config version store: the single piece of state the control-plane client
//! owns directly.

use tokio::sync::RwLock;

/// Holds the latest known configuration version identifier. Concurrent
/// read/write from the task poller and the supervisor is safe; version
/// inequality (not ordering) is what "changed" means.
#[derive(Default)]
pub struct ConfigVersionStore {
    version: RwLock<Option<String>>,
}

impl ConfigVersionStore {
    pub fn new() -> Self {
        ConfigVersionStore::default()
    }

    pub async fn get(&self) -> Option<String> {
        self.version.read().await.clone()
    }

    pub async fn set(&self, version: impl Into<String>) {
        *self.version.write().await = Some(version.into());
    }

    /// True if `candidate` differs from the currently known version (a fresh
    /// store with no known version always reports changed).
    pub async fn differs_from(&self, candidate: &str) -> bool {
        self.version.read().await.as_deref() != Some(candidate)
    }
}
