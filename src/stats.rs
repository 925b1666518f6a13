// ABOUTME: Capability invocation statistics behind an injected store interface
// ABOUTME: In-memory default with synchronized read-modify-write, swappable by callers

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Running history for one capability across runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapabilityStats {
    pub invocations: u64,
    pub successes: u64,
    pub failures: u64,
    pub total_elapsed: Duration,
}

impl CapabilityStats {
    pub fn success_rate(&self) -> f64 {
        if self.invocations == 0 {
            0.0
        } else {
            self.successes as f64 / self.invocations as f64
        }
    }

    pub fn avg_elapsed(&self) -> Duration {
        if self.invocations == 0 {
            Duration::ZERO
        } else {
            self.total_elapsed / self.invocations as u32
        }
    }
}

/// Store for capability invocation outcomes. Injected into the engine so the
/// backing state is explicit; callers may supply a persistent implementation.
#[async_trait]
pub trait StatsStore: Send + Sync {
    async fn record_invocation(&self, capability: &str, succeeded: bool, elapsed: Duration);

    async fn capability_stats(&self, capability: &str) -> Option<CapabilityStats>;

    async fn snapshot(&self) -> HashMap<String, CapabilityStats>;
}

/// Default store. All mutation happens under a single write guard, so
/// concurrent step completions cannot lose updates.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStatsStore {
    inner: Arc<RwLock<HashMap<String, CapabilityStats>>>,
}

impl InMemoryStatsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatsStore for InMemoryStatsStore {
    async fn record_invocation(&self, capability: &str, succeeded: bool, elapsed: Duration) {
        let mut stats = self.inner.write().await;
        let entry = stats.entry(capability.to_string()).or_default();
        entry.invocations += 1;
        if succeeded {
            entry.successes += 1;
        } else {
            entry.failures += 1;
        }
        entry.total_elapsed += elapsed;
    }

    async fn capability_stats(&self, capability: &str) -> Option<CapabilityStats> {
        self.inner.read().await.get(capability).cloned()
    }

    async fn snapshot(&self) -> HashMap<String, CapabilityStats> {
        self.inner.read().await.clone()
    }
}
