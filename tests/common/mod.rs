// ABOUTME: Common utilities and helpers for integration tests
// ABOUTME: Stub capability handlers and step builders shared across test files

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::time::sleep;

use conductor::{
    BackoffPolicy, CapabilityError, CapabilityRegistry, Payload, StepConfig, WorkflowEngine,
};

/// Builds a registry of deterministic stub capabilities.
pub struct TestRegistryBuilder {
    registry: CapabilityRegistry,
}

impl TestRegistryBuilder {
    pub fn new() -> Self {
        Self {
            registry: CapabilityRegistry::new(),
        }
    }

    /// Returns its input as its output.
    pub fn with_echo(mut self, name: &str) -> Self {
        self.registry
            .register_fn(name, |input: Payload| async move { Ok(input) });
        self
    }

    /// Always produces the given key/value pair.
    pub fn with_static(mut self, name: &str, key: &str, value: serde_json::Value) -> Self {
        let key = key.to_string();
        self.registry.register_fn(name, move |_input| {
            let key = key.clone();
            let value = value.clone();
            async move {
                let mut output = Payload::new();
                output.insert(key, value);
                Ok(output)
            }
        });
        self
    }

    /// Always reports a handler error.
    pub fn with_failing(mut self, name: &str) -> Self {
        self.registry.register_fn(name, |_input| async move {
            Err(CapabilityError::new("stub handler failure"))
        });
        self
    }

    /// Sleeps before answering; used for timeout and cancellation tests.
    pub fn with_slow(mut self, name: &str, delay: Duration) -> Self {
        self.registry.register_fn(name, move |_input| async move {
            sleep(delay).await;
            Ok(Payload::new())
        });
        self
    }

    /// Counts invocations; fails every attempt when `fail` is set.
    pub fn with_counted(mut self, name: &str, counter: Arc<AtomicU32>, fail: bool) -> Self {
        self.registry.register_fn(name, move |_input| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if fail {
                    Err(CapabilityError::new("counted failure"))
                } else {
                    Ok(Payload::new())
                }
            }
        });
        self
    }

    /// Appends the input's "label" value to the shared log, then succeeds.
    pub fn with_recorder(mut self, name: &str, log: Arc<Mutex<Vec<String>>>) -> Self {
        self.registry.register_fn(name, move |input: Payload| {
            let log = log.clone();
            async move {
                let label = input
                    .get("label")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unlabelled")
                    .to_string();
                log.lock().unwrap().push(label);
                Ok(Payload::new())
            }
        });
        self
    }

    pub fn build(self) -> Arc<CapabilityRegistry> {
        Arc::new(self.registry)
    }

    pub fn into_engine(self) -> WorkflowEngine {
        WorkflowEngine::new(self.build())
    }
}

impl Default for TestRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Opt-in log output for debugging: RUST_LOG=conductor=debug cargo test
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Step with retry backoff shrunk so tests stay fast.
pub fn quick_step(capability: &str) -> StepConfig {
    StepConfig::new(capability).with_backoff(BackoffPolicy::fixed(Duration::from_millis(1)))
}

/// Labelled recorder step; the label lands in the shared log on invocation.
pub fn recorder_step(capability: &str, label: &str) -> StepConfig {
    quick_step(capability).with_input("label", json!(label))
}
