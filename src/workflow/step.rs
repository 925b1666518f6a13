// ABOUTME: Step configuration structures for workflow definitions
// ABOUTME: Defines per-step capability binding, retry, timeout and validation settings

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::capability::Payload;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Name of the capability handler this step dispatches to.
    pub capability: String,
    pub description: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Wall-clock limit for a single attempt. Engine default applies when unset.
    #[serde(with = "humantime_serde", default)]
    pub timeout: Option<Duration>,
    /// Additional attempts after the first failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub backoff: BackoffPolicy,
    /// Declared input configuration, passed opaquely to the capability.
    #[serde(default)]
    pub input: Payload,
    /// Upstream step id -> output key copied into this step's input before execution.
    #[serde(default)]
    pub bindings: IndexMap<String, String>,
    /// Keys a successful result must contain; absence fails the step.
    #[serde(default)]
    pub required_outputs: Vec<String>,
    /// Validation failures are deterministic and not retried unless requested.
    #[serde(default)]
    pub retry_validation_failures: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffPolicy {
    #[serde(with = "humantime_serde", default = "default_initial_delay")]
    pub initial_delay: Duration,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(with = "humantime_serde", default = "default_max_delay")]
    pub max_delay: Duration,
}

impl StepConfig {
    pub fn new(capability: impl Into<String>) -> Self {
        Self {
            capability: capability.into(),
            description: None,
            depends_on: Vec::new(),
            timeout: None,
            max_retries: default_max_retries(),
            backoff: BackoffPolicy::default(),
            input: Payload::new(),
            bindings: IndexMap::new(),
            required_outputs: Vec::new(),
            retry_validation_failures: false,
        }
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_input(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.input.insert(key.into(), value);
        self
    }

    pub fn with_binding(mut self, upstream: impl Into<String>, key: impl Into<String>) -> Self {
        self.bindings.insert(upstream.into(), key.into());
        self
    }

    pub fn with_required_outputs<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_outputs = keys.into_iter().map(Into::into).collect();
        self
    }
}

impl BackoffPolicy {
    /// Delay before re-attempting after the given 0-indexed failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let millis =
            (self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32)) as u64;
        Duration::from_millis(millis).min(self.max_delay)
    }

    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            multiplier: 1.0,
            max_delay: delay,
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: default_initial_delay(),
            multiplier: default_multiplier(),
            max_delay: default_max_delay(),
        }
    }
}

// Default value functions
fn default_max_retries() -> u32 {
    2
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay() -> Duration {
    Duration::from_secs(300)
}
