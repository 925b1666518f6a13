// ABOUTME: Capability registry and the uniform invocation contract for step handlers
// ABOUTME: Maps capability names to opaque async handlers supplied by the caller

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Opaque key->value mapping exchanged with capability handlers.
pub type Payload = HashMap<String, serde_json::Value>;

#[derive(Error, Debug, Clone)]
pub enum CapabilityError {
    #[error("{0}")]
    Handler(String),
}

impl CapabilityError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }
}

pub type CapabilityResult = std::result::Result<Payload, CapabilityError>;

/// A named external capability. The engine makes no assumption about what the
/// handler does internally; it only awaits the structured result.
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    async fn invoke(&self, input: Payload) -> CapabilityResult;
}

type BoxedFuture = Pin<Box<dyn Future<Output = CapabilityResult> + Send>>;

/// Adapts a plain async closure into a handler, so callers can register
/// capabilities without defining a type per handler.
pub struct FnCapability {
    func: Box<dyn Fn(Payload) -> BoxedFuture + Send + Sync>,
}

impl FnCapability {
    pub fn new<F, Fut>(func: F) -> Self
    where
        F: Fn(Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CapabilityResult> + Send + 'static,
    {
        Self {
            func: Box::new(move |input| -> BoxedFuture { Box::pin(func(input)) }),
        }
    }
}

#[async_trait]
impl CapabilityHandler for FnCapability {
    async fn invoke(&self, input: Payload) -> CapabilityResult {
        (self.func)(input).await
    }
}

/// Registry of named capability handlers. Supplied to the engine by the caller;
/// the engine resolves each step's target capability here at execution time.
#[derive(Default)]
pub struct CapabilityRegistry {
    handlers: HashMap<String, Arc<dyn CapabilityHandler>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn CapabilityHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    /// Register an async closure as a capability.
    pub fn register_fn<F, Fut>(&mut self, name: impl Into<String>, func: F)
    where
        F: Fn(Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CapabilityResult> + Send + 'static,
    {
        self.register(name, Arc::new(FnCapability::new(func)));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CapabilityHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn capability_names(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }
}
