//! Registry of local methods the daemon may call.
//!
//! # Example
//!
//! ```
//! use homegear_ipc::handler::HandlerRegistry;
//! use homegear_ipc::{RpcFault, Value};
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register("add", |params: Vec<Value>| async move {
//!     let sum = params.iter().filter_map(Value::as_i64).sum::<i64>();
//!     Ok::<_, RpcFault>(Value::from(sum))
//! });
//!
//! assert!(registry.contains("add"));
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::RpcFault;
use crate::value::Value;

/// Fault code for a call to an unregistered method.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Fault code when no handler slot is free.
pub const SERVER_BUSY: i64 = -32500;

/// Result type for local methods.
pub type MethodResult = Result<Value, RpcFault>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A local method.
pub trait Handler: Send + Sync + 'static {
    /// Run the method with the call's parameters.
    fn call(&self, params: Vec<Value>) -> BoxFuture<'static, MethodResult>;
}

/// Adapter for plain async closures.
pub struct FnHandler<F, Fut>
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MethodResult> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnHandler<F, Fut>
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MethodResult> + Send + 'static,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, Fut> Handler for FnHandler<F, Fut>
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MethodResult> + Send + 'static,
{
    fn call(&self, params: Vec<Value>) -> BoxFuture<'static, MethodResult> {
        Box::pin((self.handler)(params))
    }
}

/// Registry mapping method names to handlers.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    methods: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an async closure under `name`, replacing any previous one.
    pub fn register<F, Fut>(&mut self, name: &str, handler: F)
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MethodResult> + Send + 'static,
    {
        self.register_handler(name, FnHandler::new(handler));
    }

    /// Register a [`Handler`] implementation.
    pub fn register_handler<H: Handler>(&mut self, name: &str, handler: H) {
        if self
            .methods
            .insert(name.to_string(), Arc::new(handler))
            .is_some()
        {
            tracing::debug!(method = name, "local method replaced");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Handler>> {
        self.methods.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

pub(crate) fn method_not_found() -> RpcFault {
    RpcFault::new(METHOD_NOT_FOUND, "Requested method not found.")
}
