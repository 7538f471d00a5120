//! Handler module - local methods callable by the daemon.
//!
//! Provides:
//! - [`Handler`] - a method implementation
//! - [`HandlerRegistry`] - maps method names to handlers
//!
//! When the daemon sends a Request frame, the client looks the method up
//! here, runs it on its own task and answers with a Response or Error frame
//! under the same call ID.

mod registry;

pub use registry::{
    BoxFuture, FnHandler, Handler, HandlerRegistry, MethodResult, METHOD_NOT_FOUND, SERVER_BUSY,
};
pub(crate) use registry::method_not_found;
