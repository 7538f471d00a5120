//! Correlation of responses with outstanding calls.
//!
//! The [`Dispatcher`] is plain synchronous state: the client keeps it under
//! a mutex shared by `invoke` (registering calls) and the read loop
//! (routing frames). Nothing in here awaits.

use std::collections::HashMap;

use tokio::sync::oneshot;

use crate::codec::{error_parts, response_parts, EncodedFrame, Frame};
use crate::error::{ConnError, IpcError, RpcFault};
use crate::handler::MethodResult;
use crate::protocol::EVENT_CALL_ID;
use crate::value::Value;

/// Fault code for a reply that could not be encoded.
const INTERNAL_ERROR: i64 = -32603;

/// What a call finally produced.
pub type CallOutcome = Result<Value, IpcError>;

struct PendingCall {
    method: String,
    tx: oneshot::Sender<CallOutcome>,
}

/// A frame the dispatcher does not consume itself.
#[derive(Debug, PartialEq)]
pub enum Inbound {
    /// Response or Error, delivered (or dropped as unmatched).
    Handled,
    /// Notification for the observer.
    Event { method: String, params: Vec<Value> },
    /// Daemon-initiated call for a local method.
    Request {
        id: u32,
        method: String,
        params: Vec<Value>,
    },
}

/// Table of outstanding calls.
pub struct Dispatcher {
    open: bool,
    pending: HashMap<u32, PendingCall>,
    next_id: u32,
}

impl Dispatcher {
    /// A closed dispatcher with no calls.
    pub fn new() -> Self {
        Self {
            open: false,
            pending: HashMap::new(),
            next_id: 1,
        }
    }

    /// Accept registrations (a connection is up).
    pub fn open(&mut self) {
        self.open = true;
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Number of outstanding calls.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Register a call and allocate its ID.
    ///
    /// IDs are never 0 and never collide with an outstanding call. Fails
    /// with [`ConnError::Lost`] while no connection is open.
    pub fn register(
        &mut self,
        method: &str,
    ) -> Result<(u32, oneshot::Receiver<CallOutcome>), ConnError> {
        if !self.open {
            return Err(ConnError::Lost);
        }

        let id = self.allocate_id();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            id,
            PendingCall {
                method: method.to_string(),
                tx,
            },
        );
        Ok((id, rx))
    }

    fn allocate_id(&mut self) -> u32 {
        loop {
            let id = self.next_id;
            self.next_id = match self.next_id.wrapping_add(1) {
                EVENT_CALL_ID => 1,
                next => next,
            };
            if !self.pending.contains_key(&id) {
                return id;
            }
        }
    }

    /// Route one decoded frame.
    pub fn on_frame(&mut self, frame: Frame) -> Inbound {
        match frame {
            Frame::Response { id, value } => {
                self.complete(id, Ok(value));
                Inbound::Handled
            }
            Frame::Error { id, fault } => {
                self.complete(id, Err(IpcError::Fault(fault)));
                Inbound::Handled
            }
            Frame::Event { method, params } => Inbound::Event { method, params },
            Frame::Request { id, method, params } => Inbound::Request { id, method, params },
        }
    }

    fn complete(&mut self, id: u32, outcome: CallOutcome) {
        match self.pending.remove(&id) {
            Some(call) => {
                tracing::trace!(call_id = id, method = %call.method, "call completed");
                // The caller may have given up already.
                let _ = call.tx.send(outcome);
            }
            None => {
                tracing::warn!(call_id = id, "dropping reply for unknown call");
            }
        }
    }

    /// Remove an abandoned call. Returns whether it was still outstanding.
    pub fn cancel(&mut self, id: u32) -> bool {
        match self.pending.remove(&id) {
            Some(call) => {
                tracing::debug!(call_id = id, method = %call.method, "call abandoned");
                true
            }
            None => false,
        }
    }

    /// Fail every outstanding call and close for registration.
    pub fn fail_all(&mut self, err: impl Fn() -> ConnError) {
        self.open = false;
        let count = self.pending.len();
        for (_, call) in self.pending.drain() {
            let _ = call.tx.send(Err(IpcError::Conn(err())));
        }
        if count > 0 {
            tracing::debug!(count, "failed outstanding calls");
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Frame answering a daemon-initiated call.
pub(crate) fn reply_frame(id: u32, result: &MethodResult) -> Option<EncodedFrame> {
    let encoded = match result {
        Ok(value) => response_parts(id, value),
        Err(fault) => error_parts(id, fault),
    };
    match encoded {
        Ok(frame) => Some(frame),
        Err(e) => {
            tracing::warn!(call_id = id, error = %e, "cannot encode reply");
            error_parts(id, &RpcFault::new(INTERNAL_ERROR, e.to_string())).ok()
        }
    }
}
