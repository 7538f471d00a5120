//! Connection and event notifications.
//!
//! The supervisor task is the only caller of an [`Observer`], so callbacks
//! for one client never run concurrently and arrive in wire order.

use tokio::sync::mpsc;

use crate::error::RpcFault;
use crate::value::Value;

/// Event method fanned out into one [`EventNotification`] per variable.
pub const BROADCAST_EVENT: &str = "broadcastEvent";

/// Event method carrying a [`NodeInput`].
pub const NODE_INPUT: &str = "nodeInput";

/// Local method name under which the daemon delivers a [`NodeInput`] as a call.
pub const NODE_INPUT_CALL: &str = "NodeInput";

/// A single variable change reported by the daemon.
#[derive(Debug, Clone, PartialEq)]
pub struct EventNotification {
    /// Event source (e.g. `"device"`).
    pub source: String,
    pub peer_id: u64,
    pub channel: i32,
    pub variable: String,
    pub value: Value,
}

/// Message delivered to a node input.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInput {
    pub node_id: String,
    pub node_info: Value,
    pub input_index: u32,
    pub message: Value,
}

/// Everything an observer can be told, as a single value.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Connected,
    Disconnected,
    Event(EventNotification),
    NodeInput(NodeInput),
}

/// Receives connection and event callbacks.
///
/// Every method has an empty default, implement only what you need.
/// Callbacks run on the connection task: keep them short and hand heavy
/// work off to another task.
pub trait Observer: Send + Sync + 'static {
    /// A connection was established. Fires before queued calls are sent.
    fn on_connected(&self) {}

    /// A connection was lost or a connection attempt failed.
    fn on_disconnected(&self) {}

    /// A variable changed.
    fn on_event(&self, _event: &EventNotification) {}

    /// A node received input.
    fn on_node_input(&self, _input: &NodeInput) {}
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl Observer for NoopObserver {}

impl Observer for mpsc::UnboundedSender<Notification> {
    fn on_connected(&self) {
        let _ = self.send(Notification::Connected);
    }

    fn on_disconnected(&self) {
        let _ = self.send(Notification::Disconnected);
    }

    fn on_event(&self, event: &EventNotification) {
        let _ = self.send(Notification::Event(event.clone()));
    }

    fn on_node_input(&self, input: &NodeInput) {
        let _ = self.send(Notification::NodeInput(input.clone()));
    }
}

/// Fans one notification out to several observers.
pub(crate) struct ObserverSet {
    observers: Vec<Box<dyn Observer>>,
}

impl ObserverSet {
    pub(crate) fn new(observers: Vec<Box<dyn Observer>>) -> Self {
        Self { observers }
    }

    pub(crate) fn connected(&self) {
        self.observers.iter().for_each(|o| o.on_connected());
    }

    pub(crate) fn disconnected(&self) {
        self.observers.iter().for_each(|o| o.on_disconnected());
    }

    pub(crate) fn notify(&self, notification: &Notification) {
        for observer in &self.observers {
            match notification {
                Notification::Connected => observer.on_connected(),
                Notification::Disconnected => observer.on_disconnected(),
                Notification::Event(event) => observer.on_event(event),
                Notification::NodeInput(input) => observer.on_node_input(input),
            }
        }
    }
}

fn wrong_parameter_count() -> RpcFault {
    RpcFault::new(-1, "Wrong parameter count.")
}

/// Split a `broadcastEvent` parameter list into per-variable notifications.
///
/// Expects `[source, peerId, channel, [variables], [values]]`. Variables
/// without a matching value are skipped.
///
/// # Example
///
/// ```
/// use homegear_ipc::notify::parse_broadcast_event;
/// use homegear_ipc::Value;
///
/// let params = vec![
///     Value::from("device"),
///     Value::from(42),
///     Value::from(1),
///     Value::Array(vec![Value::from("STATE")]),
///     Value::Array(vec![Value::from(true)]),
/// ];
/// let events = parse_broadcast_event(&params).unwrap();
/// assert_eq!(events[0].peer_id, 42);
/// assert_eq!(events[0].variable, "STATE");
/// ```
pub fn parse_broadcast_event(params: &[Value]) -> Result<Vec<EventNotification>, RpcFault> {
    let [source, peer_id, channel, variables, values] = params else {
        return Err(wrong_parameter_count());
    };

    let source = source.as_str().unwrap_or_default();
    // Peer IDs travel as signed 64-bit integers.
    let peer_id = peer_id.as_i64().unwrap_or_default() as u64;
    let channel = channel
        .as_i64()
        .and_then(|c| i32::try_from(c).ok())
        .unwrap_or(-1);
    let variables = variables.as_array().unwrap_or_default();
    let values = values.as_array().unwrap_or_default();

    Ok(variables
        .iter()
        .zip(values)
        .map(|(variable, value)| EventNotification {
            source: source.to_string(),
            peer_id,
            channel,
            variable: variable.as_str().unwrap_or_default().to_string(),
            value: value.clone(),
        })
        .collect())
}

/// Parse a `nodeInput` parameter list: `[nodeId, nodeInfo, inputIndex, message]`.
pub fn parse_node_input(params: &[Value]) -> Result<NodeInput, RpcFault> {
    let [node_id, node_info, input_index, message] = params else {
        return Err(wrong_parameter_count());
    };

    Ok(NodeInput {
        node_id: node_id.as_str().unwrap_or_default().to_string(),
        node_info: node_info.clone(),
        input_index: input_index
            .as_i64()
            .and_then(|i| u32::try_from(i).ok())
            .unwrap_or_default(),
        message: message.clone(),
    })
}

/// Turn a daemon notification into observer notifications.
///
/// `Ok(None)` means the method is not one the client understands.
pub(crate) fn parse_notification(
    method: &str,
    params: &[Value],
) -> Result<Option<Vec<Notification>>, RpcFault> {
    match method {
        BROADCAST_EVENT => Ok(Some(
            parse_broadcast_event(params)?
                .into_iter()
                .map(Notification::Event)
                .collect(),
        )),
        NODE_INPUT | NODE_INPUT_CALL => {
            let input = parse_node_input(params)?;
            Ok(Some(vec![Notification::NodeInput(input)]))
        }
        _ => Ok(None),
    }
}
