//! Client builder and connection supervisor.
//!
//! The [`ClientBuilder`] collects the target, observers, local methods and
//! configuration. [`ClientBuilder::start`] spawns one supervisor task that
//! owns the connection for the client's whole life:
//! 1. Connect (bounded by `connect_timeout`)
//! 2. Spawn the writer task and publish `Connected`
//! 3. Fire `on_connected`, then release queued calls
//! 4. Read frames and route them until the stream ends
//! 5. Fail outstanding calls, fire `on_disconnected`, back off and retry
//!
//! # Example
//!
//! ```no_run
//! use homegear_ipc::{Client, Value};
//!
//! #[tokio::main]
//! async fn main() -> homegear_ipc::Result<()> {
//!     let mut builder = Client::builder("");
//!     let mut notifications = builder.subscribe();
//!     let client = builder.start()?;
//!
//!     let level = client.invoke("logLevel", vec![]).await?;
//!     println!("log level: {level}");
//!
//!     client
//!         .invoke("writeLog", vec![Value::from("My log entry"), Value::from(4)])
//!         .await?;
//!
//!     while let Ok(n) = notifications.try_recv() {
//!         println!("{n:?}");
//!     }
//!     client.close().await;
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch, Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::codec::{request_parts, Decoder};
use crate::config::{ClientConfig, ReconnectPolicy};
use crate::dispatcher::{reply_frame, CallOutcome, Dispatcher, Inbound};
use crate::error::{CodecError, ConnError, IpcError, Result, RpcFault};
use crate::handler::{method_not_found, HandlerRegistry, MethodResult, SERVER_BUSY};
use crate::notify::{parse_notification, Notification, Observer, ObserverSet};
use crate::transport::{Address, Connection, ConnectionState};
use crate::value::Value;
use crate::writer::{spawn_writer_task, WriterHandle};

/// Builder for configuring and starting a [`Client`].
pub struct ClientBuilder {
    address: Address,
    config: ClientConfig,
    observers: Vec<Box<dyn Observer>>,
    registry: HandlerRegistry,
}

impl ClientBuilder {
    /// Builder for `target` (see [`Address::parse`]).
    pub fn new(target: impl Into<Address>) -> Self {
        Self {
            address: target.into(),
            config: ClientConfig::default(),
            observers: Vec::new(),
            registry: HandlerRegistry::new(),
        }
    }

    /// Add an observer. Several observers are called in registration order.
    pub fn observer(mut self, observer: impl Observer) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    /// Receive notifications through a channel instead of callbacks.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<Notification> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers.push(Box::new(tx));
        rx
    }

    /// Register a local method the daemon may call.
    pub fn method<F, Fut>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MethodResult> + Send + 'static,
    {
        self.registry.register(name, handler);
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Default: 5 seconds
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Bound on a whole `invoke`, including the wait for a connection.
    ///
    /// Default: 30 seconds
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config.call_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.config.reconnect = policy;
        self
    }

    /// Default: 16 MiB
    pub fn max_payload_size(mut self, size: u32) -> Self {
        self.config.max_payload_size = size;
        self
    }

    /// Default: 1024
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// Set the maximum number of concurrently running local methods.
    ///
    /// Requests over the limit are answered with a fault.
    /// Default: 256
    pub fn max_concurrent_handlers(mut self, limit: usize) -> Self {
        self.config.max_concurrent_handlers = limit;
        self
    }

    /// Spawn the connection supervisor and return immediately.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(self) -> Result<Client> {
        self.config.validate()?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| IpcError::Config(format!("no tokio runtime: {e}")))?;

        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let inner = Arc::new(Inner {
            address: self.address,
            config: self.config,
            shared: Mutex::new(Shared {
                dispatcher: Dispatcher::new(),
                writer: None,
            }),
            state_rx,
            ready: Notify::new(),
            shutdown: CancellationToken::new(),
        });

        let supervisor = Supervisor {
            handler_slots: Arc::new(Semaphore::new(inner.config.max_concurrent_handlers)),
            inner: inner.clone(),
            state_tx,
            observers: ObserverSet::new(self.observers),
            registry: Arc::new(self.registry),
        };
        let task = runtime.spawn(supervisor.run());

        Ok(Client {
            inner,
            supervisor: Mutex::new(Some(task)),
        })
    }
}

/// State shared by callers and the supervisor.
struct Inner {
    address: Address,
    config: ClientConfig,
    shared: Mutex<Shared>,
    state_rx: watch::Receiver<ConnectionState>,
    /// Signalled once the call table opens on a new connection.
    ready: Notify,
    shutdown: CancellationToken,
}

/// Call table and the current connection's writer, under one lock.
struct Shared {
    dispatcher: Dispatcher,
    writer: Option<WriterHandle>,
}

/// A persistent, reconnecting connection to the daemon.
///
/// Dropping the client shuts the connection down.
pub struct Client {
    inner: Arc<Inner>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl Client {
    /// Create a new client builder.
    pub fn builder(target: impl Into<Address>) -> ClientBuilder {
        ClientBuilder::new(target)
    }

    /// Start a client with a single observer and default configuration.
    pub fn start(target: impl Into<Address>, observer: impl Observer) -> Result<Self> {
        ClientBuilder::new(target).observer(observer).start()
    }

    /// Call a remote method.
    ///
    /// Waits for a connection if there is none yet. The whole call is
    /// bounded by the configured call timeout. Dropping the future abandons
    /// the call; a late reply is then discarded.
    pub async fn invoke(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        if method.is_empty() {
            return Err(IpcError::InvalidMethod);
        }

        let timeout = self.inner.config.call_timeout();
        match tokio::time::timeout(timeout, self.call(method, params)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::debug!(method, ?timeout, "call timed out");
                Err(ConnError::Timeout.into())
            }
        }
    }

    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let (mut pending, rx, writer) = self.register(method).await?;

        let frame = request_parts(pending.id, method, &params)?;
        tracing::debug!(call_id = pending.id, method, "invoke");
        writer.send(frame).await?;

        let outcome = rx.await;
        pending.disarm();
        match outcome {
            Ok(result) => result,
            Err(_) => Err(ConnError::Lost.into()),
        }
    }

    /// Register against a live connection, waiting for one if needed.
    async fn register(
        &self,
        method: &str,
    ) -> Result<(PendingGuard<'_>, oneshot::Receiver<CallOutcome>, WriterHandle)> {
        let mut state_rx = self.inner.state_rx.clone();
        loop {
            let ready = self.inner.ready.notified();
            tokio::pin!(ready);
            ready.as_mut().enable();

            let state = *state_rx.borrow_and_update();
            match state {
                ConnectionState::Closed => return Err(ConnError::Closed.into()),
                ConnectionState::Connected => {
                    let mut shared = self.inner.shared.lock();
                    if let Some(writer) = shared.writer.clone() {
                        if let Ok((id, rx)) = shared.dispatcher.register(method) {
                            let guard = PendingGuard {
                                shared: &self.inner.shared,
                                id,
                                armed: true,
                            };
                            return Ok((guard, rx, writer));
                        }
                    }
                }
                ConnectionState::Disconnected | ConnectionState::Connecting => {}
            }

            tokio::select! {
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        return Err(ConnError::Closed.into());
                    }
                }
                _ = &mut ready => {}
            }
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state_rx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Wait until connected. Returns `false` on timeout or once closed.
    pub async fn wait_connected(&self, timeout: Duration) -> bool {
        let mut state_rx = self.inner.state_rx.clone();
        let reached = tokio::time::timeout(
            timeout,
            state_rx.wait_for(|s| matches!(s, ConnectionState::Connected | ConnectionState::Closed)),
        )
        .await;
        matches!(reached, Ok(Ok(state)) if *state == ConnectionState::Connected)
    }

    /// Connection target.
    pub fn address(&self) -> &Address {
        &self.inner.address
    }

    /// Shut down and wait for the supervisor to finish.
    ///
    /// Outstanding calls fail with [`ConnError::Closed`]. Idempotent: every
    /// caller returns only once the client is closed.
    pub async fn close(&self) {
        self.inner.shutdown.cancel();
        let task = self.supervisor.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "connection task failed");
            }
        }
        let mut state_rx = self.inner.state_rx.clone();
        let _ = state_rx.wait_for(|s| s.is_closed()).await;
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

/// Removes an abandoned call from the table on drop.
struct PendingGuard<'a> {
    shared: &'a Mutex<Shared>,
    id: u32,
    armed: bool,
}

impl PendingGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.lock().dispatcher.cancel(self.id);
        }
    }
}

/// Why serving a connection stopped.
enum Ended {
    Lost,
    Shutdown,
}

/// The only writer of connection state and the only caller of observers.
struct Supervisor {
    inner: Arc<Inner>,
    state_tx: watch::Sender<ConnectionState>,
    observers: ObserverSet,
    registry: Arc<HandlerRegistry>,
    handler_slots: Arc<Semaphore>,
}

impl Supervisor {
    async fn run(self) {
        let address = &self.inner.address;
        let policy = &self.inner.config.reconnect;
        let shutdown = self.inner.shutdown.clone();
        let mut failures: u32 = 0;

        loop {
            self.set_state(ConnectionState::Connecting);

            let attempt = Connection::connect(address, self.inner.config.connect_timeout());
            let connected = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                result = attempt => result,
            };

            match connected {
                Ok(conn) => {
                    failures = 0;
                    tracing::info!(address = %conn.address(), "connected");
                    if let Ended::Shutdown = self.serve(conn).await {
                        return;
                    }
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    tracing::warn!(%address, error = %e, failures, "connect failed");
                    self.set_state(ConnectionState::Disconnected);
                    self.observers.disconnected();
                }
            }

            if !policy.allows(failures) {
                tracing::error!(%address, failures, "giving up on reconnecting");
                break;
            }

            let delay = policy.delay(failures.saturating_sub(1));
            tracing::debug!(%address, ?delay, "reconnecting");
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.inner
            .shared
            .lock()
            .dispatcher
            .fail_all(|| ConnError::Closed);
        self.set_state(ConnectionState::Closed);
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state_tx.send_replace(next);
        debug_assert!(
            previous.can_transition_to(next),
            "illegal transition {previous} -> {next}"
        );
        tracing::debug!(from = %previous, to = %next, "state changed");
    }

    /// Run one connection until it ends.
    async fn serve(&self, conn: Connection) -> Ended {
        let address = &self.inner.address;
        let config = &self.inner.config;
        let (mut reader, write_half) = conn.into_split();
        let (writer, mut writer_task) = spawn_writer_task(write_half, config.channel_capacity);
        let handlers = self.inner.shutdown.child_token();

        self.inner.shared.lock().writer = Some(writer.clone());
        self.set_state(ConnectionState::Connected);
        self.observers.connected();
        // Queued calls go out only after the callback.
        self.inner.shared.lock().dispatcher.open();
        self.inner.ready.notify_waiters();

        let mut decoder = Decoder::with_max_payload(config.max_payload_size);
        let ended = loop {
            tokio::select! {
                biased;
                _ = self.inner.shutdown.cancelled() => break Ended::Shutdown,
                result = &mut writer_task => {
                    tracing::warn!(%address, ?result, "writer stopped");
                    break Ended::Lost;
                }
                chunk = reader.next_chunk() => match chunk {
                    Ok(Some(bytes)) => {
                        if let Err(e) = self.handle_chunk(&mut decoder, &bytes, &writer, &handlers).await {
                            tracing::error!(%address, error = %e, "malformed frame, closing connection");
                            break Ended::Lost;
                        }
                    }
                    Ok(None) => {
                        if let Err(e) = decoder.finish() {
                            tracing::warn!(%address, error = %e, "connection closed mid-frame");
                        } else {
                            tracing::info!(%address, "connection closed by peer");
                        }
                        break Ended::Lost;
                    }
                    Err(e) => {
                        tracing::warn!(%address, error = %e, "read failed");
                        break Ended::Lost;
                    }
                },
            }
        };

        handlers.cancel();
        writer_task.abort();
        drop(writer);

        match ended {
            Ended::Lost => {
                self.set_state(ConnectionState::Disconnected);
                let mut shared = self.inner.shared.lock();
                shared.writer = None;
                shared.dispatcher.fail_all(|| ConnError::Lost);
            }
            Ended::Shutdown => {
                let mut shared = self.inner.shared.lock();
                shared.writer = None;
                shared.dispatcher.fail_all(|| ConnError::Closed);
                drop(shared);
                self.set_state(ConnectionState::Closed);
            }
        }
        self.observers.disconnected();
        ended
    }

    async fn handle_chunk(
        &self,
        decoder: &mut Decoder,
        bytes: &[u8],
        writer: &WriterHandle,
        handlers: &CancellationToken,
    ) -> std::result::Result<(), CodecError> {
        for frame in decoder.decode(bytes) {
            let inbound = self.inner.shared.lock().dispatcher.on_frame(frame?);
            match inbound {
                Inbound::Handled => {}
                Inbound::Event { method, params } => self.on_event(&method, &params),
                Inbound::Request { id, method, params } => {
                    self.on_request(id, method, params, writer, handlers).await
                }
            }
        }
        Ok(())
    }

    fn on_event(&self, method: &str, params: &[Value]) {
        match parse_notification(method, params) {
            Ok(Some(notifications)) => notifications.iter().for_each(|n| self.observers.notify(n)),
            Ok(None) => tracing::debug!(method, "ignoring unknown event"),
            Err(fault) => tracing::warn!(method, %fault, "dropping malformed event"),
        }
    }

    async fn on_request(
        &self,
        id: u32,
        method: String,
        params: Vec<Value>,
        writer: &WriterHandle,
        handlers: &CancellationToken,
    ) {
        tracing::debug!(call_id = id, method = %method, "incoming call");

        let Some(handler) = self.registry.get(&method) else {
            // Built-in notifications the daemon may also deliver as calls.
            let result = match parse_notification(&method, &params) {
                Ok(Some(notifications)) => {
                    notifications.iter().for_each(|n| self.observers.notify(n));
                    Ok(Value::Void)
                }
                Ok(None) => Err(method_not_found()),
                Err(fault) => Err(fault),
            };
            send_reply(writer, id, &result).await;
            return;
        };

        let Ok(permit) = self.handler_slots.clone().try_acquire_owned() else {
            tracing::warn!(call_id = id, method = %method, "handler capacity reached");
            let busy = Err(RpcFault::new(SERVER_BUSY, "Too many concurrent requests."));
            send_reply(writer, id, &busy).await;
            return;
        };

        let writer = writer.clone();
        let cancelled = handlers.clone();
        tokio::spawn(async move {
            let _permit = permit;
            tokio::select! {
                _ = cancelled.cancelled() => {
                    tracing::debug!(call_id = id, method = %method, "local method cancelled");
                }
                result = handler.call(params) => {
                    if let Err(fault) = &result {
                        tracing::debug!(call_id = id, method = %method, %fault, "local method failed");
                    }
                    send_reply(&writer, id, &result).await;
                }
            }
        });
    }
}

async fn send_reply(writer: &WriterHandle, id: u32, result: &MethodResult) {
    if let Some(frame) = reply_frame(id, result) {
        if let Err(e) = writer.send(frame).await {
            tracing::debug!(call_id = id, error = %e, "reply not sent");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NoopObserver;

    #[test]
    fn test_builder_configuration() {
        let builder = Client::builder("127.0.0.1:2001")
            .connect_timeout(Duration::from_millis(250))
            .call_timeout(Duration::from_secs(2))
            .max_concurrent_handlers(8)
            .channel_capacity(16)
            .reconnect(ReconnectPolicy::disabled());

        assert_eq!(builder.address, Address::Tcp("127.0.0.1:2001".into()));
        assert_eq!(builder.config.connect_timeout_ms, 250);
        assert_eq!(builder.config.call_timeout_ms, 2000);
        assert_eq!(builder.config.max_concurrent_handlers, 8);
        assert_eq!(builder.config.channel_capacity, 16);
        assert!(!builder.config.reconnect.enabled);
    }

    #[test]
    fn test_builder_method_chaining() {
        let mut builder = Client::builder("")
            .observer(NoopObserver)
            .method("ping", |_| async { Ok(Value::from("pong")) });
        let _rx = builder.subscribe();

        assert_eq!(builder.observers.len(), 2);
        assert!(builder.registry.contains("ping"));
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let result = Client::builder("").start();
        assert!(matches!(result, Err(IpcError::Config(_))));
    }

    #[test]
    fn test_start_rejects_invalid_config() {
        let result = Client::builder("").channel_capacity(0).start();
        assert!(matches!(result, Err(IpcError::Config(_))));
    }

    #[tokio::test]
    async fn test_empty_method_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let client = Client::builder(dir.path().join("none.sock"))
            .reconnect(ReconnectPolicy::disabled())
            .start()
            .unwrap();

        assert!(matches!(
            client.invoke("", vec![]).await,
            Err(IpcError::InvalidMethod)
        ));
        client.close().await;
    }

    #[tokio::test]
    async fn test_unreachable_without_reconnect_closes() {
        let dir = tempfile::tempdir().unwrap();
        let client = Client::builder(dir.path().join("none.sock"))
            .reconnect(ReconnectPolicy::disabled())
            .start()
            .unwrap();

        assert!(!client.wait_connected(Duration::from_secs(2)).await);
        assert_eq!(client.state(), ConnectionState::Closed);

        let err = client.invoke("logLevel", vec![]).await.unwrap_err();
        assert!(matches!(err.as_conn(), Some(ConnError::Closed)));
    }
}
