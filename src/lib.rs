//! # homegear-ipc
//!
//! Async IPC client for the Homegear home-automation daemon.
//!
//! One long-lived Unix domain socket (or TCP) connection carries RPC calls
//! in both directions plus unsolicited event notifications. The client
//! reconnects on its own and reports connection changes and events to an
//! [`Observer`].
//!
//! ## Architecture
//!
//! - **Transport**: socket connect, chunked reads, lifecycle state
//! - **Codec**: 11-byte binary header + MessagePack payload
//! - **Dispatcher**: matches replies to outstanding calls by call ID
//! - **Client**: supervisor task, reconnection, `invoke`
//!
//! ## Example
//!
//! ```no_run
//! use homegear_ipc::{Client, EventNotification, Observer, Value};
//!
//! struct Printer;
//!
//! impl Observer for Printer {
//!     fn on_connected(&self) {
//!         println!("connected");
//!     }
//!
//!     fn on_event(&self, event: &EventNotification) {
//!         println!("{} {}.{} {} = {}", event.source, event.peer_id, event.channel, event.variable, event.value);
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> homegear_ipc::Result<()> {
//!     let client = Client::start("", Printer)?;
//!     let level = client.invoke("logLevel", vec![]).await?;
//!     println!("log level is {level}");
//!     client.close().await;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod notify;
pub mod protocol;
pub mod transport;
pub mod value;

mod client;
mod writer;

pub use client::{Client, ClientBuilder};
pub use config::{ClientConfig, ReconnectPolicy};
pub use error::{CodecError, ConnError, IpcError, Result, RpcFault};
pub use notify::{EventNotification, NodeInput, Notification, Observer};
pub use transport::{Address, ConnectionState};
pub use value::Value;
