//! Invoke - connect, call one method, print notifications.
//!
//! This demo shows:
//! - Subscribing to connection and event notifications
//! - Calling a remote method with `client.invoke()`
//! - Explicit shutdown with `client.close()`
//!
//! # Running
//!
//! ```text
//! cargo run --example invoke -- --method writeLog --param '"My log entry"' --param 4
//! RUST_LOG=homegear_ipc=debug cargo run --example invoke -- 127.0.0.1:2001 --method logLevel
//! ```

use std::time::Duration;

use clap::Parser;
use homegear_ipc::{Client, Notification, Value};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(about = "Call a Homegear IPC method and print notifications")]
struct Args {
    /// Socket path or host:port. Empty uses the default socket.
    #[arg(default_value = "")]
    target: String,

    /// Method to call.
    #[arg(short, long, default_value = "logLevel")]
    method: String,

    /// Parameter as JSON, repeatable.
    #[arg(short, long = "param")]
    params: Vec<String>,

    /// Seconds to keep listening for events.
    #[arg(short, long, default_value = "30")]
    duration: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let params = args
        .params
        .iter()
        .map(|p| serde_json::from_str::<serde_json::Value>(p).map(Value::from))
        .collect::<Result<Vec<_>, _>>()?;

    let mut builder = Client::builder(args.target.as_str());
    let mut notifications = builder.subscribe();
    let client = builder.start()?;

    let printer = tokio::spawn(async move {
        while let Some(notification) = notifications.recv().await {
            match notification {
                Notification::Connected => println!("connected"),
                Notification::Disconnected => println!("disconnected"),
                Notification::Event(e) => println!(
                    "event {} {} {} {} {}",
                    e.source, e.peer_id, e.channel, e.variable, e.value
                ),
                Notification::NodeInput(n) => {
                    println!("node input {} #{} {}", n.node_id, n.input_index, n.message)
                }
            }
        }
    });

    match client.invoke(&args.method, params).await {
        Ok(result) => println!("{} -> {result}", args.method),
        Err(e) => eprintln!("{} failed: {e}", args.method),
    }

    tokio::time::sleep(Duration::from_secs(args.duration)).await;
    client.close().await;
    printer.await?;
    println!("Done");
    Ok(())
}
