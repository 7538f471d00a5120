//! Mock daemon for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

use homegear_ipc::codec::{encode_error, encode_event, encode_request, encode_response, Decoder, Frame};
use homegear_ipc::{Notification, RpcFault, Value};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc::UnboundedReceiver;

pub const STEP: Duration = Duration::from_secs(5);

/// A listening socket in a private temp directory.
pub struct MockDaemon {
    pub path: PathBuf,
    listener: UnixListener,
    _dir: TempDir,
}

impl MockDaemon {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("homegearIPC.sock");
        let listener = UnixListener::bind(&path).unwrap();
        Self {
            path,
            listener,
            _dir: dir,
        }
    }

    /// Path of a socket nobody listens on yet, in its own directory.
    pub fn unbound() -> (TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("homegearIPC.sock");
        (dir, path)
    }

    pub fn bind_at(dir: TempDir, path: PathBuf) -> Self {
        let listener = UnixListener::bind(&path).unwrap();
        Self {
            path,
            listener,
            _dir: dir,
        }
    }

    pub async fn accept(&self) -> Peer {
        let (stream, _) = tokio::time::timeout(STEP, self.listener.accept())
            .await
            .expect("client did not connect")
            .unwrap();
        Peer {
            stream,
            decoder: Decoder::new(),
            queued: VecDeque::new(),
        }
    }
}

/// The daemon side of one accepted connection.
pub struct Peer {
    stream: UnixStream,
    decoder: Decoder,
    queued: VecDeque<Frame>,
}

impl Peer {
    /// Next frame from the client, `None` once it hung up.
    pub async fn recv(&mut self) -> Option<Frame> {
        let mut buf = [0u8; 4096];
        loop {
            if let Some(frame) = self.queued.pop_front() {
                return Some(frame);
            }
            let n = tokio::time::timeout(STEP, self.stream.read(&mut buf))
                .await
                .expect("no frame from client")
                .unwrap();
            if n == 0 {
                return None;
            }
            for frame in self.decoder.decode(&buf[..n]) {
                self.queued.push_back(frame.unwrap());
            }
        }
    }

    /// Next frame, which must be a request.
    pub async fn expect_request(&mut self) -> (u32, String, Vec<Value>) {
        match self.recv().await {
            Some(Frame::Request { id, method, params }) => (id, method, params),
            other => panic!("expected request, got {other:?}"),
        }
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    pub async fn respond(&mut self, id: u32, value: Value) {
        self.send_raw(&encode_response(id, &value).unwrap()).await;
    }

    pub async fn fail(&mut self, id: u32, fault: RpcFault) {
        self.send_raw(&encode_error(id, &fault).unwrap()).await;
    }

    pub async fn event(&mut self, method: &str, params: Vec<Value>) {
        self.send_raw(&encode_event(method, &params).unwrap()).await;
    }

    pub async fn call(&mut self, id: u32, method: &str, params: Vec<Value>) {
        self.send_raw(&encode_request(id, method, &params).unwrap()).await;
    }

    /// Wait until the client closes its side.
    pub async fn expect_closed(&mut self) {
        assert!(self.recv().await.is_none(), "client kept the connection open");
    }
}

/// `broadcastEvent` parameters for a single variable.
pub fn broadcast(source: &str, peer_id: i64, channel: i32, variable: &str, value: Value) -> Vec<Value> {
    vec![
        Value::from(source),
        Value::from(peer_id),
        Value::from(channel),
        Value::Array(vec![Value::from(variable)]),
        Value::Array(vec![value]),
    ]
}

pub async fn next_notification(rx: &mut UnboundedReceiver<Notification>) -> Notification {
    tokio::time::timeout(STEP, rx.recv())
        .await
        .expect("no notification")
        .expect("observer channel closed")
}

/// Drain every notification until the client drops its observers.
pub async fn remaining_notifications(rx: &mut UnboundedReceiver<Notification>) -> Vec<Notification> {
    let mut all = Vec::new();
    while let Some(n) = tokio::time::timeout(STEP, rx.recv())
        .await
        .expect("observer channel not closed")
    {
        all.push(n);
    }
    all
}
