//! Stream connection to the daemon.
//!
//! - Unix: Unix Domain Socket
//! - Any platform: TCP
//!
//! The connection is split once: the [`ChunkReader`] goes to the read loop,
//! the write half goes to the writer task. Dropping both releases the socket.

use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpStream;

use super::Address;
use crate::error::ConnError;

/// Read buffer size per chunk.
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Boxed read half.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed write half.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// An established connection.
pub struct Connection {
    address: Address,
    reader: BoxedReader,
    writer: BoxedWriter,
}

impl Connection {
    /// Connect to `address`, giving up after `timeout`.
    pub async fn connect(address: &Address, timeout: Duration) -> Result<Self, ConnError> {
        tracing::debug!(%address, "connecting");

        let attempt = Self::open(address);
        match tokio::time::timeout(timeout, attempt).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(source)) => Err(ConnError::Unreachable {
                address: address.to_string(),
                source,
            }),
            Err(_) => Err(ConnError::Timeout),
        }
    }

    async fn open(address: &Address) -> std::io::Result<Self> {
        match address {
            #[cfg(unix)]
            Address::Unix(path) => {
                let stream = tokio::net::UnixStream::connect(path).await?;
                let (reader, writer) = stream.into_split();
                Ok(Self::from_halves(address.clone(), reader, writer))
            }
            #[cfg(not(unix))]
            Address::Unix(_) => Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "unix domain sockets are not available on this platform",
            )),
            Address::Tcp(addr) => {
                let stream = TcpStream::connect(addr.as_str()).await?;
                stream.set_nodelay(true)?;
                let (reader, writer) = stream.into_split();
                Ok(Self::from_halves(address.clone(), reader, writer))
            }
        }
    }

    fn from_halves<R, W>(address: Address, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            address,
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }

    /// Target this connection was opened to.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Split into the chunk reader and the write half.
    pub fn into_split(self) -> (ChunkReader, BoxedWriter) {
        (ChunkReader::new(self.reader), self.writer)
    }
}

/// Lazy sequence of byte chunks read from the connection.
///
/// Yields until the peer closes the stream; after that it stays finished.
pub struct ChunkReader {
    reader: BoxedReader,
    buf: Box<[u8]>,
    finished: bool,
}

impl ChunkReader {
    fn new(reader: BoxedReader) -> Self {
        Self {
            reader,
            buf: vec![0u8; READ_CHUNK_SIZE].into_boxed_slice(),
            finished: false,
        }
    }

    /// Next chunk, or `None` once the stream has ended.
    pub async fn next_chunk(&mut self) -> std::io::Result<Option<Bytes>> {
        if self.finished {
            return Ok(None);
        }

        match self.reader.read(&mut self.buf).await {
            Ok(0) => {
                self.finished = true;
                Ok(None)
            }
            Ok(n) => Ok(Some(Bytes::copy_from_slice(&self.buf[..n]))),
            Err(e) => {
                self.finished = true;
                Err(e)
            }
        }
    }
}
