//! Connection targets.

use std::fmt;
use std::path::PathBuf;

/// Well-known location of the daemon's IPC socket.
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/homegear/homegearIPC.sock";

/// Where to connect.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    /// Unix domain socket path.
    Unix(PathBuf),
    /// `host:port` pair.
    Tcp(String),
}

impl Address {
    /// Parse a connection target.
    ///
    /// - `""` is the default socket path
    /// - `host:port` with a numeric port and no `/` is TCP
    /// - anything else is a socket path
    ///
    /// # Example
    ///
    /// ```
    /// use homegear_ipc::transport::{Address, DEFAULT_SOCKET_PATH};
    ///
    /// assert_eq!(Address::parse(""), Address::Unix(DEFAULT_SOCKET_PATH.into()));
    /// assert_eq!(Address::parse("127.0.0.1:2001"), Address::Tcp("127.0.0.1:2001".into()));
    /// assert_eq!(Address::parse("/tmp/hg.sock"), Address::Unix("/tmp/hg.sock".into()));
    /// ```
    pub fn parse(target: &str) -> Self {
        if target.trim().is_empty() {
            return Address::Unix(PathBuf::from(DEFAULT_SOCKET_PATH));
        }

        if !target.contains('/') {
            if let Some((host, port)) = target.rsplit_once(':') {
                if !host.is_empty() && port.parse::<u16>().is_ok() {
                    return Address::Tcp(target.to_string());
                }
            }
        }

        Address::Unix(PathBuf::from(target))
    }
}

impl Default for Address {
    fn default() -> Self {
        Address::Unix(PathBuf::from(DEFAULT_SOCKET_PATH))
    }
}

impl From<&str> for Address {
    fn from(target: &str) -> Self {
        Address::parse(target)
    }
}

impl From<String> for Address {
    fn from(target: String) -> Self {
        Address::parse(&target)
    }
}

impl From<PathBuf> for Address {
    fn from(path: PathBuf) -> Self {
        Address::Unix(path)
    }
}

impl From<&std::path::Path> for Address {
    fn from(path: &std::path::Path) -> Self {
        Address::Unix(path.to_path_buf())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Unix(path) => write!(f, "unix:{}", path.display()),
            Address::Tcp(addr) => write!(f, "tcp:{addr}"),
        }
    }
}
