//! IPC client for communicating with the restomod daemon
//!
//! This module provides a synchronous client for sending messages to the daemon
//! over a Unix socket. The CLI uses it for every daemon-backed command.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;

use crate::{ConfiguratorSnapshot, ImageStyle, IpcMessage, IpcResponse, Subject};

/// Home directory for config, fallback images and the socket
pub fn restomod_home() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".restomod"))
        .unwrap_or_else(|| PathBuf::from("/tmp/.restomod"))
}

/// Default socket path
pub fn socket_path() -> PathBuf {
    restomod_home().join("restomod.sock")
}

/// Error type for IPC operations
#[derive(Debug)]
pub enum IpcError {
    /// Daemon is not running (socket doesn't exist or connection refused)
    DaemonNotRunning,
    /// Socket connection failed
    ConnectionFailed(std::io::Error),
    /// Failed to send message
    SendFailed(std::io::Error),
    /// Failed to receive response
    ReceiveFailed(std::io::Error),
    /// Invalid response format
    InvalidResponse(String),
    /// Daemon returned an error
    DaemonError(String),
}

impl std::fmt::Display for IpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IpcError::DaemonNotRunning => write!(f, "Daemon not running"),
            IpcError::ConnectionFailed(e) => write!(f, "Connection failed: {}", e),
            IpcError::SendFailed(e) => write!(f, "Send failed: {}", e),
            IpcError::ReceiveFailed(e) => write!(f, "Receive failed: {}", e),
            IpcError::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
            IpcError::DaemonError(msg) => write!(f, "Daemon error: {}", msg),
        }
    }
}

impl std::error::Error for IpcError {}

/// IPC client for communicating with the daemon
pub struct IpcClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl Default for IpcClient {
    fn default() -> Self {
        Self::new()
    }
}

impl IpcClient {
    /// Create a new IPC client with default settings
    pub fn new() -> Self {
        Self {
            socket_path: socket_path(),
            timeout: Duration::from_secs(5),
        }
    }

    /// Create a client with a custom socket path
    pub fn with_socket_path(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            timeout: Duration::from_secs(5),
        }
    }

    /// Set the read/write timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check if the daemon appears to be running (socket exists)
    pub fn daemon_available(&self) -> bool {
        self.socket_path.exists()
    }

    /// Send a message to the daemon and wait for a response
    pub fn send(&self, message: &IpcMessage) -> Result<IpcResponse, IpcError> {
        if !self.socket_path.exists() {
            return Err(IpcError::DaemonNotRunning);
        }

        let mut stream = UnixStream::connect(&self.socket_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::ConnectionRefused
                || e.kind() == std::io::ErrorKind::NotFound
            {
                IpcError::DaemonNotRunning
            } else {
                IpcError::ConnectionFailed(e)
            }
        })?;

        stream.set_read_timeout(Some(self.timeout)).ok();
        stream.set_write_timeout(Some(self.timeout)).ok();

        let json = serde_json::to_string(message)
            .map_err(|e| IpcError::SendFailed(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

        writeln!(stream, "{}", json).map_err(IpcError::SendFailed)?;
        stream.flush().map_err(IpcError::SendFailed)?;

        let mut reader = BufReader::new(stream);
        let mut response_line = String::new();
        reader
            .read_line(&mut response_line)
            .map_err(IpcError::ReceiveFailed)?;

        let response: IpcResponse = serde_json::from_str(&response_line)
            .map_err(|e| IpcError::InvalidResponse(e.to_string()))?;

        if let IpcResponse::Error(msg) = &response {
            return Err(IpcError::DaemonError(msg.clone()));
        }

        Ok(response)
    }

    /// Convenience method: Ping the daemon, returning (uptime, cached entries)
    pub fn ping(&self) -> Result<(u64, u64), IpcError> {
        match self.send(&IpcMessage::Ping)? {
            IpcResponse::Pong { uptime_secs, cached_entries } => Ok((uptime_secs, cached_entries)),
            _ => Err(IpcError::InvalidResponse("Unexpected response type".into())),
        }
    }

    /// Convenience method: Select a subject and wait for the session to settle
    pub fn select(
        &self,
        session: &str,
        subject: Subject,
        style: Option<ImageStyle>,
    ) -> Result<ConfiguratorSnapshot, IpcError> {
        self.expect_snapshot(&IpcMessage::Select {
            session: session.to_string(),
            subject,
            style,
        })
    }

    /// Convenience method: Force a fresh fetch for the session's subject
    pub fn regenerate(&self, session: &str) -> Result<ConfiguratorSnapshot, IpcError> {
        self.expect_snapshot(&IpcMessage::Regenerate {
            session: session.to_string(),
        })
    }

    /// Convenience method: Current snapshot of a session
    pub fn status(&self, session: &str) -> Result<ConfiguratorSnapshot, IpcError> {
        self.expect_snapshot(&IpcMessage::Status {
            session: session.to_string(),
        })
    }

    /// Convenience method: Expect an `Ok` acknowledgement
    pub fn acknowledge(&self, message: &IpcMessage) -> Result<(), IpcError> {
        match self.send(message)? {
            IpcResponse::Ok => Ok(()),
            _ => Err(IpcError::InvalidResponse("Unexpected response type".into())),
        }
    }

    fn expect_snapshot(&self, message: &IpcMessage) -> Result<ConfiguratorSnapshot, IpcError> {
        match self.send(message)? {
            IpcResponse::Configurator(snapshot) => Ok(snapshot),
            _ => Err(IpcError::InvalidResponse("Unexpected response type".into())),
        }
    }
}

/// Check if the daemon is running
pub fn is_daemon_running() -> bool {
    IpcClient::new().daemon_available()
}
