//! Client side of the daemon's Unix socket protocol.
//!
//! One JSON object per line in each direction. Requests are tagged by `cmd`;
//! responses carry `ok` plus either `data` or `error`.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{io_err, DaemonError};
use crate::paths::socket_path;

/// Everything a client can ask the daemon to do.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "kebab-case")]
pub enum DaemonRequest {
    /// Merged detection and sync state plus daemon runtime info.
    Status,
    /// Run a propagation pass through the daemon's gate.
    Sync {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
    },
    /// Render the manual config payload for one target.
    Manual { target: String },
    /// The registry changed; schedule a debounced automatic pass.
    NotifyChange,
    /// Shut the daemon down cleanly.
    Stop,
}

/// Wire response. `data` is present on success, `error` on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub ok: bool,
    /// Payload, set when `ok` is true.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Failure message, set when `ok` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonResponse {
    pub fn ok(data: Value) -> Self {
        Self { ok: true, data: Some(data), error: None }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { ok: false, data: None, error: Some(message.into()) }
    }
}

/// Send one request to the daemon socket and wait for its response line.
pub fn send_request(home: &Path, request: &DaemonRequest) -> Result<DaemonResponse, DaemonError> {
    let socket = socket_path(home);
    let mut stream = connect(&socket)?;

    let mut payload = serde_json::to_string(request)?;
    payload.push('\n');
    stream
        .write_all(payload.as_bytes())
        .and_then(|()| stream.flush())
        .map_err(|e| io_err(&socket, e))?;

    let mut line = String::new();
    let read = BufReader::new(stream)
        .read_line(&mut line)
        .map_err(|e| io_err(&socket, e))?;
    if read == 0 {
        return Err(DaemonError::Protocol(
            "daemon closed the connection without responding".to_string(),
        ));
    }
    Ok(serde_json::from_str(line.trim_end())?)
}

/// Whether a daemon is accepting connections on the socket right now.
pub fn daemon_running(home: &Path) -> bool {
    connect(&socket_path(home)).is_ok()
}

fn connect(socket: &Path) -> Result<UnixStream, DaemonError> {
    if !socket.exists() {
        return Err(DaemonError::DaemonNotRunning {
            socket: socket.to_path_buf(),
        });
    }
    UnixStream::connect(socket).map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound
        | std::io::ErrorKind::ConnectionRefused
        | std::io::ErrorKind::ConnectionReset => DaemonError::DaemonNotRunning {
            socket: socket.to_path_buf(),
        },
        _ => io_err(socket, err),
    })
}

/// `status`, retried briefly so `daemon start` can query its freshly spawned
/// daemon before the socket accepts.
pub fn request_status(home: &Path) -> Result<Value, DaemonError> {
    for _ in 0..4 {
        match send_request(home, &DaemonRequest::Status) {
            Err(DaemonError::DaemonNotRunning { .. }) => sleep(Duration::from_millis(100)),
            other => return other.and_then(expect_data),
        }
    }
    send_request(home, &DaemonRequest::Status).and_then(expect_data)
}

pub fn request_sync(home: &Path, target: Option<String>) -> Result<Value, DaemonError> {
    send_request(home, &DaemonRequest::Sync { target }).and_then(expect_data)
}

pub fn request_manual(home: &Path, target: String) -> Result<Value, DaemonError> {
    send_request(home, &DaemonRequest::Manual { target }).and_then(expect_data)
}

/// Tell a running daemon the registry changed. Callers treat failure as
/// "no daemon to notify".
pub fn request_notify_change(home: &Path) -> Result<Value, DaemonError> {
    send_request(home, &DaemonRequest::NotifyChange).and_then(expect_data)
}

pub fn request_stop(home: &Path) -> Result<(), DaemonError> {
    send_request(home, &DaemonRequest::Stop)
        .and_then(expect_data)
        .map(|_| ())
}

fn expect_data(response: DaemonResponse) -> Result<Value, DaemonError> {
    if response.ok {
        Ok(response.data.unwrap_or(Value::Null))
    } else {
        Err(DaemonError::Protocol(response.error.unwrap_or_else(|| {
            "daemon reported an unspecified error".to_string()
        })))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
