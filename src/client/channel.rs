//! Client side of the stdio transport.
//!
//! A [`Channel`] owns the server process and both ends of its stdio. Outgoing
//! requests are written as single JSON lines; a background reader task parses
//! incoming lines and hands each response to the request waiting on its id.
//! Several requests may be outstanding at once and responses may arrive in
//! any order.
//!
//! When the server's output ends, every waiting request fails with
//! [`TransportError::Closed`] and new requests are refused.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::mcp::protocol::{
    parse_server_message, JsonRpcRequest, OutgoingNotification, Outcome, RequestId,
    ResponseMessage, ServerMessage,
};

/// How to start the server process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnSpec {
    /// Program to execute.
    pub command: String,
    /// Arguments passed to the program.
    pub args: Vec<String>,
    /// Environment overrides on top of the inherited environment.
    pub env: BTreeMap<String, String>,
    /// Keep the process running across `close`/`connect` cycles.
    pub keep_alive: bool,
}

impl SpawnSpec {
    /// A spec for `command` with no arguments, keep-alive enabled.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            keep_alive: true,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets an environment variable for the process.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Sets the keep-alive flag.
    #[must_use]
    pub const fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }
}

#[derive(Default)]
struct Pending {
    waiting: HashMap<RequestId, oneshot::Sender<ResponseMessage>>,
    closed: bool,
}

type SharedPending = Arc<std::sync::Mutex<Pending>>;

fn lock(pending: &SharedPending) -> MutexGuard<'_, Pending> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes a request's pending entry when dropped, so an abandoned request
/// leaves nothing behind. A delivered response has already removed it.
struct Waiting<'a> {
    pending: &'a SharedPending,
    id: RequestId,
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        lock(self.pending).waiting.remove(&self.id);
    }
}
type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// A duplex message channel to an MCP server.
pub struct Channel {
    writer: Mutex<Option<Writer>>,
    pending: SharedPending,
    next_id: AtomicI64,
    timeout: Duration,
    reader: JoinHandle<()>,
    child: Option<Child>,
}

impl Channel {
    /// Starts the server process and opens a channel to it.
    ///
    /// The process is killed when the channel is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Spawn`] if the process cannot be started.
    pub async fn connect(spec: &SpawnSpec, timeout: Duration) -> Result<Self, TransportError> {
        let mut child = Command::new(&spec.command)
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TransportError::Spawn {
                command: spec.command.clone(),
                source,
            })?;

        let input = child
            .stdin
            .take()
            .ok_or(TransportError::MissingPipe("stdin"))?;
        let output = child
            .stdout
            .take()
            .ok_or(TransportError::MissingPipe("stdout"))?;

        if let Some(stderr) = child.stderr.take() {
            drop(tokio::spawn(forward_stderr(stderr)));
        }

        debug!(command = %spec.command, pid = ?child.id(), "Server process started");

        let mut channel = Self::from_streams(output, input, timeout);
        channel.child = Some(child);
        Ok(channel)
    }

    /// Opens a channel over existing streams: `output` carries the server's
    /// messages, `input` receives ours.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn from_streams(
        output: impl AsyncRead + Send + Unpin + 'static,
        input: impl AsyncWrite + Send + Unpin + 'static,
        timeout: Duration,
    ) -> Self {
        let pending = SharedPending::default();
        let reader = tokio::spawn(read_loop(output, Arc::clone(&pending)));

        Self {
            writer: Mutex::new(Some(Box::new(input))),
            pending,
            next_id: AtomicI64::new(1),
            timeout,
            reader,
            child: None,
        }
    }

    /// Whether the server's output is still open.
    pub fn is_open(&self) -> bool {
        !lock(&self.pending).closed
    }

    /// Sends a request and waits for the response with the same id.
    ///
    /// # Errors
    ///
    /// - [`TransportError::Closed`] if the channel closes first
    /// - [`TransportError::Timeout`] if no response arrives in time; the
    ///   request may still have been executed
    /// - [`TransportError::Io`] if writing fails
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Outcome, TransportError> {
        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = oneshot::channel();

        {
            let mut pending = lock(&self.pending);
            if pending.closed {
                return Err(TransportError::Closed);
            }
            pending.waiting.insert(id.clone(), sender);
        }
        let _waiting = Waiting {
            pending: &self.pending,
            id: id.clone(),
        };

        debug!(%id, method, "Sending request");

        self.write(&JsonRpcRequest::new(id.clone(), method, params))
            .await?;

        match tokio::time::timeout(self.timeout, receiver).await {
            Ok(Ok(response)) => Ok(response.into_outcome()),
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => {
                warn!(%id, method, "Request timed out");
                Err(TransportError::Timeout {
                    method: method.to_string(),
                    after: self.timeout,
                })
            }
        }
    }

    /// Sends a notification.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel is closed or writing fails.
    pub async fn notify(&self, notification: &OutgoingNotification) -> Result<(), TransportError> {
        self.write(notification).await
    }

    /// Closes our end of the channel and waits up to `grace` for the server
    /// process to exit before killing it.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] if the process cannot be killed.
    pub async fn shutdown(&mut self, grace: Duration) -> Result<(), TransportError> {
        // End of input is the server's signal to exit.
        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(error) = writer.shutdown().await {
                debug!(%error, "Failed to shut down server input");
            }
        }

        if let Some(mut child) = self.child.take() {
            match tokio::time::timeout(grace, child.wait()).await {
                Ok(Ok(status)) => debug!(%status, "Server process exited"),
                Ok(Err(error)) => warn!(%error, "Failed to wait for server process"),
                Err(_) => {
                    debug!("Server process did not exit in time, killing it");
                    child.kill().await?;
                }
            }
        }

        self.reader.abort();
        Ok(())
    }

    async fn write(&self, message: &impl Serialize) -> Result<(), TransportError> {
        let mut json = serde_json::to_vec(message).map_err(TransportError::Encode)?;
        json.push(b'\n');

        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or(TransportError::Closed)?;

        writer.write_all(&json).await?;
        writer.flush().await?;
        Ok(())
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("next_id", &self.next_id)
            .field("timeout", &self.timeout)
            .field("pid", &self.child.as_ref().and_then(Child::id))
            .finish_non_exhaustive()
    }
}

async fn read_loop(output: impl AsyncRead + Unpin, pending: SharedPending) {
    let mut reader = BufReader::new(output);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => {
                debug!("Server closed its output");
                break;
            }
            Ok(_) => {}
            Err(error) => {
                warn!(%error, "Failed to read from server");
                break;
            }
        }

        let Ok(line) = std::str::from_utf8(&buf) else {
            warn!("Discarding message from server that is not valid UTF-8");
            continue;
        };
        let message = line.trim();
        if message.is_empty() {
            continue;
        }

        match parse_server_message(message) {
            Ok(ServerMessage::Response(response)) => {
                let Some(id) = response.id.clone() else {
                    warn!(error = ?response.error, "Server reported an error without a request id");
                    continue;
                };

                let waiting = lock(&pending).waiting.remove(&id);
                match waiting {
                    Some(sender) => {
                        let _ = sender.send(response);
                    }
                    None => debug!(%id, "Discarding response to unknown request"),
                }
            }
            Ok(ServerMessage::Initiated { method }) => {
                debug!(method, "Ignoring server-initiated message");
            }
            Err(error) => warn!(%error, "Discarding malformed message from server"),
        }
    }

    let mut pending = lock(&pending);
    pending.closed = true;
    // Dropping the senders fails every waiting request.
    pending.waiting.clear();
}

async fn forward_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "doc_assistant_mcp::server_stderr", "{line}");
    }
}
