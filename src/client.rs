use crate::log::LogEvent;
use crate::process::{ManagedProcess, Target};
use crate::protocol::{self, ProtocolError, Request, Response};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_RETRIES: u32 = 5;
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(200);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("cannot reach registry at {path}: {reason}")]
    Connection { path: String, reason: String },
    #[error("not connected to registry")]
    NotConnected,
    #[error("registry did not answer within {0:?}")]
    Timeout(Duration),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("{0}")]
    Rejected(String),
    #[error("registry closed the connection without answering")]
    NoReply,
    #[error("registry does not support {0}")]
    Unsupported(ActionKind),
    #[error("unexpected response from registry: {0}")]
    Unexpected(String),
}

// ---------------------------------------------------------------------------
// Control actions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Start,
    Stop,
    Restart,
    Reload,
    Delete,
}

impl ActionKind {
    pub const ALL: [ActionKind; 5] = [
        ActionKind::Start,
        ActionKind::Stop,
        ActionKind::Restart,
        ActionKind::Reload,
        ActionKind::Delete,
    ];

    pub fn verb(self) -> &'static str {
        match self {
            ActionKind::Start => "start",
            ActionKind::Stop => "stop",
            ActionKind::Restart => "restart",
            ActionKind::Reload => "reload",
            ActionKind::Delete => "delete",
        }
    }

    pub fn past_tense(self) -> &'static str {
        match self {
            ActionKind::Start => "started",
            ActionKind::Stop => "stopped",
            ActionKind::Restart => "restarted",
            ActionKind::Reload => "reloaded",
            ActionKind::Delete => "deleted",
        }
    }

    /// Destructive actions go through a confirmation prompt.
    pub fn is_destructive(self) -> bool {
        matches!(self, ActionKind::Stop | ActionKind::Delete)
    }

    fn request(self, names: Vec<String>) -> Request {
        let names = Some(names);
        match self {
            ActionKind::Start => Request::Start {
                configs: BTreeMap::new(),
                names,
            },
            ActionKind::Stop => Request::Stop { names },
            ActionKind::Restart => Request::Restart { names },
            ActionKind::Reload => Request::Reload { names },
            ActionKind::Delete => Request::Delete { names },
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

// ---------------------------------------------------------------------------
// Log subscription
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum LogMessage {
    Event(LogEvent),
    /// The stream ended. `Some` carries the reason when it broke.
    Closed(Option<String>),
}

pub type LogSink = mpsc::UnboundedSender<LogMessage>;

/// Handle to a live log subscription. Dropping it unsubscribes.
#[derive(Debug, Default)]
pub struct Subscription {
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn from_task(task: JoinHandle<()>) -> Self {
        Self { task: Some(task) }
    }

    /// A subscription with no reader task, for registries that push into the
    /// sink from elsewhere.
    pub fn detached() -> Self {
        Self { task: None }
    }

    /// Idempotent.
    pub fn unsubscribe(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

// ---------------------------------------------------------------------------
// Registry trait
// ---------------------------------------------------------------------------

/// The process supervisor the dashboard observes and controls.
#[async_trait]
pub trait Registry: Send + Sync {
    async fn connect(&self) -> Result<(), RegistryError>;

    async fn disconnect(&self);

    async fn list(&self) -> Result<Vec<ManagedProcess>, RegistryError>;

    async fn start(&self, target: &Target) -> Result<(), RegistryError>;

    async fn stop(&self, target: &Target) -> Result<(), RegistryError>;

    async fn restart(&self, target: &Target) -> Result<(), RegistryError>;

    async fn reload(&self, target: &Target) -> Result<(), RegistryError>;

    async fn delete(&self, target: &Target) -> Result<(), RegistryError>;

    async fn subscribe_logs(&self, sink: LogSink) -> Result<Subscription, RegistryError>;

    async fn perform(&self, kind: ActionKind, target: &Target) -> Result<(), RegistryError> {
        match kind {
            ActionKind::Start => self.start(target).await,
            ActionKind::Stop => self.stop(target).await,
            ActionKind::Restart => self.restart(target).await,
            ActionKind::Reload => self.reload(target).await,
            ActionKind::Delete => self.delete(target).await,
        }
    }
}

// ---------------------------------------------------------------------------
// Unix socket implementation
// ---------------------------------------------------------------------------

/// Talks newline-delimited JSON to a supervisor daemon, one connection per
/// request. The log subscription keeps its own connection open.
pub struct SocketRegistry {
    socket: PathBuf,
    connected: AtomicBool,
    timeout: Duration,
    /// Names from the last list, used to attribute bare log lines.
    known: Arc<Mutex<Vec<String>>>,
}

impl SocketRegistry {
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
            connected: AtomicBool::new(false),
            timeout: REQUEST_TIMEOUT,
            known: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    fn ensure_connected(&self) -> Result<(), RegistryError> {
        if self.connected.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(RegistryError::NotConnected)
        }
    }

    async fn open(&self) -> Result<UnixStream, RegistryError> {
        Ok(UnixStream::connect(&self.socket).await?)
    }

    async fn send(&self, request: &Request) -> Result<Response, RegistryError> {
        let exchange = async {
            let stream = self.open().await?;
            let (reader, mut writer) = stream.into_split();
            writer.write_all(&protocol::encode_request(request)?).await?;
            writer.shutdown().await?;

            let mut reader = BufReader::new(reader);
            let mut line = String::new();
            if reader.read_line(&mut line).await? == 0 {
                return Err(RegistryError::NoReply);
            }
            Ok::<_, RegistryError>(protocol::decode_response(&line)?)
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| RegistryError::Timeout(self.timeout))?
    }

    async fn control(&self, kind: ActionKind, target: &Target) -> Result<(), RegistryError> {
        self.ensure_connected()?;
        // pm3 drops the connection on request types it cannot decode.
        let response = match self.send(&kind.request(vec![target.as_arg()])).await {
            Err(RegistryError::NoReply) => return Err(RegistryError::Unsupported(kind)),
            other => other?,
        };
        match response {
            Response::Success { .. } => Ok(()),
            Response::Error { message } => Err(RegistryError::Rejected(message)),
            other => Err(RegistryError::Unexpected(format!("{other:?}"))),
        }
    }

    fn remember(&self, processes: &[ManagedProcess]) {
        if let Ok(mut known) = self.known.lock() {
            *known = processes.iter().map(|p| p.name.clone()).collect();
        }
    }

    async fn connect_with_retry(&self) -> Result<UnixStream, RegistryError> {
        let mut last_err = None;
        for attempt in 0..CONNECT_RETRIES {
            match UnixStream::connect(&self.socket).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    log::debug!("connect attempt {} failed: {e}", attempt + 1);
                    last_err = Some(e);
                    tokio::time::sleep(CONNECT_RETRY_DELAY).await;
                }
            }
        }
        Err(RegistryError::Connection {
            path: self.socket.display().to_string(),
            reason: last_err
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempts made".to_string()),
        })
    }
}

#[async_trait]
impl Registry for SocketRegistry {
    async fn connect(&self) -> Result<(), RegistryError> {
        drop(self.connect_with_retry().await?);

        // A list round-trip proves the peer speaks our protocol.
        match self.send(&Request::List).await {
            Ok(Response::ProcessList { processes }) => {
                self.remember(&processes);
                self.connected.store(true, Ordering::Release);
                log::info!("connected to registry at {}", self.socket.display());
                Ok(())
            }
            Ok(other) => Err(RegistryError::Connection {
                path: self.socket.display().to_string(),
                reason: format!("unexpected handshake response: {other:?}"),
            }),
            Err(e) => Err(RegistryError::Connection {
                path: self.socket.display().to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn disconnect(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            log::info!("disconnected from registry");
        }
    }

    async fn list(&self) -> Result<Vec<ManagedProcess>, RegistryError> {
        self.ensure_connected()?;
        match self.send(&Request::List).await? {
            Response::ProcessList { processes } => {
                self.remember(&processes);
                Ok(processes)
            }
            Response::Error { message } => Err(RegistryError::Rejected(message)),
            other => Err(RegistryError::Unexpected(format!("{other:?}"))),
        }
    }

    async fn start(&self, target: &Target) -> Result<(), RegistryError> {
        self.control(ActionKind::Start, target).await
    }

    async fn stop(&self, target: &Target) -> Result<(), RegistryError> {
        self.control(ActionKind::Stop, target).await
    }

    async fn restart(&self, target: &Target) -> Result<(), RegistryError> {
        self.control(ActionKind::Restart, target).await
    }

    async fn reload(&self, target: &Target) -> Result<(), RegistryError> {
        self.control(ActionKind::Reload, target).await
    }

    async fn delete(&self, target: &Target) -> Result<(), RegistryError> {
        self.control(ActionKind::Delete, target).await
    }

    async fn subscribe_logs(&self, sink: LogSink) -> Result<Subscription, RegistryError> {
        self.ensure_connected()?;

        let stream = self.open().await?;
        let (reader, mut writer) = stream.into_split();
        let request = Request::Log {
            name: None,
            lines: 0,
            follow: true,
        };
        writer.write_all(&protocol::encode_request(&request)?).await?;
        writer.shutdown().await?;

        let known = Arc::clone(&self.known);
        let task = tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            let reason = loop {
                match lines.next_line().await {
                    Ok(Some(line)) => match protocol::decode_response(&line) {
                        Ok(Response::LogLine {
                            id,
                            name,
                            stream,
                            line,
                        }) => {
                            // pm3 only names the source when it follows several.
                            let name = match (id, name) {
                                (None, None) => sole_process(&known),
                                (_, name) => name,
                            };
                            let Some(event) = LogEvent::from_wire(id, name, stream, line) else {
                                log::debug!("dropping unattributed log line");
                                continue;
                            };
                            if sink.send(LogMessage::Event(event)).is_err() {
                                return;
                            }
                        }
                        Ok(Response::Error { message }) => break Some(message),
                        Ok(other) => log::debug!("ignoring non-log message: {other:?}"),
                        Err(e) => log::debug!("malformed log stream line: {e}"),
                    },
                    Ok(None) => break None,
                    Err(e) => break Some(e.to_string()),
                }
            };
            let _ = sink.send(LogMessage::Closed(reason));
        });

        Ok(Subscription::from_task(task))
    }
}

fn sole_process(known: &Mutex<Vec<String>>) -> Option<String> {
    let known = known.lock().ok()?;
    match known.as_slice() {
        [only] => Some(only.clone()),
        _ => None,
    }
}
