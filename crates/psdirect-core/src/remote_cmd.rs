//! Remote command handle: command text, output sinks and exit status.

use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, watch};

/// Why a command finished without an exit code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("command cancelled before dispatch")]
    Cancelled,
    #[error("command dispatch failed: {0}")]
    Dispatch(String),
    #[error("command was dropped before it finished")]
    Abandoned,
}

type Outcome = Option<Result<i32, CommandError>>;

/// Shared, append-only output destination.
///
/// Cloning shares the underlying writer; every write is appended as one
/// unit and flushed.
#[derive(Clone)]
pub struct OutputSink {
    writer: Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>,
}

impl OutputSink {
    /// Wrap a writer.
    #[must_use]
    pub fn new(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Append raw bytes.
    ///
    /// # Errors
    /// Returns error if the write fails.
    pub async fn write(&self, data: &[u8]) -> Result<(), std::io::Error> {
        let mut guard = self.writer.lock().await;
        guard.write_all(data).await?;
        guard.flush().await
    }

    /// Append a line of text, ignoring write failures.
    pub async fn write_line(&self, line: &str) {
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
        if let Err(e) = self.write(&buf).await {
            tracing::warn!("Failed to write to output sink: {e}");
        }
    }

    /// Shut the writer down.
    ///
    /// # Errors
    /// Returns error if the writer fails to shut down.
    pub async fn shutdown(&self) -> Result<(), std::io::Error> {
        self.writer.lock().await.shutdown().await
    }
}

impl std::fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSink").finish_non_exhaustive()
    }
}

/// Write side of a command's exit status. First resolution wins.
#[derive(Clone, Debug)]
pub struct ExitNotifier {
    tx: Arc<watch::Sender<Outcome>>,
}

impl ExitNotifier {
    /// Resolve with an exit code. Returns `false` if already resolved.
    pub fn set_exited(&self, code: i32) -> bool {
        self.resolve(Ok(code))
    }

    /// Resolve with an error. Returns `false` if already resolved.
    pub fn set_error(&self, err: CommandError) -> bool {
        self.resolve(Err(err))
    }

    fn resolve(&self, outcome: Result<i32, CommandError>) -> bool {
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
            true
        })
    }
}

/// Read side of a command's exit status.
#[derive(Clone, Debug)]
pub struct ExitHandle {
    rx: watch::Receiver<Outcome>,
}

impl ExitHandle {
    /// Wait for the command to finish.
    ///
    /// # Errors
    /// Returns the recorded error, or `Abandoned` if every notifier was
    /// dropped without resolving.
    pub async fn wait(&self) -> Result<i32, CommandError> {
        let mut rx = self.rx.clone();
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(slot) => slot.clone(),
            Err(_) => return Err(CommandError::Abandoned),
        };
        outcome.unwrap_or(Err(CommandError::Abandoned))
    }

    /// Current status without waiting.
    #[must_use]
    pub fn try_status(&self) -> Option<Result<i32, CommandError>> {
        self.rx.borrow().clone()
    }
}

/// A command to run inside the guest.
#[derive(Debug)]
pub struct RemoteCmd {
    /// Command text handed to the guest shell.
    pub command: String,
    /// Destination for guest stdout. `None` discards it.
    pub stdout: Option<OutputSink>,
    /// Destination for guest stderr and wrapper diagnostics. `None` discards it.
    pub stderr: Option<OutputSink>,
    exit: ExitNotifier,
    handle: ExitHandle,
}

impl RemoteCmd {
    /// Create a command with no sinks attached.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        let (tx, rx) = watch::channel(None);
        Self {
            command: command.into(),
            stdout: None,
            stderr: None,
            exit: ExitNotifier { tx: Arc::new(tx) },
            handle: ExitHandle { rx },
        }
    }

    /// Attach a stdout sink.
    #[must_use]
    pub fn with_stdout(mut self, writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        self.stdout = Some(OutputSink::new(writer));
        self
    }

    /// Attach a stderr sink.
    #[must_use]
    pub fn with_stderr(mut self, writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        self.stderr = Some(OutputSink::new(writer));
        self
    }

    /// Handle for awaiting the exit status. Take it before starting the command.
    #[must_use]
    pub fn exit_handle(&self) -> ExitHandle {
        self.handle.clone()
    }

    /// Notifier that resolves the exit status.
    #[must_use]
    pub fn notifier(&self) -> ExitNotifier {
        self.exit.clone()
    }

    /// Resolve with an exit code. Later resolutions are ignored.
    pub fn set_exited(&self, code: i32) -> bool {
        self.exit.set_exited(code)
    }

    /// Resolve with an error. Later resolutions are ignored.
    pub fn set_error(&self, err: CommandError) -> bool {
        self.exit.set_error(err)
    }
}
