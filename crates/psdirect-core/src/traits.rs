//! Core traits for script execution and guest communication.

use std::pin::Pin;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::{ConfigError, RemoteCmd};

/// Readable byte stream owned by whoever takes it.
pub type BoxedReader = Pin<Box<dyn AsyncRead + Send>>;

/// A named script body executed through a [`Runner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Script {
    /// Stable name, used for logging and for identifying invocations.
    pub name: &'static str,
    /// Script source.
    pub body: &'static str,
}

/// Runner error.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("cannot find PowerShell in PATH")]
    InterpreterNotFound,
    #[error("failed to stage script: {0}")]
    Staging(#[source] std::io::Error),
    #[error("failed to spawn PowerShell: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("{message}")]
    ScriptFailed { message: String },
    #[error("process exited with status {code}")]
    Exit { code: i32 },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Handle to a script running in streaming mode.
#[async_trait]
pub trait StreamProcess: Send + Sync {
    /// Take the stdout stream. Returns `None` if absent or already taken.
    fn take_stdout(&mut self) -> Option<BoxedReader>;

    /// Take the stderr stream. Returns `None` if absent or already taken.
    fn take_stderr(&mut self) -> Option<BoxedReader>;

    /// Wait for the process to exit.
    ///
    /// # Errors
    /// Returns error on non-zero exit or I/O failure.
    async fn wait(&self) -> Result<(), RunnerError>;

    /// Forcibly terminate the process. Safe to call after `wait` returned,
    /// concurrently with `wait`, and more than once.
    ///
    /// # Errors
    /// Returns error if the termination request fails.
    async fn kill(&self) -> Result<(), RunnerError>;
}

/// Executes scripts on the host.
#[async_trait]
pub trait Runner: Send + Sync {
    /// Run a script to completion, discarding its output.
    ///
    /// # Errors
    /// Returns error on spawn failure or non-zero exit.
    async fn run(&self, script: &Script, params: &[String]) -> Result<(), RunnerError>;

    /// Run a script to completion, capturing stdout.
    ///
    /// # Errors
    /// Returns error on spawn failure or non-zero exit.
    async fn output(&self, script: &Script, params: &[String]) -> Result<String, RunnerError>;

    /// Spawn a script and return as soon as it is running.
    ///
    /// # Errors
    /// Returns error if the interpreter is missing, staging fails, or spawn fails.
    async fn stream(
        &self,
        script: &Script,
        params: &[String],
    ) -> Result<Box<dyn StreamProcess>, RunnerError>;
}

/// Communicator error.
#[derive(Debug, Error)]
pub enum CommunicatorError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
    #[error("{0}")]
    InvalidArgument(&'static str),
    #[error("powershell-direct communicator does not support exclude filters")]
    UnsupportedExclude,
    #[error("powershell-direct communicator {0}")]
    UnsupportedHost(&'static str),
    #[error(transparent)]
    Runner(#[from] RunnerError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("command cancelled before dispatch")]
    Cancelled,
}

/// Generic remote-command and file-transfer contract.
#[async_trait]
pub trait Communicator: Send + Sync {
    /// Start a command. Returns once the command is dispatched; completion
    /// is observed through the command's exit handle.
    ///
    /// # Errors
    /// Returns error if `cmd` is `None`, cancellation was already requested,
    /// or the command could not be dispatched.
    async fn start(
        &self,
        cmd: Option<RemoteCmd>,
        cancel: &CancellationToken,
    ) -> Result<(), CommunicatorError>;

    /// Copy the contents of `input` to `path` in the guest.
    ///
    /// # Errors
    /// Returns error if `input` is `None` or the copy fails.
    async fn upload(
        &self,
        path: &str,
        input: Option<&mut (dyn AsyncRead + Send + Unpin)>,
    ) -> Result<(), CommunicatorError>;

    /// Copy a host directory tree into the guest.
    ///
    /// # Errors
    /// Returns error if `exclude` is non-empty or the copy fails.
    async fn upload_dir(
        &self,
        dst: &str,
        src: &str,
        exclude: &[String],
    ) -> Result<(), CommunicatorError>;

    /// Copy a guest file into `output`.
    ///
    /// # Errors
    /// Returns error if `output` is `None` or the copy fails.
    async fn download(
        &self,
        path: &str,
        output: Option<&mut (dyn AsyncWrite + Send + Unpin)>,
    ) -> Result<(), CommunicatorError>;

    /// Copy a guest directory tree onto the host.
    ///
    /// # Errors
    /// Returns error if `exclude` is non-empty or the copy fails.
    async fn download_dir(
        &self,
        src: &str,
        dst: &str,
        exclude: &[String],
    ) -> Result<(), CommunicatorError>;
}
