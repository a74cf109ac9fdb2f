//! The PowerShell Direct [`Communicator`].

use std::sync::Arc;

use async_trait::async_trait;
use psdirect_core::{
    Communicator, CommunicatorError, PowershellDirectConfig, RemoteCmd, Runner, SessionIdentity,
};
use psdirect_executor::{PowerShellRunner, RunnerOptions};
use psdirect_host::{HostPaths, is_wsl};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::{session, transfer};

/// Communicator that reaches a Hyper-V guest through PowerShell Direct.
///
/// Holds no connection of its own: every operation launches a script
/// that opens and closes its own PowerShell Direct session.
pub struct DirectCommunicator {
    identity: SessionIdentity,
    runner: Arc<dyn Runner>,
    host: HostPaths,
}

impl DirectCommunicator {
    /// Create a communicator for `vm_name` using the local interpreter.
    ///
    /// A blank `vm_name` falls back to the configured VM name.
    ///
    /// # Errors
    /// Returns `UnsupportedHost` off Windows and WSL, or `Configuration` if
    /// the identity is incomplete.
    pub fn new(vm_name: &str, config: &PowershellDirectConfig) -> Result<Self, CommunicatorError> {
        if !(cfg!(windows) || is_wsl()) {
            return Err(CommunicatorError::UnsupportedHost(
                "requires a Windows or WSL host",
            ));
        }

        let identity = config.identity(Some(vm_name))?;
        let host = HostPaths::detect();
        let runner = PowerShellRunner::with_host(RunnerOptions::from_env(), host);

        tracing::info!(
            vm = identity.vm_name(),
            wsl = host.is_wsl(),
            "Connecting to virtual machine using PowerShell Direct"
        );

        Ok(Self {
            identity,
            runner: Arc::new(runner),
            host,
        })
    }

    /// Create a communicator over an explicit runner.
    #[must_use]
    pub fn with_runner(identity: SessionIdentity, runner: Arc<dyn Runner>) -> Self {
        Self {
            identity,
            runner,
            host: HostPaths::detect(),
        }
    }

    /// Replace the host path translator.
    #[must_use]
    pub const fn with_host_paths(mut self, host: HostPaths) -> Self {
        self.host = host;
        self
    }

    /// Identity every script is invoked with.
    #[must_use]
    pub const fn identity(&self) -> &SessionIdentity {
        &self.identity
    }
}

impl std::fmt::Debug for DirectCommunicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectCommunicator")
            .field("identity", &self.identity)
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Communicator for DirectCommunicator {
    async fn start(
        &self,
        cmd: Option<RemoteCmd>,
        cancel: &CancellationToken,
    ) -> Result<(), CommunicatorError> {
        session::start(self.runner.as_ref(), &self.identity, cmd, cancel).await
    }

    async fn upload(
        &self,
        path: &str,
        input: Option<&mut (dyn AsyncRead + Send + Unpin)>,
    ) -> Result<(), CommunicatorError> {
        transfer::upload(self.runner.as_ref(), &self.identity, self.host, path, input).await
    }

    async fn upload_dir(
        &self,
        dst: &str,
        src: &str,
        exclude: &[String],
    ) -> Result<(), CommunicatorError> {
        transfer::upload_dir(self.runner.as_ref(), &self.identity, self.host, dst, src, exclude).await
    }

    async fn download(
        &self,
        path: &str,
        output: Option<&mut (dyn AsyncWrite + Send + Unpin)>,
    ) -> Result<(), CommunicatorError> {
        transfer::download(self.runner.as_ref(), &self.identity, self.host, path, output).await
    }

    async fn download_dir(
        &self,
        src: &str,
        dst: &str,
        exclude: &[String],
    ) -> Result<(), CommunicatorError> {
        transfer::download_dir(self.runner.as_ref(), &self.identity, self.host, src, dst, exclude)
            .await
    }
}
