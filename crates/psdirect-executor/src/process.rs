//! Streaming handle over a spawned interpreter process group.

use std::sync::PoisonError;

use async_trait::async_trait;
use command_group::{AsyncCommandGroup, AsyncGroupChild};
use psdirect_core::{BoxedReader, RunnerError, StreamProcess};
use tokio::{
    process::{ChildStderr, ChildStdout, Command},
    sync::{Mutex, Notify},
};

use crate::StagedScript;

/// A running interpreter process.
///
/// `wait` and `kill` may race: a kill requested while `wait` holds the
/// child is delivered through `kill_requested`. The staged script is
/// removed by whichever of the two finishes first.
pub struct ExecStreamProcess {
    child: Mutex<AsyncGroupChild>,
    kill_requested: Notify,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    script: std::sync::Mutex<Option<StagedScript>>,
}

impl ExecStreamProcess {
    /// Spawn `command` in its own process group.
    ///
    /// The staged script is removed immediately if the spawn fails.
    ///
    /// # Errors
    /// Returns `Spawn` if the process cannot be started.
    pub fn spawn(command: &mut Command, script: Option<StagedScript>) -> Result<Self, RunnerError> {
        let mut child = command.group_spawn().map_err(RunnerError::Spawn)?;
        let stdout = child.inner().stdout.take();
        let stderr = child.inner().stderr.take();

        tracing::debug!(pid = ?child.id(), "Spawned streaming process");

        Ok(Self {
            child: Mutex::new(child),
            kill_requested: Notify::new(),
            stdout,
            stderr,
            script: std::sync::Mutex::new(script),
        })
    }

    fn release_script(&self) {
        let script = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(script) = script {
            script.cleanup();
        }
    }
}

#[async_trait]
impl StreamProcess for ExecStreamProcess {
    fn take_stdout(&mut self) -> Option<BoxedReader> {
        self.stdout.take().map(|s| Box::pin(s) as BoxedReader)
    }

    fn take_stderr(&mut self) -> Option<BoxedReader> {
        self.stderr.take().map(|s| Box::pin(s) as BoxedReader)
    }

    async fn wait(&self) -> Result<(), RunnerError> {
        let mut child = self.child.lock().await;
        let status = tokio::select! {
            status = child.wait() => status,
            () = self.kill_requested.notified() => {
                if let Err(e) = child.start_kill() {
                    tracing::debug!("Kill request on exiting process failed: {e}");
                }
                child.wait().await
            }
        };
        drop(child);
        self.release_script();

        let status = status?;
        if status.success() {
            Ok(())
        } else {
            Err(RunnerError::Exit {
                code: status.code().unwrap_or(-1),
            })
        }
    }

    async fn kill(&self) -> Result<(), RunnerError> {
        self.kill_requested.notify_one();

        let result = match self.child.try_lock() {
            Ok(mut child) => match child.try_wait() {
                Ok(Some(_)) => Ok(()),
                _ => child.start_kill().map_err(RunnerError::from),
            },
            // A waiter holds the child and will act on the notification.
            Err(_) => Ok(()),
        };

        self.release_script();
        result
    }
}
