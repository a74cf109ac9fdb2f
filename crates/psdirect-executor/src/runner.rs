//! `Runner` backed by a local PowerShell interpreter.

use async_trait::async_trait;
use psdirect_core::{Runner, RunnerError, Script, StreamProcess};
use psdirect_host::HostPaths;

use crate::{
    ExecStreamProcess, PowerShellCommand, RunnerOptions, StagedScript,
    command::resolve_interpreter,
};

/// Runs scripts through PowerShell on this host.
#[derive(Debug, Clone, Default)]
pub struct PowerShellRunner {
    options: RunnerOptions,
    host: HostPaths,
}

impl PowerShellRunner {
    /// Create a runner for the current host.
    #[must_use]
    pub fn new(options: RunnerOptions) -> Self {
        Self {
            options,
            host: HostPaths::detect(),
        }
    }

    /// Create a runner with an explicit path translator.
    #[must_use]
    pub const fn with_host(options: RunnerOptions, host: HostPaths) -> Self {
        Self { options, host }
    }

    async fn prepare(
        &self,
        script: &Script,
        params: &[String],
    ) -> Result<(PowerShellCommand, StagedScript), RunnerError> {
        let interpreter = resolve_interpreter(&self.options).await?;
        let staged = StagedScript::stage(script, self.options.keep_scripts, self.host).await?;
        let command = PowerShellCommand::new(interpreter, staged.invoke_path(), params);

        if self.options.verbose {
            tracing::debug!(
                script = script.name,
                interpreter = %command.interpreter.display(),
                path = staged.invoke_path(),
                params = params.len(),
                "Run"
            );
        }

        Ok((command, staged))
    }

    async fn execute(
        &self,
        script: &Script,
        params: &[String],
        capture: bool,
    ) -> Result<String, RunnerError> {
        let (command, staged) = self.prepare(script, params).await?;
        let output = command.to_command(&self.options).output().await;
        staged.cleanup();
        let output = output.map_err(RunnerError::Spawn)?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if self.options.verbose {
            if !stdout.is_empty() {
                tracing::debug!(script = script.name, "stdout: {stdout}");
            }
            if !stderr.is_empty() {
                tracing::debug!(script = script.name, "stderr: {stderr}");
            }
        }

        if !stderr.is_empty() {
            return Err(RunnerError::ScriptFailed {
                message: format!("PowerShell error: {stderr}"),
            });
        }
        if !output.status.success() {
            return Err(RunnerError::ScriptFailed {
                message: format!("PowerShell error: {}", output.status),
            });
        }

        Ok(if capture { stdout } else { String::new() })
    }
}

#[async_trait]
impl Runner for PowerShellRunner {
    async fn run(&self, script: &Script, params: &[String]) -> Result<(), RunnerError> {
        self.execute(script, params, false).await.map(|_| ())
    }

    async fn output(&self, script: &Script, params: &[String]) -> Result<String, RunnerError> {
        self.execute(script, params, true).await
    }

    async fn stream(
        &self,
        script: &Script,
        params: &[String],
    ) -> Result<Box<dyn StreamProcess>, RunnerError> {
        let (command, staged) = self.prepare(script, params).await?;
        let process = ExecStreamProcess::spawn(&mut command.to_command(&self.options), Some(staged))?;
        Ok(Box::new(process))
    }
}
