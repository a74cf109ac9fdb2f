//! Interpreter command building.

use std::{path::PathBuf, process::Stdio};

use psdirect_core::RunnerError;
use psdirect_host::{apply_env_overrides, resolve_executable_path, resolve_powershell};
use tokio::process::Command;

use crate::RunnerOptions;

/// Fixed interpreter flags preceding the script path.
const BASE_ARGS: [&str; 4] = ["-ExecutionPolicy", "Bypass", "-NoProfile", "-File"];

/// A PowerShell invocation of a staged script file.
#[derive(Debug, Clone)]
pub struct PowerShellCommand {
    /// Interpreter executable.
    pub interpreter: PathBuf,
    /// Script path as the interpreter sees it.
    pub script_path: String,
    /// Positional script parameters.
    pub params: Vec<String>,
}

impl PowerShellCommand {
    /// Create a new invocation.
    #[must_use]
    pub fn new(interpreter: PathBuf, script_path: impl Into<String>, params: &[String]) -> Self {
        Self {
            interpreter,
            script_path: script_path.into(),
            params: params.to_vec(),
        }
    }

    /// Interpreter arguments: fixed flags, script path, then params.
    #[must_use]
    pub fn args(&self) -> Vec<String> {
        BASE_ARGS
            .iter()
            .map(ToString::to_string)
            .chain(std::iter::once(self.script_path.clone()))
            .chain(self.params.iter().cloned())
            .collect()
    }

    /// Build the process command with piped stdout and stderr.
    #[must_use]
    pub fn to_command(&self, options: &RunnerOptions) -> Command {
        let mut cmd = Command::new(&self.interpreter);
        cmd.args(self.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if !options.env.is_empty() {
            cmd.env_clear()
                .envs(apply_env_overrides(std::env::vars_os(), &options.env));
        }

        cmd
    }
}

/// Locate the interpreter, honouring an explicit override.
///
/// # Errors
/// Returns `InterpreterNotFound` if nothing usable is found.
pub async fn resolve_interpreter(options: &RunnerOptions) -> Result<PathBuf, RunnerError> {
    let found = match options.interpreter.as_deref() {
        Some(explicit) => resolve_executable_path(explicit).await,
        None => resolve_powershell().await,
    };
    found.ok_or(RunnerError::InterpreterNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_layout() {
        let cmd = PowerShellCommand::new(
            PathBuf::from("powershell.exe"),
            "C:\\Temp\\psdirect-1.ps1",
            &["vm".to_string(), "user".to_string()],
        );
        assert_eq!(
            cmd.args(),
            vec![
                "-ExecutionPolicy",
                "Bypass",
                "-NoProfile",
                "-File",
                "C:\\Temp\\psdirect-1.ps1",
                "vm",
                "user"
            ]
        );
    }

    #[test]
    fn test_to_command_program() {
        let cmd = PowerShellCommand::new(PathBuf::from("pwsh"), "s.ps1", &[]);
        let built = cmd.to_command(&RunnerOptions::default());
        assert_eq!(built.as_std().get_program(), "pwsh");
        assert_eq!(built.as_std().get_args().count(), 5);
    }

    #[test]
    fn test_to_command_applies_env_overrides() {
        let cmd = PowerShellCommand::new(PathBuf::from("pwsh"), "s.ps1", &[]);
        let options = RunnerOptions::default().with_env("PSDIRECT_TEST_VAR", "value");
        let built = cmd.to_command(&options);
        let value = built
            .as_std()
            .get_envs()
            .find(|(k, _)| k.to_str() == Some("PSDIRECT_TEST_VAR"))
            .and_then(|(_, v)| v);
        assert_eq!(value, Some(std::ffi::OsStr::new("value")));
    }

    #[tokio::test]
    async fn test_missing_explicit_interpreter() {
        let options = RunnerOptions {
            interpreter: Some("/definitely/not/a/powershell".to_string()),
            ..RunnerOptions::default()
        };
        assert!(matches!(
            resolve_interpreter(&options).await,
            Err(RunnerError::InterpreterNotFound)
        ));
    }
}
