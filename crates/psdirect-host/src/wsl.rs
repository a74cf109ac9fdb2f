//! WSL detection and path conversion.
//!
//! Under WSL the interpreter is a Windows binary, so every path handed to
//! it must be a Windows path, and staged scripts must live somewhere
//! Windows can read.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    sync::OnceLock,
};

use thiserror::Error;
use tokio::process::Command;

/// WSL helper error.
#[derive(Debug, Error)]
pub enum WslError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} failed: {stderr}")]
    Failed {
        program: &'static str,
        stderr: String,
    },
    #[error("{program} returned no output")]
    EmptyOutput { program: &'static str },
}

/// Whether this process runs under WSL. Checked once.
#[must_use]
pub fn is_wsl() -> bool {
    static IS_WSL: OnceLock<bool> = OnceLock::new();
    *IS_WSL.get_or_init(|| {
        if std::env::var_os("WSL_DISTRO_NAME").is_some() {
            return true;
        }
        std::fs::read_to_string("/proc/sys/kernel/osrelease")
            .is_ok_and(|release| release_is_wsl(&release))
    })
}

fn release_is_wsl(release: &str) -> bool {
    release.to_ascii_lowercase().contains("microsoft")
}

/// Convert a WSL path to the Windows form (`wslpath -w`).
///
/// # Errors
/// Returns error if `wslpath` fails.
pub async fn to_windows_path(path: &Path) -> Result<String, WslError> {
    let arg = path.to_string_lossy();
    run_capture("wslpath", &["-w", arg.as_ref()]).await
}

/// Convert a Windows path to the WSL form (`wslpath -u`).
///
/// # Errors
/// Returns error if `wslpath` fails.
pub async fn to_wsl_path(path: &str) -> Result<PathBuf, WslError> {
    run_capture("wslpath", &["-u", path]).await.map(PathBuf::from)
}

/// The Windows temp directory as a WSL path.
///
/// # Errors
/// Returns error if `cmd.exe` or `wslpath` fails.
pub async fn windows_temp_dir() -> Result<PathBuf, WslError> {
    let temp = run_capture("cmd.exe", &["/c", "echo %TEMP%"]).await?;
    to_wsl_path(&temp).await
}

async fn run_capture(program: &'static str, args: &[&str]) -> Result<String, WslError> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| WslError::Spawn { program, source })?;

    if !output.status.success() {
        return Err(WslError::Failed {
            program,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if stdout.is_empty() {
        return Err(WslError::EmptyOutput { program });
    }
    Ok(stdout)
}

impl From<WslError> for std::io::Error {
    fn from(err: WslError) -> Self {
        match err {
            WslError::Spawn { source, .. } => source,
            other => Self::other(other),
        }
    }
}
