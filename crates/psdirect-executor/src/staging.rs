//! Staging of script bodies as `.ps1` files the interpreter can run.

use std::path::{Path, PathBuf};

use psdirect_core::{RunnerError, Script};
use psdirect_host::{HostPaths, wsl};
use tempfile::TempPath;

/// A script written to disk. Removed on drop unless kept.
#[derive(Debug)]
pub struct StagedScript {
    file: StagedFile,
    invoke_path: String,
}

#[derive(Debug)]
enum StagedFile {
    Temporary(TempPath),
    Kept(PathBuf),
}

impl StagedScript {
    /// Write `script` to a temporary `.ps1` file.
    ///
    /// Under WSL the file goes to the Windows temp directory and the
    /// invocation path is the Windows form.
    ///
    /// # Errors
    /// Returns `Staging` if the file cannot be written or its path resolved.
    pub async fn stage(script: &Script, keep: bool, host: HostPaths) -> Result<Self, RunnerError> {
        let dir = if host.is_wsl() {
            wsl::windows_temp_dir()
                .await
                .map_err(|e| RunnerError::Staging(e.into()))?
        } else {
            std::env::temp_dir()
        };

        let body = script.body;
        let temp = tokio::task::spawn_blocking(move || write_script(&dir, body))
            .await
            .map_err(|e| RunnerError::Staging(std::io::Error::other(e)))?
            .map_err(RunnerError::Staging)?;

        let invoke_path = host.resolve(&temp).await.map_err(RunnerError::Staging)?;

        let file = if keep {
            let kept = temp.keep().map_err(|e| RunnerError::Staging(e.error))?;
            tracing::debug!(script = script.name, path = %kept.display(), "Keeping staged script");
            StagedFile::Kept(kept)
        } else {
            StagedFile::Temporary(temp)
        };

        Ok(Self { file, invoke_path })
    }

    /// Path to pass to the interpreter.
    #[must_use]
    pub fn invoke_path(&self) -> &str {
        &self.invoke_path
    }

    /// Local path of the staged file.
    #[must_use]
    pub fn local_path(&self) -> &Path {
        match &self.file {
            StagedFile::Temporary(temp) => &**temp,
            StagedFile::Kept(path) => path.as_path(),
        }
    }

    /// Remove the file now, logging failures.
    pub fn cleanup(self) {
        if let StagedFile::Temporary(temp) = self.file {
            let path = temp.to_path_buf();
            if let Err(e) = temp.close() {
                tracing::warn!(path = %path.display(), "Failed to remove staged script: {e}");
            }
        }
    }
}

fn write_script(dir: &Path, body: &str) -> std::io::Result<TempPath> {
    let mut file = tempfile::Builder::new()
        .prefix("psdirect-")
        .suffix(".ps1")
        .tempfile_in(dir)?;
    std::io::Write::write_all(&mut file, body.as_bytes())?;
    file.as_file().sync_all()?;
    Ok(file.into_temp_path())
}
