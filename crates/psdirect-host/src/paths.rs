//! Translation of local paths into the form the interpreter sees.

use std::path::{Path, PathBuf};

use crate::wsl;

/// Host path translator.
///
/// Paths are always made absolute. Under WSL they are additionally
/// converted to Windows paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HostPaths {
    wsl: bool,
}

impl HostPaths {
    /// Translator for the current host.
    #[must_use]
    pub fn detect() -> Self {
        Self { wsl: wsl::is_wsl() }
    }

    /// Translator that only absolutises.
    #[must_use]
    pub const fn native() -> Self {
        Self { wsl: false }
    }

    /// Whether paths are converted for WSL.
    #[must_use]
    pub const fn is_wsl(&self) -> bool {
        self.wsl
    }

    /// Absolute local path.
    ///
    /// # Errors
    /// Returns error if the current directory cannot be read.
    pub fn absolute(path: impl AsRef<Path>) -> std::io::Result<PathBuf> {
        std::path::absolute(path)
    }

    /// Host-visible form of `path`.
    ///
    /// # Errors
    /// Returns error if the path cannot be made absolute or converted.
    pub async fn resolve(&self, path: impl AsRef<Path>) -> std::io::Result<String> {
        let absolute = Self::absolute(path)?;
        if self.wsl {
            return Ok(wsl::to_windows_path(&absolute).await?);
        }
        Ok(absolute.to_string_lossy().into_owned())
    }
}
