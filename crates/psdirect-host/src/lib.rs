//! Host environment probing for PowerShell Direct.
//!
//! Provides:
//! - PowerShell interpreter discovery
//! - WSL detection and Windows path conversion
//! - `HostPaths` - Translate local paths into the form PowerShell sees

pub mod paths;
pub mod shell;
pub mod wsl;

pub use paths::HostPaths;
pub use shell::{apply_env_overrides, merge_paths, resolve_executable_path, resolve_powershell};
pub use wsl::{WslError, is_wsl};
