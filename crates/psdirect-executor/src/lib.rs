//! PowerShell runner for PowerShell Direct.
//!
//! Provides:
//! - `PowerShellRunner` - `Runner` implementation backed by a local PowerShell
//! - `ExecStreamProcess` - Streaming handle over a spawned process group
//! - The embedded guest-side scripts
//! - Script staging and interpreter argument building

pub mod command;
pub mod options;
pub mod process;
pub mod runner;
pub mod scripts;
pub mod staging;

pub use command::PowerShellCommand;
pub use options::RunnerOptions;
pub use process::ExecStreamProcess;
pub use runner::PowerShellRunner;
pub use staging::StagedScript;
