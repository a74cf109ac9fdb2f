//! Core abstractions for PowerShell Direct command execution.
//!
//! This crate provides the fundamental building blocks:
//! - `SessionIdentity` / `PowershellDirectConfig` - Validated connection identity
//! - `RemoteCmd` - A command with output sinks and an exit-status future
//! - `Runner`, `StreamProcess` and `Communicator` traits
//! - The error taxonomy shared by the other crates

pub mod config;
pub mod remote_cmd;
pub mod traits;

pub use config::{ConfigError, PowershellDirectConfig, SessionIdentity};
pub use remote_cmd::{CommandError, ExitHandle, ExitNotifier, OutputSink, RemoteCmd};
pub use traits::{
    BoxedReader, Communicator, CommunicatorError, Runner, RunnerError, Script, StreamProcess,
};

/// Communicator type as referenced in configuration.
pub const COMMUNICATOR_TYPE: &str = "powershell-direct";
