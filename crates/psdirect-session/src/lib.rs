//! PowerShell Direct communicator.
//!
//! Provides:
//! - `DirectCommunicator` - Runs guest commands and transfers files
//! - The command session controller behind `start`
//! - File transfer staging and include-root handling

pub mod communicator;
pub mod session;
pub mod transfer;

#[cfg(test)]
mod test_support;

pub use communicator::DirectCommunicator;
pub use session::COMMAND_FAILURE_STATUS;
pub use transfer::include_source_root;
