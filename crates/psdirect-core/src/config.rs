//! Connection identity for PowerShell Direct sessions.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::COMMUNICATOR_TYPE;

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("vm name is required: set powershell_direct_vm_name or supply one at connect time")]
    MissingVmName,
    #[error("powershell_direct_username must be provided when communicator is {COMMUNICATOR_TYPE:?}")]
    MissingUsername,
    #[error("powershell_direct_password must be provided when communicator is {COMMUNICATOR_TYPE:?}")]
    MissingPassword,
}

/// User-facing PowerShell Direct configuration.
///
/// Values are kept as written; whitespace is only trimmed when an
/// identity is derived from them.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct PowershellDirectConfig {
    /// Existing VM to connect to when the caller does not supply one.
    #[serde(default, rename = "powershell_direct_vm_name")]
    pub vm_name: String,

    /// Guest account name.
    #[serde(default, rename = "powershell_direct_username")]
    pub username: String,

    /// Guest account password.
    #[serde(default, rename = "powershell_direct_password")]
    pub password: String,
}

impl fmt::Debug for PowershellDirectConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PowershellDirectConfig")
            .field("vm_name", &self.vm_name)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl PowershellDirectConfig {
    /// Validate the credential fields, returning every problem found.
    ///
    /// The VM name is not checked here since it may be supplied later
    /// by whoever creates the VM.
    #[must_use]
    pub fn prepare(&self) -> Vec<ConfigError> {
        let mut errs = Vec::new();
        if self.username.trim().is_empty() {
            errs.push(ConfigError::MissingUsername);
        }
        if self.password.trim().is_empty() {
            errs.push(ConfigError::MissingPassword);
        }
        errs
    }

    /// Build a session identity.
    ///
    /// A non-blank `vm_name` override wins over the configured VM name.
    ///
    /// # Errors
    /// Returns the first missing field.
    pub fn identity(&self, vm_name: Option<&str>) -> Result<SessionIdentity, ConfigError> {
        let vm_name = vm_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.vm_name.trim());

        SessionIdentity::new(vm_name, &self.username, &self.password)
    }
}

/// Validated, immutable identity of a PowerShell Direct session.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    vm_name: String,
    username: String,
    password: String,
}

impl SessionIdentity {
    /// Create an identity, trimming each field.
    ///
    /// # Errors
    /// Returns error if any field is blank.
    pub fn new(vm_name: &str, username: &str, password: &str) -> Result<Self, ConfigError> {
        let vm_name = vm_name.trim();
        let username = username.trim();
        let password = password.trim();

        if vm_name.is_empty() {
            return Err(ConfigError::MissingVmName);
        }
        if username.is_empty() {
            return Err(ConfigError::MissingUsername);
        }
        if password.is_empty() {
            return Err(ConfigError::MissingPassword);
        }

        Ok(Self {
            vm_name: vm_name.to_owned(),
            username: username.to_owned(),
            password: password.to_owned(),
        })
    }

    /// Target VM name.
    #[must_use]
    pub fn vm_name(&self) -> &str {
        &self.vm_name
    }

    /// Guest account name.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Guest account password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Positional script parameters: the identity triple followed by `extra`.
    #[must_use]
    pub fn script_params<I>(&self, extra: I) -> Vec<String>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        [
            self.vm_name.clone(),
            self.username.clone(),
            self.password.clone(),
        ]
        .into_iter()
        .chain(extra.into_iter().map(Into::into))
        .collect()
    }
}

impl fmt::Debug for SessionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionIdentity")
            .field("vm_name", &self.vm_name)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
