//! Embedded guest-side scripts.
//!
//! Every script takes `VmName`, `UserName` and `Password` as its first three
//! positional parameters.

use psdirect_core::Script;

/// Runs a command in the guest and reports it as line-delimited JSON
/// envelopes. Extra params: command text.
pub const EXECUTE_COMMAND: Script = Script {
    name: "execute-command",
    body: include_str!("../scripts/execute_command.ps1"),
};

/// Extra params: host path, guest path.
pub const COPY_FILE_TO_GUEST: Script = Script {
    name: "copy-file-to-guest",
    body: include_str!("../scripts/copy_file_to_guest.ps1"),
};

/// Extra params: host path, guest path, include-root flag.
pub const COPY_DIRECTORY_TO_GUEST: Script = Script {
    name: "copy-directory-to-guest",
    body: include_str!("../scripts/copy_directory_to_guest.ps1"),
};

/// Extra params: host path, guest path.
pub const COPY_FILE_FROM_GUEST: Script = Script {
    name: "copy-file-from-guest",
    body: include_str!("../scripts/copy_file_from_guest.ps1"),
};

/// Extra params: guest path, host path, include-root flag.
pub const COPY_DIRECTORY_FROM_GUEST: Script = Script {
    name: "copy-directory-from-guest",
    body: include_str!("../scripts/copy_directory_from_guest.ps1"),
};

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Script; 5] = [
        EXECUTE_COMMAND,
        COPY_FILE_TO_GUEST,
        COPY_DIRECTORY_TO_GUEST,
        COPY_FILE_FROM_GUEST,
        COPY_DIRECTORY_FROM_GUEST,
    ];

    #[test]
    fn test_scripts_share_identity_prefix() {
        for script in ALL {
            let params = script.body.find("param(").unwrap();
            let prefix = &script.body[params..];
            let vm = prefix.find("$VmName").unwrap();
            let user = prefix.find("$UserName").unwrap();
            let pass = prefix.find("$Password").unwrap();
            assert!(vm < user && user < pass, "{} param order", script.name);
        }
    }

    #[test]
    fn test_execute_script_emits_envelopes() {
        assert!(EXECUTE_COMMAND.body.contains("stream = 'exit'"));
        assert!(EXECUTE_COMMAND.body.contains("ToBase64String"));
        assert!(EXECUTE_COMMAND.body.contains("ConvertTo-Json -Compress"));
    }
}
