//! PowerShell interpreter discovery and environment helpers.

use std::{
    collections::{BTreeMap, HashSet},
    env::{join_paths, split_paths},
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
};

/// Interpreter names tried in order.
const POWERSHELL_CANDIDATES: [&str; 2] = ["powershell.exe", "powershell"];

/// Locate the PowerShell interpreter.
///
/// Tries each candidate name against the current PATH first, then against
/// a refreshed PATH.
pub async fn resolve_powershell() -> Option<PathBuf> {
    for candidate in POWERSHELL_CANDIDATES {
        if let Some(found) = which_async(candidate, None).await {
            return Some(found);
        }
    }

    let refreshed = refreshed_path().await?;
    for candidate in POWERSHELL_CANDIDATES {
        if let Some(found) = which_async(candidate, Some(refreshed.clone())).await {
            tracing::debug!(path = %found.display(), "Found PowerShell on refreshed PATH");
            return Some(found);
        }
    }

    None
}

/// Resolve an executable by name, falling back to a refreshed PATH if needed.
///
/// The search order is:
/// 1. Explicit absolute paths.
/// 2. The current process PATH via `which`.
/// 3. A platform-specific refresh of PATH.
///
/// The process environment is never modified.
pub async fn resolve_executable_path(executable: &str) -> Option<PathBuf> {
    if executable.trim().is_empty() {
        return None;
    }

    let path = Path::new(executable);
    if path.is_absolute() && path.is_file() {
        return Some(path.to_path_buf());
    }

    if let Some(found) = which_async(executable, None).await {
        return Some(found);
    }

    let refreshed = refreshed_path().await?;
    which_async(executable, Some(refreshed)).await
}

/// Merge two PATH strings into a single, de-duplicated PATH.
#[must_use]
pub fn merge_paths(primary: impl AsRef<OsStr>, secondary: impl AsRef<OsStr>) -> OsString {
    let mut seen = HashSet::<PathBuf>::new();
    let mut merged = Vec::<PathBuf>::new();

    for p in split_paths(primary.as_ref()).chain(split_paths(secondary.as_ref())) {
        if !p.as_os_str().is_empty() && seen.insert(p.clone()) {
            merged.push(p);
        }
    }

    join_paths(merged).unwrap_or_default()
}

/// Apply environment overrides to an inherited environment.
///
/// Inherited variables keep their position; an override replaces the value
/// of a variable with the same name. Overrides without an inherited
/// counterpart are appended in key order.
#[must_use]
pub fn apply_env_overrides<I>(base: I, overrides: &BTreeMap<String, String>) -> Vec<(OsString, OsString)>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    if overrides.is_empty() {
        return base.into_iter().collect();
    }

    let mut handled = HashSet::new();
    let mut result: Vec<(OsString, OsString)> = base
        .into_iter()
        .map(|(key, value)| match key.to_str().and_then(|k| overrides.get_key_value(k)) {
            Some((name, replacement)) => {
                handled.insert(name.as_str());
                (key, OsString::from(replacement))
            }
            None => (key, value),
        })
        .collect();

    for (key, value) in overrides {
        if !handled.contains(key.as_str()) {
            result.push((OsString::from(key), OsString::from(value)));
        }
    }

    result
}

/// Current PATH merged with a freshly read one, if the refresh adds anything.
async fn refreshed_path() -> Option<OsString> {
    let fresh = get_fresh_path().await?;
    let existing = std::env::var_os("PATH").unwrap_or_default();
    let merged = merge_paths(&existing, OsString::from(&fresh));
    if merged == existing {
        return None;
    }
    tracing::debug!(?existing, ?fresh, ?merged, "Refreshed PATH");
    Some(merged)
}

async fn which_async(executable: &str, path: Option<OsString>) -> Option<PathBuf> {
    let executable = executable.to_string();
    tokio::task::spawn_blocking(move || match path {
        Some(path) => {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            which::which_in(executable, Some(path), cwd)
        }
        None => which::which(executable),
    })
    .await
    .ok()
    .and_then(Result::ok)
}

#[cfg(not(windows))]
#[allow(clippy::unused_async)]
async fn get_fresh_path() -> Option<String> {
    None
}

#[cfg(windows)]
async fn get_fresh_path() -> Option<String> {
    tokio::task::spawn_blocking(get_fresh_path_blocking)
        .await
        .ok()
        .flatten()
}

#[cfg(windows)]
fn get_fresh_path_blocking() -> Option<String> {
    use std::os::windows::ffi::{OsStrExt, OsStringExt};

    use winreg::{HKEY, RegKey, enums::*};

    fn expand_env_vars(input: &OsStr) -> OsString {
        use windows_sys::Win32::System::Environment::ExpandEnvironmentStringsW;

        let wide: Vec<u16> = input.encode_wide().chain(Some(0)).collect();
        // SAFETY: `wide` is NUL-terminated and `buf` is sized from the first call.
        unsafe {
            let needed = ExpandEnvironmentStringsW(wide.as_ptr(), std::ptr::null_mut(), 0);
            if needed == 0 {
                return input.to_os_string();
            }
            let mut buf = vec![0u16; needed as usize];
            let written = ExpandEnvironmentStringsW(wide.as_ptr(), buf.as_mut_ptr(), needed);
            if written == 0 {
                return input.to_os_string();
            }
            OsString::from_wide(&buf[..(written as usize).saturating_sub(1)])
        }
    }

    fn read_registry_path(root: HKEY, subkey: &str) -> Option<OsString> {
        let key = RegKey::predef(root)
            .open_subkey_with_flags(subkey, KEY_READ)
            .ok()?;
        key.get_value::<String, _>("Path").ok().map(OsString::from)
    }

    let paths: Vec<OsString> = [
        read_registry_path(HKEY_CURRENT_USER, "Environment"),
        read_registry_path(
            HKEY_LOCAL_MACHINE,
            r"System\CurrentControlSet\Control\Session Manager\Environment",
        ),
    ]
    .into_iter()
    .flatten()
    .map(|p| expand_env_vars(&p))
    .collect();

    paths
        .into_iter()
        .reduce(|a, b| merge_paths(&a, &b))
        .map(|merged| merged.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Vec<(OsString, OsString)> {
        pairs
            .iter()
            .map(|(k, v)| (OsString::from(k), OsString::from(v)))
            .collect()
    }

    #[test]
    fn test_env_overrides_replace_in_place_and_append() {
        let base = env(&[("A", "1"), ("PSModulePath", "old"), ("B", "2")]);
        let overrides = BTreeMap::from([
            ("PSModulePath".to_string(), "new".to_string()),
            ("Z".to_string(), "26".to_string()),
            ("C".to_string(), "3".to_string()),
        ]);

        let merged = apply_env_overrides(base, &overrides);
        assert_eq!(
            merged,
            env(&[("A", "1"), ("PSModulePath", "new"), ("B", "2"), ("C", "3"), ("Z", "26")])
        );
    }

    #[test]
    fn test_env_without_overrides_is_unchanged() {
        let base = env(&[("A", "1")]);
        assert_eq!(apply_env_overrides(base.clone(), &BTreeMap::new()), base);
    }

    #[test]
    fn test_merge_paths_deduplicates() {
        let a = join_paths(["/usr/bin", "/bin"]).unwrap();
        let b = join_paths(["/bin", "/opt/bin"]).unwrap();
        let merged: Vec<PathBuf> = split_paths(&merge_paths(&a, &b)).collect();
        assert_eq!(
            merged,
            vec![
                PathBuf::from("/usr/bin"),
                PathBuf::from("/bin"),
                PathBuf::from("/opt/bin")
            ]
        );
    }

    #[tokio::test]
    async fn test_resolve_blank_executable() {
        assert!(resolve_executable_path("  ").await.is_none());
    }

    #[tokio::test]
    async fn test_resolve_absolute_executable() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let resolved = resolve_executable_path(file.path().to_str().unwrap()).await;
        assert_eq!(resolved.as_deref(), Some(file.path()));
    }
}
