//! File and directory transfer through host staging files.

use std::path::Path;

use psdirect_core::{CommunicatorError, Runner, SessionIdentity};
use psdirect_executor::scripts;
use psdirect_host::HostPaths;
use tempfile::TempPath;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// Whether a directory copy should recreate `path`'s own final component
/// at the destination.
///
/// A trailing `/` or `\` means "copy the contents only", rsync style.
#[must_use]
pub fn include_source_root(path: &str) -> bool {
    !path.is_empty() && !path.ends_with(['/', '\\'])
}

fn include_flag(path: &str) -> String {
    include_source_root(path).to_string()
}

fn reject_excludes(exclude: &[String]) -> Result<(), CommunicatorError> {
    if exclude.is_empty() {
        Ok(())
    } else {
        Err(CommunicatorError::UnsupportedExclude)
    }
}

/// Stage `input` in a host temp file and copy it to `path` in the guest.
///
/// The staging file is removed however the copy ends.
///
/// # Errors
/// Returns `InvalidArgument` if `input` is `None`, otherwise any staging or
/// runner failure.
pub async fn upload(
    runner: &dyn Runner,
    identity: &SessionIdentity,
    host: HostPaths,
    path: &str,
    input: Option<&mut (dyn AsyncRead + Send + Unpin)>,
) -> Result<(), CommunicatorError> {
    let Some(input) = input else {
        return Err(CommunicatorError::InvalidArgument(
            "upload input cannot be None",
        ));
    };

    let staged = stage_input(input, &std::env::temp_dir()).await?;
    let host_path = host.resolve(&staged).await?;
    tracing::debug!(remote = path, "Uploading file");

    runner
        .run(
            &scripts::COPY_FILE_TO_GUEST,
            &identity.script_params([host_path, path.to_string()]),
        )
        .await?;
    Ok(())
}

/// Drain `input` into a new temp file in `dir`. The file is removed if
/// reading or writing fails.
async fn stage_input(
    input: &mut (dyn AsyncRead + Send + Unpin),
    dir: &Path,
) -> Result<TempPath, CommunicatorError> {
    let (file, staged) = tempfile::Builder::new()
        .prefix("psdirect-upload-")
        .tempfile_in(dir)?
        .into_parts();
    let mut file = tokio::fs::File::from_std(file);
    let bytes = tokio::io::copy(input, &mut file).await?;
    file.flush().await?;
    tracing::debug!(bytes, path = %staged.display(), "Staged upload");
    Ok(staged)
}

/// Copy the host directory `src` to `dst` in the guest.
///
/// # Errors
/// Returns `UnsupportedExclude` for a non-empty `exclude` before touching
/// anything, otherwise any path or runner failure.
pub async fn upload_dir(
    runner: &dyn Runner,
    identity: &SessionIdentity,
    host: HostPaths,
    dst: &str,
    src: &str,
    exclude: &[String],
) -> Result<(), CommunicatorError> {
    reject_excludes(exclude)?;

    let include_root = include_flag(src);
    let host_src = host.resolve(src).await?;
    tracing::debug!(src = %host_src, dst, include_root = %include_root, "Uploading directory");

    runner
        .run(
            &scripts::COPY_DIRECTORY_TO_GUEST,
            &identity.script_params([host_src, dst.to_string(), include_root]),
        )
        .await?;
    Ok(())
}

/// Copy guest file `path` into `output` through a host temp file.
///
/// # Errors
/// Returns `InvalidArgument` if `output` is `None`, otherwise any staging,
/// runner or write failure.
pub async fn download(
    runner: &dyn Runner,
    identity: &SessionIdentity,
    host: HostPaths,
    path: &str,
    output: Option<&mut (dyn AsyncWrite + Send + Unpin)>,
) -> Result<(), CommunicatorError> {
    let Some(output) = output else {
        return Err(CommunicatorError::InvalidArgument(
            "download output cannot be None",
        ));
    };

    let staged = tempfile::Builder::new()
        .prefix("psdirect-download-")
        .tempfile()?
        .into_temp_path();
    let host_path = host.resolve(&staged).await?;
    tracing::debug!(remote = path, "Downloading file");

    runner
        .run(
            &scripts::COPY_FILE_FROM_GUEST,
            &identity.script_params([host_path, path.to_string()]),
        )
        .await?;

    let mut file = tokio::fs::File::open(&staged).await?;
    tokio::io::copy(&mut file, &mut *output).await?;
    output.flush().await?;
    Ok(())
}

/// Copy the guest directory `src` to `dst` on the host, creating `dst`.
///
/// # Errors
/// Returns `UnsupportedExclude` for a non-empty `exclude` before touching
/// anything, otherwise any filesystem or runner failure.
pub async fn download_dir(
    runner: &dyn Runner,
    identity: &SessionIdentity,
    host: HostPaths,
    src: &str,
    dst: &str,
    exclude: &[String],
) -> Result<(), CommunicatorError> {
    reject_excludes(exclude)?;

    let include_root = include_flag(src);
    let target = HostPaths::absolute(dst)?;
    tokio::fs::create_dir_all(&target).await?;
    let host_dst = host.resolve(&target).await?;
    tracing::debug!(src, dst = %host_dst, include_root = %include_root, "Downloading directory");

    runner
        .run(
            &scripts::COPY_DIRECTORY_FROM_GUEST,
            &identity.script_params([src.to_string(), host_dst, include_root]),
        )
        .await?;
    Ok(())
}
