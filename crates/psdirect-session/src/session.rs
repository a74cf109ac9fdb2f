//! Command session controller.
//!
//! `start` launches the execute script and returns. Four tasks then own the
//! session:
//!
//! - completion watcher: waits for the process and fires `done`
//! - cancellation watcher: kills the process if cancelled before `done`
//! - structured pump: decodes envelopes from the process stdout
//! - raw pump: copies the process stderr to the command's stderr sink
//!
//! The exit status is resolved exactly once, from the exit envelope, or with
//! [`COMMAND_FAILURE_STATUS`] when the envelope stream ends without one.

use std::{future::Future, sync::Arc, time::Duration};

use psdirect_core::{
    BoxedReader, CommandError, CommunicatorError, ExitNotifier, OutputSink, RemoteCmd, Runner,
    SessionIdentity, StreamProcess,
};
use psdirect_executor::scripts;
use psdirect_transport::{Envelope, EnvelopeReader};
use tokio::{io::AsyncReadExt, time::Instant};
use tokio_util::sync::CancellationToken;

/// Exit status reported when the guest never sent one.
pub const COMMAND_FAILURE_STATUS: i32 = 1;

/// How long the pumps keep draining after the process has exited.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

const RAW_BUFFER_SIZE: usize = 8 * 1024;

/// Dispatch `cmd` through `runner` and hand it to the session tasks.
///
/// # Errors
/// Returns `InvalidArgument` for a missing command, `Cancelled` if `cancel`
/// already fired, or the runner error if the script could not be launched.
/// In the last two cases the command's exit handle resolves with the
/// matching [`CommandError`].
pub async fn start(
    runner: &dyn Runner,
    identity: &SessionIdentity,
    cmd: Option<RemoteCmd>,
    cancel: &CancellationToken,
) -> Result<(), CommunicatorError> {
    let Some(cmd) = cmd else {
        return Err(CommunicatorError::InvalidArgument(
            "remote command cannot be None",
        ));
    };

    if cmd.command.trim().is_empty() {
        tracing::debug!("Empty command, nothing to run");
        cmd.set_exited(0);
        return Ok(());
    }

    if cancel.is_cancelled() {
        cmd.set_error(CommandError::Cancelled);
        return Err(CommunicatorError::Cancelled);
    }

    let params = identity.script_params([cmd.command.clone()]);
    let mut process = match runner.stream(&scripts::EXECUTE_COMMAND, &params).await {
        Ok(process) => process,
        Err(e) => {
            tracing::error!(vm = identity.vm_name(), "Failed to launch remote command: {e}");
            cmd.set_error(CommandError::Dispatch(e.to_string()));
            return Err(e.into());
        }
    };

    tracing::debug!(vm = identity.vm_name(), "Remote command started");

    let stdout = process.take_stdout();
    let stderr = process.take_stderr();
    let process: Arc<dyn StreamProcess> = Arc::from(process);
    let done = CancellationToken::new();

    tokio::spawn(watch_completion(Arc::clone(&process), done.clone()));
    tokio::spawn(watch_cancellation(process, cancel.clone(), done.clone()));
    tokio::spawn(pump_envelopes(
        stdout,
        cmd.stdout.clone(),
        cmd.stderr.clone(),
        cmd.notifier(),
        done.clone(),
    ));
    tokio::spawn(pump_raw(stderr, cmd.stderr.clone(), done));

    Ok(())
}

async fn watch_completion(process: Arc<dyn StreamProcess>, done: CancellationToken) {
    if let Err(e) = process.wait().await {
        tracing::debug!("Remote command process ended: {e}");
    }
    done.cancel();
}

async fn watch_cancellation(
    process: Arc<dyn StreamProcess>,
    cancel: CancellationToken,
    done: CancellationToken,
) {
    tokio::select! {
        biased;
        () = done.cancelled() => {}
        () = cancel.cancelled() => {
            tracing::info!("Cancellation requested, stopping remote command");
            if let Err(e) = process.kill().await {
                tracing::debug!("Kill failed: {e}");
            }
        }
    }
}

/// Decode envelopes until exit, end of stream, a fatal read error, or the
/// drain deadline.
async fn pump_envelopes(
    reader: Option<BoxedReader>,
    stdout: Option<OutputSink>,
    stderr: Option<OutputSink>,
    exit: ExitNotifier,
    done: CancellationToken,
) {
    let Some(reader) = reader else {
        tracing::warn!("Remote command has no output stream");
        exit.set_exited(COMMAND_FAILURE_STATUS);
        return;
    };

    let mut envelopes = EnvelopeReader::new(reader);
    let mut deadline = None;

    loop {
        let Some(next) = until_drained(&done, &mut deadline, envelopes.next()).await else {
            tracing::debug!("Stopped reading output after process exit");
            break;
        };
        match next {
            None => break,
            Some(Ok(Envelope::Stdout(data))) => append(stdout.as_ref(), &data).await,
            Some(Ok(Envelope::Stderr(data))) => append(stderr.as_ref(), &data).await,
            Some(Ok(Envelope::Exit(code))) => {
                tracing::debug!(code, "Remote command exited");
                exit.set_exited(code);
                return;
            }
            Some(Err(e)) => {
                tracing::warn!("Remote command output: {e}");
                if let Some(sink) = &stderr {
                    sink.write_line(&e.to_string()).await;
                }
                if e.is_fatal() {
                    break;
                }
            }
        }
    }

    if exit.set_exited(COMMAND_FAILURE_STATUS) {
        tracing::warn!(
            code = COMMAND_FAILURE_STATUS,
            "Remote command ended without reporting an exit status"
        );
    }
}

/// Copy the interpreter's own stderr into `sink`, or drain it.
async fn pump_raw(reader: Option<BoxedReader>, sink: Option<OutputSink>, done: CancellationToken) {
    let Some(mut reader) = reader else {
        return;
    };

    let mut buf = vec![0u8; RAW_BUFFER_SIZE];
    let mut deadline = None;

    loop {
        match until_drained(&done, &mut deadline, reader.read(&mut buf)).await {
            None | Some(Ok(0)) => break,
            Some(Ok(n)) => append(sink.as_ref(), &buf[..n]).await,
            Some(Err(e)) => {
                tracing::warn!("Reading interpreter stderr failed: {e}");
                if let Some(sink) = &sink {
                    sink.write_line(&format!("read stderr: {e}")).await;
                }
                break;
            }
        }
    }
}

async fn append(sink: Option<&OutputSink>, data: &[u8]) {
    let Some(sink) = sink else {
        return;
    };
    if data.is_empty() {
        return;
    }
    if let Err(e) = sink.write(data).await {
        tracing::warn!("Failed to write command output: {e}");
    }
}

/// Await `fut`, or `None` once `done` has fired and the drain grace period
/// has also run out.
async fn until_drained<F: Future>(
    done: &CancellationToken,
    deadline: &mut Option<Instant>,
    fut: F,
) -> Option<F::Output> {
    tokio::pin!(fut);

    let at = match *deadline {
        Some(at) => at,
        None => {
            tokio::select! {
                biased;
                out = &mut fut => return Some(out),
                () = done.cancelled() => {}
            }
            let at = Instant::now() + DRAIN_GRACE;
            *deadline = Some(at);
            at
        }
    };

    tokio::time::timeout_at(at, fut).await.ok()
}
