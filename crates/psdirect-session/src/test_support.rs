//! Recording runner and scripted process doubles.

use std::{
    collections::VecDeque,
    io::Cursor,
    pin::Pin,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    task::{Context, Poll},
    time::Duration,
};

use async_trait::async_trait;
use psdirect_core::{
    BoxedReader, Runner, RunnerError, Script, SessionIdentity, StreamProcess,
};
use psdirect_transport::RawEnvelope;
use tokio::io::{AsyncWrite, DuplexStream};
use tokio_util::sync::CancellationToken;

pub fn identity() -> SessionIdentity {
    SessionIdentity::new("test-vm", "test-user", "test-password").unwrap()
}

/// One line of the structured channel.
pub fn line(raw: &RawEnvelope) -> String {
    format!("{}\n", serde_json::to_string(raw).unwrap())
}

pub fn stdout_line(data: &str) -> String {
    line(&RawEnvelope::output("stdout", data.as_bytes()))
}

pub fn stderr_line(data: &str) -> String {
    line(&RawEnvelope::output("stderr", data.as_bytes()))
}

pub fn exit_line(code: i32) -> String {
    line(&RawEnvelope::exit(code))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerCall {
    pub script: &'static str,
    pub params: Vec<String>,
}

type RunHook = Box<dyn Fn(&Script, &[String]) -> Result<(), RunnerError> + Send + Sync>;

#[derive(Default)]
struct StubState {
    run_calls: Vec<RunnerCall>,
    output_calls: Vec<RunnerCall>,
    stream_calls: Vec<RunnerCall>,
    stream_errors: VecDeque<RunnerError>,
    processes: VecDeque<Box<dyn StreamProcess>>,
}

/// Runner that records every call and hands out queued processes.
#[derive(Default)]
pub struct StubRunner {
    state: Mutex<StubState>,
    run_hook: Option<RunHook>,
}

impl StubRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_run_hook(
        hook: impl Fn(&Script, &[String]) -> Result<(), RunnerError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            state: Mutex::default(),
            run_hook: Some(Box::new(hook)),
        }
    }

    pub fn push_process(&self, process: impl StreamProcess + 'static) {
        self.state.lock().unwrap().processes.push_back(Box::new(process));
    }

    pub fn push_stream_error(&self, err: RunnerError) {
        self.state.lock().unwrap().stream_errors.push_back(err);
    }

    pub fn run_calls(&self) -> Vec<RunnerCall> {
        self.state.lock().unwrap().run_calls.clone()
    }

    pub fn stream_calls(&self) -> Vec<RunnerCall> {
        self.state.lock().unwrap().stream_calls.clone()
    }

    pub fn total_calls(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.run_calls.len() + state.output_calls.len() + state.stream_calls.len()
    }

    fn record(calls: &mut Vec<RunnerCall>, script: &Script, params: &[String]) {
        calls.push(RunnerCall {
            script: script.name,
            params: params.to_vec(),
        });
    }
}

#[async_trait]
impl Runner for StubRunner {
    async fn run(&self, script: &Script, params: &[String]) -> Result<(), RunnerError> {
        Self::record(&mut self.state.lock().unwrap().run_calls, script, params);
        match &self.run_hook {
            Some(hook) => hook(script, params),
            None => Ok(()),
        }
    }

    async fn output(&self, script: &Script, params: &[String]) -> Result<String, RunnerError> {
        Self::record(&mut self.state.lock().unwrap().output_calls, script, params);
        Ok(String::new())
    }

    async fn stream(
        &self,
        script: &Script,
        params: &[String],
    ) -> Result<Box<dyn StreamProcess>, RunnerError> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state.stream_calls, script, params);
        if let Some(err) = state.stream_errors.pop_front() {
            return Err(err);
        }
        Ok(state
            .processes
            .pop_front()
            .unwrap_or_else(|| Box::new(StubProcess::finished("", ""))))
    }
}

/// Process whose streams are canned bytes or stay open until killed.
pub struct StubProcess {
    stdout: Mutex<Option<BoxedReader>>,
    stderr: Mutex<Option<BoxedReader>>,
    held_open: Mutex<Option<DuplexStream>>,
    killed: CancellationToken,
    blocks_until_killed: bool,
    kills: Arc<AtomicUsize>,
}

impl StubProcess {
    /// A process that already exited after writing `stdout` and `stderr`.
    pub fn finished(stdout: &str, stderr: &str) -> Self {
        Self::finished_bytes(stdout.as_bytes().to_vec(), stderr.as_bytes().to_vec())
    }

    /// Like `finished`, for output that need not be UTF-8.
    pub fn finished_bytes(stdout: Vec<u8>, stderr: Vec<u8>) -> Self {
        Self {
            stdout: Mutex::new(Some(Box::pin(Cursor::new(stdout)))),
            stderr: Mutex::new(Some(Box::pin(Cursor::new(stderr)))),
            held_open: Mutex::new(None),
            killed: CancellationToken::new(),
            blocks_until_killed: false,
            kills: Arc::default(),
        }
    }

    /// A process that runs, with stdout open, until it is killed.
    pub fn running() -> Self {
        let (writer, reader) = tokio::io::duplex(64);
        Self {
            stdout: Mutex::new(Some(Box::pin(reader))),
            stderr: Mutex::new(None),
            held_open: Mutex::new(Some(writer)),
            killed: CancellationToken::new(),
            blocks_until_killed: true,
            kills: Arc::default(),
        }
    }

    #[must_use]
    pub fn without_stdout(mut self) -> Self {
        self.stdout = Mutex::new(None);
        self
    }

    /// Counter of `kill` calls, readable after the process moves into a runner.
    pub fn kill_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.kills)
    }
}

#[async_trait]
impl StreamProcess for StubProcess {
    fn take_stdout(&mut self) -> Option<BoxedReader> {
        self.stdout.get_mut().unwrap().take()
    }

    fn take_stderr(&mut self) -> Option<BoxedReader> {
        self.stderr.get_mut().unwrap().take()
    }

    async fn wait(&self) -> Result<(), RunnerError> {
        if self.blocks_until_killed {
            self.killed.cancelled().await;
            return Err(RunnerError::Exit { code: -1 });
        }
        Ok(())
    }

    async fn kill(&self) -> Result<(), RunnerError> {
        self.kills.fetch_add(1, Ordering::SeqCst);
        self.held_open.lock().unwrap().take();
        self.killed.cancel();
        Ok(())
    }
}

/// Cloneable in-memory writer.
#[derive(Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    /// Wait until the contents satisfy `pred`, or give up after a second.
    pub async fn eventually(&self, pred: impl Fn(&str) -> bool) -> String {
        for _ in 0..100 {
            let contents = self.contents();
            if pred(&contents) {
                return contents;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.contents()
    }
}

impl AsyncWrite for SharedBuf {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
