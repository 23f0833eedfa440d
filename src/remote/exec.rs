//! Command execution pipeline.
//!
//! One invocation moves through
//! `IDLE -> ACQUIRING_LOCK -> CONNECTING -> EXECUTING -> (COMPLETED | FAILED)`:
//!
//! 1. **Acquire** the process-wide [`ExecutionSlot`]. A held slot fails fast
//!    with [`RemoteError::AlreadyExecuting`]; nothing is queued.
//! 2. **Connect** a fresh [`ShellClient`] to the resolved server.
//! 3. **Execute** the full command and stream both output channels. Each
//!    complete line is ANSI-stripped, filtered and pushed to the
//!    [`OutputSink`] as it arrives.
//! 4. **Complete** with an [`ExecuteResult`] once the channel closes.
//!
//! The slot is held by an [`ExecutionGuard`] and released when the guard
//! drops, so every exit path (success, connect failure, exec failure, stream
//! error) frees it. An in-flight command cannot be cancelled; it runs until
//! the remote process exits or the session drops.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::remote::config::ConfigProvider;
use crate::remote::error::{RemoteError, RemoteResult};
use crate::remote::filter::{LineBuffer, LineFilter, strip_ansi_codes};
use crate::remote::shell::{ExecEvent, RemoteShell, ShellClient};
use crate::remote::types::{CommandConfig, ExecuteResult, ServerDescriptor, ServerIdentity};

/// Exit code reported when the remote closed without an exit status.
pub const UNKNOWN_EXIT_CODE: i32 = -1;

/// The single process-wide permit to run a remote command.
#[derive(Debug, Default)]
pub struct ExecutionSlot {
    busy: AtomicBool,
}

impl ExecutionSlot {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Take the slot, or fail with [`RemoteError::AlreadyExecuting`].
    pub fn try_acquire(self: &Arc<Self>) -> RemoteResult<ExecutionGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| RemoteError::AlreadyExecuting)?;

        let id = Uuid::new_v4();
        debug!("Execution slot acquired by {}", id);
        Ok(ExecutionGuard {
            slot: Arc::clone(self),
            id,
        })
    }

    pub fn is_executing(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Holds the [`ExecutionSlot`] until dropped.
#[derive(Debug)]
pub struct ExecutionGuard {
    slot: Arc<ExecutionSlot>,
    id: Uuid,
}

impl ExecutionGuard {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Drop for ExecutionGuard {
    fn drop(&mut self) {
        self.slot.busy.store(false, Ordering::Release);
        debug!("Execution slot released by {}", self.id);
    }
}

/// Which output channel a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Receives live, filtered command output. Calls must not block.
pub trait OutputSink: Send + Sync {
    /// Drop previously shown output. Called before `command_started` when the
    /// command asks for a clean view.
    fn clear(&self) {}

    fn command_started(&self, _server: &ServerIdentity, _command: &str) {}

    fn append_line(&self, stream: StreamKind, line: &str);

    fn command_finished(&self, _exit_code: i32) {}
}

/// Event pushed by [`ChannelSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    Cleared,
    Started { server: String, command: String },
    Line { stream: StreamKind, line: String },
    Finished { exit_code: i32 },
}

/// [`OutputSink`] that forwards everything into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<OutputEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutputEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl OutputSink for ChannelSink {
    fn clear(&self) {
        let _ = self.tx.send(OutputEvent::Cleared);
    }

    fn command_started(&self, server: &ServerIdentity, command: &str) {
        let _ = self.tx.send(OutputEvent::Started {
            server: server.to_string(),
            command: command.to_string(),
        });
    }

    fn append_line(&self, stream: StreamKind, line: &str) {
        let _ = self.tx.send(OutputEvent::Line {
            stream,
            line: line.to_string(),
        });
    }

    fn command_finished(&self, exit_code: i32) {
        let _ = self.tx.send(OutputEvent::Finished { exit_code });
    }
}

/// [`OutputSink`] that logs through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl OutputSink for TracingSink {
    fn command_started(&self, server: &ServerIdentity, command: &str) {
        info!("[{}] $ {}", server, command);
    }

    fn append_line(&self, stream: StreamKind, line: &str) {
        match stream {
            StreamKind::Stdout => info!("{}", line),
            StreamKind::Stderr => info!("[stderr] {}", line),
        }
    }

    fn command_finished(&self, exit_code: i32) {
        info!("Command finished with exit code {}", exit_code);
    }
}

/// Quote `value` for a POSIX shell.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r#"'"'"'"#))
}

/// The command actually sent to the remote: run inside the server's remote
/// directory when one is configured.
pub fn build_full_command(command: &str, server: &ServerDescriptor) -> String {
    match server.remote_directory() {
        Some(dir) => format!("cd {} && {}", shell_quote(dir), command),
        None => command.to_string(),
    }
}

/// Runs remote commands one at a time.
pub struct CommandExecutor {
    slot: Arc<ExecutionSlot>,
    config: Arc<dyn ConfigProvider>,
    connect_timeout: Duration,
}

impl CommandExecutor {
    pub fn new(
        slot: Arc<ExecutionSlot>,
        config: Arc<dyn ConfigProvider>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            slot,
            config,
            connect_timeout,
        }
    }

    pub fn is_executing(&self) -> bool {
        self.slot.is_executing()
    }

    /// Run `command` on `server` (or the configured default server).
    pub async fn execute(
        &self,
        command: &str,
        server: Option<&ServerDescriptor>,
        filter: &CommandConfig,
        sink: Option<&dyn OutputSink>,
    ) -> RemoteResult<ExecuteResult> {
        let guard = self.slot.try_acquire()?;

        let server = match server {
            Some(server) => server.clone(),
            None => self.config.default_server().ok_or_else(|| {
                RemoteError::config("No server configured and no enabled default project")
            })?,
        };
        let shell = ShellClient::new(
            Some(server.clone()),
            Arc::clone(&self.config),
            self.connect_timeout,
        );

        run_command(guard, shell, &server, command, filter, sink).await
    }
}

/// Drive one command through `shell` while `guard` holds the slot.
///
/// The shell is always disconnected before returning.
pub(crate) async fn run_command<S: RemoteShell>(
    guard: ExecutionGuard,
    mut shell: S,
    server: &ServerDescriptor,
    command: &str,
    filter: &CommandConfig,
    sink: Option<&dyn OutputSink>,
) -> RemoteResult<ExecuteResult> {
    let result = stream_command(&mut shell, server, command, filter, sink).await;
    shell.disconnect().await;

    match &result {
        Ok(outcome) => info!(
            "Command on {} finished with exit code {} ({})",
            server.identity(),
            outcome.exit_code,
            guard.id()
        ),
        Err(e) => info!("Command on {} failed: {} ({})", server.identity(), e, guard.id()),
    }
    drop(guard);
    result
}

async fn stream_command<S: RemoteShell>(
    shell: &mut S,
    server: &ServerDescriptor,
    command: &str,
    filter_config: &CommandConfig,
    sink: Option<&dyn OutputSink>,
) -> RemoteResult<ExecuteResult> {
    shell.connect().await?;

    let full_command = build_full_command(command, server);
    if let Some(sink) = sink {
        if filter_config.clear_output_before_run {
            sink.clear();
        }
        sink.command_started(&server.identity(), &full_command);
    }
    info!("Executing on {}: {}", server.identity(), full_command);

    let mut events = shell.exec(&full_command).await?;

    let filter = LineFilter::new(filter_config);
    let mut stdout = LiveStream::new(StreamKind::Stdout);
    let mut stderr = LiveStream::new(StreamKind::Stderr);
    let mut exit_code = None;

    while let Some(event) = events.recv().await {
        match event {
            ExecEvent::Stdout(chunk) => stdout.push(&chunk, &filter, sink),
            ExecEvent::Stderr(chunk) => stderr.push(&chunk, &filter, sink),
            ExecEvent::Closed { exit_code: code } => {
                exit_code = code;
                break;
            }
        }
    }
    stdout.finish(&filter, sink);
    stderr.finish(&filter, sink);

    let exit_code = exit_code.unwrap_or(UNKNOWN_EXIT_CODE);
    if let Some(sink) = sink {
        sink.command_finished(exit_code);
    }

    let stdout = String::from_utf8_lossy(&stdout.raw).into_owned();
    let filtered_output = filter.filter_output(&stdout);
    Ok(ExecuteResult {
        stdout,
        stderr: String::from_utf8_lossy(&stderr.raw).into_owned(),
        exit_code,
        filtered_output,
    })
}

/// Accumulates one output channel and emits its complete lines.
struct LiveStream {
    kind: StreamKind,
    raw: Vec<u8>,
    lines: LineBuffer,
}

impl LiveStream {
    fn new(kind: StreamKind) -> Self {
        Self {
            kind,
            raw: Vec::new(),
            lines: LineBuffer::new(),
        }
    }

    fn push(&mut self, chunk: &[u8], filter: &LineFilter, sink: Option<&dyn OutputSink>) {
        self.raw.extend_from_slice(chunk);
        let lines = self.lines.push(chunk);
        self.emit(lines, filter, sink);
    }

    fn finish(&mut self, filter: &LineFilter, sink: Option<&dyn OutputSink>) {
        let rest = self.lines.finish();
        self.emit(rest, filter, sink);
    }

    fn emit(
        &self,
        lines: impl IntoIterator<Item = String>,
        filter: &LineFilter,
        sink: Option<&dyn OutputSink>,
    ) {
        let Some(sink) = sink else {
            return;
        };
        for line in lines {
            let clean = strip_ansi_codes(&line);
            if clean.trim().is_empty() || !filter.keep(&clean) {
                continue;
            }
            sink.append_line(self.kind, &clean);
        }
    }
}
