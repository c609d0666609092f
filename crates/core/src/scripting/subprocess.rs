//! Subprocess management.
//!
//! [`run_command`] runs a short-lived process to completion and captures
//! its output (hook scripts, git). [`run_supervised`] runs a long-lived
//! process in its own process group, streams output lines as they arrive,
//! and terminates the whole group on cancellation or timeout (ansible).

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::executor::{ScriptError, ScriptInput, ScriptOutput};

/// Maximum stdout or stderr size captured per stream by [`run_command`].
const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Time a process group gets between SIGTERM and SIGKILL.
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// Time allowed for output readers to drain after the child exited.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Spawn `cmd`, pipe the optional JSON payload to stdin, capture
/// stdout/stderr, and enforce the timeout.
pub async fn run_command(
    cmd: &mut Command,
    input: ScriptInput,
) -> Result<ScriptOutput, ScriptError> {
    let stdin = if input.data.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    };
    cmd.stdin(stdin)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    for (key, value) in &input.env_vars {
        cmd.env(key, value);
    }
    if let Some(dir) = &input.working_directory {
        cmd.current_dir(dir);
    }

    let start = Instant::now();
    let mut child = cmd.spawn()?;

    if let (Some(mut stdin), Some(data)) = (child.stdin.take(), input.data.as_ref()) {
        let json_bytes = serde_json::to_vec(data).unwrap_or_default();
        // The process may close stdin early.
        let _ = stdin.write_all(&json_bytes).await;
        drop(stdin);
    }

    let stdout_handle = child.stdout.take();
    let stderr_handle = child.stderr.take();
    let stdout_task = tokio::spawn(async move { read_stream(stdout_handle).await });
    let stderr_task = tokio::spawn(async move { read_stream(stderr_handle).await });

    // On timeout `child` is dropped and `kill_on_drop` reaps it.
    match tokio::time::timeout(input.timeout, child.wait()).await {
        Ok(Ok(status)) => {
            let stdout_bytes = stdout_task.await.unwrap_or_default();
            let stderr_bytes = stderr_task.await.unwrap_or_default();
            Ok(ScriptOutput {
                stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
                stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
                exit_code: status.code().unwrap_or(-1),
                duration_ms: start.elapsed().as_millis() as u64,
            })
        }
        Ok(Err(e)) => Err(ScriptError::IoError(e)),
        Err(_elapsed) => Err(ScriptError::Timeout {
            elapsed_ms: start.elapsed().as_millis() as u64,
        }),
    }
}

async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take(MAX_OUTPUT_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
    }
    buf
}

// ---------------------------------------------------------------------------
// Supervised runs
// ---------------------------------------------------------------------------

/// How a supervised process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisedExit {
    /// The process exited on its own (`-1` if killed by a signal).
    Exited(i32),
    /// The cancellation token fired and the process group was terminated.
    Cancelled,
    /// The timeout elapsed and the process group was terminated.
    TimedOut,
}

/// Run `cmd` in a new process group, forwarding stdout and stderr lines to
/// `sink` as they are produced.
///
/// Lines already forwarded are kept when the run is cancelled or times out.
pub async fn run_supervised(
    cmd: &mut Command,
    timeout: Duration,
    cancel: &CancellationToken,
    sink: mpsc::UnboundedSender<String>,
) -> Result<SupervisedExit, ScriptError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true);

    let mut child = cmd.spawn()?;

    let stdout_task = child
        .stdout
        .take()
        .map(|out| tokio::spawn(forward_lines(out, sink.clone())));
    let stderr_task = child
        .stderr
        .take()
        .map(|err| tokio::spawn(forward_lines(err, sink)));

    let exit = tokio::select! {
        status = child.wait() => SupervisedExit::Exited(status?.code().unwrap_or(-1)),
        _ = cancel.cancelled() => {
            terminate_group(&mut child).await;
            SupervisedExit::Cancelled
        }
        _ = tokio::time::sleep(timeout) => {
            terminate_group(&mut child).await;
            SupervisedExit::TimedOut
        }
    };

    for task in [stdout_task, stderr_task].into_iter().flatten() {
        let _ = tokio::time::timeout(DRAIN_TIMEOUT, task).await;
    }
    Ok(exit)
}

async fn forward_lines<R: AsyncRead + Unpin>(reader: R, sink: mpsc::UnboundedSender<String>) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if sink.send(line).is_err() {
            break;
        }
    }
}

/// SIGTERM the child's process group, then SIGKILL after a grace period.
async fn terminate_group(child: &mut Child) {
    if let Some(pid) = child.id() {
        // Safety: killpg only sends a signal; the group id is the child pid
        // because the child was spawned with `process_group(0)`.
        unsafe {
            libc::killpg(pid as libc::pid_t, libc::SIGTERM);
        }
        if tokio::time::timeout(TERMINATE_GRACE, child.wait())
            .await
            .is_ok()
        {
            return;
        }
        // Safety: as above.
        unsafe {
            libc::killpg(pid as libc::pid_t, libc::SIGKILL);
        }
    }
    let _ = child.kill().await;
}
