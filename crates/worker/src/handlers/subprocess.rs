//! Child process execution for command-backed handlers.
//!
//! The job payload goes in on stdin and diagnostics come back on
//! stdout/stderr. Each pipe is serviced by its own task and a single
//! deadline covers the whole exchange. Output past the cap is read and
//! discarded, never left unread.

use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};
use tokio::task::JoinHandle;

/// Maximum stdout or stderr size kept per stream (1 MiB).
pub const MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Captured output of one stream, possibly cut at [`MAX_OUTPUT_BYTES`].
#[derive(Debug, Default)]
pub struct Captured {
    pub text: String,
    /// Bytes the child wrote past the cap and we discarded.
    pub discarded: u64,
}

/// Result of a job command that ran to completion.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Captured,
    pub stderr: Captured,
    pub duration_ms: u64,
}

impl CommandOutput {
    /// Exit code, or `-1` if the process was killed by a signal.
    pub fn exit_code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubprocessError {
    #[error("failed to run command: {0}")]
    Io(#[from] std::io::Error),

    #[error("command timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },
}

/// Run `cmd` with `payload` on its stdin and wait for it to exit.
///
/// `timeout` bounds everything from spawn to the last byte of output. On
/// expiry the child is killed and its pipe tasks are aborted.
pub async fn run(
    cmd: &mut Command,
    payload: Vec<u8>,
    timeout: Duration,
) -> Result<CommandOutput, SubprocessError> {
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let start = Instant::now();
    let mut child = cmd.spawn()?;

    let feeder = child.stdin.take().map(|pipe| tokio::spawn(feed(pipe, payload)));
    let mut stdout = tokio::spawn(capture(child.stdout.take()));
    let mut stderr = tokio::spawn(capture(child.stderr.take()));

    let exchange = async {
        let status = child.wait().await?;
        let stdout = (&mut stdout).await.unwrap_or_default();
        let stderr = (&mut stderr).await.unwrap_or_default();
        Ok::<_, std::io::Error>((status, stdout, stderr))
    };
    let result = tokio::time::timeout(timeout, exchange).await;

    abort(feeder);
    stdout.abort();
    stderr.abort();

    let elapsed_ms = start.elapsed().as_millis() as u64;
    match result {
        Ok(Ok((status, stdout, stderr))) => Ok(CommandOutput {
            status,
            stdout,
            stderr,
            duration_ms: elapsed_ms,
        }),
        Ok(Err(e)) => Err(SubprocessError::Io(e)),
        // `child` is dropped on return, killing the process.
        Err(_) => Err(SubprocessError::Timeout { elapsed_ms }),
    }
}

fn abort<T>(task: Option<JoinHandle<T>>) {
    if let Some(task) = task {
        task.abort();
    }
}

/// Write the payload and close stdin. A child that exits without reading
/// it surfaces here as a broken pipe, which is not an error for the job.
async fn feed(mut pipe: ChildStdin, payload: Vec<u8>) {
    if let Err(e) = pipe.write_all(&payload).await {
        tracing::debug!(error = %e, "Job command did not consume its payload");
    }
}

/// Keep the first [`MAX_OUTPUT_BYTES`] of `stream`, then drain the rest.
async fn capture<R: AsyncRead + Unpin>(stream: Option<R>) -> Captured {
    let Some(mut stream) = stream else {
        return Captured::default();
    };

    let mut kept = Vec::new();
    let _ = (&mut stream)
        .take(MAX_OUTPUT_BYTES as u64)
        .read_to_end(&mut kept)
        .await;
    let discarded = tokio::io::copy(&mut stream, &mut tokio::io::sink())
        .await
        .unwrap_or(0);

    Captured {
        text: String::from_utf8_lossy(&kept).into_owned(),
        discarded,
    }
}
