use std::{
    io::{self, ErrorKind},
    process::{ExitStatus, Stdio},
    time::Duration,
};

use thiserror::Error;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    process::Command,
};
use tracing::warn;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to start renderer `{binary}`: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: io::Error,
    },
    #[error("i/o failure while talking to renderer: {0}")]
    Io(#[from] io::Error),
    #[error("renderer exceeded the {0:?} time limit and was killed")]
    Timeout(Duration),
}

/// Everything one subprocess invocation produced. Never mutated after
/// capture.
#[derive(Debug)]
pub struct ProcessResult {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub status: ExitStatus,
}

impl ProcessResult {
    pub fn exit_code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Runs a renderer command, feeding it a payload on stdin and capturing
/// stdout, stderr, and the exit status.
///
/// The optional time limit is a hardening knob; when unset the runner waits
/// indefinitely, which is the documented baseline behavior.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub async fn run(
        &self,
        tokens: &[String],
        payload: &[u8],
    ) -> Result<ProcessResult, ProcessError> {
        let (binary, args) = tokens.split_first().ok_or_else(|| {
            ProcessError::Io(io::Error::new(ErrorKind::InvalidInput, "empty command"))
        })?;

        let mut child = Command::new(binary)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                binary: binary.clone(),
                source,
            })?;

        let stdin = child.stdin.take();
        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();

        // Both output pipes are drained on their own tasks while stdin is
        // written, so a child blocked on a full output pipe can never
        // deadlock against a writer blocked on a full input pipe.
        let stdout_task = tokio::spawn(async move {
            let mut buffer = Vec::new();
            if let Some(pipe) = stdout_pipe.as_mut() {
                pipe.read_to_end(&mut buffer).await?;
            }
            Ok::<_, io::Error>(buffer)
        });
        let stderr_task = tokio::spawn(async move {
            let mut buffer = Vec::new();
            if let Some(pipe) = stderr_pipe.as_mut() {
                pipe.read_to_end(&mut buffer).await?;
            }
            Ok::<_, io::Error>(buffer)
        });

        if let Some(mut stdin) = stdin {
            match stdin.write_all(payload).await {
                Ok(()) => {}
                // The child may exit without reading its input; that is the
                // renderer's call to make, not a transport failure.
                Err(err) if err.kind() == ErrorKind::BrokenPipe => {}
                Err(err) => {
                    warn!(
                        target = "application::engine::runner",
                        op = "runner::run",
                        binary = %binary,
                        error = %err,
                        "Failed to write renderer input"
                    );
                }
            }
            // Dropping the handle closes the stream so the child sees EOF.
            drop(stdin);
        }

        let status = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status?,
                Err(_) => {
                    warn!(
                        target = "application::engine::runner",
                        op = "runner::run",
                        binary = %binary,
                        timeout_ms = limit.as_millis() as u64,
                        "Renderer exceeded time limit; killing"
                    );
                    if let Err(err) = child.kill().await {
                        warn!(
                            target = "application::engine::runner",
                            op = "runner::run",
                            binary = %binary,
                            error = %err,
                            "Failed to kill timed-out renderer"
                        );
                    }
                    return Err(ProcessError::Timeout(limit));
                }
            },
            None => child.wait().await?,
        };

        let stdout = stdout_task.await.map_err(io::Error::other)??;
        let stderr = stderr_task.await.map_err(io::Error::other)??;

        Ok(ProcessResult {
            stdout,
            stderr,
            status,
        })
    }
}
