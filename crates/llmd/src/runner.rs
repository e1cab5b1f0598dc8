//! Control script execution.
//!
//! Provides:
//! - `ScriptRunner`: runs one script under an interpreter with a hard timeout,
//!   capturing stdout/stderr and the exit code
//! - `ServiceLauncher`: the seam the controller starts and stops services
//!   through; `ScriptLauncher` implements it with the configured scripts
//!
//! A non-zero exit is a normal `ScriptOutput`, not an error. Only a timeout or
//! a failure to launch the interpreter produce `ScriptError`.

use crate::registry::ServiceSpec;
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Captured result of a script that ran to completion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptOutput {
    /// None when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ScriptOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    /// Killed at the deadline; carries whatever it printed before that
    #[error("Script timed out after {after:?}")]
    Timeout {
        after: Duration,
        stdout: String,
        stderr: String,
    },

    #[error("Failed to launch script: {0}")]
    Launch(String),
}

/// How long to keep draining pipes after the script itself has exited.
/// Backgrounded servers inherit stdout and may hold it open indefinitely.
const PIPE_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Background reader filling a shared buffer from one child pipe
struct PipeCapture {
    buffer: Arc<StdMutex<Vec<u8>>>,
    reader: JoinHandle<()>,
}

impl PipeCapture {
    fn spawn<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&buffer);
        let reader = tokio::spawn(async move {
            let Some(mut pipe) = pipe else {
                return;
            };
            let mut chunk = [0u8; 4096];
            loop {
                match pipe.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if let Ok(mut buf) = sink.lock() {
                            buf.extend_from_slice(&chunk[..n]);
                        }
                    }
                }
            }
        });
        Self { buffer, reader }
    }

    /// Wait briefly for EOF, then take what has been read so far
    async fn finish(mut self) -> String {
        if tokio::time::timeout(PIPE_DRAIN_GRACE, &mut self.reader)
            .await
            .is_err()
        {
            debug!("Pipe still open after script exit, keeping partial output");
            self.reader.abort();
        }
        let bytes = self
            .buffer
            .lock()
            .map(|buf| buf.clone())
            .unwrap_or_default();
        String::from_utf8_lossy(&bytes).to_string()
    }
}

/// Runs control scripts through an interpreter
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    interpreter: String,
    timeout: Duration,
}

impl ScriptRunner {
    pub fn new(interpreter: impl Into<String>, timeout: Duration) -> Self {
        Self {
            interpreter: interpreter.into(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `script` in `working_dir`, killing it once the timeout elapses
    pub async fn run(&self, script: &Path, working_dir: &Path) -> Result<ScriptOutput, ScriptError> {
        debug!(
            interpreter = %self.interpreter,
            script = %script.display(),
            cwd = %working_dir.display(),
            timeout_ms = self.timeout.as_millis() as u64,
            "Executing script"
        );

        let mut cmd = Command::new(&self.interpreter);
        cmd.arg(script)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group, so a timeout takes down everything the script spawned
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| {
            ScriptError::Launch(format!(
                "{} {}: {}",
                self.interpreter,
                script.display(),
                e
            ))
        })?;
        let pid = child.id();
        let start = Instant::now();

        let stdout = PipeCapture::spawn(child.stdout.take());
        let stderr = PipeCapture::spawn(child.stderr.take());

        match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => {
                let result = ScriptOutput {
                    exit_code: status.code(),
                    stdout: stdout.finish().await,
                    stderr: stderr.finish().await,
                };
                debug!(
                    exit_code = ?result.exit_code,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Script completed"
                );
                Ok(result)
            }
            Ok(Err(e)) => Err(ScriptError::Launch(format!(
                "failed to wait for {}: {}",
                script.display(),
                e
            ))),
            Err(_) => {
                warn!(
                    script = %script.display(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Script timed out, killing"
                );
                if let Some(pid) = pid {
                    kill_process_group(pid);
                }
                if let Err(e) = child.kill().await {
                    debug!(error = %e, "Script already reaped");
                }
                Err(ScriptError::Timeout {
                    after: self.timeout,
                    stdout: stdout.finish().await,
                    stderr: stderr.finish().await,
                })
            }
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        debug!(pid, error = %e, "Process group already gone");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

/// Which control script to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptAction {
    Start,
    Stop,
}

impl fmt::Display for ScriptAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptAction::Start => f.write_str("start"),
            ScriptAction::Stop => f.write_str("stop"),
        }
    }
}

/// Backend that brings a service up or down
///
/// The controller only depends on this trait, so script execution can be
/// swapped for direct process supervision or a service manager.
#[async_trait]
pub trait ServiceLauncher: Send + Sync {
    async fn launch(
        &self,
        service: &ServiceSpec,
        action: ScriptAction,
    ) -> Result<ScriptOutput, ScriptError>;
}

/// Launcher that runs the service's start/stop scripts
#[derive(Debug, Clone)]
pub struct ScriptLauncher {
    runner: ScriptRunner,
    working_dir: PathBuf,
}

impl ScriptLauncher {
    pub fn new(runner: ScriptRunner, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            working_dir: working_dir.into(),
        }
    }
}

#[async_trait]
impl ServiceLauncher for ScriptLauncher {
    async fn launch(
        &self,
        service: &ServiceSpec,
        action: ScriptAction,
    ) -> Result<ScriptOutput, ScriptError> {
        let script = match action {
            ScriptAction::Start => &service.start_script,
            ScriptAction::Stop => &service.stop_script,
        };
        self.runner.run(script, &self.working_dir).await
    }
}
