use super::{Actuation, ActuationBackend, ActuationError};
use async_std::future::timeout;
use async_std::io::{Read, ReadExt};
use async_std::process::{Command, ExitStatus, Stdio};
use async_std::task::{self, JoinHandle};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Environment variable carrying the applied acceleration to the motor program
pub const ACCELERATION_ENV: &str = "MOTOR_ACCELERATION";

/// How long to wait for the output pipes once the child is gone
const PIPE_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Backend that drives the motor through an external control program.
///
/// The program is invoked as `<program> [args...] <cw|ccw> <speed> <duration>`
/// with the acceleration exported in `MOTOR_ACCELERATION`.
pub struct ExternalProcessBackend {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ExternalProcessBackend {
    pub fn new(program: PathBuf, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program,
            args,
            timeout,
        }
    }

    fn failure(&self, message: String) -> ActuationError {
        ActuationError::BackendFailed {
            backend: self.backend_name().to_string(),
            message,
        }
    }

    async fn run(&self, actuation: &Actuation) -> Result<(), ActuationError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(actuation.kind.as_arg())
            .arg(actuation.speed.to_string())
            .arg(actuation.duration.to_string())
            .env(ACCELERATION_ENV, actuation.acceleration.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Spawning {:?}", command);
        let mut child = command
            .spawn()
            .map_err(|e| self.failure(format!("cannot spawn {}: {}", self.program.display(), e)))?;

        // Drain both pipes while waiting so a chatty program never blocks on a full pipe
        let stdout = child.stdout.take().map(|pipe| task::spawn(read_pipe(pipe)));
        let stderr = child.stderr.take().map(|pipe| task::spawn(read_pipe(pipe)));

        let outcome = match timeout(self.timeout, child.status()).await {
            Ok(Ok(status)) => Ok(status),
            Ok(Err(e)) => Err(self.failure(format!("wait failed: {}", e))),
            Err(_) => {
                warn!(
                    "{} did not exit within {:?}, killing it",
                    self.program.display(),
                    self.timeout
                );
                if let Err(e) = child.kill() {
                    warn!("Failed to kill motor program: {}", e);
                }
                // Reap the killed child so it does not linger as a zombie
                let _ = child.status().await;
                Err(self.failure(format!("timed out after {:?}", self.timeout)))
            }
        };

        log_pipe("stdout", stdout).await;
        log_pipe("stderr", stderr).await;

        check_status(outcome?).map_err(|message| self.failure(message))
    }
}

impl ActuationBackend for ExternalProcessBackend {
    fn execute<'a>(
        &'a self,
        actuation: &'a Actuation,
    ) -> BoxFuture<'a, Result<(), ActuationError>> {
        async move {
            info!(
                "Running {} for {} (speed {:.2}, {}ms)",
                self.program.display(),
                actuation.kind,
                actuation.speed,
                actuation.duration
            );
            self.run(actuation).await
        }
        .boxed()
    }

    fn backend_name(&self) -> &'static str {
        "ExternalProcess"
    }
}

fn check_status(status: ExitStatus) -> Result<(), String> {
    if status.success() {
        Ok(())
    } else {
        match status.code() {
            Some(code) => Err(format!("exited with status {}", code)),
            None => Err("terminated by signal".to_string()),
        }
    }
}

async fn read_pipe<R: Read + Unpin>(mut pipe: R) -> String {
    let mut bytes = Vec::new();
    let _ = pipe.read_to_end(&mut bytes).await;
    String::from_utf8_lossy(&bytes).into_owned()
}

async fn log_pipe(name: &str, handle: Option<JoinHandle<String>>) {
    let Some(handle) = handle else {
        return;
    };
    match timeout(PIPE_DRAIN_TIMEOUT, handle).await {
        Ok(output) if !output.trim().is_empty() => {
            debug!("Motor program {}:\n{}", name, output.trim_end())
        }
        Ok(_) => {}
        Err(_) => debug!("Motor program {} still open, not waiting for it", name),
    }
}
