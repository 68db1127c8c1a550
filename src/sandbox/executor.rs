use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::debug;

use super::policy::ExecCommand;

/// Time between SIGTERM and SIGKILL when a process group is torn down.
const TERMINATE_GRACE: Duration = Duration::from_millis(500);

/// The only environment a child process sees.
const CHILD_ENV: &[(&str, &str)] = &[
    ("PATH", "/usr/local/bin:/usr/bin:/bin"),
    ("LANG", "C.UTF-8"),
    ("PYTHONIOENCODING", "utf-8"),
    ("PYTHONUNBUFFERED", "1"),
    ("PYTHONDONTWRITEBYTECODE", "1"),
];

/// Bounds applied to a single run.
#[derive(Debug, Clone, Copy)]
pub struct RunLimits {
    pub timeout: Duration,
    /// Cap for each of stdout and stderr.
    pub max_output_bytes: u64,
}

/// Everything a finished child left behind.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    /// Terminating signal, if the process did not exit normally.
    pub signal: Option<i32>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Process timed out after {0:?}")]
    Timeout(Duration),

    #[error("Process {stream} exceeded {limit} bytes")]
    OutputLimit { stream: &'static str, limit: u64 },

    #[error("Failed to collect process output: {0}")]
    Io(#[from] io::Error),
}

/// Run `command` to completion and collect its output.
///
/// The child gets a cleared environment, a null stdin and its own process
/// group. If the timeout expires, an output cap is exceeded, or the returned
/// future is dropped before completion, the whole group is terminated.
pub async fn run_command(
    command: &ExecCommand,
    working_dir: &Path,
    limits: RunLimits,
) -> Result<ProcessOutput, RunError> {
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .current_dir(working_dir)
        .env_clear()
        .envs(CHILD_ENV.iter().copied())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|source| RunError::Spawn {
        program: command.program.display().to_string(),
        source,
    })?;
    let mut group = ProcessGroupGuard::new(child.id());
    debug!("Spawned pid {:?}: {}", child.id(), command.display());

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("child stdout was not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("child stderr was not captured"))?;

    let limit = limits.max_output_bytes;
    let collect = async {
        let (stdout, stderr) = tokio::try_join!(
            read_capped(stdout, limit, "stdout"),
            read_capped(stderr, limit, "stderr"),
        )?;
        let status = child.wait().await?;
        Ok::<_, RunError>((stdout, stderr, status))
    };

    let (stdout, stderr, status) = match tokio::time::timeout(limits.timeout, collect).await {
        Ok(collected) => collected?,
        Err(_) => {
            group.terminate().await;
            return Err(RunError::Timeout(limits.timeout));
        }
    };
    group.disarm();

    #[cfg(unix)]
    let signal = std::os::unix::process::ExitStatusExt::signal(&status);
    #[cfg(not(unix))]
    let signal = None;

    Ok(ProcessOutput {
        stdout,
        stderr,
        exit_code: status.code(),
        signal,
    })
}

async fn read_capped<R>(reader: R, limit: u64, stream: &'static str) -> Result<String, RunError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    reader
        .take(limit.saturating_add(1))
        .read_to_end(&mut buf)
        .await?;

    if buf.len() as u64 > limit {
        return Err(RunError::OutputLimit { stream, limit });
    }

    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[derive(Debug, Clone, Copy)]
enum Stop {
    Terminate,
    Kill,
}

/// Terminates the child's process group unless disarmed after a clean wait.
struct ProcessGroupGuard {
    pgid: Option<u32>,
}

impl ProcessGroupGuard {
    fn new(pid: Option<u32>) -> Self {
        Self { pgid: pid }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }

    async fn terminate(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            signal_group(pgid, Stop::Terminate);
            tokio::time::sleep(TERMINATE_GRACE).await;
            signal_group(pgid, Stop::Kill);
        }
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        let Some(pgid) = self.pgid.take() else {
            return;
        };

        debug!("Terminating abandoned process group {}", pgid);
        signal_group(pgid, Stop::Terminate);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(TERMINATE_GRACE).await;
                    signal_group(pgid, Stop::Kill);
                });
            }
            Err(_) => signal_group(pgid, Stop::Kill),
        }
    }
}

#[cfg(unix)]
fn signal_group(pgid: u32, stop: Stop) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pgid) else {
        return;
    };
    let signal = match stop {
        Stop::Terminate => Signal::SIGTERM,
        Stop::Kill => Signal::SIGKILL,
    };

    match killpg(Pid::from_raw(raw), signal) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => debug!("killpg({}, {}) failed: {}", raw, signal, e),
    }
}

#[cfg(not(unix))]
fn signal_group(_pgid: u32, _stop: Stop) {
    // kill_on_drop on the direct child is all we have here.
}
