//! Environment checks logged once before the server starts.
//!
//! Only workspace creation can fail startup. Everything else is informational.

use anyhow::{Context, Result};
use std::ffi::OsStr;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::sandbox::{self, IsolationProbe};

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn run_startup(config: &Config, probe: &dyn IsolationProbe) -> Result<()> {
    let workspace = &config.executor.workspace_dir;
    tokio::fs::create_dir_all(workspace)
        .await
        .with_context(|| format!("Failed to create workspace {}", workspace.display()))?;
    info!("Workspace directory ready: {}", workspace.display());

    let python = &config.executor.python_path;
    match version_of(python, ["--version"]).await {
        Some(version) => info!("Python version: {}", version),
        None => warn!("Could not determine Python version from {}", python.display()),
    }

    let status = sandbox::status(&config.sandbox, probe);
    match &status.located {
        Some(path) if config.sandbox.enabled => {
            let version = version_of(path, ["--version"])
                .await
                .unwrap_or_else(|| "version unknown".to_string());
            info!("{} is available at {}: {}", status.executable, path.display(), version);
            if !status.config_present {
                warn!(
                    "Sandbox policy {} does not exist; sandboxed runs will fail",
                    status.config_path.display()
                );
            }
        }
        Some(_) => warn!("Sandbox disabled by configuration, scripts will run directly"),
        None => warn!(
            "{} is not available, will fall back to direct Python execution",
            status.executable
        ),
    }

    if tracing::enabled!(tracing::Level::DEBUG) {
        match version_of(python, ["-m", "pip", "list"]).await {
            Some(packages) => debug!("Available Python packages:\n{}", packages),
            None => debug!("Could not list Python packages"),
        }
    }

    Ok(())
}

/// Run `program args` and return its trimmed output, or `None` on any failure.
///
/// Some tools print their version on stderr, so that is used when stdout is empty.
async fn version_of<I, S>(program: &Path, args: I) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let run = Command::new(program)
        .args(args)
        .stdin(std::process::Stdio::null())
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(PROBE_TIMEOUT, run).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            debug!("Failed to run {}: {}", program.display(), e);
            return None;
        }
        Err(_) => {
            debug!("{} did not answer within {:?}", program.display(), PROBE_TIMEOUT);
            return None;
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let text = if stdout.is_empty() {
        String::from_utf8_lossy(&output.stderr).trim().to_string()
    } else {
        stdout
    };

    if output.status.success() && !text.is_empty() {
        Some(text)
    } else {
        None
    }
}
