use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{Instrument, debug, error, field, info, info_span, warn};

use super::artifact::Artifact;
use super::decoder::{self, ExecutionOutput};
use super::error::{ExecutionError, ProtocolError, ScriptFailure};
use super::harness::{self, Separators};
use super::request::ExecutionRequest;
use crate::config::{Config, ExecutorConfig, SandboxConfig};
use crate::sandbox::{self, IsolationProbe, RunError, RunLimits};

/// Runs validated scripts end to end: build, persist, select, run, decode.
///
/// Cheap to clone; clones share the probe (and its cache).
#[derive(Clone)]
pub struct ExecutionService {
    executor: Arc<ExecutorConfig>,
    sandbox: Arc<SandboxConfig>,
    probe: Arc<dyn IsolationProbe>,
}

impl ExecutionService {
    pub fn new(config: &Config) -> Self {
        let probe = sandbox::default_probe(&config.sandbox);
        Self::with_probe(config, probe)
    }

    pub fn with_probe(config: &Config, probe: Arc<dyn IsolationProbe>) -> Self {
        Self {
            executor: Arc::new(config.executor.clone()),
            sandbox: Arc::new(config.sandbox.clone()),
            probe,
        }
    }

    pub fn probe(&self) -> &dyn IsolationProbe {
        self.probe.as_ref()
    }

    /// Execute one script.
    ///
    /// The artifact is removed on every exit path, including when the
    /// returned future is dropped mid-run; the child's process group is
    /// terminated in that case too.
    pub async fn execute(
        &self,
        request: &ExecutionRequest,
    ) -> Result<ExecutionOutput, ExecutionError> {
        let span = info_span!("execute", artifact = field::Empty);
        self.execute_inner(request).instrument(span).await
    }

    async fn execute_inner(
        &self,
        request: &ExecutionRequest,
    ) -> Result<ExecutionOutput, ExecutionError> {
        let started = Instant::now();

        let separators = Separators::generate();
        let program = harness::build(request.source(), &separators);

        let artifact = Artifact::persist(&self.executor.workspace_dir, &program).await?;
        tracing::Span::current().record("artifact", field::display(artifact.id()));
        info!("Executing script ({} bytes)", request.source().len());

        let decision = sandbox::select(&self.sandbox, self.probe.as_ref());
        let command = decision.command(&self.sandbox, &self.executor.python_path, artifact.path());
        debug!("Command: {}", command.display());

        let limits = RunLimits {
            timeout: Duration::from_secs(self.executor.timeout_secs),
            max_output_bytes: self.executor.max_output_bytes,
        };

        let outcome = sandbox::run_command(&command, artifact.workspace(), limits)
            .await
            .map_err(|e| self.run_error(e))
            .and_then(|output| {
                let stderr = harness::parse_stderr(&output.stderr, &separators);
                if !stderr.text.trim().is_empty() {
                    warn!("Python stderr: {}", stderr.text.trim());
                }

                if !output.success() {
                    return Err(ExecutionError::from_exit(
                        output.exit_code,
                        output.signal,
                        stderr.reported,
                        &stderr.text,
                    ));
                }

                match decoder::decode(&output.stdout, &separators) {
                    Ok(decoded) => Ok(decoded),
                    // Clean exit without a frame: the script called sys.exit itself.
                    Err(ProtocolError::MissingFrame) => Err(ExecutionError::from_exit(
                        output.exit_code,
                        None,
                        None,
                        &stderr.text,
                    )),
                    Err(e) => {
                        error!("{}; raw output: {:?}", e, output.stdout);
                        Err(ExecutionError::from(e))
                    }
                }
            });

        drop(artifact);

        match &outcome {
            Ok(_) => info!(
                "Execution finished in {:?} ({})",
                started.elapsed(),
                if decision.is_sandboxed() { "sandboxed" } else { "direct" }
            ),
            Err(e) => info!("Execution failed after {:?}: {}", started.elapsed(), e),
        }

        outcome
    }

    fn run_error(&self, err: RunError) -> ExecutionError {
        match err {
            RunError::Spawn { program, source } => {
                ExecutionError::resource(format!("Failed to start {}", program), source)
            }
            RunError::Timeout(_) => ExecutionError::Timeout(self.executor.timeout_secs),
            RunError::OutputLimit { stream, limit } => ExecutionError::Execution {
                failure: ScriptFailure::OutputLimit,
                message: format!(
                    "Failed to execute Python code: {} exceeded {} bytes",
                    stream, limit
                ),
            },
            RunError::Io(e) => ExecutionError::resource("Failed to collect process output", e),
        }
    }
}
