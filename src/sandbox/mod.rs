//! Isolation for untrusted scripts.
//!
//! Each invocation probes for the configured sandbox executable (nsjail by
//! default). When present, the interpreter runs under it with the configured
//! policy file; when absent, the interpreter runs directly and a warning is
//! logged. Commands are always argument vectors, never shell strings.

pub mod detect;
pub mod executor;
pub mod policy;

pub use detect::{CachedProbe, IsolationProbe, SandboxStatus, WhichProbe};
pub use executor::{ProcessOutput, RunError, RunLimits, run_command};
pub use policy::{ExecCommand, SandboxDecision, select};

use crate::config::SandboxConfig;
use std::sync::Arc;
use std::time::Duration;

/// The production probe for `config`: a `which` lookup, cached for
/// `probe_cache_secs`.
pub fn default_probe(config: &SandboxConfig) -> Arc<dyn IsolationProbe> {
    Arc::new(CachedProbe::new(
        WhichProbe::new(config.executable.clone()),
        Duration::from_secs(config.probe_cache_secs),
    ))
}

/// Current sandbox availability under `config`.
pub fn status(config: &SandboxConfig, probe: &dyn IsolationProbe) -> SandboxStatus {
    SandboxStatus {
        enabled: config.enabled,
        executable: config.executable.clone(),
        located: probe.locate(),
        config_path: config.config_path.clone(),
        config_present: config.config_path.is_file(),
    }
}
