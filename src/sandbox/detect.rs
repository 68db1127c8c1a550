use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Answers "is the sandbox executable installed, and where?".
///
/// Injected into the execution service so tests can substitute a fake.
#[cfg_attr(test, mockall::automock)]
pub trait IsolationProbe: Send + Sync {
    /// Absolute path of the sandbox executable, or `None` if it is not installed.
    fn locate(&self) -> Option<PathBuf>;
}

/// Looks the sandbox executable up on `PATH` (or checks an explicit path).
#[derive(Debug, Clone)]
pub struct WhichProbe {
    executable: String,
}

impl WhichProbe {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
        }
    }
}

impl IsolationProbe for WhichProbe {
    fn locate(&self) -> Option<PathBuf> {
        which::which(&self.executable).ok()
    }
}

/// Reuses a probe's answer for `ttl` before asking again.
///
/// A zero `ttl` re-probes on every call.
pub struct CachedProbe<P> {
    inner: P,
    ttl: Duration,
    cached: Mutex<Option<(Instant, Option<PathBuf>)>>,
}

impl<P: IsolationProbe> CachedProbe<P> {
    pub fn new(inner: P, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cached: Mutex::new(None),
        }
    }
}

impl<P: IsolationProbe> IsolationProbe for CachedProbe<P> {
    fn locate(&self) -> Option<PathBuf> {
        if self.ttl.is_zero() {
            return self.inner.locate();
        }

        let mut cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((at, found)) = cached.as_ref()
            && at.elapsed() < self.ttl
        {
            return found.clone();
        }

        let found = self.inner.locate();
        *cached = Some((Instant::now(), found.clone()));
        found
    }
}

/// Snapshot of sandbox availability, for `sandbox status` and startup logs.
#[derive(Debug, Clone)]
pub struct SandboxStatus {
    pub enabled: bool,
    pub executable: String,
    pub located: Option<PathBuf>,
    pub config_path: PathBuf,
    pub config_present: bool,
}

impl SandboxStatus {
    pub fn will_isolate(&self) -> bool {
        self.enabled && self.located.is_some()
    }

    /// Human-readable status lines.
    pub fn status_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();

        match &self.located {
            Some(path) => lines.push(format!("  Sandbox:   {:<28} ok", path.display())),
            None => lines.push(format!("  Sandbox:   {:<28} --", format!("{} not found", self.executable))),
        }

        if self.config_present {
            lines.push(format!("  Config:    {:<28} ok", self.config_path.display()));
        } else {
            lines.push(format!("  Config:    {:<28} --", self.config_path.display()));
        }

        let mode = match (self.enabled, self.will_isolate()) {
            (false, _) => "direct (sandbox disabled)",
            (true, true) => "sandboxed",
            (true, false) => "direct (sandbox unavailable)",
        };
        lines.push(format!("  Mode:      {}", mode));

        lines
    }
}
