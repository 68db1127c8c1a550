use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::detect::IsolationProbe;
use crate::config::SandboxConfig;

/// How one invocation will be executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxDecision {
    /// Run the interpreter under the sandbox executable at this path.
    Sandboxed { sandbox: PathBuf },
    /// Run the interpreter directly; isolation was bypassed.
    Direct,
}

/// A program plus its argument vector. Never passed through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl ExecCommand {
    /// The full command line, for logs only.
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.to_string_lossy().into_owned()];
        parts.extend(self.args.iter().map(|a| a.to_string_lossy().into_owned()));
        parts.join(" ")
    }
}

/// Probe for the sandbox and decide how to run this invocation.
///
/// A missing sandbox is not an error: the invocation degrades to direct
/// execution and a warning is logged.
pub fn select(config: &SandboxConfig, probe: &dyn IsolationProbe) -> SandboxDecision {
    if !config.enabled {
        warn!("Sandbox disabled by configuration, falling back to direct Python execution");
        return SandboxDecision::Direct;
    }

    match probe.locate() {
        Some(sandbox) => {
            debug!(
                "Using {} for secure execution with config: {}",
                sandbox.display(),
                config.config_path.display()
            );
            SandboxDecision::Sandboxed { sandbox }
        }
        None => {
            warn!(
                "{} not found, falling back to direct Python execution",
                config.executable
            );
            SandboxDecision::Direct
        }
    }
}

impl SandboxDecision {
    pub fn is_sandboxed(&self) -> bool {
        matches!(self, Self::Sandboxed { .. })
    }

    /// Build the command that runs `python` against `script`.
    pub fn command(&self, config: &SandboxConfig, python: &Path, script: &Path) -> ExecCommand {
        match self {
            Self::Sandboxed { sandbox } => {
                let mut args: Vec<OsString> = vec![
                    OsString::from("--config"),
                    config.config_path.clone().into_os_string(),
                ];
                args.extend(config.extra_args.iter().map(OsString::from));
                args.push(OsString::from("--"));
                args.push(python.as_os_str().to_owned());
                args.push(script.as_os_str().to_owned());
                ExecCommand {
                    program: sandbox.clone(),
                    args,
                }
            }
            Self::Direct => ExecCommand {
                program: python.to_path_buf(),
                args: vec![script.as_os_str().to_owned()],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::detect::MockIsolationProbe;

    fn found_at(path: &'static str) -> MockIsolationProbe {
        let mut probe = MockIsolationProbe::new();
        probe
            .expect_locate()
            .returning(move || Some(PathBuf::from(path)));
        probe
    }

    #[test]
    fn selects_sandbox_when_present() {
        let decision = select(&SandboxConfig::default(), &found_at("/usr/bin/nsjail"));
        assert_eq!(
            decision,
            SandboxDecision::Sandboxed {
                sandbox: PathBuf::from("/usr/bin/nsjail")
            }
        );
    }

    #[test]
    fn falls_back_when_absent() {
        let mut probe = MockIsolationProbe::new();
        probe.expect_locate().returning(|| None);
        assert_eq!(
            select(&SandboxConfig::default(), &probe),
            SandboxDecision::Direct
        );
    }

    #[test]
    fn disabled_sandbox_skips_probe() {
        let mut probe = MockIsolationProbe::new();
        probe.expect_locate().never();
        let config = SandboxConfig {
            enabled: false,
            ..SandboxConfig::default()
        };
        assert_eq!(select(&config, &probe), SandboxDecision::Direct);
    }

    #[test]
    fn sandboxed_command_is_an_argument_vector() {
        let config = SandboxConfig {
            config_path: PathBuf::from("/etc/nsjail.cfg"),
            extra_args: vec!["--really_quiet".to_string()],
            ..SandboxConfig::default()
        };
        let decision = SandboxDecision::Sandboxed {
            sandbox: PathBuf::from("/usr/bin/nsjail"),
        };
        let cmd = decision.command(
            &config,
            Path::new("/venv/bin/python3"),
            Path::new("/ws/script-1.py"),
        );

        assert_eq!(cmd.program, PathBuf::from("/usr/bin/nsjail"));
        let args: Vec<_> = cmd.args.iter().map(|a| a.to_str().unwrap()).collect();
        assert_eq!(
            args,
            [
                "--config",
                "/etc/nsjail.cfg",
                "--really_quiet",
                "--",
                "/venv/bin/python3",
                "/ws/script-1.py"
            ]
        );
    }

    #[test]
    fn direct_command_runs_interpreter() {
        let cmd = SandboxDecision::Direct.command(
            &SandboxConfig::default(),
            Path::new("/usr/bin/python3"),
            Path::new("/ws/a b; rm -rf.py"),
        );
        assert_eq!(cmd.program, PathBuf::from("/usr/bin/python3"));
        assert_eq!(cmd.args, vec![OsString::from("/ws/a b; rm -rf.py")]);
        assert_eq!(cmd.display(), "/usr/bin/python3 /ws/a b; rm -rf.py");
    }
}
