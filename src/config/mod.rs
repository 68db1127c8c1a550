use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths::Paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default)]
    pub sandbox: SandboxConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum request body size in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Interpreter used to run scripts, inside or outside the sandbox
    #[serde(default = "default_python_path")]
    pub python_path: PathBuf,

    /// Directory for the per-invocation script files
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: PathBuf,

    /// Wall-clock limit for a single run, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Cap for each of stdout and stderr, in bytes
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Run scripts under the sandbox when it is installed (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Sandbox executable name or path
    #[serde(default = "default_sandbox_executable")]
    pub executable: String,

    /// Policy file handed to the sandbox via --config
    #[serde(default = "default_sandbox_config_path")]
    pub config_path: PathBuf,

    /// Extra arguments placed before the `--` separator
    #[serde(default)]
    pub extra_args: Vec<String>,

    /// How long a probe result is reused (0 = probe on every invocation)
    #[serde(default = "default_probe_cache_secs")]
    pub probe_cache_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_max_body_bytes() -> usize {
    1024 * 1024
}
fn default_python_path() -> PathBuf {
    PathBuf::from("/app/venv/bin/python3")
}
fn default_workspace_dir() -> PathBuf {
    PathBuf::from("/app/workspace")
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_output_bytes() -> u64 {
    1024 * 1024
}
fn default_true() -> bool {
    true
}
fn default_sandbox_executable() -> String {
    "nsjail".to_string()
}
fn default_sandbox_config_path() -> PathBuf {
    PathBuf::from("/app/config/nsjail_config.proto")
}
fn default_probe_cache_secs() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            python_path: default_python_path(),
            workspace_dir: default_workspace_dir(),
            timeout_secs: default_timeout_secs(),
            max_output_bytes: default_max_output_bytes(),
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            executable: default_sandbox_executable(),
            config_path: default_sandbox_config_path(),
            extra_args: Vec::new(),
            probe_cache_secs: default_probe_cache_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl Config {
    /// Load configuration: defaults, then the TOML file (if any), then
    /// environment overrides.
    ///
    /// `explicit` is the `--config` / `PYEXEC_CONFIG` path. Without it the
    /// file in the config directory is used. A missing file is not an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = Self::config_path(explicit)?;
        Self::load_with_env(&path, |key| std::env::var(key))
    }

    /// Load from `path` with a custom env var lookup (for testing).
    pub fn load_with_env<F>(path: &Path, env_fn: F) -> Result<Self>
    where
        F: Fn(&str) -> std::result::Result<String, std::env::VarError>,
    {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            toml::from_str::<Config>(&content)
                .with_context(|| format!("Invalid config {}", path.display()))?
        } else {
            Config::default()
        };

        config.apply_env_overrides(env_fn)?;
        config.expand_paths();
        config.validate()?;

        Ok(config)
    }

    pub fn config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        match explicit {
            Some(path) => Ok(path.to_path_buf()),
            None => Ok(Paths::resolve()?.config_file()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;

        Ok(())
    }

    /// Write the commented template (for `config init`).
    pub fn write_template(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, DEFAULT_CONFIG_TEMPLATE)?;
        Ok(())
    }

    /// Environment variables recognised for deployment overrides.
    ///
    /// Empty values are ignored.
    fn apply_env_overrides<F>(&mut self, env_fn: F) -> Result<()>
    where
        F: Fn(&str) -> std::result::Result<String, std::env::VarError>,
    {
        let get = |key: &str| env_fn(key).ok().filter(|v| !v.trim().is_empty());

        if let Some(bind) = get("BIND") {
            self.server.bind = bind;
        }
        if let Some(port) = get("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("PORT must be a port number, got {:?}", port))?;
        }
        if let Some(python) = get("PYTHON_PATH") {
            self.executor.python_path = PathBuf::from(python);
        }
        if let Some(workspace) = get("WORKSPACE_DIR") {
            self.executor.workspace_dir = PathBuf::from(workspace);
        }
        if let Some(timeout) = get("EXECUTION_TIMEOUT_SECS") {
            self.executor.timeout_secs = timeout.trim().parse().with_context(|| {
                format!("EXECUTION_TIMEOUT_SECS must be an integer, got {:?}", timeout)
            })?;
        }
        if let Some(executable) = get("NSJAIL_PATH") {
            self.sandbox.executable = executable;
        }
        if let Some(config_path) = get("NSJAIL_CONFIG_PATH") {
            self.sandbox.config_path = PathBuf::from(config_path);
        }

        Ok(())
    }

    fn expand_paths(&mut self) {
        self.executor.python_path = expand_tilde(&self.executor.python_path);
        self.executor.workspace_dir = expand_tilde(&self.executor.workspace_dir);
        self.sandbox.config_path = expand_tilde(&self.sandbox.config_path);
    }

    fn validate(&self) -> Result<()> {
        if self.executor.timeout_secs == 0 {
            anyhow::bail!("executor.timeout_secs must be greater than zero");
        }
        if self.executor.max_output_bytes == 0 {
            anyhow::bail!("executor.max_output_bytes must be greater than zero");
        }
        Ok(())
    }

    pub fn get_value(&self, key: &str) -> Result<String> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["server", "bind"] => Ok(self.server.bind.clone()),
            ["server", "port"] => Ok(self.server.port.to_string()),
            ["server", "max_body_bytes"] => Ok(self.server.max_body_bytes.to_string()),
            ["executor", "python_path"] => Ok(self.executor.python_path.display().to_string()),
            ["executor", "workspace_dir"] => {
                Ok(self.executor.workspace_dir.display().to_string())
            }
            ["executor", "timeout_secs"] => Ok(self.executor.timeout_secs.to_string()),
            ["executor", "max_output_bytes"] => Ok(self.executor.max_output_bytes.to_string()),
            ["sandbox", "enabled"] => Ok(self.sandbox.enabled.to_string()),
            ["sandbox", "executable"] => Ok(self.sandbox.executable.clone()),
            ["sandbox", "config_path"] => Ok(self.sandbox.config_path.display().to_string()),
            ["sandbox", "probe_cache_secs"] => Ok(self.sandbox.probe_cache_secs.to_string()),
            ["logging", "level"] => Ok(self.logging.level.clone()),
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["server", "bind"] => self.server.bind = value.to_string(),
            ["server", "port"] => self.server.port = value.parse()?,
            ["server", "max_body_bytes"] => self.server.max_body_bytes = value.parse()?,
            ["executor", "python_path"] => self.executor.python_path = PathBuf::from(value),
            ["executor", "workspace_dir"] => self.executor.workspace_dir = PathBuf::from(value),
            ["executor", "timeout_secs"] => self.executor.timeout_secs = value.parse()?,
            ["executor", "max_output_bytes"] => self.executor.max_output_bytes = value.parse()?,
            ["sandbox", "enabled"] => self.sandbox.enabled = value.parse()?,
            ["sandbox", "executable"] => self.sandbox.executable = value.to_string(),
            ["sandbox", "config_path"] => self.sandbox.config_path = PathBuf::from(value),
            ["sandbox", "probe_cache_secs"] => self.sandbox.probe_cache_secs = value.parse()?,
            ["logging", "level"] => self.logging.level = value.to_string(),
            _ => anyhow::bail!("Unknown config key: {}", key),
        }

        Ok(())
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&raw).into_owned())
}

/// Default config template with helpful comments (used by `config init`)
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# pyexec configuration
#
# Environment variables override the file:
#   PORT, BIND, PYTHON_PATH, WORKSPACE_DIR, EXECUTION_TIMEOUT_SECS,
#   NSJAIL_PATH, NSJAIL_CONFIG_PATH

[server]
bind = "0.0.0.0"
port = 8080
# max_body_bytes = 1048576

[executor]
python_path = "/app/venv/bin/python3"
workspace_dir = "/app/workspace"
timeout_secs = 30
# max_output_bytes = 1048576          # per stream

[sandbox]
enabled = true                        # false = always run the interpreter directly
executable = "nsjail"
config_path = "/app/config/nsjail_config.proto"
# extra_args = ["--really_quiet"]
# probe_cache_secs = 30               # 0 = probe on every request

[logging]
level = "info"
# format = "json"                     # text | json
"#;
