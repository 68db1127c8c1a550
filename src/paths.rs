//! Config directory resolution.
//!
//! The config directory is resolved through a two-level fallback:
//! 1. `PYEXEC_CONFIG_DIR`
//! 2. XDG config dir (XDG_CONFIG_HOME or the platform default) via `etcetera`
//!
//! Relative paths from env vars are ignored per XDG spec.

use anyhow::Result;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Paths {
    /// Config directory: config.toml lives here
    pub config_dir: PathBuf,
}

impl Paths {
    /// Resolve paths using real environment variables.
    pub fn resolve() -> Result<Self> {
        Self::resolve_with_env(|key| std::env::var(key))
    }

    /// Resolve paths with a custom env var lookup (for testing).
    pub fn resolve_with_env<F>(env_fn: F) -> Result<Self>
    where
        F: Fn(&str) -> std::result::Result<String, std::env::VarError>,
    {
        use etcetera::BaseStrategy;

        let strategy = etcetera::choose_base_strategy()
            .map_err(|e| anyhow::anyhow!("Failed to determine base directories: {}", e))?;

        let config_dir = env_or(&env_fn, "PYEXEC_CONFIG_DIR", || {
            strategy.config_dir().join("pyexec")
        });

        Ok(Self { config_dir })
    }

    /// Config file: config_dir/config.toml
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }
}

/// Resolve an env var with fallback. Ignores empty and relative paths.
fn env_or<F>(env_fn: &F, var: &str, default: impl FnOnce() -> PathBuf) -> PathBuf
where
    F: Fn(&str) -> std::result::Result<String, std::env::VarError>,
{
    env_fn(var)
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .filter(|p| p.is_absolute())
        .unwrap_or_else(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn make_env(
        map: HashMap<&str, &str>,
    ) -> impl Fn(&str) -> std::result::Result<String, std::env::VarError> {
        move |key: &str| {
            map.get(key)
                .map(|v| v.to_string())
                .ok_or(std::env::VarError::NotPresent)
        }
    }

    #[test]
    fn default_config_dir_is_xdg() {
        let paths = Paths::resolve_with_env(make_env(HashMap::new())).unwrap();
        assert!(
            paths.config_dir.ends_with("pyexec"),
            "config_dir: {:?}",
            paths.config_dir
        );
        assert!(paths.config_file().ends_with("pyexec/config.toml"));
    }

    #[test]
    fn env_var_overrides_xdg() {
        let mut env = HashMap::new();
        env.insert("PYEXEC_CONFIG_DIR", "/custom/config");

        let paths = Paths::resolve_with_env(make_env(env)).unwrap();
        assert_eq!(paths.config_dir, PathBuf::from("/custom/config"));
        assert_eq!(paths.config_file(), PathBuf::from("/custom/config/config.toml"));
    }

    #[test]
    fn relative_and_empty_values_are_ignored() {
        for value in ["relative/path", ""] {
            let mut env = HashMap::new();
            env.insert("PYEXEC_CONFIG_DIR", value);

            let paths = Paths::resolve_with_env(make_env(env)).unwrap();
            assert!(paths.config_dir.is_absolute());
            assert!(paths.config_dir.ends_with("pyexec"));
        }
    }
}
