use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::host::rest::DEFAULT_API_URL;
use crate::retry::RetryConfig;

pub const CONFIG_FILE: &str = ".shipgate.toml";

/// Contexts that report noise rather than test results.
pub const DEFAULT_EXCLUDE_CONTEXTS: &str = "datreeio|Renovate|[Cc]odecov|Dependabot";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },
}

/// Top-level configuration loaded from `.shipgate.toml`.
/// Every field is optional; the tool works with zero config.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub checks: ChecksConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// API token. If None, falls back to GITHUB_TOKEN, then GIT_TOKEN.
    pub token: Option<String>,
    pub api_url: String,
    pub org: Option<String>,
    pub repo: Option<String>,
    /// Per-request transport timeout.
    pub timeout_secs: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: DEFAULT_API_URL.to_string(),
            org: None,
            repo: None,
            timeout_secs: 30,
        }
    }
}

/// Policy for turning check results into a pass/fail verdict.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChecksConfig {
    pub exclude_contexts: Option<String>,
    pub include_contexts: Option<String>,
    /// Minimum number of selected checks before the gate may pass. 0 disables.
    pub min_checks: usize,
    pub fail_on_pending: bool,
    /// Consider every reported check, not only the branch's required ones.
    pub all_checks: bool,
    /// Branch whose protection rules name the required checks.
    pub protected_branch: String,
    /// Checks whose failures never fail the gate.
    pub ignore_list: Vec<String>,
}

impl Default for ChecksConfig {
    fn default() -> Self {
        Self {
            exclude_contexts: Some(DEFAULT_EXCLUDE_CONTEXTS.to_string()),
            include_contexts: None,
            min_checks: 1,
            fail_on_pending: true,
            all_checks: true,
            protected_branch: "master".to_string(),
            ignore_list: vec!["GitHub Actions".to_string()],
        }
    }
}

impl Config {
    /// Load configuration from `.shipgate.toml` in the current directory,
    /// falling back to defaults, then apply environment overrides.
    pub fn load() -> Result<Config, ConfigError> {
        let path = Path::new(CONFIG_FILE);
        let config = if path.exists() {
            Self::load_from(path)?
        } else {
            Config::default()
        };
        config.with_env_overrides(|name| std::env::var(name).ok())
    }

    /// Load from a specific path without consulting the environment.
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Apply `GITHUB_TOKEN`/`GIT_TOKEN` (only when no token is configured)
    /// and `RETRY_MAX_ATTEMPTS`.
    pub fn with_env_overrides(
        mut self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Config, ConfigError> {
        if self.github.token.is_none() {
            self.github.token = env("GITHUB_TOKEN").or_else(|| env("GIT_TOKEN"));
        }
        if let Some(value) = env("RETRY_MAX_ATTEMPTS") {
            self.retry.max_attempts = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: "RETRY_MAX_ATTEMPTS",
                value,
            })?;
        }
        Ok(self)
    }
}
