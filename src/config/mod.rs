//! Env-var + `_FILE` suffix credential convention, plus the optional TOML
//! configuration file (SPEC_FULL §6).

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProviderConfig {
    pub account_name: String,
    #[serde(default)]
    pub dashboard_url: Option<String>,
    #[serde(default)]
    pub budget_usd: Option<f64>,
    /// Overrides the provider's canonical credential env var name; lets
    /// multiple accounts of the same provider each name a distinct
    /// variable (`CIVO_API_KEY_WORK`, `CIVO_API_KEY_PERSONAL`, ...).
    #[serde(default)]
    pub api_key_env: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct KubernetesContextConfig {
    pub context: String,
    /// Free-form label surfaced in `KubernetesCluster::platform` (e.g.
    /// "civo", "eks", "kind"); not derived automatically since `kubectl`
    /// exposes no reliable "what hosts this cluster" signal.
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub dashboard_url: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ClaudeAccountConfig {
    pub name: String,
    /// Name of the environment variable holding the admin API key.
    pub api_key_env: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub cache_dir: Option<String>,
    #[serde(default)]
    pub tick_interval_ms: Option<u64>,
    #[serde(default)]
    pub civo: Vec<ProviderConfig>,
    #[serde(default)]
    pub digitalocean: Vec<ProviderConfig>,
    #[serde(default)]
    pub aws: Vec<ProviderConfig>,
    #[serde(default)]
    pub dreamhost: Vec<ProviderConfig>,
    #[serde(default)]
    pub kubernetes_contexts: Vec<KubernetesContextConfig>,
    #[serde(default)]
    pub claude_accounts: Vec<ClaudeAccountConfig>,
    #[serde(default)]
    pub tailnet: Option<String>,
    #[serde(default)]
    pub tailscale_cli_fallback: bool,
    #[serde(default)]
    pub billing_interval_secs: Option<u64>,
    #[serde(default)]
    pub infra_interval_secs: Option<u64>,
    #[serde(default)]
    pub claude_usage_interval_secs: Option<u64>,
    #[serde(default)]
    pub sysmetrics_interval_secs: Option<u64>,
}

/// Default per-collector cadence (SPEC_FULL §4.1, §9): cheap local sources
/// poll fast, metered cloud APIs poll slow.
pub const DEFAULT_BILLING_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_INFRA_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_CLAUDE_USAGE_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_SYSMETRICS_INTERVAL_SECS: u64 = 5;

impl DaemonConfig {
    /// Loads from `path` if given, else `$XDG_CONFIG_HOME/statusline-daemon/config.toml`
    /// if it exists, else returns the all-defaults configuration. A missing
    /// file is never an error; a present-but-unparseable one is.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = match path {
            Some(p) => Some(p.to_path_buf()),
            None => default_config_path().filter(|p| p.exists()),
        };

        let Some(path) = resolved else {
            return Ok(DaemonConfig::default());
        };

        let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn cache_dir(&self) -> PathBuf {
        if let Some(dir) = &self.cache_dir {
            return PathBuf::from(dir);
        }
        std::env::var("STATUSLINE_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_cache_dir())
    }

    pub fn tick_interval(&self) -> Duration {
        if let Some(ms) = self.tick_interval_ms {
            return Duration::from_millis(ms);
        }
        std::env::var("STATUSLINE_TICK_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_secs(1))
    }

    pub fn billing_interval(&self) -> Duration {
        Duration::from_secs(self.billing_interval_secs.unwrap_or(DEFAULT_BILLING_INTERVAL_SECS))
    }

    pub fn infra_interval(&self) -> Duration {
        Duration::from_secs(self.infra_interval_secs.unwrap_or(DEFAULT_INFRA_INTERVAL_SECS))
    }

    pub fn claude_usage_interval(&self) -> Duration {
        Duration::from_secs(self.claude_usage_interval_secs.unwrap_or(DEFAULT_CLAUDE_USAGE_INTERVAL_SECS))
    }

    pub fn sysmetrics_interval(&self) -> Duration {
        Duration::from_secs(self.sysmetrics_interval_secs.unwrap_or(DEFAULT_SYSMETRICS_INTERVAL_SECS))
    }
}

fn default_config_path() -> Option<PathBuf> {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
        .ok()?;
    Some(base.join("statusline-daemon").join("config.toml"))
}

fn default_cache_dir() -> PathBuf {
    let base = std::env::var("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".cache")))
        .unwrap_or_else(|_| std::env::temp_dir());
    base.join("statusline-daemon")
}

/// Resolves a credential by checking `env_var` first, then `{env_var}_FILE`
/// — if the latter is set, its contents are read and trimmed.
pub fn resolve_credential(env_var: &str) -> Option<String> {
    if let Ok(value) = std::env::var(env_var) {
        if !value.is_empty() {
            return Some(value);
        }
    }
    let file_var = format!("{env_var}_FILE");
    if let Ok(path) = std::env::var(file_var) {
        if let Ok(contents) = std::fs::read_to_string(path) {
            let trimmed = contents.trim().to_string();
            if !trimmed.is_empty() {
                return Some(trimmed);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn missing_config_file_yields_defaults() {
        let cfg = DaemonConfig::load(Some(Path::new("/nonexistent/path/config.toml")));
        // Explicit path that doesn't exist is a read error, not silently defaulted.
        assert!(cfg.is_err());
    }

    #[test]
    fn no_path_and_no_xdg_file_yields_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("XDG_CONFIG_HOME");
        std::env::set_var("HOME", "/nonexistent-home-for-test");
        let cfg = DaemonConfig::load(None).unwrap();
        assert!(cfg.civo.is_empty());
    }

    #[test]
    fn credential_falls_back_to_file_suffix() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret");
        std::fs::write(&path, "sk-test-123\n").unwrap();
        std::env::remove_var("TEST_CRED_XYZ");
        std::env::set_var("TEST_CRED_XYZ_FILE", path.to_str().unwrap());
        let resolved = resolve_credential("TEST_CRED_XYZ");
        assert_eq!(resolved, Some("sk-test-123".to_string()));
        std::env::remove_var("TEST_CRED_XYZ_FILE");
    }

    #[test]
    fn direct_env_var_takes_precedence_over_file() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("TEST_CRED_ABC", "direct-value");
        let resolved = resolve_credential("TEST_CRED_ABC");
        assert_eq!(resolved, Some("direct-value".to_string()));
        std::env::remove_var("TEST_CRED_ABC");
    }
}
