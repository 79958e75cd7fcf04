use crate::policy::CachePolicy;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub local: LocalConfig,
    #[serde(default)]
    pub shared: SharedConfig,
    #[serde(default)]
    pub resp: RespConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocalConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_ttl")]
    pub default_ttl_seconds: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SharedConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_shared_addr")]
    pub addr: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_ttl")]
    pub default_ttl_seconds: u64,
    /// Connections for lookups, and as many again for background writes.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RespConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_resp_addr")]
    pub listen_addr: String,
}

/// Durations applied to the sample endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "default_client_side_duration")]
    pub client_side_duration: u64,
    #[serde(default = "default_server_side_duration")]
    pub server_side_duration: u64,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        Self::default()
    }
}

impl LocalConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        // A zero interval would spin the sweeper.
        Duration::from_secs(self.sweep_interval_seconds.max(1))
    }
}

impl SharedConfig {
    pub fn timeout(&self) -> Duration {
        // Zero would fail every call before it is sent.
        Duration::from_millis(self.timeout_ms.max(1))
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }
}

impl PolicyConfig {
    /// Apply the configured durations to a marker policy.
    pub fn apply(&self, policy: CachePolicy) -> CachePolicy {
        policy
            .with_client_side_duration(self.client_side_duration)
            .with_server_side_duration(self.server_side_duration)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            metrics_addr: default_metrics_addr(),
        }
    }
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_seconds: default_ttl(),
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: default_shared_addr(),
            timeout_ms: default_timeout_ms(),
            default_ttl_seconds: default_ttl(),
            pool_size: default_pool_size(),
        }
    }
}

impl Default for RespConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: default_resp_addr(),
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            client_side_duration: default_client_side_duration(),
            server_side_duration: default_server_side_duration(),
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_metrics_addr() -> String {
    "0.0.0.0:9090".to_string()
}
fn default_true() -> bool {
    true
}
fn default_ttl() -> u64 {
    60
}
fn default_sweep_interval() -> u64 {
    30
}
fn default_shared_addr() -> String {
    "127.0.0.1:6379".to_string()
}
fn default_timeout_ms() -> u64 {
    500
}
fn default_pool_size() -> usize {
    etag_store::shared::DEFAULT_POOL_SIZE
}
fn default_resp_addr() -> String {
    "0.0.0.0:6380".to_string()
}
fn default_client_side_duration() -> u64 {
    60
}
fn default_server_side_duration() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.server.metrics_addr, "0.0.0.0:9090");
        assert!(config.local.enabled);
        assert_eq!(config.local.default_ttl(), Duration::from_secs(60));
        assert_eq!(config.local.sweep_interval(), Duration::from_secs(30));
        assert!(!config.shared.enabled);
        assert_eq!(config.shared.addr, "127.0.0.1:6379");
        assert_eq!(config.shared.timeout(), Duration::from_millis(500));
        assert_eq!(config.shared.pool_size, 8);
        assert!(!config.resp.enabled);
        assert_eq!(config.resp.listen_addr, "0.0.0.0:6380");
        assert_eq!(config.policy.client_side_duration, 60);
        assert_eq!(config.policy.server_side_duration, 30);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [shared]
            enabled = true
            addr = "cache.internal:6379"
            timeout_ms = 0

            [local]
            sweep_interval_seconds = 0

            [policy]
            server_side_duration = 5
            "#,
        )
        .unwrap();

        assert!(config.shared.enabled);
        assert_eq!(config.shared.addr, "cache.internal:6379");
        assert_eq!(config.shared.timeout(), Duration::from_millis(1));
        assert_eq!(config.local.sweep_interval(), Duration::from_secs(1));
        assert_eq!(config.policy.client_side_duration, 60);

        let policy = config.policy.apply(CachePolicy::local());
        assert_eq!(policy.server_ttl(), Duration::from_secs(5));
    }

    #[test]
    fn load_reports_missing_and_malformed_files() {
        assert!(Config::load(Path::new("/nonexistent/config.toml")).is_err());

        let path = std::env::temp_dir().join(format!("etag-layer-config-{}.toml", std::process::id()));
        std::fs::write(&path, "[server\nlisten_addr = 1").unwrap();
        assert!(Config::load(&path).is_err());
        std::fs::remove_file(&path).unwrap();
    }
}
