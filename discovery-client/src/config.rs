use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use serde::Deserialize;
use anyhow::{bail, Context, Result};
use shared::protocol::DEFAULT_PORT;
use shared::types::{Address, RobotSeed};
use crate::client::DiscoveryClientConfig;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/discovery-client/discovery.toml";

/// Config file named on the command line, or [`DEFAULT_CONFIG_PATH`]
pub fn config_path(arg: Option<String>) -> String {
    arg.unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    /// Ports a robot may advertise its API on
    #[serde(default = "default_ports")]
    pub ports: Vec<u16>,
    #[serde(default = "default_health_poll_interval")]
    pub health_poll_interval_ms: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub manual_addresses: Vec<Address>,
    #[serde(default)]
    pub initial_robots: Vec<RobotSeed>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_ports() -> Vec<u16> {
    vec![DEFAULT_PORT]
}

fn default_health_poll_interval() -> u64 {
    15_000
}

fn default_request_timeout() -> u64 {
    10_000
}

fn default_listen() -> String {
    "127.0.0.1:31951".to_string()
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            ports: default_ports(),
            health_poll_interval_ms: default_health_poll_interval(),
            request_timeout_ms: default_request_timeout(),
            manual_addresses: Vec::new(),
            initial_robots: Vec::new(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl DiscoveryConfig {
    pub fn health_poll_interval(&self) -> Duration {
        Duration::from_millis(self.health_poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Start options for the discovery client
    pub fn client_config(&self) -> DiscoveryClientConfig {
        DiscoveryClientConfig {
            health_poll_interval: Some(self.health_poll_interval()),
            initial_robots: (!self.initial_robots.is_empty()).then(|| self.initial_robots.clone()),
            manual_addresses: Some(self.manual_addresses.clone()),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("Invalid TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let discovery = &self.discovery;

        if discovery.ports.is_empty() {
            bail!("discovery.ports must list at least one port");
        }
        if discovery.ports.contains(&0) {
            bail!("discovery.ports contains invalid port 0");
        }
        if discovery.request_timeout_ms == 0 {
            bail!("discovery.request_timeout_ms must be greater than zero");
        }

        discovery.client_config().validate()?;

        self.api
            .listen
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid api.listen address: {}", self.api.listen))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_toml("").unwrap();

        assert_eq!(config.discovery.ports, vec![DEFAULT_PORT]);
        assert_eq!(config.discovery.health_poll_interval(), Duration::from_secs(15));
        assert_eq!(config.discovery.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.api.listen, "127.0.0.1:31951");

        let client = config.discovery.client_config();
        assert_eq!(client.initial_robots, None);
        assert_eq!(client.manual_addresses, Some(Vec::new()));
    }

    #[test]
    fn test_full_config() {
        let config = Config::from_toml(
            r#"
            [discovery]
            ports = [31950, 31951]
            health_poll_interval_ms = 3000
            manual_addresses = [
                { ip = "192.168.1.42", port = 31950 },
            ]

            [[discovery.initial_robots]]
            name = "opentrons-dev"
            addresses = [{ ip = "169.254.1.2", port = 31950 }]

            [api]
            listen = "0.0.0.0:8080"
            "#,
        )
        .unwrap();

        let client = config.discovery.client_config();
        assert_eq!(client.health_poll_interval, Some(Duration::from_secs(3)));
        assert_eq!(
            client.manual_addresses,
            Some(vec![Address::new("192.168.1.42", 31950)])
        );

        let robots = client.initial_robots.unwrap();
        assert_eq!(robots[0].name, "opentrons-dev");
        assert_eq!(robots[0].addresses, vec![Address::new("169.254.1.2", 31950)]);
        assert_eq!(robots[0].health, None);
    }

    #[test]
    fn test_config_path() {
        assert_eq!(config_path(None), "/etc/discovery-client/discovery.toml");
        assert_eq!(config_path(Some("./dev.toml".to_string())), "./dev.toml");
    }

    #[test]
    fn test_load_reads_file() {
        let path = std::env::temp_dir().join(format!("discovery-client-{}.toml", std::process::id()));
        std::fs::write(&path, "[discovery]\nhealth_poll_interval_ms = 2000\n").unwrap();

        let config = Config::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.discovery.health_poll_interval(), Duration::from_secs(2));
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(Config::from_toml("[discovery]\nports = []").is_err());
        assert!(Config::from_toml("[discovery]\nhealth_poll_interval_ms = 0").is_err());
        assert!(Config::from_toml("[discovery]\nrequest_timeout_ms = 0").is_err());
        assert!(Config::from_toml(
            "[discovery]\nmanual_addresses = [{ ip = \"10.0.0.1\", port = 0 }]"
        )
        .is_err());
        assert!(Config::from_toml("[api]\nlisten = \"nowhere\"").is_err());
    }
}
