use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::Deserialize;
use anyhow::{bail, Context, Result};

/// Environment variable overriding the port of `api.listen`
pub const PORT_ENV: &str = "PORT";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub poller: PollerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollerConfig {
    /// Time between the starts of two poll cycles
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Upper bound for one probe, connect to last byte of headers
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("poller.db")
}

fn default_interval() -> u64 {
    60
}

fn default_timeout() -> u64 {
    10
}

fn default_connect_timeout() -> u64 {
    5
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            timeout_secs: default_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.poller.interval_secs == 0 {
            bail!("poller.interval_secs must be greater than zero");
        }
        if self.poller.timeout_secs == 0 {
            bail!("poller.timeout_secs must be greater than zero");
        }
        if self.poller.connect_timeout_secs == 0 {
            bail!("poller.connect_timeout_secs must be greater than zero");
        }
        Ok(())
    }

    /// Replace the port of `api.listen` with `port`, keeping the host
    pub fn override_port(&mut self, port: &str) -> Result<()> {
        let port: u16 = port
            .trim()
            .parse()
            .with_context(|| format!("Invalid {} value: {}", PORT_ENV, port))?;

        let mut addr: SocketAddr = self
            .api
            .listen
            .parse()
            .with_context(|| format!("Invalid api.listen address: {}", self.api.listen))?;
        addr.set_port(port);
        self.api.listen = addr.to_string();
        Ok(())
    }

    /// Apply `PORT` from the environment, if set
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(port) = std::env::var(PORT_ENV) {
            self.override_port(&port)?;
            tracing::info!("Custom port requested through {}: {}", PORT_ENV, port);
        }
        Ok(())
    }
}
