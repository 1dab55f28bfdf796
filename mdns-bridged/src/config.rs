use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::Deserialize;
use thiserror::Error;
use shared::protocol::DEFAULT_SERVICE_TYPE;
use crate::registry::names;

/// Everything that can be wrong with a configuration file.
/// Any of these stops the bridge from starting.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Syntax errors and unrecognized keys
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("domain '{0}' is not a valid DNS name")]
    InvalidDomain(String),

    #[error("types needs at least one service type")]
    NoServiceTypes,

    #[error("service type '{0}' must look like _name._tcp or _name._udp")]
    InvalidServiceType(String),

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("{field} '{value}' is not a socket address")]
    InvalidListen { field: &'static str, value: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub dns: DnsConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    pub domain: String,
    #[serde(default = "default_types")]
    pub types: Vec<String>,
    #[serde(default = "default_min_srv_records")]
    pub min_srv_records: usize,
    /// Empty matches everything
    #[serde(default)]
    pub filter_text: String,
    /// Interface name or address; empty browses on every interface
    #[serde(default)]
    pub bind_address: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefreshConfig {
    /// Pause between browse passes. Keep it under the smallest TTL a
    /// downstream cache will honour, since each pass adds its own latency.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_browse_timeout")]
    pub browse_timeout_secs: u64,
    #[serde(default = "default_record_ttl")]
    pub record_ttl_secs: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DnsConfig {
    #[serde(default = "default_dns_listen")]
    pub listen: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    #[serde(default = "default_api_listen")]
    pub listen: String,
}

fn default_types() -> Vec<String> {
    vec![DEFAULT_SERVICE_TYPE.to_string()]
}

fn default_min_srv_records() -> usize {
    3
}

fn default_interval() -> u64 {
    5
}

fn default_browse_timeout() -> u64 {
    2
}

fn default_record_ttl() -> u32 {
    60
}

fn default_dns_listen() -> String {
    "127.0.0.1:1053".to_string()
}

fn default_api_listen() -> String {
    "127.0.0.1:8053".to_string()
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            browse_timeout_secs: default_browse_timeout(),
            record_ttl_secs: default_record_ttl(),
        }
    }
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            listen: default_dns_listen(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_api_listen(),
        }
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn browse_timeout(&self) -> Duration {
        Duration::from_secs(self.browse_timeout_secs)
    }
}

impl Config {
    /// Load and validate configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    /// Parse, validate and normalize configuration text
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&mut self) -> Result<(), ConfigError> {
        let bridge = &mut self.bridge;
        bridge.domain = names::normalize(&bridge.domain)
            .ok_or_else(|| ConfigError::InvalidDomain(bridge.domain.clone()))?;

        if bridge.types.is_empty() {
            return Err(ConfigError::NoServiceTypes);
        }
        for service_type in bridge.types.iter_mut() {
            *service_type = normalize_service_type(service_type)
                .ok_or_else(|| ConfigError::InvalidServiceType(service_type.clone()))?;
        }
        bridge.bind_address = bridge.bind_address.trim().to_string();

        if self.refresh.interval_secs == 0 {
            return Err(ConfigError::ZeroDuration("refresh.interval_secs"));
        }
        if self.refresh.browse_timeout_secs == 0 {
            return Err(ConfigError::ZeroDuration("refresh.browse_timeout_secs"));
        }

        check_listen("dns.listen", &self.dns.listen)?;
        check_listen("api.listen", &self.api.listen)?;
        Ok(())
    }
}

/// "_Workstation._TCP.local." -> "_workstation._tcp"
fn normalize_service_type(raw: &str) -> Option<String> {
    let name = names::normalize(raw)?;
    let name = name
        .strip_suffix(shared::protocol::MDNS_DOMAIN)
        .and_then(|rest| rest.strip_suffix('.'))
        .map(str::to_string)
        .unwrap_or(name);
    let (service, proto) = name.split_once('.')?;
    let valid = service.len() > 1
        && service.starts_with('_')
        && (proto == "_tcp" || proto == "_udp");
    valid.then_some(name)
}

fn check_listen(field: &'static str, value: &str) -> Result<(), ConfigError> {
    value
        .parse::<SocketAddr>()
        .map(|_| ())
        .map_err(|_| ConfigError::InvalidListen {
            field,
            value: value.to_string(),
        })
}
