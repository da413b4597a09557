use std::{
    default::Default,
    net::{IpAddr, SocketAddr},
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    constants::{DEFAULT_MULTICAST_TTL, MAX_DATAGRAM_SIZE, MAX_SEND_SIZE},
    error::ConfigError,
};

#[derive(Clone, Debug)]
/// Configuration options to tune the UDP transport.
pub struct Config {
    /// Size of the reusable receive buffer in bytes.
    pub receive_buffer_size: usize,
    /// Largest datagram `send_to` accepts.
    pub max_send_size: usize,
    /// Read timeout the reactor blocks on between shutdown checks.
    pub socket_polling_timeout: Duration,
    /// Set SO_REUSEADDR before binding.
    pub reuse_address: bool,
    /// Socket receive buffer size in bytes (None = use system default).
    /// Corresponds to SO_RCVBUF socket option.
    pub socket_recv_buffer_size: Option<usize>,
    /// Socket send buffer size in bytes (None = use system default).
    /// Corresponds to SO_SNDBUF socket option.
    pub socket_send_buffer_size: Option<usize>,
    /// Time-to-live for outgoing unicast packets (None = use system default).
    /// Corresponds to IP_TTL socket option.
    pub socket_ttl: Option<u32>,
    /// Enable broadcast mode (default: false).
    /// Corresponds to SO_BROADCAST socket option.
    pub socket_broadcast: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            receive_buffer_size: MAX_DATAGRAM_SIZE,
            max_send_size: MAX_SEND_SIZE,
            socket_polling_timeout: Duration::from_millis(1),
            reuse_address: true,
            socket_recv_buffer_size: None, // Use system default
            socket_send_buffer_size: None, // Use system default
            socket_ttl: None,              // Use system default
            socket_broadcast: false,
        }
    }
}

/// How the schema compiler advances its byte cursor between packet definitions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffsetMode {
    /// Every packet layout starts at offset zero.
    #[default]
    PerPacket,
    /// One cursor runs across the whole schema document, so a packet's offsets
    /// continue from the byte length of the packets declared before it.
    Continuous,
}

/// Settings of one proxy session, usually read from `mm_config.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Host (IP literal or name) the proxy listens on. May be a multicast group.
    pub local_host: String,
    /// UDP port the proxy listens on.
    pub local_port: u16,
    /// Host datagrams are forwarded to.
    pub remote_host: String,
    /// Port datagrams are forwarded to.
    pub remote_port: u16,
    /// Multicast group to join after binding.
    #[serde(default)]
    pub multicast_group: Option<String>,
    /// Hop limit used for multicast traffic.
    #[serde(default = "default_multicast_ttl")]
    pub multicast_ttl: u32,
    /// Compare and write rule literals in big-endian wire order.
    #[serde(default = "default_network_byte_order")]
    pub network_byte_order: bool,
    /// Hex dump every datagram (and its mutated form) to the log.
    #[serde(default)]
    pub log_to_stdout: bool,
    /// Packet schema document.
    #[serde(default)]
    pub schema_file: Option<PathBuf>,
    /// Rule document; requires `schema_file`.
    #[serde(default)]
    pub rules_file: Option<PathBuf>,
    /// Cursor behaviour of the schema compiler.
    #[serde(default)]
    pub offset_mode: OffsetMode,
}

fn default_multicast_ttl() -> u32 {
    DEFAULT_MULTICAST_TTL
}

fn default_network_byte_order() -> bool {
    true
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            local_host: "0.0.0.0".to_string(),
            local_port: 3000,
            remote_host: "127.0.0.1".to_string(),
            remote_port: 3001,
            multicast_group: None,
            multicast_ttl: DEFAULT_MULTICAST_TTL,
            network_byte_order: true,
            log_to_stdout: false,
            schema_file: None,
            rules_file: None,
            offset_mode: OffsetMode::PerPacket,
        }
    }
}

impl ProxyConfig {
    /// Checks the values serde cannot check.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.local_port == 0 {
            return Err(ConfigError::Invalid("local_port must not be 0".to_string()));
        }
        if self.remote_port == 0 {
            return Err(ConfigError::Invalid("remote_port must not be 0".to_string()));
        }
        if self.local_host.trim().is_empty() {
            return Err(ConfigError::Invalid("local_host must not be empty".to_string()));
        }
        if self.remote_host.trim().is_empty() {
            return Err(ConfigError::Invalid("remote_host must not be empty".to_string()));
        }
        if let Some(group) = self.multicast_group() {
            let ip: IpAddr = group.parse().map_err(|_| {
                ConfigError::Invalid(format!("multicast_group {group:?} is not an IP address"))
            })?;
            if !ip.is_multicast() {
                return Err(ConfigError::Invalid(format!(
                    "multicast_group {group} is not a multicast address"
                )));
            }
        }
        if self.rules_file.is_some() && self.schema_file.is_none() {
            return Err(ConfigError::Invalid("rules_file requires a schema_file".to_string()));
        }
        Ok(())
    }

    /// Returns the configured multicast group, treating an empty string as unset.
    pub fn multicast_group(&self) -> Option<&str> {
        self.multicast_group.as_deref().map(str::trim).filter(|group| !group.is_empty())
    }

    /// Resolves the listen endpoint.
    pub fn local_endpoint(&self) -> Result<SocketAddr, ConfigError> {
        middleman_utilities::resolve_host(&self.local_host, self.local_port).map_err(|e| {
            ConfigError::Invalid(format!("cannot resolve local_host {}: {e}", self.local_host))
        })
    }

    /// Resolves the forwarding destination.
    pub fn remote_endpoint(&self) -> Result<SocketAddr, ConfigError> {
        middleman_utilities::resolve_host(&self.remote_host, self.remote_port).map_err(|e| {
            ConfigError::Invalid(format!("cannot resolve remote_host {}: {e}", self.remote_host))
        })
    }
}

/// Load a proxy configuration from a JSON file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed or validated.
pub fn load_config(path: impl AsRef<Path>) -> Result<ProxyConfig, ConfigError> {
    let path = path.as_ref();

    debug!("Loading configuration from {:?}", path);

    if !path.exists() {
        return Err(ConfigError::FileNotFound { path: path.display().to_string() });
    }

    let contents = std::fs::read_to_string(path)?;
    let config: ProxyConfig = serde_json::from_str(&contents).map_err(|e| {
        ConfigError::Parse(format!("Failed to parse JSON: {e} at {path:?}"))
    })?;

    config.validate()?;

    info!(
        "Configuration loaded: {}:{} -> {}:{}",
        config.local_host, config.local_port, config.remote_host, config.remote_port
    );

    Ok(config)
}

/// Load a proxy configuration from a JSON string.
///
/// # Errors
///
/// Returns `ConfigError` if parsing or validation fails.
pub fn load_config_str(json: &str) -> Result<ProxyConfig, ConfigError> {
    let config: ProxyConfig =
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;

    config.validate()?;

    Ok(config)
}
