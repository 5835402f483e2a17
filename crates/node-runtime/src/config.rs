//! # Node Configuration
//!
//! One TOML file, every field optional:
//!
//! ```toml
//! [node]
//! name = "hallway-sensor"
//! role = "client"              # or "master"
//!
//! [network]
//! listen_addr = "0.0.0.0:13131"
//! master_addr = "192.168.1.10:13131"
//! connect_info = "<bootstrap text printed by `node-runtime invite`>"
//!
//! [timeouts]
//! handshake_secs = 15
//!
//! [storage]
//! data_dir = "./data"
//! ```
//!
//! Environment variables override the file: `SH_ROLE`, `SH_LISTEN_ADDR`,
//! `SH_MASTER_ADDR`, `SH_DATA_DIR`.

use serde::{Deserialize, Serialize};
use sh_01_bootstrap::{BootstrapError, ConnectInformation, RegistrationToken};
use sh_03_transport::{TransportConfig, DEFAULT_MAX_FRAME_SIZE, DEFAULT_PORT};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("A client needs network.master_addr or network.connect_info")]
    MissingMasterAddress,

    #[error("Timeout {0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("max_frame_size must be at least {min} bytes")]
    FrameLimitTooSmall { min: usize },

    #[error("Invalid bootstrap text: {0}")]
    Bootstrap(#[from] BootstrapError),

    #[error("Cannot advertise {0}; set network.advertise_address to a reachable IPv4 address")]
    NoAdvertiseAddress(SocketAddr),
}

/// What this device is in the network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Master,
    #[default]
    Client,
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "master" => Ok(Self::Master),
            "client" => Ok(Self::Client),
            _ => Err(()),
        }
    }
}

/// Complete node configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub node: NodeSection,
    pub network: NetworkConfig,
    pub timeouts: TimeoutConfig,
    pub storage: StorageConfig,
}

/// Identity of this device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// Human-readable name, embedded in the device certificate.
    pub name: String,
    pub role: Role,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            name: "secure-home-device".to_string(),
            role: Role::Client,
        }
    }
}

/// Network configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Master listening address.
    pub listen_addr: SocketAddr,
    /// Address printed in bootstrap texts. Defaults to the listen address.
    pub advertise_address: Option<Ipv4Addr>,
    /// Client: where the master is.
    pub master_addr: Option<SocketAddr>,
    /// Client: bootstrap text received out of band.
    pub connect_info: Option<String>,
    /// Client: base64 passive registration token received out of band.
    pub passive_token: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            advertise_address: None,
            master_addr: None,
            connect_info: None,
            passive_token: None,
        }
    }
}

/// Connection timing, in seconds unless noted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub connect_secs: u64,
    pub handshake_secs: u64,
    pub reader_idle_secs: u64,
    pub writer_idle_secs: u64,
    pub all_idle_secs: u64,
    /// Bytes.
    pub max_frame_size: usize,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 10,
            handshake_secs: 15,
            reader_idle_secs: 60,
            writer_idle_secs: 20,
            all_idle_secs: 120,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Keys, trust state and the device registry live here.
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
        }
    }
}

impl NodeConfig {
    /// Read `path` (defaults when `None`), then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// Parse a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Parse TOML text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `SH_*` overrides looked up through `lookup`.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup("SH_ROLE") {
            self.node.role = value.parse().map_err(|()| ConfigError::InvalidEnv {
                var: "SH_ROLE",
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup("SH_LISTEN_ADDR") {
            self.network.listen_addr = value.parse().map_err(|_| ConfigError::InvalidEnv {
                var: "SH_LISTEN_ADDR",
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup("SH_MASTER_ADDR") {
            let addr = value.parse().map_err(|_| ConfigError::InvalidEnv {
                var: "SH_MASTER_ADDR",
                value: value.clone(),
            })?;
            self.network.master_addr = Some(addr);
        }
        if let Some(value) = lookup("SH_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(value);
        }
        Ok(())
    }

    /// Reject settings the node cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.timeouts;
        for (name, secs) in [
            ("connect_secs", t.connect_secs),
            ("handshake_secs", t.handshake_secs),
            ("reader_idle_secs", t.reader_idle_secs),
            ("writer_idle_secs", t.writer_idle_secs),
            ("all_idle_secs", t.all_idle_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::ZeroTimeout(name));
            }
        }
        if t.max_frame_size < MIN_FRAME_SIZE {
            return Err(ConfigError::FrameLimitTooSmall {
                min: MIN_FRAME_SIZE,
            });
        }

        if self.node.role == Role::Client {
            match &self.network.connect_info {
                Some(text) => {
                    ConnectInformation::decode(text)?;
                }
                None if self.network.master_addr.is_none() => {
                    return Err(ConfigError::MissingMasterAddress)
                }
                None => {}
            }
            if let Some(token) = &self.network.passive_token {
                RegistrationToken::from_base64(token)?;
            }
        }
        Ok(())
    }

    /// Decoded bootstrap text, if configured.
    pub fn connect_information(&self) -> Result<Option<ConnectInformation>, ConfigError> {
        self.network
            .connect_info
            .as_deref()
            .map(ConnectInformation::decode)
            .transpose()
            .map_err(Into::into)
    }

    /// Decoded passive token, if configured.
    pub fn passive_token(&self) -> Result<Option<RegistrationToken>, ConfigError> {
        self.network
            .passive_token
            .as_deref()
            .map(RegistrationToken::from_base64)
            .transpose()
            .map_err(Into::into)
    }

    /// Address written into bootstrap texts.
    pub fn advertised_address(&self) -> Result<Ipv4Addr, ConfigError> {
        if let Some(addr) = self.network.advertise_address {
            return Ok(addr);
        }
        match self.network.listen_addr {
            SocketAddr::V4(v4) if !v4.ip().is_unspecified() => Ok(*v4.ip()),
            other => Err(ConfigError::NoAdvertiseAddress(other)),
        }
    }

    /// Connection timing for the transport.
    #[must_use]
    pub fn transport(&self) -> TransportConfig {
        let t = &self.timeouts;
        TransportConfig {
            connect_timeout: Duration::from_secs(t.connect_secs),
            handshake_timeout: Duration::from_secs(t.handshake_secs),
            reader_idle: Duration::from_secs(t.reader_idle_secs),
            writer_idle: Duration::from_secs(t.writer_idle_secs),
            all_idle: Duration::from_secs(t.all_idle_secs),
            max_frame_size: t.max_frame_size,
            ..TransportConfig::default()
        }
    }
}

/// Smallest accepted frame limit. A Hello with its certificate must fit.
const MIN_FRAME_SIZE: usize = 1024;
