use eap_aka_proto::AkaMethod;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::vector::AuthVector;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Statically provisioned subscriber (lab and test use)
///
/// All binary fields are hex encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscriber {
    pub imsi: String,
    pub rand: String,
    pub autn: String,
    pub xres: String,
    pub ck: String,
    pub ik: String,
    #[serde(default)]
    pub msisdn: Option<String>,
}

/// Session timer durations, in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Wait for the Challenge response (default: 20 s)
    #[serde(default = "default_challenge_timeout_ms")]
    pub challenge_ms: u64,
    /// Wait for protocol closure after a failure Notification (default: 10 s)
    #[serde(default = "default_error_notification_timeout_ms")]
    pub error_notification_ms: u64,
    /// Unauthenticated session lifetime (default: 12 h)
    #[serde(default = "default_session_timeout_ms")]
    pub session_ms: u64,
    /// Hold time after success for retransmitted Challenge responses (default: 5 s)
    #[serde(default = "default_session_authenticated_timeout_ms")]
    pub session_authenticated_ms: u64,
}

fn default_challenge_timeout_ms() -> u64 {
    20_000
}

fn default_error_notification_timeout_ms() -> u64 {
    10_000
}

fn default_session_timeout_ms() -> u64 {
    12 * 60 * 60 * 1000
}

fn default_session_authenticated_timeout_ms() -> u64 {
    5_000
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        TimeoutConfig {
            challenge_ms: default_challenge_timeout_ms(),
            error_notification_ms: default_error_notification_timeout_ms(),
            session_ms: default_session_timeout_ms(),
            session_authenticated_ms: default_session_authenticated_timeout_ms(),
        }
    }
}

impl TimeoutConfig {
    pub fn challenge(&self) -> Duration {
        Duration::from_millis(self.challenge_ms)
    }

    pub fn error_notification(&self) -> Duration {
        Duration::from_millis(self.error_notification_ms)
    }

    pub fn session(&self) -> Duration {
        Duration::from_millis(self.session_ms)
    }

    pub fn session_authenticated(&self) -> Duration {
        Duration::from_millis(self.session_authenticated_ms)
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server listen address
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Server listen port
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Accepted PLMN IDs (MCC + MNC, 5 or 6 digits); empty accepts all
    #[serde(default)]
    pub plmn_ids: Vec<String>,

    /// Enabled EAP methods in preference order (23 = AKA, 50 = AKA')
    #[serde(default = "default_methods")]
    pub methods: Vec<u8>,

    /// Access network name bound into AKA' keys (AT_KDF_INPUT)
    #[serde(default = "default_access_network_name")]
    pub access_network_name: String,

    /// Session timer durations
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Log level: "trace", "debug", "info", "warn", "error" (default: "info")
    #[serde(default)]
    pub log_level: Option<String>,

    /// Audit log file path (JSON format, optional)
    #[serde(default)]
    pub audit_log_path: Option<String>,

    /// Statically provisioned subscribers
    #[serde(default)]
    pub subscribers: Vec<Subscriber>,
}

fn default_listen_address() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    9109
}

fn default_methods() -> Vec<u8> {
    vec![AkaMethod::Aka.as_u8()]
}

fn default_access_network_name() -> String {
    "WLAN".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_address: default_listen_address(),
            listen_port: default_listen_port(),
            plmn_ids: vec![],
            methods: default_methods(),
            access_network_name: default_access_network_name(),
            timeouts: TimeoutConfig::default(),
            log_level: None,
            audit_log_path: None,
            subscribers: vec![],
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Get socket address for binding
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr: IpAddr = self.listen_address.parse().map_err(|_| {
            ConfigError::Invalid(format!("Invalid IP address: {}", self.listen_address))
        })?;
        Ok(SocketAddr::new(addr, self.listen_port))
    }

    /// Enabled methods in preference order
    ///
    /// Unknown numbers are skipped; [`Config::validate`] rejects them.
    pub fn enabled_methods(&self) -> Vec<AkaMethod> {
        self.methods
            .iter()
            .filter_map(|m| AkaMethod::from_u8(*m))
            .collect()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;

        if self.listen_port == 0 {
            return Err(ConfigError::Invalid("Port cannot be 0".to_string()));
        }

        for plmn in &self.plmn_ids {
            let digits = plmn.chars().all(|c| c.is_ascii_digit());
            if !digits || !(5..=6).contains(&plmn.len()) {
                return Err(ConfigError::Invalid(format!(
                    "PLMN ID must be 5 or 6 digits: {}",
                    plmn
                )));
            }
        }

        if self.methods.is_empty() {
            return Err(ConfigError::Invalid(
                "At least one EAP method must be enabled".to_string(),
            ));
        }
        for method in &self.methods {
            if AkaMethod::from_u8(*method).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "Unsupported EAP method: {}",
                    method
                )));
            }
        }

        // AT_KDF_INPUT must fit in a single attribute
        if self.access_network_name.is_empty() || self.access_network_name.len() > 1000 {
            return Err(ConfigError::Invalid(format!(
                "Access network name must be 1-1000 bytes, got {}",
                self.access_network_name.len()
            )));
        }

        let timeouts = &self.timeouts;
        if timeouts.challenge_ms == 0
            || timeouts.error_notification_ms == 0
            || timeouts.session_ms == 0
            || timeouts.session_authenticated_ms == 0
        {
            return Err(ConfigError::Invalid(
                "Timeouts must be greater than 0".to_string(),
            ));
        }

        for subscriber in &self.subscribers {
            AuthVector::try_from(subscriber)?;
        }

        Ok(())
    }

    /// Create an example configuration file
    pub fn example() -> Self {
        Config {
            listen_address: "0.0.0.0".to_string(),
            listen_port: 9109,
            plmn_ids: vec!["00101".to_string(), "001011".to_string()],
            methods: vec![AkaMethod::Aka.as_u8(), AkaMethod::AkaPrime.as_u8()],
            access_network_name: "WLAN".to_string(),
            timeouts: TimeoutConfig::default(),
            log_level: Some("info".to_string()),
            audit_log_path: Some("/var/log/eap-aka/audit.log".to_string()),
            subscribers: vec![Subscriber {
                imsi: "001010000000001".to_string(),
                rand: "00112233445566778899aabbccddeeff".to_string(),
                autn: "5f67b3e5b2f280008d0e04bd4af96ba5".to_string(),
                xres: "2d8e4c3a1a10c1e1".to_string(),
                ck: "b40ba9a3c58b2a05bbf0d987b21bf8cb".to_string(),
                ik: "f769bcd751044604127672711c6d3441".to_string(),
                msisdn: Some("15551230001".to_string()),
            }],
        }
    }
}
