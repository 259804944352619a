//! Configuration for the telemetry emitter.

use otsim_common::{Format, LoggingConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read or is not valid JSON5 for this schema.
    #[error(transparent)]
    Load(#[from] otsim_common::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete emitter configuration.
///
/// Built once at startup and shared read-only with every generation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmitterConfig {
    /// MQTT broker settings
    pub mqtt: MqttConfig,

    /// Modbus TCP server settings
    pub modbus: ModbusConfig,

    /// CoAP server settings
    pub coap: CoapConfig,

    /// HTTP control surface settings
    pub web: WebConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// MQTT broker endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker host (IP or hostname)
    pub address: String,

    /// Broker port
    pub port: u16,

    /// Client identifier presented to the broker
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Payload serialization format
    #[serde(default)]
    pub format: Format,

    /// Time allowed for the broker to acknowledge the connection
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_client_id() -> String {
    "otsim-emitter".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

impl MqttConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Modbus TCP server endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusConfig {
    /// Server host (IP or hostname)
    pub address: String,

    /// TCP port (usually 502)
    pub port: u16,

    /// Modbus unit/slave ID (1-247)
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,

    /// Connect and write timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_unit_id() -> u8 {
    1
}

fn default_timeout_ms() -> u64 {
    1000
}

impl ModbusConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// CoAP server endpoint and observation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoapConfig {
    /// Server host (IP or hostname)
    pub address: String,

    /// UDP port (usually 5683)
    pub port: u16,

    /// Resource path to observe
    #[serde(default = "default_observe_path")]
    pub observe_path: String,

    /// Stop observing after this many notifications
    #[serde(default = "default_max_notifications")]
    pub max_notifications: usize,

    /// Upper bound on the observation wait in milliseconds
    #[serde(default = "default_observe_timeout_ms")]
    pub observe_timeout_ms: u64,
}

fn default_observe_path() -> String {
    "/some/path".to_string()
}

fn default_max_notifications() -> usize {
    10
}

fn default_observe_timeout_ms() -> u64 {
    1000
}

impl CoapConfig {
    pub fn observe_timeout(&self) -> Duration {
        Duration::from_millis(self.observe_timeout_ms)
    }
}

/// HTTP control surface listen address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    pub address: String,
    pub port: u16,
}

impl EmitterConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: EmitterConfig = otsim_common::load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: EmitterConfig = otsim_common::parse_config(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let endpoints = [
            ("mqtt", &self.mqtt.address, self.mqtt.port),
            ("modbus", &self.modbus.address, self.modbus.port),
            ("coap", &self.coap.address, self.coap.port),
            ("web", &self.web.address, self.web.port),
        ];

        for (section, address, port) in endpoints {
            if address.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "{}: address cannot be empty",
                    section
                )));
            }
            if port == 0 {
                return Err(ConfigError::Validation(format!(
                    "{}: port must be non-zero",
                    section
                )));
            }
        }

        if self.mqtt.client_id.is_empty() {
            return Err(ConfigError::Validation(
                "mqtt: client_id cannot be empty".to_string(),
            ));
        }

        if self.mqtt.connect_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "mqtt: connect_timeout_ms must be non-zero".to_string(),
            ));
        }

        if self.modbus.unit_id == 0 {
            return Err(ConfigError::Validation(
                "modbus: unit_id must be 1-247".to_string(),
            ));
        }

        if self.modbus.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "modbus: timeout_ms must be non-zero".to_string(),
            ));
        }

        if !self.coap.observe_path.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "coap: observe_path '{}' must start with '/'",
                self.coap.observe_path
            )));
        }

        if self.coap.max_notifications == 0 {
            return Err(ConfigError::Validation(
                "coap: max_notifications must be at least 1".to_string(),
            ));
        }

        if self.coap.observe_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "coap: observe_timeout_ms must be non-zero".to_string(),
            ));
        }

        Ok(())
    }
}
