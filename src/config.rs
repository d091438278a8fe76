//! Forwarder configuration
//!
//! Settings come from three layers, later ones winning: built-in defaults,
//! an optional TOML file, and command line flags.
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyACM0"
//! device = "microbit"
//! # baud_rate = 115200  (defaults to the device profile's rate)
//!
//! [broker]
//! host = "broker.example.com"
//! port = 1883
//! topic = "lab/3pm25b/microbit/luz"
//! ```

use crate::devices::get_profile;
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Topic the light readings have always been published on
pub const DEFAULT_TOPIC: &str = "lab/3pm25b/microbit/luz";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub serial: SerialConfig,
    pub broker: BrokerConfig,
}

/// Serial side
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Port path; auto-detected from `device` when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    /// Device profile used for auto-detection and the default baud rate
    pub device: String,
    /// Overrides the device profile's baud rate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baud_rate: Option<u32>,
    /// Read timeout; an expired read counts as an empty read
    pub timeout_ms: u64,
    /// Pause after opening the port while the board resets
    pub settle_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            device: "microbit".to_string(),
            baud_rate: None,
            timeout_ms: 1000,
            settle_ms: 2000,
        }
    }
}

/// Broker side
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    /// Every reading goes to this topic
    pub topic: String,
    pub keep_alive_secs: u64,
    pub connect_timeout_secs: u64,
    pub publish_timeout_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "microbit_reader".to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            keep_alive_secs: 30,
            connect_timeout_secs: 60,
            publish_timeout_secs: 10,
        }
    }
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub port: Option<String>,
    pub device: Option<String>,
    pub baud_rate: Option<u32>,
    pub broker_host: Option<String>,
    pub broker_port: Option<u16>,
    pub client_id: Option<String>,
    pub topic: Option<String>,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse_content(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse TOML content; missing keys keep their defaults
    pub fn parse_content(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse TOML")?;
        Ok(config)
    }

    /// Defaults, then the file (if any), then command line overrides
    pub fn resolve(path: Option<&Path>, overrides: ConfigOverrides) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load(p)?,
            None => Self::default(),
        };
        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    /// Apply command line overrides
    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(port) = overrides.port {
            self.serial.port = Some(port);
        }
        if let Some(device) = overrides.device {
            self.serial.device = device;
        }
        if let Some(baud) = overrides.baud_rate {
            self.serial.baud_rate = Some(baud);
        }
        if let Some(host) = overrides.broker_host {
            self.broker.host = host;
        }
        if let Some(port) = overrides.broker_port {
            self.broker.port = port;
        }
        if let Some(id) = overrides.client_id {
            self.broker.client_id = id;
        }
        if let Some(topic) = overrides.topic {
            self.broker.topic = topic;
        }
    }

    /// Reject settings the forwarder cannot run with
    pub fn validate(&self) -> Result<()> {
        if let Some(ref port) = self.serial.port {
            if port.trim().is_empty() {
                bail!("serial.port must not be empty");
            }
        }
        if self.serial.baud_rate == Some(0) {
            bail!("serial.baud_rate must be greater than zero");
        }
        if self.serial.timeout_ms == 0 {
            bail!("serial.timeout_ms must be greater than zero");
        }
        if self.broker.host.trim().is_empty() {
            bail!("broker.host must not be empty");
        }
        if self.broker.port == 0 {
            bail!("broker.port must not be zero");
        }
        if self.broker.client_id.is_empty() {
            bail!("broker.client_id must not be empty");
        }
        if self.broker.topic.is_empty() {
            bail!("broker.topic must not be empty");
        }
        if self.broker.topic.contains(|c: char| c == '+' || c == '#') {
            bail!(
                "broker.topic '{}' contains a wildcard; publish topics must be literal",
                self.broker.topic
            );
        }
        if self.broker.keep_alive_secs < 5 {
            bail!("broker.keep_alive_secs must be at least 5");
        }
        if self.broker.connect_timeout_secs == 0 || self.broker.publish_timeout_secs == 0 {
            bail!("broker timeouts must be greater than zero");
        }
        Ok(())
    }

    /// Baud rate to open the port with
    ///
    /// An explicit `serial.baud_rate` wins; otherwise the device profile's
    /// rate is used.
    pub fn baud_rate(&self) -> Result<u32> {
        if let Some(baud) = self.serial.baud_rate {
            return Ok(baud);
        }
        get_profile(&self.serial.device)
            .map(|profile| profile.baud_rate)
            .ok_or_else(|| anyhow!("Unknown device profile: {}", self.serial.device))
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_reference_setup() {
        let config = Config::default();
        assert_eq!(config.baud_rate().unwrap(), 115200);
        assert_eq!(config.serial.timeout_ms, 1000);
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.broker.topic, "lab/3pm25b/microbit/luz");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_config() {
        let content = r#"
[serial]
port = "/dev/ttyUSB3"

[broker]
host = "10.0.0.5"
topic = "lab/light"
"#;
        let config = Config::parse_content(content).unwrap();

        assert_eq!(config.serial.port.as_deref(), Some("/dev/ttyUSB3"));
        assert_eq!(config.serial.baud_rate, None);
        assert_eq!(config.broker.host, "10.0.0.5");
        assert_eq!(config.broker.topic, "lab/light");
        assert_eq!(config.broker.port, 1883);
    }

    #[test]
    fn test_parse_rejects_bad_types() {
        assert!(Config::parse_content("[serial]\nbaud_rate = \"fast\"\n").is_err());
    }

    #[test]
    fn test_overrides_win_over_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[broker]\nhost = \"file-host\"\nport = 1884").unwrap();

        let overrides = ConfigOverrides {
            broker_host: Some("cli-host".to_string()),
            baud_rate: Some(9600),
            ..Default::default()
        };
        let config = Config::resolve(Some(file.path()), overrides).unwrap();

        assert_eq!(config.broker.host, "cli-host");
        assert_eq!(config.broker.port, 1884);
        assert_eq!(config.serial.baud_rate, Some(9600));
        assert_eq!(config.baud_rate().unwrap(), 9600);
    }

    #[test]
    fn test_baud_rate_follows_device_profile() {
        let mut config = Config::default();
        config.serial.device = "micro:bit".to_string();
        assert_eq!(
            config.baud_rate().unwrap(),
            crate::devices::MICROBIT_PROFILE.baud_rate
        );

        config.serial.baud_rate = Some(57600);
        assert_eq!(config.baud_rate().unwrap(), 57600);
    }

    #[test]
    fn test_unknown_device_without_baud_rate_is_error() {
        let mut config = Config::default();
        config.serial.device = "rpi4".to_string();
        let err = config.baud_rate().unwrap_err();
        assert!(err.to_string().contains("Unknown device profile: rpi4"));

        config.serial.baud_rate = Some(9600);
        assert_eq!(config.baud_rate().unwrap(), 9600);
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(Config::resolve(Some(&missing), ConfigOverrides::default()).is_err());
    }

    #[test]
    fn test_validate_rejects_wildcard_topic() {
        let mut config = Config::default();
        config.broker.topic = "lab/+/luz".to_string();
        assert!(config.validate().is_err());

        config.broker.topic = "lab/#".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = Config::default();
        config.serial.baud_rate = Some(0);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.broker.host = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_output_parses_back() {
        let mut config = Config::default();
        config.serial.port = Some("/dev/ttyACM1".to_string());

        let text = config.to_toml().unwrap();
        assert!(text.contains("[broker]"));
        assert_eq!(Config::parse_content(&text).unwrap(), config);
    }
}
