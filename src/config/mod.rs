use chrono::FixedOffset;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/* Looked up in this order, the first existing file wins */
const CONFIG_PATHS: [&str; 2] = ["config/p1mqtt.yaml", "p1mqtt.yaml"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unable to read config file {path}: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("Unable to parse config file: {0}")]
    Parse(#[from] serde_yml::Error),
    #[error("Environment variable {name} has an invalid value {value:?}")]
    Env { name: String, value: String },
    #[error("Invalid config value for {0}")]
    Invalid(&'static str),
}

fn mqtt_host_default() -> String { "localhost".to_string() }
fn mqtt_port_default() -> u16 { 1883 }
fn mqtt_client_name_default() -> String { "p1mqtt".to_string() }
fn mqtt_energy_topic_default() -> String { "energy/p1".to_string() }
fn mqtt_raw_topic_default() -> String { "energy/p1/raw".to_string() }
fn mqtt_keep_alive_default() -> u64 { 5 }
fn mqtt_exit_on_disconnect_default() -> bool { true }

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct MqttConfig {
    #[serde(default="mqtt_host_default")]
    pub host: String,
    #[serde(default="mqtt_port_default")]
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub pass: Option<String>,
    #[serde(default="mqtt_client_name_default")]
    pub client_name: String,
    #[serde(default="mqtt_energy_topic_default")]
    pub energy_topic: String,
    #[serde(default="mqtt_raw_topic_default")]
    pub raw_topic: String,
    #[serde(default="mqtt_keep_alive_default")]
    pub keep_alive_secs: u64,
    #[serde(default="mqtt_exit_on_disconnect_default")]
    pub exit_on_disconnect: bool,
}

impl Default for MqttConfig {
    fn default() -> Self {
        MqttConfig {
            host: mqtt_host_default(),
            port: mqtt_port_default(),
            user: None,
            pass: None,
            client_name: mqtt_client_name_default(),
            energy_topic: mqtt_energy_topic_default(),
            raw_topic: mqtt_raw_topic_default(),
            keep_alive_secs: mqtt_keep_alive_default(),
            exit_on_disconnect: mqtt_exit_on_disconnect_default(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ParityConfig {
    None,
    Odd,
    Even,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum FlowControlConfig {
    None,
    Software,
    Hardware,
}

fn p1_port_default() -> String { "/dev/ttyUSB0".to_string() }
fn p1_baud_rate_default() -> u32 { 115200 }
fn p1_data_bits_default() -> u8 { 7 }
fn p1_parity_default() -> ParityConfig { ParityConfig::Even }
fn p1_stop_bits_default() -> u8 { 1 }
fn p1_flow_control_default() -> FlowControlConfig { FlowControlConfig::None }
fn p1_read_timeout_default() -> u64 { 20 }
fn p1_data_timeout_default() -> u64 { 60 }
fn p1_utc_offset_minutes_default() -> i32 { 60 }
fn p1_lossy_utf8_default() -> bool { true }

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct P1Config {
    #[serde(default="p1_port_default")]
    pub port: String,
    #[serde(default="p1_baud_rate_default")]
    pub baud_rate: u32,
    #[serde(default="p1_data_bits_default")]
    pub data_bits: u8,
    #[serde(default="p1_parity_default")]
    pub parity: ParityConfig,
    #[serde(default="p1_stop_bits_default")]
    pub stop_bits: u8,
    #[serde(default="p1_flow_control_default")]
    pub flow_control: FlowControlConfig,
    #[serde(default="p1_read_timeout_default")]
    pub read_timeout_secs: u64,     // Per line read timeout of the serial port
    #[serde(default="p1_data_timeout_default")]
    pub data_timeout_secs: u64,     // Stall detection window
    #[serde(default="p1_utc_offset_minutes_default")]
    pub utc_offset_minutes: i32,    // Zone the meter clock is read in
    #[serde(default="p1_lossy_utf8_default")]
    pub lossy_utf8: bool,
}

impl Default for P1Config {
    fn default() -> Self {
        P1Config {
            port: p1_port_default(),
            baud_rate: p1_baud_rate_default(),
            data_bits: p1_data_bits_default(),
            parity: p1_parity_default(),
            stop_bits: p1_stop_bits_default(),
            flow_control: p1_flow_control_default(),
            read_timeout_secs: p1_read_timeout_default(),
            data_timeout_secs: p1_data_timeout_default(),
            utc_offset_minutes: p1_utc_offset_minutes_default(),
            lossy_utf8: p1_lossy_utf8_default(),
        }
    }
}

impl P1Config {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn data_timeout(&self) -> Duration {
        Duration::from_secs(self.data_timeout_secs)
    }

    pub fn zone(&self) -> Result<FixedOffset, ConfigError> {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or(ConfigError::Invalid("p1.utc_offset_minutes"))
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub p1: P1Config,
}

impl Config {
    /// Reads the first config file found, falls back to the defaults when
    /// there is none and applies overrides from the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match CONFIG_PATHS.iter().find(|p| Path::new(p).exists()) {
            Some(path) => {
                info!("Loading config from {}", path);
                Self::from_file(path)?
            }
            None => {
                info!("No config file found, using defaults");
                Config::default()
            }
        };

        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_string(), source })?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_yml::from_str(contents)?)
    }

    /// Overrides single values with the environment variables the service
    /// has always been deployed with.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("MQTT_HOST") {
            self.mqtt.host = host;
        }
        if let Some(port) = lookup("MQTT_PORT") {
            self.mqtt.port = parse_env("MQTT_PORT", port)?;
        }
        if let Some(user) = lookup("MQTT_USER") {
            self.mqtt.user = Some(user);
        }
        if let Some(pass) = lookup("MQTT_PASS") {
            self.mqtt.pass = Some(pass);
        }
        if let Some(topic) = lookup("ENERGY_TOPIC") {
            self.mqtt.energy_topic = topic;
        }
        if let Some(topic) = lookup("ENERGY_RAW_TOPIC") {
            self.mqtt.raw_topic = topic;
        }
        if let Some(port) = lookup("P1_PORT") {
            self.p1.port = port;
        }
        if let Some(timeout) = lookup("P1_DATA_TIMEOUT") {
            self.p1.data_timeout_secs = parse_env("P1_DATA_TIMEOUT", timeout)?;
        }
        debug!("MQTT broker {}:{}, P1 port {}", self.mqtt.host, self.mqtt.port, self.p1.port);
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(5..=8).contains(&self.p1.data_bits) {
            return Err(ConfigError::Invalid("p1.data_bits"));
        }
        if !(1..=2).contains(&self.p1.stop_bits) {
            return Err(ConfigError::Invalid("p1.stop_bits"));
        }
        if self.p1.read_timeout_secs == 0 {
            return Err(ConfigError::Invalid("p1.read_timeout_secs"));
        }
        if self.p1.data_timeout_secs == 0 {
            return Err(ConfigError::Invalid("p1.data_timeout_secs"));
        }
        if self.mqtt.energy_topic.is_empty() {
            return Err(ConfigError::Invalid("mqtt.energy_topic"));
        }
        if self.mqtt.raw_topic.is_empty() {
            return Err(ConfigError::Invalid("mqtt.raw_topic"));
        }
        self.p1.zone()?;
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: String) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::Env { name: name.to_string(), value })
}
