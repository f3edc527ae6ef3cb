//! Smart meter P1 port reader
//!
//! Reads DSMR telegrams from the meter's serial P1 port, decodes them into
//! typed readings and hands them to MQTT together with the raw telegram text.

pub mod config;
pub mod mqtt;
pub mod obis_utils;
pub mod p1;

// Re-export common types for easier access
pub use config::{Config, ConfigError};
pub use mqtt::{MqttManager, TelegramMessage, Transmission};
pub use p1::{MeterReading, P1Error, RawTelegram, Tariff, TelegramDecoder, TelegramReader};

/// Log filter used by the binaries unless `P1_LOG_LEVEL` says otherwise.
pub fn init_logging() {
    let default_filter = std::env::var("P1_LOG_LEVEL").unwrap_or("info".to_string());
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(default_filter));
}
