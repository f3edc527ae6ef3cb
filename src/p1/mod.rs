use std::time::Duration;
use thiserror::Error;

pub mod structs;
pub mod value_parsers;
pub mod field_mappings;
pub mod decoder;
pub mod reader;
pub mod serial;

pub use decoder::TelegramDecoder;
pub use reader::{ReaderState, TelegramReader};
pub use structs::{MeterReading, RawTelegram, Tariff};

#[derive(Error, Debug)]
pub enum P1Error {
    #[error("No data from meter for {elapsed:?} (timeout {timeout:?})")]
    NoData { elapsed: Duration, timeout: Duration },
    #[error("Connection closed by the meter")]
    ConnectionClosed,
    #[error("Serial I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serial port can not be opened: {0}")]
    Serial(#[from] serialport::Error),
    #[error("Serial link is misconfigured: {0}")]
    Config(#[from] crate::config::ConfigError),
    #[error("Telegram is not valid UTF-8: {0}")]
    Decode(#[from] std::string::FromUtf8Error),
}

impl P1Error {
    /// Whether the reader gave up on its connection because of this error.
    /// Only a text decoding problem leaves the reader usable.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, P1Error::Decode(_))
    }
}
