use log::info;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use super::decoder::TelegramDecoder;
use super::reader::TelegramReader;
use super::P1Error;
use crate::config::{ConfigError, FlowControlConfig, P1Config, ParityConfig};

impl From<ParityConfig> for Parity {
    fn from(parity: ParityConfig) -> Self {
        match parity {
            ParityConfig::None => Parity::None,
            ParityConfig::Odd => Parity::Odd,
            ParityConfig::Even => Parity::Even,
        }
    }
}

impl From<FlowControlConfig> for FlowControl {
    fn from(flow: FlowControlConfig) -> Self {
        match flow {
            FlowControlConfig::None => FlowControl::None,
            FlowControlConfig::Software => FlowControl::Software,
            FlowControlConfig::Hardware => FlowControl::Hardware,
        }
    }
}

fn data_bits(bits: u8) -> Result<DataBits, ConfigError> {
    match bits {
        5 => Ok(DataBits::Five),
        6 => Ok(DataBits::Six),
        7 => Ok(DataBits::Seven),
        8 => Ok(DataBits::Eight),
        _ => Err(ConfigError::Invalid("p1.data_bits")),
    }
}

fn stop_bits(bits: u8) -> Result<StopBits, ConfigError> {
    match bits {
        1 => Ok(StopBits::One),
        2 => Ok(StopBits::Two),
        _ => Err(ConfigError::Invalid("p1.stop_bits")),
    }
}

pub type SerialTelegramReader = TelegramReader<Box<dyn SerialPort>>;

/// Opens the serial link to the meter's P1 port.
pub fn open_link(config: &P1Config) -> Result<Box<dyn SerialPort>, P1Error> {
    info!("Opening P1 port {} at {} baud, {}{:?}{}", config.port, config.baud_rate,
          config.data_bits, config.parity, config.stop_bits);

    let port = serialport::new(&config.port, config.baud_rate)
        .data_bits(data_bits(config.data_bits)?)
        .parity(config.parity.into())
        .stop_bits(stop_bits(config.stop_bits)?)
        .flow_control(config.flow_control.into())
        .timeout(config.read_timeout())
        .open()?;

    Ok(port)
}

/// Opens the link and wraps it in a reader using the configured zone and
/// stall timeout.
pub fn open_reader(config: &P1Config) -> Result<SerialTelegramReader, P1Error> {
    let zone = config.zone()?;
    let decoder = TelegramDecoder::new(zone, config.lossy_utf8);

    Ok(TelegramReader::new(open_link(config)?, decoder, config.data_timeout()))
}
