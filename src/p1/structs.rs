use chrono::{DateTime, FixedOffset};
use serde::{Serialize, Serializer};

/// Tariff bucket the meter is currently accounting energy under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tariff {
    Night = 1,
    Day = 2,
}

impl Tariff {
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            1 => Some(Tariff::Night),
            2 => Some(Tariff::Day),
            _ => None,
        }
    }

    pub fn code(&self) -> u8 {
        *self as u8
    }
}

/* Consumers expect the numeric tariff code, not the variant name */
impl Serialize for Tariff {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

/// The verbatim text of one telegram, line breaks included.
pub type RawTelegram = String;

/// One decoded P1 telegram.
///
/// Every field is always present; whatever the telegram did not carry keeps
/// its default so the JSON representation has a stable shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MeterReading {
    // Identification line without the leading '/'
    pub model: String,
    pub output_version: String,
    pub meter_time: Option<DateTime<FixedOffset>>,
    pub serial: String,

    // Energy totals in kWh
    pub total_usage_night: f64,
    pub total_usage_day: f64,
    pub total_energy_delivered_day: f64,
    pub total_energy_delivered_night: f64,
    pub active_tariff: Option<Tariff>,

    // Instantaneous power in kW
    pub current_power_usage: f64,
    pub current_power_delivery: f64,

    pub num_power_interruptions: u64,
    pub num_long_power_interruptions: u64,
    pub power_failure_event_log: String,
    pub num_voltage_sags_phase_l1: u64,
    pub num_voltage_swells_phase_l1: u64,

    pub message_numeric: u64,
    pub message_text: Option<String>,

    pub instantaneous_current_l1: f64,
    pub instantaneous_active_power_draw_l1: f64,
    pub instantaneous_active_power_delivery_l1: f64,

    // M-Bus gas meter, only filled when one is attached
    pub num_mbus_devices: u64,
    pub gas_meter_serial: Option<String>,
    pub gas_last_measurement: Option<DateTime<FixedOffset>>,
    pub gas_usage_total: Option<f64>,
}

impl MeterReading {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
