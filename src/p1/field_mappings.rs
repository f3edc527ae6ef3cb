use chrono::FixedOffset;
use lazy_static::lazy_static;
use std::collections::HashMap;

use super::structs::MeterReading;
use super::value_parsers::*;

/// Parses a text and stores the result in one field of the reading.
pub type FieldSetter = fn(&mut MeterReading, &str, &FixedOffset);

#[derive(Clone, Copy)]
pub enum FieldRule {
    /// `code(value)`
    Value { dest: &'static str, set: FieldSetter },
    /// `code(meta)(value)`, e.g. the gas meter's capture time and reading.
    MetaValue {
        meta_dest: &'static str,
        set_meta: FieldSetter,
        dest: &'static str,
        set: FieldSetter,
    },
}

impl FieldRule {
    /// Names of the reading fields this rule writes to.
    pub fn destinations(&self) -> Vec<&'static str> {
        match self {
            FieldRule::Value { dest, .. } => vec![*dest],
            FieldRule::MetaValue { meta_dest, dest, .. } => vec![*meta_dest, *dest],
        }
    }
}

macro_rules! value {
    ($dest: ident, |$v: ident, $tz: pat_param| $parse: expr) => {
        FieldRule::Value {
            dest: stringify!($dest),
            set: |r, $v, $tz| r.$dest = $parse,
        }
    };
}

lazy_static! {
    static ref FIELD_MAPPINGS: HashMap<&'static str, FieldRule> = {
        let mut map = HashMap::new();

        // Identification
        map.insert("1-3:0.2.8", value!(output_version, |v, _| parse_string(v)));
        map.insert("0-0:1.0.0", value!(meter_time, |v, tz| parse_timestamp(v, tz)));
        map.insert("0-0:96.1.1", value!(serial, |v, _| parse_string(v)));

        // Energy totals per tariff
        map.insert("1-0:1.8.1", value!(total_usage_night, |v, _| parse_float(v)));
        map.insert("1-0:1.8.2", value!(total_usage_day, |v, _| parse_float(v)));
        map.insert("1-0:2.8.1", value!(total_energy_delivered_night, |v, _| parse_float(v)));
        map.insert("1-0:2.8.2", value!(total_energy_delivered_day, |v, _| parse_float(v)));
        map.insert("0-0:96.14.0", value!(active_tariff, |v, _| parse_tariff(v)));

        // Actual power
        map.insert("1-0:1.7.0", value!(current_power_usage, |v, _| parse_float(v)));
        map.insert("1-0:2.7.0", value!(current_power_delivery, |v, _| parse_float(v)));

        // Power quality counters
        map.insert("0-0:96.7.21", value!(num_power_interruptions, |v, _| parse_int(v)));
        map.insert("0-0:96.7.9", value!(num_long_power_interruptions, |v, _| parse_int(v)));
        map.insert("1-0:99.97.0", value!(power_failure_event_log, |v, _| parse_string(v)));
        map.insert("1-0:32.32.0", value!(num_voltage_sags_phase_l1, |v, _| parse_int(v)));
        map.insert("1-0:32.36.0", value!(num_voltage_swells_phase_l1, |v, _| parse_int(v)));

        // Messages
        map.insert("0-0:96.13.1", value!(message_numeric, |v, _| parse_int(v)));
        map.insert("0-0:96.13.0", value!(message_text, |v, _| Some(parse_string(v))));

        // Phase L1
        map.insert("1-0:31.7.0", value!(instantaneous_current_l1, |v, _| parse_number(v)));
        map.insert("1-0:21.7.0", value!(instantaneous_active_power_draw_l1, |v, _| parse_float(v)));
        map.insert("1-0:22.7.0", value!(instantaneous_active_power_delivery_l1, |v, _| parse_float(v)));

        // M-Bus gas meter
        map.insert("0-1:24.1.0", value!(num_mbus_devices, |v, _| parse_int(v)));
        map.insert("0-1:96.1.0", value!(gas_meter_serial, |v, _| Some(parse_string(v))));
        map.insert("0-1:24.2.1", FieldRule::MetaValue {
            meta_dest: "gas_last_measurement",
            set_meta: |r, v, tz| r.gas_last_measurement = parse_timestamp(v, tz),
            dest: "gas_usage_total",
            set: |r, v, _| r.gas_usage_total = Some(parse_float(v)),
        });

        map
    };
}

/// Looks up the rule for an OBIS code. Unknown codes have no rule.
pub fn get_field_mapping(code: &str) -> Option<&'static FieldRule> {
    FIELD_MAPPINGS.get(code)
}

pub fn known_codes() -> Vec<&'static str> {
    let mut codes: Vec<&'static str> = FIELD_MAPPINGS.keys().copied().collect();
    codes.sort();
    codes
}
