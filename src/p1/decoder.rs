use chrono::{FixedOffset, Offset, Utc};
use log::debug;

use super::field_mappings::{get_field_mapping, FieldRule};
use super::structs::MeterReading;
use super::P1Error;
use crate::obis_utils::{self, ObisRecord};

/// CET without daylight saving, the zone meter timestamps are read in.
pub const DEFAULT_UTC_OFFSET_SECS: i32 = 3600;

/// Turns the text of one complete telegram into a [`MeterReading`].
#[derive(Debug, Clone)]
pub struct TelegramDecoder {
    zone: FixedOffset,
    lossy_utf8: bool,
}

impl Default for TelegramDecoder {
    fn default() -> Self {
        Self {
            zone: FixedOffset::east_opt(DEFAULT_UTC_OFFSET_SECS).unwrap_or_else(|| Utc.fix()),
            lossy_utf8: true,
        }
    }
}

impl TelegramDecoder {
    pub fn new(zone: FixedOffset, lossy_utf8: bool) -> Self {
        Self { zone, lossy_utf8 }
    }

    pub fn zone(&self) -> &FixedOffset {
        &self.zone
    }

    /// Converts raw telegram bytes to text.
    ///
    /// Invalid UTF-8 is replaced when decoding is lossy and an error otherwise.
    pub fn telegram_text(&self, bytes: Vec<u8>) -> Result<String, P1Error> {
        if self.lossy_utf8 {
            return Ok(String::from_utf8_lossy(&bytes).into_owned());
        }
        Ok(String::from_utf8(bytes)?)
    }

    pub fn decode_bytes(&self, bytes: Vec<u8>) -> Result<(MeterReading, String), P1Error> {
        let text = self.telegram_text(bytes)?;
        Ok((self.decode(&text), text))
    }

    /// Decodes one telegram. Never fails, lines and values we cannot
    /// make sense of leave their fields at the default.
    pub fn decode(&self, telegram: &str) -> MeterReading {
        let mut reading = MeterReading::default();

        for line in telegram.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(model) = line.strip_prefix('/') {
                reading.model = model.to_string();
            } else if line.starts_with('!') {
                // End of telegram, framing belongs to the reader
            } else if let Some(record) = obis_utils::parse_record_line(line) {
                self.apply_record(&record, &mut reading);
            } else {
                debug!("Ignoring line of unknown shape: {}", line);
            }
        }

        reading
    }

    fn apply_record(&self, record: &ObisRecord, reading: &mut MeterReading) {
        let rule = match get_field_mapping(&record.code) {
            Some(rule) => rule,
            None => {
                debug!("No mapping for {} ({})", record.code,
                       obis_utils::get_obis_description(&record.code).unwrap_or("unknown"));
                return;
            }
        };

        match rule {
            FieldRule::Value { set, .. } => {
                set(reading, &record.meta_or_value, &self.zone);
            }
            FieldRule::MetaValue { set_meta, set, dest, .. } => {
                set_meta(reading, &record.meta_or_value, &self.zone);
                match &record.value {
                    Some(value) => set(reading, value, &self.zone),
                    None => debug!("{} carries no value for {}", record.code, dest),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::p1::structs::Tariff;
    use chrono::TimeZone;

    const TELEGRAM: &str = "/XMX5LGBBFG1009315878\r
\r
1-3:0.2.8(42)\r
0-0:1.0.0(191202221101W)\r
0-0:96.1.1(4530303034303031353934373534343134)\r
1-0:1.8.1(003808.351*kWh)\r
1-0:1.8.2(002948.827*kWh)\r
1-0:2.8.1(000000.000*kWh)\r
1-0:2.8.2(000000.000*kWh)\r
0-0:96.14.0(0001)\r
1-0:1.7.0(00.336*kW)\r
1-0:2.7.0(00.000*kW)\r
0-0:96.7.21(00004)\r
0-0:96.7.9(00003)\r
1-0:99.97.0(3)(0-0:96.7.19)(180604044429S)(0000010042*s)(170819060616S)(0000000431*s)(161112171006W)(0000015043*s)\r
1-0:32.32.0(00000)\r
1-0:32.36.0(00000)\r
0-0:96.13.1()\r
0-0:96.13.0()\r
1-0:31.7.0(002*A)\r
1-0:21.7.0(00.336*kW)\r
1-0:22.7.0(00.000*kW)\r
0-1:24.1.0(003)\r
0-1:96.1.0(4730303139333430323231313938343135)\r
0-1:24.2.1(191202221000W)(05080.562*m3)\r
!C1B4\r
";

    fn cet() -> FixedOffset {
        FixedOffset::east_opt(3600).unwrap()
    }

    #[test]
    fn test_decode_full_telegram() {
        let reading = TelegramDecoder::default().decode(TELEGRAM);

        assert_eq!(reading.model, "XMX5LGBBFG1009315878");
        assert_eq!(reading.output_version, "42");
        assert_eq!(reading.meter_time, cet().with_ymd_and_hms(2019, 12, 2, 22, 11, 1).single());
        assert_eq!(reading.serial, "4530303034303031353934373534343134");
        assert_eq!(reading.total_usage_night, 3808.351);
        assert_eq!(reading.total_usage_day, 2948.827);
        assert_eq!(reading.total_energy_delivered_night, 0.0);
        assert_eq!(reading.active_tariff, Some(Tariff::Night));
        assert_eq!(reading.current_power_usage, 0.336);
        assert_eq!(reading.num_power_interruptions, 4);
        assert_eq!(reading.num_long_power_interruptions, 3);
        assert_eq!(reading.power_failure_event_log, "3");
        assert_eq!(reading.message_numeric, 0);
        assert_eq!(reading.message_text, None);
        assert_eq!(reading.instantaneous_current_l1, 2.0);
        assert_eq!(reading.instantaneous_active_power_draw_l1, 0.336);
        assert_eq!(reading.num_mbus_devices, 3);
        assert_eq!(reading.gas_meter_serial.as_deref(), Some("4730303139333430323231313938343135"));
        assert_eq!(reading.gas_last_measurement, cet().with_ymd_and_hms(2019, 12, 2, 22, 10, 0).single());
        assert_eq!(reading.gas_usage_total, Some(5080.562));
    }

    #[test]
    fn test_decode_minimal_telegram() {
        let telegram = "/XMX5LGBBFG1009315878\n0-0:96.14.0(0002)\n1-0:1.7.0(00.674*kW)\n!1234\n";
        let reading = TelegramDecoder::default().decode(telegram);

        assert_eq!(reading, MeterReading {
            model: "XMX5LGBBFG1009315878".to_string(),
            active_tariff: Some(Tariff::Day),
            current_power_usage: 0.674,
            ..Default::default()
        });
    }

    #[test]
    fn test_decode_composite_line() {
        let reading = TelegramDecoder::default().decode("0-1:24.2.1(191202211500W)(05080.562*m3)");

        assert_eq!(reading, MeterReading {
            gas_last_measurement: cet().with_ymd_and_hms(2019, 12, 2, 21, 15, 0).single(),
            gas_usage_total: Some(5080.562),
            ..Default::default()
        });
    }

    #[test]
    fn test_composite_without_value_keeps_meta() {
        let reading = TelegramDecoder::default().decode("0-1:24.2.1(191202211500W)");
        assert!(reading.gas_last_measurement.is_some());
        assert_eq!(reading.gas_usage_total, None);
    }

    #[test]
    fn test_unknown_codes_and_shapes_are_ignored() {
        let telegram = "/ABC\n1-0:99.99.9(12.5*kW)\nvendor specific junk\n1-0:1.7.0(01.000*kW)\n!";
        let reading = TelegramDecoder::default().decode(telegram);

        assert_eq!(reading, MeterReading {
            model: "ABC".to_string(),
            current_power_usage: 1.0,
            ..Default::default()
        });
    }

    #[test]
    fn test_later_record_overwrites_earlier() {
        let reading = TelegramDecoder::default().decode("1-0:1.7.0(01.000*kW)\n1-0:1.7.0(02.500*kW)");
        assert_eq!(reading.current_power_usage, 2.5);
    }

    #[test]
    fn test_malformed_values_fall_back_to_defaults() {
        let telegram = "1-0:1.8.1(abc*kWh)\n0-0:96.7.21(x)\n0-0:1.0.0(yesterday)\n0-0:96.14.0(9)";
        let reading = TelegramDecoder::default().decode(telegram);
        assert_eq!(reading, MeterReading::default());
    }

    #[test]
    fn test_each_code_sets_only_its_fields() {
        let samples = [
            ("1-3:0.2.8", "50"),
            ("0-0:1.0.0", "191202211100W"),
            ("0-0:96.1.1", "4530"),
            ("1-0:1.8.1", "000001.500*kWh"),
            ("1-0:1.8.2", "000001.500*kWh"),
            ("1-0:2.8.1", "000001.500*kWh"),
            ("1-0:2.8.2", "000001.500*kWh"),
            ("0-0:96.14.0", "0002"),
            ("1-0:1.7.0", "01.500*kW"),
            ("1-0:2.7.0", "01.500*kW"),
            ("0-0:96.7.21", "00007"),
            ("0-0:96.7.9", "00007"),
            ("1-0:99.97.0", "2"),
            ("1-0:32.32.0", "00007"),
            ("1-0:32.36.0", "00007"),
            ("0-0:96.13.1", "42"),
            ("0-0:96.13.0", "486921"),
            ("1-0:31.7.0", "007*A"),
            ("1-0:21.7.0", "01.500*kW"),
            ("1-0:22.7.0", "01.500*kW"),
            ("0-1:24.1.0", "003"),
            ("0-1:96.1.0", "4730"),
        ];
        let decoder = TelegramDecoder::default();
        let empty = serde_json::to_value(MeterReading::default()).unwrap();

        for (code, value) in samples {
            let reading = decoder.decode(&format!("{}({})", code, value));
            let json = serde_json::to_value(&reading).unwrap();
            let changed: Vec<&String> = json.as_object().unwrap().iter()
                .filter(|(k, v)| empty[k.as_str()] != **v)
                .map(|(k, _)| k)
                .collect();

            let expected = get_field_mapping(code).unwrap().destinations();
            assert_eq!(changed, expected, "unexpected fields changed by {}", code);
        }
    }

    #[test]
    fn test_decode_is_deterministic() {
        let decoder = TelegramDecoder::default();
        let first = decoder.decode(TELEGRAM);
        let second = decoder.decode(TELEGRAM);

        assert_eq!(first, second);
        assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
    }

    #[test]
    fn test_decode_bytes_strict_and_lossy() {
        let bytes = b"/XMX\xff5\n1-0:1.7.0(00.674*kW)\n!\n".to_vec();

        let strict = TelegramDecoder::new(cet(), false);
        assert!(matches!(strict.decode_bytes(bytes.clone()), Err(P1Error::Decode(_))));

        let lossy = TelegramDecoder::new(cet(), true);
        let (reading, raw) = lossy.decode_bytes(bytes).unwrap();
        assert_eq!(reading.model, "XMX\u{FFFD}5");
        assert_eq!(reading.current_power_usage, 0.674);
        assert!(raw.ends_with("!\n"));
    }

    #[test]
    fn test_configured_zone_is_used() {
        let utc = FixedOffset::east_opt(0).unwrap();
        let reading = TelegramDecoder::new(utc, true).decode("0-0:1.0.0(191202211100S)");
        assert_eq!(reading.meter_time, utc.with_ymd_and_hms(2019, 12, 2, 21, 11, 0).single());
    }
}
