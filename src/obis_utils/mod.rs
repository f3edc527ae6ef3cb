use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

lazy_static! {
    static ref RECORD_MATCH: Regex =
        Regex::new(r"^(?P<code>[0-9:\-.]+)\((?P<meta_or_value>[^)]+)\)(\((?P<value>.*)\))?$").unwrap();
    static ref DESCRIPTIONS: HashMap<&'static str, &'static str> = get_p1_obis_descriptions();
}

/// One `code(a)` or `code(a)(b)` line of a telegram.
#[derive(Debug, Clone, PartialEq)]
pub struct ObisRecord {
    pub code: String,
    pub meta_or_value: String,
    pub value: Option<String>,
}

/// Splits a data line into its OBIS code and bracketed groups.
///
/// Lines of any other shape give `None`, meters are free to send
/// vendor specific lines we do not know about.
pub fn parse_record_line(line: &str) -> Option<ObisRecord> {
    let m = RECORD_MATCH.captures(line.trim())?;

    Some(ObisRecord {
        code: m["code"].to_string(),
        meta_or_value: m["meta_or_value"].to_string(),
        value: m.name("value").map(|v| v.as_str().to_string()),
    })
}

/// Human readable name of a code the decoder has no field for.
pub fn get_obis_description(obis_code: &str) -> Option<&'static str> {
    DESCRIPTIONS.get(obis_code).copied()
}

/// DSMR codes meters commonly send that do not end up in a reading.
pub fn get_p1_obis_descriptions() -> HashMap<&'static str, &'static str> {
    let mut map = HashMap::new();

    // Thresholds and breaker
    map.insert("0-0:17.0.0", "Actual threshold electricity");
    map.insert("0-0:96.3.10", "Actual switch position");
    map.insert("0-0:96.7.19", "Power failure event log entry");

    // Voltage per phase
    map.insert("1-0:32.7.0", "Instantaneous voltage (L1)");
    map.insert("1-0:52.7.0", "Instantaneous voltage (L2)");
    map.insert("1-0:72.7.0", "Instantaneous voltage (L3)");

    // Voltage quality on the other phases
    map.insert("1-0:52.32.0", "Number of voltage sags (L2)");
    map.insert("1-0:72.32.0", "Number of voltage sags (L3)");
    map.insert("1-0:52.36.0", "Number of voltage swells (L2)");
    map.insert("1-0:72.36.0", "Number of voltage swells (L3)");

    // Current and power on the other phases
    map.insert("1-0:51.7.0", "Current (L2)");
    map.insert("1-0:71.7.0", "Current (L3)");
    map.insert("1-0:41.7.0", "Active power + (L2)");
    map.insert("1-0:61.7.0", "Active power + (L3)");
    map.insert("1-0:42.7.0", "Active power - (L2)");
    map.insert("1-0:62.7.0", "Active power - (L3)");

    // M-Bus
    map.insert("0-1:24.3.0", "M-Bus hourly value (DSMR 2.2/3)");
    map.insert("0-1:24.4.0", "M-Bus valve position");
    map.insert("0-2:24.1.0", "M-Bus device type (channel 2)");
    map.insert("0-2:96.1.0", "M-Bus equipment identifier (channel 2)");
    map.insert("0-2:24.2.1", "M-Bus last 5-minute value (channel 2)");

    map
}
