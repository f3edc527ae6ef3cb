use chrono::{DateTime, FixedOffset, TimeZone};
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;

use super::structs::Tariff;

lazy_static! {
    static ref FLOAT_MATCH: Regex = Regex::new(r"^(?P<value>\d+\.\d+)").unwrap();
    static ref NUMBER_MATCH: Regex = Regex::new(r"^(?P<value>\d+(\.\d+)?)").unwrap();
    static ref DATE_MATCH: Regex = Regex::new(
        r"^(?P<year>\d{2})(?P<mon>\d{2})(?P<day>\d{2})(?P<hr>\d{2})(?P<min>\d{2})(?P<sec>\d{2})(?P<time_type>[WS])"
    ).unwrap();
}

/*
 * All parsers are total: text that does not fit falls back to the
 * field default so one bad value never costs the whole telegram.
 */

pub fn parse_string(value: &str) -> String {
    value.to_string()
}

pub fn parse_int(value: &str) -> u64 {
    let digits: &str = match value.find(|c: char| !c.is_ascii_digit()) {
        Some(end) => &value[..end],
        None => value,
    };

    if digits.is_empty() {
        return 0;
    }

    digits.parse::<u64>().unwrap_or(0)
}

pub fn parse_float(value: &str) -> f64 {
    FLOAT_MATCH
        .captures(value)
        .and_then(|m| m["value"].parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Like [`parse_float`] but also takes integer texts such as `002*A`,
/// which single phase meters use for the instantaneous current.
pub fn parse_number(value: &str) -> f64 {
    NUMBER_MATCH
        .captures(value)
        .and_then(|m| m["value"].parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Parses `YYMMDDhhmmss` followed by `W` (winter) or `S` (summer).
///
/// The flag is only checked syntactically, both variants end up in `zone`.
pub fn parse_timestamp(value: &str, zone: &FixedOffset) -> Option<DateTime<FixedOffset>> {
    let m = DATE_MATCH.captures(value)?;

    let field = |name: &str| m[name].parse::<u32>().ok();
    let year = 2000 + field("year")? as i32;

    let ts = zone
        .with_ymd_and_hms(year, field("mon")?, field("day")?, field("hr")?, field("min")?, field("sec")?)
        .single();

    if ts.is_none() {
        debug!("Timestamp {} has no valid calendar date", value);
    }
    ts
}

pub fn parse_tariff(value: &str) -> Option<Tariff> {
    Tariff::from_code(parse_int(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn cet() -> FixedOffset {
        FixedOffset::east_opt(3600).unwrap()
    }

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int(""), 0);
        assert_eq!(parse_int("00004"), 4);
        assert_eq!(parse_int("00012*s"), 12);
        assert_eq!(parse_int("abc"), 0);
        assert_eq!(parse_int("99999999999999999999999"), 0);
    }

    #[test]
    fn test_parse_float() {
        assert_eq!(parse_float("000123.456*kWh"), 123.456);
        assert_eq!(parse_float("00.674*kW"), 0.674);
        assert_eq!(parse_float("002*A"), 0.0);
        assert_eq!(parse_float(""), 0.0);
        assert_eq!(parse_float("-1.5"), 0.0);
        assert_eq!(parse_float("garbage"), 0.0);
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("002*A"), 2.0);
        assert_eq!(parse_number("001.5*A"), 1.5);
        assert_eq!(parse_number("*A"), 0.0);
    }

    #[test]
    fn test_parse_timestamp() {
        let ts = parse_timestamp("191202211100W", &cet()).unwrap();
        assert_eq!((ts.year(), ts.month(), ts.day()), (2019, 12, 2));
        assert_eq!((ts.hour(), ts.minute(), ts.second()), (21, 11, 0));
        assert_eq!(ts.offset(), &cet());
    }

    #[test]
    fn test_parse_timestamp_ignores_dst_flag() {
        assert_eq!(parse_timestamp("190702211100S", &cet()), parse_timestamp("190702211100W", &cet()));
    }

    #[test]
    fn test_parse_timestamp_rejects_bad_input() {
        assert!(parse_timestamp("191202211100", &cet()).is_none());
        assert!(parse_timestamp("1912022111W", &cet()).is_none());
        assert!(parse_timestamp("191302211100W", &cet()).is_none());
        assert!(parse_timestamp("", &cet()).is_none());
    }

    #[test]
    fn test_parse_tariff() {
        assert_eq!(parse_tariff("0002"), Some(Tariff::Day));
        assert_eq!(parse_tariff("0001"), Some(Tariff::Night));
        assert_eq!(parse_tariff("3"), None);
        assert_eq!(parse_tariff("x"), None);
    }
}
