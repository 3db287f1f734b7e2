// SPDX-License-Identifier: MIT

//! Conversions between HID values and driver variable strings.
//!
//! A [Conversion] turns the physical value of a HID item into the string that
//! is published, and back for writes. Most rows use a printf-like format
//! ([format_value]), enumerations use a [LookupTable].

/// Maps HID values to strings, in table order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LookupTable {
    entries: &'static [(i64, &'static str)],
}

impl LookupTable {
    pub const fn new(entries: &'static [(i64, &'static str)]) -> Self {
        LookupTable { entries }
    }

    pub fn entries(&self) -> &'static [(i64, &'static str)] {
        self.entries
    }

    /// The first string for the integer part of `value`.
    pub fn find(&self, value: f64) -> Option<&'static str> {
        let value = value as i64;
        self.entries
            .iter()
            .find(|(v, _)| *v == value)
            .map(|(_, s)| *s)
    }

    /// The first value for `s`.
    pub fn reverse(&self, s: &str) -> Option<i64> {
        self.entries.iter().find(|(_, n)| *n == s).map(|(v, _)| *v)
    }
}

/// How a row's HID value becomes a string.
#[derive(Debug, Clone, Copy)]
pub enum Conversion {
    /// Format the value with the row's format
    Identity,
    Lookup(LookupTable),
    /// A conversion function and its optional inverse
    Custom {
        fun: fn(f64) -> String,
        nuf: Option<fn(&str) -> Option<f64>>,
    },
    /// The value is a string descriptor index
    StringDescriptor,
}

impl Conversion {
    /// The lookup table, if this is a lookup.
    pub fn lookup(&self) -> Option<&LookupTable> {
        match self {
            Conversion::Lookup(table) => Some(table),
            _ => None,
        }
    }

    /// The string for `value`. `format` is only used by [Conversion::Identity].
    /// `None` if a lookup has no match or for [Conversion::StringDescriptor],
    /// which needs the device.
    pub fn apply(&self, value: f64, format: &str) -> Option<String> {
        match self {
            Conversion::Identity => Some(format_value(format, value)),
            Conversion::Lookup(table) => table.find(value).map(String::from),
            Conversion::Custom { fun, .. } => Some(fun(value)),
            Conversion::StringDescriptor => None,
        }
    }

    /// The HID value for the string `s`.
    pub fn reverse(&self, s: &str) -> Option<f64> {
        match self {
            Conversion::Lookup(table) => table.reverse(s).map(|v| v as f64),
            Conversion::Custom { nuf: Some(nuf), .. } => nuf(s),
            Conversion::Identity | Conversion::Custom { nuf: None, .. } => {
                s.trim().parse().ok()
            }
            Conversion::StringDescriptor => None,
        }
    }
}

macro_rules! boolean_lookup {
    ($name:ident, $set:literal) => {
        pub static $name: LookupTable = LookupTable::new(&[(1, $set), (0, concat!("!", $set))]);
    };
}

boolean_lookup!(ONLINE_INFO, "online");
boolean_lookup!(DISCHARGING_INFO, "dischrg");
boolean_lookup!(CHARGING_INFO, "chrg");
boolean_lookup!(LOWBATT_INFO, "lowbatt");
boolean_lookup!(OVERLOAD_INFO, "overload");
boolean_lookup!(REPLACEBATT_INFO, "replacebatt");
boolean_lookup!(TRIM_INFO, "trim");
boolean_lookup!(BOOST_INFO, "boost");
boolean_lookup!(BYPASS_AUTO_INFO, "bypassauto");
boolean_lookup!(BYPASS_MANUAL_INFO, "bypassman");
boolean_lookup!(CALIBRATION_INFO, "cal");
boolean_lookup!(FANFAIL_INFO, "fanfail");
boolean_lookup!(SHUTDOWNIMM_INFO, "shutdownimm");
boolean_lookup!(OVERHEAT_INFO, "overheat");
boolean_lookup!(AWAITINGPOWER_INFO, "awaitingpower");
boolean_lookup!(COMMFAULT_INFO, "commfault");
boolean_lookup!(TIMELIMITEXPIRED_INFO, "timelimitexp");
boolean_lookup!(BATTVOLTLO_INFO, "battvoltlo");
boolean_lookup!(BATTVOLTHI_INFO, "battvolthi");
boolean_lookup!(CHARGERFAIL_INFO, "chargerfail");
boolean_lookup!(FULLYCHARGED_INFO, "fullycharged");
boolean_lookup!(DEPLETED_INFO, "depleted");
boolean_lookup!(VRANGE_INFO, "vrange");
boolean_lookup!(FRANGE_INFO, "frange");

/// Inverted: a device that does not report it is considered on.
pub static OFF_INFO: LookupTable = LookupTable::new(&[(0, "off"), (1, "!off")]);

/// Inverted: a device that does not report it is considered to have a battery.
pub static NOBATTERY_INFO: LookupTable = LookupTable::new(&[(1, "!nobattery"), (0, "nobattery")]);

pub static TEST_WRITE_INFO: LookupTable = LookupTable::new(&[
    (0, "No test"),
    (1, "Quick test"),
    (2, "Deep test"),
    (3, "Abort test"),
]);

pub static TEST_READ_INFO: LookupTable = LookupTable::new(&[
    (1, "Done and passed"),
    (2, "Done and warning"),
    (3, "Done and error"),
    (4, "Aborted"),
    (5, "In progress"),
    (6, "No test initiated"),
    (7, "Test scheduled"),
]);

pub static BEEPER_INFO: LookupTable =
    LookupTable::new(&[(1, "disabled"), (2, "enabled"), (3, "muted")]);

pub static YES_NO_INFO: LookupTable = LookupTable::new(&[(0, "no"), (1, "yes")]);

pub static ON_OFF_INFO: LookupTable = LookupTable::new(&[(0, "off"), (1, "on")]);

/// Dates are packed as `(year - 1980) << 9 | month << 5 | day`.
pub fn date_conversion(value: f64) -> String {
    let v = value as i64;
    if v == 0 {
        return "not set".into();
    }
    let year = 1980 + (v >> 9);
    let month = (v >> 5) & 0x0f;
    let day = v & 0x1f;
    format!("{year:04}/{month:02}/{day:02}")
}

/// The inverse of [date_conversion] for `YYYY/MM/DD`.
pub fn date_conversion_reverse(s: &str) -> Option<f64> {
    let mut parts = s.trim().splitn(3, '/').map(|p| p.parse::<i64>().ok());
    let (year, month, day) = (parts.next()??, parts.next()??, parts.next()??);
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }
    Some((((year - 1980) << 9) | (month << 5) | day) as f64)
}

pub fn hex_conversion(value: f64) -> String {
    format!("{:08x}", value as i64)
}

pub fn divide_by_10_conversion(value: f64) -> String {
    format!("{:.1}", value * 0.1)
}

pub fn divide_by_10_conversion_reverse(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().map(|v| v * 10.0)
}

/// Some firmware reports Celsius where Kelvin is declared, only values in a
/// plausible Kelvin range are converted.
pub fn kelvin_celsius_conversion(value: f64) -> String {
    if (273.0..=373.0).contains(&value) {
        format!("{:.1}", value - 273.15)
    } else {
        format!("{value:.1}")
    }
}

pub const DATE_CONVERSION: Conversion = Conversion::Custom {
    fun: date_conversion,
    nuf: Some(date_conversion_reverse),
};

pub const HEX_CONVERSION: Conversion = Conversion::Custom {
    fun: hex_conversion,
    nuf: None,
};

pub const DIVIDE_BY_10_CONVERSION: Conversion = Conversion::Custom {
    fun: divide_by_10_conversion,
    nuf: Some(divide_by_10_conversion_reverse),
};

pub const KELVIN_CELSIUS_CONVERSION: Conversion = Conversion::Custom {
    fun: kelvin_celsius_conversion,
    nuf: None,
};

/// Format `value` with a single printf-style conversion such as `%.0f`,
/// `%05.1f`, `%d`, `%x` or `%s`. Text around the conversion is kept.
/// A format without a conversion is returned unchanged.
pub fn format_value(format: &str, value: f64) -> String {
    let Some(start) = format.find('%') else {
        return format.to_string();
    };
    let spec = &format[start + 1..];
    let (flags, rest) = spec.split_at(spec.find(|c: char| c != '0' && c != '-').unwrap_or(spec.len()));
    let (width, rest) = rest.split_at(rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len()));
    let (precision, rest) = match rest.strip_prefix('.') {
        Some(r) => {
            let end = r.find(|c: char| !c.is_ascii_digit()).unwrap_or(r.len());
            (Some(r[..end].parse::<usize>().unwrap_or(0)), &r[end..])
        }
        None => (None, rest),
    };
    let Some(conv) = rest.chars().next() else {
        return format.to_string();
    };
    let tail = &rest[conv.len_utf8()..];
    let width: usize = width.parse().unwrap_or(0);
    let zero = flags.contains('0') && !flags.contains('-');
    let left = flags.contains('-');

    let body = match conv {
        'f' | 'F' => format!("{:.*}", precision.unwrap_or(6), value),
        'd' | 'i' | 'u' => format!("{}", value as i64),
        'x' => format!("{:x}", value as i64),
        'X' => format!("{:X}", value as i64),
        's' | 'g' => format!("{value}"),
        _ => return format.to_string(),
    };
    let padded = match (left, zero) {
        (true, _) => format!("{body:<width$}"),
        (false, true) if body.starts_with('-') => format!("-{:0>w$}", &body[1..], w = width.saturating_sub(1)),
        (false, true) => format!("{body:0>width$}"),
        (false, false) => format!("{body:>width$}"),
    };
    format!("{}{}{}", &format[..start], padded, tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups() {
        assert_eq!(ONLINE_INFO.find(1.0), Some("online"));
        assert_eq!(ONLINE_INFO.find(0.0), Some("!online"));
        assert_eq!(ONLINE_INFO.find(2.0), None);
        assert_eq!(OFF_INFO.find(0.0), Some("off"));
        assert_eq!(NOBATTERY_INFO.find(0.0), Some("nobattery"));
        assert_eq!(TEST_READ_INFO.find(6.0), Some("No test initiated"));
        assert_eq!(BEEPER_INFO.reverse("muted"), Some(3));
        assert_eq!(BEEPER_INFO.reverse("loud"), None);
        assert_eq!(TIMELIMITEXPIRED_INFO.find(1.0), Some("timelimitexp"));
    }

    #[test]
    fn dates() {
        assert_eq!(date_conversion(0.0), "not set");
        // 2021/03/15
        let v = ((2021 - 1980) << 9 | 3 << 5 | 15) as f64;
        assert_eq!(date_conversion(v), "2021/03/15");
        assert_eq!(date_conversion_reverse("2021/03/15"), Some(v));
        assert_eq!(date_conversion_reverse("2021/13/15"), None);
        assert_eq!(date_conversion_reverse("yesterday"), None);
    }

    #[test]
    fn numbers() {
        assert_eq!(hex_conversion(0xabcd as f64), "0000abcd");
        assert_eq!(divide_by_10_conversion(1234.0), "123.4");
        assert_eq!(kelvin_celsius_conversion(298.15), "25.0");
        assert_eq!(kelvin_celsius_conversion(25.0), "25.0");
    }

    #[test]
    fn printf_formats() {
        assert_eq!(format_value("%.0f", 99.6), "100");
        assert_eq!(format_value("%.1f", 13.65), "13.7");
        assert_eq!(format_value("%05.1f", 5.0), "005.0");
        assert_eq!(format_value("%d", -3.7), "-3");
        assert_eq!(format_value("%03d", -3.0), "-03");
        assert_eq!(format_value("%s", 12.5), "12.5");
        assert_eq!(format_value("%x", 255.0), "ff");
        assert_eq!(format_value("%.0f V", 230.0), "230 V");
        assert_eq!(format_value("no format", 1.0), "no format");
    }

    #[test]
    fn conversions() {
        assert_eq!(Conversion::Identity.apply(42.0, "%.0f").as_deref(), Some("42"));
        assert_eq!(Conversion::Identity.reverse(" 42 "), Some(42.0));
        let yes_no = Conversion::Lookup(YES_NO_INFO);
        assert_eq!(yes_no.apply(1.0, "%s").as_deref(), Some("yes"));
        assert_eq!(yes_no.reverse("no"), Some(0.0));
        assert_eq!(DATE_CONVERSION.reverse("1980/01/01"), Some(33.0));
        assert_eq!(HEX_CONVERSION.apply(16.0, "%s").as_deref(), Some("00000010"));
        assert_eq!(Conversion::StringDescriptor.apply(1.0, "%s"), None);
    }
}
