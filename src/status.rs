// SPDX-License-Identifier: MIT

//! Device status as collected from boolean HID items.
//!
//! Boolean rows do not publish a variable, their lookup yields a flag name
//! such as `online` or `!online` that sets or clears one [StatusFlags] bit.
//! The flags are kept across reports (not every report carries every flag)
//! and only turned into status words and alarms once per update.
//!
//! ```
//! # use hidups::status::StatusFlags;
//! let mut status = StatusFlags::empty();
//! status.process_boolean_info("online");
//! status.process_boolean_info("chrg");
//! status.process_boolean_info("fullycharged");
//! assert_eq!(status.status_tokens(), vec!["OL"]);
//! status.process_boolean_info("!online");
//! status.process_boolean_info("dischrg");
//! assert_eq!(status.status_tokens(), vec!["OB", "DISCHRG"]);
//! ```

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StatusFlags: u32 {
        const ONLINE = 1 << 0;
        const DISCHRG = 1 << 1;
        const CHRG = 1 << 2;
        const LOWBATT = 1 << 3;
        const OVERLOAD = 1 << 4;
        const REPLACEBATT = 1 << 5;
        const SHUTDOWNIMM = 1 << 6;
        const TRIM = 1 << 7;
        const BOOST = 1 << 8;
        const BYPASSAUTO = 1 << 9;
        const BYPASSMAN = 1 << 10;
        const OFF = 1 << 11;
        const CAL = 1 << 12;
        const OVERHEAT = 1 << 13;
        const COMMFAULT = 1 << 14;
        const DEPLETED = 1 << 15;
        const TIMELIMITEXP = 1 << 16;
        const FULLYCHARGED = 1 << 17;
        const AWAITINGPOWER = 1 << 18;
        const FANFAIL = 1 << 19;
        const NOBATTERY = 1 << 20;
        const BATTVOLTLO = 1 << 21;
        const BATTVOLTHI = 1 << 22;
        const CHARGERFAIL = 1 << 23;
        const VRANGE = 1 << 24;
        const FRANGE = 1 << 25;
    }
}

/// Lower-case names as produced by the boolean lookup tables.
static STATUS_NAMES: &[(&str, StatusFlags)] = &[
    ("online", StatusFlags::ONLINE),
    ("dischrg", StatusFlags::DISCHRG),
    ("chrg", StatusFlags::CHRG),
    ("lowbatt", StatusFlags::LOWBATT),
    ("overload", StatusFlags::OVERLOAD),
    ("replacebatt", StatusFlags::REPLACEBATT),
    ("shutdownimm", StatusFlags::SHUTDOWNIMM),
    ("trim", StatusFlags::TRIM),
    ("boost", StatusFlags::BOOST),
    ("bypassauto", StatusFlags::BYPASSAUTO),
    ("bypassman", StatusFlags::BYPASSMAN),
    ("off", StatusFlags::OFF),
    ("cal", StatusFlags::CAL),
    ("overheat", StatusFlags::OVERHEAT),
    ("commfault", StatusFlags::COMMFAULT),
    ("depleted", StatusFlags::DEPLETED),
    ("timelimitexp", StatusFlags::TIMELIMITEXP),
    ("fullycharged", StatusFlags::FULLYCHARGED),
    ("awaitingpower", StatusFlags::AWAITINGPOWER),
    ("fanfail", StatusFlags::FANFAIL),
    ("nobattery", StatusFlags::NOBATTERY),
    ("battvoltlo", StatusFlags::BATTVOLTLO),
    ("battvolthi", StatusFlags::BATTVOLTHI),
    ("chargerfail", StatusFlags::CHARGERFAIL),
    ("vrange", StatusFlags::VRANGE),
    ("frange", StatusFlags::FRANGE),
];

static ALARMS: &[(StatusFlags, &str)] = &[
    (StatusFlags::REPLACEBATT, "Replace battery!"),
    (StatusFlags::SHUTDOWNIMM, "Shutdown imminent!"),
    (StatusFlags::FANFAIL, "Fan failure!"),
    (StatusFlags::NOBATTERY, "No battery installed!"),
    (StatusFlags::BATTVOLTLO, "Battery voltage too low!"),
    (StatusFlags::BATTVOLTHI, "Battery voltage too high!"),
    (StatusFlags::CHARGERFAIL, "Battery charger fail!"),
    (StatusFlags::OVERHEAT, "Temperature too high!"),
    (StatusFlags::COMMFAULT, "Internal UPS fault!"),
    (StatusFlags::AWAITINGPOWER, "Awaiting power!"),
    (StatusFlags::BYPASSAUTO, "Automatic bypass mode!"),
    (StatusFlags::BYPASSMAN, "Manual bypass mode!"),
];

impl StatusFlags {
    /// Look up a flag by name, ignoring case.
    pub fn from_name(name: &str) -> Option<StatusFlags> {
        STATUS_NAMES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, flag)| *flag)
    }

    /// Set the flag `name`, or clear it if prefixed with `!`. Returns false
    /// for unknown names, which leave the flags unchanged.
    pub fn process_boolean_info(&mut self, value: &str) -> bool {
        let (name, clear) = match value.strip_prefix('!') {
            Some(name) => (name, true),
            None => (value, false),
        };
        match StatusFlags::from_name(name) {
            Some(flag) => {
                self.set(flag, !clear);
                true
            }
            None => false,
        }
    }

    /// The status words, in the order they are published.
    pub fn status_tokens(&self) -> Vec<&'static str> {
        let mut tokens = vec![];
        tokens.push(if self.contains(StatusFlags::ONLINE) { "OL" } else { "OB" });
        if self.contains(StatusFlags::DISCHRG) && !self.contains(StatusFlags::DEPLETED) {
            tokens.push("DISCHRG");
        }
        if self.contains(StatusFlags::CHRG) && !self.contains(StatusFlags::FULLYCHARGED) {
            tokens.push("CHRG");
        }
        let low = StatusFlags::LOWBATT | StatusFlags::TIMELIMITEXP | StatusFlags::SHUTDOWNIMM;
        if self.intersects(low) {
            tokens.push("LB");
        }
        let rest = [
            (StatusFlags::OVERLOAD, "OVER"),
            (StatusFlags::REPLACEBATT, "RB"),
            (StatusFlags::TRIM, "TRIM"),
            (StatusFlags::BOOST, "BOOST"),
            (StatusFlags::BYPASSAUTO | StatusFlags::BYPASSMAN, "BYPASS"),
            (StatusFlags::OFF, "OFF"),
            (StatusFlags::CAL, "CAL"),
        ];
        tokens.extend(
            rest.iter()
                .filter(|(flags, _)| self.intersects(*flags))
                .map(|(_, token)| *token),
        );
        tokens
    }

    /// The alarm messages for the flags that are set.
    pub fn alarms(&self) -> Vec<&'static str> {
        ALARMS
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, msg)| *msg)
            .collect()
    }

    /// The reason for being on battery, if the device reported one.
    pub fn transfer_reason(&self) -> Option<&'static str> {
        if self.contains(StatusFlags::VRANGE) {
            Some("input voltage out of range")
        } else if self.contains(StatusFlags::FRANGE) {
            Some("input frequency out of range")
        } else {
            None
        }
    }
}
