// SPDX-License-Identifier: MIT

//! Subdrivers: per-vendor knowledge on top of the generic HID layer.
//!
//! A [Subdriver] claims devices by their [DeviceDescriptor], contributes its
//! vendor usage names, and provides the table of [HidInfo] rows that maps HID
//! paths to driver variables, status flags and commands. The rows are
//! interpreted by the [Driver](crate::walker::Driver).

use bitflags::bitflags;

use crate::convert::{self, Conversion, LookupTable};
use crate::usage::UsageTables;

/// The USB device a descriptor was read from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub vendor_id: u16,
    pub product_id: u16,
    pub vendor: Option<String>,
    pub product: Option<String>,
    pub serial: Option<String>,
    pub bcd_device: u16,
    pub bus: Option<String>,
}

bitflags! {
    /// Flags published with a variable.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InfoFlags: u8 {
        /// Can be changed with `setvar`
        const RW = 1 << 0;
        /// A string of at most `info_len` characters
        const STRING = 1 << 1;
    }
}

bitflags! {
    /// How the walker treats a row.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct HidFlags: u8 {
        /// Read once at init
        const STATIC = 1 << 1;
        /// Re-read only after a write
        const SEMI_STATIC = 1 << 2;
        /// Kept by the driver, never read from the device
        const ABSENT = 1 << 3;
        /// Also read by quick updates
        const QUICK_POLL = 1 << 4;
        const STALE = 1 << 5;
        /// List the lookup values as the allowed values of a writable variable
        const ENUM = 1 << 7;
    }
}

/// What a row produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// A named variable
    Variable(&'static str),
    /// A status flag, the lookup yields the flag name
    Status,
    /// An alarm message, the lookup yields the message
    Alarm,
    /// An instant command writing to the path
    Command(&'static str),
}

impl Target {
    /// The variable or command name, rows are looked up by it.
    pub fn name(&self) -> &'static str {
        match self {
            Target::Variable(name) | Target::Command(name) => *name,
            Target::Status => "BOOL",
            Target::Alarm => "ups.alarm",
        }
    }
}

/// One row of a subdriver's mapping table.
///
/// `hidpath` may contain `%i`, the row is then instantiated for the indexes
/// 1, 2, ... as long as the path resolves, and `%i` in a variable name is
/// replaced as well.
///
/// ```
/// # use hidups::subdriver::{HidFlags, HidInfo};
/// let row = HidInfo::variable("ups.delay.start", "UPS.PowerSummary.DelayBeforeStartup", "30")
///     .writable(10)
///     .with_flags(HidFlags::ABSENT);
/// assert!(row.is_server_side());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct HidInfo {
    pub target: Target,
    pub info_flags: InfoFlags,
    pub info_len: usize,
    pub hidpath: Option<&'static str>,
    /// The printf-like format, or the default value of server side variables
    /// and commands
    pub dfl: Option<&'static str>,
    pub hidflags: HidFlags,
    pub conversion: Conversion,
}

impl HidInfo {
    pub fn variable(name: &'static str, hidpath: &'static str, format: &'static str) -> Self {
        HidInfo {
            target: Target::Variable(name),
            info_flags: InfoFlags::empty(),
            info_len: 0,
            hidpath: Some(hidpath),
            dfl: Some(format),
            hidflags: HidFlags::empty(),
            conversion: Conversion::Identity,
        }
    }

    /// A variable the driver keeps for the device, initialized to `default`.
    pub fn server_side(name: &'static str, default: &'static str) -> Self {
        HidInfo {
            target: Target::Variable(name),
            info_flags: InfoFlags::RW | InfoFlags::STRING,
            info_len: 10,
            hidpath: None,
            dfl: Some(default),
            hidflags: HidFlags::ABSENT,
            conversion: Conversion::Identity,
        }
    }

    pub fn status(hidpath: &'static str, table: LookupTable) -> Self {
        HidInfo {
            target: Target::Status,
            info_flags: InfoFlags::empty(),
            info_len: 0,
            hidpath: Some(hidpath),
            dfl: None,
            hidflags: HidFlags::empty(),
            conversion: Conversion::Lookup(table),
        }
    }

    pub fn alarm(hidpath: &'static str, table: LookupTable) -> Self {
        HidInfo {
            target: Target::Alarm,
            ..HidInfo::status(hidpath, table)
        }
    }

    /// A command writing `default` to `hidpath` unless called with a value.
    pub fn command(name: &'static str, hidpath: &'static str, default: &'static str) -> Self {
        HidInfo {
            target: Target::Command(name),
            info_flags: InfoFlags::empty(),
            info_len: 0,
            hidpath: Some(hidpath),
            dfl: Some(default),
            hidflags: HidFlags::empty(),
            conversion: Conversion::Identity,
        }
    }

    pub fn with_flags(mut self, hidflags: HidFlags) -> Self {
        self.hidflags |= hidflags;
        self
    }

    /// Mark as writable, as a string of at most `len` characters if `len > 0`.
    pub fn writable(mut self, len: usize) -> Self {
        self.info_flags |= InfoFlags::RW;
        if len > 0 {
            self.info_flags |= InfoFlags::STRING;
            self.info_len = len;
        }
        self
    }

    pub fn with_conversion(mut self, conversion: Conversion) -> Self {
        self.conversion = conversion;
        self
    }

    pub fn with_lookup(self, table: LookupTable) -> Self {
        self.with_conversion(Conversion::Lookup(table))
    }

    pub fn is_server_side(&self) -> bool {
        self.hidflags.contains(HidFlags::ABSENT)
    }

    pub fn is_command(&self) -> bool {
        matches!(self.target, Target::Command(_))
    }

    pub fn is_template(&self) -> bool {
        self.hidpath.is_some_and(|p| p.contains("%i"))
    }
}

pub trait Subdriver {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    /// Whether this subdriver handles `device`.
    fn claim(&self, device: &DeviceDescriptor) -> bool;

    /// Usage names, vendor tables first.
    fn usage_tables(&self) -> UsageTables {
        UsageTables::standard()
    }

    fn hid2nut(&self) -> Vec<HidInfo>;

    fn format_model(&self, device: &DeviceDescriptor) -> Option<String> {
        device.product.clone()
    }

    fn format_mfr(&self, device: &DeviceDescriptor) -> Option<String> {
        device.vendor.clone()
    }

    fn format_serial(&self, device: &DeviceDescriptor) -> Option<String> {
        device.serial.clone()
    }

    /// Patch a broken report descriptor before it is parsed. Returns true if
    /// anything was changed.
    fn fix_report_desc(&self, _device: &DeviceDescriptor, _rdesc: &mut [u8]) -> bool {
        false
    }
}

/// The first subdriver that claims `device`.
pub fn select_subdriver(
    subdrivers: Vec<Box<dyn Subdriver>>,
    device: &DeviceDescriptor,
) -> Option<Box<dyn Subdriver>> {
    let subdriver = subdrivers.into_iter().find(|s| s.claim(device));
    match &subdriver {
        Some(s) => log::debug!(
            "Using subdriver {} {} for {:04x}:{:04x}",
            s.name(),
            s.version(),
            device.vendor_id,
            device.product_id
        ),
        None => log::debug!(
            "No subdriver for {:04x}:{:04x}",
            device.vendor_id,
            device.product_id
        ),
    }
    subdriver
}

/// The subdrivers shipped with this crate, in claim order.
pub fn builtin_subdrivers() -> Vec<Box<dyn Subdriver>> {
    vec![Box::new(GenericPdc)]
}

/// Handles any device that follows the HID Power Device Class.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericPdc;

const DEFAULT_ONDELAY: &str = "30";
const DEFAULT_OFFDELAY: &str = "20";

impl Subdriver for GenericPdc {
    fn name(&self) -> &str {
        "Generic HID PDC"
    }

    fn version(&self) -> &str {
        "0.1"
    }

    fn claim(&self, _device: &DeviceDescriptor) -> bool {
        true
    }

    fn format_mfr(&self, device: &DeviceDescriptor) -> Option<String> {
        device
            .vendor
            .clone()
            .or_else(|| Some(format!("{:04x}", device.vendor_id)))
    }

    fn hid2nut(&self) -> Vec<HidInfo> {
        use HidFlags as F;
        vec![
            // Battery
            HidInfo::variable("battery.charge", "UPS.PowerSummary.RemainingCapacity", "%.0f"),
            HidInfo::variable(
                "battery.charge.low",
                "UPS.PowerSummary.RemainingCapacityLimit",
                "%.0f",
            )
            .writable(10)
            .with_flags(F::SEMI_STATIC),
            HidInfo::variable(
                "battery.charge.warning",
                "UPS.PowerSummary.WarningCapacityLimit",
                "%.0f",
            )
            .with_flags(F::STATIC),
            HidInfo::variable("battery.runtime", "UPS.PowerSummary.RunTimeToEmpty", "%.0f"),
            HidInfo::variable(
                "battery.runtime.low",
                "UPS.PowerSummary.RemainingTimeLimit",
                "%.0f",
            )
            .writable(10)
            .with_flags(F::SEMI_STATIC),
            HidInfo::variable("battery.voltage", "UPS.PowerSummary.Voltage", "%.1f"),
            HidInfo::variable("battery.voltage.nominal", "UPS.PowerSummary.ConfigVoltage", "%.1f")
                .with_flags(F::STATIC),
            HidInfo::variable("battery.temperature", "UPS.PowerSummary.Temperature", "%s")
                .with_conversion(convert::KELVIN_CELSIUS_CONVERSION),
            HidInfo::variable("battery.type", "UPS.PowerSummary.iDeviceChemistry", "%s")
                .with_flags(F::STATIC)
                .with_conversion(Conversion::StringDescriptor),
            HidInfo::variable("battery.mfr.date", "UPS.Battery.ManufacturerDate", "%s")
                .with_flags(F::STATIC)
                .with_conversion(convert::DATE_CONVERSION),
            HidInfo::variable("battery.voltage", "UPS.Battery.Voltage", "%.1f"),
            HidInfo::variable("battery.temperature", "UPS.Battery.Temperature", "%s")
                .with_conversion(convert::KELVIN_CELSIUS_CONVERSION),
            // UPS
            HidInfo::variable("ups.load", "UPS.PowerSummary.PercentLoad", "%.0f"),
            HidInfo::variable("ups.load", "UPS.Output.PercentLoad", "%.0f"),
            HidInfo::variable("ups.power.nominal", "UPS.Flow.[4].ConfigApparentPower", "%.0f")
                .with_flags(F::STATIC),
            HidInfo::variable("ups.power.nominal", "UPS.PowerSummary.ConfigApparentPower", "%.0f")
                .with_flags(F::STATIC),
            HidInfo::variable("ups.realpower.nominal", "UPS.Flow.[4].ConfigActivePower", "%.0f")
                .with_flags(F::STATIC),
            HidInfo::variable("ups.realpower", "UPS.Output.ActivePower", "%.0f"),
            HidInfo::variable("ups.temperature", "UPS.PowerSummary.Temperature", "%s")
                .with_conversion(convert::KELVIN_CELSIUS_CONVERSION),
            HidInfo::variable("ups.beeper.status", "UPS.PowerSummary.AudibleAlarmControl", "%s")
                .with_lookup(convert::BEEPER_INFO),
            HidInfo::variable("ups.test.result", "UPS.BatterySystem.Test", "%s")
                .with_lookup(convert::TEST_READ_INFO),
            HidInfo::variable("ups.test.result", "UPS.Battery.Test", "%s")
                .with_lookup(convert::TEST_READ_INFO),
            HidInfo::server_side("ups.delay.start", DEFAULT_ONDELAY),
            HidInfo::server_side("ups.delay.shutdown", DEFAULT_OFFDELAY),
            HidInfo::variable("ups.timer.start", "UPS.PowerSummary.DelayBeforeStartup", "%.0f")
                .with_flags(F::QUICK_POLL),
            HidInfo::variable("ups.timer.shutdown", "UPS.PowerSummary.DelayBeforeShutdown", "%.0f")
                .with_flags(F::QUICK_POLL),
            HidInfo::variable("ups.timer.reboot", "UPS.PowerSummary.DelayBeforeReboot", "%.0f")
                .with_flags(F::QUICK_POLL),
            // Input
            HidInfo::variable("input.voltage", "UPS.Input.Voltage", "%.1f"),
            HidInfo::variable("input.voltage.nominal", "UPS.Input.ConfigVoltage", "%.0f")
                .with_flags(F::STATIC),
            HidInfo::variable("input.frequency", "UPS.Input.Frequency", "%.1f"),
            HidInfo::variable("input.transfer.low", "UPS.Input.LowVoltageTransfer", "%.0f")
                .writable(10)
                .with_flags(F::SEMI_STATIC),
            HidInfo::variable("input.transfer.high", "UPS.Input.HighVoltageTransfer", "%.0f")
                .writable(10)
                .with_flags(F::SEMI_STATIC),
            // Output
            HidInfo::variable("output.voltage", "UPS.Output.Voltage", "%.1f"),
            HidInfo::variable("output.voltage.nominal", "UPS.Output.ConfigVoltage", "%.0f")
                .with_flags(F::STATIC),
            HidInfo::variable("output.current", "UPS.Output.Current", "%.2f"),
            HidInfo::variable("output.frequency", "UPS.Output.Frequency", "%.1f"),
            // Outlets
            HidInfo::variable(
                "outlet.%i.switchable",
                "UPS.OutletSystem.Outlet.[%i].PresentStatus.Switchable",
                "%s",
            )
            .with_flags(F::STATIC)
            .with_lookup(convert::YES_NO_INFO),
            HidInfo::variable(
                "outlet.%i.status",
                "UPS.OutletSystem.Outlet.[%i].PresentStatus.SwitchOn/Off",
                "%s",
            )
            .with_lookup(convert::ON_OFF_INFO),
            // Status
            HidInfo::status("UPS.PowerSummary.PresentStatus.ACPresent", convert::ONLINE_INFO)
                .with_flags(F::QUICK_POLL),
            HidInfo::status("UPS.PowerSummary.PresentStatus.Discharging", convert::DISCHARGING_INFO)
                .with_flags(F::QUICK_POLL),
            HidInfo::status("UPS.PowerSummary.PresentStatus.Charging", convert::CHARGING_INFO)
                .with_flags(F::QUICK_POLL),
            HidInfo::status(
                "UPS.PowerSummary.PresentStatus.BelowRemainingCapacityLimit",
                convert::LOWBATT_INFO,
            )
            .with_flags(F::QUICK_POLL),
            HidInfo::status("UPS.PowerSummary.PresentStatus.FullyCharged", convert::FULLYCHARGED_INFO)
                .with_flags(F::QUICK_POLL),
            HidInfo::status(
                "UPS.PowerSummary.PresentStatus.ShutdownImminent",
                convert::SHUTDOWNIMM_INFO,
            )
            .with_flags(F::QUICK_POLL),
            HidInfo::status(
                "UPS.PowerSummary.PresentStatus.RemainingTimeLimitExpired",
                convert::TIMELIMITEXPIRED_INFO,
            )
            .with_flags(F::QUICK_POLL),
            HidInfo::status("UPS.PowerSummary.PresentStatus.Overload", convert::OVERLOAD_INFO),
            HidInfo::status(
                "UPS.PowerSummary.PresentStatus.NeedReplacement",
                convert::REPLACEBATT_INFO,
            ),
            HidInfo::status("UPS.PowerSummary.PresentStatus.BatteryPresent", convert::NOBATTERY_INFO),
            HidInfo::status("UPS.PowerSummary.PresentStatus.Boost", convert::BOOST_INFO),
            HidInfo::status("UPS.PowerSummary.PresentStatus.Buck", convert::TRIM_INFO),
            HidInfo::status("UPS.PowerSummary.PresentStatus.OverTemperature", convert::OVERHEAT_INFO),
            HidInfo::status("UPS.PowerSummary.PresentStatus.InternalFailure", convert::COMMFAULT_INFO),
            HidInfo::status("UPS.PowerSummary.PresentStatus.VoltageOutOfRange", convert::VRANGE_INFO),
            HidInfo::status(
                "UPS.PowerSummary.PresentStatus.FrequencyOutOfRange",
                convert::FRANGE_INFO,
            ),
            HidInfo::status("UPS.PowerSummary.PresentStatus.SwitchOn/Off", convert::OFF_INFO),
            // Commands
            HidInfo::command("test.battery.start.quick", "UPS.BatterySystem.Test", "Quick test")
                .with_lookup(convert::TEST_WRITE_INFO),
            HidInfo::command("test.battery.start.deep", "UPS.BatterySystem.Test", "Deep test")
                .with_lookup(convert::TEST_WRITE_INFO),
            HidInfo::command("test.battery.stop", "UPS.BatterySystem.Test", "Abort test")
                .with_lookup(convert::TEST_WRITE_INFO),
            HidInfo::command("beeper.enable", "UPS.PowerSummary.AudibleAlarmControl", "enabled")
                .with_lookup(convert::BEEPER_INFO),
            HidInfo::command("beeper.disable", "UPS.PowerSummary.AudibleAlarmControl", "disabled")
                .with_lookup(convert::BEEPER_INFO),
            HidInfo::command("beeper.mute", "UPS.PowerSummary.AudibleAlarmControl", "muted")
                .with_lookup(convert::BEEPER_INFO),
            HidInfo::command("load.off.delay", "UPS.PowerSummary.DelayBeforeShutdown", DEFAULT_OFFDELAY),
            HidInfo::command("load.on.delay", "UPS.PowerSummary.DelayBeforeStartup", DEFAULT_ONDELAY),
            HidInfo::command("shutdown.stop", "UPS.PowerSummary.DelayBeforeShutdown", "-1"),
            HidInfo::command("shutdown.reboot", "UPS.PowerSummary.DelayBeforeReboot", "10"),
            HidInfo::command(
                "outlet.%i.load.off",
                "UPS.OutletSystem.Outlet.[%i].DelayBeforeShutdown",
                "0",
            ),
            HidInfo::command(
                "outlet.%i.load.on",
                "UPS.OutletSystem.Outlet.[%i].DelayBeforeStartup",
                "0",
            ),
        ]
    }
}
