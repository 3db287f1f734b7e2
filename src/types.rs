// SPDX-License-Identifier: MIT

//! Newtypes for the values carried by global and local items, so a Report Size
//! cannot be passed where a Report Count is expected.
//!
//! In this document and unless stated otherwise, a reference to "Section a.b.c" refers to the
//! [HID Device Class Definition for HID 1.11](https://www.usb.org/document-library/device-class-definition-hid-111),
//! a reference to the "PDC" refers to the
//! [Usage Tables for HID Power Devices 1.0](https://www.usb.org/document-library/usage-tables-hid-power-devices-10).

/// Conversions in both directions between a newtype and its inner integer.
macro_rules! impl_from {
    ($newtype:ty, $ctor:expr, $to:ty) => {
        impl From<$newtype> for $to {
            fn from(f: $newtype) -> $to {
                f.0
            }
        }
        impl From<&$newtype> for $to {
            fn from(f: &$newtype) -> $to {
                f.0
            }
        }
        impl From<$to> for $newtype {
            fn from(f: $to) -> Self {
                $ctor(f)
            }
        }
    };
}

/// `Display` as the inner integer.
macro_rules! impl_fmt {
    ($newtype:ty, $to:ty) => {
        impl std::fmt::Display for $newtype {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let v: $to = self.into();
                write!(f, "{v}")
            }
        }
    };
}

// ---------- GLOBAL ITEMS ---------------------

/// The upper 16 bits of a 32-bit usage code. The PDC uses 0x84 (Power Device)
/// and 0x85 (Battery System), vendors use the 0xFF00..=0xFFFF range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UsagePage(pub u16);

impl_from!(UsagePage, UsagePage, u16);
impl_fmt!(UsagePage, u16);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalMinimum(pub i32);

impl_from!(LogicalMinimum, LogicalMinimum, i32);
impl_fmt!(LogicalMinimum, i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalMaximum(pub i32);

impl_from!(LogicalMaximum, LogicalMaximum, i32);
impl_fmt!(LogicalMaximum, i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysicalMinimum(pub i32);

impl_from!(PhysicalMinimum, PhysicalMinimum, i32);
impl_fmt!(PhysicalMinimum, i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysicalMaximum(pub i32);

impl_from!(PhysicalMaximum, PhysicalMaximum, i32);
impl_fmt!(PhysicalMaximum, i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unit(pub u32);

impl_from!(Unit, Unit, u32);
impl_fmt!(Unit, u32);

/// A signed power of ten, see Section 6.2.2.7.
///
/// On the wire this is a 4-bit two's complement nibble, but plenty of firmware
/// sends a full signed byte instead. Both forms are accepted by
/// [UnitExponent::from_raw].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UnitExponent(pub i8);

impl UnitExponent {
    /// Interpret the raw item data: values 8..=15 are the negative nibbles -8..=-1,
    /// anything that already is a negative byte is taken as-is.
    pub fn from_raw(raw: u32) -> UnitExponent {
        let value = (raw & 0xff) as u8 as i8;
        if value > 7 {
            UnitExponent(((value as u8) | 0xf0) as i8)
        } else {
            UnitExponent(value)
        }
    }
}

impl_from!(UnitExponent, UnitExponent, i8);
impl_fmt!(UnitExponent, i8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportSize(pub usize);

impl_from!(ReportSize, ReportSize, usize);
impl_fmt!(ReportSize, usize);

/// A report ID. Devices with unnumbered reports (and SHUT devices) use
/// report ID 0, which never appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ReportId(pub u8);

impl ReportId {
    /// True if reports with this ID carry a leading Report ID byte
    pub fn is_numbered(&self) -> bool {
        self.0 != 0
    }
}

impl_from!(ReportId, ReportId, u8);
impl_fmt!(ReportId, u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportCount(pub usize);

impl_from!(ReportCount, ReportCount, usize);
impl_fmt!(ReportCount, usize);

// ----------------- LOCAL ITEMS --------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageId(pub u16);

impl_from!(UsageId, UsageId, u16);
impl_fmt!(UsageId, u16);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageMinimum(pub u32);

impl_from!(UsageMinimum, UsageMinimum, u32);
impl_fmt!(UsageMinimum, u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageMaximum(pub u32);

impl_from!(UsageMaximum, UsageMaximum, u32);
impl_fmt!(UsageMaximum, u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringIndex(pub u32);

impl_from!(StringIndex, StringIndex, u32);
impl_fmt!(StringIndex, u32);
