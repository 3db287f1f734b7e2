// SPDX-License-Identifier: MIT

//! This module splits a HID Report Descriptor into its individual items without
//! interpreting them. The interpretation (collections, global state, data items)
//! happens in [ReportDescriptor](crate::ReportDescriptor).
//!
//! In this document and unless stated otherwise, a reference to "Section a.b.c" refers to the
//! [HID Device Class Definition for HID 1.11](https://www.usb.org/document-library/device-class-definition-hid-111).
//!
//! Items come in three flavors:
//! - [MainItem]s create fields ([MainItem::Input], [MainItem::Output], [MainItem::Feature])
//!   or group them ([MainItem::Collection], [MainItem::EndCollection]).
//! - [GlobalItem]s change the state table for every following main item.
//! - [LocalItem]s only apply to the next main item.
//!
//! Long items (Section 6.2.2.3) are itemized but carry no meaning, as do reserved
//! item types and unknown tags. The interpreter skips them.
//!
//! The [ReportDescriptorBuilder] goes the other way and produces report descriptor bytes,
//! mostly useful for tests and for subdrivers that need to patch a broken descriptor.
//!
//! ```
//! # use hidups::hid::*;
//! let rdesc: Vec<u8> = ReportDescriptorBuilder::new()
//!        .usage_page(0x84)
//!        .usage(0x04) // UPS
//!        .open_collection(CollectionItem::Application)
//!        .report_id(1)
//!        .usage_page(0x85)
//!        .usage(0x66) // RemainingCapacity
//!        .logical_minimum(0)
//!        .logical_maximum(100)
//!        .report_size(8)
//!        .report_count(1)
//!        .feature(DataFlags::variable())
//!        .close_collection()
//!        .build();
//! assert_eq!(rdesc[0..2], [0x05, 0x84]);
//! ```

use crate::types::*;
use crate::{ensure, ParserError};

use thiserror::Error;

/// Whether `bit` is set in `bits`.
fn bit(bits: u32, bit: u8) -> bool {
    bits & (1 << bit) != 0
}

/// Item payload in the shortest little-endian form (1, 2 or 4 bytes) that holds
/// the value. Used when emitting items.
struct HidBytes(Vec<u8>);

impl HidBytes {
    fn take(self) -> Vec<u8> {
        self.0
    }

    /// The two size bits of the item header for these data bytes
    fn size_bits(&self) -> u8 {
        match self.0.len() {
            0 => 0b00,
            1 => 0b01,
            2 => 0b10,
            _ => 0b11,
        }
    }
}

impl From<u32> for HidBytes {
    fn from(value: u32) -> HidBytes {
        let bytes = value.to_le_bytes();
        let cutoff = match value {
            0..=255 => 1,
            256..=0xffff => 2,
            _ => 4,
        };
        HidBytes(bytes[0..cutoff].to_vec())
    }
}

impl From<u16> for HidBytes {
    fn from(value: u16) -> HidBytes {
        HidBytes::from(value as u32)
    }
}

impl From<u8> for HidBytes {
    fn from(value: u8) -> HidBytes {
        HidBytes(vec![value])
    }
}

impl From<i32> for HidBytes {
    fn from(value: i32) -> HidBytes {
        const MIN16: i32 = i16::MIN as i32;
        const MAX16: i32 = i16::MAX as i32;
        let bytes = match value {
            -128..=127 => (value as i8).to_le_bytes().to_vec(),
            MIN16..=MAX16 => (value as i16).to_le_bytes().to_vec(),
            _ => value.to_le_bytes().to_vec(),
        };
        HidBytes(bytes)
    }
}

/// A decoded item payload plus its width, the width decides the sign.
pub(crate) struct HidValue {
    value: u32,
    nbytes: usize,
}

impl HidValue {
    /// Payload width in bytes.
    pub(crate) fn len(&self) -> usize {
        self.nbytes
    }
}

impl TryFrom<&[u8]> for HidValue {
    type Error = HidError;

    /// A zero-length slice is a valid item payload and has the value 0.
    fn try_from(bytes: &[u8]) -> Result<HidValue> {
        let value = match *bytes {
            [] => 0,
            [b0] => b0 as u32,
            [b0, b1] => u16::from_le_bytes([b0, b1]) as u32,
            [b0, b1, b2, b3] => u32::from_le_bytes([b0, b1, b2, b3]),
            _ => {
                return Err(HidError::InvalidData {
                    message: format!("Invalid item data length {}", bytes.len()),
                })
            }
        };
        Ok(HidValue {
            value,
            nbytes: bytes.len(),
        })
    }
}

impl From<&HidValue> for usize {
    fn from(v: &HidValue) -> usize {
        v.value as usize
    }
}

impl From<&HidValue> for u32 {
    fn from(v: &HidValue) -> u32 {
        v.value
    }
}

impl From<&HidValue> for u16 {
    fn from(v: &HidValue) -> u16 {
        (v.value & 0xFFFF) as u16
    }
}

impl From<&HidValue> for u8 {
    fn from(v: &HidValue) -> u8 {
        (v.value & 0xFF) as u8
    }
}

impl From<&HidValue> for i32 {
    /// Sign-interprets the value by the width it was encoded in.
    fn from(v: &HidValue) -> i32 {
        match v.len() {
            1 => ((v.value & 0xFF) as i8) as i32,
            2 => ((v.value & 0xFFFF) as i16) as i32,
            _ => v.value as i32,
        }
    }
}

#[derive(Error, Debug)]
pub enum HidError {
    #[error("Invalid data: {message}")]
    InvalidData { message: String },
    #[error("Insufficient data")]
    InsufficientData,
}

type Result<T> = std::result::Result<T, HidError>;

/// A decoded short item.
///
/// [ItemType::Long] and [ItemType::Reserved] are placeholders: the first for
/// long items, the second for the reserved item type 3 and for main item tags
/// that are not defined by Section 6.2.2.4.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ItemType {
    Main(MainItem),
    Global(GlobalItem),
    Local(LocalItem),
    Long,
    Reserved,
}

impl ItemType {
    /// Return the HID bytes representing this [ItemType].
    ///
    /// ```
    /// # use hidups::hid::*;
    /// # use hidups::types::*;
    /// let item = ItemType::Global(GlobalItem::LogicalMinimum(LogicalMinimum(128)));
    /// let bytes = item.as_bytes();
    /// // LogicalMinimum prefix plus two data bytes for signed 128
    /// assert_eq!(bytes, [0b00010100 + 2, 128, 0]);
    ///
    /// let item2 = ItemType::try_from(bytes.as_slice()).unwrap();
    /// assert_eq!(item, item2);
    /// ```
    ///
    /// Note that [ItemType::Long] and [ItemType::Reserved] return
    /// an empty vector.
    pub fn as_bytes(&self) -> Vec<u8> {
        match self {
            ItemType::Main(item) => item.as_bytes(),
            ItemType::Global(item) => item.as_bytes(),
            ItemType::Local(item) => item.as_bytes(),
            ItemType::Long | ItemType::Reserved => vec![],
        }
    }
}

impl From<MainItem> for ItemType {
    fn from(item: MainItem) -> ItemType {
        ItemType::Main(item)
    }
}

impl From<GlobalItem> for ItemType {
    fn from(item: GlobalItem) -> ItemType {
        ItemType::Global(item)
    }
}

impl From<LocalItem> for ItemType {
    fn from(item: LocalItem) -> ItemType {
        ItemType::Local(item)
    }
}

/// Main Items, see Section 6.2.2.4
///
/// > Main items are used to either define or group certain types of data fields within a
/// > Report descriptor. There are two types of Main items: data and non-data. Data-
/// > type Main items are used to create a field within a report and include Input,
/// > Output, and Feature. Other items do not create fields and are subsequently
/// > referred to as non-data Main items.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MainItem {
    Input(DataFlags),
    Output(DataFlags),
    Feature(DataFlags),
    Collection(CollectionItem),
    EndCollection,
}

impl MainItem {
    pub fn as_bytes(&self) -> Vec<u8> {
        match self {
            MainItem::Input(flags) => flags.as_bytes(0b10000000),
            MainItem::Output(flags) => flags.as_bytes(0b10010000),
            MainItem::Feature(flags) => flags.as_bytes(0b10110000),
            MainItem::Collection(item) => item.as_bytes(),
            MainItem::EndCollection => vec![0b11000000],
        }
    }
}

/// The data flags of an Input, Output or Feature item, see Sections 6.2.2.4 and 6.2.2.5.
///
/// Input items use the same bit layout as Output and Feature items except that
/// bit 7 (volatile) is reserved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataFlags {
    /// This item is constant if `true` (and thus usually padding).
    /// If false, the item refers to a data field.
    pub is_constant: bool,
    /// Array or single variable
    pub is_variable: bool,
    /// Absolute or relative
    pub is_relative: bool,
    /// Data wraps around after exceeding minimum or maximum
    pub wraps: bool,
    /// Raw data has been processed on the device and is no longer linear
    pub is_nonlinear: bool,
    /// Control has no preferred state
    pub has_no_preferred_state: bool,
    /// Control has a neutral state where it does not send meaningful data
    pub has_null_state: bool,
    /// Control may be changed by the device (Output and Feature only)
    pub is_volatile: bool,
    /// The field emits a fixed size stream of bytes
    pub is_buffered_bytes: bool,
}

impl DataFlags {
    /// `Data, Variable, Absolute`, the flags used by nearly every UPS field.
    pub fn variable() -> DataFlags {
        DataFlags {
            is_variable: true,
            ..Default::default()
        }
    }

    /// `Constant`, used for padding bits.
    pub fn constant() -> DataFlags {
        DataFlags {
            is_constant: true,
            ..Default::default()
        }
    }

    fn as_bytes(&self, prefix: u8) -> Vec<u8> {
        let data = HidBytes::from(u32::from(self));
        [vec![prefix | data.size_bits()], data.take()].concat()
    }
}

impl From<u32> for DataFlags {
    fn from(data: u32) -> DataFlags {
        DataFlags {
            is_constant: bit(data, 0),
            is_variable: bit(data, 1),
            is_relative: bit(data, 2),
            wraps: bit(data, 3),
            is_nonlinear: bit(data, 4),
            has_no_preferred_state: bit(data, 5),
            has_null_state: bit(data, 6),
            is_volatile: bit(data, 7),
            is_buffered_bytes: bit(data, 8),
        }
    }
}

impl From<&DataFlags> for u32 {
    fn from(flags: &DataFlags) -> u32 {
        [
            flags.is_constant,
            flags.is_variable,
            flags.is_relative,
            flags.wraps,
            flags.is_nonlinear,
            flags.has_no_preferred_state,
            flags.has_null_state,
            flags.is_volatile,
            flags.is_buffered_bytes,
        ]
        .iter()
        .enumerate()
        .filter(|(_, set)| **set)
        .fold(0, |acc, (idx, _)| acc | (1 << idx))
    }
}

/// See Section 6.2.2.6.
///
/// > A Collection item identifies a relationship between two or more data
/// > (Input, Output, or Feature.) [...] The Collection item opens a
/// > collection of data, the [MainItem::EndCollection] item closes a collection.
///
/// Power devices use vendor-defined collection types (`>= 0x80`) to number
/// repeated collections, e.g. the n-th outlet of an outlet system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CollectionItem {
    Physical,
    Application,
    Logical,
    Report,
    NamedArray,
    UsageSwitch,
    UsageModifier,
    Reserved { value: u8 },
    VendorDefined { value: u8 },
}

impl CollectionItem {
    pub fn as_bytes(&self) -> Vec<u8> {
        vec![0b10100001, u8::from(self)]
    }

    /// The repetition index encoded by a vendor-defined collection type, if any.
    pub fn index(&self) -> Option<u8> {
        match self {
            CollectionItem::VendorDefined { value } => Some(value & 0x7f),
            _ => None,
        }
    }
}

impl From<&CollectionItem> for u8 {
    fn from(c: &CollectionItem) -> u8 {
        match c {
            CollectionItem::Physical => 0x00,
            CollectionItem::Application => 0x01,
            CollectionItem::Logical => 0x02,
            CollectionItem::Report => 0x03,
            CollectionItem::NamedArray => 0x04,
            CollectionItem::UsageSwitch => 0x05,
            CollectionItem::UsageModifier => 0x06,
            CollectionItem::Reserved { value } => *value,
            CollectionItem::VendorDefined { value } => *value,
        }
    }
}

impl From<u8> for CollectionItem {
    fn from(v: u8) -> CollectionItem {
        match v {
            0x00 => CollectionItem::Physical,
            0x01 => CollectionItem::Application,
            0x02 => CollectionItem::Logical,
            0x03 => CollectionItem::Report,
            0x04 => CollectionItem::NamedArray,
            0x05 => CollectionItem::UsageSwitch,
            0x06 => CollectionItem::UsageModifier,
            value @ 0x07..=0x7f => CollectionItem::Reserved { value },
            value @ 0x80..=0xff => CollectionItem::VendorDefined { value },
        }
    }
}

/// See Section 6.2.2.7, a global item applies to all subsequently identified items.
///
/// > Global items describe rather than define data from a control. A new Main item
/// > assumes the characteristics of the item state table. Global items can change the
/// > state table. As a result Global item tags apply to all subsequently defined items
/// > unless overridden by another Global item.
///
/// Logical and physical extents are sign-interpreted by the width of their item data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GlobalItem {
    UsagePage(UsagePage),
    LogicalMinimum(LogicalMinimum),
    LogicalMaximum(LogicalMaximum),
    PhysicalMinimum(PhysicalMinimum),
    PhysicalMaximum(PhysicalMaximum),
    UnitExponent(UnitExponent),
    Unit(Unit),
    ReportSize(ReportSize),
    ReportId(ReportId),
    ReportCount(ReportCount),
    Push,
    Pop,
    Reserved,
}

impl GlobalItem {
    pub fn as_bytes(&self) -> Vec<u8> {
        let prefix = self.prefix();
        let data: Option<HidBytes> = match self {
            GlobalItem::UsagePage(usage_page) => Some(HidBytes::from(u16::from(usage_page))),
            GlobalItem::LogicalMinimum(min) => Some(HidBytes::from(i32::from(min))),
            GlobalItem::LogicalMaximum(max) => Some(HidBytes::from(i32::from(max))),
            GlobalItem::PhysicalMinimum(min) => Some(HidBytes::from(i32::from(min))),
            GlobalItem::PhysicalMaximum(max) => Some(HidBytes::from(i32::from(max))),
            GlobalItem::UnitExponent(exponent) => {
                Some(HidBytes::from((i8::from(exponent) as u8) & 0x0f))
            }
            GlobalItem::Unit(unit) => Some(HidBytes::from(u32::from(unit))),
            GlobalItem::ReportSize(size) => Some(HidBytes::from(usize::from(size) as u32)),
            GlobalItem::ReportId(id) => Some(HidBytes::from(u8::from(id))),
            GlobalItem::ReportCount(count) => Some(HidBytes::from(usize::from(count) as u32)),
            GlobalItem::Push | GlobalItem::Pop | GlobalItem::Reserved => None,
        };
        match data {
            Some(data) => [vec![prefix | data.size_bits()], data.take()].concat(),
            None => vec![prefix],
        }
    }

    pub fn prefix(&self) -> u8 {
        match self {
            GlobalItem::UsagePage(_) => 0b00000100,
            GlobalItem::LogicalMinimum(_) => 0b00010100,
            GlobalItem::LogicalMaximum(_) => 0b00100100,
            GlobalItem::PhysicalMinimum(_) => 0b00110100,
            GlobalItem::PhysicalMaximum(_) => 0b01000100,
            GlobalItem::UnitExponent(_) => 0b01010100,
            GlobalItem::Unit(_) => 0b01100100,
            GlobalItem::ReportSize(_) => 0b01110100,
            GlobalItem::ReportId(_) => 0b10000100,
            GlobalItem::ReportCount(_) => 0b10010100,
            GlobalItem::Push => 0b10100100,
            GlobalItem::Pop => 0b10110100,
            GlobalItem::Reserved => 0b11000100,
        }
    }
}

/// See Section 6.2.2.8, a local item applies to the current [MainItem].
///
/// > Local item tags define characteristics of controls. These items do not carry over to
/// > the next Main item. If a Main item defines more than one control, it may be
/// > preceded by several similar Local item tags. For example, an Input item may
/// > have several Usage tags associated with it, one for each control.
///
/// A Usage item with 4 data bytes carries its own Usage Page and becomes
/// [LocalItem::Usage], shorter ones are a [LocalItem::UsageId] that combines with
/// the current global Usage Page. Designator, String Minimum/Maximum and Delimiter
/// items have no bearing on power devices and are kept as [LocalItem::Other].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocalItem {
    Usage(UsagePage, UsageId),
    UsageId(UsageId),
    UsageMinimum(UsageMinimum),
    UsageMaximum(UsageMaximum),
    StringIndex(StringIndex),
    /// The value is the upper 6 bits of the first byte (`byte[0] & 0xFC`).
    Other {
        prefix: u8,
    },
}

impl LocalItem {
    pub fn as_bytes(&self) -> Vec<u8> {
        let prefix = self.prefix();
        let data = match self {
            LocalItem::Usage(page, id) => {
                let usage = ((u16::from(page) as u32) << 16) | u16::from(id) as u32;
                // Always the 4-byte form, otherwise the page would be lost
                HidBytes(usage.to_le_bytes().to_vec())
            }
            LocalItem::UsageId(id) => HidBytes::from(u16::from(id)),
            LocalItem::UsageMinimum(min) => HidBytes::from(u32::from(min)),
            LocalItem::UsageMaximum(max) => HidBytes::from(u32::from(max)),
            LocalItem::StringIndex(idx) => HidBytes::from(u32::from(idx)),
            LocalItem::Other { .. } => HidBytes(vec![]),
        };
        [vec![prefix | data.size_bits()], data.take()].concat()
    }

    pub fn prefix(&self) -> u8 {
        match self {
            LocalItem::Usage(_, _) => 0b00001000,
            LocalItem::UsageId(_) => 0b00001000,
            LocalItem::UsageMinimum(_) => 0b00011000,
            LocalItem::UsageMaximum(_) => 0b00101000,
            LocalItem::StringIndex(_) => 0b01111000,
            LocalItem::Other { prefix } => *prefix,
        }
    }
}

impl TryFrom<&[u8]> for ItemType {
    type Error = HidError;

    fn try_from(bytes: &[u8]) -> Result<ItemType> {
        ensure!(!bytes.is_empty(), HidError::InsufficientData);
        match (bytes[0] & 0b1100) >> 2 {
            0 => match MainItem::try_from(bytes) {
                Ok(item) => Ok(ItemType::Main(item)),
                Err(HidError::InvalidData { .. }) => Ok(ItemType::Reserved),
                Err(e) => Err(e),
            },
            1 => Ok(ItemType::Global(GlobalItem::try_from(bytes)?)),
            2 => Ok(ItemType::Local(LocalItem::try_from(bytes)?)),
            _ => Ok(ItemType::Reserved),
        }
    }
}

impl TryFrom<&[u8]> for MainItem {
    type Error = HidError;

    fn try_from(bytes: &[u8]) -> Result<MainItem> {
        ensure!(!bytes.is_empty(), HidError::InsufficientData);
        let value = HidValue::try_from(&bytes[1..])?;
        let tag = bytes[0] & 0b11111100;
        match tag {
            0b10000000 => Ok(MainItem::Input(DataFlags::from(u32::from(&value)))),
            0b10010000 => Ok(MainItem::Output(DataFlags::from(u32::from(&value)))),
            0b10110000 => Ok(MainItem::Feature(DataFlags::from(u32::from(&value)))),
            0b10100000 => Ok(MainItem::Collection(CollectionItem::from(u8::from(&value)))),
            0b11000000 => Ok(MainItem::EndCollection),
            _ => Err(HidError::InvalidData {
                message: format!("Invalid item tag {tag:#010b}"),
            }),
        }
    }
}

impl TryFrom<&[u8]> for GlobalItem {
    type Error = HidError;

    fn try_from(bytes: &[u8]) -> Result<GlobalItem> {
        ensure!(!bytes.is_empty(), HidError::InsufficientData);
        let value = HidValue::try_from(&bytes[1..])?;
        let item = match bytes[0] & 0b11111100 {
            0b00000100 => GlobalItem::UsagePage(UsagePage(u16::from(&value))),
            0b00010100 => GlobalItem::LogicalMinimum(LogicalMinimum(i32::from(&value))),
            0b00100100 => GlobalItem::LogicalMaximum(LogicalMaximum(i32::from(&value))),
            0b00110100 => GlobalItem::PhysicalMinimum(PhysicalMinimum(i32::from(&value))),
            0b01000100 => GlobalItem::PhysicalMaximum(PhysicalMaximum(i32::from(&value))),
            0b01010100 => GlobalItem::UnitExponent(UnitExponent::from_raw(u32::from(&value))),
            0b01100100 => GlobalItem::Unit(Unit(u32::from(&value))),
            0b01110100 => GlobalItem::ReportSize(ReportSize(usize::from(&value))),
            0b10000100 => GlobalItem::ReportId(ReportId(u8::from(&value))),
            0b10010100 => GlobalItem::ReportCount(ReportCount(usize::from(&value))),
            0b10100100 => GlobalItem::Push,
            0b10110100 => GlobalItem::Pop,
            _ => GlobalItem::Reserved,
        };

        Ok(item)
    }
}

impl TryFrom<&[u8]> for LocalItem {
    type Error = HidError;

    fn try_from(bytes: &[u8]) -> Result<LocalItem> {
        ensure!(!bytes.is_empty(), HidError::InsufficientData);
        let value = HidValue::try_from(&bytes[1..])?;
        let item = match bytes[0] & 0b11111100 {
            0b00001000 => match value.len() {
                4 => LocalItem::Usage(
                    UsagePage((u32::from(&value) >> 16) as u16),
                    UsageId(u16::from(&value)),
                ),
                _ => LocalItem::UsageId(UsageId(u16::from(&value))),
            },
            0b00011000 => LocalItem::UsageMinimum(UsageMinimum(u32::from(&value))),
            0b00101000 => LocalItem::UsageMaximum(UsageMaximum(u32::from(&value))),
            0b01111000 => LocalItem::StringIndex(StringIndex(u32::from(&value))),
            prefix => LocalItem::Other { prefix },
        };
        Ok(item)
    }
}

/// One item as found in the descriptor bytes, either a short item
/// (Section 6.2.2.2) or a long item (Section 6.2.2.3).
pub trait Item {
    /// Number of descriptor bytes this item occupies, header included.
    fn size(&self) -> usize;

    fn item_type(&self) -> ItemType;

    /// Bits 7..4 of the header for short items, byte 2 for long items.
    fn tag(&self) -> u8;

    fn is_long_item(&self) -> bool;

    /// The payload after the header, `None` if there is none.
    fn data(&self) -> Option<ItemData<'_>>;
}

/// The payload bytes of an [Item].
#[derive(Debug)]
pub struct ItemData<'a> {
    bytes: &'a [u8],
}

impl std::ops::Deref for ItemData<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.bytes
    }
}

impl TryFrom<&ItemData<'_>> for u32 {
    type Error = HidError;

    /// Converts the (little endian) data bytes into a u32.
    fn try_from(data: &ItemData) -> Result<u32> {
        ensure!(!data.is_empty(), HidError::InsufficientData);
        HidValue::try_from(data.bytes).map(|v| u32::from(&v))
    }
}

#[derive(Debug)]
enum RawItem {
    Short(ShortItem),
    Long(LongItem),
}

/// An item together with its byte offset in the descriptor.
#[derive(Debug)]
pub struct ReportDescriptorItem {
    offset: usize,
    item: RawItem,
}

impl ReportDescriptorItem {
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn item(&self) -> &dyn Item {
        match &self.item {
            RawItem::Short(item) => item as &dyn Item,
            RawItem::Long(item) => item as &dyn Item,
        }
    }
}

/// The items of a descriptor in order, not yet interpreted.
#[derive(Debug)]
pub struct ReportDescriptorItems {
    items: Vec<ReportDescriptorItem>,
}

impl std::ops::Deref for ReportDescriptorItems {
    type Target = [ReportDescriptorItem];

    fn deref(&self) -> &Self::Target {
        &self.items
    }
}

impl TryFrom<&[u8]> for ReportDescriptorItems {
    type Error = ParserError;

    fn try_from(bytes: &[u8]) -> crate::Result<Self> {
        itemize(bytes)
    }
}

#[derive(Debug)]
struct ShortItem {
    header: u8,
    item_type: ItemType,
    bytes: Vec<u8>,
}

impl Item for ShortItem {
    fn is_long_item(&self) -> bool {
        false
    }

    fn size(&self) -> usize {
        self.bytes.len()
    }

    fn item_type(&self) -> ItemType {
        self.item_type
    }

    fn tag(&self) -> u8 {
        (self.header & 0b11110000) >> 4
    }


    fn data(&self) -> Option<ItemData<'_>> {
        match self.bytes.len() {
            0 | 1 => None,
            _ => Some(ItemData {
                bytes: &self.bytes[1..],
            }),
        }
    }
}

impl TryFrom<&[u8]> for ShortItem {
    type Error = HidError;

    fn try_from(bytes: &[u8]) -> Result<ShortItem> {
        ensure!(!bytes.is_empty(), HidError::InsufficientData);
        let size = match bytes[0] & 0b0011 {
            0 => 0,
            1 => 1,
            2 => 2,
            _ => 4,
        };
        ensure!(bytes.len() > size, HidError::InsufficientData);
        let item_type = ItemType::try_from(&bytes[0..size + 1])?;

        Ok(ShortItem {
            item_type,
            header: bytes[0],
            bytes: bytes[0..size + 1].to_owned(),
        })
    }
}

const LONG_ITEM_HEADER: u8 = 0b11111110;

#[derive(Debug, Clone)]
struct LongItem {
    bytes: Vec<u8>,
}

impl Item for LongItem {
    fn is_long_item(&self) -> bool {
        true
    }

    fn size(&self) -> usize {
        self.bytes.len()
    }

    fn item_type(&self) -> ItemType {
        ItemType::Long
    }

    fn tag(&self) -> u8 {
        self.bytes[2]
    }


    fn data(&self) -> Option<ItemData<'_>> {
        match self.bytes.len() {
            0..=3 => None,
            _ => Some(ItemData {
                bytes: &self.bytes[3..],
            }),
        }
    }
}

impl TryFrom<&[u8]> for LongItem {
    type Error = HidError;

    fn try_from(bytes: &[u8]) -> Result<LongItem> {
        ensure!(bytes.len() >= 3, HidError::InsufficientData);
        if bytes[0] != LONG_ITEM_HEADER {
            return Err(HidError::InvalidData {
                message: "Item is not a long item".into(),
            });
        }
        let size = bytes[1] as usize + 3;
        ensure!(bytes.len() >= size, HidError::InsufficientData);

        Ok(LongItem {
            bytes: bytes[0..size].to_owned(),
        })
    }
}

fn itemize(bytes: &[u8]) -> crate::Result<ReportDescriptorItems> {
    let mut offset = 0;
    let mut items: Vec<ReportDescriptorItem> = Vec::new();
    while offset < bytes.len() {
        let remainder = &bytes[offset..];
        let item = if remainder[0] == LONG_ITEM_HEADER {
            LongItem::try_from(remainder).map(RawItem::Long)
        } else {
            ShortItem::try_from(remainder).map(RawItem::Short)
        };
        let item = item.map_err(|e| match e {
            HidError::InsufficientData => ParserError::Truncated { offset },
            HidError::InvalidData { message } => ParserError::InvalidData { offset, message },
        })?;
        let item = ReportDescriptorItem { offset, item };
        offset += item.item().size();
        items.push(item);
    }
    Ok(ReportDescriptorItems { items })
}

/// A struct for programatically building a HID Report Descriptor.
///
/// Items are emitted in the order they are appended, the builder does **not**
/// validate them. Collections must be closed by the caller.
///
/// ```
/// # use hidups::hid::*;
/// let rdesc: Vec<u8> = ReportDescriptorBuilder::new()
///        .usage_page(0x84)
///        .usage(0x04)
///        .open_collection(CollectionItem::Application)
///        .push()
///        .logical_minimum(-1)
///        .logical_maximum(0x7fff)
///        .report_size(16)
///        .report_count(1)
///        .usage(0x57)
///        .feature(DataFlags::variable())
///        .pop()
///        .close_collection()
///        .build();
/// ```
#[derive(Debug, Default, Clone)]
pub struct ReportDescriptorBuilder {
    items: Vec<ItemType>,
}

impl ReportDescriptorBuilder {
    /// Create a new builder
    pub fn new() -> ReportDescriptorBuilder {
        ReportDescriptorBuilder::default()
    }

    /// Append an item to this builder. This will append the necesssary
    /// bytes once [ReportDescriptorBuilder::build()] is called.
    pub fn append(mut self, item: ItemType) -> Self {
        self.items.push(item);
        self
    }

    fn global(self, item: GlobalItem) -> Self {
        self.append(ItemType::Global(item))
    }

    fn local(self, item: LocalItem) -> Self {
        self.append(ItemType::Local(item))
    }

    pub fn usage_page(self, usage_page: u16) -> Self {
        self.global(GlobalItem::UsagePage(UsagePage(usage_page)))
    }

    /// A Usage that combines with the current Usage Page
    pub fn usage(self, usage_id: u16) -> Self {
        self.local(LocalItem::UsageId(UsageId(usage_id)))
    }

    /// A Usage that carries its own Usage Page in the upper 16 bits
    pub fn extended_usage(self, usage: u32) -> Self {
        self.local(LocalItem::Usage(
            UsagePage((usage >> 16) as u16),
            UsageId((usage & 0xffff) as u16),
        ))
    }

    pub fn usage_minimum(self, minimum: u32) -> Self {
        self.local(LocalItem::UsageMinimum(UsageMinimum(minimum)))
    }

    pub fn usage_maximum(self, maximum: u32) -> Self {
        self.local(LocalItem::UsageMaximum(UsageMaximum(maximum)))
    }

    pub fn logical_minimum(self, minimum: i32) -> Self {
        self.global(GlobalItem::LogicalMinimum(LogicalMinimum(minimum)))
    }

    pub fn logical_maximum(self, maximum: i32) -> Self {
        self.global(GlobalItem::LogicalMaximum(LogicalMaximum(maximum)))
    }

    pub fn physical_minimum(self, minimum: i32) -> Self {
        self.global(GlobalItem::PhysicalMinimum(PhysicalMinimum(minimum)))
    }

    pub fn physical_maximum(self, maximum: i32) -> Self {
        self.global(GlobalItem::PhysicalMaximum(PhysicalMaximum(maximum)))
    }

    pub fn unit(self, unit: u32) -> Self {
        self.global(GlobalItem::Unit(Unit(unit)))
    }

    /// Encoded as a 4-bit nibble, so `exponent` must be in -8..=7.
    pub fn unit_exponent(self, exponent: i8) -> Self {
        self.global(GlobalItem::UnitExponent(UnitExponent(exponent)))
    }

    pub fn report_id(self, report_id: u8) -> Self {
        self.global(GlobalItem::ReportId(ReportId(report_id)))
    }

    pub fn report_size(self, size: usize) -> Self {
        self.global(GlobalItem::ReportSize(ReportSize(size)))
    }

    pub fn report_count(self, count: usize) -> Self {
        self.global(GlobalItem::ReportCount(ReportCount(count)))
    }

    pub fn push(self) -> Self {
        self.global(GlobalItem::Push)
    }

    pub fn pop(self) -> Self {
        self.global(GlobalItem::Pop)
    }

    /// Open a new collection. This collection must be
    /// closed with a call to [close_collection()](Self::close_collection).
    pub fn open_collection(self, collection: CollectionItem) -> Self {
        self.append(ItemType::Main(MainItem::Collection(collection)))
    }

    pub fn close_collection(self) -> Self {
        self.append(ItemType::Main(MainItem::EndCollection))
    }

    pub fn input(self, flags: DataFlags) -> Self {
        self.append(ItemType::Main(MainItem::Input(flags)))
    }

    pub fn output(self, flags: DataFlags) -> Self {
        self.append(ItemType::Main(MainItem::Output(flags)))
    }

    pub fn feature(self, flags: DataFlags) -> Self {
        self.append(ItemType::Main(MainItem::Feature(flags)))
    }

    /// Append the Usage Page of the given [hut] usage page.
    ///
    /// This only appends the Usage Page, not a Usage.
    #[cfg(feature = "hut")]
    pub fn hut_usage_page(self, usage_page: impl hut::AsUsagePage) -> Self {
        self.usage_page(usage_page.usage_page_value())
    }

    /// Append the given [hut] usage in its 4-byte form, including its Usage Page.
    #[cfg(feature = "hut")]
    pub fn hut_usage(self, usage: impl hut::AsUsage) -> Self {
        self.extended_usage(usage.usage_value())
    }

    /// Produce the report descriptor bytes.
    pub fn build(self) -> Vec<u8> {
        self.items.iter().flat_map(|item| item.as_bytes()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_size() {
        for size in 0..4 {
            let itype = 0b100; // Global
            let tag = 0b00010000; // Logical Minimum
            let bytes: [u8; 5] = [tag | itype | size, 1, 2, 3, 4];
            let bytes = bytes.as_slice();

            let item = ShortItem::try_from(bytes).unwrap();
            match size {
                0 => assert_eq!(item.size(), 1),
                1 => assert_eq!(item.size(), 2),
                2 => assert_eq!(item.size(), 3),
                3 => assert_eq!(item.size(), 5),
                _ => panic!("Size {size} cannot happen"),
            }
        }
    }

    #[test]
    fn item_type() {
        let itype = 0b10110000; // Feature
        let bytes: [u8; 2] = [itype | 1, 0b00000010];

        let item = ShortItem::try_from(bytes.as_slice()).unwrap();
        match item.item_type() {
            ItemType::Main(MainItem::Feature(flags)) => {
                assert!(flags.is_variable);
                assert!(!flags.is_constant);
            }
            t => panic!("Wrong item type {t:?}"),
        }
    }

    #[test]
    fn item_data() {
        let bytes: [u8; 3] = [0b00100110, 0xff, 0x7f]; // Logical Maximum, 2 bytes
        let item = ShortItem::try_from(bytes.as_slice()).unwrap();
        let data = item.data().unwrap();
        assert_eq!(u32::try_from(&data).unwrap(), 0x7fff);

        let bytes: [u8; 1] = [0b11000000]; // End Collection
        let item = ShortItem::try_from(bytes.as_slice()).unwrap();
        assert!(item.data().is_none());
    }

    #[test]
    fn signed_extents() {
        // Logical Minimum, 1 byte, -1
        let item = GlobalItem::try_from([0x15, 0xff].as_slice()).unwrap();
        assert_eq!(item, GlobalItem::LogicalMinimum(LogicalMinimum(-1)));
        // Logical Maximum, 2 bytes 0xffff is -1 too
        let item = GlobalItem::try_from([0x26, 0xff, 0xff].as_slice()).unwrap();
        assert_eq!(item, GlobalItem::LogicalMaximum(LogicalMaximum(-1)));
        // Logical Maximum, 4 bytes 0x0000ffff is 65535
        let item = GlobalItem::try_from([0x27, 0xff, 0xff, 0x00, 0x00].as_slice()).unwrap();
        assert_eq!(item, GlobalItem::LogicalMaximum(LogicalMaximum(65535)));
        // Logical Minimum without data is 0
        let item = GlobalItem::try_from([0x14].as_slice()).unwrap();
        assert_eq!(item, GlobalItem::LogicalMinimum(LogicalMinimum(0)));
    }

    #[test]
    fn unit_exponent_item() {
        let item = GlobalItem::try_from([0x55, 0x0e].as_slice()).unwrap();
        assert_eq!(item, GlobalItem::UnitExponent(UnitExponent(-2)));
        assert_eq!(item.as_bytes(), [0x55, 0x0e]);
    }

    #[test]
    fn usage_forms() {
        let item = LocalItem::try_from([0x09, 0x66].as_slice()).unwrap();
        assert_eq!(item, LocalItem::UsageId(UsageId(0x66)));

        let item = LocalItem::try_from([0x0b, 0x66, 0x00, 0x85, 0x00].as_slice()).unwrap();
        assert_eq!(item, LocalItem::Usage(UsagePage(0x85), UsageId(0x66)));
        assert_eq!(item.as_bytes(), [0x0b, 0x66, 0x00, 0x85, 0x00]);
    }

    #[test]
    fn collection_index() {
        let item = MainItem::try_from([0xa1, 0x81].as_slice()).unwrap();
        match item {
            MainItem::Collection(c) => assert_eq!(c.index(), Some(1)),
            _ => panic!("Expected a collection"),
        }
        assert_eq!(CollectionItem::Physical.index(), None);
    }

    #[test]
    fn unknown_main_tag_is_reserved() {
        // tag 0b1101 is not a defined main item
        let item = ItemType::try_from([0xd1, 0x00].as_slice()).unwrap();
        assert_eq!(item, ItemType::Reserved);
    }

    #[test]
    fn long_items_are_skipped() {
        let bytes = [0x05, 0x84, 0xfe, 0x02, 0x10, 0xaa, 0xbb, 0xc0];
        let items = ReportDescriptorItems::try_from(bytes.as_slice()).unwrap();
        assert_eq!(items.len(), 3);
        let long = items[1].item();
        assert!(long.is_long_item());
        assert_eq!(long.size(), 5);
        assert_eq!(long.tag(), 0x10);
        assert_eq!(items[2].offset(), 7);
    }

    #[test]
    fn truncated_descriptor() {
        // Logical Maximum claims 2 bytes but only has one
        let bytes = [0x05, 0x84, 0x26, 0xff];
        let err = ReportDescriptorItems::try_from(bytes.as_slice()).unwrap_err();
        assert!(matches!(err, ParserError::Truncated { offset: 2 }));

        let bytes = [0xfe, 0x04, 0x10, 0x00];
        let err = ReportDescriptorItems::try_from(bytes.as_slice()).unwrap_err();
        assert!(matches!(err, ParserError::Truncated { offset: 0 }));
    }

    #[test]
    fn data_flags_roundtrip() {
        let flags = DataFlags {
            is_variable: true,
            is_volatile: true,
            is_buffered_bytes: true,
            ..Default::default()
        };
        assert_eq!(u32::from(&flags), 0b110000010);
        assert_eq!(DataFlags::from(0b110000010), flags);
        // Buffered bytes needs a 2-byte item
        assert_eq!(MainItem::Feature(flags).as_bytes(), [0xb2, 0x82, 0x01]);
        assert_eq!(MainItem::Input(DataFlags::constant()).as_bytes(), [0x81, 0x01]);
    }

    #[test]
    fn builder_example() {
        let rdesc = ReportDescriptorBuilder::new()
            .usage_page(0x84)
            .usage(0x04)
            .open_collection(CollectionItem::Application)
            .report_id(0x21)
            .usage(0x24)
            .open_collection(CollectionItem::Physical)
            .usage_page(0x85)
            .usage(0x66)
            .logical_minimum(0)
            .logical_maximum(255)
            .report_size(8)
            .report_count(1)
            .unit_exponent(-1)
            .feature(DataFlags::variable())
            .close_collection()
            .close_collection()
            .build();

        #[rustfmt::skip]
        let expected: [u8; 27] = [
            0x05, 0x84,        // Usage Page (Power Device)
            0x09, 0x04,        // Usage (UPS)
            0xa1, 0x01,        // Collection (Application)
            0x85, 0x21,        //   Report ID (33)
            0x09, 0x24,        //   Usage (PowerSummary)
            0xa1, 0x00,        //   Collection (Physical)
            0x05, 0x85,        //     Usage Page (Battery System)
            0x09, 0x66,        //     Usage (RemainingCapacity)
            0x15, 0x00,        //     Logical Minimum (0)
            0x26, 0xff, 0x00,  //     Logical Maximum (255)
            0x75, 0x08,        //     Report Size (8)
            0x95, 0x01,        //     Report Count (1)
            0x55, 0x0f,        //     Unit Exponent (-1)
        ];
        assert_eq!(rdesc[..27], expected);
        assert_eq!(rdesc[27..], [0xb1, 0x02, 0xc0, 0xc0]);
    }

    #[cfg(feature = "hut")]
    #[test]
    fn builder_with_hut() {
        use hut::{AsUsage, GenericDesktop};

        let rdesc = ReportDescriptorBuilder::new()
            .hut_usage_page(hut::UsagePage::GenericDesktop)
            .hut_usage(GenericDesktop::Pointer)
            .build();
        let pointer = GenericDesktop::Pointer.usage_value();
        assert_eq!(rdesc[0..2], [0x05, 0x01]);
        assert_eq!(rdesc[2], 0x0b);
        assert_eq!(rdesc[3..7], pointer.to_le_bytes());
    }
}
