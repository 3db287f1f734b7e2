// SPDX-License-Identifier: MIT

//! An interpreter for HID Power Device report descriptors and the data access
//! layer a UPS driver builds on top of it.
//!
//! The pieces, bottom-up:
//! - [hid] splits the descriptor bytes into items, [ReportDescriptor] interprets them
//!   into a flat list of [DataItem]s, each with its usage [Path](path::Path) and
//!   location inside its report.
//! - [path::PathIndex] finds items by their rendered path (`UPS.PowerSummary.RemainingCapacity`).
//! - [report::ReportCache] holds the most recent bytes of each report.
//! - [codec] converts between report bits and physical values.
//! - [access] combines the above into `get_value`/`set_value` and
//!   [Session] wraps it around a [Transport].
//! - [subdriver] and [walker] map HID paths to driver variables, status flags and commands.
//!
//! ```
//! use hidups::hid::*;
//! use hidups::usage::UsageTables;
//! use hidups::{ItemKind, ReportDescriptor};
//!
//! let bytes = ReportDescriptorBuilder::new()
//!     .usage_page(0x84)
//!     .usage(0x04) // UPS
//!     .open_collection(CollectionItem::Application)
//!     .usage(0x24) // PowerSummary
//!     .open_collection(CollectionItem::Physical)
//!     .report_id(1)
//!     .usage_page(0x85)
//!     .usage(0x66) // RemainingCapacity
//!     .logical_minimum(0)
//!     .logical_maximum(100)
//!     .report_size(8)
//!     .report_count(1)
//!     .feature(DataFlags::variable())
//!     .close_collection()
//!     .close_collection()
//!     .build();
//!
//! let rdesc = ReportDescriptor::parse(&bytes, &UsageTables::standard()).unwrap();
//! let item = &rdesc.items()[0];
//! assert_eq!(item.path.to_string(), "UPS.PowerSummary.RemainingCapacity");
//! assert_eq!(item.kind, ItemKind::Feature);
//! assert_eq!((item.report_id, item.offset, item.size), (1, 0, 8));
//! assert_eq!(rdesc.report_len(1), Some(2));
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Return early with the given error if the condition does not hold.
macro_rules! ensure {
    ($cond:expr, $err:expr $(,)?) => {
        if !$cond {
            return Err($err);
        }
    };
}
pub(crate) use ensure;

pub mod access;
pub mod codec;
pub mod config;
pub mod convert;
pub mod hid;
pub mod path;
pub mod report;
pub mod session;
pub mod status;
pub mod subdriver;
pub mod transport;
pub mod types;
pub mod usage;
pub mod walker;

use hid::*;
use path::{Path, PathComponent};
use usage::UsageTables;

pub use access::{AccessError, AccessResult};
pub use codec::CodecError;
pub use config::Config;
pub use session::Session;
pub use transport::{Transport, TransportError};
pub use types::*;

/// Reports larger than this cannot be transferred by a control request.
const MAX_REPORT_BITS: u32 = 0xffff * 8;

/// The report type a [DataItem] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub enum ItemKind {
    #[default]
    Input,
    Output,
    Feature,
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ItemKind::Input => "Input",
            ItemKind::Output => "Output",
            ItemKind::Feature => "Feature",
        };
        write!(f, "{s}")
    }
}

/// One addressable value inside a report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataItem {
    pub path: Path,
    /// 0 if the device does not use numbered reports
    pub report_id: u8,
    pub kind: ItemKind,
    /// Bit offset from the start of the report payload, excluding the Report ID byte
    pub offset: u32,
    /// Size in bits, 1..=32
    pub size: u8,
    pub is_signed: bool,
    pub unit_exponent: i8,
    pub unit: u32,
    pub logical_min: i64,
    pub logical_max: i64,
    pub physical_min: Option<i32>,
    pub physical_max: Option<i32>,
    /// Declared with the Constant flag
    pub is_constant: bool,
}

impl DataItem {
    /// Input items and constant items cannot be written.
    pub fn is_writable(&self) -> bool {
        self.kind != ItemKind::Input && !self.is_constant
    }

    /// The bit offset inside a report buffer, accounting for the Report ID byte.
    pub fn buffer_offset(&self) -> usize {
        let id_bits = if self.report_id != 0 { 8 } else { 0 };
        self.offset as usize + id_bits
    }
}

#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Invalid data at offset {offset}: {message}")]
    InvalidData { offset: usize, message: String },
    #[error("Report descriptor is truncated in the item at offset {offset}")]
    Truncated { offset: usize },
    #[error("End Collection without matching Collection at offset {offset}")]
    UnbalancedCollection { offset: usize },
    #[error("Pop without matching Push at offset {offset}")]
    UnbalancedPop { offset: usize },
    #[error("Missing context at offset {offset}: {message}")]
    MissingContext { offset: usize, message: String },
    #[error("Report {report_id} exceeds the maximum report length at offset {offset}")]
    BitOffsetOverflow { offset: usize, report_id: u8 },
}

type Result<T> = std::result::Result<T, ParserError>;

/// The interpreted report descriptor: every data item with a usage, and the
/// length of every report.
#[derive(Debug, Default)]
pub struct ReportDescriptor {
    items: Vec<Arc<DataItem>>,
    /// Payload length in bytes, excluding the Report ID byte
    report_lengths: HashMap<(u8, ItemKind), usize>,
}

impl ReportDescriptor {
    /// Interpret `bytes`, naming path components with `tables`.
    pub fn parse(bytes: &[u8], tables: &UsageTables) -> Result<ReportDescriptor> {
        parse_report_descriptor(bytes, tables)
    }

    /// Like [ReportDescriptor::parse] but let `fixup` patch a copy of the bytes
    /// first. Also returns whether `fixup` reported a change.
    pub fn parse_with_fixup<F>(
        bytes: &[u8],
        tables: &UsageTables,
        fixup: F,
    ) -> Result<(ReportDescriptor, bool)>
    where
        F: FnOnce(&mut [u8]) -> bool,
    {
        let mut patched = bytes.to_vec();
        let changed = fixup(&mut patched);
        let rdesc = parse_report_descriptor(&patched, tables)?;
        Ok((rdesc, changed))
    }

    /// All data items in declaration order.
    pub fn items(&self) -> &[Arc<DataItem>] {
        &self.items
    }

    pub fn items_in_report(
        &self,
        report_id: u8,
        kind: ItemKind,
    ) -> impl Iterator<Item = &Arc<DataItem>> {
        self.items
            .iter()
            .filter(move |item| item.report_id == report_id && item.kind == kind)
    }

    /// The sorted set of report IDs used by any report type.
    pub fn report_ids(&self) -> Vec<u8> {
        let mut ids: Vec<u8> = self.report_lengths.keys().map(|(id, _)| *id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// The payload length of one report type, excluding the Report ID byte.
    pub fn payload_len(&self, report_id: u8, kind: ItemKind) -> Option<usize> {
        self.report_lengths.get(&(report_id, kind)).copied()
    }

    /// The length of a report buffer on the wire, including the Report ID byte
    /// for numbered reports. Where several report types share an ID this is
    /// the largest of them.
    pub fn report_len(&self, report_id: u8) -> Option<usize> {
        let id_len = usize::from(report_id != 0);
        self.report_lengths
            .iter()
            .filter(|((id, _), _)| *id == report_id)
            .map(|(_, len)| len + id_len)
            .max()
    }

    /// True if the device uses numbered reports.
    pub fn is_numbered(&self) -> bool {
        self.report_lengths.keys().any(|(id, _)| *id != 0)
    }
}

impl TryFrom<&[u8]> for ReportDescriptor {
    type Error = ParserError;

    /// Parse with the standard usage tables only.
    fn try_from(bytes: &[u8]) -> Result<ReportDescriptor> {
        parse_report_descriptor(bytes, &UsageTables::standard())
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Globals {
    usage_page: Option<UsagePage>,
    logical_minimum: Option<LogicalMinimum>,
    logical_maximum: Option<LogicalMaximum>,
    /// The Logical Maximum data read as unsigned
    logical_maximum_raw: Option<u32>,
    physical_minimum: Option<PhysicalMinimum>,
    physical_maximum: Option<PhysicalMaximum>,
    unit_exponent: Option<UnitExponent>,
    unit: Option<Unit>,
    report_size: Option<ReportSize>,
    report_id: Option<ReportId>,
    report_count: Option<ReportCount>,
}

impl Globals {
    fn usage(&self, id: u32) -> u32 {
        let page = self.usage_page.map(u16::from).unwrap_or(0) as u32;
        (page << 16) | (id & 0xffff)
    }
}

#[derive(Clone, Debug, Default)]
struct Locals {
    /// Full 32-bit usages in declaration order
    usages: Vec<u32>,
    usage_minimum: Option<u32>,
    usage_maximum: Option<u32>,
}

#[derive(Debug)]
struct Stack {
    globals: Vec<Globals>,
    locals: Locals,
    /// The path components each open collection contributed
    collections: Vec<Vec<PathComponent>>,
    /// Running bit offsets per report
    offsets: HashMap<(u8, ItemKind), u32>,
}

impl Stack {
    fn new() -> Self {
        Stack {
            globals: vec![Globals::default()],
            locals: Locals::default(),
            collections: vec![],
            offsets: HashMap::new(),
        }
    }

    fn globals(&mut self) -> &mut Globals {
        // The base entry can never be popped
        let last = self.globals.len() - 1;
        &mut self.globals[last]
    }

    fn globals_const(&self) -> &Globals {
        &self.globals[self.globals.len() - 1]
    }

    fn push(&mut self) {
        let current = *self.globals_const();
        self.globals.push(current);
    }

    fn pop(&mut self, offset: usize) -> Result<()> {
        ensure!(self.globals.len() > 1, ParserError::UnbalancedPop { offset });
        self.globals.pop();
        Ok(())
    }

    fn reset_locals(&mut self) {
        self.locals = Locals::default();
    }

    fn path_prefix(&self) -> Path {
        Path::from(self.collections.iter().flatten().copied().collect::<Vec<_>>())
    }
}

fn component(usage: u32, tables: &UsageTables) -> PathComponent {
    match tables.name_of(usage) {
        Some(name) => PathComponent::Named { code: usage, name },
        None => PathComponent::Code(usage),
    }
}

/// Expand a completed Usage Minimum/Maximum pair into the usage list.
fn compile_usage_range(locals: &mut Locals, offset: usize) -> Result<()> {
    if let (Some(min), Some(max)) = (locals.usage_minimum, locals.usage_maximum) {
        ensure!(
            min <= max && (max >> 16) == (min >> 16),
            ParserError::InvalidData {
                offset,
                message: format!("Invalid usage range {min:08x}..={max:08x}"),
            }
        );
        locals.usages.extend(min..=max);
        locals.usage_minimum = None;
        locals.usage_maximum = None;
    }
    Ok(())
}

fn handle_collection(
    collection: &CollectionItem,
    stack: &mut Stack,
    tables: &UsageTables,
) {
    let usage = stack.locals.usages.first().copied().unwrap_or(0);
    let mut frame = vec![component(usage, tables)];
    if let Some(index) = collection.index() {
        frame.push(PathComponent::Index(index as u32));
    }
    stack.collections.push(frame);
    stack.reset_locals();
}

fn handle_main_item(
    item: &MainItem,
    offset: usize,
    stack: &mut Stack,
    tables: &UsageTables,
    rdesc: &mut ReportDescriptor,
) -> Result<()> {
    let (kind, flags) = match item {
        MainItem::Input(flags) => (ItemKind::Input, flags),
        MainItem::Output(flags) => (ItemKind::Output, flags),
        MainItem::Feature(flags) => (ItemKind::Feature, flags),
        MainItem::Collection(_) | MainItem::EndCollection => return Ok(()),
    };

    ensure!(
        stack.locals.usage_minimum.is_none() && stack.locals.usage_maximum.is_none(),
        ParserError::MissingContext {
            offset,
            message: "Usage Minimum without Usage Maximum or vice versa".into(),
        }
    );
    ensure!(
        stack.locals.usages.is_empty() || !stack.collections.is_empty(),
        ParserError::MissingContext {
            offset,
            message: format!("{kind} item outside of any collection"),
        }
    );

    let globals = *stack.globals_const();
    let report_id = globals.report_id.map(u8::from).unwrap_or(0);
    let report_size = globals.report_size.map(usize::from).unwrap_or(0);
    let report_count = globals.report_count.map(usize::from).unwrap_or(0);

    let overflow = ParserError::BitOffsetOverflow { offset, report_id };
    let start = stack.offsets.get(&(report_id, kind)).copied().unwrap_or(0);
    let nbits = report_size
        .checked_mul(report_count)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| ParserError::BitOffsetOverflow { offset, report_id })?;
    let end = start.checked_add(nbits).ok_or(overflow)?;
    ensure!(
        end <= MAX_REPORT_BITS,
        ParserError::BitOffsetOverflow { offset, report_id }
    );
    stack.offsets.insert((report_id, kind), end);
    if nbits > 0 {
        let len = end.div_ceil(8) as usize;
        let entry = rdesc.report_lengths.entry((report_id, kind)).or_insert(0);
        *entry = (*entry).max(len);
    }

    // Fields wider than 32 bits and zero-sized fields only take up space
    let usages = std::mem::take(&mut stack.locals.usages);
    if usages.is_empty() || report_size == 0 || report_size > 32 {
        return Ok(());
    }

    let logical_min = globals.logical_minimum.map(i32::from).unwrap_or(0) as i64;
    let logical_max = match globals.logical_maximum.map(i32::from) {
        // Firmware that declares e.g. 0..255 in a single byte
        Some(max) if (max as i64) < logical_min => {
            globals.logical_maximum_raw.unwrap_or(max as u32) as i64
        }
        Some(max) => max as i64,
        None => 0,
    };
    let prefix = stack.path_prefix();

    for k in 0..report_count {
        let (usage, suffix) = match usages.as_slice() {
            [usage] if report_count > 1 => (*usage, Some(k as u32)),
            usages => match usages.get(k) {
                Some(usage) => (*usage, None),
                None => break,
            },
        };
        let mut path = prefix.clone();
        path.push(component(usage, tables));
        if let Some(n) = suffix {
            path.push(PathComponent::Index(n));
        }
        let item = DataItem {
            path,
            report_id,
            kind,
            offset: start + (k * report_size) as u32,
            size: report_size as u8,
            is_signed: logical_min < 0,
            unit_exponent: globals.unit_exponent.map(i8::from).unwrap_or(0),
            unit: globals.unit.map(u32::from).unwrap_or(0),
            logical_min,
            logical_max,
            physical_min: globals.physical_minimum.map(i32::from),
            physical_max: globals.physical_maximum.map(i32::from),
            is_constant: flags.is_constant,
        };
        rdesc.items.push(Arc::new(item));
    }

    Ok(())
}

macro_rules! update_stack {
    ($stack:ident, $which:ident, $from:expr) => {
        $stack.globals().$which = Some($from);
    };
}

fn parse_report_descriptor(bytes: &[u8], tables: &UsageTables) -> Result<ReportDescriptor> {
    let items = hid::ReportDescriptorItems::try_from(bytes)?;

    let mut stack = Stack::new();
    let mut rdesc = ReportDescriptor::default();

    for rdesc_item in items.iter() {
        let offset = rdesc_item.offset();
        let item = rdesc_item.item();
        match item.item_type() {
            ItemType::Main(MainItem::Collection(c)) => {
                handle_collection(&c, &mut stack, tables);
            }
            ItemType::Main(MainItem::EndCollection) => {
                ensure!(
                    stack.collections.pop().is_some(),
                    ParserError::UnbalancedCollection { offset }
                );
                stack.reset_locals();
            }
            ItemType::Main(main) => {
                handle_main_item(&main, offset, &mut stack, tables, &mut rdesc)?;
                stack.reset_locals();
            }
            ItemType::Long | ItemType::Reserved => {}
            ItemType::Global(GlobalItem::UsagePage(usage_page)) => {
                update_stack!(stack, usage_page, usage_page);
            }
            ItemType::Global(GlobalItem::LogicalMinimum(minimum)) => {
                update_stack!(stack, logical_minimum, minimum);
            }
            ItemType::Global(GlobalItem::LogicalMaximum(maximum)) => {
                let raw = item
                    .data()
                    .and_then(|data| u32::try_from(&data).ok())
                    .unwrap_or(0);
                update_stack!(stack, logical_maximum, maximum);
                update_stack!(stack, logical_maximum_raw, raw);
            }
            ItemType::Global(GlobalItem::PhysicalMinimum(minimum)) => {
                update_stack!(stack, physical_minimum, minimum);
            }
            ItemType::Global(GlobalItem::PhysicalMaximum(maximum)) => {
                update_stack!(stack, physical_maximum, maximum);
            }
            ItemType::Global(GlobalItem::UnitExponent(exponent)) => {
                update_stack!(stack, unit_exponent, exponent);
            }
            ItemType::Global(GlobalItem::Unit(unit)) => {
                update_stack!(stack, unit, unit);
            }
            ItemType::Global(GlobalItem::ReportSize(size)) => {
                update_stack!(stack, report_size, size);
            }
            ItemType::Global(GlobalItem::ReportId(id)) => {
                update_stack!(stack, report_id, id);
            }
            ItemType::Global(GlobalItem::ReportCount(count)) => {
                update_stack!(stack, report_count, count);
            }
            ItemType::Global(GlobalItem::Push) => stack.push(),
            ItemType::Global(GlobalItem::Pop) => stack.pop(offset)?,
            ItemType::Global(GlobalItem::Reserved) => {}
            ItemType::Local(LocalItem::Usage(page, id)) => {
                let usage = ((u16::from(page) as u32) << 16) | u16::from(id) as u32;
                stack.locals.usages.push(usage);
            }
            ItemType::Local(LocalItem::UsageId(id)) => {
                let usage = stack.globals_const().usage(u16::from(id) as u32);
                stack.locals.usages.push(usage);
            }
            ItemType::Local(LocalItem::UsageMinimum(minimum)) => {
                let minimum = u32::from(minimum);
                let usage = match minimum {
                    0..=0xffff => stack.globals_const().usage(minimum),
                    _ => minimum,
                };
                stack.locals.usage_minimum = Some(usage);
                compile_usage_range(&mut stack.locals, offset)?;
            }
            ItemType::Local(LocalItem::UsageMaximum(maximum)) => {
                let maximum = u32::from(maximum);
                let usage = match maximum {
                    0..=0xffff => stack.globals_const().usage(maximum),
                    _ => maximum,
                };
                stack.locals.usage_maximum = Some(usage);
                compile_usage_range(&mut stack.locals, offset)?;
            }
            ItemType::Local(LocalItem::StringIndex(_)) => {}
            ItemType::Local(LocalItem::Other { .. }) => {}
        };
    }

    Ok(rdesc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ups() -> ReportDescriptorBuilder {
        ReportDescriptorBuilder::new()
            .usage_page(0x84)
            .usage(0x04)
            .open_collection(CollectionItem::Application)
    }

    fn parse(bytes: &[u8]) -> ReportDescriptor {
        ReportDescriptor::parse(bytes, &UsageTables::standard()).unwrap()
    }

    #[test]
    fn empty_descriptor() {
        let rdesc = parse(&[]);
        assert!(rdesc.items().is_empty());
        assert!(rdesc.report_ids().is_empty());
        assert!(!rdesc.is_numbered());
    }

    #[test]
    fn offsets_per_report_and_kind() {
        let bytes = ups()
            .report_id(1)
            .usage_page(0x85)
            .usage(0x66)
            .usage(0x68)
            .logical_minimum(0)
            .logical_maximum(0xffff)
            .report_size(16)
            .report_count(2)
            .feature(DataFlags::variable())
            .usage(0x66)
            .report_size(8)
            .report_count(1)
            .input(DataFlags::variable())
            .report_id(2)
            .usage_page(0x84)
            .usage(0x57)
            .feature(DataFlags::variable())
            .close_collection()
            .build();
        let rdesc = parse(&bytes);
        let items = rdesc.items();
        assert_eq!(items.len(), 4);

        assert_eq!(items[0].path.to_string(), "UPS.RemainingCapacity");
        assert_eq!((items[0].report_id, items[0].kind, items[0].offset), (1, ItemKind::Feature, 0));
        assert_eq!(items[1].path.to_string(), "UPS.RunTimeToEmpty");
        assert_eq!((items[1].report_id, items[1].kind, items[1].offset), (1, ItemKind::Feature, 16));
        // Input reports count their bits separately
        assert_eq!((items[2].report_id, items[2].kind, items[2].offset), (1, ItemKind::Input, 0));
        assert_eq!((items[3].report_id, items[3].offset, items[3].size), (2, 0, 8));

        assert_eq!(rdesc.payload_len(1, ItemKind::Feature), Some(4));
        assert_eq!(rdesc.payload_len(1, ItemKind::Input), Some(1));
        assert_eq!(rdesc.report_len(1), Some(5));
        assert_eq!(rdesc.report_len(2), Some(2));
        assert_eq!(rdesc.report_len(3), None);
        assert_eq!(rdesc.report_ids(), vec![1, 2]);
        assert!(rdesc.is_numbered());
    }

    #[test]
    fn unnumbered_reports() {
        let bytes = ups()
            .usage_page(0x85)
            .usage(0x66)
            .logical_maximum(100)
            .report_size(8)
            .report_count(1)
            .feature(DataFlags::variable())
            .close_collection()
            .build();
        let rdesc = parse(&bytes);
        assert_eq!(rdesc.items()[0].report_id, 0);
        assert_eq!(rdesc.items()[0].buffer_offset(), 0);
        assert_eq!(rdesc.report_len(0), Some(1));
        assert!(!rdesc.is_numbered());
    }

    #[test]
    fn indexed_collections() {
        let bytes = ups()
            .usage(0x18) // OutletSystem
            .open_collection(CollectionItem::Physical)
            .usage(0x20) // Outlet
            .open_collection(CollectionItem::from(0x81))
            .report_id(5)
            .usage(0x6c) // Switchable
            .logical_maximum(1)
            .report_size(1)
            .report_count(1)
            .feature(DataFlags::variable())
            .close_collection()
            .usage(0x20)
            .open_collection(CollectionItem::from(0x82))
            .usage(0x6c)
            .feature(DataFlags::variable())
            .close_collection()
            .close_collection()
            .usage(0x35) // PercentLoad
            .report_size(8)
            .logical_maximum(100)
            .feature(DataFlags::variable())
            .close_collection()
            .build();
        let rdesc = parse(&bytes);
        let paths: Vec<String> = rdesc.items().iter().map(|i| i.path.to_string()).collect();
        assert_eq!(
            paths,
            vec![
                "UPS.OutletSystem.Outlet.[1].Switchable",
                "UPS.OutletSystem.Outlet.[2].Switchable",
                "UPS.PercentLoad",
            ]
        );
        assert_eq!(rdesc.items()[1].offset, 1);
        assert_eq!(rdesc.items()[2].offset, 2);
    }

    #[test]
    fn repeated_single_usage() {
        let bytes = ups()
            .report_id(3)
            .usage(0x30) // Voltage
            .logical_maximum(255)
            .report_size(8)
            .report_count(3)
            .input(DataFlags::variable())
            .close_collection()
            .build();
        let rdesc = parse(&bytes);
        let items = rdesc.items();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].path.to_string(), "UPS.Voltage.[0]");
        assert_eq!(items[2].path.to_string(), "UPS.Voltage.[2]");
        assert_eq!(items[2].offset, 16);
    }

    #[test]
    fn surplus_count_consumes_bits() {
        let bytes = ups()
            .report_id(1)
            .usage_page(0x85)
            .usage(0x44) // Charging
            .usage(0x45) // Discharging
            .logical_maximum(1)
            .report_size(1)
            .report_count(8)
            .input(DataFlags::variable())
            .usage(0xd0) // ACPresent
            .report_count(1)
            .input(DataFlags::variable())
            .close_collection()
            .build();
        let rdesc = parse(&bytes);
        let items = rdesc.items();
        assert_eq!(items.len(), 3);
        assert_eq!(items[1].offset, 1);
        assert_eq!(items[2].path.to_string(), "UPS.ACPresent");
        assert_eq!(items[2].offset, 8);
        assert_eq!(rdesc.payload_len(1, ItemKind::Input), Some(2));
    }

    #[test]
    fn padding_and_wide_fields_are_skipped() {
        let bytes = ups()
            .report_id(1)
            .report_size(4)
            .report_count(1)
            .input(DataFlags::constant())
            .usage(0x30)
            .report_size(40)
            .input(DataFlags::variable())
            .usage(0x31)
            .report_size(8)
            .input(DataFlags::variable())
            .close_collection()
            .build();
        let rdesc = parse(&bytes);
        let items = rdesc.items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].path.to_string(), "UPS.Current");
        assert_eq!(items[0].offset, 44);
        assert_eq!(rdesc.payload_len(1, ItemKind::Input), Some(7));
    }

    #[test]
    fn constant_items_are_not_writable() {
        let bytes = ups()
            .usage(0x40) // ConfigVoltage
            .logical_maximum(255)
            .report_size(8)
            .report_count(1)
            .feature(DataFlags::constant())
            .usage(0x30)
            .input(DataFlags::variable())
            .usage(0x56)
            .output(DataFlags::variable())
            .close_collection()
            .build();
        let rdesc = parse(&bytes);
        let items = rdesc.items();
        assert!(items[0].is_constant);
        assert!(!items[0].is_writable());
        assert!(!items[1].is_writable());
        assert!(items[2].is_writable());
    }

    #[test]
    fn signedness_and_extents() {
        let bytes = ups()
            .usage(0x57)
            .logical_minimum(-1)
            .logical_maximum(32767)
            .report_size(16)
            .report_count(1)
            .feature(DataFlags::variable())
            .close_collection()
            .build();
        let parsed = parse(&bytes);
        let item = &parsed.items()[0];
        assert!(item.is_signed);
        assert_eq!((item.logical_min, item.logical_max), (-1, 32767));
    }

    #[test]
    fn logical_maximum_below_minimum_is_unsigned() {
        // Logical Maximum 255 sent as the single byte 0xff
        let bytes = [
            0x05, 0x84, 0x09, 0x04, 0xa1, 0x01, // UPS
            0x09, 0x35, 0x15, 0x00, 0x25, 0xff, 0x75, 0x08, 0x95, 0x01, 0xb1, 0x02, // PercentLoad
            0xc0,
        ];
        let parsed = parse(&bytes);
        let item = &parsed.items()[0];
        assert!(!item.is_signed);
        assert_eq!((item.logical_min, item.logical_max), (0, 255));
    }

    #[test]
    fn unit_exponent_and_physical_extents() {
        let bytes = ups()
            .usage(0x30)
            .unit_exponent(-1)
            .unit(0x00f0d121)
            .physical_minimum(0)
            .physical_maximum(2550)
            .logical_maximum(255)
            .report_size(8)
            .report_count(1)
            .feature(DataFlags::variable())
            .close_collection()
            .build();
        let parsed = parse(&bytes);
        let item = &parsed.items()[0];
        assert_eq!(item.unit_exponent, -1);
        assert_eq!(item.unit, 0x00f0d121);
        assert_eq!((item.physical_min, item.physical_max), (Some(0), Some(2550)));
    }

    #[test]
    fn push_pop() {
        let bytes = ups()
            .report_size(8)
            .report_count(1)
            .logical_maximum(100)
            .push()
            .report_size(16)
            .usage(0x30)
            .input(DataFlags::variable())
            .pop()
            .usage(0x31)
            .input(DataFlags::variable())
            .close_collection()
            .build();
        let rdesc = parse(&bytes);
        assert_eq!(rdesc.items()[0].size, 16);
        assert_eq!(rdesc.items()[1].size, 8);
        assert_eq!(rdesc.items()[1].offset, 16);

        let bytes = ups().pop().close_collection().build();
        let err = ReportDescriptor::try_from(bytes.as_slice()).unwrap_err();
        assert!(matches!(err, ParserError::UnbalancedPop { offset: 6 }));
    }

    #[test]
    fn usage_range() {
        let bytes = ups()
            .usage_page(0x85)
            .usage_minimum(0x44)
            .usage_maximum(0x46)
            .logical_maximum(1)
            .report_size(1)
            .report_count(3)
            .input(DataFlags::variable())
            .close_collection()
            .build();
        let rdesc = parse(&bytes);
        let paths: Vec<String> = rdesc.items().iter().map(|i| i.path.to_string()).collect();
        assert_eq!(paths, vec!["UPS.Charging", "UPS.Discharging", "UPS.FullyCharged"]);

        let bytes = ups()
            .usage_minimum(0x44)
            .report_size(1)
            .report_count(3)
            .input(DataFlags::variable())
            .close_collection()
            .build();
        let err = ReportDescriptor::try_from(bytes.as_slice()).unwrap_err();
        assert!(matches!(err, ParserError::MissingContext { .. }));
    }

    #[test]
    fn unnamed_usages_render_as_hex() {
        let bytes = ReportDescriptorBuilder::new()
            .extended_usage(0xff860001)
            .open_collection(CollectionItem::Application)
            .usage_page(0xff86)
            .usage(0x16)
            .report_size(8)
            .report_count(1)
            .feature(DataFlags::variable())
            .close_collection()
            .build();
        let rdesc = parse(&bytes);
        assert_eq!(rdesc.items()[0].path.to_string(), "ff860001.ff860016");
    }

    #[test]
    fn vendor_tables_take_precedence() {
        static VENDOR: usage::UsageTable = &[("APCPanelTest", 0xff860072), ("Ups", 0x00840004)];
        let bytes = ups()
            .extended_usage(0xff860072)
            .report_size(8)
            .report_count(1)
            .feature(DataFlags::variable())
            .close_collection()
            .build();
        let tables = UsageTables::new(&[VENDOR, usage::HID_USAGES]);
        let rdesc = ReportDescriptor::parse(&bytes, &tables).unwrap();
        assert_eq!(rdesc.items()[0].path.to_string(), "Ups.APCPanelTest");
    }

    #[test]
    fn unbalanced_collection() {
        let bytes = ups().close_collection().close_collection().build();
        let err = ReportDescriptor::try_from(bytes.as_slice()).unwrap_err();
        assert!(matches!(err, ParserError::UnbalancedCollection { offset: 7 }));
    }

    #[test]
    fn items_need_a_collection() {
        let bytes = ReportDescriptorBuilder::new()
            .usage_page(0x84)
            .usage(0x30)
            .report_size(8)
            .report_count(1)
            .input(DataFlags::variable())
            .build();
        let err = ReportDescriptor::try_from(bytes.as_slice()).unwrap_err();
        assert!(matches!(err, ParserError::MissingContext { offset: 8, .. }));
    }

    #[test]
    fn report_too_long() {
        let bytes = ups()
            .usage(0x30)
            .report_size(32)
            .report_count(0x10000)
            .input(DataFlags::variable())
            .close_collection()
            .build();
        let err = ReportDescriptor::try_from(bytes.as_slice()).unwrap_err();
        assert!(matches!(err, ParserError::BitOffsetOverflow { report_id: 0, .. }));
    }

    #[test]
    fn fixup_runs_before_parsing() {
        // Report Size 0 on the Voltage item, patched to 8
        let bytes = ups()
            .usage(0x30)
            .report_size(0)
            .report_count(1)
            .input(DataFlags::variable())
            .close_collection()
            .build();
        let tables = UsageTables::standard();
        assert!(ReportDescriptor::parse(&bytes, &tables).unwrap().items().is_empty());

        let (rdesc, changed) = ReportDescriptor::parse_with_fixup(&bytes, &tables, |raw| {
            match raw.iter().position(|b| *b == 0x75) {
                Some(idx) => {
                    raw[idx + 1] = 8;
                    true
                }
                None => false,
            }
        })
        .unwrap();
        assert!(changed);
        assert_eq!(rdesc.items().len(), 1);
        assert_eq!(rdesc.items()[0].size, 8);
    }
}
