// SPDX-License-Identifier: MIT

//! Path based reads and writes, on top of the [PathIndex], the [ReportCache]
//! and the [codec].
//!
//! The device is reached through two callbacks: `refill(report_id, kind)` fetches
//! a report, `write(report_id, bytes)` sends one. [Session](crate::Session) binds
//! both to a [Transport](crate::Transport).

use std::time::Duration;
use thiserror::Error;

use crate::codec::{self, CodecError};
use crate::path::PathIndex;
use crate::report::ReportCache;
use crate::{DataItem, ItemKind, TransportError};

#[derive(Error, Debug)]
pub enum AccessError {
    #[error("Unknown path {0}")]
    UnknownPath(String),
    #[error("{path} is a read-only {kind} item")]
    NotWritable { path: String, kind: ItemKind },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

type Result<T> = std::result::Result<T, AccessError>;

/// A decoded value and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessResult {
    pub value: f64,
    pub raw: i64,
    pub kind: ItemKind,
    pub report_id: u8,
    pub offset: u32,
    pub size: u8,
    /// False if the raw value lies outside the declared logical extents
    pub in_range: bool,
}

impl AccessResult {
    fn new(item: &DataItem, raw: i64) -> AccessResult {
        let declared = item.logical_min < item.logical_max;
        AccessResult {
            value: codec::to_value(item, raw),
            raw,
            kind: item.kind,
            report_id: item.report_id,
            offset: item.offset,
            size: item.size,
            in_range: !declared || (item.logical_min..=item.logical_max).contains(&raw),
        }
    }
}

/// Decode `item` from its report, refilling the report if older than `max_age`.
pub fn read_item<F>(
    item: &DataItem,
    cache: &mut ReportCache,
    max_age: Duration,
    refill: F,
) -> Result<AccessResult>
where
    F: FnOnce(u8, ItemKind) -> std::result::Result<Vec<u8>, TransportError>,
{
    let bytes = cache.get_or_refill(item.report_id, item.kind, max_age, refill)?;
    let raw = codec::decode_raw(item, bytes)?;
    Ok(AccessResult::new(item, raw))
}

/// Decode an item from the cached report only, without touching the device.
pub fn read_cached(item: &DataItem, cache: &ReportCache) -> Option<AccessResult> {
    let bytes = cache.get(item.report_id)?;
    let raw = codec::decode_raw(item, bytes).ok()?;
    Some(AccessResult::new(item, raw))
}

/// Read the item at `path`, see [PathIndex::lookup] for `preference`.
pub fn get<F>(
    index: &PathIndex,
    cache: &mut ReportCache,
    path: &str,
    preference: Option<ItemKind>,
    max_age: Duration,
    refill: F,
) -> Result<AccessResult>
where
    F: FnOnce(u8, ItemKind) -> std::result::Result<Vec<u8>, TransportError>,
{
    let item = index
        .lookup(path, preference)
        .ok_or_else(|| AccessError::UnknownPath(path.to_string()))?;
    read_item(item, cache, max_age, refill)
}

pub fn get_value<F>(
    index: &PathIndex,
    cache: &mut ReportCache,
    path: &str,
    max_age: Duration,
    refill: F,
) -> Result<f64>
where
    F: FnOnce(u8, ItemKind) -> std::result::Result<Vec<u8>, TransportError>,
{
    get(index, cache, path, None, max_age, refill).map(|r| r.value)
}

/// Write `value` to the item at `path`.
///
/// A Feature report is re-read first so the other items in the report keep
/// their current values, an Output report starts from the cached copy or from
/// zero. The cache is only updated once `write` succeeded.
pub fn set_value<F, W>(
    index: &PathIndex,
    cache: &mut ReportCache,
    path: &str,
    preference: Option<ItemKind>,
    value: f64,
    refill: F,
    write: W,
) -> Result<()>
where
    F: FnOnce(u8, ItemKind) -> std::result::Result<Vec<u8>, TransportError>,
    W: FnOnce(u8, &[u8]) -> std::result::Result<(), TransportError>,
{
    let item = index
        .lookup(path, preference)
        .ok_or_else(|| AccessError::UnknownPath(path.to_string()))?;
    write_item(item, cache, value, refill, write)
}

/// Encode `value` into the report of `item` and send it, see [set_value].
pub fn write_item<F, W>(
    item: &DataItem,
    cache: &mut ReportCache,
    value: f64,
    refill: F,
    write: W,
) -> Result<()>
where
    F: FnOnce(u8, ItemKind) -> std::result::Result<Vec<u8>, TransportError>,
    W: FnOnce(u8, &[u8]) -> std::result::Result<(), TransportError>,
{
    if !item.is_writable() {
        return Err(AccessError::NotWritable {
            path: item.path.to_string(),
            kind: item.kind,
        });
    }

    let raw = codec::to_raw(item, value)?;
    let declared = item.logical_min < item.logical_max;
    if declared && !(item.logical_min..=item.logical_max).contains(&raw) {
        return Err(CodecError::ValueOutOfRange {
            value,
            size: item.size,
        }
        .into());
    }

    let needed = (item.buffer_offset() + item.size as usize).div_ceil(8);
    let mut bytes = match item.kind {
        ItemKind::Feature => cache
            .get_or_refill(item.report_id, item.kind, Duration::ZERO, refill)?
            .to_vec(),
        _ => match cache.get(item.report_id) {
            Some(bytes) if bytes.len() >= needed => bytes.to_vec(),
            _ => cache.blank(item.report_id, needed),
        },
    };
    codec::encode_raw(item, raw, &mut bytes)?;
    write(item.report_id, &bytes)?;
    cache.store(item.report_id, &bytes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hid::*;
    use crate::usage::UsageTables;
    use crate::ReportDescriptor;
    use std::cell::RefCell;

    const MAX_AGE: Duration = Duration::from_secs(60);

    fn setup() -> (PathIndex, ReportCache) {
        let bytes = ReportDescriptorBuilder::new()
            .usage_page(0x84)
            .usage(0x04) // UPS
            .open_collection(CollectionItem::Application)
            .report_id(1)
            .usage(0x30) // Voltage
            .logical_minimum(0)
            .logical_maximum(2500)
            .unit_exponent(-1)
            .report_size(16)
            .report_count(1)
            .feature(DataFlags::variable())
            .usage(0x35) // PercentLoad
            .unit_exponent(0)
            .logical_maximum(100)
            .report_size(8)
            .input(DataFlags::variable())
            .usage(0x56) // DelayBeforeStartup
            .logical_minimum(-1)
            .logical_maximum(32767)
            .report_size(16)
            .output(DataFlags::variable())
            .close_collection()
            .build();
        let rdesc = ReportDescriptor::parse(&bytes, &UsageTables::standard()).unwrap();
        (PathIndex::build(rdesc.items()), ReportCache::new(&rdesc))
    }

    #[test]
    fn read_scaled() {
        let (index, mut cache) = setup();
        let result = get(&index, &mut cache, "UPS.Voltage", None, MAX_AGE, |id, kind| {
            assert_eq!((id, kind), (1, ItemKind::Feature));
            Ok(vec![1, 0x9a, 0x08])
        })
        .unwrap();
        assert_eq!(result.raw, 2202);
        assert_eq!(result.value, 220.2);
        assert!(result.in_range);
        assert_eq!((result.report_id, result.offset, result.size), (1, 0, 16));
    }

    #[test]
    fn out_of_range_reads_are_flagged() {
        let (index, mut cache) = setup();
        let result = get(&index, &mut cache, "UPS.PercentLoad", None, MAX_AGE, |_, _| {
            Ok(vec![1, 200])
        })
        .unwrap();
        assert_eq!(result.value, 200.0);
        assert!(!result.in_range);
    }

    #[test]
    fn unknown_path() {
        let (index, mut cache) = setup();
        let err = get_value(&index, &mut cache, "UPS.Frequency", MAX_AGE, |_, _| {
            panic!("no transport access expected")
        })
        .unwrap_err();
        assert!(matches!(err, AccessError::UnknownPath(p) if p == "UPS.Frequency"));
    }

    #[test]
    fn input_is_not_writable() {
        let (index, mut cache) = setup();
        let err = set_value(
            &index,
            &mut cache,
            "UPS.PercentLoad",
            None,
            10.0,
            |_, _| panic!("no refill expected"),
            |_, _| panic!("no write expected"),
        )
        .unwrap_err();
        assert!(matches!(err, AccessError::NotWritable { kind: ItemKind::Input, .. }));
    }

    #[test]
    fn feature_write_rereads_report() {
        let (index, mut cache) = setup();
        cache.store(1, &[1, 0, 0]);
        let written = RefCell::new(vec![]);
        set_value(
            &index,
            &mut cache,
            "UPS.Voltage",
            None,
            230.0,
            |_, _| Ok(vec![1, 0xff, 0xff]),
            |id, bytes| {
                written.borrow_mut().push((id, bytes.to_vec()));
                Ok(())
            },
        )
        .unwrap();
        assert_eq!(written.into_inner(), vec![(1, vec![1, 0xfc, 0x08])]);
        assert_eq!(cache.get(1), Some(&[1u8, 0xfc, 0x08][..]));
    }

    #[test]
    fn output_write_from_blank() {
        let (index, mut cache) = setup();
        let written = RefCell::new(vec![]);
        set_value(
            &index,
            &mut cache,
            "UPS.DelayBeforeStartup",
            None,
            -1.0,
            |_, _| panic!("no refill expected"),
            |id, bytes| {
                written.borrow_mut().push((id, bytes.to_vec()));
                Ok(())
            },
        )
        .unwrap();
        assert_eq!(written.into_inner(), vec![(1, vec![1, 0xff, 0xff])]);
    }

    #[test]
    fn failed_write_leaves_cache() {
        let (index, mut cache) = setup();
        cache.store(1, &[1, 0x9a, 0x08]);
        let err = set_value(
            &index,
            &mut cache,
            "UPS.Voltage",
            None,
            230.0,
            |_, _| Ok(vec![1, 0x9a, 0x08]),
            |_, _| Err(TransportError::Busy),
        )
        .unwrap_err();
        assert!(matches!(err, AccessError::Transport(TransportError::Busy)));
        assert_eq!(cache.get(1), Some(&[1u8, 0x9a, 0x08][..]));
    }

    #[test]
    fn logical_range_is_enforced() {
        let (index, mut cache) = setup();
        let err = set_value(
            &index,
            &mut cache,
            "UPS.Voltage",
            None,
            300.0,
            |_, _| panic!("no refill expected"),
            |_, _| panic!("no write expected"),
        )
        .unwrap_err();
        assert!(matches!(err, AccessError::Codec(CodecError::ValueOutOfRange { .. })));
    }
}
