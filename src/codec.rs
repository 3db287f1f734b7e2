// SPDX-License-Identifier: MIT

//! Conversion between the bits of a report buffer and values.
//!
//! Items are packed little-endian: bit 0 of an item is bit `offset % 8` of byte
//! `offset / 8`, counting from the start of the payload. In a numbered report
//! the payload starts after the Report ID byte, see [DataItem::buffer_offset].
//!
//! The physical value is `raw * 10^unit_exponent`. Physical extents are not
//! applied.
//!
//! ```
//! # use hidups::{DataItem, ItemKind};
//! # use hidups::codec;
//! let item = DataItem {
//!     report_id: 2,
//!     kind: ItemKind::Feature,
//!     offset: 4,
//!     size: 8,
//!     unit_exponent: -1,
//!     ..Default::default()
//! };
//! let mut buf = [0x02, 0x00, 0x00];
//! codec::encode(&item, 12.3, &mut buf).unwrap();
//! assert_eq!(buf, [0x02, 0xb0, 0x07]);
//! assert_eq!(codec::decode(&item, &buf).unwrap(), 12.3);
//! ```

use thiserror::Error;

use crate::{ensure, DataItem};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("Buffer too short: {needed} bits needed, {available} available")]
    BufferTooShort { needed: usize, available: usize },
    #[error("Value {value} does not fit into {size} bits")]
    ValueOutOfRange { value: f64, size: u8 },
}

type Result<T> = std::result::Result<T, CodecError>;

fn check_bounds(item: &DataItem, buf: &[u8]) -> Result<usize> {
    let start = item.buffer_offset();
    let needed = start + item.size as usize;
    let available = buf.len() * 8;
    ensure!(
        needed <= available,
        CodecError::BufferTooShort { needed, available }
    );
    Ok(start)
}

/// The raw integer value of `item`, sign-extended for signed items.
pub fn decode_raw(item: &DataItem, buf: &[u8]) -> Result<i64> {
    let start = check_bounds(item, buf)?;
    let size = item.size as usize;
    let raw = (0..size)
        .map(|i| start + i)
        .filter(|bit| buf[bit / 8] & (1 << (bit % 8)) != 0)
        .fold(0u64, |acc, bit| acc | 1 << (bit - start));

    let value = if item.is_signed && size > 0 && raw & (1 << (size - 1)) != 0 {
        raw as i64 - (1i64 << size)
    } else {
        raw as i64
    };
    Ok(value)
}

/// The physical value of `item`.
pub fn decode(item: &DataItem, buf: &[u8]) -> Result<f64> {
    let raw = decode_raw(item, buf)?;
    Ok(to_value(item, raw))
}

/// Convert a raw integer of `item` to its physical value.
pub fn to_value(item: &DataItem, raw: i64) -> f64 {
    scale(raw as f64, item.unit_exponent)
}

/// Write `raw` into the bits of `item`, leaving all other bits untouched.
pub fn encode_raw(item: &DataItem, raw: i64, buf: &mut [u8]) -> Result<()> {
    let start = check_bounds(item, buf)?;
    let size = item.size as usize;
    let (min, max) = match (item.is_signed, size) {
        (_, 0) => (0, 0),
        (true, _) => (-(1i64 << (size - 1)), (1i64 << (size - 1)) - 1),
        (false, _) => (0, (1i64 << size) - 1),
    };
    ensure!(
        (min..=max).contains(&raw),
        CodecError::ValueOutOfRange {
            value: raw as f64,
            size: item.size,
        }
    );

    let bits = raw as u64;
    for i in 0..size {
        let bit = start + i;
        let mask = 1u8 << (bit % 8);
        if bits & (1 << i) != 0 {
            buf[bit / 8] |= mask;
        } else {
            buf[bit / 8] &= !mask;
        }
    }
    Ok(())
}

/// Write the physical `value` into the bits of `item`, rounding to the
/// nearest raw value.
pub fn encode(item: &DataItem, value: f64, buf: &mut [u8]) -> Result<()> {
    let raw = to_raw(item, value)?;
    encode_raw(item, raw, buf)
}

/// Convert a physical value to the raw integer for `item`.
pub fn to_raw(item: &DataItem, value: f64) -> Result<i64> {
    let raw = scale(value, item.unit_exponent.saturating_neg()).round();
    ensure!(
        raw.is_finite() && raw >= i64::MIN as f64 && raw <= i64::MAX as f64,
        CodecError::ValueOutOfRange {
            value,
            size: item.size,
        }
    );
    Ok(raw as i64)
}

/// `value * 10^exponent`, dividing for negative exponents so that e.g.
/// 50 with exponent -1 is exactly 5.0.
fn scale(value: f64, exponent: i8) -> f64 {
    let factor = 10f64.powi(exponent.unsigned_abs() as i32);
    if exponent < 0 {
        value / factor
    } else {
        value * factor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ItemKind;

    fn item(report_id: u8, offset: u32, size: u8, is_signed: bool) -> DataItem {
        DataItem {
            report_id,
            kind: ItemKind::Feature,
            offset,
            size,
            is_signed,
            ..Default::default()
        }
    }

    #[test]
    fn decode_unnumbered() {
        let buf = [0x32];
        assert_eq!(decode(&item(0, 0, 8, false), &buf).unwrap(), 50.0);
    }

    #[test]
    fn decode_skips_report_id() {
        let buf = [0x01, 0x32, 0x80];
        assert_eq!(decode_raw(&item(1, 0, 8, false), &buf).unwrap(), 0x32);
        assert_eq!(decode_raw(&item(1, 15, 1, false), &buf).unwrap(), 1);
    }

    #[test]
    fn decode_across_bytes() {
        // 12 bits starting at bit 4: 0xabc
        let buf = [0xc0, 0xab];
        assert_eq!(decode_raw(&item(0, 4, 12, false), &buf).unwrap(), 0xabc);
    }

    #[test]
    fn sign_extension() {
        let buf = [0x02, 0xff, 0xff];
        assert_eq!(decode_raw(&item(2, 0, 16, true), &buf).unwrap(), -1);
        assert_eq!(decode_raw(&item(2, 0, 16, false), &buf).unwrap(), 0xffff);
        let buf = [0b0000_1000];
        assert_eq!(decode_raw(&item(0, 0, 4, true), &buf).unwrap(), -8);
        let buf = [0xff, 0xff, 0xff, 0xff];
        assert_eq!(decode_raw(&item(0, 0, 32, true), &buf).unwrap(), -1);
        assert_eq!(decode_raw(&item(0, 0, 32, false), &buf).unwrap(), 0xffff_ffff);
    }

    #[test]
    fn exponent() {
        let mut i = item(0, 0, 8, false);
        i.unit_exponent = -1;
        assert_eq!(decode(&i, &[50]).unwrap(), 5.0);
        i.unit_exponent = 2;
        assert_eq!(decode(&i, &[3]).unwrap(), 300.0);
        assert_eq!(to_raw(&i, 300.0).unwrap(), 3);
        i.unit_exponent = -2;
        assert_eq!(to_raw(&i, 1.234).unwrap(), 123);
    }

    #[test]
    fn buffer_too_short() {
        let err = decode(&item(1, 8, 8, false), &[0x01, 0x00]).unwrap_err();
        assert_eq!(
            err,
            CodecError::BufferTooShort {
                needed: 24,
                available: 16
            }
        );
        let mut buf = [0u8; 1];
        assert!(encode_raw(&item(0, 4, 8, false), 1, &mut buf).is_err());
        assert_eq!(buf, [0]);
    }

    #[test]
    fn encode_preserves_other_bits() {
        let mut buf = [0x05, 0xff, 0xff];
        encode_raw(&item(5, 4, 8, false), 0, &mut buf).unwrap();
        assert_eq!(buf, [0x05, 0x0f, 0xf0]);
        encode_raw(&item(5, 4, 8, false), 0xa5, &mut buf).unwrap();
        assert_eq!(buf, [0x05, 0x5f, 0xfa]);
    }

    #[test]
    fn encode_signed() {
        let mut buf = [0x02, 0x00, 0x00];
        encode(&item(2, 0, 16, true), -1.0, &mut buf).unwrap();
        assert_eq!(buf, [0x02, 0xff, 0xff]);
    }

    #[test]
    fn out_of_range() {
        let mut buf = [0u8; 4];
        assert!(matches!(
            encode_raw(&item(0, 0, 8, false), 256, &mut buf),
            Err(CodecError::ValueOutOfRange { size: 8, .. })
        ));
        assert!(encode_raw(&item(0, 0, 8, false), -1, &mut buf).is_err());
        assert!(encode_raw(&item(0, 0, 8, true), 128, &mut buf).is_err());
        assert!(encode_raw(&item(0, 0, 8, true), -128, &mut buf).is_ok());
        assert!(encode(&item(0, 0, 8, true), f64::NAN, &mut buf).is_err());
        assert!(encode(&item(0, 0, 32, false), f64::INFINITY, &mut buf).is_err());
    }
}
