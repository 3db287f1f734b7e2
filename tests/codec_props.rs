// SPDX-License-Identifier: MIT

use hidups::codec;
use hidups::{DataItem, ItemKind};
use proptest::prelude::*;

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

/// An item, a raw value that fits it and a buffer of random bytes large
/// enough to hold it.
fn placed_value() -> impl Strategy<Value = (DataItem, i64, Vec<u8>)> {
    (any::<u8>(), 0u32..64, 1u8..=32, any::<bool>())
        .prop_flat_map(|(report_id, offset, size, is_signed)| {
            let item = item(report_id, offset, size, is_signed);
            let (min, max) = if is_signed {
                (-(1i64 << (size - 1)), (1i64 << (size - 1)) - 1)
            } else {
                (0, (1i64 << size) - 1)
            };
            let len = (item.buffer_offset() + size as usize).div_ceil(8);
            (
                Just(item),
                min..=max,
                proptest::collection::vec(any::<u8>(), len..len + 4),
            )
        })
}

proptest! {
    #[test]
    fn raw_roundtrip((item, raw, mut buf) in placed_value()) {
        codec::encode_raw(&item, raw, &mut buf).unwrap();
        prop_assert_eq!(codec::decode_raw(&item, &buf).unwrap(), raw);
    }

    #[test]
    fn other_bits_untouched((item, raw, buf) in placed_value()) {
        let mut written = buf.clone();
        codec::encode_raw(&item, raw, &mut written).unwrap();
        let start = item.buffer_offset();
        let end = start + item.size as usize;
        for bit in (0..buf.len() * 8).filter(|b| !(start..end).contains(b)) {
            let mask = 1u8 << (bit % 8);
            prop_assert_eq!(buf[bit / 8] & mask, written[bit / 8] & mask, "bit {}", bit);
        }
    }

    #[test]
    fn scaled_roundtrip(raw in 0i64..=0xffff, exponent in -4i8..=4) {
        let mut item = item(0, 0, 16, false);
        item.unit_exponent = exponent;
        let mut buf = [0u8; 2];
        let value = codec::to_value(&item, raw);
        codec::encode(&item, value, &mut buf).unwrap();
        prop_assert_eq!(codec::decode_raw(&item, &buf).unwrap(), raw);
    }

    #[test]
    fn too_wide_rejected(size in 1u8..=16, excess in 1i64..1000) {
        let item = item(0, 0, size, false);
        let mut buf = [0u8; 4];
        let raw = (1i64 << size) - 1 + excess;
        prop_assert!(codec::encode_raw(&item, raw, &mut buf).is_err());
        prop_assert_eq!(buf, [0u8; 4]);
    }
}

#[test]
fn four_bit_sign_extension() {
    let buf = [0b0000_1000];
    assert_eq!(codec::decode_raw(&item(0, 0, 4, true), &buf).unwrap(), -8);
    assert_eq!(codec::decode_raw(&item(0, 0, 4, false), &buf).unwrap(), 8);
}

#[test]
fn three_bits_at_offset_three() {
    let mut buf = [0b1100_0111];
    codec::encode_raw(&item(0, 3, 3, false), 0b101, &mut buf).unwrap();
    assert_eq!(buf, [0b1110_1111]);
    codec::encode_raw(&item(0, 3, 3, false), 0, &mut buf).unwrap();
    assert_eq!(buf, [0b1100_0111]);
}
