//! Tests for primitive type encoding/decoding: integers and byte strings.

use crate::encoding::*;

// ------------------------------------------------------------------------------------------------
// u32
// ------------------------------------------------------------------------------------------------

#[test]
fn roundtrip_u32() {
    let val: u32 = 0xDEAD_BEEF;
    let bytes = encode_to_vec(&val).unwrap();
    assert_eq!(bytes, [0xEF, 0xBE, 0xAD, 0xDE]); // little-endian
    let (decoded, consumed) = decode_from_slice::<u32>(&bytes).unwrap();
    assert_eq!(decoded, val);
    assert_eq!(consumed, 4);
}

#[test]
fn u32_extremes() {
    for val in [0u32, 1, u32::MAX] {
        let bytes = encode_to_vec(&val).unwrap();
        let (decoded, consumed) = decode_from_slice::<u32>(&bytes).unwrap();
        assert_eq!(decoded, val);
        assert_eq!(consumed, 4);
    }
}

// ------------------------------------------------------------------------------------------------
// u64
// ------------------------------------------------------------------------------------------------

#[test]
fn roundtrip_u64() {
    let val: u64 = 0x0102_0304_0506_0708;
    let bytes = encode_to_vec(&val).unwrap();
    assert_eq!(bytes, [0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01]);
    let (decoded, consumed) = decode_from_slice::<u64>(&bytes).unwrap();
    assert_eq!(decoded, val);
    assert_eq!(consumed, 8);
}

#[test]
fn u64_extremes() {
    for val in [0u64, 1, u64::MAX] {
        let bytes = encode_to_vec(&val).unwrap();
        let (decoded, consumed) = decode_from_slice::<u64>(&bytes).unwrap();
        assert_eq!(decoded, val);
        assert_eq!(consumed, 8);
    }
}

// ------------------------------------------------------------------------------------------------
// Byte strings
// ------------------------------------------------------------------------------------------------

#[test]
fn roundtrip_byte_string() {
    let val: Vec<u8> = b"hello world".to_vec();
    let bytes = encode_to_vec(&val).unwrap();
    // [u32 len][bytes]
    assert_eq!(&bytes[..4], [11, 0, 0, 0]);
    assert_eq!(&bytes[4..], b"hello world");
    let (decoded, consumed) = decode_from_slice::<Vec<u8>>(&bytes).unwrap();
    assert_eq!(decoded, val);
    assert_eq!(consumed, 4 + 11);
}

#[test]
fn roundtrip_empty_byte_string() {
    let val: Vec<u8> = Vec::new();
    let bytes = encode_to_vec(&val).unwrap();
    assert_eq!(bytes, [0, 0, 0, 0]);
    let (decoded, consumed) = decode_from_slice::<Vec<u8>>(&bytes).unwrap();
    assert!(decoded.is_empty());
    assert_eq!(consumed, 4);
}

#[test]
fn slice_encoding_matches_vec_encoding() {
    let owned: Vec<u8> = vec![1, 2, 3, 4, 5];
    let borrowed: &[u8] = &owned;
    assert_eq!(
        encode_to_vec(&owned).unwrap(),
        encode_to_vec(&borrowed).unwrap()
    );
}

#[test]
fn decoding_advances_cursor_across_items() {
    let mut buf = Vec::new();
    0xAABB_CCDDu32.encode_to(&mut buf).unwrap();
    b"key".as_slice().encode_to(&mut buf).unwrap();
    b"value".as_slice().encode_to(&mut buf).unwrap();

    let mut off = 0;
    let (n, consumed) = u32::decode_from(&buf[off..]).unwrap();
    off += consumed;
    assert_eq!(n, 0xAABB_CCDD);
    let (key, consumed) = Vec::<u8>::decode_from(&buf[off..]).unwrap();
    off += consumed;
    assert_eq!(key, b"key");
    let (value, consumed) = Vec::<u8>::decode_from(&buf[off..]).unwrap();
    off += consumed;
    assert_eq!(value, b"value");
    assert_eq!(off, buf.len());
}

#[test]
fn encoding_is_deterministic() {
    let val: Vec<u8> = (0..=255).collect();
    assert_eq!(encode_to_vec(&val).unwrap(), encode_to_vec(&val).unwrap());
}
