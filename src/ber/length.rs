//! Definite-form BER lengths (X.690 8.1.3).
//!
//! Short form covers 0..=127 in one octet. Long form carries an octet count
//! in the low seven bits followed by the big-endian length. The indefinite
//! form (`0x80`) never appears in SNMP and is rejected.

use crate::error::{DecodeErrorKind, Error, Result};

/// Largest length the decoder will honour. A UDP datagram is at most 64 KiB,
/// so anything bigger is garbage.
pub const MAX_LENGTH: usize = 0x10000;

/// Number of octets the encoded form of `len` occupies.
pub fn length_encoded_len(len: usize) -> usize {
    match len {
        0..=0x7F => 1,
        0x80..=0xFF => 2,
        0x100..=0xFFFF => 3,
        0x1_0000..=0xFF_FFFF => 4,
        _ => 5,
    }
}

/// Encode `len`, returning the octets in reverse order for a back-to-front
/// writer together with how many of them are used.
pub fn encode_length(len: usize) -> ([u8; 5], usize) {
    let mut out = [0u8; 5];
    let n = length_encoded_len(len);
    if n == 1 {
        out[0] = len as u8;
        return (out, 1);
    }
    let value_octets = n - 1;
    for (i, slot) in out.iter_mut().take(value_octets).enumerate() {
        *slot = (len >> (8 * i)) as u8;
    }
    out[value_octets] = 0x80 | value_octets as u8;
    (out, n)
}

/// Decode a length at the start of `data`. Returns `(length, octets_consumed)`.
///
/// `base_offset` is where `data` begins in the enclosing message and is only
/// used for error reporting.
pub fn decode_length(data: &[u8], base_offset: usize) -> Result<(usize, usize)> {
    let Some(&first) = data.first() else {
        return Err(Error::decode(base_offset, DecodeErrorKind::TruncatedData));
    };

    if first & 0x80 == 0 {
        return Ok((first as usize, 1));
    }

    let count = (first & 0x7F) as usize;
    match count {
        0 => return Err(Error::decode(base_offset, DecodeErrorKind::IndefiniteLength)),
        1..=4 => {}
        octets => {
            return Err(Error::decode(
                base_offset,
                DecodeErrorKind::LengthTooLong { octets },
            ));
        }
    }

    let Some(value) = data.get(1..=count) else {
        return Err(Error::decode(base_offset, DecodeErrorKind::TruncatedData));
    };
    // Non-minimal long forms are legal (X.690 8.1.3.5 note 2).
    let length = value.iter().fold(0usize, |acc, &b| (acc << 8) | b as usize);

    if length > MAX_LENGTH {
        return Err(Error::decode(
            base_offset,
            DecodeErrorKind::LengthExceedsMax {
                length,
                max: MAX_LENGTH,
            },
        ));
    }

    Ok((length, 1 + count))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_and_long_forms() {
        assert_eq!(decode_length(&[0x00], 0).unwrap(), (0, 1));
        assert_eq!(decode_length(&[0x7F], 0).unwrap(), (127, 1));
        assert_eq!(decode_length(&[0x81, 0x80], 0).unwrap(), (128, 2));
        assert_eq!(decode_length(&[0x82, 0x01, 0x00], 0).unwrap(), (256, 3));
    }

    #[test]
    fn test_non_minimal_long_form_accepted() {
        assert_eq!(decode_length(&[0x82, 0x00, 0x05], 0).unwrap(), (5, 3));
        assert_eq!(decode_length(&[0x81, 0x01], 0).unwrap(), (1, 2));
    }

    #[test]
    fn test_indefinite_rejected() {
        let err = decode_length(&[0x80], 7).unwrap_err();
        assert!(matches!(
            *err,
            Error::Decode {
                offset: 7,
                kind: DecodeErrorKind::IndefiniteLength
            }
        ));
    }

    #[test]
    fn test_truncated_long_form() {
        let err = decode_length(&[0x82, 0x01], 0).unwrap_err();
        assert!(matches!(
            *err,
            Error::Decode {
                kind: DecodeErrorKind::TruncatedData,
                ..
            }
        ));
    }

    #[test]
    fn test_max_length_enforced() {
        assert_eq!(
            decode_length(&[0x83, 0x01, 0x00, 0x00], 0).unwrap(),
            (MAX_LENGTH, 4)
        );
        let err = decode_length(&[0x83, 0x01, 0x00, 0x01], 0).unwrap_err();
        assert!(matches!(
            *err,
            Error::Decode {
                kind: DecodeErrorKind::LengthExceedsMax { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_encode_is_reversed() {
        let (buf, n) = encode_length(5);
        assert_eq!(&buf[..n], &[5]);
        let (buf, n) = encode_length(128);
        assert_eq!(&buf[..n], &[0x80, 0x81]);
        let (buf, n) = encode_length(0x1234);
        assert_eq!(&buf[..n], &[0x34, 0x12, 0x82]);
    }
}
