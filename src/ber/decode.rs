//! Zero-copy BER reader.

use bytes::Bytes;

use super::length::decode_length;
use super::tag;
use crate::error::{DecodeErrorKind, Error, Result};
use crate::oid::Oid;

/// Cursor over a BER buffer.
///
/// Constructed values (`read_sequence`, `read_constructed`) hand back a new
/// decoder over a slice of the same allocation, so nothing is copied.
pub struct Decoder {
    data: Bytes,
    offset: usize,
    base: usize,
}

impl Decoder {
    pub fn new(data: Bytes) -> Self {
        Self {
            data,
            offset: 0,
            base: 0,
        }
    }

    /// Decoder over a slice that started `base` bytes into some outer buffer.
    pub fn with_base(data: Bytes, base: usize) -> Self {
        Self {
            data,
            offset: 0,
            base,
        }
    }

    /// Copying constructor, mostly for tests.
    pub fn from_slice(data: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(data))
    }

    /// Position relative to the outermost buffer, used in error offsets.
    pub fn offset(&self) -> usize {
        self.base + self.offset
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.offset)
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn peek_tag(&self) -> Option<u8> {
        self.data.get(self.offset).copied()
    }

    fn err(&self, kind: DecodeErrorKind) -> Box<Error> {
        Error::decode(self.offset(), kind)
    }

    pub fn read_tag(&mut self) -> Result<u8> {
        let byte = self
            .peek_tag()
            .ok_or_else(|| self.err(DecodeErrorKind::TruncatedData))?;
        self.offset += 1;
        Ok(byte)
    }

    pub fn read_length(&mut self) -> Result<usize> {
        let rest = self.data.get(self.offset..).unwrap_or_default();
        let (len, consumed) = decode_length(rest, self.offset())?;
        self.offset += consumed;
        Ok(len)
    }

    /// Take `len` raw bytes as a slice of the underlying buffer.
    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes> {
        if len > self.remaining() {
            return Err(self.err(DecodeErrorKind::InsufficientData {
                needed: len,
                available: self.remaining(),
            }));
        }
        let bytes = self.data.slice(self.offset..self.offset + len);
        self.offset += len;
        Ok(bytes)
    }

    /// Consume a tag, failing unless it is `expected`, and return the content length.
    pub fn expect_tag(&mut self, expected: u8) -> Result<usize> {
        let at = self.offset();
        let actual = self.read_tag()?;
        if actual != expected {
            return Err(Error::decode(
                at,
                DecodeErrorKind::UnexpectedTag { expected, actual },
            ));
        }
        self.read_length()
    }

    pub fn read_integer(&mut self) -> Result<i32> {
        let len = self.expect_tag(tag::universal::INTEGER)?;
        self.read_integer_value(len)
    }

    /// Two's-complement INTEGER body. Bodies longer than four octets are
    /// truncated to their leading four, as net-snmp does.
    pub fn read_integer_value(&mut self, len: usize) -> Result<i32> {
        if len == 0 {
            return Err(self.err(DecodeErrorKind::ZeroLengthInteger));
        }
        if len > 4 {
            tracing::warn!(target: "netloc::ber", { offset = self.offset(), length = len }, "integer longer than 4 bytes, truncating");
        }
        let bytes = self.read_bytes(len)?;
        let seed: i32 = if bytes[0] & 0x80 != 0 { -1 } else { 0 };
        Ok(bytes
            .iter()
            .take(4)
            .fold(seed, |acc, &b| (acc << 8) | b as i32))
    }

    pub fn read_unsigned32(&mut self, expected_tag: u8) -> Result<u32> {
        let len = self.expect_tag(expected_tag)?;
        self.read_unsigned32_value(len)
    }

    /// Unsigned body (Counter32, Gauge32, TimeTicks). Up to five octets
    /// to allow the leading zero.
    pub fn read_unsigned32_value(&mut self, len: usize) -> Result<u32> {
        if len == 0 {
            return Err(self.err(DecodeErrorKind::ZeroLengthInteger));
        }
        if len > 5 {
            return Err(self.err(DecodeErrorKind::IntegerOverflow));
        }
        let bytes = self.read_bytes(len)?;
        let value = bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64);
        u32::try_from(value).map_err(|_| self.err(DecodeErrorKind::IntegerOverflow))
    }

    /// Counter64 body.
    pub fn read_integer64_value(&mut self, len: usize) -> Result<u64> {
        if len == 0 {
            return Err(self.err(DecodeErrorKind::ZeroLengthInteger));
        }
        if len > 9 {
            return Err(self.err(DecodeErrorKind::Integer64TooLong { length: len }));
        }
        let bytes = self.read_bytes(len)?;
        if len == 9 && bytes[0] != 0 {
            return Err(self.err(DecodeErrorKind::IntegerOverflow));
        }
        Ok(bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64))
    }

    pub fn read_octet_string(&mut self) -> Result<Bytes> {
        let len = self.expect_tag(tag::universal::OCTET_STRING)?;
        self.read_bytes(len)
    }

    pub fn read_null(&mut self) -> Result<()> {
        let len = self.expect_tag(tag::universal::NULL)?;
        if len != 0 {
            return Err(self.err(DecodeErrorKind::InvalidNull));
        }
        Ok(())
    }

    pub fn read_oid(&mut self) -> Result<Oid> {
        let len = self.expect_tag(tag::universal::OBJECT_IDENTIFIER)?;
        self.read_oid_value(len)
    }

    pub fn read_oid_value(&mut self, len: usize) -> Result<Oid> {
        let at = self.offset();
        let bytes = self.read_bytes(len)?;
        Oid::from_ber(&bytes, at)
    }

    pub fn read_ip_address(&mut self) -> Result<[u8; 4]> {
        let len = self.expect_tag(tag::application::IP_ADDRESS)?;
        self.read_ip_address_value(len)
    }

    pub fn read_ip_address_value(&mut self, len: usize) -> Result<[u8; 4]> {
        if len != 4 {
            return Err(self.err(DecodeErrorKind::InvalidIpAddressLength { length: len }));
        }
        let bytes = self.read_bytes(4)?;
        Ok([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    pub fn read_sequence(&mut self) -> Result<Decoder> {
        self.read_constructed(tag::universal::SEQUENCE)
    }

    /// Enter a constructed value with tag `expected_tag`.
    pub fn read_constructed(&mut self, expected_tag: u8) -> Result<Decoder> {
        let len = self.expect_tag(expected_tag)?;
        let base = self.offset();
        let data = self.read_bytes(len)?;
        Ok(Decoder {
            data,
            offset: 0,
            base,
        })
    }

    /// Skip one complete TLV.
    pub fn skip_tlv(&mut self) -> Result<()> {
        self.read_tag()?;
        let len = self.read_length()?;
        self.read_bytes(len).map(drop)
    }

    /// Fail unless every byte has been consumed.
    pub fn finish(&self) -> Result<()> {
        match self.remaining() {
            0 => Ok(()),
            remaining => Err(self.err(DecodeErrorKind::TrailingData { remaining })),
        }
    }
}
