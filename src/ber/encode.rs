//! Back-to-front BER writer.
//!
//! Values are pushed in reverse order: the last field of a SEQUENCE first,
//! then the earlier ones, then the SEQUENCE header. Because every length is
//! known by the time its header is written, no patching is needed.

use bytes::Bytes;

use super::length::encode_length;
use super::tag;
use crate::oid::Oid;

/// Reverse-order encode buffer.
#[derive(Debug, Default)]
pub struct EncodeBuf {
    // Stored back to front; `finish` flips it.
    buf: Vec<u8>,
}

impl EncodeBuf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn push_tag(&mut self, tag: u8) {
        self.buf.push(tag);
    }

    pub fn push_length(&mut self, len: usize) {
        let (octets, n) = encode_length(len);
        self.buf.extend_from_slice(&octets[..n]);
    }

    /// Prepend `data` so it reads forwards in the finished output.
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buf.extend(data.iter().rev());
    }

    pub fn push_integer(&mut self, value: i32) {
        let be = value.to_be_bytes();
        let mut start = 0;
        while start < 3 {
            let redundant = (be[start] == 0x00 && be[start + 1] & 0x80 == 0)
                || (be[start] == 0xFF && be[start + 1] & 0x80 != 0);
            if !redundant {
                break;
            }
            start += 1;
        }
        self.push_primitive(tag::universal::INTEGER, &be[start..]);
    }

    /// Unsigned 32-bit value under an application tag.
    pub fn push_unsigned32(&mut self, tag: u8, value: u32) {
        self.push_unsigned(tag, u64::from(value));
    }

    pub fn push_integer64(&mut self, value: u64) {
        self.push_unsigned(tag::application::COUNTER64, value);
    }

    fn push_unsigned(&mut self, tag: u8, value: u64) {
        let mut octets = [0u8; 9];
        octets[1..].copy_from_slice(&value.to_be_bytes());
        let mut start = 0;
        while start < 8 && octets[start] == 0 && octets[start + 1] & 0x80 == 0 {
            start += 1;
        }
        self.push_primitive(tag, &octets[start..]);
    }

    pub fn push_octet_string(&mut self, data: &[u8]) {
        self.push_primitive(tag::universal::OCTET_STRING, data);
    }

    pub fn push_null(&mut self) {
        self.push_primitive(tag::universal::NULL, &[]);
    }

    pub fn push_oid(&mut self, oid: &Oid) {
        self.push_primitive(tag::universal::OBJECT_IDENTIFIER, &oid.to_ber());
    }

    pub fn push_ip_address(&mut self, addr: [u8; 4]) {
        self.push_primitive(tag::application::IP_ADDRESS, &addr);
    }

    /// Tag, length and contents of a primitive value.
    pub fn push_primitive(&mut self, tag: u8, contents: &[u8]) {
        self.push_bytes(contents);
        self.push_length(contents.len());
        self.push_tag(tag);
    }

    /// Write a SEQUENCE whose contents are produced by `f`.
    ///
    /// Inside `f`, push the fields last to first.
    pub fn push_sequence(&mut self, f: impl FnOnce(&mut Self)) {
        self.push_constructed(tag::universal::SEQUENCE, f);
    }

    pub fn push_constructed(&mut self, tag: u8, f: impl FnOnce(&mut Self)) {
        let before = self.buf.len();
        f(self);
        let contents = self.buf.len() - before;
        self.push_length(contents);
        self.push_tag(tag);
    }

    /// Flip into wire order.
    pub fn finish(mut self) -> Bytes {
        self.buf.reverse();
        Bytes::from(self.buf)
    }
}
