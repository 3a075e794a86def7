//! USM security parameters (RFC 3414).
//!
//! Carried inside `msgSecurityParameters` as an OCTET STRING wrapping:
//!
//! ```text
//! UsmSecurityParameters ::= SEQUENCE {
//!     msgAuthoritativeEngineID     OCTET STRING,
//!     msgAuthoritativeEngineBoots  INTEGER (0..2147483647),
//!     msgAuthoritativeEngineTime   INTEGER (0..2147483647),
//!     msgUserName                  OCTET STRING (SIZE(0..32)),
//!     msgAuthenticationParameters  OCTET STRING,
//!     msgPrivacyParameters         OCTET STRING
//! }
//! ```

use bytes::Bytes;

use crate::ber::{Decoder, EncodeBuf, tag};
use crate::error::{DecodeErrorKind, Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsmSecurityParams {
    pub engine_id: Bytes,
    pub engine_boots: u32,
    /// Seconds since the engine last booted.
    pub engine_time: u32,
    pub username: Bytes,
    /// Truncated HMAC, or empty.
    pub auth_params: Bytes,
    /// AES salt, or empty.
    pub priv_params: Bytes,
}

impl UsmSecurityParams {
    pub fn new(
        engine_id: impl Into<Bytes>,
        engine_boots: u32,
        engine_time: u32,
        username: impl Into<Bytes>,
    ) -> Self {
        Self {
            engine_id: engine_id.into(),
            engine_boots,
            engine_time,
            username: username.into(),
            auth_params: Bytes::new(),
            priv_params: Bytes::new(),
        }
    }

    pub fn with_priv_params(mut self, priv_params: impl Into<Bytes>) -> Self {
        self.priv_params = priv_params.into();
        self
    }

    /// Zeroed authentication parameters of the MAC's length. The HMAC is
    /// computed over the message with these zeros in place and then written
    /// over them.
    pub fn with_auth_placeholder(mut self, mac_len: usize) -> Self {
        self.auth_params = Bytes::from(vec![0u8; mac_len]);
        self
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = EncodeBuf::new();
        buf.push_sequence(|buf| {
            buf.push_octet_string(&self.priv_params);
            buf.push_octet_string(&self.auth_params);
            buf.push_octet_string(&self.username);
            buf.push_unsigned32(tag::universal::INTEGER, self.engine_time);
            buf.push_unsigned32(tag::universal::INTEGER, self.engine_boots);
            buf.push_octet_string(&self.engine_id);
        });
        buf.finish()
    }

    /// Decode the contents of `msgSecurityParameters`. `base` is the absolute
    /// offset of those contents within the message, for error reporting.
    pub fn decode(data: Bytes, base: usize) -> Result<Self> {
        let mut outer = Decoder::with_base(data, base);
        let mut seq = outer.read_sequence()?;

        let engine_id = seq.read_octet_string()?;

        let at = seq.offset();
        let engine_boots = match seq.read_integer()? {
            value if value < 0 => {
                return Err(Error::decode(at, DecodeErrorKind::InvalidEngineBoots { value }));
            }
            value => value as u32,
        };

        let at = seq.offset();
        let engine_time = match seq.read_integer()? {
            value if value < 0 => {
                return Err(Error::decode(at, DecodeErrorKind::InvalidEngineTime { value }));
            }
            value => value as u32,
        };

        let username = seq.read_octet_string()?;
        let auth_params = seq.read_octet_string()?;
        let priv_params = seq.read_octet_string()?;
        seq.finish()?;

        Ok(Self {
            engine_id,
            engine_boots,
            engine_time,
            username,
            auth_params,
            priv_params,
        })
    }

    /// Locate `msgAuthenticationParameters` in an encoded v3 message,
    /// returning `(offset, length)` of its contents.
    pub fn find_auth_params_offset(encoded_msg: &Bytes) -> Option<(usize, usize)> {
        let mut outer = Decoder::new(encoded_msg.clone());
        let mut msg = outer.read_sequence().ok()?;
        msg.read_integer().ok()?;
        // msgGlobalData
        msg.skip_tlv().ok()?;
        let mut wrapper = msg.read_constructed(tag::universal::OCTET_STRING).ok()?;
        let mut usm = wrapper.read_sequence().ok()?;
        usm.read_octet_string().ok()?;
        usm.skip_tlv().ok()?;
        usm.skip_tlv().ok()?;
        usm.read_octet_string().ok()?;
        let len = usm.expect_tag(tag::universal::OCTET_STRING).ok()?;
        let offset = usm.offset();
        (offset + len <= encoded_msg.len()).then_some((offset, len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MsgFlags, MsgGlobalData, ScopedPdu, SecurityLevel, V3Message};
    use crate::oid;
    use crate::pdu::{Pdu, PduType};

    fn params() -> UsmSecurityParams {
        UsmSecurityParams::new(
            Bytes::from_static(b"\x80\x00\x1f\x88\x80\x01\x02\x03"),
            7,
            86_400,
            Bytes::from_static(b"trapuser"),
        )
    }

    #[test]
    fn test_params_survive_encoding() {
        let params = params()
            .with_auth_placeholder(12)
            .with_priv_params(Bytes::from_static(&[1, 2, 3, 4, 5, 6, 7, 8]));
        assert_eq!(UsmSecurityParams::decode(params.encode(), 0).unwrap(), params);
    }

    #[test]
    fn test_negative_boots_rejected() {
        // SEQUENCE { OCTET STRING "", INTEGER -1, INTEGER 0, "", "", "" }
        let raw = Bytes::from_static(&[
            0x30, 0x0E, 0x04, 0x00, 0x02, 0x01, 0xFF, 0x02, 0x01, 0x00, 0x04, 0x00, 0x04, 0x00,
            0x04, 0x00,
        ]);
        let err = UsmSecurityParams::decode(raw, 20).unwrap_err();
        assert!(matches!(
            *err,
            Error::Decode {
                offset: 24,
                kind: DecodeErrorKind::InvalidEngineBoots { value: -1 }
            }
        ));
    }

    #[test]
    fn test_find_auth_params_offset() {
        let usm = params().with_auth_placeholder(12);
        let inform = Pdu::notification(
            PduType::InformRequest,
            9,
            0,
            oid!(1, 3, 6, 1, 6, 3, 1, 1, 5, 3),
            vec![],
        );
        let global = MsgGlobalData::new(1, 1472, MsgFlags::new(SecurityLevel::AuthNoPriv, true));
        let msg = V3Message::new(global, usm.encode(), ScopedPdu::new(Bytes::new(), Bytes::new(), inform));
        let encoded = msg.encode();

        let (offset, len) = UsmSecurityParams::find_auth_params_offset(&encoded).unwrap();
        assert_eq!(len, 12);
        assert!(encoded[offset..offset + len].iter().all(|b| *b == 0));
        // the username precedes the MAC field directly
        assert_eq!(&encoded[offset - 2 - 8..offset - 2], b"trapuser");
    }

    #[test]
    fn test_find_auth_params_offset_garbage() {
        assert!(UsmSecurityParams::find_auth_params_offset(&Bytes::from_static(&[0x30, 0x03, 0x02])).is_none());
    }
}
