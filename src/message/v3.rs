//! SNMPv3 message envelope (RFC 3412 6).
//!
//! ```text
//! SEQUENCE {
//!     version             INTEGER (3)
//!     msgGlobalData       SEQUENCE { msgID, msgMaxSize, msgFlags, msgSecurityModel }
//!     msgSecurityParameters OCTET STRING (USM, RFC 3414 2.4)
//!     msgData             ScopedPDU | OCTET STRING (encrypted ScopedPDU)
//! }
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::ber::{Decoder, EncodeBuf};
use crate::error::{DecodeErrorKind, Error, Result};
use crate::pdu::AnyPdu;

/// RFC 3412 lower bound on `msgMaxSize`.
const MSG_MAX_SIZE_MINIMUM: i32 = 484;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum SecurityModel {
    Usm = 3,
}

/// Ordered from weakest to strongest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum SecurityLevel {
    NoAuthNoPriv,
    AuthNoPriv,
    AuthPriv,
}

impl SecurityLevel {
    /// Level encoded in the low bits of `msgFlags`; privacy without
    /// authentication is invalid.
    pub fn from_flags(flags: u8) -> Option<Self> {
        match (flags & 0x01 != 0, flags & 0x02 != 0) {
            (false, false) => Some(Self::NoAuthNoPriv),
            (true, false) => Some(Self::AuthNoPriv),
            (true, true) => Some(Self::AuthPriv),
            (false, true) => None,
        }
    }

    pub fn to_flags(self) -> u8 {
        match self {
            Self::NoAuthNoPriv => 0x00,
            Self::AuthNoPriv => 0x01,
            Self::AuthPriv => 0x03,
        }
    }

    pub fn requires_auth(self) -> bool {
        self >= Self::AuthNoPriv
    }

    pub fn requires_priv(self) -> bool {
        self == Self::AuthPriv
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgFlags {
    pub security_level: SecurityLevel,
    pub reportable: bool,
}

impl MsgFlags {
    pub fn new(security_level: SecurityLevel, reportable: bool) -> Self {
        Self {
            security_level,
            reportable,
        }
    }

    pub fn from_byte(byte: u8, offset: usize) -> Result<Self> {
        let security_level = SecurityLevel::from_flags(byte)
            .ok_or_else(|| Error::decode(offset, DecodeErrorKind::InvalidMsgFlags))?;
        Ok(Self::new(security_level, byte & 0x04 != 0))
    }

    pub fn to_byte(self) -> u8 {
        self.security_level.to_flags() | if self.reportable { 0x04 } else { 0 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MsgGlobalData {
    pub msg_id: i32,
    pub msg_max_size: i32,
    pub msg_flags: MsgFlags,
    pub msg_security_model: SecurityModel,
}

impl MsgGlobalData {
    pub fn new(msg_id: i32, msg_max_size: i32, msg_flags: MsgFlags) -> Self {
        Self {
            msg_id,
            msg_max_size,
            msg_flags,
            msg_security_model: SecurityModel::Usm,
        }
    }

    pub fn encode(&self, buf: &mut EncodeBuf) {
        buf.push_sequence(|buf| {
            buf.push_integer(self.msg_security_model as i32);
            buf.push_octet_string(&[self.msg_flags.to_byte()]);
            buf.push_integer(self.msg_max_size);
            buf.push_integer(self.msg_id);
        });
    }

    pub fn decode(decoder: &mut Decoder) -> Result<Self> {
        let mut seq = decoder.read_sequence()?;

        let at = seq.offset();
        let msg_id = seq.read_integer()?;
        if msg_id < 0 {
            return Err(Error::decode(at, DecodeErrorKind::InvalidMsgId { value: msg_id }));
        }

        let at = seq.offset();
        let msg_max_size = seq.read_integer()?;
        if msg_max_size < MSG_MAX_SIZE_MINIMUM {
            return Err(Error::decode(
                at,
                DecodeErrorKind::MsgMaxSizeTooSmall {
                    value: msg_max_size,
                    minimum: MSG_MAX_SIZE_MINIMUM,
                },
            ));
        }

        let at = seq.offset();
        let flags = seq.read_octet_string()?;
        let [flags] = flags[..] else {
            return Err(Error::decode(
                at,
                DecodeErrorKind::InvalidMsgFlagsLength { length: flags.len() },
            ));
        };
        let msg_flags = MsgFlags::from_byte(flags, at)?;

        let at = seq.offset();
        let msg_security_model = match seq.read_integer()? {
            3 => SecurityModel::Usm,
            other => return Err(Error::decode(at, DecodeErrorKind::UnknownSecurityModel(other))),
        };

        Ok(Self {
            msg_id,
            msg_max_size,
            msg_flags,
            msg_security_model,
        })
    }
}

/// contextEngineID, contextName and the PDU.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedPdu {
    pub context_engine_id: Bytes,
    pub context_name: Bytes,
    pub pdu: AnyPdu,
}

impl ScopedPdu {
    pub fn new(
        context_engine_id: impl Into<Bytes>,
        context_name: impl Into<Bytes>,
        pdu: impl Into<AnyPdu>,
    ) -> Self {
        Self {
            context_engine_id: context_engine_id.into(),
            context_name: context_name.into(),
            pdu: pdu.into(),
        }
    }

    pub fn encode(&self, buf: &mut EncodeBuf) {
        buf.push_sequence(|buf| {
            self.pdu.encode(buf);
            buf.push_octet_string(&self.context_name);
            buf.push_octet_string(&self.context_engine_id);
        });
    }

    /// Standalone encoding, the plaintext input to encryption.
    pub fn encode_to_bytes(&self) -> Bytes {
        let mut buf = EncodeBuf::new();
        self.encode(&mut buf);
        buf.finish()
    }

    pub fn decode(decoder: &mut Decoder) -> Result<Self> {
        let mut seq = decoder.read_sequence()?;
        let context_engine_id = seq.read_octet_string()?;
        let context_name = seq.read_octet_string()?;
        let pdu = AnyPdu::decode(&mut seq)?;
        Ok(Self {
            context_engine_id,
            context_name,
            pdu,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum V3MessageData {
    Plaintext(ScopedPdu),
    /// Ciphertext of an encoded ScopedPDU (authPriv).
    Encrypted(Bytes),
}

#[derive(Debug, Clone, PartialEq)]
pub struct V3Message {
    pub global_data: MsgGlobalData,
    /// Encoded USM parameters, opaque at this layer.
    pub security_params: Bytes,
    pub data: V3MessageData,
}

impl V3Message {
    pub fn new(global_data: MsgGlobalData, security_params: Bytes, scoped_pdu: ScopedPdu) -> Self {
        Self {
            global_data,
            security_params,
            data: V3MessageData::Plaintext(scoped_pdu),
        }
    }

    pub fn new_encrypted(global_data: MsgGlobalData, security_params: Bytes, ciphertext: Bytes) -> Self {
        Self {
            global_data,
            security_params,
            data: V3MessageData::Encrypted(ciphertext),
        }
    }

    pub fn security_level(&self) -> SecurityLevel {
        self.global_data.msg_flags.security_level
    }

    pub fn scoped_pdu(&self) -> Option<&ScopedPdu> {
        match &self.data {
            V3MessageData::Plaintext(scoped) => Some(scoped),
            V3MessageData::Encrypted(_) => None,
        }
    }

    /// Encode as-is. Authenticated messages must carry zeroed
    /// authentication parameters here; the HMAC is patched in afterwards.
    pub fn encode(&self) -> Bytes {
        let mut buf = EncodeBuf::new();
        buf.push_sequence(|buf| {
            match &self.data {
                V3MessageData::Plaintext(scoped) => scoped.encode(buf),
                V3MessageData::Encrypted(ciphertext) => buf.push_octet_string(ciphertext),
            }
            buf.push_octet_string(&self.security_params);
            self.global_data.encode(buf);
            buf.push_integer(3);
        });
        buf.finish()
    }

    /// Remainder of the message after the version field.
    pub(crate) fn decode_body(seq: &mut Decoder) -> Result<Self> {
        let global_data = MsgGlobalData::decode(seq)?;
        let security_params = seq.read_octet_string()?;
        let encrypted = global_data.msg_flags.security_level.requires_priv();
        let data = match (encrypted, seq.peek_tag()) {
            (true, _) => V3MessageData::Encrypted(seq.read_octet_string()?),
            (false, Some(crate::ber::tag::universal::OCTET_STRING)) => {
                return Err(Error::decode(seq.offset(), DecodeErrorKind::UnexpectedEncryption));
            }
            (false, _) => V3MessageData::Plaintext(ScopedPdu::decode(seq)?),
        };
        Ok(Self {
            global_data,
            security_params,
            data,
        })
    }
}
