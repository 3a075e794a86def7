//! v1/v2c community messages.

use bytes::Bytes;

use crate::ber::{Decoder, EncodeBuf};
use crate::error::Result;
use crate::pdu::AnyPdu;
use crate::version::Version;

#[derive(Debug, Clone, PartialEq)]
pub struct CommunityMessage {
    pub version: Version,
    pub community: Bytes,
    pub pdu: AnyPdu,
}

impl CommunityMessage {
    pub fn new(version: Version, community: impl Into<Bytes>, pdu: impl Into<AnyPdu>) -> Self {
        debug_assert!(version != Version::V3);
        Self {
            version,
            community: community.into(),
            pdu: pdu.into(),
        }
    }

    pub fn v1(community: impl Into<Bytes>, pdu: impl Into<AnyPdu>) -> Self {
        Self::new(Version::V1, community, pdu)
    }

    pub fn v2c(community: impl Into<Bytes>, pdu: impl Into<AnyPdu>) -> Self {
        Self::new(Version::V2c, community, pdu)
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = EncodeBuf::new();
        buf.push_sequence(|buf| {
            self.pdu.encode(buf);
            buf.push_octet_string(&self.community);
            buf.push_integer(self.version.as_i32());
        });
        buf.finish()
    }

    /// Remainder of the message after the version field.
    pub(crate) fn decode_body(seq: &mut Decoder, version: Version) -> Result<Self> {
        let community = seq.read_octet_string()?;
        let pdu = AnyPdu::decode(seq)?;
        Ok(Self {
            version,
            community,
            pdu,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use crate::oid;
    use crate::pdu::{GenericTrap, Pdu, TrapV1Pdu};

    #[test]
    fn test_v1_trap_message() {
        let trap = TrapV1Pdu::new(oid!(1, 3, 6, 1, 4, 1, 9), [10, 0, 0, 2], GenericTrap::LinkDown, 0, 500, vec![]);
        let encoded = CommunityMessage::v1(Bytes::from_static(b"public"), trap.clone()).encode();

        let Message::Community(msg) = Message::decode(encoded).unwrap() else {
            panic!("expected community message");
        };
        assert_eq!(msg.version, Version::V1);
        assert_eq!(&msg.community[..], b"public");
        assert_eq!(msg.pdu, AnyPdu::TrapV1(trap));
    }

    #[test]
    fn test_v2c_request_message() {
        let pdu = Pdu::get_request(9, &[oid!(1, 3, 6, 1, 2, 1, 1, 5, 0)]);
        let encoded = CommunityMessage::v2c(Bytes::from_static(b"secret"), pdu.clone()).encode();
        let msg = Message::decode(encoded).unwrap();
        assert_eq!(msg.version(), Version::V2c);
        let Message::Community(msg) = msg else {
            panic!("expected community message");
        };
        assert_eq!(msg.pdu.as_pdu(), Some(&pdu));
    }
}
