//! Message envelopes around PDUs.
//!
//! - [`CommunityMessage`]: v1/v2c, `SEQUENCE { version, community, pdu }`
//! - [`V3Message`]: v3 with USM security parameters

mod community;
mod v3;

pub use community::CommunityMessage;
pub use v3::{
    MsgFlags, MsgGlobalData, SecurityLevel, SecurityModel, ScopedPdu, V3Message, V3MessageData,
};

use bytes::Bytes;

use crate::ber::Decoder;
use crate::error::Result;
use crate::version::Version;

/// Any decoded message. A v3 body may still be encrypted at this stage.
#[derive(Debug, Clone)]
pub enum Message {
    Community(CommunityMessage),
    V3(V3Message),
}

impl Message {
    /// Decode the outer envelope, dispatching on the version field.
    pub fn decode(data: Bytes) -> Result<Self> {
        let mut decoder = Decoder::new(data);
        let mut seq = decoder.read_sequence()?;
        let at = seq.offset();
        let version = Version::from_wire(seq.read_integer()?, at)?;
        match version {
            Version::V1 | Version::V2c => {
                CommunityMessage::decode_body(&mut seq, version).map(Message::Community)
            }
            Version::V3 => V3Message::decode_body(&mut seq).map(Message::V3),
        }
    }

    pub fn version(&self) -> Version {
        match self {
            Message::Community(m) => m.version,
            Message::V3(_) => Version::V3,
        }
    }
}

impl From<CommunityMessage> for Message {
    fn from(msg: CommunityMessage) -> Self {
        Message::Community(msg)
    }
}

impl From<V3Message> for Message {
    fn from(msg: V3Message) -> Self {
        Message::V3(msg)
    }
}
