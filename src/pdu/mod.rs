//! Protocol data units.

use std::fmt;

use crate::ber::{Decoder, EncodeBuf, tag};
use crate::error::{DecodeErrorKind, Error, Result};
use crate::oid::{Oid, SNMP_TRAP_OID};
use crate::value::Value;
use crate::varbind::{VarBind, decode_varbind_list, encode_varbind_list};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PduType {
    GetRequest = tag::pdu::GET_REQUEST,
    GetNextRequest = tag::pdu::GET_NEXT_REQUEST,
    Response = tag::pdu::RESPONSE,
    SetRequest = tag::pdu::SET_REQUEST,
    TrapV1 = tag::pdu::TRAP_V1,
    GetBulkRequest = tag::pdu::GET_BULK_REQUEST,
    InformRequest = tag::pdu::INFORM_REQUEST,
    TrapV2 = tag::pdu::TRAP_V2,
    Report = tag::pdu::REPORT,
}

impl PduType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            tag::pdu::GET_REQUEST => Self::GetRequest,
            tag::pdu::GET_NEXT_REQUEST => Self::GetNextRequest,
            tag::pdu::RESPONSE => Self::Response,
            tag::pdu::SET_REQUEST => Self::SetRequest,
            tag::pdu::TRAP_V1 => Self::TrapV1,
            tag::pdu::GET_BULK_REQUEST => Self::GetBulkRequest,
            tag::pdu::INFORM_REQUEST => Self::InformRequest,
            tag::pdu::TRAP_V2 => Self::TrapV2,
            tag::pdu::REPORT => Self::Report,
            _ => return None,
        })
    }

    pub fn tag(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for PduType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::GetRequest => "GetRequest",
            Self::GetNextRequest => "GetNextRequest",
            Self::Response => "Response",
            Self::SetRequest => "SetRequest",
            Self::TrapV1 => "TrapV1",
            Self::GetBulkRequest => "GetBulkRequest",
            Self::InformRequest => "InformRequest",
            Self::TrapV2 => "TrapV2",
            Self::Report => "Report",
        })
    }
}

/// The common request/response PDU shape. Everything except the v1 trap uses it.
#[derive(Debug, Clone, PartialEq)]
pub struct Pdu {
    pub pdu_type: PduType,
    pub request_id: i32,
    pub error_status: i32,
    pub error_index: i32,
    pub varbinds: Vec<VarBind>,
}

impl Pdu {
    pub fn new(pdu_type: PduType, request_id: i32, varbinds: Vec<VarBind>) -> Self {
        Self {
            pdu_type,
            request_id,
            error_status: 0,
            error_index: 0,
            varbinds,
        }
    }

    pub fn get_request(request_id: i32, oids: &[Oid]) -> Self {
        Self::new(
            PduType::GetRequest,
            request_id,
            oids.iter().cloned().map(VarBind::null).collect(),
        )
    }

    pub fn get_next_request(request_id: i32, oids: &[Oid]) -> Self {
        Self::new(
            PduType::GetNextRequest,
            request_id,
            oids.iter().cloned().map(VarBind::null).collect(),
        )
    }

    /// v2 notification with the mandatory `sysUpTime.0` and `snmpTrapOID.0`
    /// bindings prepended to `varbinds`.
    pub fn notification(
        pdu_type: PduType,
        request_id: i32,
        uptime: u32,
        trap_oid: Oid,
        varbinds: Vec<VarBind>,
    ) -> Self {
        let mut all = Vec::with_capacity(varbinds.len() + 2);
        all.push(VarBind::new(
            Oid::from_slice(crate::oid::SYS_UPTIME),
            Value::TimeTicks(uptime),
        ));
        all.push(VarBind::new(
            Oid::from_slice(SNMP_TRAP_OID),
            Value::ObjectIdentifier(trap_oid),
        ));
        all.extend(varbinds);
        Self::new(pdu_type, request_id, all)
    }

    /// Response acknowledging this PDU: same request id and bindings,
    /// no error.
    pub fn to_response(&self) -> Self {
        Self::new(PduType::Response, self.request_id, self.varbinds.clone())
    }

    /// Value of `snmpTrapOID.0`, if present.
    pub fn trap_oid(&self) -> Option<&Oid> {
        self.varbinds
            .iter()
            .find(|vb| vb.oid.arcs() == SNMP_TRAP_OID)
            .and_then(|vb| vb.value.as_oid())
    }

    pub fn encode(&self, buf: &mut EncodeBuf) {
        buf.push_constructed(self.pdu_type.tag(), |buf| {
            encode_varbind_list(buf, &self.varbinds);
            buf.push_integer(self.error_index);
            buf.push_integer(self.error_status);
            buf.push_integer(self.request_id);
        });
    }

    pub fn decode(decoder: &mut Decoder) -> Result<Self> {
        let at = decoder.offset();
        let tag = decoder.peek_tag().unwrap_or_default();
        let pdu_type = PduType::from_tag(tag)
            .filter(|t| *t != PduType::TrapV1)
            .ok_or_else(|| Error::decode(at, DecodeErrorKind::UnknownPduType(tag)))?;
        let mut body = decoder.read_constructed(tag)?;
        let request_id = body.read_integer()?;
        let error_status = body.read_integer()?;
        let error_index = body.read_integer()?;
        let varbinds = decode_varbind_list(&mut body)?;
        Ok(Self {
            pdu_type,
            request_id,
            error_status,
            error_index,
            varbinds,
        })
    }
}

/// v1 generic trap codes (RFC 1157 4.1.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum GenericTrap {
    ColdStart = 0,
    WarmStart = 1,
    LinkDown = 2,
    LinkUp = 3,
    AuthenticationFailure = 4,
    EgpNeighborLoss = 5,
    EnterpriseSpecific = 6,
}

impl GenericTrap {
    pub fn from_i32(v: i32) -> Option<Self> {
        Some(match v {
            0 => Self::ColdStart,
            1 => Self::WarmStart,
            2 => Self::LinkDown,
            3 => Self::LinkUp,
            4 => Self::AuthenticationFailure,
            5 => Self::EgpNeighborLoss,
            6 => Self::EnterpriseSpecific,
            _ => return None,
        })
    }
}

/// SNMPv1 Trap-PDU.
#[derive(Debug, Clone, PartialEq)]
pub struct TrapV1Pdu {
    pub enterprise: Oid,
    pub agent_addr: [u8; 4],
    pub generic_trap: i32,
    pub specific_trap: i32,
    /// TimeTicks since the agent (re)started.
    pub time_stamp: u32,
    pub varbinds: Vec<VarBind>,
}

impl TrapV1Pdu {
    pub fn new(
        enterprise: Oid,
        agent_addr: [u8; 4],
        generic_trap: GenericTrap,
        specific_trap: i32,
        time_stamp: u32,
        varbinds: Vec<VarBind>,
    ) -> Self {
        Self {
            enterprise,
            agent_addr,
            generic_trap: generic_trap as i32,
            specific_trap,
            time_stamp,
            varbinds,
        }
    }

    pub fn generic(&self) -> Option<GenericTrap> {
        GenericTrap::from_i32(self.generic_trap)
    }

    /// Equivalent v2 `snmpTrapOID.0` (RFC 3584 3.1).
    ///
    /// ```
    /// use netloc::oid;
    /// use netloc::pdu::{GenericTrap, TrapV1Pdu};
    ///
    /// let trap = TrapV1Pdu::new(oid!(1, 3, 6, 1, 4, 1, 9), [10, 0, 0, 1], GenericTrap::LinkDown, 0, 0, vec![]);
    /// assert_eq!(trap.v2_trap_oid(), oid!(1, 3, 6, 1, 6, 3, 1, 1, 5, 3));
    /// ```
    pub fn v2_trap_oid(&self) -> Oid {
        if self.generic() == Some(GenericTrap::EnterpriseSpecific) {
            let arcs = self.enterprise.arcs().iter().copied();
            Oid::new(arcs.chain([0, self.specific_trap as u32]))
        } else {
            Oid::new([1, 3, 6, 1, 6, 3, 1, 1, 5, self.generic_trap as u32 + 1])
        }
    }

    pub fn encode(&self, buf: &mut EncodeBuf) {
        buf.push_constructed(tag::pdu::TRAP_V1, |buf| {
            encode_varbind_list(buf, &self.varbinds);
            buf.push_unsigned32(tag::application::TIMETICKS, self.time_stamp);
            buf.push_integer(self.specific_trap);
            buf.push_integer(self.generic_trap);
            buf.push_ip_address(self.agent_addr);
            buf.push_oid(&self.enterprise);
        });
    }

    pub fn decode(decoder: &mut Decoder) -> Result<Self> {
        let mut body = decoder.read_constructed(tag::pdu::TRAP_V1)?;
        let enterprise = body.read_oid()?;
        let agent_addr = body.read_ip_address()?;
        let generic_trap = body.read_integer()?;
        let specific_trap = body.read_integer()?;
        let time_stamp = body.read_unsigned32(tag::application::TIMETICKS)?;
        let varbinds = decode_varbind_list(&mut body)?;
        Ok(Self {
            enterprise,
            agent_addr,
            generic_trap,
            specific_trap,
            time_stamp,
            varbinds,
        })
    }
}

/// Either PDU shape, as found inside a message.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyPdu {
    Standard(Pdu),
    TrapV1(TrapV1Pdu),
}

impl AnyPdu {
    pub fn pdu_type(&self) -> PduType {
        match self {
            AnyPdu::Standard(pdu) => pdu.pdu_type,
            AnyPdu::TrapV1(_) => PduType::TrapV1,
        }
    }

    pub fn varbinds(&self) -> &[VarBind] {
        match self {
            AnyPdu::Standard(pdu) => &pdu.varbinds,
            AnyPdu::TrapV1(trap) => &trap.varbinds,
        }
    }

    /// Notification OID, translated to v2 form for v1 traps.
    pub fn trap_oid(&self) -> Option<Oid> {
        match self {
            AnyPdu::Standard(pdu) => pdu.trap_oid().cloned(),
            AnyPdu::TrapV1(trap) => Some(trap.v2_trap_oid()),
        }
    }

    pub fn as_pdu(&self) -> Option<&Pdu> {
        match self {
            AnyPdu::Standard(pdu) => Some(pdu),
            AnyPdu::TrapV1(_) => None,
        }
    }

    pub fn encode(&self, buf: &mut EncodeBuf) {
        match self {
            AnyPdu::Standard(pdu) => pdu.encode(buf),
            AnyPdu::TrapV1(trap) => trap.encode(buf),
        }
    }

    pub fn decode(decoder: &mut Decoder) -> Result<Self> {
        match decoder.peek_tag() {
            Some(tag::pdu::TRAP_V1) => TrapV1Pdu::decode(decoder).map(AnyPdu::TrapV1),
            _ => Pdu::decode(decoder).map(AnyPdu::Standard),
        }
    }
}

impl From<Pdu> for AnyPdu {
    fn from(pdu: Pdu) -> Self {
        AnyPdu::Standard(pdu)
    }
}

impl From<TrapV1Pdu> for AnyPdu {
    fn from(trap: TrapV1Pdu) -> Self {
        AnyPdu::TrapV1(trap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid;

    fn reencode(pdu: &AnyPdu) -> AnyPdu {
        let mut buf = EncodeBuf::new();
        pdu.encode(&mut buf);
        AnyPdu::decode(&mut Decoder::new(buf.finish())).unwrap()
    }

    #[test]
    fn test_trap_v1_survives_encoding() {
        let trap = TrapV1Pdu::new(
            oid!(1, 3, 6, 1, 4, 1, 9, 1, 516),
            [10, 20, 0, 1],
            GenericTrap::LinkUp,
            0,
            42_000,
            vec![VarBind::new(oid!(1, 3, 6, 1, 2, 1, 2, 2, 1, 1, 5), Value::Integer(5))],
        );
        let pdu = AnyPdu::from(trap.clone());
        assert_eq!(reencode(&pdu), AnyPdu::TrapV1(trap));
    }

    #[test]
    fn test_inform_response_and_trap_oid() {
        let link_down = oid!(1, 3, 6, 1, 6, 3, 1, 1, 5, 3);
        let inform = Pdu::notification(PduType::InformRequest, 77, 1234, link_down.clone(), vec![]);
        assert_eq!(inform.trap_oid(), Some(&link_down));

        let response = inform.to_response();
        assert_eq!(response.pdu_type, PduType::Response);
        assert_eq!(response.request_id, 77);
        assert_eq!(response.varbinds, inform.varbinds);
    }

    #[test]
    fn test_enterprise_specific_trap_oid() {
        let trap = TrapV1Pdu::new(
            oid!(1, 3, 6, 1, 4, 1, 9999),
            [0; 4],
            GenericTrap::EnterpriseSpecific,
            42,
            0,
            vec![],
        );
        assert_eq!(trap.v2_trap_oid(), oid!(1, 3, 6, 1, 4, 1, 9999, 0, 42));
    }

    #[test]
    fn test_unknown_pdu_tag() {
        let mut dec = Decoder::from_slice(&[0xAF, 0x00]);
        let err = AnyPdu::decode(&mut dec).unwrap_err();
        assert!(matches!(
            *err,
            Error::Decode {
                kind: DecodeErrorKind::UnknownPduType(0xAF),
                ..
            }
        ));
    }
}
