//! SNMP protocol data units.

use crate::ber::{Decoder, EncodeBuf, tag};
use crate::error::{DecodeErrorKind, Error, ErrorStatus, Result};
use crate::oid::Oid;
use crate::varbind::{VarBind, decode_varbind_list, encode_varbind_list};

/// PDU type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PduType {
    GetRequest = 0xA0,
    GetNextRequest = 0xA1,
    Response = 0xA2,
    SetRequest = 0xA3,
    GetBulkRequest = 0xA5,
    Report = 0xA8,
}

impl PduType {
    /// From a tag byte. Tags outside the set the engine speaks (including
    /// the trap/inform family) return `None` and are rejected upstream.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0xA0 => Some(Self::GetRequest),
            0xA1 => Some(Self::GetNextRequest),
            0xA2 => Some(Self::Response),
            0xA3 => Some(Self::SetRequest),
            0xA5 => Some(Self::GetBulkRequest),
            0xA8 => Some(Self::Report),
            _ => None,
        }
    }

    /// The tag byte.
    pub fn tag(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for PduType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GetRequest => write!(f, "GetRequest"),
            Self::GetNextRequest => write!(f, "GetNextRequest"),
            Self::Response => write!(f, "Response"),
            Self::SetRequest => write!(f, "SetRequest"),
            Self::GetBulkRequest => write!(f, "GetBulkRequest"),
            Self::Report => write!(f, "Report"),
        }
    }
}

/// Request/response PDU: request id, error status, error index, bindings.
#[derive(Debug, Clone)]
pub struct Pdu {
    /// PDU type.
    pub pdu_type: PduType,
    /// Correlates responses with requests; constant across retransmits.
    pub request_id: i32,
    /// 0 on success, otherwise an [`ErrorStatus`] code.
    pub error_status: i32,
    /// 1-based index of the offending binding, 0 when not applicable.
    pub error_index: i32,
    /// Variable bindings.
    pub varbinds: Vec<VarBind>,
}

impl Pdu {
    /// GET request: each OID paired with NULL.
    pub fn get_request(request_id: i32, oids: &[Oid]) -> Self {
        Self {
            pdu_type: PduType::GetRequest,
            request_id,
            error_status: 0,
            error_index: 0,
            varbinds: oids.iter().map(|oid| VarBind::null(oid.clone())).collect(),
        }
    }

    /// GETNEXT request.
    pub fn get_next_request(request_id: i32, oids: &[Oid]) -> Self {
        Self {
            pdu_type: PduType::GetNextRequest,
            request_id,
            error_status: 0,
            error_index: 0,
            varbinds: oids.iter().map(|oid| VarBind::null(oid.clone())).collect(),
        }
    }

    /// SET request with explicit bindings.
    pub fn set_request(request_id: i32, varbinds: Vec<VarBind>) -> Self {
        Self {
            pdu_type: PduType::SetRequest,
            request_id,
            error_status: 0,
            error_index: 0,
            varbinds,
        }
    }

    /// Encode to BER.
    pub fn encode(&self, buf: &mut EncodeBuf) {
        buf.push_constructed(self.pdu_type.tag(), |buf| {
            encode_varbind_list(buf, &self.varbinds);
            buf.push_integer(self.error_index as i64);
            buf.push_integer(self.error_status as i64);
            buf.push_integer(self.request_id as i64);
        });
    }

    /// Decode from BER.
    ///
    /// An unknown PDU tag is rejected as malformed rather than skipped.
    pub fn decode(decoder: &mut Decoder) -> Result<Self> {
        let tag_byte = decoder.read_tag()?;
        let pdu_type = PduType::from_tag(tag_byte).ok_or_else(|| {
            Error::decode(decoder.offset(), DecodeErrorKind::UnknownPduType(tag_byte))
        })?;

        let len = decoder.read_length()?;
        let mut pdu = decoder.sub_decoder(len)?;

        let request_id = pdu.read_integer32()?;
        let error_status = pdu.read_integer32()?;
        let error_index = pdu.read_integer32()?;
        let varbinds = decode_varbind_list(&mut pdu)?;

        Ok(Pdu {
            pdu_type,
            request_id,
            error_status,
            error_index,
            varbinds,
        })
    }

    /// Whether the agent reported an error.
    pub fn is_error(&self) -> bool {
        self.error_status != 0
    }

    /// Error status mapped through the fixed table.
    pub fn error_status_enum(&self) -> ErrorStatus {
        ErrorStatus::from_i32(self.error_status)
    }
}

/// GETBULK request. Shares the generic PDU wire layout, with the
/// error-status and error-index fields reinterpreted as non-repeaters and
/// max-repetitions.
#[derive(Debug, Clone)]
pub struct GetBulkPdu {
    /// Request id.
    pub request_id: i32,
    /// Leading OIDs answered with a single GETNEXT each.
    pub non_repeaters: i32,
    /// Upper bound of values returned per repeating OID; the agent may
    /// return fewer.
    pub max_repetitions: i32,
    /// Variable bindings.
    pub varbinds: Vec<VarBind>,
}

impl GetBulkPdu {
    /// GETBULK request for the given OIDs.
    pub fn new(request_id: i32, non_repeaters: i32, max_repetitions: i32, oids: &[Oid]) -> Self {
        Self {
            request_id,
            non_repeaters,
            max_repetitions,
            varbinds: oids.iter().map(|oid| VarBind::null(oid.clone())).collect(),
        }
    }

    /// Encode to BER.
    pub fn encode(&self, buf: &mut EncodeBuf) {
        buf.push_constructed(tag::pdu::GET_BULK_REQUEST, |buf| {
            encode_varbind_list(buf, &self.varbinds);
            buf.push_integer(self.max_repetitions as i64);
            buf.push_integer(self.non_repeaters as i64);
            buf.push_integer(self.request_id as i64);
        });
    }

    /// Decode from BER.
    pub fn decode(decoder: &mut Decoder) -> Result<Self> {
        let mut pdu = decoder.read_constructed(tag::pdu::GET_BULK_REQUEST)?;

        let request_id = pdu.read_integer32()?;
        let non_repeaters = pdu.read_integer32()?;
        let max_repetitions = pdu.read_integer32()?;
        let varbinds = decode_varbind_list(&mut pdu)?;

        Ok(GetBulkPdu {
            request_id,
            non_repeaters,
            max_repetitions,
            varbinds,
        })
    }
}
