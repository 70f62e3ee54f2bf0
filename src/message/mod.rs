//! Top-level SNMP message framing.
//!
//! `SEQUENCE { version, ... }` where the rest depends on the version:
//! community string + PDU for v1/v2c, the RFC 3412 header structure for
//! v3.

mod community;
mod v3;

pub use community::CommunityMessage;
pub use v3::{MsgFlags, MsgGlobalData, ScopedPdu, SecurityModel, V3Message, V3MessageData};

use crate::ber::Decoder;
use crate::error::{DecodeErrorKind, Error, Result};
use crate::pdu::Pdu;
use crate::version::Version;
use bytes::Bytes;

/// A decoded SNMP message of any version.
#[derive(Debug, Clone)]
pub enum Message {
    /// v1/v2c community message.
    Community(CommunityMessage),
    /// v3 USM message.
    V3(V3Message),
}

impl Message {
    /// Decode a datagram, dispatching on the version field.
    ///
    /// Unknown top-level tags and unknown versions are malformed-message
    /// errors; nothing is defaulted.
    pub fn decode(data: Bytes) -> Result<Self> {
        let mut decoder = Decoder::new(data);
        let mut seq = decoder.read_sequence()?;

        let version_num = seq.read_integer()?;
        let version = i32::try_from(version_num)
            .ok()
            .and_then(Version::from_i32)
            .ok_or_else(|| {
                Error::decode(seq.offset(), DecodeErrorKind::UnknownVersion(version_num))
            })?;

        match version {
            Version::V1 | Version::V2c => Ok(Message::Community(
                CommunityMessage::decode_from_sequence(&mut seq, version)?,
            )),
            Version::V3 => Ok(Message::V3(V3Message::decode_from_sequence(&mut seq)?)),
        }
    }

    /// The message's version.
    pub fn version(&self) -> Version {
        match self {
            Message::Community(m) => m.version,
            Message::V3(_) => Version::V3,
        }
    }

    /// The carried PDU, when directly available (community messages and
    /// plaintext v3 messages).
    pub fn pdu(&self) -> Option<&Pdu> {
        match self {
            Message::Community(m) => Some(&m.pdu),
            Message::V3(m) => m.pdu(),
        }
    }

    /// Consume the message, returning its PDU when available.
    pub fn into_pdu(self) -> Option<Pdu> {
        match self {
            Message::Community(m) => Some(m.pdu),
            Message::V3(m) => m.into_pdu(),
        }
    }
}
