//! SNMPv3 message format (RFC 3412).
//!
//! ```text
//! SEQUENCE {
//!     INTEGER version (3)
//!     SEQUENCE msgGlobalData {
//!         INTEGER msgID
//!         INTEGER msgMaxSize
//!         OCTET STRING msgFlags (1 byte)
//!         INTEGER msgSecurityModel
//!     }
//!     OCTET STRING msgSecurityParameters (USM-encoded)
//!     msgData (plaintext ScopedPDU, or OCTET STRING ciphertext)
//! }
//! ```

use bytes::Bytes;

use crate::ber::{Decoder, EncodeBuf};
use crate::error::{DecodeErrorKind, Error, Result};
use crate::pdu::Pdu;
use crate::v3::{SecurityLevel, UsmSecurityParams};

/// Security model identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum SecurityModel {
    /// User-based Security Model (RFC 3414).
    Usm = 3,
}

impl SecurityModel {
    /// From the wire value.
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            3 => Some(Self::Usm),
            _ => None,
        }
    }

    /// The wire value.
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

/// msgFlags (RFC 3412 Section 6.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgFlags {
    /// Security level.
    pub security_level: SecurityLevel,
    /// Whether a report PDU may answer this message.
    pub reportable: bool,
}

impl MsgFlags {
    /// New flags.
    pub fn new(security_level: SecurityLevel, reportable: bool) -> Self {
        Self {
            security_level,
            reportable,
        }
    }

    /// Decode from the flags byte. The priv-without-auth combination is
    /// invalid per RFC 3412.
    pub fn from_byte(offset: usize, byte: u8) -> Result<Self> {
        let security_level = SecurityLevel::from_flags(byte)
            .ok_or_else(|| Error::decode(offset, DecodeErrorKind::InvalidMsgFlags))?;
        Ok(Self {
            security_level,
            reportable: byte & 0x04 != 0,
        })
    }

    /// Encode to the flags byte.
    pub fn to_byte(self) -> u8 {
        let mut flags = self.security_level.to_flags();
        if self.reportable {
            flags |= 0x04;
        }
        flags
    }
}

/// msgGlobalData header.
#[derive(Debug, Clone)]
pub struct MsgGlobalData {
    /// Message identifier for request/response correlation.
    pub msg_id: i32,
    /// Largest message the sender accepts.
    pub msg_max_size: i32,
    /// Flags.
    pub msg_flags: MsgFlags,
    /// Security model (USM).
    pub msg_security_model: SecurityModel,
}

/// Largest UDP payload we advertise.
pub const MSG_MAX_SIZE: i32 = 65507;

impl MsgGlobalData {
    /// New header with the USM security model.
    pub fn new(msg_id: i32, msg_flags: MsgFlags) -> Self {
        Self {
            msg_id,
            msg_max_size: MSG_MAX_SIZE,
            msg_flags,
            msg_security_model: SecurityModel::Usm,
        }
    }

    /// Encode into the buffer.
    pub fn encode(&self, buf: &mut EncodeBuf) {
        buf.push_sequence(|buf| {
            buf.push_integer(self.msg_security_model.as_i32() as i64);
            // msgFlags is a one-byte OCTET STRING
            buf.push_octet_string(&[self.msg_flags.to_byte()]);
            buf.push_integer(self.msg_max_size as i64);
            buf.push_integer(self.msg_id as i64);
        });
    }

    /// Decode, validating the RFC 3412 HeaderData ranges.
    pub fn decode(decoder: &mut Decoder) -> Result<Self> {
        const MSG_MAX_SIZE_MINIMUM: i32 = 484;

        let mut seq = decoder.read_sequence()?;

        let msg_id = seq.read_integer32()?;
        let msg_max_size = seq.read_integer32()?;

        if msg_id < 0 {
            return Err(Error::decode(seq.offset(), DecodeErrorKind::IntegerOverflow));
        }
        if msg_max_size < MSG_MAX_SIZE_MINIMUM {
            return Err(Error::decode(
                seq.offset(),
                DecodeErrorKind::MsgMaxSizeTooSmall {
                    value: msg_max_size as i64,
                    minimum: MSG_MAX_SIZE_MINIMUM as i64,
                },
            ));
        }

        let flags_bytes = seq.read_octet_string()?;
        if flags_bytes.len() != 1 {
            return Err(Error::decode(seq.offset(), DecodeErrorKind::InvalidMsgFlags));
        }
        let msg_flags = MsgFlags::from_byte(seq.offset(), flags_bytes[0])?;

        let model_raw = seq.read_integer32()?;
        let msg_security_model = SecurityModel::from_i32(model_raw).ok_or_else(|| {
            Error::decode(
                seq.offset(),
                DecodeErrorKind::UnknownSecurityModel(model_raw as i64),
            )
        })?;

        Ok(Self {
            msg_id,
            msg_max_size,
            msg_flags,
            msg_security_model,
        })
    }
}

/// Scoped PDU: context engine id + context name + PDU.
#[derive(Debug, Clone)]
pub struct ScopedPdu {
    /// Context engine ID (usually the authoritative engine ID).
    pub context_engine_id: Bytes,
    /// Context name (usually empty).
    pub context_name: Bytes,
    /// The PDU.
    pub pdu: Pdu,
}

impl ScopedPdu {
    /// New scoped PDU.
    pub fn new(
        context_engine_id: impl Into<Bytes>,
        context_name: impl Into<Bytes>,
        pdu: Pdu,
    ) -> Self {
        Self {
            context_engine_id: context_engine_id.into(),
            context_name: context_name.into(),
            pdu,
        }
    }

    /// Scoped PDU with an empty context.
    pub fn with_empty_context(pdu: Pdu) -> Self {
        Self::new(Bytes::new(), Bytes::new(), pdu)
    }

    /// Encode into the buffer.
    pub fn encode(&self, buf: &mut EncodeBuf) {
        buf.push_sequence(|buf| {
            self.pdu.encode(buf);
            buf.push_octet_string(&self.context_name);
            buf.push_octet_string(&self.context_engine_id);
        });
    }

    /// Encode standalone (for encryption).
    pub fn encode_to_bytes(&self) -> Bytes {
        let mut buf = EncodeBuf::new();
        self.encode(&mut buf);
        buf.finish()
    }

    /// Decode.
    pub fn decode(decoder: &mut Decoder) -> Result<Self> {
        let mut seq = decoder.read_sequence()?;

        let context_engine_id = seq.read_octet_string()?;
        let context_name = seq.read_octet_string()?;
        let pdu = Pdu::decode(&mut seq)?;

        Ok(Self {
            context_engine_id,
            context_name,
            pdu,
        })
    }
}

/// SNMPv3 message.
#[derive(Debug, Clone)]
pub struct V3Message {
    /// Header.
    pub global_data: MsgGlobalData,
    /// Opaque USM security parameters.
    pub security_params: Bytes,
    /// Payload.
    pub data: V3MessageData,
}

/// Payload of a v3 message.
#[derive(Debug, Clone)]
pub enum V3MessageData {
    /// Plaintext scoped PDU (noAuthNoPriv / authNoPriv).
    Plaintext(ScopedPdu),
    /// Encrypted scoped PDU (authPriv), still ciphertext.
    Encrypted(Bytes),
}

impl V3Message {
    /// Plaintext message.
    pub fn new(global_data: MsgGlobalData, security_params: Bytes, scoped_pdu: ScopedPdu) -> Self {
        Self {
            global_data,
            security_params,
            data: V3MessageData::Plaintext(scoped_pdu),
        }
    }

    /// Encrypted message.
    pub fn new_encrypted(
        global_data: MsgGlobalData,
        security_params: Bytes,
        ciphertext: Bytes,
    ) -> Self {
        Self {
            global_data,
            security_params,
            data: V3MessageData::Encrypted(ciphertext),
        }
    }

    /// Message id.
    pub fn msg_id(&self) -> i32 {
        self.global_data.msg_id
    }

    /// Security level.
    pub fn security_level(&self) -> SecurityLevel {
        self.global_data.msg_flags.security_level
    }

    /// The PDU, when the payload is plaintext.
    pub fn pdu(&self) -> Option<&Pdu> {
        match &self.data {
            V3MessageData::Plaintext(scoped) => Some(&scoped.pdu),
            V3MessageData::Encrypted(_) => None,
        }
    }

    /// Consume into the PDU, when the payload is plaintext.
    pub fn into_pdu(self) -> Option<Pdu> {
        match self.data {
            V3MessageData::Plaintext(scoped) => Some(scoped.pdu),
            V3MessageData::Encrypted(_) => None,
        }
    }

    /// Encode to BER.
    ///
    /// For authenticated messages the security parameters must carry a
    /// zeroed placeholder; the HMAC is computed over the encoded message
    /// and patched in afterwards.
    pub fn encode(&self) -> Bytes {
        let mut buf = EncodeBuf::new();

        buf.push_sequence(|buf| {
            match &self.data {
                V3MessageData::Plaintext(scoped_pdu) => scoped_pdu.encode(buf),
                V3MessageData::Encrypted(ciphertext) => buf.push_octet_string(ciphertext),
            }
            buf.push_octet_string(&self.security_params);
            self.global_data.encode(buf);
            buf.push_integer(3);
        });

        buf.finish()
    }

    /// Decode a complete message.
    pub fn decode(data: Bytes) -> Result<Self> {
        match super::Message::decode(data)? {
            super::Message::V3(m) => Ok(m),
            super::Message::Community(_) => {
                Err(Error::decode(0, DecodeErrorKind::UnknownVersion(0)))
            }
        }
    }

    /// Decode from a message sequence whose version field was already
    /// consumed.
    pub(crate) fn decode_from_sequence(seq: &mut Decoder) -> Result<Self> {
        let global_data = MsgGlobalData::decode(seq)?;
        let security_params = seq.read_octet_string()?;

        let data = if global_data.msg_flags.security_level.requires_priv() {
            V3MessageData::Encrypted(seq.read_octet_string()?)
        } else {
            V3MessageData::Plaintext(ScopedPdu::decode(seq)?)
        };

        Ok(Self {
            global_data,
            security_params,
            data,
        })
    }

    /// Engine discovery probe: empty security parameters, empty scoped
    /// PDU, noAuthNoPriv, reportable.
    pub fn discovery_request(msg_id: i32) -> Self {
        let global_data =
            MsgGlobalData::new(msg_id, MsgFlags::new(SecurityLevel::NoAuthNoPriv, true));
        let security_params = UsmSecurityParams::empty().encode();
        let pdu = Pdu::get_request(0, &[]);

        Self::new(global_data, security_params, ScopedPdu::with_empty_context(pdu))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid;

    #[test]
    fn flags_roundtrip() {
        for (level, reportable) in [
            (SecurityLevel::NoAuthNoPriv, false),
            (SecurityLevel::NoAuthNoPriv, true),
            (SecurityLevel::AuthNoPriv, true),
            (SecurityLevel::AuthPriv, true),
        ] {
            let flags = MsgFlags::new(level, reportable);
            let decoded = MsgFlags::from_byte(0, flags.to_byte()).unwrap();
            assert_eq!(decoded, flags);
        }
    }

    #[test]
    fn priv_without_auth_rejected() {
        assert!(MsgFlags::from_byte(0, 0x02).is_err());
    }

    #[test]
    fn plaintext_message_roundtrip() {
        let pdu = Pdu::get_request(77, &[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)]);
        let scoped = ScopedPdu::new(
            Bytes::from_static(b"\x80\x00\x1f\x88engine"),
            Bytes::new(),
            pdu,
        );
        let msg = V3Message::new(
            MsgGlobalData::new(77, MsgFlags::new(SecurityLevel::AuthNoPriv, true)),
            UsmSecurityParams::empty().encode(),
            scoped,
        );

        let decoded = V3Message::decode(msg.encode()).unwrap();
        assert_eq!(decoded.msg_id(), 77);
        assert_eq!(decoded.security_level(), SecurityLevel::AuthNoPriv);
        assert_eq!(decoded.pdu().unwrap().request_id, 77);
    }

    #[test]
    fn encrypted_payload_stays_opaque() {
        let msg = V3Message::new_encrypted(
            MsgGlobalData::new(5, MsgFlags::new(SecurityLevel::AuthPriv, true)),
            UsmSecurityParams::empty().encode(),
            Bytes::from_static(&[0xDE, 0xAD]),
        );

        let decoded = V3Message::decode(msg.encode()).unwrap();
        assert!(decoded.pdu().is_none());
        assert!(matches!(decoded.data, V3MessageData::Encrypted(ref c) if c.as_ref() == [0xDE, 0xAD]));
    }

    #[test]
    fn discovery_request_shape() {
        let msg = V3Message::discovery_request(31);
        assert_eq!(msg.msg_id(), 31);
        assert_eq!(msg.security_level(), SecurityLevel::NoAuthNoPriv);
        let decoded = V3Message::decode(msg.encode()).unwrap();
        assert!(decoded.pdu().unwrap().varbinds.is_empty());
    }
}
