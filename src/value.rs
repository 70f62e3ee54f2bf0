//! SNMP typed values.
//!
//! [`Value`] is a closed union over the wire types SNMP uses, plus the
//! three response sentinels. Every variant owns its wire tag; a tag the
//! union does not name fails decoding with `UnknownType` rather than
//! being smuggled through as raw bytes.

use crate::ber::{Decoder, EncodeBuf, tag};
use crate::error::{DecodeErrorKind, Error, Result};
use crate::oid::Oid;
use bytes::Bytes;

/// An SNMP value.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Value {
    /// INTEGER. The full signed 64-bit range is carried so enumerations
    /// and vendor extensions survive unclipped.
    Integer(i64),

    /// OCTET STRING.
    OctetString(Bytes),

    /// NULL (request placeholder).
    Null,

    /// OBJECT IDENTIFIER.
    Oid(Oid),

    /// IpAddress: 4 raw bytes, big-endian. Dotted-quad rendering is the
    /// caller's concern.
    IpAddress([u8; 4]),

    /// Counter32 (wrapping unsigned 32-bit).
    Counter32(u32),

    /// Gauge32 / Unsigned32 (non-wrapping unsigned 32-bit).
    Gauge32(u32),

    /// TimeTicks: hundredths of a second.
    TimeTicks(u32),

    /// Opaque bytes with no recognized inner wrapper.
    Opaque(Bytes),

    /// Counter64 (SNMPv2c/v3 only).
    Counter64(u64),

    /// IEEE-754 single, wrapped in an Opaque on the wire.
    Float(f32),

    /// IEEE-754 double, wrapped in an Opaque on the wire.
    Double(f64),

    /// BIT STRING content interpreted as a bitmask. SMIv2 BITS objects
    /// usually travel as OCTET STRING; the marshaller converts between
    /// the two given the object's declared syntax.
    Bits(Bytes),

    /// noSuchObject: the OID names no object on this agent.
    NoSuchObject,

    /// noSuchInstance: the object exists but this instance does not.
    NoSuchInstance,

    /// endOfMibView: nothing lexicographically follows the OID. The
    /// normal termination condition of a walk.
    EndOfMibView,
}

impl Value {
    /// As a signed integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// As an unsigned 32-bit value (Counter32, Gauge32, TimeTicks, or a
    /// non-negative Integer that fits).
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::Counter32(v) | Value::Gauge32(v) | Value::TimeTicks(v) => Some(*v),
            Value::Integer(v) => u32::try_from(*v).ok(),
            _ => None,
        }
    }

    /// As an unsigned 64-bit value. The 32-bit unsigned types widen here;
    /// this is the API edge the narrower counters surface through.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Counter64(v) => Some(*v),
            Value::Counter32(v) | Value::Gauge32(v) | Value::TimeTicks(v) => Some(*v as u64),
            Value::Integer(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// As raw bytes (OctetString, Opaque or Bits).
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::OctetString(v) | Value::Opaque(v) | Value::Bits(v) => Some(v),
            _ => None,
        }
    }

    /// As UTF-8 text, when the bytes happen to be valid.
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// As an OID.
    pub fn as_oid(&self) -> Option<&Oid> {
        match self {
            Value::Oid(oid) => Some(oid),
            _ => None,
        }
    }

    /// As an IPv4 address.
    pub fn as_ip(&self) -> Option<std::net::Ipv4Addr> {
        match self {
            Value::IpAddress(bytes) => Some(std::net::Ipv4Addr::from(*bytes)),
            _ => None,
        }
    }

    /// As a double (Float widens).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Whether this is one of the three response sentinels.
    pub fn is_exception(&self) -> bool {
        matches!(
            self,
            Value::NoSuchObject | Value::NoSuchInstance | Value::EndOfMibView
        )
    }

    /// Variant name, used in marshalling errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "Integer",
            Value::OctetString(_) => "OctetString",
            Value::Null => "Null",
            Value::Oid(_) => "Oid",
            Value::IpAddress(_) => "IpAddress",
            Value::Counter32(_) => "Counter32",
            Value::Gauge32(_) => "Gauge32",
            Value::TimeTicks(_) => "TimeTicks",
            Value::Opaque(_) => "Opaque",
            Value::Counter64(_) => "Counter64",
            Value::Float(_) => "Float",
            Value::Double(_) => "Double",
            Value::Bits(_) => "Bits",
            Value::NoSuchObject => "NoSuchObject",
            Value::NoSuchInstance => "NoSuchInstance",
            Value::EndOfMibView => "EndOfMibView",
        }
    }

    /// Encode to BER.
    pub fn encode(&self, buf: &mut EncodeBuf) {
        match self {
            Value::Integer(v) => buf.push_integer(*v),
            Value::OctetString(data) => buf.push_octet_string(data),
            Value::Null => buf.push_null(),
            Value::Oid(oid) => buf.push_oid(oid),
            Value::IpAddress(addr) => buf.push_ip_address(*addr),
            Value::Counter32(v) => buf.push_unsigned32(tag::application::COUNTER32, *v),
            Value::Gauge32(v) => buf.push_unsigned32(tag::application::GAUGE32, *v),
            Value::TimeTicks(v) => buf.push_unsigned32(tag::application::TIMETICKS, *v),
            Value::Opaque(data) => {
                buf.push_bytes(data);
                buf.push_length(data.len());
                buf.push_tag(tag::application::OPAQUE);
            }
            Value::Counter64(v) => buf.push_unsigned64(tag::application::COUNTER64, *v),
            Value::Float(v) => encode_opaque_wrapped(buf, tag::opaque::FLOAT, &v.to_be_bytes()),
            Value::Double(v) => encode_opaque_wrapped(buf, tag::opaque::DOUBLE, &v.to_be_bytes()),
            Value::Bits(data) => {
                buf.push_bytes(data);
                buf.push_length(data.len());
                buf.push_tag(tag::universal::BIT_STRING);
            }
            Value::NoSuchObject => {
                buf.push_length(0);
                buf.push_tag(tag::context::NO_SUCH_OBJECT);
            }
            Value::NoSuchInstance => {
                buf.push_length(0);
                buf.push_tag(tag::context::NO_SUCH_INSTANCE);
            }
            Value::EndOfMibView => {
                buf.push_length(0);
                buf.push_tag(tag::context::END_OF_MIB_VIEW);
            }
        }
    }

    /// Decode from BER.
    ///
    /// An unrecognized tag is a [`DecodeErrorKind::UnknownType`] error
    /// surfaced to the caller, never a silently coerced default.
    pub fn decode(decoder: &mut Decoder) -> Result<Self> {
        let tag_byte = decoder.read_tag()?;
        let len = decoder.read_length()?;

        match tag_byte {
            tag::universal::INTEGER => Ok(Value::Integer(decoder.read_integer_value(len)?)),
            tag::universal::OCTET_STRING => Ok(Value::OctetString(decoder.read_bytes(len)?)),
            tag::universal::BIT_STRING => Ok(Value::Bits(decoder.read_bytes(len)?)),
            tag::universal::NULL => {
                if len != 0 {
                    return Err(Error::decode(decoder.offset(), DecodeErrorKind::InvalidNull));
                }
                Ok(Value::Null)
            }
            tag::universal::OBJECT_IDENTIFIER => Ok(Value::Oid(decoder.read_oid_value(len)?)),
            tag::application::IP_ADDRESS => {
                if len != 4 {
                    return Err(Error::decode(
                        decoder.offset(),
                        DecodeErrorKind::InvalidIpAddressLength { length: len },
                    ));
                }
                let data = decoder.read_bytes(4)?;
                Ok(Value::IpAddress([data[0], data[1], data[2], data[3]]))
            }
            tag::application::COUNTER32 => {
                Ok(Value::Counter32(decoder.read_unsigned32_value(len)?))
            }
            tag::application::GAUGE32 => Ok(Value::Gauge32(decoder.read_unsigned32_value(len)?)),
            tag::application::TIMETICKS => {
                Ok(Value::TimeTicks(decoder.read_unsigned32_value(len)?))
            }
            tag::application::OPAQUE => {
                let data = decoder.read_bytes(len)?;
                Ok(decode_opaque(data))
            }
            tag::application::COUNTER64 => {
                Ok(Value::Counter64(decoder.read_unsigned64_value(len)?))
            }
            tag::context::NO_SUCH_OBJECT => {
                if len != 0 {
                    let _ = decoder.read_bytes(len)?;
                }
                Ok(Value::NoSuchObject)
            }
            tag::context::NO_SUCH_INSTANCE => {
                if len != 0 {
                    let _ = decoder.read_bytes(len)?;
                }
                Ok(Value::NoSuchInstance)
            }
            tag::context::END_OF_MIB_VIEW => {
                if len != 0 {
                    let _ = decoder.read_bytes(len)?;
                }
                Ok(Value::EndOfMibView)
            }
            // Net-snmp documents but does not parse the constructed form;
            // we follow suit.
            tag::universal::OCTET_STRING_CONSTRUCTED => Err(Error::decode(
                decoder.offset(),
                DecodeErrorKind::ConstructedOctetString,
            )),
            other => Err(Error::decode(
                decoder.offset(),
                DecodeErrorKind::UnknownType { tag: other },
            )),
        }
    }
}

/// Encode an opaque special type: `44 len 9F <type> len <payload>`.
fn encode_opaque_wrapped(buf: &mut EncodeBuf, type_byte: u8, payload: &[u8]) {
    use crate::ber::length_encoded_len;

    buf.push_bytes(payload);
    buf.push_length(payload.len());
    buf.push_byte(type_byte);
    buf.push_byte(tag::opaque::WRAPPER);
    buf.push_length(2 + length_encoded_len(payload.len()) + payload.len());
    buf.push_tag(tag::application::OPAQUE);
}

/// Unwrap net-snmp's opaque special types (float, double, Counter64).
///
/// Content that does not carry a well-formed wrapper stays a plain
/// [`Value::Opaque`], matching net-snmp's permissive handling.
fn decode_opaque(data: Bytes) -> Value {
    if data.len() < 3 || data[0] != tag::opaque::WRAPPER {
        return Value::Opaque(data);
    }

    let type_byte = data[1];
    let mut inner = Decoder::new(data.slice(2..));
    let Ok(len) = inner.read_length() else {
        return Value::Opaque(data);
    };
    if len != inner.remaining() {
        return Value::Opaque(data);
    }

    match type_byte {
        tag::opaque::FLOAT if len == 4 => {
            let bytes = inner.read_bytes(4).expect("length checked");
            Value::Float(f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        }
        tag::opaque::DOUBLE if len == 8 => {
            let bytes = inner.read_bytes(8).expect("length checked");
            let mut arr = [0u8; 8];
            arr.copy_from_slice(&bytes);
            Value::Double(f64::from_be_bytes(arr))
        }
        tag::opaque::COUNTER64 => match inner.read_unsigned64_value(len) {
            Ok(v) => Value::Counter64(v),
            Err(_) => Value::Opaque(data),
        },
        _ => Value::Opaque(data),
    }
}

/// The halves an opaque-wrapped or native Counter64 is reconstructed
/// from; re-exported here because callers comparing against raw counter
/// structs reach for it next to [`Value::Counter64`].
pub use crate::ber::join_counter64 as counter64_from_halves;

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{}", v),
            Value::OctetString(data) => {
                if let Ok(s) = std::str::from_utf8(data) {
                    write!(f, "{}", s)
                } else {
                    write!(f, "0x{}", hex(data))
                }
            }
            Value::Null => write!(f, "NULL"),
            Value::Oid(oid) => write!(f, "{}", oid),
            Value::IpAddress(a) => write!(f, "{}.{}.{}.{}", a[0], a[1], a[2], a[3]),
            Value::Counter32(v) => write!(f, "{}", v),
            Value::Gauge32(v) => write!(f, "{}", v),
            Value::TimeTicks(v) => {
                let secs = v / 100;
                let days = secs / 86400;
                let hours = (secs % 86400) / 3600;
                let mins = (secs % 3600) / 60;
                let s = secs % 60;
                write!(f, "{}d {}h {}m {}s", days, hours, mins, s)
            }
            Value::Opaque(data) => write!(f, "Opaque(0x{})", hex(data)),
            Value::Counter64(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Bits(data) => write!(f, "Bits(0x{})", hex(data)),
            Value::NoSuchObject => write!(f, "noSuchObject"),
            Value::NoSuchInstance => write!(f, "noSuchInstance"),
            Value::EndOfMibView => write!(f, "endOfMibView"),
        }
    }
}

fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02x}", b)).collect()
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Counter64(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::OctetString(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::OctetString(Bytes::from(s))
    }
}

impl From<&[u8]> for Value {
    fn from(data: &[u8]) -> Self {
        Value::OctetString(Bytes::copy_from_slice(data))
    }
}

impl From<Bytes> for Value {
    fn from(data: Bytes) -> Self {
        Value::OctetString(data)
    }
}

impl From<Oid> for Value {
    fn from(oid: Oid) -> Self {
        Value::Oid(oid)
    }
}

impl From<std::net::Ipv4Addr> for Value {
    fn from(addr: std::net::Ipv4Addr) -> Self {
        Value::IpAddress(addr.octets())
    }
}

impl From<[u8; 4]> for Value {
    fn from(addr: [u8; 4]) -> Self {
        Value::IpAddress(addr)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}
