//! Error types for snmp-session.
//!
//! The taxonomy separates four families of failures:
//!
//! - local/usage errors raised before any network I/O (bad OID, SET arity,
//!   GETBULK under v1, invalid security configuration, marshalling)
//! - transport errors (timeout after retries, I/O, cancellation, closed
//!   session)
//! - protocol errors reported by the agent ([`ErrorStatus`])
//! - per-binding sentinel conditions (no-such-object, no-such-instance,
//!   end-of-mib-view), each its own variant so a walking caller can tell
//!   "stop walking" apart from "this node does not exist"
//!
//! Decode failures carry the buffer offset and a [`DecodeErrorKind`].

use std::net::SocketAddr;
use std::time::Duration;

use crate::oid::Oid;
use crate::varbind::VarBind;

/// Result alias using the library's [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

/// OID validation error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OidErrorKind {
    /// Arc is not a non-negative integer.
    InvalidArc,
    /// First arc must be 0, 1, or 2.
    InvalidFirstArc(u32),
    /// Second arc too large for the first arc value.
    InvalidSecondArc { first: u32, second: u32 },
    /// More arcs than the wire maximum.
    TooManyArcs { count: usize, max: usize },
}

impl std::fmt::Display for OidErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArc => write!(f, "invalid arc value"),
            Self::InvalidFirstArc(v) => write!(f, "first arc must be 0, 1, or 2, got {}", v),
            Self::InvalidSecondArc { first, second } => {
                write!(f, "second arc {} too large for first arc {}", second, first)
            }
            Self::TooManyArcs { count, max } => {
                write!(f, "OID has {} arcs, exceeds maximum {}", count, max)
            }
        }
    }
}

/// BER decode error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeErrorKind {
    /// Expected a different tag.
    UnexpectedTag { expected: u8, actual: u8 },
    /// Data ended mid-element.
    TruncatedData,
    /// Invalid length encoding.
    InvalidLength,
    /// Indefinite length form is not used by SNMP.
    IndefiniteLength,
    /// Length field uses more octets than supported.
    LengthTooLong { octets: usize },
    /// Length exceeds the sanity maximum.
    LengthExceedsMax { length: usize, max: usize },
    /// Integer value does not fit its target type.
    IntegerOverflow,
    /// Zero-length integer content.
    ZeroLengthInteger,
    /// Integer content longer than the widest supported type.
    IntegerTooLong { length: usize },
    /// NULL with non-zero length.
    InvalidNull,
    /// IpAddress content is not 4 bytes.
    InvalidIpAddressLength { length: usize },
    /// Constructed OCTET STRING (0x24) is not supported.
    ConstructedOctetString,
    /// Value tag is not one of the types SNMP uses.
    UnknownType { tag: u8 },
    /// Unknown top-level message version.
    UnknownVersion(i64),
    /// Unknown PDU tag.
    UnknownPduType(u8),
    /// OID exceeds the arc-count maximum.
    OidTooLong { count: usize, max: usize },
    /// TLV claims more content than the buffer holds.
    TlvOverflow,
    /// Response binding count does not match the request.
    BindingCountMismatch { expected: usize, actual: usize },
    /// privacy flag set without the auth flag (RFC 3412).
    InvalidMsgFlags,
    /// Unknown msgSecurityModel.
    UnknownSecurityModel(i64),
    /// msgMaxSize below the RFC 3412 minimum.
    MsgMaxSizeTooSmall { value: i64, minimum: i64 },
}

impl std::fmt::Display for DecodeErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnexpectedTag { expected, actual } => {
                write!(f, "expected tag 0x{:02X}, got 0x{:02X}", expected, actual)
            }
            Self::TruncatedData => write!(f, "unexpected end of data"),
            Self::InvalidLength => write!(f, "invalid length encoding"),
            Self::IndefiniteLength => write!(f, "indefinite length encoding not supported"),
            Self::LengthTooLong { octets } => {
                write!(f, "length encoding too long ({} octets)", octets)
            }
            Self::LengthExceedsMax { length, max } => {
                write!(f, "length {} exceeds maximum {}", length, max)
            }
            Self::IntegerOverflow => write!(f, "integer overflow"),
            Self::ZeroLengthInteger => write!(f, "zero-length integer"),
            Self::IntegerTooLong { length } => write!(f, "integer too long: {} bytes", length),
            Self::InvalidNull => write!(f, "NULL with non-zero length"),
            Self::InvalidIpAddressLength { length } => {
                write!(f, "IP address must be 4 bytes, got {}", length)
            }
            Self::ConstructedOctetString => {
                write!(f, "constructed OCTET STRING (0x24) not supported")
            }
            Self::UnknownType { tag } => write!(f, "unknown value type: 0x{:02X}", tag),
            Self::UnknownVersion(v) => write!(f, "unknown SNMP version: {}", v),
            Self::UnknownPduType(t) => write!(f, "unknown PDU type: 0x{:02X}", t),
            Self::OidTooLong { count, max } => {
                write!(f, "OID has {} arcs, exceeds maximum {}", count, max)
            }
            Self::TlvOverflow => write!(f, "TLV extends past end of data"),
            Self::BindingCountMismatch { expected, actual } => {
                write!(f, "expected {} bindings, got {}", expected, actual)
            }
            Self::InvalidMsgFlags => write!(f, "invalid msgFlags: privacy without authentication"),
            Self::UnknownSecurityModel(m) => write!(f, "unknown security model: {}", m),
            Self::MsgMaxSizeTooSmall { value, minimum } => {
                write!(f, "msgMaxSize {} below RFC 3412 minimum {}", value, minimum)
            }
        }
    }
}

/// Authentication failure kinds (SNMPv3 USM).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// No authentication key available.
    NoAuthKey,
    /// HMAC verification failed.
    HmacMismatch,
    /// Authentication parameters have the wrong length.
    WrongMacLength { expected: usize, actual: usize },
    /// Could not locate the auth params field in the message.
    AuthParamsNotFound,
}

impl std::fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoAuthKey => write!(f, "no authentication key available"),
            Self::HmacMismatch => write!(f, "HMAC verification failed"),
            Self::WrongMacLength { expected, actual } => {
                write!(f, "wrong MAC length: expected {}, got {}", expected, actual)
            }
            Self::AuthParamsNotFound => write!(f, "could not locate auth params in message"),
        }
    }
}

/// Privacy (encryption) failure kinds (SNMPv3 USM).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoErrorKind {
    /// No privacy key available.
    NoPrivKey,
    /// Invalid key or IV length for the cipher.
    InvalidKeyLength,
    /// privParameters have the wrong length.
    InvalidPrivParamsLength { expected: usize, actual: usize },
    /// Ciphertext length is not a multiple of the block size.
    InvalidCiphertextLength { length: usize, block_size: usize },
    /// Decrypted payload is not a well-formed scoped PDU.
    InvalidPlaintext,
}

impl std::fmt::Display for CryptoErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoPrivKey => write!(f, "no privacy key available"),
            Self::InvalidKeyLength => write!(f, "invalid key length"),
            Self::InvalidPrivParamsLength { expected, actual } => {
                write!(
                    f,
                    "invalid privParameters length: expected {}, got {}",
                    expected, actual
                )
            }
            Self::InvalidCiphertextLength { length, block_size } => {
                write!(
                    f,
                    "ciphertext length {} not multiple of block size {}",
                    length, block_size
                )
            }
            Self::InvalidPlaintext => write!(f, "decrypted payload is not a scoped PDU"),
        }
    }
}

/// SNMP protocol error-status codes (RFC 3416).
///
/// Returned by agents in the response header. Codes the table does not
/// name are preserved as [`ErrorStatus::Unknown`] so nothing is lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorStatus {
    /// Operation succeeded (status = 0).
    NoError,
    /// Response would not fit the transport (status = 1).
    TooBig,
    /// Requested OID not found; SNMPv1 only (status = 2).
    NoSuchName,
    /// Invalid value in a SET request (status = 3).
    BadValue,
    /// SET on a read-only object (status = 4).
    ReadOnly,
    /// Unspecified error (status = 5).
    GenErr,
    /// Object exists but access is denied (status = 6).
    NoAccess,
    /// SET value has the wrong ASN.1 type (status = 7).
    WrongType,
    /// SET value has an incorrect length (status = 8).
    WrongLength,
    /// SET value uses the wrong encoding (status = 9).
    WrongEncoding,
    /// SET value is out of range or invalid (status = 10).
    WrongValue,
    /// Object does not support row creation (status = 11).
    NoCreation,
    /// Value inconsistent with other managed objects (status = 12).
    InconsistentValue,
    /// Resource required for the SET is unavailable (status = 13).
    ResourceUnavailable,
    /// SET commit phase failed (status = 14).
    CommitFailed,
    /// SET undo phase failed (status = 15).
    UndoFailed,
    /// Access denied (status = 16).
    AuthorizationError,
    /// Object does not support modification (status = 17).
    NotWritable,
    /// Named object cannot be created (status = 18).
    InconsistentName,
    /// Status code with no table entry; the raw code is preserved.
    Unknown(i32),
}

impl ErrorStatus {
    /// Map a raw status code to its table entry.
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => Self::NoError,
            1 => Self::TooBig,
            2 => Self::NoSuchName,
            3 => Self::BadValue,
            4 => Self::ReadOnly,
            5 => Self::GenErr,
            6 => Self::NoAccess,
            7 => Self::WrongType,
            8 => Self::WrongLength,
            9 => Self::WrongEncoding,
            10 => Self::WrongValue,
            11 => Self::NoCreation,
            12 => Self::InconsistentValue,
            13 => Self::ResourceUnavailable,
            14 => Self::CommitFailed,
            15 => Self::UndoFailed,
            16 => Self::AuthorizationError,
            17 => Self::NotWritable,
            18 => Self::InconsistentName,
            other => Self::Unknown(other),
        }
    }

    /// The raw status code.
    pub fn as_i32(&self) -> i32 {
        match self {
            Self::NoError => 0,
            Self::TooBig => 1,
            Self::NoSuchName => 2,
            Self::BadValue => 3,
            Self::ReadOnly => 4,
            Self::GenErr => 5,
            Self::NoAccess => 6,
            Self::WrongType => 7,
            Self::WrongLength => 8,
            Self::WrongEncoding => 9,
            Self::WrongValue => 10,
            Self::NoCreation => 11,
            Self::InconsistentValue => 12,
            Self::ResourceUnavailable => 13,
            Self::CommitFailed => 14,
            Self::UndoFailed => 15,
            Self::AuthorizationError => 16,
            Self::NotWritable => 17,
            Self::InconsistentName => 18,
            Self::Unknown(code) => *code,
        }
    }
}

impl std::fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoError => write!(f, "noError"),
            Self::TooBig => write!(f, "tooBig"),
            Self::NoSuchName => write!(f, "noSuchName"),
            Self::BadValue => write!(f, "badValue"),
            Self::ReadOnly => write!(f, "readOnly"),
            Self::GenErr => write!(f, "genErr"),
            Self::NoAccess => write!(f, "noAccess"),
            Self::WrongType => write!(f, "wrongType"),
            Self::WrongLength => write!(f, "wrongLength"),
            Self::WrongEncoding => write!(f, "wrongEncoding"),
            Self::WrongValue => write!(f, "wrongValue"),
            Self::NoCreation => write!(f, "noCreation"),
            Self::InconsistentValue => write!(f, "inconsistentValue"),
            Self::ResourceUnavailable => write!(f, "resourceUnavailable"),
            Self::CommitFailed => write!(f, "commitFailed"),
            Self::UndoFailed => write!(f, "undoFailed"),
            Self::AuthorizationError => write!(f, "authorizationError"),
            Self::NotWritable => write!(f, "notWritable"),
            Self::InconsistentName => write!(f, "inconsistentName"),
            Self::Unknown(code) => write!(f, "unknown({})", code),
        }
    }
}

/// The error type for all session operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// I/O error on the channel (includes ICMP-level unreachability
    /// surfacing as a socket error).
    #[error("I/O error{}: {source}", target.map(|t| format!(" communicating with {}", t)).unwrap_or_default())]
    Io {
        target: Option<SocketAddr>,
        #[source]
        source: std::io::Error,
    },

    /// No matching response within `timeout * (retries + 1)`.
    #[error("timeout after {elapsed:?}{} (retries={retries})", target.map(|t| format!(" waiting for {}", t)).unwrap_or_default())]
    Timeout {
        target: Option<SocketAddr>,
        elapsed: Duration,
        retries: u32,
    },

    /// The wait was cancelled from outside.
    #[error("request cancelled{}", target.map(|t| format!(" (peer {})", t)).unwrap_or_default())]
    Cancelled { target: Option<SocketAddr> },

    /// Operation on a session whose channel was closed.
    #[error("session is closed")]
    SessionClosed,

    /// Non-zero error-status returned by the agent, mapped through
    /// [`ErrorStatus`]. `index` is 1-based; 0 means the error applies to
    /// the PDU as a whole.
    #[error("SNMP error{}: {status} at index {index}", target.map(|t| format!(" from {}", t)).unwrap_or_default())]
    Protocol {
        target: Option<SocketAddr>,
        status: ErrorStatus,
        index: u32,
        oid: Option<Oid>,
    },

    /// Agent answered with a noSuchObject sentinel for this OID.
    #[error("no such object: {oid}")]
    NoSuchObject { oid: Oid },

    /// Agent answered with a noSuchInstance sentinel for this OID.
    #[error("no such instance: {oid}")]
    NoSuchInstance { oid: Oid },

    /// Agent answered with an endOfMibView sentinel for this OID.
    #[error("end of MIB view at {oid}")]
    EndOfMibView { oid: Oid },

    /// Invalid OID.
    #[error("invalid OID{}: {kind}", input.as_deref().map(|i| format!(" {:?}", i)).unwrap_or_default())]
    InvalidOid {
        kind: OidErrorKind,
        input: Option<Box<str>>,
    },

    /// Malformed wire message.
    #[error("malformed message at offset {offset}: {kind}")]
    Decode {
        offset: usize,
        kind: DecodeErrorKind,
    },

    /// The value cannot be marshalled for the object's declared syntax.
    #[error("unsupported value type: {expected} object cannot hold {actual}")]
    UnsupportedType {
        expected: &'static str,
        actual: &'static str,
    },

    /// Marshalled value violates a declared range or size constraint.
    #[error("value out of range for object ({detail})")]
    ConstraintViolation { detail: String },

    /// Flat SET argument list does not pair OIDs with values.
    #[error("SET expects an even OID/value argument list, got {count} entries")]
    SetArity { count: usize },

    /// GETBULK requested on an SNMPv1 session.
    #[error("GETBULK is not supported in SNMPv1")]
    BulkUnsupported,

    /// Operation invoked with no OIDs.
    #[error("request contains no variable bindings")]
    EmptyRequest,

    /// Invalid session configuration (bad tunable, incoherent v3
    /// security parameters, unresolvable peer).
    #[error("configuration error: {0}")]
    Config(String),

    /// SNMPv3 message authentication failed.
    #[error("authentication failed: {kind}")]
    AuthenticationFailed {
        target: Option<SocketAddr>,
        kind: AuthErrorKind,
    },

    /// SNMPv3 decryption failed.
    #[error("decryption failed: {kind}")]
    DecryptionFailed {
        target: Option<SocketAddr>,
        kind: CryptoErrorKind,
    },

    /// SNMPv3 encryption failed.
    #[error("encryption failed: {kind}")]
    EncryptionFailed {
        target: Option<SocketAddr>,
        kind: CryptoErrorKind,
    },

    /// Agent reported an unknown engine ID (SNMPv3).
    #[error("unknown engine ID")]
    UnknownEngineId { target: Option<SocketAddr> },

    /// Message outside the agent's time window (SNMPv3).
    #[error("message not in time window")]
    NotInTimeWindow { target: Option<SocketAddr> },

    /// Agent returned a report PDU the engine has no specific mapping for.
    #[error("agent returned report{}", oid.as_ref().map(|o| format!(" {}", o)).unwrap_or_default())]
    Report {
        target: Option<SocketAddr>,
        oid: Option<Oid>,
    },
}

impl Error {
    /// Decode error at a buffer offset.
    pub fn decode(offset: usize, kind: DecodeErrorKind) -> Self {
        Self::Decode { offset, kind }
    }

    /// Invalid-OID error without the offending input.
    pub fn invalid_oid(kind: OidErrorKind) -> Self {
        Self::InvalidOid { kind, input: None }
    }

    /// Invalid-OID error carrying the input string that failed.
    pub fn invalid_oid_with_input(kind: OidErrorKind, input: impl Into<Box<str>>) -> Self {
        Self::InvalidOid {
            kind,
            input: Some(input.into()),
        }
    }

    /// Authentication error.
    pub fn auth(target: Option<SocketAddr>, kind: AuthErrorKind) -> Self {
        Self::AuthenticationFailed { target, kind }
    }

    /// The peer address, for errors that have one.
    pub fn target(&self) -> Option<SocketAddr> {
        match self {
            Self::Io { target, .. }
            | Self::Timeout { target, .. }
            | Self::Cancelled { target }
            | Self::Protocol { target, .. }
            | Self::AuthenticationFailed { target, .. }
            | Self::DecryptionFailed { target, .. }
            | Self::EncryptionFailed { target, .. }
            | Self::UnknownEngineId { target }
            | Self::NotInTimeWindow { target }
            | Self::Report { target, .. } => *target,
            _ => None,
        }
    }

    /// Whether this is one of the three per-binding sentinel conditions.
    pub fn is_sentinel(&self) -> bool {
        matches!(
            self,
            Self::NoSuchObject { .. } | Self::NoSuchInstance { .. } | Self::EndOfMibView { .. }
        )
    }
}

/// Map the first sentinel binding in a response to its error.
///
/// GET, GETNEXT and SET responses are passed through this before typed
/// values reach the caller; GETBULK responses are not, because a trailing
/// end-of-view there is the normal "walk exhausted" signal.
pub fn check_sentinels(varbinds: &[VarBind]) -> Result<()> {
    use crate::value::Value;

    for vb in varbinds {
        match vb.value {
            Value::NoSuchObject => {
                return Err(Error::NoSuchObject {
                    oid: vb.oid.clone(),
                });
            }
            Value::NoSuchInstance => {
                return Err(Error::NoSuchInstance {
                    oid: vb.oid.clone(),
                });
            }
            Value::EndOfMibView => {
                return Err(Error::EndOfMibView {
                    oid: vb.oid.clone(),
                });
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use crate::{Oid, oid};

    #[test]
    fn error_status_table_is_total() {
        let names = [
            (0, "noError"),
            (1, "tooBig"),
            (2, "noSuchName"),
            (3, "badValue"),
            (4, "readOnly"),
            (5, "genErr"),
            (6, "noAccess"),
            (7, "wrongType"),
            (8, "wrongLength"),
            (9, "wrongEncoding"),
            (10, "wrongValue"),
            (11, "noCreation"),
            (12, "inconsistentValue"),
            (13, "resourceUnavailable"),
            (14, "commitFailed"),
            (15, "undoFailed"),
            (16, "authorizationError"),
            (17, "notWritable"),
            (18, "inconsistentName"),
        ];
        for (code, name) in names {
            let status = ErrorStatus::from_i32(code);
            assert_eq!(status.as_i32(), code);
            assert_eq!(status.to_string(), name);
            assert!(!matches!(status, ErrorStatus::Unknown(_)));
        }
    }

    #[test]
    fn unlisted_status_keeps_raw_code() {
        let status = ErrorStatus::from_i32(99);
        assert_eq!(status, ErrorStatus::Unknown(99));
        assert_eq!(status.as_i32(), 99);
        assert_eq!(status.to_string(), "unknown(99)");
    }

    #[test]
    fn sentinel_check_raises_on_first_hit() {
        let oid_a: Oid = oid!(1, 3, 6, 1, 2, 1, 1, 1, 0);
        let oid_b: Oid = oid!(1, 3, 6, 1, 2, 1, 1, 2, 0);

        let clean = vec![VarBind::new(oid_a.clone(), Value::Integer(1))];
        assert!(check_sentinels(&clean).is_ok());

        let mixed = vec![
            VarBind::new(oid_a.clone(), Value::Integer(1)),
            VarBind::new(oid_b.clone(), Value::NoSuchInstance),
            VarBind::new(oid_a.clone(), Value::EndOfMibView),
        ];
        match check_sentinels(&mixed) {
            Err(Error::NoSuchInstance { oid }) => assert_eq!(oid, oid_b),
            other => panic!("expected NoSuchInstance, got {:?}", other),
        }
    }

    #[test]
    fn end_of_mib_view_is_distinct() {
        let vbs = vec![VarBind::new(oid!(1, 3, 6), Value::EndOfMibView)];
        let err = check_sentinels(&vbs).unwrap_err();
        assert!(matches!(err, Error::EndOfMibView { .. }));
        assert!(err.is_sentinel());
    }
}
