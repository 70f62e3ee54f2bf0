//! SNMPv3 User-based Security Model (RFC 3414).
//!
//! Covers what a management session needs: the protocol enums the public
//! configuration surface exposes, password-based key derivation, HMAC
//! authentication, DES/AES privacy, and the USM security-parameters
//! encoding with its engine-discovery handling.

mod keys;

pub use keys::{AuthKey, PrivKey, SaltCounter, authenticate_message, derive_key, verify_message};

use std::time::Instant;

use bytes::Bytes;

use crate::ber::{Decoder, EncodeBuf};
use crate::error::{DecodeErrorKind, Error, Result};

/// Authentication protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum AuthProtocol {
    /// HMAC-MD5-96 (RFC 3414).
    Md5,
    /// HMAC-SHA-96 (RFC 3414).
    Sha1,
}

impl AuthProtocol {
    /// Truncated MAC length in octets (HMAC-96).
    pub const fn mac_len(self) -> usize {
        12
    }

    /// Digest output length in octets.
    pub const fn digest_len(self) -> usize {
        match self {
            AuthProtocol::Md5 => 16,
            AuthProtocol::Sha1 => 20,
        }
    }
}

impl std::fmt::Display for AuthProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthProtocol::Md5 => write!(f, "MD5"),
            AuthProtocol::Sha1 => write!(f, "SHA"),
        }
    }
}

impl std::str::FromStr for AuthProtocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "MD5" => Ok(AuthProtocol::Md5),
            "SHA" | "SHA1" => Ok(AuthProtocol::Sha1),
            other => Err(Error::Config(format!(
                "{} is not an acceptable authentication protocol",
                other
            ))),
        }
    }
}

/// Privacy (encryption) protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum PrivProtocol {
    /// DES-CBC (RFC 3414 Section 8).
    Des,
    /// AES-128-CFB (RFC 3826).
    Aes128,
}

impl PrivProtocol {
    /// Cipher key length in octets.
    pub const fn key_len(self) -> usize {
        16
    }

    /// Cipher block size in octets.
    pub const fn block_len(self) -> usize {
        match self {
            PrivProtocol::Des => 8,
            PrivProtocol::Aes128 => 16,
        }
    }
}

impl std::fmt::Display for PrivProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrivProtocol::Des => write!(f, "DES"),
            PrivProtocol::Aes128 => write!(f, "AES"),
        }
    }
}

impl std::str::FromStr for PrivProtocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "DES" => Ok(PrivProtocol::Des),
            "AES" | "AES128" => Ok(PrivProtocol::Aes128),
            other => Err(Error::Config(format!(
                "{} is not an acceptable privacy protocol",
                other
            ))),
        }
    }
}

/// Security level, ordered least to most secure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SecurityLevel {
    /// No authentication, no privacy.
    NoAuthNoPriv,
    /// Authentication only.
    AuthNoPriv,
    /// Authentication and privacy.
    AuthPriv,
}

impl SecurityLevel {
    /// Decode from the msgFlags auth/priv bits. Priv without auth is
    /// invalid.
    pub fn from_flags(flags: u8) -> Option<Self> {
        match (flags & 0x01 != 0, flags & 0x02 != 0) {
            (false, false) => Some(Self::NoAuthNoPriv),
            (true, false) => Some(Self::AuthNoPriv),
            (true, true) => Some(Self::AuthPriv),
            (false, true) => None,
        }
    }

    /// Encode the auth/priv bits.
    pub fn to_flags(self) -> u8 {
        match self {
            Self::NoAuthNoPriv => 0x00,
            Self::AuthNoPriv => 0x01,
            Self::AuthPriv => 0x03,
        }
    }

    /// Whether authentication applies.
    pub fn requires_auth(self) -> bool {
        matches!(self, Self::AuthNoPriv | Self::AuthPriv)
    }

    /// Whether privacy applies.
    pub fn requires_priv(self) -> bool {
        matches!(self, Self::AuthPriv)
    }
}

/// USM security parameters, carried as an opaque OCTET STRING inside the
/// v3 message:
///
/// ```text
/// UsmSecurityParameters ::= SEQUENCE {
///     msgAuthoritativeEngineID     OCTET STRING,
///     msgAuthoritativeEngineBoots  INTEGER (0..2147483647),
///     msgAuthoritativeEngineTime   INTEGER (0..2147483647),
///     msgUserName                  OCTET STRING (SIZE(0..32)),
///     msgAuthenticationParameters  OCTET STRING,
///     msgPrivacyParameters         OCTET STRING
/// }
/// ```
#[derive(Debug, Clone)]
pub struct UsmSecurityParams {
    /// Authoritative engine ID.
    pub engine_id: Bytes,
    /// Engine boot counter.
    pub engine_boots: u32,
    /// Seconds since the engine last booted.
    pub engine_time: u32,
    /// User name.
    pub username: Bytes,
    /// HMAC digest, or empty.
    pub auth_params: Bytes,
    /// Privacy salt, or empty.
    pub priv_params: Bytes,
}

impl UsmSecurityParams {
    /// Parameters for an authenticated exchange.
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

    /// All-empty parameters, as discovery probes carry.
    pub fn empty() -> Self {
        Self {
            engine_id: Bytes::new(),
            engine_boots: 0,
            engine_time: 0,
            username: Bytes::new(),
            auth_params: Bytes::new(),
            priv_params: Bytes::new(),
        }
    }

    /// Zero-filled auth placeholder of the MAC length; the HMAC is
    /// computed over the whole message with the zeros in place, then
    /// patched in.
    pub fn with_auth_placeholder(mut self, mac_len: usize) -> Self {
        self.auth_params = Bytes::from(vec![0u8; mac_len]);
        self
    }

    /// Attach privacy parameters (the salt).
    pub fn with_priv_params(mut self, priv_params: impl Into<Bytes>) -> Self {
        self.priv_params = priv_params.into();
        self
    }

    /// Encode to BER.
    pub fn encode(&self) -> Bytes {
        let mut buf = EncodeBuf::new();
        buf.push_sequence(|buf| {
            buf.push_octet_string(&self.priv_params);
            buf.push_octet_string(&self.auth_params);
            buf.push_octet_string(&self.username);
            buf.push_integer(self.engine_time as i64);
            buf.push_integer(self.engine_boots as i64);
            buf.push_octet_string(&self.engine_id);
        });
        buf.finish()
    }

    /// Decode from BER.
    pub fn decode(data: Bytes) -> Result<Self> {
        let mut decoder = Decoder::new(data);
        let mut seq = decoder.read_sequence()?;

        let engine_id = seq.read_octet_string()?;

        // RFC 3414: both counters are INTEGER (0..2147483647)
        let offset = seq.offset();
        let raw_boots = seq.read_integer()?;
        let engine_boots = u32::try_from(raw_boots)
            .map_err(|_| Error::decode(offset, DecodeErrorKind::IntegerOverflow))?;

        let offset = seq.offset();
        let raw_time = seq.read_integer()?;
        let engine_time = u32::try_from(raw_time)
            .map_err(|_| Error::decode(offset, DecodeErrorKind::IntegerOverflow))?;

        let username = seq.read_octet_string()?;
        let auth_params = seq.read_octet_string()?;
        let priv_params = seq.read_octet_string()?;

        Ok(Self {
            engine_id,
            engine_boots,
            engine_time,
            username,
            auth_params,
            priv_params,
        })
    }
}

/// Discovered state of the peer's authoritative engine.
#[derive(Debug, Clone)]
pub struct EngineState {
    /// Engine ID.
    pub engine_id: Bytes,
    /// Boot counter at discovery.
    pub engine_boots: u32,
    /// Engine time at discovery.
    pub engine_time: u32,
    /// When the snapshot was taken, for time estimation.
    pub discovered_at: Instant,
}

impl EngineState {
    /// State from freshly received USM parameters.
    pub fn from_params(params: &UsmSecurityParams) -> Self {
        Self {
            engine_id: params.engine_id.clone(),
            engine_boots: params.engine_boots,
            engine_time: params.engine_time,
            discovered_at: Instant::now(),
        }
    }

    /// Current engine-time estimate: the discovered time advanced by the
    /// local clock.
    pub fn estimated_time(&self) -> u32 {
        self.engine_time
            .saturating_add(self.discovered_at.elapsed().as_secs() as u32)
    }
}

/// Extract engine state from a discovery response's security parameters.
pub(crate) fn parse_discovery_response(security_params: &Bytes) -> Result<EngineState> {
    let params = UsmSecurityParams::decode(security_params.clone())?;
    if params.engine_id.is_empty() {
        return Err(Error::UnknownEngineId { target: None });
    }
    Ok(EngineState::from_params(&params))
}

/// Locate `msgAuthenticationParameters` inside an encoded v3 message,
/// returning `(offset, len)` of its content bytes.
///
/// Needed twice: to patch the computed HMAC into an outgoing message, and
/// to zero the field while verifying an incoming one.
pub fn find_auth_params_offset(encoded: &[u8]) -> Option<(usize, usize)> {
    let mut pos = 0;

    // outer SEQUENCE
    if *encoded.get(pos)? != 0x30 {
        return None;
    }
    pos += 1;
    let (_, consumed) = parse_length(&encoded[pos..])?;
    pos += consumed;

    // version INTEGER
    if *encoded.get(pos)? != 0x02 {
        return None;
    }
    pos += 1;
    let (len, consumed) = parse_length(&encoded[pos..])?;
    pos += consumed + len;

    // msgGlobalData SEQUENCE: skip whole
    if *encoded.get(pos)? != 0x30 {
        return None;
    }
    pos += 1;
    let (len, consumed) = parse_length(&encoded[pos..])?;
    pos += consumed + len;

    // msgSecurityParameters OCTET STRING wrapper
    if *encoded.get(pos)? != 0x04 {
        return None;
    }
    pos += 1;
    let (_, consumed) = parse_length(&encoded[pos..])?;
    pos += consumed;

    // inner UsmSecurityParameters SEQUENCE
    if *encoded.get(pos)? != 0x30 {
        return None;
    }
    pos += 1;
    let (_, consumed) = parse_length(&encoded[pos..])?;
    pos += consumed;

    // engine id, boots, time, username
    for expected in [0x04u8, 0x02, 0x02, 0x04] {
        if *encoded.get(pos)? != expected {
            return None;
        }
        pos += 1;
        let (len, consumed) = parse_length(&encoded[pos..])?;
        pos += consumed + len;
    }

    // msgAuthenticationParameters OCTET STRING
    if *encoded.get(pos)? != 0x04 {
        return None;
    }
    pos += 1;
    let (len, consumed) = parse_length(&encoded[pos..])?;
    pos += consumed;

    if pos + len > encoded.len() {
        return None;
    }
    Some((pos, len))
}

fn parse_length(data: &[u8]) -> Option<(usize, usize)> {
    let first = *data.first()?;
    if first < 0x80 {
        return Some((first as usize, 1));
    }
    if first == 0x80 {
        return None;
    }
    let num_octets = (first & 0x7F) as usize;
    if num_octets > 4 || data.len() < 1 + num_octets {
        return None;
    }
    let mut len = 0usize;
    for i in 0..num_octets {
        len = (len << 8) | (data[1 + i] as usize);
    }
    Some((len, 1 + num_octets))
}
