//! Semantic marshalling between MIB-declared object syntaxes and wire
//! values.
//!
//! The MIB metadata layer (out of scope here) resolves a name to an OID
//! plus an [`ObjectSyntax`]: the base wire type, an optional enumeration
//! label table and an optional range/size constraint. This module turns a
//! caller-supplied [`Value`] into the exact `(tag, bytes)` pair the codec
//! transmits for that syntax, and raw pairs back into typed values.
//!
//! The engine itself never resolves names; callers do that first and hand
//! the syntax in.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::ber::{Decoder, EncodeBuf};
use crate::error::{Error, Result};
use crate::value::Value;

/// Base syntax of a managed object, as declared by its MIB definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Syntax {
    Integer,
    /// INTEGER with a label table.
    Enum,
    OctetString,
    /// Named bits packed into a bitmask.
    Bits,
    Oid,
    IpAddress,
    Counter32,
    Unsigned32,
    TimeTicks,
    Counter64,
    Float,
    Double,
    Opaque,
}

impl Syntax {
    fn name(self) -> &'static str {
        match self {
            Syntax::Integer => "Integer",
            Syntax::Enum => "Enum",
            Syntax::OctetString => "OctetString",
            Syntax::Bits => "Bits",
            Syntax::Oid => "Oid",
            Syntax::IpAddress => "IpAddress",
            Syntax::Counter32 => "Counter32",
            Syntax::Unsigned32 => "Unsigned32",
            Syntax::TimeTicks => "TimeTicks",
            Syntax::Counter64 => "Counter64",
            Syntax::Float => "Float",
            Syntax::Double => "Double",
            Syntax::Opaque => "Opaque",
        }
    }
}

/// Enumeration labels: value <-> symbolic name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnumTable {
    labels: BTreeMap<i64, String>,
}

impl EnumTable {
    /// Build from `(value, label)` pairs.
    pub fn new(entries: impl IntoIterator<Item = (i64, impl Into<String>)>) -> Self {
        Self {
            labels: entries.into_iter().map(|(v, l)| (v, l.into())).collect(),
        }
    }

    /// Label for a value.
    pub fn label(&self, value: i64) -> Option<&str> {
        self.labels.get(&value).map(String::as_str)
    }

    /// Value for a label.
    pub fn value(&self, label: &str) -> Option<i64> {
        self.labels
            .iter()
            .find(|(_, l)| l.as_str() == label)
            .map(|(v, _)| *v)
    }

    /// Whether the value has a label.
    pub fn contains(&self, value: i64) -> bool {
        self.labels.contains_key(&value)
    }

    /// `label(value)` rendering, falling back to the bare number.
    pub fn display(&self, value: i64) -> String {
        match self.label(value) {
            Some(label) => format!("{}({})", label, value),
            None => value.to_string(),
        }
    }
}

/// Named bit positions for a BITS object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitNames {
    names: BTreeMap<u16, String>,
}

impl BitNames {
    /// Build from `(position, name)` pairs.
    pub fn new(entries: impl IntoIterator<Item = (u16, impl Into<String>)>) -> Self {
        Self {
            names: entries.into_iter().map(|(p, n)| (p, n.into())).collect(),
        }
    }

    /// Position of a named bit.
    pub fn position(&self, name: &str) -> Option<u16> {
        self.names
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(p, _)| *p)
    }

    /// Pack bit positions into a bitmask. Bit 0 is the most significant
    /// bit of the first octet, per SMIv2.
    pub fn mask(positions: impl IntoIterator<Item = u16>) -> Bytes {
        let mut bytes: Vec<u8> = Vec::new();
        for pos in positions {
            let index = (pos / 8) as usize;
            if index >= bytes.len() {
                bytes.resize(index + 1, 0);
            }
            bytes[index] |= 0x80 >> (pos % 8);
        }
        Bytes::from(bytes)
    }

    /// Whether a bit position is set in a bitmask.
    pub fn is_set(mask: &[u8], position: u16) -> bool {
        let index = (position / 8) as usize;
        match mask.get(index) {
            Some(byte) => byte & (0x80 >> (position % 8)) != 0,
            None => false,
        }
    }

    /// Names of the set bits, in position order. Unnamed set bits render
    /// as their position number.
    pub fn set_names(&self, mask: &[u8]) -> Vec<String> {
        let mut out = Vec::new();
        for (index, byte) in mask.iter().enumerate() {
            for bit in 0..8u16 {
                if byte & (0x80 >> bit) != 0 {
                    let pos = index as u16 * 8 + bit;
                    out.push(
                        self.names
                            .get(&pos)
                            .cloned()
                            .unwrap_or_else(|| pos.to_string()),
                    );
                }
            }
        }
        out
    }
}

/// Range or size constraint declared by the MIB definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    /// Inclusive numeric range.
    Range { min: i64, max: i64 },
    /// Inclusive byte-length range.
    Size { min: usize, max: usize },
}

/// What the metadata layer's `resolve()` hands the engine alongside the
/// OID: the wire type plus its tables and constraints.
#[derive(Debug, Clone)]
pub struct ObjectSyntax {
    pub syntax: Syntax,
    pub enums: Option<EnumTable>,
    pub bits: Option<BitNames>,
    pub constraint: Option<Constraint>,
}

impl ObjectSyntax {
    /// Syntax with no tables or constraints.
    pub fn new(syntax: Syntax) -> Self {
        Self {
            syntax,
            enums: None,
            bits: None,
            constraint: None,
        }
    }

    /// Attach an enumeration table.
    pub fn with_enums(mut self, enums: EnumTable) -> Self {
        self.enums = Some(enums);
        self
    }

    /// Attach named bits.
    pub fn with_bits(mut self, bits: BitNames) -> Self {
        self.bits = Some(bits);
        self
    }

    /// Attach a range/size constraint.
    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraint = Some(constraint);
        self
    }
}

/// Marshal a caller value for an object's declared syntax into the
/// `(tag, content)` pair the codec transmits.
///
/// Fails with [`Error::UnsupportedType`] when the value does not fit any
/// entry of the syntax table, and [`Error::ConstraintViolation`] when a
/// declared range or size is violated. Nothing is sent before either
/// check passes.
pub fn to_wire(syntax: &ObjectSyntax, value: &Value) -> Result<(u8, Bytes)> {
    let coerced = coerce(syntax, value)?;

    let mut buf = EncodeBuf::new();
    coerced.encode(&mut buf);
    let tlv = buf.finish();

    let mut dec = Decoder::new(tlv);
    let tag = dec.read_tag()?;
    let len = dec.read_length()?;
    let content = dec.read_bytes(len)?;
    Ok((tag, content))
}

/// Rebuild a typed value from a raw `(tag, content)` pair.
///
/// Unrecognized tags surface [`crate::error::DecodeErrorKind::UnknownType`];
/// they are never coerced into a catch-all.
pub fn from_wire(tag: u8, content: Bytes) -> Result<Value> {
    let mut buf = EncodeBuf::new();
    buf.push_bytes(&content);
    buf.push_length(content.len());
    buf.push_tag(tag);

    let mut dec = Decoder::new(buf.finish());
    Value::decode(&mut dec)
}

/// Validate and normalize a value against the object's syntax.
pub fn coerce(syntax: &ObjectSyntax, value: &Value) -> Result<Value> {
    let mismatch = || Error::UnsupportedType {
        expected: syntax.syntax.name(),
        actual: value.type_name(),
    };

    let coerced = match (syntax.syntax, value) {
        (Syntax::Integer, Value::Integer(v)) => Value::Integer(*v),
        (Syntax::Enum, Value::Integer(v)) => {
            if let Some(enums) = &syntax.enums
                && !enums.contains(*v)
            {
                return Err(Error::ConstraintViolation {
                    detail: format!("{} is not an enumeration value", v),
                });
            }
            Value::Integer(*v)
        }
        (Syntax::OctetString, Value::OctetString(data)) => Value::OctetString(data.clone()),
        (Syntax::Bits, Value::Bits(data)) => Value::OctetString(data.clone()),
        // BITS travel as OCTET STRING on the wire (SMIv2)
        (Syntax::Bits, Value::OctetString(data)) => Value::OctetString(data.clone()),
        (Syntax::Oid, Value::Oid(oid)) => Value::Oid(oid.clone()),
        (Syntax::IpAddress, Value::IpAddress(addr)) => Value::IpAddress(*addr),
        (Syntax::Counter32, Value::Counter32(v)) => Value::Counter32(*v),
        (Syntax::Counter32, Value::Integer(v)) => {
            Value::Counter32(u32::try_from(*v).map_err(|_| mismatch())?)
        }
        (Syntax::Unsigned32, Value::Gauge32(v)) => Value::Gauge32(*v),
        (Syntax::Unsigned32, Value::Integer(v)) => {
            Value::Gauge32(u32::try_from(*v).map_err(|_| mismatch())?)
        }
        (Syntax::TimeTicks, Value::TimeTicks(v)) => Value::TimeTicks(*v),
        (Syntax::TimeTicks, Value::Integer(v)) => {
            Value::TimeTicks(u32::try_from(*v).map_err(|_| mismatch())?)
        }
        (Syntax::Counter64, Value::Counter64(v)) => Value::Counter64(*v),
        (Syntax::Counter64, Value::Integer(v)) => {
            Value::Counter64(u64::try_from(*v).map_err(|_| mismatch())?)
        }
        (Syntax::Float, Value::Float(v)) => Value::Float(*v),
        (Syntax::Double, Value::Double(v)) => Value::Double(*v),
        (Syntax::Double, Value::Float(v)) => Value::Double(*v as f64),
        (Syntax::Opaque, Value::Opaque(data)) => Value::Opaque(data.clone()),
        (Syntax::Opaque, Value::OctetString(data)) => Value::Opaque(data.clone()),
        _ => return Err(mismatch()),
    };

    if let Some(constraint) = &syntax.constraint {
        check_constraint(constraint, &coerced)?;
    }

    Ok(coerced)
}

fn check_constraint(constraint: &Constraint, value: &Value) -> Result<()> {
    match (constraint, value) {
        (Constraint::Range { min, max }, Value::Integer(v)) => {
            if v < min || v > max {
                return Err(Error::ConstraintViolation {
                    detail: format!("{} outside range {}..={}", v, min, max),
                });
            }
        }
        (Constraint::Range { min, max }, _) => {
            if let Some(v) = value.as_u64() {
                let below = *min >= 0 && v < *min as u64;
                let above = *max >= 0 && v > *max as u64;
                if below || above {
                    return Err(Error::ConstraintViolation {
                        detail: format!("{} outside range {}..={}", v, min, max),
                    });
                }
            }
        }
        (Constraint::Size { min, max }, _) => {
            if let Some(bytes) = value.as_bytes() {
                if bytes.len() < *min || bytes.len() > *max {
                    return Err(Error::ConstraintViolation {
                        detail: format!(
                            "length {} outside size {}..={}",
                            bytes.len(),
                            min,
                            max
                        ),
                    });
                }
            }
        }
    }
    Ok(())
}
