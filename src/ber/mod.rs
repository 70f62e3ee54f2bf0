//! BER (Basic Encoding Rules) codec for the subset of encodings SNMP uses.
//!
//! Follows X.690 with permissive parsing aligned with net-snmp behavior:
//! non-minimal integer and length encodings are accepted, indefinite
//! lengths and constructed OCTET STRINGs are rejected.

mod decode;
mod encode;
mod length;
pub mod tag;

pub use decode::*;
pub use encode::*;
pub use length::*;
