// Allow large error types - the Error enum carries OIDs inline for
// diagnostics. Boxing would trade allocations for a marginal size win.
#![allow(clippy::result_large_err)]

//! # snmp-session
//!
//! Async SNMP management session engine for Rust.
//!
//! A [`Session`] binds one UDP channel to one agent with one set of
//! security parameters (community string for v1/v2c, USM user for v3)
//! and exposes the protocol's four verbs (GET, GETNEXT, GETBULK, SET)
//! plus a subtree [`walk`](Session::walk). Each request is encoded into
//! a PDU, transmitted, retried against a bounded deadline, and decoded
//! into typed [`Value`]s; agent error-status codes and per-binding
//! sentinels map into the [`Error`] taxonomy.
//!
//! MIB text parsing and name resolution live outside this crate; the
//! [`marshal`] module defines the [`marshal::ObjectSyntax`] interface a
//! metadata layer feeds into the engine.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use snmp_session::{Auth, Session, oid};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> snmp_session::Result<()> {
//!     let session = Session::builder("192.0.2.1:161", Auth::v2c("public"))
//!         .timeout(Duration::from_secs(2))
//!         .retries(2)
//!         .open()
//!         .await?;
//!
//!     let results = session.get(&[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)]).await?;
//!     println!("sysDescr: {}", results[0].value);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## SNMPv3
//!
//! ```rust,no_run
//! use snmp_session::{Auth, Session, oid, v3::{AuthProtocol, PrivProtocol}};
//!
//! # async fn example() -> snmp_session::Result<()> {
//! let session = Session::builder(
//!     "192.0.2.1:161",
//!     Auth::usm("operator")
//!         .auth(AuthProtocol::Sha1, "authpassword")
//!         .privacy(PrivProtocol::Aes128, "privpassword"),
//! )
//! .open()
//! .await?;
//!
//! let results = session.get(&[oid!(1, 3, 6, 1, 2, 1, 1, 5, 0)]).await?;
//! println!("sysName: {}", results[0].value);
//! # Ok(())
//! # }
//! ```

pub mod ber;
pub mod error;
pub mod marshal;
pub mod message;
pub mod oid;
pub mod pdu;
pub mod session;
pub mod transport;
pub mod v3;
pub mod value;
pub mod varbind;
pub mod version;

pub use error::{
    AuthErrorKind, CryptoErrorKind, DecodeErrorKind, Error, ErrorStatus, OidErrorKind, Result,
};
pub use oid::Oid;
pub use pdu::{GetBulkPdu, Pdu, PduType};
pub use session::{Auth, CommunityVersion, Session, SessionBuilder, SetArg, UsmAuth, UsmBuilder};
pub use transport::{MockTransport, ResponseBuilder, Transport, UdpTransport};
pub use v3::SecurityLevel;
pub use value::Value;
pub use varbind::VarBind;
pub use version::Version;
