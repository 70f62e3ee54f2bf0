//! SNMP session: one peer, one channel, one request in flight.
//!
//! A [`Session`] owns a connected transport and the security parameters
//! for one agent, and exposes the four protocol verbs plus a subtree
//! walk. Requests are strictly serialized by an internal mutex: the
//! request-id correlation scheme assumes request/response alternation,
//! so the lock is held for the whole cycle.
//!
//! Drive concurrent polls with one session per task; sessions are not
//! `Clone`.

mod builder;
mod exchange;
mod usm;
mod walk;

pub use builder::{Auth, CommunityVersion, SessionBuilder, UsmAuth, UsmBuilder};

use std::net::SocketAddr;
use std::sync::RwLock;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::error::{self, DecodeErrorKind, Error, Result};
use crate::oid::Oid;
use crate::pdu::{GetBulkPdu, Pdu};
use crate::transport::{Transport, UdpTransport};
use crate::v3::{AuthProtocol, PrivProtocol, SecurityLevel};
use crate::value::Value;
use crate::varbind::VarBind;
use crate::version::Version;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default retry budget.
pub const DEFAULT_RETRIES: u32 = 3;
/// Default GETBULK non-repeaters.
pub const DEFAULT_NON_REPEATERS: u32 = 0;
/// Default GETBULK max-repetitions. A policy default, not a protocol
/// requirement; override per session with [`Session::set_bulk`].
pub const DEFAULT_MAX_REPETITIONS: u32 = 40;

/// Request ids are allocated process-wide so two sessions to the same
/// peer never collide.
static NEXT_REQUEST_ID: AtomicI32 = AtomicI32::new(1);

pub(crate) fn next_request_id() -> i32 {
    // mask keeps the id positive across wraparound
    (NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed) & 0x7FFF_FFFF).max(1)
}

/// Validated security parameters for a v3 session.
#[derive(Clone)]
pub(crate) struct UsmConfig {
    pub username: Bytes,
    pub auth: Option<(AuthProtocol, Vec<u8>)>,
    pub privacy: Option<(PrivProtocol, Vec<u8>)>,
    pub context_name: Bytes,
}

impl UsmConfig {
    pub fn security_level(&self) -> SecurityLevel {
        match (&self.auth, &self.privacy) {
            (None, _) => SecurityLevel::NoAuthNoPriv,
            (Some(_), None) => SecurityLevel::AuthNoPriv,
            (Some(_), Some(_)) => SecurityLevel::AuthPriv,
        }
    }
}

/// Immutable per-session configuration.
pub(crate) struct SessionConfig {
    pub version: Version,
    pub community: Bytes,
    pub usm: Option<UsmConfig>,
}

/// Mutable per-session tunables.
#[derive(Clone, Copy)]
pub(crate) struct Tunables {
    pub timeout: Duration,
    pub retries: u32,
    pub non_repeaters: u32,
    pub max_repetitions: u32,
}

/// An open session to one SNMP agent.
pub struct Session<T: Transport = UdpTransport> {
    peer: SocketAddr,
    config: SessionConfig,
    tunables: RwLock<Tunables>,
    transport: RwLock<Option<T>>,
    request_lock: tokio::sync::Mutex<()>,
    cancel: RwLock<CancellationToken>,
    pub(crate) usm_state: usm::UsmSessionState,
}

impl Session<UdpTransport> {
    /// Start building a session.
    ///
    /// ```no_run
    /// use snmp_session::{Auth, Session, oid};
    /// use std::time::Duration;
    ///
    /// # async fn example() -> snmp_session::Result<()> {
    /// let session = Session::builder("192.0.2.1:161", Auth::v2c("public"))
    ///     .timeout(Duration::from_secs(2))
    ///     .retries(1)
    ///     .open()
    ///     .await?;
    ///
    /// let results = session.get(&[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)]).await?;
    /// println!("sysDescr = {}", results[0].value);
    /// # Ok(())
    /// # }
    /// ```
    pub fn builder(peer: impl Into<String>, auth: impl Into<Auth>) -> SessionBuilder {
        SessionBuilder::new(peer, auth)
    }
}

impl<T: Transport> Session<T> {
    pub(crate) fn new(
        transport: T,
        config: SessionConfig,
        tunables: Tunables,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            peer: transport.peer_addr(),
            config,
            tunables: RwLock::new(tunables),
            transport: RwLock::new(Some(transport)),
            request_lock: tokio::sync::Mutex::new(()),
            cancel: RwLock::new(cancel),
            usm_state: usm::UsmSessionState::new(),
        }
    }

    /// The peer this session talks to.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Protocol version.
    pub fn version(&self) -> Version {
        self.config.version
    }

    /// Current request timeout.
    pub fn timeout(&self) -> Duration {
        self.tunables.read().unwrap().timeout
    }

    /// Change the request timeout. Must be positive.
    pub fn set_timeout(&self, timeout: Duration) -> Result<()> {
        if timeout.is_zero() {
            return Err(Error::Config("timeout must be positive".into()));
        }
        self.tunables.write().unwrap().timeout = timeout;
        Ok(())
    }

    /// Current retry budget.
    pub fn retries(&self) -> u32 {
        self.tunables.read().unwrap().retries
    }

    /// Change the retry budget. Total wait is bounded by
    /// `timeout * (retries + 1)`.
    pub fn set_retries(&self, retries: u32) {
        self.tunables.write().unwrap().retries = retries;
    }

    /// Current GETBULK defaults as `(non_repeaters, max_repetitions)`.
    pub fn bulk(&self) -> (u32, u32) {
        let t = self.tunables.read().unwrap();
        (t.non_repeaters, t.max_repetitions)
    }

    /// Change the GETBULK defaults. `max_repetitions` must be positive.
    pub fn set_bulk(&self, non_repeaters: u32, max_repetitions: u32) -> Result<()> {
        if max_repetitions == 0 {
            return Err(Error::Config(format!(
                "{} is not an appropriate value for max repetitions",
                max_repetitions
            )));
        }
        let mut t = self.tunables.write().unwrap();
        t.non_repeaters = non_repeaters;
        t.max_repetitions = max_repetitions;
        Ok(())
    }

    pub(crate) fn tunables(&self) -> Tunables {
        *self.tunables.read().unwrap()
    }

    pub(crate) fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// A token that aborts the in-flight request when cancelled.
    ///
    /// Cancellation surfaces [`Error::Cancelled`] to the waiting caller
    /// and leaves the session usable; a token obtained before the
    /// cancellation no longer affects later requests.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.read().unwrap().clone()
    }

    pub(crate) fn current_cancel(&self) -> CancellationToken {
        self.cancel.read().unwrap().clone()
    }

    pub(crate) fn reset_cancel(&self) {
        *self.cancel.write().unwrap() = CancellationToken::new();
    }

    /// Close the channel. Subsequent operations fail with
    /// [`Error::SessionClosed`].
    pub fn close(&self) {
        let released = self.transport.write().unwrap().take();
        if released.is_some() {
            tracing::debug!(target: "snmp_session::session", snmp.peer = %self.peer, "session closed");
        }
    }

    /// Whether [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.transport.read().unwrap().is_none()
    }

    pub(crate) fn channel(&self) -> Result<T> {
        self.transport
            .read()
            .unwrap()
            .clone()
            .ok_or(Error::SessionClosed)
    }

    /// GET: one binding per input OID, order preserved.
    ///
    /// A sentinel in the response (noSuchObject/noSuchInstance) raises
    /// the matching error; the caller asked for typed values.
    pub async fn get(&self, oids: &[Oid]) -> Result<Vec<VarBind>> {
        validate_oids(oids)?;
        let _guard = self.request_lock.lock().await;
        let transport = self.channel()?;

        let request_id = next_request_id();
        tracing::debug!(
            target: "snmp_session::session",
            snmp.peer = %self.peer,
            snmp.request_id = request_id,
            snmp.oid_count = oids.len(),
            "GET"
        );
        let pdu = Pdu::get_request(request_id, oids);
        let response = self.transact(&transport, pdu).await?;

        expect_binding_count(&response, oids.len())?;
        error::check_sentinels(&response.varbinds)?;
        Ok(response.varbinds)
    }

    /// GETNEXT: one binding per input OID; which OID is "next" is the
    /// peer's decision.
    ///
    /// At the end of the tree the agent answers endOfMibView, surfaced
    /// as [`Error::EndOfMibView`] so walking callers know to stop.
    pub async fn get_next(&self, oids: &[Oid]) -> Result<Vec<VarBind>> {
        validate_oids(oids)?;
        let _guard = self.request_lock.lock().await;
        let transport = self.channel()?;

        let request_id = next_request_id();
        tracing::debug!(
            target: "snmp_session::session",
            snmp.peer = %self.peer,
            snmp.request_id = request_id,
            snmp.oid_count = oids.len(),
            "GETNEXT"
        );
        let pdu = Pdu::get_next_request(request_id, oids);
        let response = self.transact(&transport, pdu).await?;

        expect_binding_count(&response, oids.len())?;
        error::check_sentinels(&response.varbinds)?;
        Ok(response.varbinds)
    }

    /// GETBULK (v2c/v3 only): up to `max_repetitions` bindings per
    /// repeating OID.
    ///
    /// A short result means the walk is exhausted, not that something
    /// failed, so endOfMibView bindings are returned in-band rather than
    /// raised.
    pub async fn get_bulk(
        &self,
        oids: &[Oid],
        non_repeaters: u32,
        max_repetitions: u32,
    ) -> Result<Vec<VarBind>> {
        if !self.config.version.supports_bulk() {
            return Err(Error::BulkUnsupported);
        }
        validate_oids(oids)?;
        let _guard = self.request_lock.lock().await;
        let transport = self.channel()?;

        let request_id = next_request_id();
        tracing::debug!(
            target: "snmp_session::session",
            snmp.peer = %self.peer,
            snmp.request_id = request_id,
            snmp.oid_count = oids.len(),
            snmp.non_repeaters = non_repeaters,
            snmp.max_repetitions = max_repetitions,
            "GETBULK"
        );
        let pdu = GetBulkPdu::new(
            request_id,
            non_repeaters as i32,
            max_repetitions as i32,
            oids,
        );
        let response = self.transact_bulk(&transport, pdu).await?;
        Ok(response.varbinds)
    }

    /// GETBULK with the session's configured defaults.
    pub async fn get_bulk_with_defaults(&self, oids: &[Oid]) -> Result<Vec<VarBind>> {
        let (non_repeaters, max_repetitions) = self.bulk();
        self.get_bulk(oids, non_repeaters, max_repetitions).await
    }

    /// SET: write the given bindings; the agent echoes the stored values
    /// on success.
    pub async fn set(&self, bindings: &[(Oid, Value)]) -> Result<Vec<VarBind>> {
        if bindings.is_empty() {
            return Err(Error::EmptyRequest);
        }
        for (oid, _) in bindings {
            oid.validate_length()?;
        }
        let _guard = self.request_lock.lock().await;
        let transport = self.channel()?;

        let request_id = next_request_id();
        tracing::debug!(
            target: "snmp_session::session",
            snmp.peer = %self.peer,
            snmp.request_id = request_id,
            snmp.oid_count = bindings.len(),
            "SET"
        );
        let varbinds = bindings
            .iter()
            .map(|(oid, value)| VarBind::new(oid.clone(), value.clone()))
            .collect();
        let pdu = Pdu::set_request(request_id, varbinds);
        let response = self.transact(&transport, pdu).await?;

        expect_binding_count(&response, bindings.len())?;
        error::check_sentinels(&response.varbinds)?;
        Ok(response.varbinds)
    }

    /// SET from an alternating OID/value list, as command front ends
    /// assemble. Odd or mis-ordered lists fail with the arity error
    /// before anything is sent.
    pub async fn set_flat(&self, args: &[SetArg]) -> Result<Vec<VarBind>> {
        let bindings = pair_set_args(args)?;
        self.set(&bindings).await
    }
}

/// One entry of a flat SET argument list.
#[derive(Debug, Clone)]
pub enum SetArg {
    /// An OID, to be followed by its value.
    Oid(Oid),
    /// The value for the preceding OID.
    Value(Value),
}

impl From<Oid> for SetArg {
    fn from(oid: Oid) -> Self {
        SetArg::Oid(oid)
    }
}

impl From<Value> for SetArg {
    fn from(value: Value) -> Self {
        SetArg::Value(value)
    }
}

/// Pair a flat argument list into SET bindings.
pub fn pair_set_args(args: &[SetArg]) -> Result<Vec<(Oid, Value)>> {
    if args.is_empty() || args.len() % 2 != 0 {
        return Err(Error::SetArity { count: args.len() });
    }

    args.chunks_exact(2)
        .map(|pair| match pair {
            [SetArg::Oid(oid), SetArg::Value(value)] => Ok((oid.clone(), value.clone())),
            _ => Err(Error::SetArity { count: args.len() }),
        })
        .collect()
}

fn validate_oids(oids: &[Oid]) -> Result<()> {
    if oids.is_empty() {
        return Err(Error::EmptyRequest);
    }
    for oid in oids {
        oid.validate_length()?;
    }
    Ok(())
}

fn expect_binding_count(pdu: &Pdu, expected: usize) -> Result<()> {
    if pdu.varbinds.len() != expected {
        return Err(Error::decode(
            0,
            DecodeErrorKind::BindingCountMismatch {
                expected,
                actual: pdu.varbinds.len(),
            },
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid;

    #[test]
    fn request_ids_are_distinct_and_positive() {
        let a = next_request_id();
        let b = next_request_id();
        assert!(a > 0);
        assert!(b > 0);
        assert_ne!(a, b);
    }

    #[test]
    fn flat_args_pair_up() {
        let args = [
            SetArg::from(oid!(1, 3, 6, 1)),
            SetArg::from(Value::Integer(1)),
            SetArg::from(oid!(1, 3, 6, 2)),
            SetArg::from(Value::from("x")),
        ];
        let pairs = pair_set_args(&args).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].0, oid!(1, 3, 6, 1));
    }

    #[test]
    fn odd_arity_rejected() {
        let args = [SetArg::from(oid!(1, 3, 6, 1))];
        assert!(matches!(
            pair_set_args(&args),
            Err(Error::SetArity { count: 1 })
        ));
    }

    #[test]
    fn misordered_args_rejected() {
        let args = [
            SetArg::from(Value::Integer(1)),
            SetArg::from(oid!(1, 3, 6, 1)),
        ];
        assert!(matches!(pair_set_args(&args), Err(Error::SetArity { .. })));
    }

    #[test]
    fn empty_args_rejected() {
        assert!(matches!(pair_set_args(&[]), Err(Error::SetArity { count: 0 })));
    }
}
