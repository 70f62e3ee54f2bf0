//! Session construction and configuration validation.
//!
//! Everything that can be rejected locally is rejected here, before a
//! socket is bound: missing community, incoherent v3 security
//! parameters, short passwords, degenerate tunables.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use super::{
    DEFAULT_MAX_REPETITIONS, DEFAULT_NON_REPEATERS, DEFAULT_RETRIES, DEFAULT_TIMEOUT, Session,
    SessionConfig, Tunables, UsmConfig,
};
use crate::error::{Error, Result};
use crate::transport::{Transport, UdpTransport};
use crate::v3::{AuthProtocol, PrivProtocol};
use crate::version::Version;

/// RFC 3414 Section 11.2: passphrases are at least 8 octets.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Port used when the peer address names none.
const DEFAULT_PORT: u16 = 161;

/// Community version selector for v1/v2c authentication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CommunityVersion {
    /// SNMPv1.
    V1,
    /// SNMPv2c.
    #[default]
    V2c,
}

/// Authentication configuration.
#[derive(Debug, Clone)]
pub enum Auth {
    /// Community string (v1 or v2c).
    Community {
        /// Which community-based version.
        version: CommunityVersion,
        /// The community string.
        community: String,
    },
    /// User-based Security Model (v3).
    Usm(UsmAuth),
}

impl Default for Auth {
    fn default() -> Self {
        Auth::v2c("public")
    }
}

impl Auth {
    /// SNMPv1 community authentication.
    pub fn v1(community: impl Into<String>) -> Self {
        Auth::Community {
            version: CommunityVersion::V1,
            community: community.into(),
        }
    }

    /// SNMPv2c community authentication.
    pub fn v2c(community: impl Into<String>) -> Self {
        Auth::Community {
            version: CommunityVersion::V2c,
            community: community.into(),
        }
    }

    /// Start building SNMPv3 USM authentication.
    ///
    /// ```
    /// use snmp_session::{Auth, v3::{AuthProtocol, PrivProtocol}};
    ///
    /// // authPriv: authentication plus encryption
    /// let auth: Auth = Auth::usm("operator")
    ///     .auth(AuthProtocol::Sha1, "authpassword")
    ///     .privacy(PrivProtocol::Aes128, "privpassword")
    ///     .into();
    /// ```
    pub fn usm(username: impl Into<String>) -> UsmBuilder {
        UsmBuilder::new(username)
    }
}

/// SNMPv3 USM parameters as supplied by the caller, before validation.
#[derive(Debug, Clone)]
pub struct UsmAuth {
    /// Security name.
    pub username: String,
    /// Authentication protocol, or `None` for noAuthNoPriv.
    pub auth_protocol: Option<AuthProtocol>,
    /// Authentication password.
    pub auth_password: Option<String>,
    /// Privacy protocol, or `None` for no encryption.
    pub priv_protocol: Option<PrivProtocol>,
    /// Privacy password.
    pub priv_password: Option<String>,
    /// Context name; most deployments use the empty default.
    pub context_name: Option<String>,
}

/// Builder for [`UsmAuth`].
pub struct UsmBuilder {
    username: String,
    auth: Option<(AuthProtocol, String)>,
    privacy: Option<(PrivProtocol, String)>,
    context_name: Option<String>,
}

impl UsmBuilder {
    /// New builder for the given security name.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            auth: None,
            privacy: None,
            context_name: None,
        }
    }

    /// Add authentication (authNoPriv, or authPriv with
    /// [`privacy`](Self::privacy)).
    pub fn auth(mut self, protocol: AuthProtocol, password: impl Into<String>) -> Self {
        self.auth = Some((protocol, password.into()));
        self
    }

    /// Add privacy. Requires [`auth`](Self::auth); validated at open.
    pub fn privacy(mut self, protocol: PrivProtocol, password: impl Into<String>) -> Self {
        self.privacy = Some((protocol, password.into()));
        self
    }

    /// Set the context name.
    pub fn context(mut self, name: impl Into<String>) -> Self {
        self.context_name = Some(name.into());
        self
    }
}

impl From<UsmBuilder> for Auth {
    fn from(builder: UsmBuilder) -> Self {
        let (auth_protocol, auth_password) = match builder.auth {
            Some((p, pw)) => (Some(p), Some(pw)),
            None => (None, None),
        };
        let (priv_protocol, priv_password) = match builder.privacy {
            Some((p, pw)) => (Some(p), Some(pw)),
            None => (None, None),
        };
        Auth::Usm(UsmAuth {
            username: builder.username,
            auth_protocol,
            auth_password,
            priv_protocol,
            priv_password,
            context_name: builder.context_name,
        })
    }
}

/// Builder for [`Session`].
pub struct SessionBuilder {
    peer: String,
    auth: Auth,
    timeout: Duration,
    retries: u32,
    non_repeaters: u32,
    max_repetitions: u32,
    cancel: Option<CancellationToken>,
}

impl SessionBuilder {
    /// New builder for a peer address (`host:port`; port 161 is assumed
    /// when absent).
    pub fn new(peer: impl Into<String>, auth: impl Into<Auth>) -> Self {
        Self {
            peer: peer.into(),
            auth: auth.into(),
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
            non_repeaters: DEFAULT_NON_REPEATERS,
            max_repetitions: DEFAULT_MAX_REPETITIONS,
            cancel: None,
        }
    }

    /// Request timeout (default 5 seconds). Must be positive.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Retry budget (default 3). Total wait per request is bounded by
    /// `timeout * (retries + 1)`.
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// GETBULK defaults (default `0` non-repeaters, `40`
    /// max-repetitions).
    pub fn bulk(mut self, non_repeaters: u32, max_repetitions: u32) -> Self {
        self.non_repeaters = non_repeaters;
        self.max_repetitions = max_repetitions;
        self
    }

    /// Cancellation token aborting an in-flight request.
    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Validate the configuration, resolve the peer and open the UDP
    /// channel.
    pub async fn open(self) -> Result<Session<UdpTransport>> {
        let peer = resolve_peer(&self.peer).await?;
        let (config, tunables, cancel) = self.validate()?;
        let transport = UdpTransport::connect(peer).await?;
        Ok(Session::new(transport, config, tunables, cancel))
    }

    /// Validate the configuration and wrap an already-open transport.
    ///
    /// The transport determines the peer address; the builder's address
    /// string is ignored. This is how tests drive a session over the
    /// mock transport.
    pub fn open_with<T: Transport>(self, transport: T) -> Result<Session<T>> {
        let (config, tunables, cancel) = self.validate()?;
        Ok(Session::new(transport, config, tunables, cancel))
    }

    fn validate(self) -> Result<(SessionConfig, Tunables, CancellationToken)> {
        if self.timeout.is_zero() {
            return Err(Error::Config("timeout must be positive".into()));
        }
        if self.max_repetitions == 0 {
            return Err(Error::Config(format!(
                "{} is not an appropriate value for max repetitions",
                self.max_repetitions
            )));
        }

        let config = match self.auth {
            Auth::Community { version, community } => {
                if community.is_empty() {
                    return Err(Error::Config(
                        "community string is required for v1/v2c".into(),
                    ));
                }
                SessionConfig {
                    version: match version {
                        CommunityVersion::V1 => Version::V1,
                        CommunityVersion::V2c => Version::V2c,
                    },
                    community: Bytes::from(community),
                    usm: None,
                }
            }
            Auth::Usm(usm) => SessionConfig {
                version: Version::V3,
                community: Bytes::new(),
                usm: Some(validate_usm(usm)?),
            },
        };

        let tunables = Tunables {
            timeout: self.timeout,
            retries: self.retries,
            non_repeaters: self.non_repeaters,
            max_repetitions: self.max_repetitions,
        };

        Ok((config, tunables, self.cancel.unwrap_or_default()))
    }
}

/// Check the USM parameter combinations that are local configuration
/// errors, not something to defer to the peer.
fn validate_usm(usm: UsmAuth) -> Result<UsmConfig> {
    if usm.username.is_empty() {
        return Err(Error::Config("v3 requires a security name".into()));
    }

    let auth = match (usm.auth_protocol, usm.auth_password) {
        (Some(protocol), Some(password)) => {
            if password.len() < MIN_PASSWORD_LENGTH {
                return Err(Error::Config(format!(
                    "authentication password must be at least {} octets",
                    MIN_PASSWORD_LENGTH
                )));
            }
            Some((protocol, password.into_bytes()))
        }
        (Some(_), None) => {
            return Err(Error::Config(
                "authentication protocol set without a password".into(),
            ));
        }
        (None, Some(_)) => {
            return Err(Error::Config(
                "authentication password set without a protocol".into(),
            ));
        }
        (None, None) => None,
    };

    let privacy = match (usm.priv_protocol, usm.priv_password) {
        (Some(protocol), Some(password)) => {
            if auth.is_none() {
                return Err(Error::Config(
                    "privacy requires an authentication protocol".into(),
                ));
            }
            if password.len() < MIN_PASSWORD_LENGTH {
                return Err(Error::Config(format!(
                    "privacy password must be at least {} octets",
                    MIN_PASSWORD_LENGTH
                )));
            }
            Some((protocol, password.into_bytes()))
        }
        (Some(_), None) => {
            return Err(Error::Config(
                "privacy protocol set without a password".into(),
            ));
        }
        // a privacy password alone has neither an auth protocol nor a
        // privacy protocol to act under
        (None, Some(_)) => {
            return Err(Error::Config(
                "privacy password requires both an authentication and a privacy protocol".into(),
            ));
        }
        (None, None) => None,
    };

    Ok(UsmConfig {
        username: Bytes::from(usm.username),
        auth,
        privacy,
        context_name: usm.context_name.map(Bytes::from).unwrap_or_default(),
    })
}

/// Resolve `host[:port]` to a socket address, defaulting the SNMP port.
async fn resolve_peer(peer: &str) -> Result<SocketAddr> {
    if let Ok(addr) = peer.parse::<SocketAddr>() {
        return Ok(addr);
    }

    let with_port = if peer.contains(':') {
        peer.to_string()
    } else {
        format!("{}:{}", peer, DEFAULT_PORT)
    };

    if let Ok(addr) = with_port.parse::<SocketAddr>() {
        return Ok(addr);
    }

    tokio::net::lookup_host(&with_port)
        .await
        .map_err(|e| Error::Config(format!("cannot resolve {}: {}", peer, e)))?
        .next()
        .ok_or_else(|| Error::Config(format!("cannot resolve {}", peer)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    fn mock() -> MockTransport {
        MockTransport::new("127.0.0.1:161".parse().unwrap())
    }

    #[test]
    fn community_defaults() {
        let session = SessionBuilder::new("127.0.0.1:161", Auth::default())
            .open_with(mock())
            .unwrap();
        assert_eq!(session.version(), Version::V2c);
        assert_eq!(session.timeout(), DEFAULT_TIMEOUT);
        assert_eq!(session.retries(), DEFAULT_RETRIES);
        assert_eq!(session.bulk(), (0, 40));
    }

    #[test]
    fn empty_community_rejected() {
        let err = SessionBuilder::new("127.0.0.1:161", Auth::v2c(""))
            .open_with(mock())
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn zero_timeout_rejected() {
        let err = SessionBuilder::new("127.0.0.1:161", Auth::v2c("public"))
            .timeout(Duration::ZERO)
            .open_with(mock())
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn zero_max_repetitions_rejected() {
        let err = SessionBuilder::new("127.0.0.1:161", Auth::v2c("public"))
            .bulk(0, 0)
            .open_with(mock())
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn usm_no_auth_no_priv_accepted() {
        let session = SessionBuilder::new("127.0.0.1:161", Auth::usm("operator"))
            .open_with(mock())
            .unwrap();
        assert_eq!(session.version(), Version::V3);
    }

    #[test]
    fn priv_password_without_protocols_rejected() {
        let auth = Auth::Usm(UsmAuth {
            username: "operator".into(),
            auth_protocol: None,
            auth_password: None,
            priv_protocol: None,
            priv_password: Some("privpassword".into()),
            context_name: None,
        });
        let err = SessionBuilder::new("127.0.0.1:161", auth)
            .open_with(mock())
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn privacy_without_auth_rejected() {
        let auth: Auth = Auth::usm("operator")
            .privacy(PrivProtocol::Aes128, "privpassword")
            .into();
        let err = SessionBuilder::new("127.0.0.1:161", auth)
            .open_with(mock())
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn short_password_rejected() {
        let auth: Auth = Auth::usm("operator")
            .auth(AuthProtocol::Sha1, "short")
            .into();
        let err = SessionBuilder::new("127.0.0.1:161", auth)
            .open_with(mock())
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn auth_priv_accepted() {
        let auth: Auth = Auth::usm("operator")
            .auth(AuthProtocol::Md5, "authpassword")
            .privacy(PrivProtocol::Des, "privpassword")
            .into();
        let session = SessionBuilder::new("127.0.0.1:161", auth)
            .open_with(mock())
            .unwrap();
        assert_eq!(session.version(), Version::V3);
    }

    #[tokio::test]
    async fn resolve_appends_default_port() {
        let addr = resolve_peer("192.0.2.7").await.unwrap();
        assert_eq!(addr.port(), DEFAULT_PORT);

        let addr = resolve_peer("192.0.2.7:1161").await.unwrap();
        assert_eq!(addr.port(), 1161);
    }
}
