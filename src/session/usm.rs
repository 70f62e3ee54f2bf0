//! SNMPv3 request path: engine discovery, message construction,
//! response authentication and report handling.

use std::sync::RwLock;

use bytes::Bytes;

use super::Session;
use crate::ber::Decoder;
use crate::error::{AuthErrorKind, CryptoErrorKind, Error, Result};
use crate::message::{MsgFlags, MsgGlobalData, ScopedPdu, V3Message, V3MessageData};
use crate::oid::Oid;
use crate::pdu::{Pdu, PduType};
use crate::transport::Transport;
use crate::v3::{
    AuthKey, EngineState, PrivKey, SaltCounter, UsmSecurityParams, authenticate_message,
    find_auth_params_offset, parse_discovery_response, verify_message,
};

/// Per-session USM runtime state: the discovered engine and the keys
/// localized to it.
pub(crate) struct UsmSessionState {
    engine: RwLock<Option<EngineState>>,
    auth_key: RwLock<Option<AuthKey>>,
    priv_key: RwLock<Option<PrivKey>>,
    salts: SaltCounter,
}

impl UsmSessionState {
    pub fn new() -> Self {
        Self {
            engine: RwLock::new(None),
            auth_key: RwLock::new(None),
            priv_key: RwLock::new(None),
            salts: SaltCounter::new(),
        }
    }

    fn engine_snapshot(&self) -> Option<EngineState> {
        self.engine.read().unwrap().clone()
    }
}

impl<T: Transport> Session<T> {
    /// Send a v3 request, discovering the engine first when needed and
    /// resynchronizing once if the agent reports a time-window miss.
    pub(crate) async fn transact_v3(&self, transport: &T, pdu: Pdu) -> Result<Pdu> {
        self.ensure_engine(transport).await?;

        let mut resynced = false;
        loop {
            let request_id = pdu.request_id;
            let data = self.build_v3_request(&pdu)?;

            let result = self
                .exchange(transport, &data, |datagram| {
                    self.accept_v3(transport, datagram, request_id)
                })
                .await;

            match result {
                // the report already refreshed boots/time; rebuild with
                // the corrected clock and try once more
                Err(Error::NotInTimeWindow { .. }) if !resynced => {
                    tracing::debug!(
                        target: "snmp_session::usm",
                        snmp.peer = %transport.peer_addr(),
                        "engine time resynchronized; resending"
                    );
                    resynced = true;
                    continue;
                }
                Err(e) => return Err(e),
                Ok(response) => {
                    self.check_error_status(transport, &response)?;
                    return Ok(response);
                }
            }
        }
    }

    /// Discover the authoritative engine and localize keys to it.
    async fn ensure_engine(&self, transport: &T) -> Result<()> {
        if self.usm_state.engine_snapshot().is_some() {
            return Ok(());
        }

        tracing::debug!(
            target: "snmp_session::usm",
            snmp.peer = %transport.peer_addr(),
            "performing engine discovery"
        );

        let msg_id = super::next_request_id();
        let probe = V3Message::discovery_request(msg_id).encode();

        self.exchange(transport, &probe, |datagram| {
            let message = V3Message::decode(datagram)?;
            if message.msg_id() != msg_id {
                return Ok(None);
            }

            let state = parse_discovery_response(&message.security_params).map_err(|_| {
                Error::UnknownEngineId {
                    target: Some(transport.peer_addr()),
                }
            })?;
            tracing::debug!(
                target: "snmp_session::usm",
                snmp.engine_boots = state.engine_boots,
                snmp.engine_time = state.engine_time,
                "discovered engine"
            );
            *self.usm_state.engine.write().unwrap() = Some(state);

            // the probe's answer is a report PDU; any shape will do here
            message.into_pdu().map(Some).ok_or_else(|| {
                Error::DecryptionFailed {
                    target: Some(transport.peer_addr()),
                    kind: CryptoErrorKind::InvalidPlaintext,
                }
            })
        })
        .await?;

        self.localize_keys()?;
        Ok(())
    }

    fn localize_keys(&self) -> Result<()> {
        let usm = self
            .config()
            .usm
            .as_ref()
            .ok_or_else(|| Error::Config("v3 session without USM parameters".into()))?;
        let engine = self
            .usm_state
            .engine_snapshot()
            .ok_or(Error::UnknownEngineId { target: None })?;

        if let Some((protocol, password)) = &usm.auth {
            let key = AuthKey::from_password(*protocol, password, &engine.engine_id);
            *self.usm_state.auth_key.write().unwrap() = Some(key);
        }
        if let (Some((auth_protocol, _)), Some((priv_protocol, password))) =
            (&usm.auth, &usm.privacy)
        {
            let key =
                PrivKey::from_password(*auth_protocol, *priv_protocol, password, &engine.engine_id);
            *self.usm_state.priv_key.write().unwrap() = Some(key);
        }

        Ok(())
    }

    /// Build and secure one v3 request datagram.
    fn build_v3_request(&self, pdu: &Pdu) -> Result<Vec<u8>> {
        let usm = self
            .config()
            .usm
            .as_ref()
            .ok_or_else(|| Error::Config("v3 session without USM parameters".into()))?;
        let engine = self
            .usm_state
            .engine_snapshot()
            .ok_or(Error::UnknownEngineId { target: None })?;

        let level = usm.security_level();
        // request id doubles as msgID so one correlation check covers both
        let msg_id = pdu.request_id;
        let engine_boots = engine.engine_boots;
        let engine_time = engine.estimated_time();

        let scoped = ScopedPdu::new(
            engine.engine_id.clone(),
            usm.context_name.clone(),
            pdu.clone(),
        );

        let (payload, priv_params) = if level.requires_priv() {
            let priv_key = self.usm_state.priv_key.read().unwrap();
            let priv_key = priv_key.as_ref().ok_or(Error::EncryptionFailed {
                target: None,
                kind: CryptoErrorKind::NoPrivKey,
            })?;
            let (ciphertext, salt) = priv_key.encrypt(
                &scoped.encode_to_bytes(),
                engine_boots,
                engine_time,
                &self.usm_state.salts,
            )?;
            (V3MessageData::Encrypted(ciphertext), salt)
        } else {
            (V3MessageData::Plaintext(scoped), Bytes::new())
        };

        let mut params = UsmSecurityParams::new(
            engine.engine_id.clone(),
            engine_boots,
            engine_time,
            usm.username.clone(),
        );
        let mac_len = self
            .usm_state
            .auth_key
            .read()
            .unwrap()
            .as_ref()
            .map(|k| k.mac_len())
            .unwrap_or(0);
        if level.requires_auth() {
            params = params.with_auth_placeholder(mac_len);
        }
        if level.requires_priv() {
            params = params.with_priv_params(priv_params);
        }

        let global_data = MsgGlobalData::new(msg_id, MsgFlags::new(level, true));
        let message = V3Message {
            global_data,
            security_params: params.encode(),
            data: payload,
        };
        let mut encoded = message.encode().to_vec();

        if level.requires_auth() {
            let auth_key = self.usm_state.auth_key.read().unwrap();
            let auth_key = auth_key
                .as_ref()
                .ok_or_else(|| Error::auth(None, AuthErrorKind::NoAuthKey))?;
            let (offset, len) = find_auth_params_offset(&encoded)
                .ok_or_else(|| Error::auth(None, AuthErrorKind::AuthParamsNotFound))?;
            authenticate_message(auth_key, &mut encoded, offset, len);
        }

        Ok(encoded)
    }

    /// Verify, decrypt and correlate one received v3 datagram.
    fn accept_v3(&self, transport: &T, datagram: Bytes, request_id: i32) -> Result<Option<Pdu>> {
        let peer = transport.peer_addr();
        let message = V3Message::decode(datagram.clone())?;

        if message.msg_id() != request_id {
            return Ok(None);
        }

        let params = UsmSecurityParams::decode(message.security_params.clone())?;
        let response_level = message.security_level();

        if response_level.requires_auth() {
            let auth_key = self.usm_state.auth_key.read().unwrap();
            let auth_key = auth_key
                .as_ref()
                .ok_or_else(|| Error::auth(Some(peer), AuthErrorKind::NoAuthKey))?;
            let (offset, len) = find_auth_params_offset(&datagram)
                .ok_or_else(|| Error::auth(Some(peer), AuthErrorKind::AuthParamsNotFound))?;
            if !verify_message(auth_key, &datagram, offset, len) {
                return Err(Error::auth(Some(peer), AuthErrorKind::HmacMismatch));
            }
        }

        let pdu = match message.data {
            V3MessageData::Plaintext(scoped) => scoped.pdu,
            V3MessageData::Encrypted(ciphertext) => {
                let priv_key = self.usm_state.priv_key.read().unwrap();
                let priv_key = priv_key.as_ref().ok_or(Error::DecryptionFailed {
                    target: Some(peer),
                    kind: CryptoErrorKind::NoPrivKey,
                })?;
                let plaintext = priv_key.decrypt(
                    &ciphertext,
                    &params.priv_params,
                    params.engine_boots,
                    params.engine_time,
                )?;
                let mut decoder = Decoder::new(plaintext);
                ScopedPdu::decode(&mut decoder)
                    .map_err(|_| Error::DecryptionFailed {
                        target: Some(peer),
                        kind: CryptoErrorKind::InvalidPlaintext,
                    })?
                    .pdu
            }
        };

        if pdu.pdu_type == PduType::Report {
            return Err(self.map_report(peer, &params, &pdu));
        }

        let required = self
            .config()
            .usm
            .as_ref()
            .map(|u| u.security_level())
            .unwrap_or(crate::v3::SecurityLevel::NoAuthNoPriv);
        if required.requires_auth() && !response_level.requires_auth() {
            tracing::warn!(
                target: "snmp_session::usm",
                snmp.peer = %peer,
                "unauthenticated response to an authenticated request"
            );
            return Err(Error::auth(Some(peer), AuthErrorKind::HmacMismatch));
        }

        if pdu.request_id != request_id {
            return Ok(None);
        }

        Ok(Some(pdu))
    }

    /// Translate a usmStats report into its error, refreshing engine
    /// state where the report carries corrections.
    fn map_report(
        &self,
        peer: std::net::SocketAddr,
        params: &UsmSecurityParams,
        pdu: &Pdu,
    ) -> Error {
        let report_oid = pdu.varbinds.first().map(|vb| vb.oid.clone());

        let Some(oid) = &report_oid else {
            return Error::Report {
                target: Some(peer),
                oid: None,
            };
        };

        if oid.starts_with(&Oid::from_slice(&USM_STATS_NOT_IN_TIME_WINDOWS)) {
            // adopt the authoritative clock the report carries
            let mut engine = self.usm_state.engine.write().unwrap();
            if let Some(state) = engine.as_mut() {
                state.engine_boots = params.engine_boots;
                state.engine_time = params.engine_time;
                state.discovered_at = std::time::Instant::now();
            }
            return Error::NotInTimeWindow { target: Some(peer) };
        }
        if oid.starts_with(&Oid::from_slice(&USM_STATS_UNKNOWN_ENGINE_IDS)) {
            // forget the engine so the next request rediscovers it
            *self.usm_state.engine.write().unwrap() = None;
            return Error::UnknownEngineId { target: Some(peer) };
        }
        if oid.starts_with(&Oid::from_slice(&USM_STATS_WRONG_DIGESTS)) {
            return Error::auth(Some(peer), AuthErrorKind::HmacMismatch);
        }
        if oid.starts_with(&Oid::from_slice(&USM_STATS_DECRYPTION_ERRORS)) {
            return Error::DecryptionFailed {
                target: Some(peer),
                kind: CryptoErrorKind::InvalidPlaintext,
            };
        }

        Error::Report {
            target: Some(peer),
            oid: report_oid,
        }
    }
}

// usmStats counters (RFC 3414 Section 6)
const USM_STATS_NOT_IN_TIME_WINDOWS: [u32; 10] = [1, 3, 6, 1, 6, 3, 15, 1, 1, 2];
const USM_STATS_UNKNOWN_ENGINE_IDS: [u32; 10] = [1, 3, 6, 1, 6, 3, 15, 1, 1, 4];
const USM_STATS_WRONG_DIGESTS: [u32; 10] = [1, 3, 6, 1, 6, 3, 15, 1, 1, 5];
const USM_STATS_DECRYPTION_ERRORS: [u32; 10] = [1, 3, 6, 1, 6, 3, 15, 1, 1, 6];
