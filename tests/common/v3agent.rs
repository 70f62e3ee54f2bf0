//! In-process SNMPv3 agent for integration tests.
//!
//! Implements the authoritative side of USM far enough to test the
//! client: engine discovery reports, HMAC verification and signing,
//! optional DES/AES privacy, and GET answers from a fixture map.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use snmp_session::message::{Message, MsgFlags, MsgGlobalData, ScopedPdu, V3Message, V3MessageData};
use snmp_session::pdu::{Pdu, PduType};
use snmp_session::v3::{
    AuthKey, AuthProtocol, PrivKey, PrivProtocol, SaltCounter, SecurityLevel, UsmSecurityParams,
    authenticate_message, find_auth_params_offset, verify_message,
};
use snmp_session::{Oid, Value, VarBind, oid};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const ENGINE_ID: &[u8] = b"\x80\x00\x1f\x88\x04test-engine";
const ENGINE_BOOTS: u32 = 1;
const ENGINE_TIME: u32 = 12345;

pub struct V3TestAgent {
    addr: SocketAddr,
    cancel: CancellationToken,
    _task: JoinHandle<()>,
}

struct AgentKeys {
    auth: Option<AuthKey>,
    privacy: Option<PrivKey>,
}

impl V3TestAgent {
    /// Agent answering for one USM user with the given credentials.
    pub async fn new(
        auth: Option<(AuthProtocol, &str)>,
        privacy: Option<(AuthProtocol, PrivProtocol, &str)>,
        data: BTreeMap<Oid, Value>,
    ) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind agent");
        let addr = socket.local_addr().unwrap();
        let cancel = CancellationToken::new();

        let keys = Arc::new(AgentKeys {
            auth: auth.map(|(proto, pass)| AuthKey::from_password(proto, pass.as_bytes(), ENGINE_ID)),
            privacy: privacy.map(|(aproto, pproto, pass)| {
                PrivKey::from_password(aproto, pproto, pass.as_bytes(), ENGINE_ID)
            }),
        });

        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            let salts = SaltCounter::new();
            let mut buf = vec![0u8; 65535];
            loop {
                let (len, from) = tokio::select! {
                    _ = task_cancel.cancelled() => return,
                    r = socket.recv_from(&mut buf) => match r {
                        Ok(v) => v,
                        Err(_) => return,
                    },
                };

                let datagram = Bytes::copy_from_slice(&buf[..len]);
                if let Some(reply) = answer(&keys, &salts, &data, datagram) {
                    let _ = socket.send_to(&reply, from).await;
                }
            }
        });

        Self {
            addr,
            cancel,
            _task: task,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Drop for V3TestAgent {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn answer(
    keys: &AgentKeys,
    salts: &SaltCounter,
    data: &BTreeMap<Oid, Value>,
    datagram: Bytes,
) -> Option<Vec<u8>> {
    let Ok(Message::V3(request)) = Message::decode(datagram.clone()) else {
        return None;
    };
    let msg_id = request.msg_id();
    let params = UsmSecurityParams::decode(request.security_params.clone()).ok()?;

    // discovery probe: empty engine id answered with a report
    if params.engine_id.is_empty() {
        let report = Pdu {
            pdu_type: PduType::Report,
            request_id: 0,
            error_status: 0,
            error_index: 0,
            varbinds: vec![VarBind::new(
                oid!(1, 3, 6, 1, 6, 3, 15, 1, 1, 4, 0),
                Value::Counter32(1),
            )],
        };
        let reply_params =
            UsmSecurityParams::new(ENGINE_ID, ENGINE_BOOTS, ENGINE_TIME, Bytes::new());
        let reply = V3Message::new(
            MsgGlobalData::new(msg_id, MsgFlags::new(SecurityLevel::NoAuthNoPriv, false)),
            reply_params.encode(),
            ScopedPdu::new(ENGINE_ID, Bytes::new(), report),
        );
        return Some(reply.encode().to_vec());
    }

    let level = request.security_level();

    if level.requires_auth() {
        let auth_key = keys.auth.as_ref()?;
        let (offset, mac_len) = find_auth_params_offset(&datagram)?;
        if !verify_message(auth_key, &datagram, offset, mac_len) {
            return None;
        }
    }

    let pdu = match request.data {
        V3MessageData::Plaintext(scoped) => scoped.pdu,
        V3MessageData::Encrypted(ciphertext) => {
            let priv_key = keys.privacy.as_ref()?;
            let plaintext = priv_key
                .decrypt(
                    &ciphertext,
                    &params.priv_params,
                    params.engine_boots,
                    params.engine_time,
                )
                .ok()?;
            let mut decoder = snmp_session::ber::Decoder::new(plaintext);
            ScopedPdu::decode(&mut decoder).ok()?.pdu
        }
    };

    // answer GETs from the fixture map
    let varbinds = pdu
        .varbinds
        .iter()
        .map(|vb| {
            let value = data.get(&vb.oid).cloned().unwrap_or(Value::NoSuchInstance);
            VarBind::new(vb.oid.clone(), value)
        })
        .collect();
    let response = Pdu {
        pdu_type: PduType::Response,
        request_id: pdu.request_id,
        error_status: 0,
        error_index: 0,
        varbinds,
    };

    let scoped = ScopedPdu::new(ENGINE_ID, Bytes::new(), response);
    let (payload, priv_params) = if level.requires_priv() {
        let priv_key = keys.privacy.as_ref()?;
        let (ciphertext, salt) = priv_key
            .encrypt(&scoped.encode_to_bytes(), ENGINE_BOOTS, ENGINE_TIME, salts)
            .ok()?;
        (V3MessageData::Encrypted(ciphertext), salt)
    } else {
        (V3MessageData::Plaintext(scoped), Bytes::new())
    };

    let mut reply_params =
        UsmSecurityParams::new(ENGINE_ID, ENGINE_BOOTS, ENGINE_TIME, params.username.clone());
    if level.requires_auth() {
        let mac_len = keys.auth.as_ref()?.mac_len();
        reply_params = reply_params.with_auth_placeholder(mac_len);
    }
    if level.requires_priv() {
        reply_params = reply_params.with_priv_params(priv_params);
    }

    let reply = V3Message {
        global_data: MsgGlobalData::new(msg_id, MsgFlags::new(level, false)),
        security_params: reply_params.encode(),
        data: payload,
    };
    let mut encoded = reply.encode().to_vec();

    if level.requires_auth() {
        let auth_key = keys.auth.as_ref()?;
        let (offset, mac_len) = find_auth_params_offset(&encoded)?;
        authenticate_message(auth_key, &mut encoded, offset, mac_len);
    }

    Some(encoded)
}
