//! In-process v2c agent for integration tests.
//!
//! Binds an ephemeral localhost socket, answers GET/GETNEXT/GETBULK/SET
//! against a shared `BTreeMap`, and shuts down on drop. Stopping the
//! agent mid-test is how the timeout paths are exercised.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use snmp_session::message::{CommunityMessage, Message};
use snmp_session::pdu::{Pdu, PduType};
use snmp_session::{Oid, Value, VarBind};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct TestAgent {
    addr: SocketAddr,
    data: Arc<Mutex<BTreeMap<Oid, Value>>>,
    muted: Arc<AtomicBool>,
    cancel: CancellationToken,
    _task: JoinHandle<()>,
}

impl TestAgent {
    /// Agent preloaded with the system group fixtures.
    pub async fn new() -> Self {
        Self::with_data(super::fixtures::system_mib()).await
    }

    /// Agent serving the given map.
    pub async fn with_data(initial: BTreeMap<Oid, Value>) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind agent");
        let addr = socket.local_addr().unwrap();
        let data = Arc::new(Mutex::new(initial));
        let muted = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        let task_data = data.clone();
        let task_muted = muted.clone();
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            let mut buf = vec![0u8; 65535];
            loop {
                let (len, from) = tokio::select! {
                    _ = task_cancel.cancelled() => return,
                    r = socket.recv_from(&mut buf) => match r {
                        Ok(v) => v,
                        Err(_) => return,
                    },
                };

                // muted: keep the port bound (no ICMP unreachable) but
                // never answer, so clients run into their deadline
                if task_muted.load(Ordering::Relaxed) {
                    continue;
                }

                let Ok(Message::Community(request)) =
                    Message::decode(Bytes::copy_from_slice(&buf[..len]))
                else {
                    continue;
                };

                let response = respond(&task_data, &request.pdu);
                let message = CommunityMessage::new(
                    request.version,
                    request.community.clone(),
                    response,
                );
                let _ = socket.send_to(&message.encode(), from).await;
            }
        });

        Self {
            addr,
            data,
            muted,
            cancel,
            _task: task,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop answering while keeping the port open; requests time out
    /// rather than bouncing off an unreachable port.
    pub fn stop(&self) {
        self.muted.store(true, Ordering::Relaxed);
    }

    /// Resume answering after [`stop`](Self::stop).
    pub fn resume(&self) {
        self.muted.store(false, Ordering::Relaxed);
    }

    /// Read back a value the agent currently holds.
    pub fn value(&self, oid: &Oid) -> Option<Value> {
        self.data.lock().unwrap().get(oid).cloned()
    }
}

impl Drop for TestAgent {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn respond(data: &Mutex<BTreeMap<Oid, Value>>, request: &Pdu) -> Pdu {
    let mut map = data.lock().unwrap();

    let varbinds = match request.pdu_type {
        PduType::GetRequest => request
            .varbinds
            .iter()
            .map(|vb| {
                let value = map
                    .get(&vb.oid)
                    .cloned()
                    .unwrap_or(Value::NoSuchInstance);
                VarBind::new(vb.oid.clone(), value)
            })
            .collect(),
        PduType::GetNextRequest => request
            .varbinds
            .iter()
            .map(|vb| next_binding(&map, &vb.oid))
            .collect(),
        PduType::GetBulkRequest => {
            // non-repeaters and max-repetitions ride in the two header
            // fields
            let non_repeaters = request.error_status.max(0) as usize;
            let max_repetitions = request.error_index.max(0) as usize;
            let mut out = Vec::new();

            for vb in request.varbinds.iter().take(non_repeaters) {
                out.push(next_binding(&map, &vb.oid));
            }
            for vb in request.varbinds.iter().skip(non_repeaters) {
                let mut cursor = vb.oid.clone();
                for _ in 0..max_repetitions {
                    let binding = next_binding(&map, &cursor);
                    let done = matches!(binding.value, Value::EndOfMibView);
                    cursor = binding.oid.clone();
                    out.push(binding);
                    if done {
                        break;
                    }
                }
            }
            out
        }
        PduType::SetRequest => {
            for vb in &request.varbinds {
                map.insert(vb.oid.clone(), vb.value.clone());
            }
            request.varbinds.clone()
        }
        _ => Vec::new(),
    };

    Pdu {
        pdu_type: PduType::Response,
        request_id: request.request_id,
        error_status: 0,
        error_index: 0,
        varbinds,
    }
}

fn next_binding(map: &BTreeMap<Oid, Value>, after: &Oid) -> VarBind {
    match map
        .range((Bound::Excluded(after.clone()), Bound::Unbounded))
        .next()
    {
        Some((oid, value)) => VarBind::new(oid.clone(), value.clone()),
        None => VarBind::new(after.clone(), Value::EndOfMibView),
    }
}
