//! Scripted transport for tests.
//!
//! Queues responses (or failures) to hand back in order, records every
//! request sent, and patches response request-ids to match the request
//! on the wire so tests don't have to predict id allocation.

use super::Transport;
use crate::error::{Error, Result};
use bytes::Bytes;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted reply.
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// Return this datagram, with its request-id patched to match the
    /// last request.
    Data(Bytes),
    /// Return this datagram exactly as given (for id-mismatch tests).
    RawData(Bytes),
    /// Wait out the full timeout, then report it.
    Timeout,
    /// Fail the receive with an I/O error.
    IoError(String),
}

struct MockTransportInner {
    peer: SocketAddr,
    responses: VecDeque<MockResponse>,
    requests: Vec<Bytes>,
    last_request_id: Option<i32>,
}

/// Scripted in-memory transport.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

impl MockTransport {
    /// New mock bound to a nominal peer address.
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockTransportInner {
                peer,
                responses: VecDeque::new(),
                requests: Vec::new(),
                last_request_id: None,
            })),
        }
    }

    /// Queue a datagram whose request-id will be patched.
    pub fn queue_response(&self, data: impl Into<Bytes>) {
        self.inner
            .lock()
            .unwrap()
            .responses
            .push_back(MockResponse::Data(data.into()));
    }

    /// Queue a datagram returned verbatim.
    pub fn queue_raw_response(&self, data: impl Into<Bytes>) {
        self.inner
            .lock()
            .unwrap()
            .responses
            .push_back(MockResponse::RawData(data.into()));
    }

    /// Queue a full-timeout wait.
    pub fn queue_timeout(&self) {
        self.inner
            .lock()
            .unwrap()
            .responses
            .push_back(MockResponse::Timeout);
    }

    /// Queue an I/O failure.
    pub fn queue_io_error(&self, msg: impl Into<String>) {
        self.inner
            .lock()
            .unwrap()
            .responses
            .push_back(MockResponse::IoError(msg.into()));
    }

    /// Every datagram sent so far.
    pub fn requests(&self) -> Vec<Bytes> {
        self.inner.lock().unwrap().requests.clone()
    }

    /// Scripted replies not yet consumed.
    pub fn queued_response_count(&self) -> usize {
        self.inner.lock().unwrap().responses.len()
    }

    fn extract_request_id(data: &[u8]) -> Option<i32> {
        use crate::message::Message;

        Message::decode(Bytes::copy_from_slice(data))
            .ok()
            .and_then(|msg| msg.pdu().map(|pdu| pdu.request_id))
    }

    fn patch_request_id(data: Bytes, new_id: i32) -> Bytes {
        use crate::message::Message;

        match Message::decode(data.clone()) {
            Ok(Message::Community(mut cm)) => {
                cm.pdu.request_id = new_id;
                cm.encode()
            }
            // v3 messages carry MACs; tests queue them with correct ids
            _ => data,
        }
    }
}

impl Transport for MockTransport {
    async fn send(&self, data: &[u8]) -> Result<()> {
        let data = Bytes::copy_from_slice(data);
        let request_id = Self::extract_request_id(&data);

        let mut inner = self.inner.lock().unwrap();
        inner.requests.push(data);
        inner.last_request_id = request_id;
        Ok(())
    }

    async fn recv(&self, recv_timeout: Duration) -> Result<Bytes> {
        let (response, peer, last_id) = {
            let mut inner = self.inner.lock().unwrap();
            (
                inner.responses.pop_front(),
                inner.peer,
                inner.last_request_id,
            )
        };

        match response {
            Some(MockResponse::Data(data)) => Ok(match last_id {
                Some(id) => Self::patch_request_id(data, id),
                None => data,
            }),
            Some(MockResponse::RawData(data)) => Ok(data),
            Some(MockResponse::IoError(msg)) => Err(Error::Io {
                target: Some(peer),
                source: std::io::Error::other(msg),
            }),
            Some(MockResponse::Timeout) | None => {
                tokio::time::sleep(recv_timeout).await;
                Err(Error::Timeout {
                    target: Some(peer),
                    elapsed: recv_timeout,
                    retries: 0,
                })
            }
        }
    }

    fn peer_addr(&self) -> SocketAddr {
        self.inner.lock().unwrap().peer
    }

    fn local_addr(&self) -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }
}

/// Builds response datagrams without hand-crafting BER.
pub struct ResponseBuilder {
    request_id: i32,
    varbinds: Vec<(crate::oid::Oid, crate::value::Value)>,
    error_status: i32,
    error_index: i32,
}

impl ResponseBuilder {
    /// Response with the given request id (usually patched later by the
    /// mock).
    pub fn new(request_id: i32) -> Self {
        Self {
            request_id,
            varbinds: Vec::new(),
            error_status: 0,
            error_index: 0,
        }
    }

    /// Append a binding.
    pub fn varbind(mut self, oid: crate::oid::Oid, value: crate::value::Value) -> Self {
        self.varbinds.push((oid, value));
        self
    }

    /// Set the error-status field.
    pub fn error_status(mut self, status: i32) -> Self {
        self.error_status = status;
        self
    }

    /// Set the error-index field.
    pub fn error_index(mut self, index: i32) -> Self {
        self.error_index = index;
        self
    }

    fn build(self, version: crate::version::Version, community: &[u8]) -> Bytes {
        use crate::message::CommunityMessage;
        use crate::pdu::{Pdu, PduType};
        use crate::varbind::VarBind;

        let varbinds = self
            .varbinds
            .into_iter()
            .map(|(oid, value)| VarBind::new(oid, value))
            .collect();

        let pdu = Pdu {
            pdu_type: PduType::Response,
            request_id: self.request_id,
            error_status: self.error_status,
            error_index: self.error_index,
            varbinds,
        };

        CommunityMessage::new(version, Bytes::copy_from_slice(community), pdu).encode()
    }

    /// Encode as a v2c response message.
    pub fn build_v2c(self, community: &[u8]) -> Bytes {
        self.build(crate::version::Version::V2c, community)
    }

    /// Encode as a v1 response message.
    pub fn build_v1(self, community: &[u8]) -> Bytes {
        self.build(crate::version::Version::V1, community)
    }
}
