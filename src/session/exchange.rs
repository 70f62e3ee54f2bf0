//! The request/response exchange loop: send, wait, retry, give up.
//!
//! One request moves through `Idle -> Sent -> Waiting` and ends in one
//! of `Received`, `TimedOut` or `Aborted`:
//!
//! - `Sent` arms a fresh deadline and transmits the already-encoded
//!   datagram; retransmissions reuse the identical bytes, so the
//!   request id never changes across attempts.
//! - `Waiting` blocks on the channel until the deadline. A datagram
//!   whose request id does not match is discarded and the wait resumes
//!   against the same deadline; it does not count as a reply.
//! - Deadline expiry consumes one retry and re-enters `Sent`; an
//!   exhausted budget ends in `TimedOut` after at most
//!   `timeout * (retries + 1)` of waiting.
//! - A channel-level error (ICMP port unreachable surfaces here on a
//!   connected socket) or an external cancellation ends in `Aborted`
//!   immediately, without consuming the remaining budget.

use std::time::Instant;

use bytes::Bytes;

use super::Session;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::pdu::{GetBulkPdu, Pdu};
use crate::transport::Transport;
use crate::version::Version;

impl<T: Transport> Session<T> {
    /// Run one request/response exchange for an already-encoded request.
    ///
    /// `accept` inspects a received datagram: `Ok(Some(pdu))` completes
    /// the exchange, `Ok(None)` discards the datagram and resumes the
    /// wait, `Err` aborts.
    pub(crate) async fn exchange<F>(
        &self,
        transport: &T,
        data: &[u8],
        mut accept: F,
    ) -> Result<Pdu>
    where
        F: FnMut(Bytes) -> Result<Option<Pdu>>,
    {
        let tunables = self.tunables();
        let cancel = self.current_cancel();
        let start = Instant::now();

        for attempt in 0..=tunables.retries {
            if attempt > 0 {
                tracing::debug!(
                    target: "snmp_session::session",
                    snmp.peer = %transport.peer_addr(),
                    snmp.attempt = attempt,
                    "retransmitting request"
                );
            }

            transport.send(data).await?;
            let deadline = Instant::now() + tunables.timeout;

            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }

                let received = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        // hand later requests a live token again
                        self.reset_cancel();
                        return Err(Error::Cancelled {
                            target: Some(transport.peer_addr()),
                        });
                    }
                    r = transport.recv(remaining) => r,
                };

                match received {
                    Ok(datagram) => match accept(datagram)? {
                        Some(pdu) => return Ok(pdu),
                        None => {
                            tracing::debug!(
                                target: "snmp_session::session",
                                snmp.peer = %transport.peer_addr(),
                                "discarding datagram that matches no outstanding request"
                            );
                            continue;
                        }
                    },
                    // this attempt's window closed; spend a retry
                    Err(Error::Timeout { .. }) => break,
                    Err(e) => return Err(e),
                }
            }
        }

        let elapsed = start.elapsed();
        tracing::debug!(
            target: "snmp_session::session",
            snmp.peer = %transport.peer_addr(),
            snmp.elapsed_ms = elapsed.as_millis() as u64,
            snmp.retries = tunables.retries,
            "request timed out"
        );
        Err(Error::Timeout {
            target: Some(transport.peer_addr()),
            elapsed,
            retries: tunables.retries,
        })
    }

    /// Send a GET/GETNEXT/SET PDU and return the validated response.
    pub(crate) async fn transact(&self, transport: &T, pdu: Pdu) -> Result<Pdu> {
        if self.config().version == Version::V3 {
            return self.transact_v3(transport, pdu).await;
        }

        let request_id = pdu.request_id;
        let message = crate::message::CommunityMessage::new(
            self.config().version,
            self.config().community.clone(),
            pdu,
        );
        let data = message.encode();

        let response = self
            .exchange(transport, &data, |datagram| {
                self.accept_community(datagram, request_id)
            })
            .await?;

        self.check_error_status(transport, &response)?;
        Ok(response)
    }

    /// Send a GETBULK PDU and return the validated response.
    pub(crate) async fn transact_bulk(&self, transport: &T, pdu: GetBulkPdu) -> Result<Pdu> {
        if self.config().version == Version::V3 {
            // GETBULK shares the generic PDU layout with the two header
            // fields reinterpreted
            let generic = Pdu {
                pdu_type: crate::pdu::PduType::GetBulkRequest,
                request_id: pdu.request_id,
                error_status: pdu.non_repeaters,
                error_index: pdu.max_repetitions,
                varbinds: pdu.varbinds,
            };
            return self.transact_v3(transport, generic).await;
        }

        let request_id = pdu.request_id;
        let data = crate::message::CommunityMessage::encode_bulk(
            self.config().version,
            self.config().community.clone(),
            &pdu,
        );

        let response = self
            .exchange(transport, &data, |datagram| {
                self.accept_community(datagram, request_id)
            })
            .await?;

        self.check_error_status(transport, &response)?;
        Ok(response)
    }

    /// Decode a community response and correlate it with the request.
    fn accept_community(&self, datagram: Bytes, request_id: i32) -> Result<Option<Pdu>> {
        let message = Message::decode(datagram)?;

        let version = message.version();
        if version != self.config().version {
            tracing::warn!(
                target: "snmp_session::session",
                expected = %self.config().version,
                actual = %version,
                "version mismatch in response"
            );
            return Err(Error::decode(
                0,
                crate::error::DecodeErrorKind::UnknownVersion(version.as_i32() as i64),
            ));
        }

        let pdu = message.into_pdu().expect("community messages carry a PDU");
        if pdu.request_id != request_id {
            tracing::debug!(
                target: "snmp_session::session",
                expected = request_id,
                actual = pdu.request_id,
                "request id mismatch; resuming wait"
            );
            return Ok(None);
        }

        Ok(Some(pdu))
    }

    /// Map a non-zero error-status into the error taxonomy.
    pub(crate) fn check_error_status(&self, transport: &T, response: &Pdu) -> Result<()> {
        if !response.is_error() {
            return Ok(());
        }

        let status = response.error_status_enum();
        // error_index is 1-based; 0 means the error is not tied to one
        // binding
        let oid = (response.error_index as usize)
            .checked_sub(1)
            .and_then(|idx| response.varbinds.get(idx))
            .map(|vb| vb.oid.clone());

        Err(Error::Protocol {
            target: Some(transport.peer_addr()),
            status,
            index: response.error_index.max(0) as u32,
            oid,
        })
    }
}
