//! Retry, timeout, cancellation and abort behavior.

mod common;

use common::TestAgent;
use snmp_session::transport::{MockTransport, ResponseBuilder};
use snmp_session::{Auth, Error, ErrorStatus, Session, SessionBuilder, Value, oid};
use std::time::{Duration, Instant};

fn mock() -> MockTransport {
    MockTransport::new("192.0.2.1:161".parse().unwrap())
}

fn mock_session(transport: &MockTransport, timeout: Duration, retries: u32) -> Session<MockTransport> {
    SessionBuilder::new("192.0.2.1:161", Auth::v2c("public"))
        .timeout(timeout)
        .retries(retries)
        .open_with(transport.clone())
        .unwrap()
}

/// Timeouts are retried; a late agent still gets an answer through.
#[tokio::test]
async fn timeout_then_success() {
    let transport = mock();
    transport.queue_timeout();
    transport.queue_response(
        ResponseBuilder::new(0)
            .varbind(oid!(1, 3, 6, 1, 2, 1, 1, 1, 0), Value::from("late"))
            .build_v2c(b"public"),
    );

    let session = mock_session(&transport, Duration::from_millis(20), 2);
    let results = session.get(&[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)]).await.unwrap();

    assert_eq!(results[0].value.as_str(), Some("late"));
    // the retransmission reused the identical datagram
    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0], requests[1]);
}

/// Exhausted retries surface Timeout, bounded by timeout * (retries + 1).
#[tokio::test]
async fn retries_exhausted_is_timeout() {
    let transport = mock();
    let session = mock_session(&transport, Duration::from_millis(30), 2);

    let start = Instant::now();
    let err = session
        .get(&[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)])
        .await
        .unwrap_err();
    let elapsed = start.elapsed();

    match err {
        Error::Timeout { retries, .. } => assert_eq!(retries, 2),
        other => panic!("expected Timeout, got {:?}", other),
    }
    // three attempts of ~30ms each
    assert!(elapsed >= Duration::from_millis(80), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(500), "elapsed {:?}", elapsed);

    assert_eq!(transport.requests().len(), 3);
}

/// Zero retries means a single attempt.
#[tokio::test]
async fn zero_retries_single_attempt() {
    let transport = mock();
    let session = mock_session(&transport, Duration::from_millis(20), 0);

    let err = session
        .get(&[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)])
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Timeout { retries: 0, .. }));
    assert_eq!(transport.requests().len(), 1);
}

/// A session that timed out remains usable for the next request.
#[tokio::test]
async fn session_usable_after_timeout() {
    let agent = TestAgent::new().await;
    let session = Session::builder(agent.addr().to_string(), Auth::v2c("public"))
        .timeout(Duration::from_millis(60))
        .retries(0)
        .open()
        .await
        .unwrap();

    // mute the agent, let one request run out its deadline
    agent.stop();
    let err = session
        .get(&[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }));

    // the same session succeeds once the agent answers again
    assert!(!session.is_closed());
    agent.resume();
    let results = session
        .get(&[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)])
        .await
        .unwrap();
    assert_eq!(results[0].value.as_str(), Some("Test SNMP Agent"));
}

/// A response with a stale request id is discarded and the wait resumes
/// until the matching one arrives.
#[tokio::test]
async fn mismatched_request_id_discarded() {
    let transport = mock();
    // stale id, returned verbatim
    transport.queue_raw_response(
        ResponseBuilder::new(424242)
            .varbind(oid!(1, 3, 6, 1, 2, 1, 1, 1, 0), Value::from("stale"))
            .build_v2c(b"public"),
    );
    // then the real answer, patched to the live id
    transport.queue_response(
        ResponseBuilder::new(0)
            .varbind(oid!(1, 3, 6, 1, 2, 1, 1, 1, 0), Value::from("fresh"))
            .build_v2c(b"public"),
    );

    let session = mock_session(&transport, Duration::from_millis(200), 0);
    let results = session.get(&[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)]).await.unwrap();

    assert_eq!(results[0].value.as_str(), Some("fresh"));
    // one send: the stale datagram consumed no retry
    assert_eq!(transport.requests().len(), 1);
}

/// Channel-level errors abort immediately without consuming retries.
#[tokio::test]
async fn io_error_aborts_without_retries() {
    let transport = mock();
    transport.queue_io_error("connection refused");

    let session = mock_session(&transport, Duration::from_millis(50), 5);
    let start = Instant::now();
    let err = session
        .get(&[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)])
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Io { .. }));
    assert!(start.elapsed() < Duration::from_millis(50));
    assert_eq!(transport.requests().len(), 1);
}

/// Cancellation aborts the wait at once and the session survives.
#[tokio::test]
async fn cancellation_aborts_and_session_survives() {
    let transport = mock();
    let session = std::sync::Arc::new(mock_session(
        &transport,
        Duration::from_secs(5),
        3,
    ));

    let token = session.cancellation_token();
    let waiter = {
        let session = session.clone();
        tokio::spawn(async move { session.get(&[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)]).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    let start = Instant::now();
    token.cancel();
    let err = waiter.await.unwrap().unwrap_err();

    assert!(matches!(err, Error::Cancelled { .. }));
    assert!(start.elapsed() < Duration::from_millis(500));

    // the session accepts new work; queue an answer for it
    transport.queue_response(
        ResponseBuilder::new(0)
            .varbind(oid!(1, 3, 6, 1, 2, 1, 1, 1, 0), Value::from("alive"))
            .build_v2c(b"public"),
    );
    let results = session.get(&[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)]).await.unwrap();
    assert_eq!(results[0].value.as_str(), Some("alive"));
}

/// Non-zero error-status maps through the fixed table.
#[tokio::test]
async fn error_status_mapped() {
    let transport = mock();
    transport.queue_response(
        ResponseBuilder::new(0)
            .varbind(oid!(1, 3, 6, 1, 2, 1, 1, 7, 0), Value::Null)
            .error_status(17) // notWritable
            .error_index(1)
            .build_v2c(b"public"),
    );

    let session = mock_session(&transport, Duration::from_millis(200), 0);
    let err = session
        .set(&[(oid!(1, 3, 6, 1, 2, 1, 1, 7, 0), Value::Integer(1))])
        .await
        .unwrap_err();

    match err {
        Error::Protocol { status, index, oid, .. } => {
            assert_eq!(status, ErrorStatus::NotWritable);
            assert_eq!(index, 1);
            assert_eq!(oid, Some(oid!(1, 3, 6, 1, 2, 1, 1, 7, 0)));
        }
        other => panic!("expected Protocol error, got {:?}", other),
    }
}

/// An error-status outside the table keeps its raw code.
#[tokio::test]
async fn unknown_error_status_preserved() {
    let transport = mock();
    transport.queue_response(
        ResponseBuilder::new(0)
            .varbind(oid!(1, 3, 6, 1, 2, 1, 1, 1, 0), Value::Null)
            .error_status(99)
            .error_index(0)
            .build_v2c(b"public"),
    );

    let session = mock_session(&transport, Duration::from_millis(200), 0);
    let err = session
        .get(&[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)])
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Protocol {
            status: ErrorStatus::Unknown(99),
            ..
        }
    ));
}

/// A malformed datagram is a decode error, never a default value.
#[tokio::test]
async fn malformed_response_is_decode_error() {
    let transport = mock();
    transport.queue_raw_response(bytes::Bytes::from_static(&[0x30, 0xFF, 0x00]));

    let session = mock_session(&transport, Duration::from_millis(200), 0);
    let err = session
        .get(&[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)])
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Decode { .. }));
}
