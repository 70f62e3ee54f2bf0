//! GETBULK and walk semantics.

mod common;

use common::TestAgent;
use snmp_session::{Auth, Error, Session, Value, oid};
use std::collections::BTreeMap;
use std::time::Duration;

async fn open(agent: &TestAgent) -> Session {
    Session::builder(agent.addr().to_string(), Auth::v2c("public"))
        .timeout(Duration::from_millis(500))
        .retries(1)
        .open()
        .await
        .unwrap()
}

/// GETBULK under SNMPv1 is a local usage error; nothing is sent.
#[tokio::test]
async fn bulk_on_v1_rejected_locally() {
    let agent = TestAgent::new().await;
    let session = Session::builder(agent.addr().to_string(), Auth::v1("public"))
        .open()
        .await
        .unwrap();

    let err = session
        .get_bulk(&[oid!(1, 3, 6, 1, 2, 1, 1)], 0, 10)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BulkUnsupported));
}

/// GETBULK returns up to max-repetitions bindings.
#[tokio::test]
async fn bulk_bounded_by_max_repetitions() {
    let agent = TestAgent::new().await;
    let session = open(&agent).await;

    let results = session
        .get_bulk(&[oid!(1, 3, 6, 1, 2, 1, 1)], 0, 3)
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].oid, oid!(1, 3, 6, 1, 2, 1, 1, 1, 0));
    assert!(results.iter().all(|vb| !vb.value.is_exception()));
}

/// A short GETBULK result is "walk exhausted": the typed bindings come
/// back followed by a detectable end-of-view, not an error.
#[tokio::test]
async fn bulk_short_result_carries_end_of_view() {
    let mut data = BTreeMap::new();
    data.insert(oid!(1, 3, 6, 1, 2, 1, 2, 1, 0), Value::Integer(1));
    data.insert(oid!(1, 3, 6, 1, 2, 1, 2, 2, 0), Value::Integer(2));
    data.insert(oid!(1, 3, 6, 1, 2, 1, 2, 3, 0), Value::Integer(3));
    data.insert(oid!(1, 3, 6, 1, 2, 1, 2, 4, 0), Value::Integer(4));
    let agent = TestAgent::with_data(data).await;
    let session = open(&agent).await;

    let results = session
        .get_bulk(&[oid!(1, 3, 6, 1, 2, 1, 2)], 0, 10)
        .await
        .unwrap();

    // four typed bindings, then the end-of-view marker
    assert_eq!(results.len(), 5);
    for (i, vb) in results[..4].iter().enumerate() {
        assert_eq!(vb.value, Value::Integer(i as i64 + 1));
    }
    assert_eq!(results[4].value, Value::EndOfMibView);
}

/// Session-level bulk defaults apply to get_bulk_with_defaults.
#[tokio::test]
async fn bulk_defaults_respected() {
    let agent = TestAgent::new().await;
    let session = open(&agent).await;

    session.set_bulk(0, 2).unwrap();
    let results = session
        .get_bulk_with_defaults(&[oid!(1, 3, 6, 1, 2, 1, 1)])
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
}

/// Walk collects exactly the subtree, without the end-of-view marker.
#[tokio::test]
async fn walk_collects_subtree() {
    let agent = TestAgent::new().await;
    let session = open(&agent).await;

    let results = session.walk(&oid!(1, 3, 6, 1, 2, 1, 1)).await.unwrap();

    assert_eq!(results.len(), 7);
    assert!(results.iter().all(|vb| vb.oid.starts_with(&oid!(1, 3, 6, 1, 2, 1, 1))));
    assert!(results.iter().all(|vb| !vb.value.is_exception()));
    // lexicographic order preserved as received
    for pair in results.windows(2) {
        assert!(pair[0].oid < pair[1].oid);
    }
}

/// Walking a subtree that holds nothing yields an empty result.
#[tokio::test]
async fn walk_empty_subtree() {
    let agent = TestAgent::new().await;
    let session = open(&agent).await;

    let results = session.walk(&oid!(1, 3, 6, 1, 99)).await.unwrap();
    assert!(results.is_empty());
}

/// Walk filters out siblings that follow the subtree.
#[tokio::test]
async fn walk_stops_at_subtree_boundary() {
    let mut data = BTreeMap::new();
    data.insert(oid!(1, 3, 6, 1, 2, 1, 1, 1, 0), Value::Integer(1));
    data.insert(oid!(1, 3, 6, 1, 2, 1, 1, 2, 0), Value::Integer(2));
    data.insert(oid!(1, 3, 6, 1, 2, 1, 2, 1, 0), Value::Integer(99));
    let agent = TestAgent::with_data(data).await;
    let session = open(&agent).await;

    let results = session.walk(&oid!(1, 3, 6, 1, 2, 1, 1)).await.unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[1].oid, oid!(1, 3, 6, 1, 2, 1, 1, 2, 0));
}
