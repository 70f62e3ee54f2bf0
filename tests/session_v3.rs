//! SNMPv3 sessions against the in-process USM agent.

mod common;

use common::fixtures::system_mib;
use common::v3agent::V3TestAgent;
use snmp_session::v3::{AuthProtocol, PrivProtocol};
use snmp_session::{Auth, Error, Session, oid};
use std::time::Duration;

const AUTH_PASSWORD: &str = "authpassword";
const PRIV_PASSWORD: &str = "privpassword";

async fn open(agent: &V3TestAgent, auth: Auth) -> Session {
    Session::builder(agent.addr().to_string(), auth)
        .timeout(Duration::from_millis(500))
        .retries(1)
        .open()
        .await
        .unwrap()
}

/// noAuthNoPriv: discovery plus a plain scoped PDU.
#[tokio::test]
async fn v3_no_auth_get() {
    let agent = V3TestAgent::new(None, None, system_mib()).await;
    let session = open(&agent, Auth::usm("operator").into()).await;

    let results = session.get(&[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)]).await.unwrap();
    assert_eq!(results[0].value.as_str(), Some("Test SNMP Agent"));
}

/// authNoPriv with MD5: both directions carry a verified HMAC.
#[tokio::test]
async fn v3_auth_md5_get() {
    let agent = V3TestAgent::new(Some((AuthProtocol::Md5, AUTH_PASSWORD)), None, system_mib()).await;
    let session = open(
        &agent,
        Auth::usm("operator").auth(AuthProtocol::Md5, AUTH_PASSWORD).into(),
    )
    .await;

    let results = session.get(&[oid!(1, 3, 6, 1, 2, 1, 1, 5, 0)]).await.unwrap();
    assert_eq!(results[0].value.as_str(), Some("test-agent"));
}

/// authPriv with SHA + AES-128.
#[tokio::test]
async fn v3_auth_priv_aes_get() {
    let agent = V3TestAgent::new(
        Some((AuthProtocol::Sha1, AUTH_PASSWORD)),
        Some((AuthProtocol::Sha1, PrivProtocol::Aes128, PRIV_PASSWORD)),
        system_mib(),
    )
    .await;
    let session = open(
        &agent,
        Auth::usm("operator")
            .auth(AuthProtocol::Sha1, AUTH_PASSWORD)
            .privacy(PrivProtocol::Aes128, PRIV_PASSWORD)
            .into(),
    )
    .await;

    let results = session.get(&[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)]).await.unwrap();
    assert_eq!(results[0].value.as_str(), Some("Test SNMP Agent"));
}

/// authPriv with MD5 + DES.
#[tokio::test]
async fn v3_auth_priv_des_get() {
    let agent = V3TestAgent::new(
        Some((AuthProtocol::Md5, AUTH_PASSWORD)),
        Some((AuthProtocol::Md5, PrivProtocol::Des, PRIV_PASSWORD)),
        system_mib(),
    )
    .await;
    let session = open(
        &agent,
        Auth::usm("operator")
            .auth(AuthProtocol::Md5, AUTH_PASSWORD)
            .privacy(PrivProtocol::Des, PRIV_PASSWORD)
            .into(),
    )
    .await;

    let results = session.get(&[oid!(1, 3, 6, 1, 2, 1, 1, 3, 0)]).await.unwrap();
    assert_eq!(results[0].value.as_u64(), Some(123456));
}

/// A response signed with the wrong key is rejected by the client.
#[tokio::test]
async fn v3_wrong_agent_key_rejected() {
    // agent signs with a different password than the client expects
    let agent = V3TestAgent::new(
        Some((AuthProtocol::Sha1, "anotherpassword")),
        None,
        system_mib(),
    )
    .await;
    let session = Session::builder(
        agent.addr().to_string(),
        Auth::usm("operator").auth(AuthProtocol::Sha1, AUTH_PASSWORD),
    )
    .timeout(Duration::from_millis(200))
    .retries(0)
    .open()
    .await
    .unwrap();

    let err = session
        .get(&[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)])
        .await
        .unwrap_err();

    // the agent drops our badly-signed request (timeout) or we reject
    // its badly-signed answer (auth failure); both are security wins
    assert!(matches!(
        err,
        Error::AuthenticationFailed { .. } | Error::Timeout { .. }
    ));
}
