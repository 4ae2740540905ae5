//! PDU session establishment scenarios

use integration_tests::{
    init_test_logging, wait_for_condition, ScriptedPeer, TestResult, DEFAULT_POLL_INTERVAL,
    DEFAULT_TEST_TIMEOUT, PTI, RAN_UE_NGAP_ID,
};
use simamf_amf::builders::default_qos_rules;
use simamf_amf::SessionState;
use simamf_common::SimConfig;
use simamf_nas::{
    decode_qos_rules, encode_qos_rules, MmMessage, NasMessage, PduSessionEstablishmentAccept,
    QosRuleError, SmBody, SmMessage,
};
use simamf_ngap::procedures::pdu_session_resource::SETUP_REQUEST_TRANSFER;

async fn registered_peer() -> TestResult<ScriptedPeer> {
    let mut peer = ScriptedPeer::start(SimConfig::default())?;
    peer.register_and_settle().await?;
    Ok(peer)
}

/// Unwraps the establishment accept from a setup item's NAS PDU.
fn establishment_accept(
    peer: &mut ScriptedPeer,
    nas_pdu: &[u8],
) -> TestResult<(SmMessage, PduSessionEstablishmentAccept)> {
    let NasMessage::Mm(MmMessage::DlNasTransport(transport)) = peer.open_nas(nas_pdu)? else {
        return Err("expected DL NAS Transport".into());
    };
    let NasMessage::Sm(sm) = NasMessage::decode(&transport.payload)? else {
        return Err("expected a 5GSM payload".into());
    };
    let SmBody::EstablishmentAccept(accept) = sm.body.clone() else {
        return Err("expected PDU Session Establishment Accept".into());
    };
    Ok((sm, accept))
}

#[tokio::test]
async fn test_session_establishment() {
    init_test_logging();
    let mut peer = registered_peer().await.unwrap();

    peer.request_session(1).await.unwrap();
    let request = peer.expect_setup_request().await.unwrap();
    assert_eq!(request.ran_ue_ngap_id, RAN_UE_NGAP_ID);
    assert_eq!(request.sessions.len(), 1);
    let item = &request.sessions[0];
    assert_eq!(item.pdu_session_id, 1);
    assert_eq!(item.snssai.sst, 0x01);
    assert_eq!(item.transfer, SETUP_REQUEST_TRANSFER.to_vec());

    let (sm, accept) =
        establishment_accept(&mut peer, item.nas_pdu.as_deref().unwrap()).unwrap();
    assert_eq!(sm.pdu_session_id, 1);
    assert_eq!(sm.pti, PTI);
    assert_eq!(accept.qos_rules, default_qos_rules());
    assert_eq!(peer.session_state(1).await, Some(SessionState::Establishing));

    peer.answer_setup(&[1], &[]).await.unwrap();
    let peer = &peer;
    wait_for_condition(
        || async move { peer.session_state(1).await == Some(SessionState::Established) },
        DEFAULT_TEST_TIMEOUT,
        DEFAULT_POLL_INTERVAL,
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn test_session_id_in_use_gets_next_free_id() {
    init_test_logging();
    let mut peer = registered_peer().await.unwrap();

    peer.request_session(1).await.unwrap();
    let first = peer.expect_setup_request().await.unwrap();
    assert_eq!(first.sessions[0].pdu_session_id, 1);

    peer.request_session(1).await.unwrap();
    let second = peer.expect_setup_request().await.unwrap();
    assert_eq!(second.sessions[0].pdu_session_id, 2);

    let subscriber = peer.dispatcher().subscriber(1).unwrap();
    assert_eq!(subscriber.lock().await.sessions().count(), 2);
}

#[tokio::test]
async fn test_failed_setup_marks_session() {
    init_test_logging();
    let mut peer = registered_peer().await.unwrap();

    peer.request_session(3).await.unwrap();
    peer.expect_setup_request().await.unwrap();
    peer.answer_setup(&[], &[3]).await.unwrap();

    let peer = &peer;
    wait_for_condition(
        || async move { peer.session_state(3).await == Some(SessionState::EstablishmentFailed) },
        DEFAULT_TEST_TIMEOUT,
        DEFAULT_POLL_INTERVAL,
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn test_accepted_rules_reject_unknown_component() {
    init_test_logging();
    let mut peer = registered_peer().await.unwrap();

    peer.request_session(1).await.unwrap();
    let request = peer.expect_setup_request().await.unwrap();
    let (_, accept) =
        establishment_accept(&mut peer, request.sessions[0].nas_pdu.as_deref().unwrap()).unwrap();

    let mut bytes = encode_qos_rules(&accept.qos_rules).unwrap();
    assert_eq!(decode_qos_rules(&bytes).unwrap(), accept.qos_rules);

    // rule id, length, flags, filter header, filter length, then the component
    assert_eq!(bytes[6], 0x01);
    bytes[6] = 0xfe;
    assert_eq!(
        decode_qos_rules(&bytes),
        Err(QosRuleError::UnknownComponentType {
            offset: 6,
            component_type: 0xfe
        })
    );
}
