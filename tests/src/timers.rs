//! NAS timer retransmission and abandonment, on a paused clock

use std::time::Duration;

use integration_tests::{
    init_test_logging, wait_for_condition, ScriptedPeer, DEFAULT_POLL_INTERVAL,
};
use simamf_amf::SessionState;
use simamf_common::SimConfig;
use simamf_ngap::procedures::nas_transport::parse_downlink_nas_transport;
use simamf_ngap::procedures::pdu_session_resource::parse_pdu_session_resource_setup_request;
use simamf_ngap::{PduKind, ProcedureCode};

/// Longer than any timer the scenarios arm.
const LONG_WAIT: Duration = Duration::from_secs(120);

#[tokio::test(start_paused = true)]
async fn test_security_mode_command_is_retransmitted() {
    init_test_logging();
    let mut config = SimConfig::default();
    config.retries.registration_attempt = 2;

    let mut peer = ScriptedPeer::start(config).unwrap();
    peer.ng_setup().await.unwrap();
    let (first, _) = peer.start_registration().await.unwrap();

    // no Security Mode Complete: T3510 resends the identical PDU
    for _ in 0..2 {
        let pdu = peer.recv_within(LONG_WAIT).await.unwrap();
        assert_eq!(pdu.procedure_code(), ProcedureCode::DownlinkNasTransport);
        let resent = parse_downlink_nas_transport(&pdu).unwrap();
        assert_eq!(resent.nas_pdu, first.nas_pdu);
    }

    // the third expiry exceeds the ceiling and drops the subscriber
    let dispatcher = peer.dispatcher();
    wait_for_condition(
        || async move { dispatcher.subscriber(1).is_none() },
        LONG_WAIT,
        DEFAULT_POLL_INTERVAL,
    )
    .await
    .unwrap();
    assert!(peer.is_quiet(LONG_WAIT).await);
}

#[tokio::test(start_paused = true)]
async fn test_security_mode_complete_stops_retransmission() {
    init_test_logging();
    let mut peer = ScriptedPeer::start(SimConfig::default()).unwrap();
    peer.ng_setup().await.unwrap();
    peer.start_registration().await.unwrap();
    peer.complete_security_mode().await.unwrap();

    // T3510 was stopped; only the next procedure step may produce traffic
    assert!(peer.is_quiet(LONG_WAIT).await);
    assert!(peer.dispatcher().subscriber(1).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_session_setup_fails_after_t3580() {
    init_test_logging();
    let mut config = SimConfig::default();
    config.retries.t3580 = 1;

    let mut peer = ScriptedPeer::start(config).unwrap();
    peer.register_and_settle().await.unwrap();
    peer.request_session(1).await.unwrap();
    let first = peer.expect_setup_request().await.unwrap();

    let pdu = peer.recv_within(LONG_WAIT).await.unwrap();
    assert_eq!(pdu.procedure_code(), ProcedureCode::PduSessionResourceSetup);
    assert_eq!(pdu.kind(), PduKind::InitiatingMessage);
    assert_eq!(parse_pdu_session_resource_setup_request(&pdu).unwrap(), first);

    let peer = &peer;
    wait_for_condition(
        || async move { peer.session_state(1).await == Some(SessionState::EstablishmentFailed) },
        LONG_WAIT,
        DEFAULT_POLL_INTERVAL,
    )
    .await
    .unwrap();
}
