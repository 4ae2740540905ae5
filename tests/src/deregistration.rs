//! Session release, deregistration and UE context release scenarios

use integration_tests::{
    init_test_logging, wait_for_state, ScriptedPeer, DEFAULT_TEST_TIMEOUT, RAN_UE_NGAP_ID,
};
use simamf_amf::{DispatcherState, MobilityState, SessionState};
use simamf_common::SimConfig;
use simamf_nas::{
    sm_cause, AccessType, DeregistrationRequest, MmMessage, MobileIdentity, NasMessage, NgKsi,
    SecurityHeaderType, SmBody,
};
use simamf_ngap::procedures::pdu_session_resource::{
    build_pdu_session_resource_release_response, parse_pdu_session_resource_release_command,
    PduSessionResourceReleaseResponseParams, RELEASE_COMMAND_TRANSFER,
};
use simamf_ngap::procedures::ue_context_release::{
    build_ue_context_release_complete, build_ue_context_release_request,
    parse_ue_context_release_command, UeContextReleaseCompleteParams,
    UeContextReleaseRequestParams,
};
use simamf_ngap::{Cause, PduKind, PduSessionResourceItem, ProcedureCode, UeNgapIds};

#[tokio::test]
async fn test_release_then_deregistration_terminates() {
    init_test_logging();
    let mut peer = ScriptedPeer::start(SimConfig::default()).unwrap();
    peer.register_and_settle().await.unwrap();
    peer.establish_session(1).await.unwrap();

    peer.send_sm(1, SmBody::ReleaseRequest { cause: None })
        .await
        .unwrap();
    let pdu = peer
        .expect(ProcedureCode::PduSessionResourceRelease, PduKind::InitiatingMessage)
        .await
        .unwrap();
    let command = parse_pdu_session_resource_release_command(&pdu).unwrap();
    assert_eq!(command.sessions.len(), 1);
    assert_eq!(command.sessions[0].pdu_session_id, 1);
    assert_eq!(command.sessions[0].transfer, RELEASE_COMMAND_TRANSFER.to_vec());

    let NasMessage::Mm(MmMessage::DlNasTransport(transport)) =
        peer.open_nas(&command.nas_pdu.unwrap()).unwrap()
    else {
        panic!("expected DL NAS Transport");
    };
    let NasMessage::Sm(sm) = NasMessage::decode(&transport.payload).unwrap() else {
        panic!("expected a 5GSM payload");
    };
    assert_eq!(
        sm.body,
        SmBody::ReleaseCommand {
            cause: sm_cause::REGULAR_DEACTIVATION
        }
    );
    assert_eq!(peer.session_state(1).await, Some(SessionState::Releasing));

    let response =
        build_pdu_session_resource_release_response(&PduSessionResourceReleaseResponseParams {
            amf_ue_ngap_id: peer.amf_id().unwrap(),
            ran_ue_ngap_id: RAN_UE_NGAP_ID,
            released: vec![PduSessionResourceItem {
                pdu_session_id: 1,
                transfer: Vec::new(),
            }],
        });
    peer.send(&response).await.unwrap();
    peer.send_sm(1, SmBody::ReleaseComplete { cause: None })
        .await
        .unwrap();

    // Release Complete frees the slot and starts switch-off deregistration
    let (uplink, msg) = peer.recv_uplink_nas().await.unwrap();
    assert_eq!(uplink.user_location, peer.user_location());
    let NasMessage::Mm(MmMessage::DeregistrationRequest(request)) = msg else {
        panic!("expected Deregistration Request, got {}", msg.name());
    };
    assert!(request.switch_off);
    assert_eq!(request.access_type, AccessType::NonThreeGpp);
    wait_for_state(
        peer.dispatcher(),
        DispatcherState::WaitingDeregistration,
        DEFAULT_TEST_TIMEOUT,
    )
    .await
    .unwrap();
    {
        let subscriber = peer.dispatcher().subscriber(1).unwrap();
        let ue = subscriber.lock().await;
        assert!(ue.session(1).is_none());
        assert_eq!(ue.mobility_state(), MobilityState::Deregistering);
        assert!(ue.deregistration_in_flight());
    }

    peer.send_downlink_nas(
        &MmMessage::DeregistrationAccept.into(),
        SecurityHeaderType::IntegrityProtectedAndCiphered,
    )
    .await
    .unwrap();
    wait_for_state(peer.dispatcher(), DispatcherState::Terminated, DEFAULT_TEST_TIMEOUT)
        .await
        .unwrap();
    assert!(peer.dispatcher().subscriber(1).is_none());
}

#[tokio::test]
async fn test_device_deregistration_is_accepted() {
    init_test_logging();
    let mut peer = ScriptedPeer::start(SimConfig::default()).unwrap();
    peer.register_and_settle().await.unwrap();

    let request = MmMessage::DeregistrationRequest(DeregistrationRequest {
        switch_off: false,
        re_registration_required: false,
        access_type: AccessType::NonThreeGpp,
        ng_ksi: NgKsi::no_key(),
        mobile_identity: MobileIdentity::NoIdentity,
    });
    peer.send_uplink_nas(&request.into(), SecurityHeaderType::IntegrityProtectedAndCiphered)
        .await
        .unwrap();

    let (_, msg) = peer.recv_downlink_nas().await.unwrap();
    assert_eq!(msg, NasMessage::Mm(MmMessage::DeregistrationAccept));
    wait_for_state(peer.dispatcher(), DispatcherState::Terminated, DEFAULT_TEST_TIMEOUT)
        .await
        .unwrap();
    assert!(peer.dispatcher().subscriber(1).is_none());
}

#[tokio::test]
async fn test_ue_context_release() {
    init_test_logging();
    let mut peer = ScriptedPeer::start(SimConfig::default()).unwrap();
    peer.register_and_settle().await.unwrap();
    let amf_ue_ngap_id = peer.amf_id().unwrap();

    let request = build_ue_context_release_request(&UeContextReleaseRequestParams {
        amf_ue_ngap_id,
        ran_ue_ngap_id: RAN_UE_NGAP_ID,
        cause: Cause::RADIO_NETWORK_UNSPECIFIED,
    });
    peer.send(&request).await.unwrap();

    let pdu = peer
        .expect(ProcedureCode::UeContextRelease, PduKind::InitiatingMessage)
        .await
        .unwrap();
    let command = parse_ue_context_release_command(&pdu).unwrap();
    assert_eq!(
        command.ue_ngap_ids,
        UeNgapIds::Pair {
            amf_ue_ngap_id,
            ran_ue_ngap_id: RAN_UE_NGAP_ID
        }
    );
    assert_eq!(command.cause, Cause::RADIO_NETWORK_UNSPECIFIED);

    let complete = build_ue_context_release_complete(&UeContextReleaseCompleteParams {
        amf_ue_ngap_id,
        ran_ue_ngap_id: RAN_UE_NGAP_ID,
    });
    let subscriber = peer.dispatcher().subscriber(1).unwrap();
    peer.send(&complete).await.unwrap();

    wait_for_state(peer.dispatcher(), DispatcherState::Terminated, DEFAULT_TEST_TIMEOUT)
        .await
        .unwrap();
    assert!(peer.dispatcher().subscriber(1).is_none());
    let ue = subscriber.lock().await;
    assert_eq!(ue.mobility_state(), MobilityState::Deregistered);
    assert!(ue.timers().running().is_empty());
}
