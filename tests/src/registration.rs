//! Registration scenarios: NG Setup, security mode and registration accept

use integration_tests::{
    init_test_logging, wait_for_condition, wait_for_state, ScriptedPeer, DEFAULT_POLL_INTERVAL,
    DEFAULT_TEST_TIMEOUT, RAN_UE_NGAP_ID,
};
use simamf_amf::{DispatcherState, Frame, MobilityState};
use simamf_common::SimConfig;
use simamf_nas::{
    peek_security_header_type, MmMessage, NasMessage, RegistrationAccept, SecurityHeaderType,
    SecurityModeComplete,
};
use simamf_ngap::procedures::ng_setup::{build_ng_setup_request, NgSetupRequestParams};
use simamf_ngap::{NgapCodec, PduKind, ProcedureCode, TlvCodec};

#[tokio::test]
async fn test_ng_setup_advertises_configured_identity() {
    init_test_logging();
    let peer = ScriptedPeer::start(SimConfig::default()).unwrap();

    let response = peer.ng_setup().await.unwrap();
    assert_eq!(response.amf_name, "TestAMF1");
    assert_eq!(response.relative_amf_capacity, 200);
    assert_eq!(response.served_guamis, peer.config().amf.served_guamis);
    assert_eq!(response.plmn_support[0].slices.len(), 2);

    wait_for_state(peer.dispatcher(), DispatcherState::WaitingInitialUe, DEFAULT_TEST_TIMEOUT)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_registration_end_to_end() {
    init_test_logging();
    let mut peer = ScriptedPeer::start(SimConfig::default()).unwrap();
    peer.ng_setup().await.unwrap();

    let (smc_params, smc) = peer.start_registration().await.unwrap();
    assert_eq!(smc_params.amf_ue_ngap_id, 1);
    assert_eq!(smc_params.ran_ue_ngap_id, RAN_UE_NGAP_ID);
    assert_eq!(
        peek_security_header_type(&smc_params.nas_pdu).unwrap(),
        SecurityHeaderType::IntegrityProtectedWithNew5gNasSecurityContext
    );
    let NasMessage::Mm(MmMessage::SecurityModeCommand(command)) = smc else {
        panic!("expected Security Mode Command, got {}", smc.name());
    };
    assert_eq!(command.ciphering, 0);
    assert_eq!(command.integrity, 0);
    assert_eq!(command.imeisv_requested, Some(false));
    wait_for_state(
        peer.dispatcher(),
        DispatcherState::WaitingSecurityComplete,
        DEFAULT_TEST_TIMEOUT,
    )
    .await
    .unwrap();

    let ics = peer.complete_security_mode().await.unwrap();
    assert_eq!(ics.guami, peer.config().amf.served_guamis[0]);
    assert_eq!(ics.allowed_nssai.len(), 2);
    assert_eq!(ics.security_key, [0x01; 32]);
    assert!(ics.old_amf.is_none());

    let accept = peer.complete_context_setup().await.unwrap();
    let NasMessage::Mm(MmMessage::RegistrationAccept(accept)) = accept else {
        panic!("expected Registration Accept, got {}", accept.name());
    };
    assert_eq!(accept.result, RegistrationAccept::RESULT_NON_3GPP);
    assert_eq!(accept.guti.unwrap().tmsi, 1);
    assert_eq!(accept.allowed_nssai.len(), 2);

    peer.send_uplink_nas(
        &MmMessage::RegistrationComplete.into(),
        SecurityHeaderType::IntegrityProtectedAndCiphered,
    )
    .await
    .unwrap();

    let subscriber = peer.dispatcher().subscriber(1).unwrap();
    wait_for_condition(
        || {
            let subscriber = subscriber.clone();
            async move { subscriber.lock().await.mobility_state() == MobilityState::Registered }
        },
        DEFAULT_TEST_TIMEOUT,
        DEFAULT_POLL_INTERVAL,
    )
    .await
    .unwrap();
    assert_eq!(
        peer.dispatcher().state(),
        DispatcherState::WaitingSessionOrServiceEvents
    );
}

#[tokio::test]
async fn test_registration_with_nia2_nea2() {
    init_test_logging();
    let mut config = SimConfig::default();
    config.security.integrity = 2;
    config.security.ciphering = 2;
    config.security.knas_int = "2bd6459f82c5b300952c49104881ff48".to_string();
    config.security.knas_enc = "ad7a2bd6459f82c5b300952c49104881".to_string();

    let mut peer = ScriptedPeer::start(config).unwrap();
    // every NAS read below fails on a MAC mismatch
    peer.register().await.unwrap();

    let subscriber = peer.dispatcher().subscriber(1).unwrap();
    wait_for_condition(
        || {
            let subscriber = subscriber.clone();
            async move {
                let ue = subscriber.lock().await;
                ue.mobility_state() == MobilityState::Registered && !ue.security().mac_failed()
            }
        },
        DEFAULT_TEST_TIMEOUT,
        DEFAULT_POLL_INTERVAL,
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn test_corrupted_mac_does_not_stop_the_procedure() {
    init_test_logging();
    let mut config = SimConfig::default();
    config.security.integrity = 2;
    config.security.knas_int = "2bd6459f82c5b300952c49104881ff48".to_string();

    let mut peer = ScriptedPeer::start(config).unwrap();
    peer.ng_setup().await.unwrap();
    peer.start_registration().await.unwrap();

    let complete: NasMessage =
        MmMessage::SecurityModeComplete(SecurityModeComplete::default()).into();
    let mut nas = peer
        .protect(&complete, SecurityHeaderType::IntegrityProtectedAndCiphered)
        .unwrap();
    nas[2] ^= 0xff;
    peer.send_uplink_nas_bytes(nas).await.unwrap();

    // the MAC failure is flagged, yet the context setup still goes out
    peer.expect(ProcedureCode::InitialContextSetup, PduKind::InitiatingMessage)
        .await
        .unwrap();
    let subscriber = peer.dispatcher().subscriber(1).unwrap();
    assert!(subscriber.lock().await.security().mac_failed());
}

#[tokio::test]
async fn test_foreign_ppid_is_still_processed() {
    init_test_logging();
    let peer = ScriptedPeer::start(SimConfig::default()).unwrap();

    let request = build_ng_setup_request(&NgSetupRequestParams {
        global_ran_node_id: vec![0x02, 0xf8, 0x39, 0x00, 0x01],
        ran_node_name: None,
    });
    let mut frame = Frame::ngap(TlvCodec.encode(&request).unwrap());
    frame.ppid = 0;
    peer.send_raw(frame).await.unwrap();

    peer.expect(ProcedureCode::NgSetup, PduKind::SuccessfulOutcome)
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_registration_before_ng_setup_is_ignored() {
    init_test_logging();
    let mut peer = ScriptedPeer::start(SimConfig::default()).unwrap();

    assert!(peer.start_registration().await.is_err());
    assert!(peer.dispatcher().peer().is_none());
    assert_eq!(peer.dispatcher().state(), DispatcherState::WaitingNgSetup);
}
