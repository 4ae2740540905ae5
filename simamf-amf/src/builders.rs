//! Subscriber-aware message builders
//!
//! Thin layer over the pure builders in `simamf_ngap::procedures` and the
//! typed NAS messages. Correlation ids, keys and slices come from the
//! subscriber and peer; NAS payloads are protected with the subscriber's
//! security context before they are wrapped.

use simamf_common::{log_nas_message, Direction, SNssai, SecurityConfig};
use simamf_nas::{
    AccessType, DeregistrationRequest, DlNasTransport, Guti5g, MmMessage, NasMessage, NgKsi,
    PacketFilter, PacketFilterComponent, PacketFilterDirection, PayloadContainerType,
    PduSessionEstablishmentAccept, QosFlowBinding, QosRule, QosRuleOperation, RegistrationAccept,
    SecurityHeaderType, SecurityModeCommand, SessionAmbr, SmBody, SmMessage, UeSecurityCapability,
};
use simamf_ngap::procedures::initial_context_setup::{
    build_initial_context_setup_request, InitialContextSetupRequestParams,
};
use simamf_ngap::procedures::nas_transport::{
    build_downlink_nas_transport, build_uplink_nas_transport, DownlinkNasTransportParams,
    UplinkNasTransportParams,
};
use simamf_ngap::procedures::ng_setup::{build_ng_setup_response, NgSetupResponseParams};
use simamf_ngap::procedures::pdu_session_resource::{
    build_pdu_session_resource_release_command, build_pdu_session_resource_setup_request,
    PduSessionResourceReleaseCommandParams, PduSessionResourceSetupRequestParams,
    RELEASE_COMMAND_TRANSFER, SETUP_REQUEST_TRANSFER,
};
use simamf_ngap::procedures::ue_context_release::{
    build_ue_context_release_command, UeContextReleaseCommandParams,
};
use simamf_ngap::{
    Cause, NgapPdu, PduSessionResourceItem, PduSessionResourceSetupItem, ProcedureError,
    ProtocolIeId, UeNgapIds, UserLocationInformation,
};
use tracing::error;

use crate::context::{PeerContext, Subscriber};
use crate::error::AmfError;

/// QFI of the default QoS flow.
pub const DEFAULT_QFI: u8 = 1;
/// Precedence of the default QoS rule.
pub const DEFAULT_RULE_PRECEDENCE: u8 = 0xff;
/// SSC mode offered in establishment accept.
pub const DEFAULT_SSC_MODE: u8 = 1;
pub const DEFAULT_DNN: &str = "internet";

// ----------------------------------------------------------------------
// NGAP
// ----------------------------------------------------------------------

pub fn ng_setup_response(peer: &PeerContext) -> NgapPdu {
    build_ng_setup_response(&NgSetupResponseParams {
        amf_name: peer.name().to_string(),
        served_guamis: peer.served_guamis().to_vec(),
        relative_amf_capacity: peer.relative_capacity(),
        plmn_support: peer.plmn_support().to_vec(),
    })
}

/// DownlinkNASTransport carrying `nas_pdu`. Consumes the subscriber's
/// old-AMF reference if one is pending.
pub fn downlink_nas_transport(
    ue: &mut Subscriber,
    nas_pdu: Vec<u8>,
    allowed_nssai: Option<Vec<SNssai>>,
) -> NgapPdu {
    build_downlink_nas_transport(&DownlinkNasTransportParams {
        amf_ue_ngap_id: u64::from(ue.amf_ue_ngap_id()),
        ran_ue_ngap_id: ue.ran_ue_ngap_id(),
        old_amf: ue.take_old_amf(),
        nas_pdu,
        allowed_nssai,
    })
}

/// InitialContextSetupRequest for the subscriber's current context. Like
/// [`downlink_nas_transport`] it consumes the old-AMF reference.
pub fn initial_context_setup_request(
    ue: &mut Subscriber,
    peer: &PeerContext,
    nas_pdu: Option<Vec<u8>>,
) -> Result<NgapPdu, AmfError> {
    let guami = peer
        .served_guamis()
        .first()
        .copied()
        .ok_or_else(|| AmfError::NotFound(format!("served GUAMI on {}", peer.name())))?;
    Ok(build_initial_context_setup_request(&InitialContextSetupRequestParams {
        amf_ue_ngap_id: u64::from(ue.amf_ue_ngap_id()),
        ran_ue_ngap_id: ue.ran_ue_ngap_id(),
        old_amf: ue.take_old_amf(),
        ue_ambr: Some(ue.ue_ambr()),
        guami,
        allowed_nssai: peer.allowed_nssai(),
        ue_security_capabilities: ue.ue_security_capabilities(),
        security_key: *ue.kwagf(),
        nas_pdu,
        ue_radio_capability: None,
    }))
}

/// PDUSessionResourceSetupRequest with one setup item for `session_id`;
/// `nas_pdu` is the protected DL NAS transport holding the accept.
pub fn pdu_session_resource_setup_request(
    ue: &Subscriber,
    session_id: u8,
    nas_pdu: Vec<u8>,
) -> Result<NgapPdu, AmfError> {
    let session = ue
        .session(session_id)
        .ok_or_else(|| AmfError::NotFound(format!("PDU session {session_id}")))?;
    Ok(build_pdu_session_resource_setup_request(&PduSessionResourceSetupRequestParams {
        amf_ue_ngap_id: u64::from(ue.amf_ue_ngap_id()),
        ran_ue_ngap_id: ue.ran_ue_ngap_id(),
        nas_pdu: None,
        sessions: vec![PduSessionResourceSetupItem {
            pdu_session_id: session_id,
            nas_pdu: Some(nas_pdu),
            snssai: session.snssai,
            transfer: SETUP_REQUEST_TRANSFER.to_vec(),
        }],
        ue_ambr: Some(ue.ue_ambr()),
    }))
}

pub fn pdu_session_resource_release_command(
    ue: &Subscriber,
    session_id: u8,
    nas_pdu: Vec<u8>,
) -> NgapPdu {
    build_pdu_session_resource_release_command(&PduSessionResourceReleaseCommandParams {
        amf_ue_ngap_id: u64::from(ue.amf_ue_ngap_id()),
        ran_ue_ngap_id: ue.ran_ue_ngap_id(),
        nas_pdu: Some(nas_pdu),
        sessions: vec![PduSessionResourceItem {
            pdu_session_id: session_id,
            transfer: RELEASE_COMMAND_TRANSFER.to_vec(),
        }],
    })
}

/// W-AGF user location of the subscriber's line. `None` (and an error log)
/// when the line has no global line id.
pub fn user_location_information(ue: &Subscriber) -> Option<UserLocationInformation> {
    let Some(gli) = ue.global_line_id() else {
        error!(
            "Missing global line id for amf_ue_ngap_id={}",
            ue.amf_ue_ngap_id()
        );
        return None;
    };
    Some(UserLocationInformation {
        global_line_id: gli.to_base64().into_bytes(),
        line_type: Some(ue.line().line_type),
    })
}

/// Subscriber-originated UplinkNASTransport. The location IE is mandatory.
pub fn uplink_nas_transport(ue: &Subscriber, nas_pdu: Vec<u8>) -> Result<NgapPdu, AmfError> {
    let user_location = user_location_information(ue).ok_or(AmfError::ProtocolViolation(
        ProcedureError::MissingMandatoryIe(ProtocolIeId::UserLocationInformation),
    ))?;
    Ok(build_uplink_nas_transport(&UplinkNasTransportParams {
        amf_ue_ngap_id: u64::from(ue.amf_ue_ngap_id()),
        ran_ue_ngap_id: ue.ran_ue_ngap_id(),
        nas_pdu,
        user_location,
    }))
}

pub fn ue_context_release_command(ue: &Subscriber, cause: Cause) -> NgapPdu {
    build_ue_context_release_command(&UeContextReleaseCommandParams {
        ue_ngap_ids: UeNgapIds::Pair {
            amf_ue_ngap_id: u64::from(ue.amf_ue_ngap_id()),
            ran_ue_ngap_id: ue.ran_ue_ngap_id(),
        },
        cause,
    })
}

// ----------------------------------------------------------------------
// NAS
// ----------------------------------------------------------------------

/// Protects `msg` under the subscriber's security context and logs it.
pub fn protect(
    ue: &mut Subscriber,
    msg: &NasMessage,
    security_header_type: SecurityHeaderType,
    reset_counters: bool,
) -> Result<Vec<u8>, AmfError> {
    let bytes = ue
        .security_mut()
        .encode(msg, security_header_type, reset_counters)?;
    log_nas_message(Direction::Tx, &msg.name(), &bytes);
    Ok(bytes)
}

/// Security Mode Command for the configured algorithms. No key was derived,
/// so the key set identifier is "no key available".
pub fn security_mode_command(config: &SecurityConfig) -> NasMessage {
    MmMessage::SecurityModeCommand(SecurityModeCommand {
        ciphering: config.ciphering,
        integrity: config.integrity,
        ng_ksi: NgKsi::no_key(),
        replayed_capability: UeSecurityCapability::null_only(),
        imeisv_requested: Some(false),
        additional_security_info: Some(0),
    })
    .into()
}

pub fn registration_accept(ue: &Subscriber, peer: &PeerContext) -> NasMessage {
    let guti = peer.served_guamis().first().map(|guami| Guti5g {
        guami: *guami,
        tmsi: ue.amf_ue_ngap_id(),
    });
    MmMessage::RegistrationAccept(RegistrationAccept {
        result: RegistrationAccept::RESULT_NON_3GPP,
        guti,
        allowed_nssai: peer.allowed_nssai(),
    })
    .into()
}

/// Switch-off deregistration over non-3GPP access.
pub fn deregistration_request(ue: &Subscriber) -> NasMessage {
    MmMessage::DeregistrationRequest(DeregistrationRequest {
        switch_off: true,
        re_registration_required: false,
        access_type: AccessType::NonThreeGpp,
        ng_ksi: ue.security().ng_ksi(),
        mobile_identity: ue.line().mobile_identity(),
    })
    .into()
}

/// One create rule that matches all traffic and binds it to the default flow.
pub fn default_qos_rules() -> Vec<QosRule> {
    vec![QosRule {
        id: 1,
        operation: QosRuleOperation::Create,
        dqr: true,
        filters: vec![PacketFilter::new(PacketFilterDirection::Bidirectional, 1)
            .with_component(PacketFilterComponent::MatchAll)],
        binding: Some(QosFlowBinding {
            precedence: DEFAULT_RULE_PRECEDENCE,
            segregation: false,
            qfi: DEFAULT_QFI,
        }),
    }]
}

/// Establishment accept for a session already recorded on the subscriber.
pub fn pdu_session_establishment_accept(
    ue: &Subscriber,
    session_id: u8,
    pti: u8,
    qos_rules: Vec<QosRule>,
) -> Result<SmMessage, AmfError> {
    let session = ue
        .session(session_id)
        .ok_or_else(|| AmfError::NotFound(format!("PDU session {session_id}")))?;
    let ambr = session.ambr.unwrap_or_else(|| session_ambr(ue));
    Ok(SmMessage {
        pdu_session_id: session_id,
        pti,
        body: SmBody::EstablishmentAccept(PduSessionEstablishmentAccept {
            pdu_session_type: session.session_type,
            ssc_mode: DEFAULT_SSC_MODE,
            qos_rules,
            session_ambr: ambr,
            snssai: Some(session.snssai),
            dnn: Some(DEFAULT_DNN.to_string()),
        }),
    })
}

pub fn pdu_session_release_command(session_id: u8, pti: u8, cause: u8) -> SmMessage {
    SmMessage {
        pdu_session_id: session_id,
        pti,
        body: SmBody::ReleaseCommand { cause },
    }
}

/// Wraps a 5GSM message in a 5GMM DL NAS transport.
pub fn dl_nas_transport(sm: &SmMessage) -> Result<NasMessage, AmfError> {
    Ok(MmMessage::DlNasTransport(DlNasTransport {
        payload_container_type: PayloadContainerType::N1SmInformation,
        payload: NasMessage::Sm(sm.clone()).encode()?,
        pdu_session_id: Some(sm.pdu_session_id),
        mm_cause: None,
    })
    .into())
}

/// Session AMBR derived from the subscriber's UE AMBR, in Mbps.
pub fn session_ambr(ue: &Subscriber) -> SessionAmbr {
    let ambr = ue.ue_ambr();
    let mbps = |bps: u64| u16::try_from(bps / 1_000_000).unwrap_or(u16::MAX);
    SessionAmbr::mbps(mbps(ambr.dl), mbps(ambr.ul))
}

#[cfg(test)]
mod tests {
    use super::*;
    use simamf_common::{AmfIdentityConfig, SimConfig};
    use simamf_nas::{decode_qos_rules, encode_qos_rules};
    use simamf_ngap::procedures::initial_context_setup::parse_initial_context_setup_request;
    use simamf_ngap::procedures::nas_transport::parse_downlink_nas_transport;
    use simamf_ngap::procedures::pdu_session_resource::parse_pdu_session_resource_setup_request;
    use simamf_ngap::{IeValue, PduKind, ProcedureCode};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn peer(name: &str) -> Arc<PeerContext> {
        let (tx, _rx) = mpsc::channel(4);
        let identity = AmfIdentityConfig {
            name: name.to_string(),
            ..AmfIdentityConfig::default()
        };
        Arc::new(PeerContext::new(&identity, tx))
    }

    fn subscriber() -> Subscriber {
        let mut ue = Subscriber::from_config(&SimConfig::default()).unwrap();
        ue.set_amf_ue_ngap_id(1);
        ue.set_ran_ue_ngap_id(77);
        ue
    }

    #[test]
    fn test_ng_setup_response_advertises_peer() {
        let home = peer("TestAMF1");
        let pdu = ng_setup_response(&home);
        assert_eq!(pdu.kind(), PduKind::SuccessfulOutcome);
        assert_eq!(pdu.procedure_code(), ProcedureCode::NgSetup);
        assert_eq!(
            pdu.message().ie(ProtocolIeId::AmfName),
            Some(&IeValue::Name("TestAMF1".to_string()))
        );
    }

    #[test]
    fn test_old_amf_is_sent_once() {
        let first = peer("AMF-A");
        let second = peer("AMF-B");
        let mut ue = subscriber();
        ue.attach(&first);
        ue.attach(&second);

        let pdu = downlink_nas_transport(&mut ue, vec![0x7e, 0x00, 0x43], None);
        let params = parse_downlink_nas_transport(&pdu).unwrap();
        assert_eq!(params.old_amf.as_deref(), Some("AMF-A"));
        assert_eq!(params.amf_ue_ngap_id, 1);
        assert_eq!(params.ran_ue_ngap_id, 77);

        let pdu = initial_context_setup_request(&mut ue, &second, None).unwrap();
        let params = parse_initial_context_setup_request(&pdu).unwrap();
        assert!(params.old_amf.is_none());
        assert!(pdu.message().ie(ProtocolIeId::OldAmf).is_none());
    }

    #[test]
    fn test_initial_context_setup_carries_key_and_slices() {
        let home = peer("TestAMF1");
        let mut ue = subscriber();
        let pdu = initial_context_setup_request(&mut ue, &home, None).unwrap();
        let params = parse_initial_context_setup_request(&pdu).unwrap();
        assert_eq!(params.security_key, [0x01; 32]);
        assert_eq!(params.guami, home.served_guamis()[0]);
        assert_eq!(params.allowed_nssai, home.allowed_nssai());
        assert!(params.nas_pdu.is_none());
        assert!(pdu.message().ie(ProtocolIeId::NasPdu).is_none());
    }

    #[test]
    fn test_setup_request_item() {
        let mut ue = subscriber();
        ue.create_session(1, SNssai::new(1)).unwrap();
        let pdu = pdu_session_resource_setup_request(&ue, 1, vec![0x7e]).unwrap();
        let params = parse_pdu_session_resource_setup_request(&pdu).unwrap();
        assert_eq!(params.sessions.len(), 1);
        assert_eq!(params.sessions[0].pdu_session_id, 1);
        assert_eq!(params.sessions[0].snssai.sst, 0x01);
        assert_eq!(params.sessions[0].transfer, SETUP_REQUEST_TRANSFER.to_vec());

        assert!(matches!(
            pdu_session_resource_setup_request(&ue, 2, vec![]),
            Err(AmfError::NotFound(_))
        ));
    }

    #[test]
    fn test_user_location_from_line() {
        let ue = subscriber();
        let uli = user_location_information(&ue).unwrap();
        assert_eq!(uli.global_line_id, ue.global_line_id().unwrap().to_base64().into_bytes());
        assert_eq!(uli.line_type, Some(simamf_common::config::LineType::Pon));
        let pdu = uplink_nas_transport(&ue, vec![0x7e]).unwrap();
        assert_eq!(pdu.procedure_code(), ProcedureCode::UplinkNasTransport);
    }

    #[test]
    fn test_default_qos_rules_encode() {
        let rules = default_qos_rules();
        let bytes = encode_qos_rules(&rules).unwrap();
        assert_eq!(decode_qos_rules(&bytes).unwrap(), rules);
    }

    #[test]
    fn test_establishment_accept_wraps_in_dl_transport() {
        let mut ue = subscriber();
        ue.create_session(1, SNssai::new(1)).unwrap();
        let sm = pdu_session_establishment_accept(&ue, 1, 3, default_qos_rules()).unwrap();
        match &sm.body {
            SmBody::EstablishmentAccept(accept) => {
                assert_eq!(accept.session_ambr, SessionAmbr::mbps(200, 100));
                assert_eq!(accept.snssai, Some(SNssai::new(1)));
            }
            other => panic!("unexpected body {other:?}"),
        }
        match dl_nas_transport(&sm).unwrap() {
            NasMessage::Mm(MmMessage::DlNasTransport(dl)) => {
                assert_eq!(dl.pdu_session_id, Some(1));
                assert_eq!(NasMessage::decode(&dl.payload).unwrap(), NasMessage::Sm(sm));
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_deregistration_request_is_switch_off() {
        let ue = subscriber();
        match deregistration_request(&ue) {
            NasMessage::Mm(MmMessage::DeregistrationRequest(req)) => {
                assert!(req.switch_off);
                assert_eq!(req.access_type, AccessType::NonThreeGpp);
                assert_eq!(req.mobile_identity, ue.line().mobile_identity());
            }
            other => panic!("unexpected message {other:?}"),
        }
    }
}
