//! PDU Session Resource Setup / Release Procedures
//!
//! TS 38.413 Sections 8.2.1 and 8.2.2.

use super::{
    amf_ue_ngap_id, expect_message, mandatory_ie, optional_ie, ran_ue_ngap_id, ProcedureError,
};
use crate::pdu::{
    Criticality, IeValue, NgapMessage, NgapPdu, PduKind, PduSessionResourceItem,
    PduSessionResourceSetupItem, ProcedureCode, ProtocolIeId, UeAmbr,
};

/// Pre-encoded PDUSessionResourceSetupRequestTransfer sent for every session:
/// session AMBR, UL NG-U tunnel 1.2.3.4 TEID 0x0b16212c, PDU session type
/// and a single QoS flow with QFI 1.
pub const SETUP_REQUEST_TRANSFER: [u8; 43] = [
    0x00, 0x00, 0x04, 0x00, 0x82, 0x00, 0x06, 0x04, 0x03, 0xe8, 0x10, 0x03, 0xe8, 0x00, 0x8b, 0x00,
    0x0a, 0x01, 0xf0, 0x01, 0x02, 0x03, 0x04, 0x0b, 0x16, 0x21, 0x2c, 0x00, 0x86, 0x00, 0x01, 0x00,
    0x00, 0x88, 0x00, 0x07, 0x00, 0x01, 0x00, 0x00, 0x07, 0x24, 0x00,
];

/// Pre-encoded PDUSessionResourceReleaseCommandTransfer (cause: NAS normal release).
pub const RELEASE_COMMAND_TRANSFER: [u8; 1] = [0x10];

// ============================================================================
// PDU Session Resource Setup
// ============================================================================

/// Parameters for building a PDU Session Resource Setup Request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PduSessionResourceSetupRequestParams {
    pub amf_ue_ngap_id: u64,
    pub ran_ue_ngap_id: u32,
    /// NAS PDU for the UE, normally a PDU Session Establishment Accept
    pub nas_pdu: Option<Vec<u8>>,
    pub sessions: Vec<PduSessionResourceSetupItem>,
    pub ue_ambr: Option<UeAmbr>,
}

pub fn build_pdu_session_resource_setup_request(
    params: &PduSessionResourceSetupRequestParams,
) -> NgapPdu {
    let mut msg = NgapMessage::new(ProcedureCode::PduSessionResourceSetup, Criticality::Reject);
    msg.push(
        ProtocolIeId::AmfUeNgapId,
        Criticality::Reject,
        IeValue::AmfUeNgapId(params.amf_ue_ngap_id),
    );
    msg.push(
        ProtocolIeId::RanUeNgapId,
        Criticality::Reject,
        IeValue::RanUeNgapId(params.ran_ue_ngap_id),
    );
    if let Some(nas) = &params.nas_pdu {
        msg.push(ProtocolIeId::NasPdu, Criticality::Reject, IeValue::NasPdu(nas.clone()));
    }
    msg.push(
        ProtocolIeId::PduSessionResourceSetupListSuReq,
        Criticality::Reject,
        IeValue::PduSessionResourceSetupListSuReq(params.sessions.clone()),
    );
    if let Some(ambr) = params.ue_ambr {
        msg.push(
            ProtocolIeId::UeAggregateMaximumBitRate,
            Criticality::Ignore,
            IeValue::UeAggregateMaximumBitRate(ambr),
        );
    }
    NgapPdu::InitiatingMessage(msg)
}

pub fn parse_pdu_session_resource_setup_request(
    pdu: &NgapPdu,
) -> Result<PduSessionResourceSetupRequestParams, ProcedureError> {
    let msg = expect_message(
        pdu,
        PduKind::InitiatingMessage,
        ProcedureCode::PduSessionResourceSetup,
        "PDUSessionResourceSetupRequest",
    )?;
    Ok(PduSessionResourceSetupRequestParams {
        amf_ue_ngap_id: amf_ue_ngap_id(msg)?,
        ran_ue_ngap_id: ran_ue_ngap_id(msg)?,
        nas_pdu: optional_ie!(msg, ProtocolIeId::NasPdu, NasPdu),
        sessions: mandatory_ie!(
            msg,
            ProtocolIeId::PduSessionResourceSetupListSuReq,
            PduSessionResourceSetupListSuReq
        ),
        ue_ambr: optional_ie!(
            msg,
            ProtocolIeId::UeAggregateMaximumBitRate,
            UeAggregateMaximumBitRate
        ),
    })
}

/// Parameters of a PDU Session Resource Setup Response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PduSessionResourceSetupResponseParams {
    pub amf_ue_ngap_id: u64,
    pub ran_ue_ngap_id: u32,
    pub setup: Vec<PduSessionResourceItem>,
    pub failed: Vec<PduSessionResourceItem>,
}

pub fn build_pdu_session_resource_setup_response(
    params: &PduSessionResourceSetupResponseParams,
) -> NgapPdu {
    let mut msg = NgapMessage::new(ProcedureCode::PduSessionResourceSetup, Criticality::Reject);
    msg.push(
        ProtocolIeId::AmfUeNgapId,
        Criticality::Ignore,
        IeValue::AmfUeNgapId(params.amf_ue_ngap_id),
    );
    msg.push(
        ProtocolIeId::RanUeNgapId,
        Criticality::Ignore,
        IeValue::RanUeNgapId(params.ran_ue_ngap_id),
    );
    if !params.setup.is_empty() {
        msg.push(
            ProtocolIeId::PduSessionResourceSetupListSuRes,
            Criticality::Ignore,
            IeValue::PduSessionResourceList(params.setup.clone()),
        );
    }
    if !params.failed.is_empty() {
        msg.push(
            ProtocolIeId::PduSessionResourceFailedToSetupListSuRes,
            Criticality::Ignore,
            IeValue::PduSessionResourceList(params.failed.clone()),
        );
    }
    NgapPdu::SuccessfulOutcome(msg)
}

pub fn parse_pdu_session_resource_setup_response(
    pdu: &NgapPdu,
) -> Result<PduSessionResourceSetupResponseParams, ProcedureError> {
    let msg = expect_message(
        pdu,
        PduKind::SuccessfulOutcome,
        ProcedureCode::PduSessionResourceSetup,
        "PDUSessionResourceSetupResponse",
    )?;
    Ok(PduSessionResourceSetupResponseParams {
        amf_ue_ngap_id: amf_ue_ngap_id(msg)?,
        ran_ue_ngap_id: ran_ue_ngap_id(msg)?,
        setup: optional_ie!(
            msg,
            ProtocolIeId::PduSessionResourceSetupListSuRes,
            PduSessionResourceList
        )
        .unwrap_or_default(),
        failed: optional_ie!(
            msg,
            ProtocolIeId::PduSessionResourceFailedToSetupListSuRes,
            PduSessionResourceList
        )
        .unwrap_or_default(),
    })
}

// ============================================================================
// PDU Session Resource Release
// ============================================================================

/// Parameters for building a PDU Session Resource Release Command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PduSessionResourceReleaseCommandParams {
    pub amf_ue_ngap_id: u64,
    pub ran_ue_ngap_id: u32,
    /// NAS PDU for the UE, normally a PDU Session Release Command
    pub nas_pdu: Option<Vec<u8>>,
    pub sessions: Vec<PduSessionResourceItem>,
}

pub fn build_pdu_session_resource_release_command(
    params: &PduSessionResourceReleaseCommandParams,
) -> NgapPdu {
    let mut msg = NgapMessage::new(ProcedureCode::PduSessionResourceRelease, Criticality::Reject);
    msg.push(
        ProtocolIeId::AmfUeNgapId,
        Criticality::Reject,
        IeValue::AmfUeNgapId(params.amf_ue_ngap_id),
    );
    msg.push(
        ProtocolIeId::RanUeNgapId,
        Criticality::Reject,
        IeValue::RanUeNgapId(params.ran_ue_ngap_id),
    );
    if let Some(nas) = &params.nas_pdu {
        msg.push(ProtocolIeId::NasPdu, Criticality::Ignore, IeValue::NasPdu(nas.clone()));
    }
    msg.push(
        ProtocolIeId::PduSessionResourceToReleaseListRelCmd,
        Criticality::Reject,
        IeValue::PduSessionResourceList(params.sessions.clone()),
    );
    NgapPdu::InitiatingMessage(msg)
}

pub fn parse_pdu_session_resource_release_command(
    pdu: &NgapPdu,
) -> Result<PduSessionResourceReleaseCommandParams, ProcedureError> {
    let msg = expect_message(
        pdu,
        PduKind::InitiatingMessage,
        ProcedureCode::PduSessionResourceRelease,
        "PDUSessionResourceReleaseCommand",
    )?;
    Ok(PduSessionResourceReleaseCommandParams {
        amf_ue_ngap_id: amf_ue_ngap_id(msg)?,
        ran_ue_ngap_id: ran_ue_ngap_id(msg)?,
        nas_pdu: optional_ie!(msg, ProtocolIeId::NasPdu, NasPdu),
        sessions: mandatory_ie!(
            msg,
            ProtocolIeId::PduSessionResourceToReleaseListRelCmd,
            PduSessionResourceList
        ),
    })
}

/// Parameters of a PDU Session Resource Release Response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PduSessionResourceReleaseResponseParams {
    pub amf_ue_ngap_id: u64,
    pub ran_ue_ngap_id: u32,
    pub released: Vec<PduSessionResourceItem>,
}

pub fn build_pdu_session_resource_release_response(
    params: &PduSessionResourceReleaseResponseParams,
) -> NgapPdu {
    let mut msg = NgapMessage::new(ProcedureCode::PduSessionResourceRelease, Criticality::Reject);
    msg.push(
        ProtocolIeId::AmfUeNgapId,
        Criticality::Ignore,
        IeValue::AmfUeNgapId(params.amf_ue_ngap_id),
    );
    msg.push(
        ProtocolIeId::RanUeNgapId,
        Criticality::Ignore,
        IeValue::RanUeNgapId(params.ran_ue_ngap_id),
    );
    msg.push(
        ProtocolIeId::PduSessionResourceReleasedListRelRes,
        Criticality::Ignore,
        IeValue::PduSessionResourceList(params.released.clone()),
    );
    NgapPdu::SuccessfulOutcome(msg)
}

pub fn parse_pdu_session_resource_release_response(
    pdu: &NgapPdu,
) -> Result<PduSessionResourceReleaseResponseParams, ProcedureError> {
    let msg = expect_message(
        pdu,
        PduKind::SuccessfulOutcome,
        ProcedureCode::PduSessionResourceRelease,
        "PDUSessionResourceReleaseResponse",
    )?;
    Ok(PduSessionResourceReleaseResponseParams {
        amf_ue_ngap_id: amf_ue_ngap_id(msg)?,
        ran_ue_ngap_id: ran_ue_ngap_id(msg)?,
        released: mandatory_ie!(
            msg,
            ProtocolIeId::PduSessionResourceReleasedListRelRes,
            PduSessionResourceList
        ),
    })
}
