//! UE Context Release Procedures
//!
//! TS 38.413 Sections 8.3.2 (request, access node initiated) and 8.3.3
//! (command / complete, AMF initiated).

use super::{amf_ue_ngap_id, expect_message, mandatory_ie, ran_ue_ngap_id, ProcedureError};
use crate::pdu::{
    Cause, Criticality, IeValue, NgapMessage, NgapPdu, PduKind, ProcedureCode, ProtocolIeId,
    UeNgapIds,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UeContextReleaseRequestParams {
    pub amf_ue_ngap_id: u64,
    pub ran_ue_ngap_id: u32,
    pub cause: Cause,
}

pub fn build_ue_context_release_request(params: &UeContextReleaseRequestParams) -> NgapPdu {
    let mut msg = NgapMessage::new(ProcedureCode::UeContextReleaseRequest, Criticality::Ignore);
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
    msg.push(ProtocolIeId::Cause, Criticality::Ignore, IeValue::Cause(params.cause));
    NgapPdu::InitiatingMessage(msg)
}

pub fn parse_ue_context_release_request(
    pdu: &NgapPdu,
) -> Result<UeContextReleaseRequestParams, ProcedureError> {
    let msg = expect_message(
        pdu,
        PduKind::InitiatingMessage,
        ProcedureCode::UeContextReleaseRequest,
        "UEContextReleaseRequest",
    )?;
    Ok(UeContextReleaseRequestParams {
        amf_ue_ngap_id: amf_ue_ngap_id(msg)?,
        ran_ue_ngap_id: ran_ue_ngap_id(msg)?,
        cause: mandatory_ie!(msg, ProtocolIeId::Cause, Cause),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UeContextReleaseCommandParams {
    pub ue_ngap_ids: UeNgapIds,
    pub cause: Cause,
}

pub fn build_ue_context_release_command(params: &UeContextReleaseCommandParams) -> NgapPdu {
    let mut msg = NgapMessage::new(ProcedureCode::UeContextRelease, Criticality::Reject);
    msg.push(
        ProtocolIeId::UeNgapIds,
        Criticality::Reject,
        IeValue::UeNgapIds(params.ue_ngap_ids),
    );
    msg.push(ProtocolIeId::Cause, Criticality::Ignore, IeValue::Cause(params.cause));
    NgapPdu::InitiatingMessage(msg)
}

pub fn parse_ue_context_release_command(
    pdu: &NgapPdu,
) -> Result<UeContextReleaseCommandParams, ProcedureError> {
    let msg = expect_message(
        pdu,
        PduKind::InitiatingMessage,
        ProcedureCode::UeContextRelease,
        "UEContextReleaseCommand",
    )?;
    Ok(UeContextReleaseCommandParams {
        ue_ngap_ids: mandatory_ie!(msg, ProtocolIeId::UeNgapIds, UeNgapIds),
        cause: mandatory_ie!(msg, ProtocolIeId::Cause, Cause),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UeContextReleaseCompleteParams {
    pub amf_ue_ngap_id: u64,
    pub ran_ue_ngap_id: u32,
}

pub fn build_ue_context_release_complete(params: &UeContextReleaseCompleteParams) -> NgapPdu {
    let mut msg = NgapMessage::new(ProcedureCode::UeContextRelease, Criticality::Reject);
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
    NgapPdu::SuccessfulOutcome(msg)
}

pub fn parse_ue_context_release_complete(
    pdu: &NgapPdu,
) -> Result<UeContextReleaseCompleteParams, ProcedureError> {
    let msg = expect_message(
        pdu,
        PduKind::SuccessfulOutcome,
        ProcedureCode::UeContextRelease,
        "UEContextReleaseComplete",
    )?;
    Ok(UeContextReleaseCompleteParams {
        amf_ue_ngap_id: amf_ue_ngap_id(msg)?,
        ran_ue_ngap_id: ran_ue_ngap_id(msg)?,
    })
}
