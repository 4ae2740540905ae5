//! NAS Transport Procedures
//!
//! TS 38.413 Sections 8.6.1 - 8.6.3:
//! - Initial UE Message: access node to AMF, first NAS PDU of a UE
//! - Downlink NAS Transport: AMF to access node
//! - Uplink NAS Transport: access node to AMF

use simamf_common::SNssai;

use super::{
    amf_ue_ngap_id, expect_message, mandatory_ie, optional_ie, ran_ue_ngap_id, ProcedureError,
};
use crate::pdu::{
    Criticality, IeValue, NgapMessage, NgapPdu, PduKind, ProcedureCode, ProtocolIeId,
    UserLocationInformation,
};

// ============================================================================
// Initial UE Message
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialUeMessageParams {
    pub ran_ue_ngap_id: u32,
    pub nas_pdu: Vec<u8>,
    pub user_location: Option<UserLocationInformation>,
}

pub fn build_initial_ue_message(params: &InitialUeMessageParams) -> NgapPdu {
    let mut msg = NgapMessage::new(ProcedureCode::InitialUeMessage, Criticality::Ignore);
    msg.push(
        ProtocolIeId::RanUeNgapId,
        Criticality::Reject,
        IeValue::RanUeNgapId(params.ran_ue_ngap_id),
    );
    msg.push(
        ProtocolIeId::NasPdu,
        Criticality::Reject,
        IeValue::NasPdu(params.nas_pdu.clone()),
    );
    if let Some(uli) = &params.user_location {
        msg.push(
            ProtocolIeId::UserLocationInformation,
            Criticality::Reject,
            IeValue::UserLocationInformation(uli.clone()),
        );
    }
    NgapPdu::InitiatingMessage(msg)
}

pub fn parse_initial_ue_message(pdu: &NgapPdu) -> Result<InitialUeMessageParams, ProcedureError> {
    let msg = expect_message(
        pdu,
        PduKind::InitiatingMessage,
        ProcedureCode::InitialUeMessage,
        "InitialUEMessage",
    )?;
    Ok(InitialUeMessageParams {
        ran_ue_ngap_id: ran_ue_ngap_id(msg)?,
        nas_pdu: mandatory_ie!(msg, ProtocolIeId::NasPdu, NasPdu),
        user_location: optional_ie!(
            msg,
            ProtocolIeId::UserLocationInformation,
            UserLocationInformation
        ),
    })
}

// ============================================================================
// Downlink NAS Transport
// ============================================================================

/// Parameters for building a Downlink NAS Transport message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownlinkNasTransportParams {
    pub amf_ue_ngap_id: u64,
    pub ran_ue_ngap_id: u32,
    /// Old AMF name, sent once after an AMF change
    pub old_amf: Option<String>,
    pub nas_pdu: Vec<u8>,
    pub allowed_nssai: Option<Vec<SNssai>>,
}

pub fn build_downlink_nas_transport(params: &DownlinkNasTransportParams) -> NgapPdu {
    let mut msg = NgapMessage::new(ProcedureCode::DownlinkNasTransport, Criticality::Ignore);
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
    if let Some(old_amf) = &params.old_amf {
        msg.push(ProtocolIeId::OldAmf, Criticality::Reject, IeValue::Name(old_amf.clone()));
    }
    msg.push(
        ProtocolIeId::NasPdu,
        Criticality::Reject,
        IeValue::NasPdu(params.nas_pdu.clone()),
    );
    if let Some(allowed) = &params.allowed_nssai {
        msg.push(
            ProtocolIeId::AllowedNssai,
            Criticality::Reject,
            IeValue::AllowedNssai(allowed.clone()),
        );
    }
    NgapPdu::InitiatingMessage(msg)
}

pub fn parse_downlink_nas_transport(
    pdu: &NgapPdu,
) -> Result<DownlinkNasTransportParams, ProcedureError> {
    let msg = expect_message(
        pdu,
        PduKind::InitiatingMessage,
        ProcedureCode::DownlinkNasTransport,
        "DownlinkNASTransport",
    )?;
    Ok(DownlinkNasTransportParams {
        amf_ue_ngap_id: amf_ue_ngap_id(msg)?,
        ran_ue_ngap_id: ran_ue_ngap_id(msg)?,
        old_amf: optional_ie!(msg, ProtocolIeId::OldAmf, Name),
        nas_pdu: mandatory_ie!(msg, ProtocolIeId::NasPdu, NasPdu),
        allowed_nssai: optional_ie!(msg, ProtocolIeId::AllowedNssai, AllowedNssai),
    })
}

// ============================================================================
// Uplink NAS Transport
// ============================================================================

/// Parameters for building an Uplink NAS Transport message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UplinkNasTransportParams {
    pub amf_ue_ngap_id: u64,
    pub ran_ue_ngap_id: u32,
    pub nas_pdu: Vec<u8>,
    pub user_location: UserLocationInformation,
}

pub fn build_uplink_nas_transport(params: &UplinkNasTransportParams) -> NgapPdu {
    let mut msg = NgapMessage::new(ProcedureCode::UplinkNasTransport, Criticality::Ignore);
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
    msg.push(
        ProtocolIeId::NasPdu,
        Criticality::Reject,
        IeValue::NasPdu(params.nas_pdu.clone()),
    );
    msg.push(
        ProtocolIeId::UserLocationInformation,
        Criticality::Ignore,
        IeValue::UserLocationInformation(params.user_location.clone()),
    );
    NgapPdu::InitiatingMessage(msg)
}

pub fn parse_uplink_nas_transport(
    pdu: &NgapPdu,
) -> Result<UplinkNasTransportParams, ProcedureError> {
    let msg = expect_message(
        pdu,
        PduKind::InitiatingMessage,
        ProcedureCode::UplinkNasTransport,
        "UplinkNASTransport",
    )?;
    Ok(UplinkNasTransportParams {
        amf_ue_ngap_id: amf_ue_ngap_id(msg)?,
        ran_ue_ngap_id: ran_ue_ngap_id(msg)?,
        nas_pdu: mandatory_ie!(msg, ProtocolIeId::NasPdu, NasPdu),
        user_location: mandatory_ie!(
            msg,
            ProtocolIeId::UserLocationInformation,
            UserLocationInformation
        ),
    })
}
