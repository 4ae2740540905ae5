//! Initial Context Setup Procedure
//!
//! TS 38.413 Section 8.3.1. The AMF establishes the UE context at the
//! access node: GUAMI, allowed slices, UE security capabilities and the
//! 256-bit security key, optionally with a NAS PDU piggy-backed.

use simamf_common::{Guami, SNssai};

use super::{
    amf_ue_ngap_id, expect_message, mandatory_ie, optional_ie, ran_ue_ngap_id, ProcedureError,
};
use crate::pdu::{
    Criticality, IeValue, NgapMessage, NgapPdu, PduKind, ProcedureCode, ProtocolIeId, UeAmbr,
    UeSecurityCapabilities,
};

/// Parameters for building an Initial Context Setup Request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialContextSetupRequestParams {
    pub amf_ue_ngap_id: u64,
    pub ran_ue_ngap_id: u32,
    pub old_amf: Option<String>,
    pub ue_ambr: Option<UeAmbr>,
    pub guami: Guami,
    pub allowed_nssai: Vec<SNssai>,
    pub ue_security_capabilities: UeSecurityCapabilities,
    pub security_key: [u8; 32],
    pub nas_pdu: Option<Vec<u8>>,
    pub ue_radio_capability: Option<Vec<u8>>,
}

pub fn build_initial_context_setup_request(params: &InitialContextSetupRequestParams) -> NgapPdu {
    let mut msg = NgapMessage::new(ProcedureCode::InitialContextSetup, Criticality::Reject);
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
    if let Some(ambr) = params.ue_ambr {
        msg.push(
            ProtocolIeId::UeAggregateMaximumBitRate,
            Criticality::Reject,
            IeValue::UeAggregateMaximumBitRate(ambr),
        );
    }
    msg.push(ProtocolIeId::Guami, Criticality::Reject, IeValue::Guami(params.guami));
    msg.push(
        ProtocolIeId::AllowedNssai,
        Criticality::Reject,
        IeValue::AllowedNssai(params.allowed_nssai.clone()),
    );
    msg.push(
        ProtocolIeId::UeSecurityCapabilities,
        Criticality::Reject,
        IeValue::UeSecurityCapabilities(params.ue_security_capabilities),
    );
    msg.push(
        ProtocolIeId::SecurityKey,
        Criticality::Reject,
        IeValue::SecurityKey(params.security_key),
    );
    if let Some(capability) = &params.ue_radio_capability {
        msg.push(
            ProtocolIeId::UeRadioCapability,
            Criticality::Ignore,
            IeValue::UeRadioCapability(capability.clone()),
        );
    }
    if let Some(nas) = &params.nas_pdu {
        msg.push(ProtocolIeId::NasPdu, Criticality::Ignore, IeValue::NasPdu(nas.clone()));
    }
    NgapPdu::InitiatingMessage(msg)
}

pub fn parse_initial_context_setup_request(
    pdu: &NgapPdu,
) -> Result<InitialContextSetupRequestParams, ProcedureError> {
    let msg = expect_message(
        pdu,
        PduKind::InitiatingMessage,
        ProcedureCode::InitialContextSetup,
        "InitialContextSetupRequest",
    )?;
    Ok(InitialContextSetupRequestParams {
        amf_ue_ngap_id: amf_ue_ngap_id(msg)?,
        ran_ue_ngap_id: ran_ue_ngap_id(msg)?,
        old_amf: optional_ie!(msg, ProtocolIeId::OldAmf, Name),
        ue_ambr: optional_ie!(
            msg,
            ProtocolIeId::UeAggregateMaximumBitRate,
            UeAggregateMaximumBitRate
        ),
        guami: mandatory_ie!(msg, ProtocolIeId::Guami, Guami),
        allowed_nssai: mandatory_ie!(msg, ProtocolIeId::AllowedNssai, AllowedNssai),
        ue_security_capabilities: mandatory_ie!(
            msg,
            ProtocolIeId::UeSecurityCapabilities,
            UeSecurityCapabilities
        ),
        security_key: mandatory_ie!(msg, ProtocolIeId::SecurityKey, SecurityKey),
        nas_pdu: optional_ie!(msg, ProtocolIeId::NasPdu, NasPdu),
        ue_radio_capability: optional_ie!(msg, ProtocolIeId::UeRadioCapability, UeRadioCapability),
    })
}

/// UE ids echoed by the Initial Context Setup Response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitialContextSetupResponseParams {
    pub amf_ue_ngap_id: u64,
    pub ran_ue_ngap_id: u32,
}

pub fn build_initial_context_setup_response(params: &InitialContextSetupResponseParams) -> NgapPdu {
    let mut msg = NgapMessage::new(ProcedureCode::InitialContextSetup, Criticality::Reject);
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

pub fn parse_initial_context_setup_response(
    pdu: &NgapPdu,
) -> Result<InitialContextSetupResponseParams, ProcedureError> {
    let msg = expect_message(
        pdu,
        PduKind::SuccessfulOutcome,
        ProcedureCode::InitialContextSetup,
        "InitialContextSetupResponse",
    )?;
    Ok(InitialContextSetupResponseParams {
        amf_ue_ngap_id: amf_ue_ngap_id(msg)?,
        ran_ue_ngap_id: ran_ue_ngap_id(msg)?,
    })
}
