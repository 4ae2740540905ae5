//! NG Setup Procedure
//!
//! TS 38.413 Section 8.7.1. The access node opens the NG-C association with
//! an NG Setup Request; the AMF answers with its name, served GUAMIs,
//! relative capacity and PLMN support list.

use simamf_common::{Guami, PlmnSupport};

use super::{expect_message, mandatory_ie, optional_ie, ProcedureError};
use crate::pdu::{Criticality, IeValue, NgapMessage, NgapPdu, PduKind, ProcedureCode, ProtocolIeId};

/// Parameters for building an NG Setup Request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NgSetupRequestParams {
    /// Global RAN node id, opaque to the engine
    pub global_ran_node_id: Vec<u8>,
    pub ran_node_name: Option<String>,
}

/// Parameters for building an NG Setup Response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NgSetupResponseParams {
    pub amf_name: String,
    pub served_guamis: Vec<Guami>,
    pub relative_amf_capacity: u8,
    pub plmn_support: Vec<PlmnSupport>,
}

pub fn build_ng_setup_request(params: &NgSetupRequestParams) -> NgapPdu {
    let mut msg = NgapMessage::new(ProcedureCode::NgSetup, Criticality::Reject);
    msg.push(
        ProtocolIeId::GlobalRanNodeId,
        Criticality::Reject,
        IeValue::Raw(params.global_ran_node_id.clone()),
    );
    if let Some(name) = &params.ran_node_name {
        msg.push(ProtocolIeId::RanNodeName, Criticality::Ignore, IeValue::Name(name.clone()));
    }
    NgapPdu::InitiatingMessage(msg)
}

pub fn parse_ng_setup_request(pdu: &NgapPdu) -> Result<NgSetupRequestParams, ProcedureError> {
    let msg = expect_message(
        pdu,
        PduKind::InitiatingMessage,
        ProcedureCode::NgSetup,
        "NGSetupRequest",
    )?;
    Ok(NgSetupRequestParams {
        global_ran_node_id: mandatory_ie!(msg, ProtocolIeId::GlobalRanNodeId, Raw),
        ran_node_name: optional_ie!(msg, ProtocolIeId::RanNodeName, Name),
    })
}

pub fn build_ng_setup_response(params: &NgSetupResponseParams) -> NgapPdu {
    let mut msg = NgapMessage::new(ProcedureCode::NgSetup, Criticality::Reject);
    msg.push(
        ProtocolIeId::AmfName,
        Criticality::Reject,
        IeValue::Name(params.amf_name.clone()),
    );
    msg.push(
        ProtocolIeId::ServedGuamiList,
        Criticality::Reject,
        IeValue::ServedGuamiList(params.served_guamis.clone()),
    );
    msg.push(
        ProtocolIeId::RelativeAmfCapacity,
        Criticality::Ignore,
        IeValue::RelativeAmfCapacity(params.relative_amf_capacity),
    );
    msg.push(
        ProtocolIeId::PlmnSupportList,
        Criticality::Reject,
        IeValue::PlmnSupportList(params.plmn_support.clone()),
    );
    NgapPdu::SuccessfulOutcome(msg)
}

pub fn parse_ng_setup_response(pdu: &NgapPdu) -> Result<NgSetupResponseParams, ProcedureError> {
    let msg = expect_message(
        pdu,
        PduKind::SuccessfulOutcome,
        ProcedureCode::NgSetup,
        "NGSetupResponse",
    )?;
    Ok(NgSetupResponseParams {
        amf_name: mandatory_ie!(msg, ProtocolIeId::AmfName, Name),
        served_guamis: mandatory_ie!(msg, ProtocolIeId::ServedGuamiList, ServedGuamiList),
        relative_amf_capacity: mandatory_ie!(
            msg,
            ProtocolIeId::RelativeAmfCapacity,
            RelativeAmfCapacity
        ),
        plmn_support: mandatory_ie!(msg, ProtocolIeId::PlmnSupportList, PlmnSupportList),
    })
}
