//! Overload Start / Overload Stop Procedures
//!
//! TS 38.413 Sections 8.7.6 and 8.7.7. Both are AMF initiated and have no
//! response.

use super::{expect_message, optional_ie, ProcedureError};
use crate::pdu::{
    Criticality, IeValue, NgapMessage, NgapPdu, OverloadAction, PduKind, ProcedureCode,
    ProtocolIeId, SliceOverloadItem,
};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OverloadStartParams {
    pub action: Option<OverloadAction>,
    /// Percentage of signalling traffic to reject, 1..=99
    pub traffic_load_reduction: Option<u8>,
    pub slices: Vec<SliceOverloadItem>,
}

pub fn build_overload_start(params: &OverloadStartParams) -> NgapPdu {
    let mut msg = NgapMessage::new(ProcedureCode::OverloadStart, Criticality::Ignore);
    if let Some(action) = params.action {
        msg.push(
            ProtocolIeId::AmfOverloadResponse,
            Criticality::Reject,
            IeValue::OverloadResponse(action),
        );
    }
    if let Some(reduction) = params.traffic_load_reduction {
        msg.push(
            ProtocolIeId::AmfTrafficLoadReductionIndication,
            Criticality::Ignore,
            IeValue::TrafficLoadReductionIndication(reduction),
        );
    }
    if !params.slices.is_empty() {
        msg.push(
            ProtocolIeId::OverloadStartNssaiList,
            Criticality::Ignore,
            IeValue::OverloadStartNssaiList(params.slices.clone()),
        );
    }
    NgapPdu::InitiatingMessage(msg)
}

pub fn parse_overload_start(pdu: &NgapPdu) -> Result<OverloadStartParams, ProcedureError> {
    let msg = expect_message(
        pdu,
        PduKind::InitiatingMessage,
        ProcedureCode::OverloadStart,
        "OverloadStart",
    )?;
    Ok(OverloadStartParams {
        action: optional_ie!(msg, ProtocolIeId::AmfOverloadResponse, OverloadResponse),
        traffic_load_reduction: optional_ie!(
            msg,
            ProtocolIeId::AmfTrafficLoadReductionIndication,
            TrafficLoadReductionIndication
        ),
        slices: optional_ie!(msg, ProtocolIeId::OverloadStartNssaiList, OverloadStartNssaiList)
            .unwrap_or_default(),
    })
}

pub fn build_overload_stop() -> NgapPdu {
    NgapPdu::InitiatingMessage(NgapMessage::new(
        ProcedureCode::OverloadStop,
        Criticality::Reject,
    ))
}
