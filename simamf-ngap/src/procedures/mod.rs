//! NGAP procedure builders and parsers
//!
//! Builders are pure `Params -> NgapPdu` functions; parsers pull the fields
//! the engine needs out of a decoded PDU.

pub mod initial_context_setup;
pub mod nas_transport;
pub mod ng_setup;
pub mod overload;
pub mod pdu_session_resource;
pub mod ue_context_release;

use thiserror::Error;

use crate::pdu::{IeValue, NgapMessage, NgapPdu, PduKind, ProcedureCode, ProtocolIeId};

/// Errors raised while interpreting a decoded PDU.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcedureError {
    #[error("Invalid message type: expected {expected}, got {actual}")]
    InvalidMessageType { expected: String, actual: String },

    #[error("Missing mandatory IE: {0:?}")]
    MissingMandatoryIe(ProtocolIeId),

    #[error("Invalid IE value for {id:?}: {reason}")]
    InvalidIeValue { id: ProtocolIeId, reason: String },
}

/// Returns the message if `pdu` is the expected kind of `procedure_code`.
pub(crate) fn expect_message<'a>(
    pdu: &'a NgapPdu,
    kind: PduKind,
    procedure_code: ProcedureCode,
    expected: &str,
) -> Result<&'a NgapMessage, ProcedureError> {
    if pdu.kind() != kind || pdu.procedure_code() != procedure_code {
        return Err(ProcedureError::InvalidMessageType {
            expected: expected.to_string(),
            actual: pdu.name(),
        });
    }
    Ok(pdu.message())
}

/// Looks up an optional IE and checks its present tag.
macro_rules! optional_ie {
    ($msg:expr, $id:expr, $variant:ident) => {
        match $msg.ie($id) {
            None => None,
            Some($crate::pdu::IeValue::$variant(value)) => Some(value.clone()),
            Some(other) => {
                return Err($crate::procedures::ProcedureError::InvalidIeValue {
                    id: $id,
                    reason: format!("unexpected value {:?}", other),
                })
            }
        }
    };
}

/// Looks up a mandatory IE and checks its present tag.
macro_rules! mandatory_ie {
    ($msg:expr, $id:expr, $variant:ident) => {
        match $crate::procedures::optional_ie!($msg, $id, $variant) {
            Some(value) => value,
            None => return Err($crate::procedures::ProcedureError::MissingMandatoryIe($id)),
        }
    };
}

pub(crate) use mandatory_ie;
pub(crate) use optional_ie;

pub(crate) fn amf_ue_ngap_id(msg: &NgapMessage) -> Result<u64, ProcedureError> {
    Ok(mandatory_ie!(msg, ProtocolIeId::AmfUeNgapId, AmfUeNgapId))
}

pub(crate) fn ran_ue_ngap_id(msg: &NgapMessage) -> Result<u32, ProcedureError> {
    Ok(mandatory_ie!(msg, ProtocolIeId::RanUeNgapId, RanUeNgapId))
}

/// UE-associated NGAP id pair carried by any PDU, if both are present.
///
/// Used for routing before the message itself is interpreted.
pub fn ue_ids(pdu: &NgapPdu) -> (Option<u64>, Option<u32>) {
    let msg = pdu.message();
    let amf = match msg.ie(ProtocolIeId::AmfUeNgapId) {
        Some(IeValue::AmfUeNgapId(id)) => Some(*id),
        _ => match msg.ie(ProtocolIeId::UeNgapIds) {
            Some(IeValue::UeNgapIds(crate::pdu::UeNgapIds::Pair { amf_ue_ngap_id, .. }))
            | Some(IeValue::UeNgapIds(crate::pdu::UeNgapIds::AmfOnly(amf_ue_ngap_id))) => {
                Some(*amf_ue_ngap_id)
            }
            _ => None,
        },
    };
    let ran = match msg.ie(ProtocolIeId::RanUeNgapId) {
        Some(IeValue::RanUeNgapId(id)) => Some(*id),
        _ => match msg.ie(ProtocolIeId::UeNgapIds) {
            Some(IeValue::UeNgapIds(crate::pdu::UeNgapIds::Pair { ran_ue_ngap_id, .. })) => {
                Some(*ran_ue_ngap_id)
            }
            _ => None,
        },
    };
    (amf, ran)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::procedures::ng_setup::{build_ng_setup_request, NgSetupRequestParams};

    fn ng_setup_request() -> NgapPdu {
        build_ng_setup_request(&NgSetupRequestParams {
            global_ran_node_id: vec![0x02, 0xF8, 0x39, 0x00, 0x01],
            ran_node_name: Some("gnb".to_string()),
        })
    }

    #[test]
    fn test_expected_message_outlives_label() {
        let pdu = ng_setup_request();
        let msg = {
            let label = format!("{}Request", "NGSetup");
            expect_message(&pdu, PduKind::InitiatingMessage, ProcedureCode::NgSetup, &label)
                .unwrap()
        };
        assert_eq!(msg.procedure_code, ProcedureCode::NgSetup);
        assert_eq!(msg.ies.len(), 2);
    }

    #[test]
    fn test_unexpected_kind_is_rejected() {
        let pdu = ng_setup_request();
        let err = expect_message(
            &pdu,
            PduKind::SuccessfulOutcome,
            ProcedureCode::NgSetup,
            "NGSetupResponse",
        )
        .unwrap_err();
        assert_eq!(
            err,
            ProcedureError::InvalidMessageType {
                expected: "NGSetupResponse".to_string(),
                actual: "NGSetupRequest".to_string(),
            }
        );
    }
}
