//! NGAP (NG Application Protocol) library for the simulated AMF
//!
//! # Modules
//!
//! - `pdu` - Structured NGAP PDU model (procedures, IEs, present tags)
//! - `codec` - Transfer-syntax seam and the built-in TLV codec
//! - `procedures` - Builders and parsers for each procedure the engine runs

pub mod codec;
pub mod pdu;
pub mod procedures;

pub use codec::{decode_ngap_pdu, encode_ngap_pdu, NgapCodec, NgapCodecError, TlvCodec};
pub use pdu::{
    Cause, Criticality, IeValue, NgapMessage, NgapPdu, OverloadAction, PduKind,
    PduSessionResourceItem, PduSessionResourceSetupItem, ProcedureCode, ProtocolIe,
    ProtocolIeId, SliceOverloadItem, UeAmbr, UeNgapIds, UeSecurityCapabilities,
    UserLocationInformation,
};
pub use procedures::{ue_ids, ProcedureError};
