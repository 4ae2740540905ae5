//! Structured NGAP PDU model
//!
//! Every message is a list of protocol IEs, each carrying
//! `{id, criticality, present tag, value}`. The present tag is the variant
//! of [`IeValue`]. Optional IEs are simply absent from the list.

use num_enum::{FromPrimitive, IntoPrimitive, TryFromPrimitive};
use simamf_common::config::LineType;
use simamf_common::{Guami, PlmnSupport, SNssai};

/// NGAP elementary procedure codes (TS 38.413 9.4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum ProcedureCode {
    DownlinkNasTransport = 4,
    InitialContextSetup = 14,
    InitialUeMessage = 15,
    NgSetup = 21,
    OverloadStart = 22,
    OverloadStop = 23,
    PduSessionResourceRelease = 28,
    PduSessionResourceSetup = 29,
    UeContextRelease = 41,
    UeContextReleaseRequest = 42,
    UplinkNasTransport = 46,
    #[num_enum(catch_all)]
    Other(u8),
}

/// NGAP protocol IE identifiers used by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum ProtocolIeId {
    AllowedNssai = 0,
    AmfName = 1,
    AmfOverloadResponse = 2,
    AmfTrafficLoadReductionIndication = 9,
    AmfUeNgapId = 10,
    Cause = 15,
    GlobalRanNodeId = 27,
    Guami = 28,
    NasPdu = 38,
    OldAmf = 48,
    PduSessionResourceFailedToSetupListSuRes = 58,
    PduSessionResourceReleasedListRelRes = 70,
    PduSessionResourceSetupListSuReq = 74,
    PduSessionResourceSetupListSuRes = 75,
    PduSessionResourceToReleaseListRelCmd = 79,
    PlmnSupportList = 80,
    RanNodeName = 82,
    RanUeNgapId = 85,
    RelativeAmfCapacity = 86,
    SecurityKey = 94,
    ServedGuamiList = 96,
    OverloadStartNssaiList = 104,
    UeAggregateMaximumBitRate = 110,
    UeNgapIds = 114,
    UeRadioCapability = 117,
    UeSecurityCapabilities = 119,
    UserLocationInformation = 121,
    #[num_enum(catch_all)]
    Other(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Criticality {
    #[default]
    Reject = 0,
    Ignore = 1,
    Notify = 2,
}

/// NGAP Cause, one value per cause group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cause {
    RadioNetwork(u8),
    Transport(u8),
    Nas(u8),
    Protocol(u8),
    Misc(u8),
}

impl Cause {
    pub const RADIO_NETWORK_UNSPECIFIED: Cause = Cause::RadioNetwork(0);
    pub const NAS_NORMAL_RELEASE: Cause = Cause::Nas(0);
    pub const NAS_DEREGISTER: Cause = Cause::Nas(2);
}

/// AMF overload action (TS 38.413 9.3.1.105).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum OverloadAction {
    RejectNonEmergencyMoDt = 0,
    RejectRrcCrSignalling = 1,
    PermitEmergencySessionsAndMobileTerminatedServicesOnly = 2,
    PermitHighPrioritySessionsAndMobileTerminatedServicesOnly = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct UeSecurityCapabilities {
    pub nr_encryption: u16,
    pub nr_integrity: u16,
    pub eutra_encryption: u16,
    pub eutra_integrity: u16,
}

impl UeSecurityCapabilities {
    /// NEA0/NIA0 are implicit; only the NEA1-3 / NIA1-3 bits are signalled.
    pub fn null_only() -> Self {
        Self::default()
    }
}

/// UE aggregate maximum bit rate, bits per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UeAmbr {
    pub dl: u64,
    pub ul: u64,
}

/// W-AGF user location: global line id plus optional line type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserLocationInformation {
    pub global_line_id: Vec<u8>,
    pub line_type: Option<LineType>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PduSessionResourceSetupItem {
    pub pdu_session_id: u8,
    pub nas_pdu: Option<Vec<u8>>,
    pub snssai: SNssai,
    pub transfer: Vec<u8>,
}

/// Item of the setup response, failed-to-setup, to-release and released lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PduSessionResourceItem {
    pub pdu_session_id: u8,
    pub transfer: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UeNgapIds {
    Pair { amf_ue_ngap_id: u64, ran_ue_ngap_id: u32 },
    AmfOnly(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceOverloadItem {
    pub slices: Vec<SNssai>,
    pub action: Option<OverloadAction>,
    pub traffic_load_reduction: Option<u8>,
}

/// IE value; the variant is the IE's present tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IeValue {
    AmfUeNgapId(u64),
    RanUeNgapId(u32),
    NasPdu(Vec<u8>),
    /// AMF name, old AMF name or RAN node name
    Name(String),
    Guami(Guami),
    ServedGuamiList(Vec<Guami>),
    RelativeAmfCapacity(u8),
    PlmnSupportList(Vec<PlmnSupport>),
    AllowedNssai(Vec<SNssai>),
    SecurityKey([u8; 32]),
    UeSecurityCapabilities(UeSecurityCapabilities),
    UserLocationInformation(UserLocationInformation),
    UeAggregateMaximumBitRate(UeAmbr),
    UeRadioCapability(Vec<u8>),
    Cause(Cause),
    UeNgapIds(UeNgapIds),
    PduSessionResourceSetupListSuReq(Vec<PduSessionResourceSetupItem>),
    PduSessionResourceList(Vec<PduSessionResourceItem>),
    OverloadResponse(OverloadAction),
    TrafficLoadReductionIndication(u8),
    OverloadStartNssaiList(Vec<SliceOverloadItem>),
    /// Opaque value of an IE this model does not interpret
    Raw(Vec<u8>),
}

impl IeValue {
    /// Present tag carried on the wire.
    pub fn present(&self) -> u8 {
        match self {
            IeValue::AmfUeNgapId(_) => 1,
            IeValue::RanUeNgapId(_) => 2,
            IeValue::NasPdu(_) => 3,
            IeValue::Name(_) => 4,
            IeValue::Guami(_) => 5,
            IeValue::ServedGuamiList(_) => 6,
            IeValue::RelativeAmfCapacity(_) => 7,
            IeValue::PlmnSupportList(_) => 8,
            IeValue::AllowedNssai(_) => 9,
            IeValue::SecurityKey(_) => 10,
            IeValue::UeSecurityCapabilities(_) => 11,
            IeValue::UserLocationInformation(_) => 12,
            IeValue::UeAggregateMaximumBitRate(_) => 13,
            IeValue::UeRadioCapability(_) => 14,
            IeValue::Cause(_) => 15,
            IeValue::UeNgapIds(_) => 16,
            IeValue::PduSessionResourceSetupListSuReq(_) => 17,
            IeValue::PduSessionResourceList(_) => 18,
            IeValue::OverloadResponse(_) => 19,
            IeValue::TrafficLoadReductionIndication(_) => 20,
            IeValue::OverloadStartNssaiList(_) => 21,
            IeValue::Raw(_) => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolIe {
    pub id: ProtocolIeId,
    pub criticality: Criticality,
    pub value: IeValue,
}

impl ProtocolIe {
    pub fn new(id: ProtocolIeId, criticality: Criticality, value: IeValue) -> Self {
        Self {
            id,
            criticality,
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NgapMessage {
    pub procedure_code: ProcedureCode,
    pub criticality: Criticality,
    pub ies: Vec<ProtocolIe>,
}

impl NgapMessage {
    pub fn new(procedure_code: ProcedureCode, criticality: Criticality) -> Self {
        Self {
            procedure_code,
            criticality,
            ies: Vec::new(),
        }
    }

    pub fn push(&mut self, id: ProtocolIeId, criticality: Criticality, value: IeValue) {
        self.ies.push(ProtocolIe::new(id, criticality, value));
    }

    /// First IE with the given id.
    pub fn ie(&self, id: ProtocolIeId) -> Option<&IeValue> {
        self.ies.iter().find(|ie| ie.id == id).map(|ie| &ie.value)
    }

    pub fn ie_ids(&self) -> Vec<ProtocolIeId> {
        self.ies.iter().map(|ie| ie.id).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum PduKind {
    InitiatingMessage = 0,
    SuccessfulOutcome = 1,
    UnsuccessfulOutcome = 2,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NgapPdu {
    InitiatingMessage(NgapMessage),
    SuccessfulOutcome(NgapMessage),
    UnsuccessfulOutcome(NgapMessage),
}

impl NgapPdu {
    pub fn kind(&self) -> PduKind {
        match self {
            NgapPdu::InitiatingMessage(_) => PduKind::InitiatingMessage,
            NgapPdu::SuccessfulOutcome(_) => PduKind::SuccessfulOutcome,
            NgapPdu::UnsuccessfulOutcome(_) => PduKind::UnsuccessfulOutcome,
        }
    }

    pub fn message(&self) -> &NgapMessage {
        match self {
            NgapPdu::InitiatingMessage(m)
            | NgapPdu::SuccessfulOutcome(m)
            | NgapPdu::UnsuccessfulOutcome(m) => m,
        }
    }

    pub fn procedure_code(&self) -> ProcedureCode {
        self.message().procedure_code
    }

    /// Human-readable message name, e.g. "InitialContextSetupResponse".
    pub fn name(&self) -> String {
        let base = match self.procedure_code() {
            ProcedureCode::DownlinkNasTransport => "DownlinkNASTransport",
            ProcedureCode::InitialContextSetup => "InitialContextSetup",
            ProcedureCode::InitialUeMessage => "InitialUEMessage",
            ProcedureCode::NgSetup => "NGSetup",
            ProcedureCode::OverloadStart => "OverloadStart",
            ProcedureCode::OverloadStop => "OverloadStop",
            ProcedureCode::PduSessionResourceRelease => "PDUSessionResourceRelease",
            ProcedureCode::PduSessionResourceSetup => "PDUSessionResourceSetup",
            ProcedureCode::UeContextRelease => "UEContextRelease",
            ProcedureCode::UeContextReleaseRequest => "UEContextReleaseRequest",
            ProcedureCode::UplinkNasTransport => "UplinkNASTransport",
            ProcedureCode::Other(code) => return format!("Procedure{code}({:?})", self.kind()),
        };
        let class_one = matches!(
            self.procedure_code(),
            ProcedureCode::InitialContextSetup
                | ProcedureCode::NgSetup
                | ProcedureCode::PduSessionResourceRelease
                | ProcedureCode::PduSessionResourceSetup
                | ProcedureCode::UeContextRelease
        );
        if !class_one {
            return base.to_string();
        }
        match (self.procedure_code(), self.kind()) {
            (ProcedureCode::UeContextRelease, PduKind::InitiatingMessage) => {
                "UEContextReleaseCommand".to_string()
            }
            (ProcedureCode::UeContextRelease, PduKind::SuccessfulOutcome) => {
                "UEContextReleaseComplete".to_string()
            }
            (ProcedureCode::PduSessionResourceRelease, PduKind::InitiatingMessage) => {
                "PDUSessionResourceReleaseCommand".to_string()
            }
            (_, PduKind::InitiatingMessage) => format!("{base}Request"),
            (_, PduKind::SuccessfulOutcome) => format!("{base}Response"),
            (_, PduKind::UnsuccessfulOutcome) => format!("{base}Failure"),
        }
    }
}
