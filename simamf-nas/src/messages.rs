//! Plain 5GMM and 5GSM messages exchanged by the engine.
//!
//! ```text
//! 5GMM: | EPD 0x7E | security header type | message type | IEs |
//! 5GSM: | EPD 0x2E | PDU session id | PTI | message type | IEs |
//! ```
//! Optional IEs this module does not model are skipped on decode.

use bytes::{BufMut, BytesMut};
use simamf_common::SNssai;

use crate::codec::{get_lv, get_lve, get_u16, get_u8, need, put_lv, put_lve, skip_ie};
use crate::enums::{
    AccessType, ExtendedProtocolDiscriminator, MmMessageType, PayloadContainerType,
    PduSessionType, RequestType, SecurityHeaderType, SmMessageType,
};
use crate::error::NasError;
use crate::ies::{
    decode_dnn, decode_nssai, decode_snssai, encode_dnn, encode_nssai, encode_snssai, Guti5g,
    MobileIdentity, NgKsi, SessionAmbr, UeSecurityCapability,
};
use crate::qos_rules::{decode_qos_rules, encode_qos_rules, QosRule};

mod iei {
    pub const UE_SECURITY_CAPABILITY: u8 = 0x2E;
    pub const REQUESTED_NSSAI: u8 = 0x2F;
    pub const ALLOWED_NSSAI: u8 = 0x15;
    pub const GUTI: u8 = 0x77;
    pub const IMEISV: u8 = 0x77;
    pub const NAS_MESSAGE_CONTAINER: u8 = 0x71;
    pub const ADDITIONAL_SECURITY_INFO: u8 = 0x36;
    pub const PDU_SESSION_ID: u8 = 0x12;
    pub const S_NSSAI: u8 = 0x22;
    pub const DNN: u8 = 0x25;
    pub const MM_CAUSE: u8 = 0x58;
    pub const SM_CAUSE: u8 = 0x59;
    /// Half-octet IEIs (upper nibble)
    pub const REQUEST_TYPE: u8 = 0x8;
    pub const PDU_SESSION_TYPE: u8 = 0x9;
    pub const SSC_MODE: u8 = 0xA;
    pub const IMEISV_REQUEST: u8 = 0xE;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationRequest {
    /// 5GS registration type incl. follow-on request bit
    pub registration_type: u8,
    pub ng_ksi: NgKsi,
    pub mobile_identity: MobileIdentity,
    pub ue_security_capability: Option<UeSecurityCapability>,
    pub requested_nssai: Option<Vec<SNssai>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationAccept {
    /// 5GS registration result value
    pub result: u8,
    pub guti: Option<Guti5g>,
    pub allowed_nssai: Vec<SNssai>,
}

impl RegistrationAccept {
    pub const RESULT_3GPP: u8 = 0x01;
    pub const RESULT_NON_3GPP: u8 = 0x02;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeregistrationRequest {
    pub switch_off: bool,
    pub re_registration_required: bool,
    pub access_type: AccessType,
    pub ng_ksi: NgKsi,
    pub mobile_identity: MobileIdentity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityModeCommand {
    pub ciphering: u8,
    pub integrity: u8,
    pub ng_ksi: NgKsi,
    pub replayed_capability: UeSecurityCapability,
    pub imeisv_requested: Option<bool>,
    pub additional_security_info: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SecurityModeComplete {
    pub imeisv: Option<MobileIdentity>,
    pub nas_message_container: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UlNasTransport {
    pub payload_container_type: PayloadContainerType,
    pub payload: Vec<u8>,
    pub pdu_session_id: Option<u8>,
    pub request_type: Option<RequestType>,
    pub snssai: Option<SNssai>,
    pub dnn: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DlNasTransport {
    pub payload_container_type: PayloadContainerType,
    pub payload: Vec<u8>,
    pub pdu_session_id: Option<u8>,
    pub mm_cause: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MmMessage {
    RegistrationRequest(RegistrationRequest),
    RegistrationAccept(RegistrationAccept),
    RegistrationComplete,
    DeregistrationRequest(DeregistrationRequest),
    DeregistrationAccept,
    SecurityModeCommand(SecurityModeCommand),
    SecurityModeComplete(SecurityModeComplete),
    UlNasTransport(UlNasTransport),
    DlNasTransport(DlNasTransport),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PduSessionEstablishmentRequest {
    /// Integrity protection maximum data rate, uplink then downlink
    pub max_data_rate: [u8; 2],
    pub pdu_session_type: Option<PduSessionType>,
    pub ssc_mode: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PduSessionEstablishmentAccept {
    pub pdu_session_type: PduSessionType,
    pub ssc_mode: u8,
    pub qos_rules: Vec<QosRule>,
    pub session_ambr: SessionAmbr,
    pub snssai: Option<SNssai>,
    pub dnn: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmBody {
    EstablishmentRequest(PduSessionEstablishmentRequest),
    EstablishmentAccept(PduSessionEstablishmentAccept),
    ReleaseRequest { cause: Option<u8> },
    ReleaseCommand { cause: u8 },
    ReleaseComplete { cause: Option<u8> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmMessage {
    pub pdu_session_id: u8,
    /// Procedure transaction identity
    pub pti: u8,
    pub body: SmBody,
}

/// A plain (unprotected) NAS message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NasMessage {
    Mm(MmMessage),
    Sm(SmMessage),
}

impl From<MmMessage> for NasMessage {
    fn from(msg: MmMessage) -> Self {
        NasMessage::Mm(msg)
    }
}

impl From<SmMessage> for NasMessage {
    fn from(msg: SmMessage) -> Self {
        NasMessage::Sm(msg)
    }
}

impl MmMessage {
    pub fn message_type(&self) -> MmMessageType {
        match self {
            MmMessage::RegistrationRequest(_) => MmMessageType::RegistrationRequest,
            MmMessage::RegistrationAccept(_) => MmMessageType::RegistrationAccept,
            MmMessage::RegistrationComplete => MmMessageType::RegistrationComplete,
            MmMessage::DeregistrationRequest(_) => {
                MmMessageType::DeregistrationRequestUeOriginating
            }
            MmMessage::DeregistrationAccept => MmMessageType::DeregistrationAcceptUeOriginating,
            MmMessage::SecurityModeCommand(_) => MmMessageType::SecurityModeCommand,
            MmMessage::SecurityModeComplete(_) => MmMessageType::SecurityModeComplete,
            MmMessage::UlNasTransport(_) => MmMessageType::UlNasTransport,
            MmMessage::DlNasTransport(_) => MmMessageType::DlNasTransport,
        }
    }
}

impl SmBody {
    pub fn message_type(&self) -> SmMessageType {
        match self {
            SmBody::EstablishmentRequest(_) => SmMessageType::PduSessionEstablishmentRequest,
            SmBody::EstablishmentAccept(_) => SmMessageType::PduSessionEstablishmentAccept,
            SmBody::ReleaseRequest { .. } => SmMessageType::PduSessionReleaseRequest,
            SmBody::ReleaseCommand { .. } => SmMessageType::PduSessionReleaseCommand,
            SmBody::ReleaseComplete { .. } => SmMessageType::PduSessionReleaseComplete,
        }
    }
}

impl NasMessage {
    pub fn epd(&self) -> ExtendedProtocolDiscriminator {
        match self {
            NasMessage::Mm(_) => ExtendedProtocolDiscriminator::MobilityManagement,
            NasMessage::Sm(_) => ExtendedProtocolDiscriminator::SessionManagement,
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> String {
        match self {
            NasMessage::Mm(mm) => format!("{:?}", mm.message_type()),
            NasMessage::Sm(sm) => format!("{:?}", sm.body.message_type()),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, NasError> {
        let mut out = BytesMut::with_capacity(64);
        match self {
            NasMessage::Mm(mm) => {
                out.put_u8(ExtendedProtocolDiscriminator::MobilityManagement.into());
                out.put_u8(SecurityHeaderType::NotProtected.into());
                out.put_u8(mm.message_type().into());
                encode_mm(mm, &mut out);
            }
            NasMessage::Sm(sm) => {
                out.put_u8(ExtendedProtocolDiscriminator::SessionManagement.into());
                out.put_u8(sm.pdu_session_id);
                out.put_u8(sm.pti);
                out.put_u8(sm.body.message_type().into());
                encode_sm(&sm.body, &mut out)?;
            }
        }
        Ok(out.to_vec())
    }

    pub fn decode(data: &[u8]) -> Result<Self, NasError> {
        let mut buf = data;
        let epd = get_u8(&mut buf)?;
        match ExtendedProtocolDiscriminator::try_from(epd) {
            Ok(ExtendedProtocolDiscriminator::MobilityManagement) => {
                let sht = get_u8(&mut buf)? & 0x0F;
                if sht != u8::from(SecurityHeaderType::NotProtected) {
                    return Err(NasError::InvalidSecurityHeaderType(sht));
                }
                let value = get_u8(&mut buf)?;
                let message_type = MmMessageType::try_from(value)
                    .map_err(|_| NasError::UnknownMessageType { epd, value })?;
                Ok(NasMessage::Mm(decode_mm(message_type, &mut buf)?))
            }
            Ok(ExtendedProtocolDiscriminator::SessionManagement) => {
                let pdu_session_id = get_u8(&mut buf)?;
                let pti = get_u8(&mut buf)?;
                let value = get_u8(&mut buf)?;
                let message_type = SmMessageType::try_from(value)
                    .map_err(|_| NasError::UnknownMessageType { epd, value })?;
                Ok(NasMessage::Sm(SmMessage {
                    pdu_session_id,
                    pti,
                    body: decode_sm(message_type, &mut buf)?,
                }))
            }
            Err(_) => Err(NasError::InvalidEpd(epd)),
        }
    }
}

/// Reads the security header type of an encoded NAS PDU without decoding it.
pub fn peek_security_header_type(data: &[u8]) -> Result<SecurityHeaderType, NasError> {
    need(data, 2)?;
    match ExtendedProtocolDiscriminator::try_from(data[0]) {
        Ok(ExtendedProtocolDiscriminator::MobilityManagement) => {
            let sht = data[1] & 0x0F;
            SecurityHeaderType::try_from(sht).map_err(|_| NasError::InvalidSecurityHeaderType(sht))
        }
        Ok(ExtendedProtocolDiscriminator::SessionManagement) => Ok(SecurityHeaderType::NotProtected),
        Err(_) => Err(NasError::InvalidEpd(data[0])),
    }
}

fn encode_mm(msg: &MmMessage, out: &mut BytesMut) {
    match msg {
        MmMessage::RegistrationRequest(m) => {
            out.put_u8((m.ng_ksi.to_nibble() << 4) | (m.registration_type & 0x0F));
            put_lve(out, &m.mobile_identity.encode());
            if let Some(cap) = &m.ue_security_capability {
                out.put_u8(iei::UE_SECURITY_CAPABILITY);
                put_lv(out, &cap.encode());
            }
            if let Some(nssai) = &m.requested_nssai {
                out.put_u8(iei::REQUESTED_NSSAI);
                put_lv(out, &encode_nssai(nssai));
            }
        }
        MmMessage::RegistrationAccept(m) => {
            put_lv(out, &[m.result]);
            if let Some(guti) = &m.guti {
                out.put_u8(iei::GUTI);
                put_lve(out, &MobileIdentity::Guti(*guti).encode());
            }
            if !m.allowed_nssai.is_empty() {
                out.put_u8(iei::ALLOWED_NSSAI);
                put_lv(out, &encode_nssai(&m.allowed_nssai));
            }
        }
        MmMessage::RegistrationComplete | MmMessage::DeregistrationAccept => {}
        MmMessage::DeregistrationRequest(m) => {
            let dereg_type = ((m.switch_off as u8) << 3)
                | ((m.re_registration_required as u8) << 2)
                | u8::from(m.access_type);
            out.put_u8((m.ng_ksi.to_nibble() << 4) | dereg_type);
            put_lve(out, &m.mobile_identity.encode());
        }
        MmMessage::SecurityModeCommand(m) => {
            out.put_u8(((m.ciphering & 0x0F) << 4) | (m.integrity & 0x0F));
            out.put_u8(m.ng_ksi.to_nibble());
            put_lv(out, &m.replayed_capability.encode());
            if let Some(requested) = m.imeisv_requested {
                out.put_u8((iei::IMEISV_REQUEST << 4) | requested as u8);
            }
            if let Some(info) = m.additional_security_info {
                out.put_u8(iei::ADDITIONAL_SECURITY_INFO);
                put_lv(out, &[info]);
            }
        }
        MmMessage::SecurityModeComplete(m) => {
            if let Some(imeisv) = &m.imeisv {
                out.put_u8(iei::IMEISV);
                put_lve(out, &imeisv.encode());
            }
            if let Some(container) = &m.nas_message_container {
                out.put_u8(iei::NAS_MESSAGE_CONTAINER);
                put_lve(out, container);
            }
        }
        MmMessage::UlNasTransport(m) => {
            out.put_u8(u8::from(m.payload_container_type) & 0x0F);
            put_lve(out, &m.payload);
            if let Some(id) = m.pdu_session_id {
                out.put_u8(iei::PDU_SESSION_ID);
                out.put_u8(id);
            }
            if let Some(request_type) = m.request_type {
                out.put_u8((iei::REQUEST_TYPE << 4) | u8::from(request_type));
            }
            if let Some(snssai) = &m.snssai {
                out.put_u8(iei::S_NSSAI);
                put_lv(out, &encode_snssai(snssai));
            }
            if let Some(dnn) = &m.dnn {
                out.put_u8(iei::DNN);
                put_lv(out, &encode_dnn(dnn));
            }
        }
        MmMessage::DlNasTransport(m) => {
            out.put_u8(u8::from(m.payload_container_type) & 0x0F);
            put_lve(out, &m.payload);
            if let Some(id) = m.pdu_session_id {
                out.put_u8(iei::PDU_SESSION_ID);
                out.put_u8(id);
            }
            if let Some(cause) = m.mm_cause {
                out.put_u8(iei::MM_CAUSE);
                out.put_u8(cause);
            }
        }
    }
}

fn decode_mm(message_type: MmMessageType, buf: &mut &[u8]) -> Result<MmMessage, NasError> {
    let msg = match message_type {
        MmMessageType::RegistrationRequest => {
            let octet = get_u8(buf)?;
            let mut msg = RegistrationRequest {
                registration_type: octet & 0x0F,
                ng_ksi: NgKsi::from_nibble(octet >> 4),
                mobile_identity: MobileIdentity::decode(get_lve(buf)?)?,
                ue_security_capability: None,
                requested_nssai: None,
            };
            while !buf.is_empty() {
                match get_u8(buf)? {
                    iei::UE_SECURITY_CAPABILITY => {
                        msg.ue_security_capability = Some(UeSecurityCapability::decode(get_lv(buf)?)?)
                    }
                    iei::REQUESTED_NSSAI => msg.requested_nssai = Some(decode_nssai(get_lv(buf)?)?),
                    other => skip_ie(buf, other)?,
                }
            }
            MmMessage::RegistrationRequest(msg)
        }
        MmMessageType::RegistrationAccept => {
            let result = get_lv(buf)?;
            need(result, 1)?;
            let mut msg = RegistrationAccept {
                result: result[0] & 0x07,
                guti: None,
                allowed_nssai: Vec::new(),
            };
            while !buf.is_empty() {
                match get_u8(buf)? {
                    iei::GUTI => match MobileIdentity::decode(get_lve(buf)?)? {
                        MobileIdentity::Guti(guti) => msg.guti = Some(guti),
                        other => {
                            return Err(NasError::Malformed(format!("5G-GUTI IE holds {other:?}")))
                        }
                    },
                    iei::ALLOWED_NSSAI => msg.allowed_nssai = decode_nssai(get_lv(buf)?)?,
                    other => skip_ie(buf, other)?,
                }
            }
            MmMessage::RegistrationAccept(msg)
        }
        MmMessageType::RegistrationComplete => MmMessage::RegistrationComplete,
        MmMessageType::DeregistrationRequestUeOriginating => {
            let octet = get_u8(buf)?;
            let access = octet & 0x03;
            MmMessage::DeregistrationRequest(DeregistrationRequest {
                switch_off: octet & 0x08 != 0,
                re_registration_required: octet & 0x04 != 0,
                access_type: AccessType::try_from(access).map_err(|_| NasError::InvalidValue {
                    ie: "access type",
                    value: access,
                })?,
                ng_ksi: NgKsi::from_nibble(octet >> 4),
                mobile_identity: MobileIdentity::decode(get_lve(buf)?)?,
            })
        }
        MmMessageType::DeregistrationAcceptUeOriginating => MmMessage::DeregistrationAccept,
        MmMessageType::SecurityModeCommand => {
            let algs = get_u8(buf)?;
            let ng_ksi = NgKsi::from_nibble(get_u8(buf)? & 0x0F);
            let mut msg = SecurityModeCommand {
                ciphering: algs >> 4,
                integrity: algs & 0x0F,
                ng_ksi,
                replayed_capability: UeSecurityCapability::decode(get_lv(buf)?)?,
                imeisv_requested: None,
                additional_security_info: None,
            };
            while !buf.is_empty() {
                let ie = get_u8(buf)?;
                if ie >> 4 == iei::IMEISV_REQUEST {
                    msg.imeisv_requested = Some(ie & 0x07 != 0);
                    continue;
                }
                match ie {
                    iei::ADDITIONAL_SECURITY_INFO => {
                        let value = get_lv(buf)?;
                        need(value, 1)?;
                        msg.additional_security_info = Some(value[0]);
                    }
                    other => skip_ie(buf, other)?,
                }
            }
            MmMessage::SecurityModeCommand(msg)
        }
        MmMessageType::SecurityModeComplete => {
            let mut msg = SecurityModeComplete::default();
            while !buf.is_empty() {
                match get_u8(buf)? {
                    iei::IMEISV => msg.imeisv = Some(MobileIdentity::decode(get_lve(buf)?)?),
                    iei::NAS_MESSAGE_CONTAINER => {
                        msg.nas_message_container = Some(get_lve(buf)?.to_vec())
                    }
                    other => skip_ie(buf, other)?,
                }
            }
            MmMessage::SecurityModeComplete(msg)
        }
        MmMessageType::UlNasTransport => {
            let payload_container_type = decode_container_type(get_u8(buf)?)?;
            let mut msg = UlNasTransport {
                payload_container_type,
                payload: get_lve(buf)?.to_vec(),
                pdu_session_id: None,
                request_type: None,
                snssai: None,
                dnn: None,
            };
            while !buf.is_empty() {
                let ie = get_u8(buf)?;
                if ie >> 4 == iei::REQUEST_TYPE {
                    let value = ie & 0x07;
                    msg.request_type = Some(RequestType::try_from(value).map_err(|_| {
                        NasError::InvalidValue {
                            ie: "request type",
                            value,
                        }
                    })?);
                    continue;
                }
                match ie {
                    iei::PDU_SESSION_ID => msg.pdu_session_id = Some(get_u8(buf)?),
                    // old PDU session id, TV
                    0x59 => {
                        get_u8(buf)?;
                    }
                    iei::S_NSSAI => msg.snssai = Some(decode_snssai(get_lv(buf)?)?),
                    iei::DNN => msg.dnn = Some(decode_dnn(get_lv(buf)?)?),
                    other => skip_ie(buf, other)?,
                }
            }
            MmMessage::UlNasTransport(msg)
        }
        MmMessageType::DlNasTransport => {
            let payload_container_type = decode_container_type(get_u8(buf)?)?;
            let mut msg = DlNasTransport {
                payload_container_type,
                payload: get_lve(buf)?.to_vec(),
                pdu_session_id: None,
                mm_cause: None,
            };
            while !buf.is_empty() {
                match get_u8(buf)? {
                    iei::PDU_SESSION_ID => msg.pdu_session_id = Some(get_u8(buf)?),
                    iei::MM_CAUSE => msg.mm_cause = Some(get_u8(buf)?),
                    other => skip_ie(buf, other)?,
                }
            }
            MmMessage::DlNasTransport(msg)
        }
    };
    Ok(msg)
}

fn decode_container_type(octet: u8) -> Result<PayloadContainerType, NasError> {
    let value = octet & 0x0F;
    PayloadContainerType::try_from(value).map_err(|_| NasError::InvalidValue {
        ie: "payload container type",
        value,
    })
}

fn encode_sm(body: &SmBody, out: &mut BytesMut) -> Result<(), NasError> {
    match body {
        SmBody::EstablishmentRequest(m) => {
            out.put_slice(&m.max_data_rate);
            if let Some(session_type) = m.pdu_session_type {
                out.put_u8((iei::PDU_SESSION_TYPE << 4) | u8::from(session_type));
            }
            if let Some(ssc) = m.ssc_mode {
                out.put_u8((iei::SSC_MODE << 4) | (ssc & 0x07));
            }
        }
        SmBody::EstablishmentAccept(m) => {
            out.put_u8(((m.ssc_mode & 0x07) << 4) | u8::from(m.pdu_session_type));
            put_lve(out, &encode_qos_rules(&m.qos_rules)?);
            let mut ambr = BytesMut::with_capacity(6);
            m.session_ambr.encode(&mut ambr);
            put_lv(out, &ambr);
            if let Some(snssai) = &m.snssai {
                out.put_u8(iei::S_NSSAI);
                put_lv(out, &encode_snssai(snssai));
            }
            if let Some(dnn) = &m.dnn {
                out.put_u8(iei::DNN);
                put_lv(out, &encode_dnn(dnn));
            }
        }
        SmBody::ReleaseRequest { cause } | SmBody::ReleaseComplete { cause } => {
            if let Some(cause) = cause {
                out.put_u8(iei::SM_CAUSE);
                out.put_u8(*cause);
            }
        }
        SmBody::ReleaseCommand { cause } => out.put_u8(*cause),
    }
    Ok(())
}

fn decode_optional_sm_cause(buf: &mut &[u8]) -> Result<Option<u8>, NasError> {
    let mut cause = None;
    while !buf.is_empty() {
        match get_u8(buf)? {
            iei::SM_CAUSE => cause = Some(get_u8(buf)?),
            other => skip_ie(buf, other)?,
        }
    }
    Ok(cause)
}

fn decode_sm(message_type: SmMessageType, buf: &mut &[u8]) -> Result<SmBody, NasError> {
    let body = match message_type {
        SmMessageType::PduSessionEstablishmentRequest => {
            let rate = get_u16(buf)?.to_be_bytes();
            let mut msg = PduSessionEstablishmentRequest {
                max_data_rate: rate,
                pdu_session_type: None,
                ssc_mode: None,
            };
            while !buf.is_empty() {
                let ie = get_u8(buf)?;
                match ie >> 4 {
                    iei::PDU_SESSION_TYPE => {
                        let value = ie & 0x07;
                        msg.pdu_session_type = Some(PduSessionType::try_from(value).map_err(
                            |_| NasError::InvalidValue {
                                ie: "PDU session type",
                                value,
                            },
                        )?)
                    }
                    iei::SSC_MODE => msg.ssc_mode = Some(ie & 0x07),
                    _ => skip_ie(buf, ie)?,
                }
            }
            SmBody::EstablishmentRequest(msg)
        }
        SmMessageType::PduSessionEstablishmentAccept => {
            let octet = get_u8(buf)?;
            let value = octet & 0x07;
            let pdu_session_type = PduSessionType::try_from(value).map_err(|_| {
                NasError::InvalidValue {
                    ie: "PDU session type",
                    value,
                }
            })?;
            let qos_rules = decode_qos_rules(get_lve(buf)?)?;
            let session_ambr = SessionAmbr::decode(get_lv(buf)?)?;
            let mut msg = PduSessionEstablishmentAccept {
                pdu_session_type,
                ssc_mode: (octet >> 4) & 0x07,
                qos_rules,
                session_ambr,
                snssai: None,
                dnn: None,
            };
            while !buf.is_empty() {
                match get_u8(buf)? {
                    iei::S_NSSAI => msg.snssai = Some(decode_snssai(get_lv(buf)?)?),
                    iei::DNN => msg.dnn = Some(decode_dnn(get_lv(buf)?)?),
                    // 5GSM cause, TV
                    iei::SM_CAUSE => {
                        get_u8(buf)?;
                    }
                    other => skip_ie(buf, other)?,
                }
            }
            SmBody::EstablishmentAccept(msg)
        }
        SmMessageType::PduSessionReleaseRequest => SmBody::ReleaseRequest {
            cause: decode_optional_sm_cause(buf)?,
        },
        SmMessageType::PduSessionReleaseCommand => {
            let cause = get_u8(buf)?;
            // trailing optional IEs are not modelled
            *buf = &[];
            SmBody::ReleaseCommand { cause }
        }
        SmMessageType::PduSessionReleaseComplete => SmBody::ReleaseComplete {
            cause: decode_optional_sm_cause(buf)?,
        },
    };
    Ok(body)
}
