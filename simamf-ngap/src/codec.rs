//! NGAP transfer-syntax codec
//!
//! The engine only depends on the [`NgapCodec`] seam: an opaque
//! `encode(PDU) -> bytes` / `decode(bytes) -> PDU` pair. [`TlvCodec`] is the
//! built-in implementation, a compact tag-length-value rendition of the
//! structured model in [`crate::pdu`]:
//!
//! ```text
//! PDU: | kind | procedure code | criticality | IE count (2) | IEs |
//! IE:  | id (2) | criticality | present | length (2) | value |
//! ```

use bytes::{Buf, BufMut, BytesMut};
use simamf_common::config::LineType;
use simamf_common::{Guami, Plmn, PlmnSupport, SNssai};
use thiserror::Error;

use crate::pdu::{
    Cause, Criticality, IeValue, NgapMessage, NgapPdu, OverloadAction, PduKind,
    PduSessionResourceItem, PduSessionResourceSetupItem, ProcedureCode, ProtocolIe,
    ProtocolIeId, SliceOverloadItem, UeAmbr, UeNgapIds, UeSecurityCapabilities,
    UserLocationInformation,
};

/// NGAP codec error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NgapCodecError {
    #[error("NGAP encoding error: {0}")]
    EncodeError(String),

    #[error("NGAP truncated at offset {offset}: need {needed} more bytes")]
    Truncated { offset: usize, needed: usize },

    #[error("NGAP decoding error at offset {offset}: {reason}")]
    DecodeError { offset: usize, reason: String },
}

/// Opaque transfer-syntax seam between the engine and the wire.
pub trait NgapCodec: Send + Sync {
    fn encode(&self, pdu: &NgapPdu) -> Result<Vec<u8>, NgapCodecError>;
    fn decode(&self, data: &[u8]) -> Result<NgapPdu, NgapCodecError>;
}

/// Built-in tag-length-value codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct TlvCodec;

impl NgapCodec for TlvCodec {
    fn encode(&self, pdu: &NgapPdu) -> Result<Vec<u8>, NgapCodecError> {
        encode_ngap_pdu(pdu)
    }

    fn decode(&self, data: &[u8]) -> Result<NgapPdu, NgapCodecError> {
        decode_ngap_pdu(data)
    }
}

/// Encode an NGAP PDU with the built-in codec.
pub fn encode_ngap_pdu(pdu: &NgapPdu) -> Result<Vec<u8>, NgapCodecError> {
    let msg = pdu.message();
    let count = u16::try_from(msg.ies.len())
        .map_err(|_| NgapCodecError::EncodeError(format!("{} IEs", msg.ies.len())))?;

    let mut out = BytesMut::with_capacity(128);
    out.put_u8(pdu.kind().into());
    out.put_u8(msg.procedure_code.into());
    out.put_u8(msg.criticality.into());
    out.put_u16(count);

    for ie in &msg.ies {
        let mut value = BytesMut::new();
        encode_value(&ie.value, &mut value)?;
        let len = u16::try_from(value.len()).map_err(|_| {
            NgapCodecError::EncodeError(format!("IE {:?} value of {} bytes", ie.id, value.len()))
        })?;
        out.put_u16(ie.id.into());
        out.put_u8(ie.criticality.into());
        out.put_u8(ie.value.present());
        out.put_u16(len);
        out.put_slice(&value);
    }
    Ok(out.to_vec())
}

/// Decode an NGAP PDU with the built-in codec.
pub fn decode_ngap_pdu(data: &[u8]) -> Result<NgapPdu, NgapCodecError> {
    let mut r = Reader::new(data);
    let kind = r.u8()?;
    let kind = PduKind::try_from(kind).map_err(|_| r.error(format!("PDU kind {kind}")))?;
    let procedure_code = ProcedureCode::from(r.u8()?);
    let criticality = r.criticality()?;
    let count = r.u16()?;

    let mut msg = NgapMessage::new(procedure_code, criticality);
    for _ in 0..count {
        let id = ProtocolIeId::from(r.u16()?);
        let criticality = r.criticality()?;
        let present = r.u8()?;
        let len = r.u16()? as usize;
        let base = r.offset();
        let raw = r.take(len)?;
        let mut inner = Reader {
            buf: raw,
            base,
            pos: 0,
        };
        let value = decode_value(present, &mut inner)?;
        if inner.remaining() != 0 {
            return Err(inner.error(format!("{} trailing bytes in IE {id:?}", inner.remaining())));
        }
        msg.ies.push(ProtocolIe::new(id, criticality, value));
    }
    if r.remaining() != 0 {
        return Err(r.error(format!("{} trailing bytes after last IE", r.remaining())));
    }

    Ok(match kind {
        PduKind::InitiatingMessage => NgapPdu::InitiatingMessage(msg),
        PduKind::SuccessfulOutcome => NgapPdu::SuccessfulOutcome(msg),
        PduKind::UnsuccessfulOutcome => NgapPdu::UnsuccessfulOutcome(msg),
    })
}

fn put_len_u8(out: &mut BytesMut, n: usize, what: &str) -> Result<(), NgapCodecError> {
    let n = u8::try_from(n).map_err(|_| NgapCodecError::EncodeError(format!("{n} {what}")))?;
    out.put_u8(n);
    Ok(())
}

fn put_bytes_u16(out: &mut BytesMut, data: &[u8]) -> Result<(), NgapCodecError> {
    let n = u16::try_from(data.len())
        .map_err(|_| NgapCodecError::EncodeError(format!("{} byte field", data.len())))?;
    out.put_u16(n);
    out.put_slice(data);
    Ok(())
}

fn put_snssai(out: &mut BytesMut, slice: &SNssai) {
    match slice.sd_bytes() {
        Some(sd) => {
            out.put_u8(4);
            out.put_u8(slice.sst);
            out.put_slice(&sd);
        }
        None => {
            out.put_u8(1);
            out.put_u8(slice.sst);
        }
    }
}

fn put_slices(out: &mut BytesMut, slices: &[SNssai]) -> Result<(), NgapCodecError> {
    put_len_u8(out, slices.len(), "slices")?;
    for slice in slices {
        put_snssai(out, slice);
    }
    Ok(())
}

fn put_guami(out: &mut BytesMut, guami: &Guami) {
    out.put_slice(&guami.plmn.encode());
    out.put_slice(&guami.amf_id_bytes());
}

fn put_optional_u8(out: &mut BytesMut, value: Option<u8>) {
    match value {
        Some(v) => {
            out.put_u8(1);
            out.put_u8(v);
        }
        None => out.put_u8(0),
    }
}

fn line_type_code(line_type: LineType) -> u8 {
    match line_type {
        LineType::Dsl => 0,
        LineType::Pon => 1,
    }
}

fn encode_cause(out: &mut BytesMut, cause: &Cause) {
    let (group, value) = match *cause {
        Cause::RadioNetwork(v) => (0, v),
        Cause::Transport(v) => (1, v),
        Cause::Nas(v) => (2, v),
        Cause::Protocol(v) => (3, v),
        Cause::Misc(v) => (4, v),
    };
    out.put_u8(group);
    out.put_u8(value);
}

fn encode_value(value: &IeValue, out: &mut BytesMut) -> Result<(), NgapCodecError> {
    match value {
        IeValue::AmfUeNgapId(id) => out.put_u64(*id),
        IeValue::RanUeNgapId(id) => out.put_u32(*id),
        IeValue::NasPdu(data) | IeValue::UeRadioCapability(data) | IeValue::Raw(data) => {
            out.put_slice(data)
        }
        IeValue::Name(name) => out.put_slice(name.as_bytes()),
        IeValue::Guami(guami) => put_guami(out, guami),
        IeValue::ServedGuamiList(list) => {
            put_len_u8(out, list.len(), "served GUAMIs")?;
            for guami in list {
                put_guami(out, guami);
            }
        }
        IeValue::RelativeAmfCapacity(capacity) => out.put_u8(*capacity),
        IeValue::PlmnSupportList(list) => {
            put_len_u8(out, list.len(), "PLMN support items")?;
            for item in list {
                out.put_slice(&item.plmn.encode());
                put_slices(out, &item.slices)?;
            }
        }
        IeValue::AllowedNssai(slices) => put_slices(out, slices)?,
        IeValue::SecurityKey(key) => out.put_slice(key),
        IeValue::UeSecurityCapabilities(caps) => {
            out.put_u16(caps.nr_encryption);
            out.put_u16(caps.nr_integrity);
            out.put_u16(caps.eutra_encryption);
            out.put_u16(caps.eutra_integrity);
        }
        IeValue::UserLocationInformation(uli) => {
            put_bytes_u16(out, &uli.global_line_id)?;
            put_optional_u8(out, uli.line_type.map(line_type_code));
        }
        IeValue::UeAggregateMaximumBitRate(ambr) => {
            out.put_u64(ambr.dl);
            out.put_u64(ambr.ul);
        }
        IeValue::Cause(cause) => encode_cause(out, cause),
        IeValue::UeNgapIds(ids) => match *ids {
            UeNgapIds::Pair {
                amf_ue_ngap_id,
                ran_ue_ngap_id,
            } => {
                out.put_u8(0);
                out.put_u64(amf_ue_ngap_id);
                out.put_u32(ran_ue_ngap_id);
            }
            UeNgapIds::AmfOnly(amf_ue_ngap_id) => {
                out.put_u8(1);
                out.put_u64(amf_ue_ngap_id);
            }
        },
        IeValue::PduSessionResourceSetupListSuReq(items) => {
            put_len_u8(out, items.len(), "setup items")?;
            for item in items {
                out.put_u8(item.pdu_session_id);
                put_snssai(out, &item.snssai);
                match &item.nas_pdu {
                    Some(nas) => {
                        out.put_u8(1);
                        put_bytes_u16(out, nas)?;
                    }
                    None => out.put_u8(0),
                }
                put_bytes_u16(out, &item.transfer)?;
            }
        }
        IeValue::PduSessionResourceList(items) => {
            put_len_u8(out, items.len(), "session items")?;
            for item in items {
                out.put_u8(item.pdu_session_id);
                put_bytes_u16(out, &item.transfer)?;
            }
        }
        IeValue::OverloadResponse(action) => out.put_u8((*action).into()),
        IeValue::TrafficLoadReductionIndication(value) => out.put_u8(*value),
        IeValue::OverloadStartNssaiList(items) => {
            put_len_u8(out, items.len(), "slice overload items")?;
            for item in items {
                put_slices(out, &item.slices)?;
                put_optional_u8(out, item.action.map(u8::from));
                put_optional_u8(out, item.traffic_load_reduction);
            }
        }
    }
    Ok(())
}

/// Bounds-checked reader that reports absolute offsets.
struct Reader<'a> {
    buf: &'a [u8],
    base: usize,
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, base: 0, pos: 0 }
    }

    fn offset(&self) -> usize {
        self.base + self.pos
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn error(&self, reason: String) -> NgapCodecError {
        NgapCodecError::DecodeError {
            offset: self.offset(),
            reason,
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], NgapCodecError> {
        if self.remaining() < n {
            return Err(NgapCodecError::Truncated {
                offset: self.offset(),
                needed: n - self.remaining(),
            });
        }
        let buf: &'a [u8] = self.buf;
        let out = &buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, NgapCodecError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, NgapCodecError> {
        Ok(self.take(2)?.get_u16())
    }

    fn u32(&mut self) -> Result<u32, NgapCodecError> {
        Ok(self.take(4)?.get_u32())
    }

    fn u64(&mut self) -> Result<u64, NgapCodecError> {
        Ok(self.take(8)?.get_u64())
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], NgapCodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn rest(&mut self) -> &'a [u8] {
        let buf: &'a [u8] = self.buf;
        let out = &buf[self.pos..];
        self.pos = buf.len();
        out
    }

    fn criticality(&mut self) -> Result<Criticality, NgapCodecError> {
        let value = self.u8()?;
        Criticality::try_from(value).map_err(|_| self.error(format!("criticality {value}")))
    }

    fn bytes_u16(&mut self) -> Result<Vec<u8>, NgapCodecError> {
        let len = self.u16()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn optional_u8(&mut self) -> Result<Option<u8>, NgapCodecError> {
        match self.u8()? {
            0 => Ok(None),
            _ => Ok(Some(self.u8()?)),
        }
    }

    fn snssai(&mut self) -> Result<SNssai, NgapCodecError> {
        match self.u8()? {
            1 => Ok(SNssai::new(self.u8()?)),
            4 => {
                let sst = self.u8()?;
                Ok(SNssai::from_parts(sst, Some(self.array::<3>()?)))
            }
            len => Err(self.error(format!("S-NSSAI length {len}"))),
        }
    }

    fn slices(&mut self) -> Result<Vec<SNssai>, NgapCodecError> {
        let count = self.u8()?;
        (0..count).map(|_| self.snssai()).collect()
    }

    fn guami(&mut self) -> Result<Guami, NgapCodecError> {
        let plmn = Plmn::decode(self.array::<3>()?);
        Ok(Guami::from_amf_id_bytes(plmn, self.array::<3>()?))
    }

    fn string(&mut self) -> Result<String, NgapCodecError> {
        let offset = self.offset();
        String::from_utf8(self.rest().to_vec()).map_err(|e| NgapCodecError::DecodeError {
            offset,
            reason: format!("name is not UTF-8: {e}"),
        })
    }
}

fn decode_value(present: u8, r: &mut Reader<'_>) -> Result<IeValue, NgapCodecError> {
    let value = match present {
        0 => IeValue::Raw(r.rest().to_vec()),
        1 => IeValue::AmfUeNgapId(r.u64()?),
        2 => IeValue::RanUeNgapId(r.u32()?),
        3 => IeValue::NasPdu(r.rest().to_vec()),
        4 => IeValue::Name(r.string()?),
        5 => IeValue::Guami(r.guami()?),
        6 => {
            let count = r.u8()?;
            IeValue::ServedGuamiList((0..count).map(|_| r.guami()).collect::<Result<_, _>>()?)
        }
        7 => IeValue::RelativeAmfCapacity(r.u8()?),
        8 => {
            let count = r.u8()?;
            let mut list = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let plmn = Plmn::decode(r.array::<3>()?);
                list.push(PlmnSupport {
                    plmn,
                    slices: r.slices()?,
                });
            }
            IeValue::PlmnSupportList(list)
        }
        9 => IeValue::AllowedNssai(r.slices()?),
        10 => IeValue::SecurityKey(r.array::<32>()?),
        11 => IeValue::UeSecurityCapabilities(UeSecurityCapabilities {
            nr_encryption: r.u16()?,
            nr_integrity: r.u16()?,
            eutra_encryption: r.u16()?,
            eutra_integrity: r.u16()?,
        }),
        12 => {
            let global_line_id = r.bytes_u16()?;
            let line_type = match r.optional_u8()? {
                None => None,
                Some(0) => Some(LineType::Dsl),
                Some(1) => Some(LineType::Pon),
                Some(other) => return Err(r.error(format!("line type {other}"))),
            };
            IeValue::UserLocationInformation(UserLocationInformation {
                global_line_id,
                line_type,
            })
        }
        13 => IeValue::UeAggregateMaximumBitRate(UeAmbr {
            dl: r.u64()?,
            ul: r.u64()?,
        }),
        14 => IeValue::UeRadioCapability(r.rest().to_vec()),
        15 => {
            let group = r.u8()?;
            let value = r.u8()?;
            IeValue::Cause(match group {
                0 => Cause::RadioNetwork(value),
                1 => Cause::Transport(value),
                2 => Cause::Nas(value),
                3 => Cause::Protocol(value),
                4 => Cause::Misc(value),
                other => return Err(r.error(format!("cause group {other}"))),
            })
        }
        16 => IeValue::UeNgapIds(match r.u8()? {
            0 => UeNgapIds::Pair {
                amf_ue_ngap_id: r.u64()?,
                ran_ue_ngap_id: r.u32()?,
            },
            1 => UeNgapIds::AmfOnly(r.u64()?),
            other => return Err(r.error(format!("UE-NGAP-IDs choice {other}"))),
        }),
        17 => {
            let count = r.u8()?;
            let mut items = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let pdu_session_id = r.u8()?;
                let snssai = r.snssai()?;
                let nas_pdu = match r.u8()? {
                    0 => None,
                    _ => Some(r.bytes_u16()?),
                };
                items.push(PduSessionResourceSetupItem {
                    pdu_session_id,
                    nas_pdu,
                    snssai,
                    transfer: r.bytes_u16()?,
                });
            }
            IeValue::PduSessionResourceSetupListSuReq(items)
        }
        18 => {
            let count = r.u8()?;
            let mut items = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let pdu_session_id = r.u8()?;
                items.push(PduSessionResourceItem {
                    pdu_session_id,
                    transfer: r.bytes_u16()?,
                });
            }
            IeValue::PduSessionResourceList(items)
        }
        19 => {
            let value = r.u8()?;
            IeValue::OverloadResponse(
                OverloadAction::try_from(value)
                    .map_err(|_| r.error(format!("overload action {value}")))?,
            )
        }
        20 => IeValue::TrafficLoadReductionIndication(r.u8()?),
        21 => {
            let count = r.u8()?;
            let mut items = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let slices = r.slices()?;
                let action = match r.optional_u8()? {
                    None => None,
                    Some(value) => Some(
                        OverloadAction::try_from(value)
                            .map_err(|_| r.error(format!("overload action {value}")))?,
                    ),
                };
                items.push(SliceOverloadItem {
                    slices,
                    action,
                    traffic_load_reduction: r.optional_u8()?,
                });
            }
            IeValue::OverloadStartNssaiList(items)
        }
        other => return Err(r.error(format!("unknown present tag {other}"))),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_message() -> NgapPdu {
        let mut msg = NgapMessage::new(ProcedureCode::InitialContextSetup, Criticality::Reject);
        msg.push(ProtocolIeId::AmfUeNgapId, Criticality::Reject, IeValue::AmfUeNgapId(1));
        msg.push(ProtocolIeId::RanUeNgapId, Criticality::Reject, IeValue::RanUeNgapId(2));
        msg.push(
            ProtocolIeId::Guami,
            Criticality::Reject,
            IeValue::Guami(Guami::new(Plmn::new(207, 90, false), 0x45, 0x115, 0x11)),
        );
        msg.push(
            ProtocolIeId::AllowedNssai,
            Criticality::Reject,
            IeValue::AllowedNssai(vec![SNssai::with_sd(1, 0x010203), SNssai::new(2)]),
        );
        msg.push(
            ProtocolIeId::UserLocationInformation,
            Criticality::Ignore,
            IeValue::UserLocationInformation(UserLocationInformation {
                global_line_id: b"AQM5ODcCBDQ1Njc=".to_vec(),
                line_type: Some(LineType::Pon),
            }),
        );
        msg.push(
            ProtocolIeId::Cause,
            Criticality::Ignore,
            IeValue::Cause(Cause::RADIO_NETWORK_UNSPECIFIED),
        );
        NgapPdu::InitiatingMessage(msg)
    }

    #[test]
    fn test_encode_decode_preserves_ie_order() {
        let pdu = sample_message();
        let bytes = TlvCodec.encode(&pdu).unwrap();
        assert_eq!(&bytes[..5], &[0x00, 14, 0x00, 0x00, 6]);
        let decoded = TlvCodec.decode(&bytes).unwrap();
        assert_eq!(decoded, pdu);
    }

    #[test]
    fn test_ie_header_layout() {
        let mut msg = NgapMessage::new(ProcedureCode::UplinkNasTransport, Criticality::Ignore);
        msg.push(ProtocolIeId::RanUeNgapId, Criticality::Reject, IeValue::RanUeNgapId(5));
        let bytes = encode_ngap_pdu(&NgapPdu::InitiatingMessage(msg)).unwrap();
        assert_eq!(
            bytes,
            vec![0, 46, 1, 0, 1, 0, 85, 0, 2, 0, 4, 0, 0, 0, 5]
        );
    }

    #[test]
    fn test_truncated_input() {
        let bytes = encode_ngap_pdu(&sample_message()).unwrap();
        let err = decode_ngap_pdu(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(matches!(err, NgapCodecError::Truncated { .. }));
    }

    #[test]
    fn test_unknown_present_tag() {
        let bytes = [0, 4, 0, 0, 1, 0, 10, 0, 99, 0, 0];
        let err = decode_ngap_pdu(&bytes).unwrap_err();
        assert_eq!(
            err,
            NgapCodecError::DecodeError {
                offset: 11,
                reason: "unknown present tag 99".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_ids_survive() {
        let mut msg = NgapMessage::new(ProcedureCode::Other(200), Criticality::Notify);
        msg.push(ProtocolIeId::Other(4000), Criticality::Ignore, IeValue::Raw(vec![1, 2, 3]));
        let pdu = NgapPdu::UnsuccessfulOutcome(msg);
        assert_eq!(decode_ngap_pdu(&encode_ngap_pdu(&pdu).unwrap()).unwrap(), pdu);
    }
}
