//! NAS information elements used by the engine's messages.

use bytes::{BufMut, BytesMut};
use simamf_common::{Guami, Plmn, SNssai};

use crate::codec::{get_u16, get_u8, need, take};
use crate::error::NasError;

/// NAS key set identifier: type of security context flag plus 3-bit KSI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NgKsi {
    /// True for a mapped security context, false for native
    pub mapped: bool,
    pub ksi: u8,
}

impl NgKsi {
    pub const NO_KEY: u8 = 0x07;

    pub fn native(ksi: u8) -> Self {
        Self {
            mapped: false,
            ksi: ksi & 0x07,
        }
    }

    /// Native context with KSI 7, "no key is available".
    pub fn no_key() -> Self {
        Self::native(Self::NO_KEY)
    }

    /// Half-octet value: TSC in bit 4, KSI in bits 1-3.
    pub fn to_nibble(self) -> u8 {
        ((self.mapped as u8) << 3) | (self.ksi & 0x07)
    }

    pub fn from_nibble(nibble: u8) -> Self {
        Self {
            mapped: nibble & 0x08 != 0,
            ksi: nibble & 0x07,
        }
    }
}

impl Default for NgKsi {
    fn default() -> Self {
        Self::no_key()
    }
}

/// UE security capability, TS 24.501 9.11.3.54 (5G octets plus optional EPS octets).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UeSecurityCapability {
    /// 5G-EA0..5G-EA7 bitmap, EA0 in bit 8
    pub nr_ea: u8,
    /// 5G-IA0..5G-IA7 bitmap, IA0 in bit 8
    pub nr_ia: u8,
    pub eps: Option<[u8; 2]>,
}

impl UeSecurityCapability {
    /// EA0 and IA0 only.
    pub fn null_only() -> Self {
        Self {
            nr_ea: 0x80,
            nr_ia: 0x80,
            eps: None,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.nr_ea, self.nr_ia];
        if let Some(eps) = self.eps {
            out.extend_from_slice(&eps);
        }
        out
    }

    pub fn decode(value: &[u8]) -> Result<Self, NasError> {
        need(value, 2)?;
        Ok(Self {
            nr_ea: value[0],
            nr_ia: value[1],
            eps: (value.len() >= 4).then(|| [value[2], value[3]]),
        })
    }
}

/// 5G-GUTI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Guti5g {
    pub guami: Guami,
    pub tmsi: u32,
}

/// 5GS mobile identity, TS 24.501 9.11.3.4.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MobileIdentity {
    NoIdentity,
    /// SUCI; `body` is the NAI for non-IMSI SUPI formats and the raw
    /// scheme output for IMSI.
    Suci { supi_format: u8, body: Vec<u8> },
    Guti(Guti5g),
    Mac([u8; 6]),
    /// Any other identity type, kept undecoded.
    Other(Vec<u8>),
}

const IDENTITY_TYPE_SUCI: u8 = 0x01;
const IDENTITY_TYPE_GUTI: u8 = 0x02;
const IDENTITY_TYPE_MAC: u8 = 0x06;

/// SUPI format for a global line identifier.
pub const SUPI_FORMAT_GLI: u8 = 0x03;

impl MobileIdentity {
    /// Identity contents (the value part of the LV-E).
    pub fn encode(&self) -> Vec<u8> {
        match self {
            MobileIdentity::NoIdentity => vec![0x00],
            MobileIdentity::Suci { supi_format, body } => {
                let mut out = Vec::with_capacity(1 + body.len());
                out.push(((supi_format & 0x07) << 4) | IDENTITY_TYPE_SUCI);
                out.extend_from_slice(body);
                out
            }
            MobileIdentity::Guti(guti) => {
                let mut out = Vec::with_capacity(11);
                out.push(0xF0 | IDENTITY_TYPE_GUTI);
                out.extend_from_slice(&guti.guami.plmn.encode());
                out.extend_from_slice(&guti.guami.amf_id_bytes());
                out.extend_from_slice(&guti.tmsi.to_be_bytes());
                out
            }
            // bit 4 marks MAC address usage restriction
            MobileIdentity::Mac(mac) => {
                let mut out = Vec::with_capacity(7);
                out.push(0x08 | IDENTITY_TYPE_MAC);
                out.extend_from_slice(mac);
                out
            }
            MobileIdentity::Other(raw) => raw.clone(),
        }
    }

    pub fn decode(value: &[u8]) -> Result<Self, NasError> {
        need(value, 1)?;
        let first = value[0];
        match first & 0x07 {
            0x00 => Ok(MobileIdentity::NoIdentity),
            IDENTITY_TYPE_SUCI => Ok(MobileIdentity::Suci {
                supi_format: (first >> 4) & 0x07,
                body: value[1..].to_vec(),
            }),
            IDENTITY_TYPE_GUTI => {
                need(value, 11)?;
                let plmn = Plmn::decode([value[1], value[2], value[3]]);
                let guami = Guami::from_amf_id_bytes(plmn, [value[4], value[5], value[6]]);
                let tmsi = u32::from_be_bytes([value[7], value[8], value[9], value[10]]);
                Ok(MobileIdentity::Guti(Guti5g { guami, tmsi }))
            }
            IDENTITY_TYPE_MAC => {
                need(value, 7)?;
                let mut mac = [0u8; 6];
                mac.copy_from_slice(&value[1..7]);
                Ok(MobileIdentity::Mac(mac))
            }
            _ => Ok(MobileIdentity::Other(value.to_vec())),
        }
    }

    /// The NAI carried by a non-IMSI SUCI, if any.
    pub fn nai(&self) -> Option<&str> {
        match self {
            MobileIdentity::Suci { supi_format, body } if *supi_format != 0 => {
                std::str::from_utf8(body).ok()
            }
            _ => None,
        }
    }
}

/// S-NSSAI contents (without IEI/length).
pub fn encode_snssai(slice: &SNssai) -> Vec<u8> {
    let mut out = vec![slice.sst];
    if let Some(sd) = slice.sd_bytes() {
        out.extend_from_slice(&sd);
    }
    out
}

pub fn decode_snssai(value: &[u8]) -> Result<SNssai, NasError> {
    match value.len() {
        1 => Ok(SNssai::new(value[0])),
        // mapped HPLMN fields after the SD are ignored
        4 | 5 | 8 => Ok(SNssai::from_parts(
            value[0],
            Some([value[1], value[2], value[3]]),
        )),
        2 => Ok(SNssai::new(value[0])),
        n => Err(NasError::Malformed(format!("S-NSSAI of length {n}"))),
    }
}

/// NSSAI contents: a sequence of length-prefixed S-NSSAIs.
pub fn encode_nssai(slices: &[SNssai]) -> Vec<u8> {
    let mut out = Vec::new();
    for slice in slices {
        let value = encode_snssai(slice);
        out.push(value.len() as u8);
        out.extend_from_slice(&value);
    }
    out
}

pub fn decode_nssai(mut value: &[u8]) -> Result<Vec<SNssai>, NasError> {
    let mut slices = Vec::new();
    while !value.is_empty() {
        let len = get_u8(&mut value)? as usize;
        slices.push(decode_snssai(take(&mut value, len)?)?);
    }
    Ok(slices)
}

/// DNN contents in length-prefixed label form.
pub fn encode_dnn(dnn: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(dnn.len() + 1);
    for label in dnn.split('.') {
        out.push(label.len() as u8);
        out.extend_from_slice(label.as_bytes());
    }
    out
}

pub fn decode_dnn(mut value: &[u8]) -> Result<String, NasError> {
    let mut labels = Vec::new();
    while !value.is_empty() {
        let len = get_u8(&mut value)? as usize;
        let label = take(&mut value, len)?;
        labels.push(String::from_utf8_lossy(label).into_owned());
    }
    Ok(labels.join("."))
}

/// Session-AMBR, TS 24.501 9.11.4.14.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionAmbr {
    pub dl_unit: u8,
    pub dl_value: u16,
    pub ul_unit: u8,
    pub ul_value: u16,
}

impl SessionAmbr {
    /// Unit code for multiples of 1 Mbps.
    pub const UNIT_1_MBPS: u8 = 0x06;

    pub fn mbps(dl: u16, ul: u16) -> Self {
        Self {
            dl_unit: Self::UNIT_1_MBPS,
            dl_value: dl,
            ul_unit: Self::UNIT_1_MBPS,
            ul_value: ul,
        }
    }

    pub fn encode(&self, out: &mut BytesMut) {
        out.put_u8(self.dl_unit);
        out.put_u16(self.dl_value);
        out.put_u8(self.ul_unit);
        out.put_u16(self.ul_value);
    }

    pub fn decode(mut value: &[u8]) -> Result<Self, NasError> {
        Ok(Self {
            dl_unit: get_u8(&mut value)?,
            dl_value: get_u16(&mut value)?,
            ul_unit: get_u8(&mut value)?,
            ul_value: get_u16(&mut value)?,
        })
    }
}
