//! Core 5G value types: PLMN, S-NSSAI, GUAMI and PLMN support entries.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Public Land Mobile Network identifier.
///
/// `long_mnc` selects a 3-digit MNC; otherwise the MNC has 2 digits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Plmn {
    /// Mobile Country Code (3 digits)
    pub mcc: u16,
    /// Mobile Network Code (2-3 digits)
    pub mnc: u16,
    /// True if MNC is 3 digits
    #[serde(default)]
    pub long_mnc: bool,
}

impl Plmn {
    /// Creates a new PLMN.
    pub const fn new(mcc: u16, mnc: u16, long_mnc: bool) -> Self {
        Self { mcc, mnc, long_mnc }
    }

    /// Parses decimal MCC / MNC strings; the MNC length decides `long_mnc`.
    pub fn from_strings(mcc: &str, mnc: &str) -> Result<Self, Error> {
        let parse = |s: &str| {
            if s.is_empty() || s.len() > 3 || !s.bytes().all(|b| b.is_ascii_digit()) {
                return Err(Error::InvalidValue(format!("bad PLMN digits: {s:?}")));
            }
            s.parse::<u16>()
                .map_err(|e| Error::InvalidValue(format!("bad PLMN digits {s:?}: {e}")))
        };
        if mcc.len() != 3 || mnc.len() < 2 {
            return Err(Error::InvalidValue(format!("bad PLMN {mcc}/{mnc}")));
        }
        Ok(Self::new(parse(mcc)?, parse(mnc)?, mnc.len() == 3))
    }

    /// Encodes the PLMN in the 3-octet TBCD form of TS 24.008.
    pub fn encode(&self) -> [u8; 3] {
        let mcc1 = ((self.mcc / 100) % 10) as u8;
        let mcc2 = ((self.mcc / 10) % 10) as u8;
        let mcc3 = (self.mcc % 10) as u8;

        let (mnc1, mnc2, mnc3) = if self.long_mnc {
            (
                ((self.mnc / 100) % 10) as u8,
                ((self.mnc / 10) % 10) as u8,
                (self.mnc % 10) as u8,
            )
        } else {
            (((self.mnc / 10) % 10) as u8, (self.mnc % 10) as u8, 0x0F)
        };

        [(mcc2 << 4) | mcc1, (mnc3 << 4) | mcc3, (mnc2 << 4) | mnc1]
    }

    /// Decodes the 3-octet TBCD form.
    pub fn decode(bytes: [u8; 3]) -> Self {
        let mcc1 = (bytes[0] & 0x0F) as u16;
        let mcc2 = (bytes[0] >> 4) as u16;
        let mcc3 = (bytes[1] & 0x0F) as u16;
        let mnc3 = bytes[1] >> 4;
        let mnc1 = (bytes[2] & 0x0F) as u16;
        let mnc2 = (bytes[2] >> 4) as u16;

        let mcc = 100 * mcc1 + 10 * mcc2 + mcc3;
        if mnc3 == 0x0F {
            Self::new(mcc, 10 * mnc1 + mnc2, false)
        } else {
            Self::new(mcc, 100 * mnc1 + 10 * mnc2 + mnc3 as u16, true)
        }
    }
}

impl fmt::Debug for Plmn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Plmn({self})")
    }
}

impl fmt::Display for Plmn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.long_mnc {
            write!(f, "{:03}-{:03}", self.mcc, self.mnc)
        } else {
            write!(f, "{:03}-{:02}", self.mcc, self.mnc)
        }
    }
}

/// Single Network Slice Selection Assistance Information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SNssai {
    /// Slice/Service Type
    pub sst: u8,
    /// Slice Differentiator (24 bits)
    #[serde(default)]
    pub sd: Option<u32>,
}

impl SNssai {
    /// Slice without a differentiator.
    pub const fn new(sst: u8) -> Self {
        Self { sst, sd: None }
    }

    /// Slice with a 24-bit differentiator.
    pub const fn with_sd(sst: u8, sd: u32) -> Self {
        Self {
            sst,
            sd: Some(sd & 0x00FF_FFFF),
        }
    }

    /// SD as three big-endian octets.
    pub fn sd_bytes(&self) -> Option<[u8; 3]> {
        self.sd.map(|sd| [(sd >> 16) as u8, (sd >> 8) as u8, sd as u8])
    }

    /// Builds a slice from SST and optional SD octets.
    pub fn from_parts(sst: u8, sd: Option<[u8; 3]>) -> Self {
        Self {
            sst,
            sd: sd.map(|b| (b[0] as u32) << 16 | (b[1] as u32) << 8 | b[2] as u32),
        }
    }
}

impl fmt::Display for SNssai {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sd {
            Some(sd) => write!(f, "sst={} sd={sd:06x}", self.sst),
            None => write!(f, "sst={}", self.sst),
        }
    }
}

/// Globally Unique AMF Identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Guami {
    pub plmn: Plmn,
    /// AMF Region ID (8 bits)
    pub region_id: u8,
    /// AMF Set ID (10 bits)
    pub set_id: u16,
    /// AMF Pointer (6 bits)
    pub pointer: u8,
}

impl Guami {
    pub const fn new(plmn: Plmn, region_id: u8, set_id: u16, pointer: u8) -> Self {
        Self {
            plmn,
            region_id,
            set_id: set_id & 0x03FF,
            pointer: pointer & 0x3F,
        }
    }

    /// AMF identifier octets: region, then set id (10 bits) and pointer (6 bits).
    pub fn amf_id_bytes(&self) -> [u8; 3] {
        let packed = ((self.set_id & 0x03FF) << 6) | (self.pointer & 0x3F) as u16;
        [self.region_id, (packed >> 8) as u8, packed as u8]
    }

    /// Rebuilds a GUAMI from PLMN octets and the AMF identifier octets.
    pub fn from_amf_id_bytes(plmn: Plmn, amf_id: [u8; 3]) -> Self {
        let packed = (amf_id[1] as u16) << 8 | amf_id[2] as u16;
        Self::new(plmn, amf_id[0], packed >> 6, (packed & 0x3F) as u8)
    }

    /// True when both GUAMIs name the same AMF.
    pub fn same_amf(&self, other: &Guami) -> bool {
        self == other
    }
}

impl fmt::Display for Guami {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{:02x}-{:03x}-{:02x}",
            self.plmn, self.region_id, self.set_id, self.pointer
        )
    }
}

/// One PLMN and the slices the AMF serves in it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlmnSupport {
    pub plmn: Plmn,
    #[serde(default)]
    pub slices: Vec<SNssai>,
}
