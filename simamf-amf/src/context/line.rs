//! Residential gateway line attachment
//!
//! Validation follows TR-470 Figure 18 (global line identifier) and
//! TS 23.316 for the access line descriptors.

use simamf_common::config::{LineType, RgType};
use simamf_common::SubscriberProfile;
use simamf_nas::{wireline_mobile_identity, GlobalLineId, MobileIdentity};
use thiserror::Error;

/// Longest circuit or remote id.
pub const MAX_LINE_COMPONENT_LEN: usize = 0x3f;
/// Longest raw line id.
pub const MAX_LINE_ID_LEN: usize = 130;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineError {
    #[error("no circuit id, remote id or line id")]
    NoLineIdentity,

    #[error("{field} is {len} bytes, limit {limit}")]
    TooLong {
        field: &'static str,
        len: usize,
        limit: usize,
    },

    #[error("{field} has a non printable byte 0x{byte:02x}")]
    NonPrintable { field: &'static str, byte: u8 },

    #[error("line id given together with circuit/remote ids")]
    AmbiguousLineId,

    #[error("malformed line id: {0}")]
    MalformedLineId(String),

    #[error("MAC address is mandatory")]
    MissingMac,

    #[error("bad MAC address {0:?}")]
    BadMac(String),
}

/// Line descriptors of the residential gateway behind a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineProfile {
    pub rg_type: RgType,
    pub line_type: LineType,
    pub mac: String,
    pub circuit_id: Option<String>,
    pub remote_id: Option<String>,
    /// Pre-built line id, exclusive with circuit/remote ids
    pub line_id: Option<Vec<u8>>,
}

impl LineProfile {
    pub fn from_profile(profile: &SubscriberProfile) -> Self {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Self {
            rg_type: profile.rg_type,
            line_type: profile.line_type,
            mac: profile.mac.clone(),
            circuit_id: non_empty(&profile.circuit_id),
            remote_id: non_empty(&profile.remote_id),
            line_id: None,
        }
    }

    /// RG type and line type are closed enums, so only the identifiers
    /// and the MAC address need checking.
    pub fn validate(&self) -> Result<(), LineError> {
        if self.circuit_id.is_none() && self.remote_id.is_none() && self.line_id.is_none() {
            return Err(LineError::NoLineIdentity);
        }
        if self.line_id.is_some() && (self.circuit_id.is_some() || self.remote_id.is_some()) {
            return Err(LineError::AmbiguousLineId);
        }
        if let Some(line_id) = &self.line_id {
            check_len("line id", line_id.len(), MAX_LINE_ID_LEN)?;
            let parsed = GlobalLineId::from_line_id(line_id)
                .map_err(|e| LineError::MalformedLineId(e.to_string()))?;
            for (field, value) in [("circuit id", parsed.circuit_id()), ("remote id", parsed.remote_id())] {
                if let Some(value) = value {
                    check_component(field, value)?;
                }
            }
        }
        if let Some(circuit) = &self.circuit_id {
            check_component("circuit id", circuit.as_bytes())?;
        }
        if let Some(remote) = &self.remote_id {
            check_component("remote id", remote.as_bytes())?;
        }
        if self.mac.is_empty() {
            return Err(LineError::MissingMac);
        }
        self.mac_bytes()?;
        Ok(())
    }

    pub fn mac_bytes(&self) -> Result<[u8; 6], LineError> {
        let bad = || LineError::BadMac(self.mac.clone());
        let parts: Vec<&str> = self.mac.split(':').collect();
        if parts.len() != 6 {
            return Err(bad());
        }
        let mut out = [0u8; 6];
        for (slot, part) in out.iter_mut().zip(parts) {
            *slot = u8::from_str_radix(part, 16).map_err(|_| bad())?;
        }
        Ok(out)
    }

    /// Derived global line id, `None` when the line carries no identifier.
    pub fn global_line_id(&self) -> Option<GlobalLineId> {
        let gli = match &self.line_id {
            Some(raw) => GlobalLineId::from_line_id(raw).ok()?,
            None => {
                GlobalLineId::from_components(self.circuit_id.as_deref(), self.remote_id.as_deref())
            }
        };
        (!gli.is_empty()).then_some(gli)
    }

    /// Identity used in registration and deregistration requests.
    pub fn mobile_identity(&self) -> MobileIdentity {
        wireline_mobile_identity(self.global_line_id().as_ref(), self.mac_bytes().ok())
    }
}

fn check_len(field: &'static str, len: usize, limit: usize) -> Result<(), LineError> {
    if len > limit {
        return Err(LineError::TooLong { field, len, limit });
    }
    Ok(())
}

fn check_component(field: &'static str, value: &[u8]) -> Result<(), LineError> {
    check_len(field, value.len(), MAX_LINE_COMPONENT_LEN)?;
    match value.iter().find(|b| !(0x20..=0x7e).contains(*b)) {
        Some(&byte) => Err(LineError::NonPrintable { field, byte }),
        None => Ok(()),
    }
}
