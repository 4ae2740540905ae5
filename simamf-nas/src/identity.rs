//! Global line identity of a wireline subscriber and the 5GS mobile
//! identity derived from it.
//!
//! ```text
//! Global line id:  | source "00077" (5) | line id (up to 130) |
//! Line id:         | 0x01 | len | circuit id | 0x02 | len | remote id |
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::NasError;
use crate::ies::{MobileIdentity, SUPI_FORMAT_GLI};

/// Operator administered line id source used by the simulated access node.
pub const LINE_ID_SOURCE: &str = "00077";

const TAG_CIRCUIT_ID: u8 = 0x01;
const TAG_REMOTE_ID: u8 = 0x02;

/// Realm used in the SUCI NAI.
pub const NAI_REALM: &str = "5gc.mnc123.mcc123.3gppnetwork.org";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GlobalLineId {
    line_id: Vec<u8>,
    circuit_id: Option<Vec<u8>>,
    remote_id: Option<Vec<u8>>,
}

impl GlobalLineId {
    /// Builds the line id from circuit and/or remote identifiers.
    pub fn from_components(circuit_id: Option<&str>, remote_id: Option<&str>) -> Self {
        let circuit_id = circuit_id.filter(|s| !s.is_empty()).map(|s| s.as_bytes().to_vec());
        let remote_id = remote_id.filter(|s| !s.is_empty()).map(|s| s.as_bytes().to_vec());

        let mut line_id = Vec::new();
        if let Some(circuit) = &circuit_id {
            line_id.push(TAG_CIRCUIT_ID);
            line_id.push(circuit.len() as u8);
            line_id.extend_from_slice(circuit);
        }
        if let Some(remote) = &remote_id {
            line_id.push(TAG_REMOTE_ID);
            line_id.push(remote.len() as u8);
            line_id.extend_from_slice(remote);
        }
        Self {
            line_id,
            circuit_id,
            remote_id,
        }
    }

    /// Parses a pre-built line id.
    pub fn from_line_id(raw: &[u8]) -> Result<Self, NasError> {
        let mut circuit_id = None;
        let mut remote_id = None;
        let mut rest = raw;
        while !rest.is_empty() {
            if rest.len() < 2 || rest.len() < 2 + rest[1] as usize {
                return Err(NasError::Malformed(format!("line id {}", hex::encode(raw))));
            }
            let len = rest[1] as usize;
            let value = rest[2..2 + len].to_vec();
            match rest[0] {
                TAG_CIRCUIT_ID => circuit_id = Some(value),
                TAG_REMOTE_ID => remote_id = Some(value),
                tag => {
                    return Err(NasError::InvalidValue {
                        ie: "line id component",
                        value: tag,
                    })
                }
            }
            rest = &rest[2 + len..];
        }
        Ok(Self {
            line_id: raw.to_vec(),
            circuit_id,
            remote_id,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.line_id.is_empty()
    }

    pub fn line_id(&self) -> &[u8] {
        &self.line_id
    }

    pub fn circuit_id(&self) -> Option<&[u8]> {
        self.circuit_id.as_deref()
    }

    pub fn remote_id(&self) -> Option<&[u8]> {
        self.remote_id.as_deref()
    }

    /// Source id followed by the line id.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = LINE_ID_SOURCE.as_bytes().to_vec();
        out.extend_from_slice(&self.line_id);
        out
    }

    /// Standard base64 of [`Self::to_bytes`]; also the octets sent in the
    /// NGAP GlobalLineID IE.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.to_bytes())
    }

    /// SUPI form: source, then `1<hex circuit>` and `2<hex remote>`.
    pub fn supi(&self) -> String {
        let mut supi = LINE_ID_SOURCE.to_string();
        if let Some(circuit) = &self.circuit_id {
            supi.push('1');
            supi.push_str(&hex::encode(circuit));
        }
        if let Some(remote) = &self.remote_id {
            supi.push('2');
            supi.push_str(&hex::encode(remote));
        }
        supi
    }

    pub fn suci_nai(&self) -> String {
        format!("type2.rid0.schid0.userid{}@{}", self.to_base64(), NAI_REALM)
    }
}

/// Mobile identity a wireline subscriber registers with: a GLI-format SUCI
/// when a line id exists, otherwise its MAC address.
pub fn wireline_mobile_identity(
    line: Option<&GlobalLineId>,
    mac: Option<[u8; 6]>,
) -> MobileIdentity {
    match (line.filter(|l| !l.is_empty()), mac) {
        (Some(line), _) => MobileIdentity::Suci {
            supi_format: SUPI_FORMAT_GLI,
            body: line.suci_nai().into_bytes(),
        },
        (None, Some(mac)) => MobileIdentity::Mac(mac),
        (None, None) => MobileIdentity::NoIdentity,
    }
}
