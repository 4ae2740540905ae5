//! Engine error taxonomy
//!
//! Every handler returns `Result<_, AmfError>`. None of these variants is
//! fatal to the process: the dispatcher logs them and drops the offending
//! transition, and only [`AmfError::Transport`] ends an association.

use simamf_common::ConfigError;
use simamf_nas::{NasError, QosRuleError};
use simamf_ngap::{NgapCodecError, ProcedureError};
use thiserror::Error;

use crate::context::line::LineError;
use crate::io::TransportError;
use crate::state::MobilityState;

/// Malformed input at one of the three wire layers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("NGAP: {0}")]
    Ngap(#[from] NgapCodecError),

    #[error("NAS: {0}")]
    Nas(NasError),

    #[error("QoS rules: {0}")]
    QosRules(#[from] QosRuleError),
}

#[derive(Debug, Error)]
pub enum AmfError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Missing security context or an algorithm the engine cannot run.
    #[error("Security failure: {0}")]
    Security(String),

    #[error("No free PDU session id")]
    ResourceExhausted,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Protocol violation: {0}")]
    ProtocolViolation(#[from] ProcedureError),

    #[error("Invalid mobility transition {from} -> {to}")]
    InvalidTransition { from: MobilityState, to: MobilityState },

    #[error("Invalid line profile: {0}")]
    InvalidLine(#[from] LineError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl From<NasError> for AmfError {
    fn from(err: NasError) -> Self {
        match err {
            NasError::Crypto(e) => AmfError::Security(e.to_string()),
            NasError::QosRules(e) => AmfError::Decode(DecodeError::QosRules(e)),
            other => AmfError::Decode(DecodeError::Nas(other)),
        }
    }
}

impl From<NgapCodecError> for AmfError {
    fn from(err: NgapCodecError) -> Self {
        AmfError::Decode(DecodeError::Ngap(err))
    }
}

impl From<QosRuleError> for AmfError {
    fn from(err: QosRuleError) -> Self {
        AmfError::Decode(DecodeError::QosRules(err))
    }
}

impl AmfError {
    /// True for errors that end the association rather than one transition.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AmfError::Transport(_))
    }
}
