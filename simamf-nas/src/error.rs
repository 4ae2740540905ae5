//! NAS codec errors

use simamf_crypto::CryptoError;
use thiserror::Error;

use crate::qos_rules::QosRuleError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NasError {
    #[error("Buffer too short: expected at least {expected} bytes, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },

    #[error("Invalid extended protocol discriminator: 0x{0:02X}")]
    InvalidEpd(u8),

    #[error("Invalid security header type: 0x{0:02X}")]
    InvalidSecurityHeaderType(u8),

    #[error("Unknown message type 0x{value:02X} for EPD 0x{epd:02X}")]
    UnknownMessageType { epd: u8, value: u8 },

    #[error("Invalid {ie} value 0x{value:02X}")]
    InvalidValue { ie: &'static str, value: u8 },

    #[error("Malformed {0}")]
    Malformed(String),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("QoS rules: {0}")]
    QosRules(#[from] QosRuleError),
}
