//! NAS security algorithms for the simulated AMF
//!
//! Integrity (NIA) and ciphering (NEA) primitives keyed by the algorithm
//! numbers negotiated in Security Mode Command. NIA2/NEA2 (AES based) and
//! the null algorithms are implemented; the SNOW 3G and ZUC families are
//! recognised but report [`CryptoError::UnsupportedAlgorithm`].

pub mod nea;
pub mod nia;

use thiserror::Error;

/// Key size in bytes (128 bits)
pub const KEY_SIZE: usize = 16;

/// MAC size in bytes (32 bits)
pub const MAC_SIZE: usize = 4;

/// Bearer identity used for NAS over 3GPP access.
pub const BEARER_3GPP: u8 = 0x01;
/// Bearer identity used for NAS over non-3GPP access.
pub const BEARER_NON_3GPP: u8 = 0x02;

/// DIRECTION bit for uplink traffic.
pub const DIRECTION_UPLINK: u8 = 0;
/// DIRECTION bit for downlink traffic.
pub const DIRECTION_DOWNLINK: u8 = 1;

/// Errors raised by the algorithm dispatch functions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("unknown {kind} algorithm {value}")]
    UnknownAlgorithm { kind: &'static str, value: u8 },

    #[error("{0} is not supported")]
    UnsupportedAlgorithm(&'static str),
}

/// 5G NAS integrity algorithm identifiers (TS 33.501).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum IntegrityAlgorithm {
    #[default]
    Nia0 = 0,
    Nia1 = 1,
    Nia2 = 2,
    Nia3 = 3,
}

impl TryFrom<u8> for IntegrityAlgorithm {
    type Error = CryptoError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Nia0),
            1 => Ok(Self::Nia1),
            2 => Ok(Self::Nia2),
            3 => Ok(Self::Nia3),
            _ => Err(CryptoError::UnknownAlgorithm {
                kind: "integrity",
                value,
            }),
        }
    }
}

/// 5G NAS ciphering algorithm identifiers (TS 33.501).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum CipheringAlgorithm {
    #[default]
    Nea0 = 0,
    Nea1 = 1,
    Nea2 = 2,
    Nea3 = 3,
}

impl TryFrom<u8> for CipheringAlgorithm {
    type Error = CryptoError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Nea0),
            1 => Ok(Self::Nea1),
            2 => Ok(Self::Nea2),
            3 => Ok(Self::Nea3),
            _ => Err(CryptoError::UnknownAlgorithm {
                kind: "ciphering",
                value,
            }),
        }
    }
}

/// Computes the 32-bit NAS MAC with the selected algorithm.
///
/// NIA0 yields four zero bytes.
pub fn compute_mac(
    alg: IntegrityAlgorithm,
    key: &[u8; KEY_SIZE],
    count: u32,
    bearer: u8,
    direction: u8,
    data: &[u8],
) -> Result<[u8; MAC_SIZE], CryptoError> {
    match alg {
        IntegrityAlgorithm::Nia0 => Ok([0u8; MAC_SIZE]),
        IntegrityAlgorithm::Nia2 => Ok(nia::nia2_compute_mac(count, bearer, direction, key, data)),
        IntegrityAlgorithm::Nia1 => Err(CryptoError::UnsupportedAlgorithm("NIA1")),
        IntegrityAlgorithm::Nia3 => Err(CryptoError::UnsupportedAlgorithm("NIA3")),
    }
}

/// Applies the selected keystream to `data` in place.
///
/// Encryption and decryption are the same operation for every supported
/// algorithm. NEA0 leaves `data` untouched.
pub fn apply_cipher(
    alg: CipheringAlgorithm,
    key: &[u8; KEY_SIZE],
    count: u32,
    bearer: u8,
    direction: u8,
    data: &mut [u8],
) -> Result<(), CryptoError> {
    match alg {
        CipheringAlgorithm::Nea0 => Ok(()),
        CipheringAlgorithm::Nea2 => {
            nea::nea2_apply(count, bearer, direction, key, data);
            Ok(())
        }
        CipheringAlgorithm::Nea1 => Err(CryptoError::UnsupportedAlgorithm("NEA1")),
        CipheringAlgorithm::Nea3 => Err(CryptoError::UnsupportedAlgorithm("NEA3")),
    }
}
