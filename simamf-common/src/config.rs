//! Simulator configuration
//!
//! `SimConfig` is read from YAML. Every section has defaults, so an empty
//! document yields the stock test AMF ("TestAMF1", PLMN 207/90) with the
//! 3GPP default timer values and the built-in test subscriber.
//!
//! # Example
//!
//! ```rust,ignore
//! use simamf_common::config::load_config;
//!
//! let config = load_config("config/simamf.yaml")?;
//! config.validate()?;
//! ```

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Guami, Plmn, PlmnSupport, SNssai};

/// NGAP payload protocol identifier as carried on the association.
pub const NGAP_PPID: u32 = 0x3c00_0000;

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File I/O error
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Semantic validation error
    #[error("Configuration validation failed: {0}")]
    Validation(String),
}

/// Top-level simulator configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub amf: AmfIdentityConfig,
    pub security: SecurityConfig,
    pub timers: TimerConfig,
    pub retries: RetryConfig,
    pub transport: TransportConfig,
    pub subscriber: SubscriberProfile,
}

/// What the simulated AMF advertises in NG Setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmfIdentityConfig {
    pub name: String,
    pub served_guamis: Vec<Guami>,
    pub relative_capacity: u8,
    pub plmn_support: Vec<PlmnSupport>,
    /// First AMF UE NGAP ID handed out to a new subscriber.
    pub ue_ngap_id_base: u32,
}

impl Default for AmfIdentityConfig {
    fn default() -> Self {
        let plmn = Plmn::new(207, 90, false);
        Self {
            name: "TestAMF1".to_string(),
            served_guamis: vec![Guami::new(plmn, 0x45, 0x115, 0x11)],
            relative_capacity: 200,
            plmn_support: vec![PlmnSupport {
                plmn,
                slices: vec![SNssai::with_sd(1, 0x010203), SNssai::with_sd(1, 0x112233)],
            }],
            ue_ngap_id_base: 1,
        }
    }
}

/// NAS security selection applied when the engine activates security.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Integrity algorithm number (0 = NIA0 .. 3 = NIA3)
    pub integrity: u8,
    /// Ciphering algorithm number (0 = NEA0 .. 3 = NEA3)
    pub ciphering: u8,
    /// KNASint as 32 hex digits
    pub knas_int: String,
    /// KNASenc as 32 hex digits
    pub knas_enc: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            integrity: 0,
            ciphering: 0,
            knas_int: "00".repeat(16),
            knas_enc: "00".repeat(16),
        }
    }
}

impl SecurityConfig {
    pub fn knas_int_bytes(&self) -> Result<[u8; 16], ConfigError> {
        decode_hex_key(&self.knas_int, "knas_int")
    }

    pub fn knas_enc_bytes(&self) -> Result<[u8; 16], ConfigError> {
        decode_hex_key(&self.knas_enc, "knas_enc")
    }
}

/// Mobility and session management timer values, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    pub t3502: u32,
    pub t3510: u32,
    pub t3511: u32,
    pub t3517: u32,
    pub t3521: u32,
    pub t3525: u32,
    pub t3540: u32,
    pub t3580: u32,
    pub t3582: u32,
    pub t3583: u32,
    pub non_3gpp_deregistration: u32,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            t3502: 720,
            t3510: 15,
            t3511: 10,
            t3517: 15,
            t3521: 15,
            t3525: 60,
            t3540: 10,
            t3580: 16,
            t3582: 16,
            t3583: 16,
            non_3gpp_deregistration: 3240,
        }
    }
}

/// Retry ceilings per procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub registration_retry: u32,
    pub registration_attempt: u32,
    pub service_attempt: u32,
    pub deregistration_retry: u32,
    pub t3580: u32,
    pub t3582: u32,
    pub t3583: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            registration_retry: 1,
            registration_attempt: 5,
            service_attempt: 1,
            deregistration_retry: 4,
            t3580: 5,
            t3582: 5,
            t3583: 5,
        }
    }
}

/// Association endpoint and write policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub listen_addr: SocketAddr,
    /// Fixed peer; when absent the first sender becomes the peer.
    pub peer_addr: Option<SocketAddr>,
    pub write_timeout_ms: u64,
    pub write_retries: u32,
    pub ppid: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 38412)),
            peer_addr: None,
            write_timeout_ms: 1000,
            write_retries: 3,
            ppid: NGAP_PPID,
        }
    }
}

impl TransportConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Access line type of a residential gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineType {
    #[default]
    Pon,
    Dsl,
}

/// Residential gateway flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RgType {
    /// Fixed-network RG behind a W-AGF
    #[default]
    #[serde(rename = "fn_rg")]
    FnRg,
    /// 5G-capable RG
    #[serde(rename = "5g_rg")]
    FiveGRg,
}

/// Built-in test subscriber used when a subscriber is created implicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriberProfile {
    /// MAC address in `aa:bb:cc:dd:ee:ff` form
    pub mac: String,
    pub circuit_id: String,
    pub remote_id: String,
    pub line_type: LineType,
    pub rg_type: RgType,
    /// 256-bit security key for the access node, hex encoded
    pub kwagf: String,
    pub ue_ambr_dl: u64,
    pub ue_ambr_ul: u64,
    pub slice: SNssai,
}

impl Default for SubscriberProfile {
    fn default() -> Self {
        Self {
            mac: "02:42:d5:32:74:11".to_string(),
            circuit_id: "987".to_string(),
            remote_id: "4567".to_string(),
            line_type: LineType::Pon,
            rg_type: RgType::FnRg,
            kwagf: "01".repeat(32),
            ue_ambr_dl: 200_000_000,
            ue_ambr_ul: 100_000_000,
            slice: SNssai::new(1),
        }
    }
}

impl SubscriberProfile {
    pub fn mac_bytes(&self) -> Result<[u8; 6], ConfigError> {
        let parts: Vec<&str> = self.mac.split(':').collect();
        if parts.len() != 6 {
            return Err(ConfigError::Validation(format!("bad MAC address {:?}", self.mac)));
        }
        let mut out = [0u8; 6];
        for (slot, part) in out.iter_mut().zip(parts) {
            *slot = u8::from_str_radix(part, 16)
                .map_err(|_| ConfigError::Validation(format!("bad MAC address {:?}", self.mac)))?;
        }
        Ok(out)
    }

    pub fn kwagf_bytes(&self) -> Result<[u8; 32], ConfigError> {
        let raw = hex::decode(&self.kwagf)
            .map_err(|e| ConfigError::Validation(format!("kwagf: {e}")))?;
        raw.try_into()
            .map_err(|_| ConfigError::Validation("kwagf must be 32 bytes".to_string()))
    }
}

impl SimConfig {
    /// Checks cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.amf.name.is_empty() {
            return Err(ConfigError::Validation("amf.name is empty".to_string()));
        }
        if self.amf.served_guamis.is_empty() {
            return Err(ConfigError::Validation(
                "amf.served_guamis needs at least one GUAMI".to_string(),
            ));
        }
        if self.amf.relative_capacity == 0 {
            return Err(ConfigError::Validation(
                "amf.relative_capacity must be non-zero".to_string(),
            ));
        }
        if self.amf.ue_ngap_id_base == u32::MAX {
            return Err(ConfigError::Validation(
                "amf.ue_ngap_id_base collides with the unassigned id".to_string(),
            ));
        }
        if self.security.integrity > 3 || self.security.ciphering > 3 {
            return Err(ConfigError::Validation(
                "security algorithms must be in 0..=3".to_string(),
            ));
        }
        self.security.knas_int_bytes()?;
        self.security.knas_enc_bytes()?;

        let t = &self.timers;
        let timers = [
            ("t3502", t.t3502),
            ("t3510", t.t3510),
            ("t3511", t.t3511),
            ("t3517", t.t3517),
            ("t3521", t.t3521),
            ("t3525", t.t3525),
            ("t3540", t.t3540),
            ("t3580", t.t3580),
            ("t3582", t.t3582),
            ("t3583", t.t3583),
            ("non_3gpp_deregistration", t.non_3gpp_deregistration),
        ];
        if let Some((name, _)) = timers.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Validation(format!("timers.{name} must be non-zero")));
        }

        self.subscriber.mac_bytes()?;
        self.subscriber.kwagf_bytes()?;
        Ok(())
    }
}

/// Loads a configuration from a YAML file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<SimConfig, ConfigError> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    load_config_from_str(&contents)
}

/// Loads a configuration from a YAML string.
pub fn load_config_from_str(yaml: &str) -> Result<SimConfig, ConfigError> {
    if yaml.trim().is_empty() {
        return Ok(SimConfig::default());
    }
    Ok(serde_yaml::from_str(yaml)?)
}

fn decode_hex_key(value: &str, field: &str) -> Result<[u8; 16], ConfigError> {
    let raw = hex::decode(value).map_err(|e| ConfigError::Validation(format!("{field}: {e}")))?;
    raw.try_into()
        .map_err(|_| ConfigError::Validation(format!("{field} must be 16 bytes")))
}
