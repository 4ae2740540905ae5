//! Common types and utilities for the simulated AMF
//!
//! Shared configuration, logging helpers and the PLMN / slice / GUAMI value
//! types used by the NAS, NGAP and engine crates.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::{
    load_config, load_config_from_str, AmfIdentityConfig, ConfigError, RetryConfig,
    SecurityConfig, SimConfig, SubscriberProfile, TimerConfig, TransportConfig,
};
pub use error::Error;
pub use logging::{
    format_hex_compact, init_logging, init_logging_with_filter, log_nas_message,
    log_ngap_message, log_protocol_message, Direction, HexDump, LogLevel,
};
pub use types::*;
