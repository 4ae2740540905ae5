//! NAS (Non-Access Stratum) codecs for the simulated AMF
//!
//! Covers the 5GMM and 5GSM messages the engine exchanges (TS 24.501),
//! the NAS security transform with its replay counters, and the Authorized
//! QoS Rules grammar carried in PDU session establishment.
//!
//! # Example
//!
//! ```rust
//! use simamf_nas::{MmMessage, NasMessage, NasSecurityContext, Perspective, SecurityHeaderType};
//!
//! let mut ctx = NasSecurityContext::new(Perspective::Network);
//! let msg = NasMessage::Mm(MmMessage::RegistrationComplete);
//!
//! // No context yet: the plain encoding goes out
//! let bytes = ctx.encode(&msg, SecurityHeaderType::IntegrityProtected, false).unwrap();
//! assert_eq!(bytes, vec![0x7E, 0x00, 0x43]);
//! assert_eq!(ctx.decode(&bytes).unwrap(), msg);
//! ```

mod codec;
pub mod count;
pub mod enums;
pub mod error;
pub mod identity;
pub mod ies;
pub mod messages;
pub mod qos_rules;
pub mod security;

pub use count::NasCount;
pub use enums::{
    sm_cause, AccessType, ExtendedProtocolDiscriminator, MmMessageType, PayloadContainerType,
    PduSessionType, RequestType, SecurityHeaderType, SmMessageType,
};
pub use error::NasError;
pub use identity::{wireline_mobile_identity, GlobalLineId};
pub use ies::{Guti5g, MobileIdentity, NgKsi, SessionAmbr, UeSecurityCapability};
pub use messages::{
    peek_security_header_type, DeregistrationRequest, DlNasTransport, MmMessage, NasMessage,
    PduSessionEstablishmentAccept, PduSessionEstablishmentRequest, RegistrationAccept,
    RegistrationRequest, SecurityModeCommand, SecurityModeComplete, SmBody, SmMessage,
    UlNasTransport,
};
pub use qos_rules::{
    decode_qos_rules, encode_qos_rules, PacketFilter, PacketFilterComponent,
    PacketFilterDirection, QosFlowBinding, QosRule, QosRuleError, QosRuleOperation,
};
pub use security::{NasSecurityContext, Perspective, SecuredNasMessage};
