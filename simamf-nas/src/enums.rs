//! NAS protocol enumerations (3GPP TS 24.501)

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Extended Protocol Discriminator, TS 24.501 9.2
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ExtendedProtocolDiscriminator {
    MobilityManagement = 0x7E,
    SessionManagement = 0x2E,
}

/// Security header type, TS 24.501 9.3
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive, Default)]
#[repr(u8)]
pub enum SecurityHeaderType {
    #[default]
    NotProtected = 0x00,
    IntegrityProtected = 0x01,
    IntegrityProtectedAndCiphered = 0x02,
    IntegrityProtectedWithNew5gNasSecurityContext = 0x03,
    IntegrityProtectedAndCipheredWithNew5gNasSecurityContext = 0x04,
}

impl SecurityHeaderType {
    /// True for every type except `NotProtected`.
    pub fn is_protected(&self) -> bool {
        !matches!(self, SecurityHeaderType::NotProtected)
    }

    /// True when the payload after the sequence number is ciphered.
    pub fn is_ciphered(&self) -> bool {
        matches!(
            self,
            SecurityHeaderType::IntegrityProtectedAndCiphered
                | SecurityHeaderType::IntegrityProtectedAndCipheredWithNew5gNasSecurityContext
        )
    }

    /// True when the message takes a new 5G NAS security context into use.
    pub fn is_new_security_context(&self) -> bool {
        matches!(
            self,
            SecurityHeaderType::IntegrityProtectedWithNew5gNasSecurityContext
                | SecurityHeaderType::IntegrityProtectedAndCipheredWithNew5gNasSecurityContext
        )
    }
}

/// 5GMM message types handled by the engine, TS 24.501 9.7
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum MmMessageType {
    RegistrationRequest = 0x41,
    RegistrationAccept = 0x42,
    RegistrationComplete = 0x43,
    DeregistrationRequestUeOriginating = 0x45,
    DeregistrationAcceptUeOriginating = 0x46,
    SecurityModeCommand = 0x5D,
    SecurityModeComplete = 0x5E,
    UlNasTransport = 0x67,
    DlNasTransport = 0x68,
}

/// 5GSM message types handled by the engine, TS 24.501 9.7
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum SmMessageType {
    PduSessionEstablishmentRequest = 0xC1,
    PduSessionEstablishmentAccept = 0xC2,
    PduSessionReleaseRequest = 0xD1,
    PduSessionReleaseCommand = 0xD3,
    PduSessionReleaseComplete = 0xD4,
}

/// Payload container type, TS 24.501 9.11.3.40
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum PayloadContainerType {
    N1SmInformation = 0x01,
    Sms = 0x02,
    LtePositioning = 0x03,
    SorTransparentContainer = 0x04,
    UePolicyContainer = 0x05,
    UeParametersUpdate = 0x06,
    MultiplePayloads = 0x0F,
}

/// Request type, TS 24.501 9.11.3.47
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum RequestType {
    InitialRequest = 0x01,
    ExistingPduSession = 0x02,
    InitialEmergencyRequest = 0x03,
    ExistingEmergencyPduSession = 0x04,
    ModificationRequest = 0x05,
    MaUpsiRequest = 0x06,
}

/// PDU session type, TS 24.501 9.11.4.11
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive, Default)]
#[repr(u8)]
pub enum PduSessionType {
    #[default]
    Ipv4 = 0x01,
    Ipv6 = 0x02,
    Ipv4v6 = 0x03,
    Unstructured = 0x04,
    Ethernet = 0x05,
}

/// Access type carried in the deregistration type IE, TS 24.501 9.11.3.20
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum AccessType {
    ThreeGpp = 0x01,
    NonThreeGpp = 0x02,
    Both = 0x03,
}

/// Common 5GSM cause values, TS 24.501 9.11.4.2
pub mod sm_cause {
    pub const REGULAR_DEACTIVATION: u8 = 0x24;
    pub const INVALID_PTI: u8 = 0x51;
    pub const PROTOCOL_ERROR_UNSPECIFIED: u8 = 0x6F;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_header_type_flags() {
        let sht = SecurityHeaderType::IntegrityProtectedWithNew5gNasSecurityContext;
        assert!(sht.is_protected());
        assert!(!sht.is_ciphered());
        assert!(sht.is_new_security_context());
        assert!(!SecurityHeaderType::NotProtected.is_protected());
        assert!(SecurityHeaderType::IntegrityProtectedAndCiphered.is_ciphered());
    }

    #[test]
    fn test_message_type_from_primitive() {
        assert_eq!(
            MmMessageType::try_from(0x5Du8).unwrap(),
            MmMessageType::SecurityModeCommand
        );
        assert_eq!(
            SmMessageType::try_from(0xD4u8).unwrap(),
            SmMessageType::PduSessionReleaseComplete
        );
        assert!(MmMessageType::try_from(0x99u8).is_err());
        assert_eq!(u8::from(ExtendedProtocolDiscriminator::SessionManagement), 0x2E);
    }
}
