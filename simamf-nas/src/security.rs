//! NAS security context and message protection
//!
//! Wire form of a security protected 5GMM message (TS 24.501 9.1):
//!
//! ```text
//! | EPD | security header type | MAC (4) | SQN (1) | plain or ciphered NAS message |
//! ```
//!
//! The MAC covers `SQN || payload` after ciphering. The codec keeps one
//! counter per direction. The *uplink* counter is the send counter and the
//! *downlink* counter the receive counter from the owner's point of view,
//! so the same context type serves the network and the device side.

use simamf_crypto::{
    apply_cipher, compute_mac, CipheringAlgorithm, IntegrityAlgorithm, BEARER_3GPP,
    DIRECTION_DOWNLINK, DIRECTION_UPLINK, KEY_SIZE, MAC_SIZE,
};
use tracing::{trace, warn};

use crate::codec::need;
use crate::count::NasCount;
use crate::enums::{ExtendedProtocolDiscriminator, SecurityHeaderType};
use crate::error::NasError;
use crate::ies::NgKsi;
use crate::messages::{peek_security_header_type, NasMessage};

/// Length of the security header preceding the protected payload.
const SECURITY_HEADER_LEN: usize = 2 + MAC_SIZE;

/// Which end of the N1 interface owns a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Perspective {
    /// Sends downlink, verifies uplink
    #[default]
    Network,
    /// Sends uplink, verifies downlink
    Device,
}

impl Perspective {
    pub fn send_direction(self) -> u8 {
        match self {
            Perspective::Network => DIRECTION_DOWNLINK,
            Perspective::Device => DIRECTION_UPLINK,
        }
    }

    pub fn receive_direction(self) -> u8 {
        match self {
            Perspective::Network => DIRECTION_UPLINK,
            Perspective::Device => DIRECTION_DOWNLINK,
        }
    }
}

/// Security protected NAS message split into its header fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecuredNasMessage {
    pub security_header_type: SecurityHeaderType,
    pub mac: [u8; MAC_SIZE],
    pub sequence_number: u8,
    /// Payload after the SQN, possibly ciphered
    pub payload: Vec<u8>,
}

impl SecuredNasMessage {
    pub fn decode(data: &[u8]) -> Result<Self, NasError> {
        need(data, SECURITY_HEADER_LEN + 1)?;
        let security_header_type = peek_security_header_type(data)?;
        let mut mac = [0u8; MAC_SIZE];
        mac.copy_from_slice(&data[2..SECURITY_HEADER_LEN]);
        Ok(Self {
            security_header_type,
            mac,
            sequence_number: data[SECURITY_HEADER_LEN],
            payload: data[SECURITY_HEADER_LEN + 1..].to_vec(),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SECURITY_HEADER_LEN + 1 + self.payload.len());
        out.push(ExtendedProtocolDiscriminator::MobilityManagement.into());
        out.push(self.security_header_type.into());
        out.extend_from_slice(&self.mac);
        out.push(self.sequence_number);
        out.extend_from_slice(&self.payload);
        out
    }
}

/// Per-subscriber NAS security state.
#[derive(Debug, Clone)]
pub struct NasSecurityContext {
    perspective: Perspective,
    available: bool,
    ng_ksi: NgKsi,
    ciphering: CipheringAlgorithm,
    integrity: IntegrityAlgorithm,
    knas_int: [u8; KEY_SIZE],
    knas_enc: [u8; KEY_SIZE],
    ul_count: NasCount,
    dl_count: NasCount,
    mac_failed: bool,
}

impl NasSecurityContext {
    pub fn new(perspective: Perspective) -> Self {
        Self {
            perspective,
            available: false,
            ng_ksi: NgKsi::no_key(),
            ciphering: CipheringAlgorithm::Nea0,
            integrity: IntegrityAlgorithm::Nia0,
            knas_int: [0u8; KEY_SIZE],
            knas_enc: [0u8; KEY_SIZE],
            ul_count: NasCount::new(),
            dl_count: NasCount::new(),
            mac_failed: false,
        }
    }

    /// Installs algorithms and keys and marks the context available.
    ///
    /// Counters are left alone; the first message sent under the new
    /// context resets them.
    pub fn activate(
        &mut self,
        ng_ksi: NgKsi,
        ciphering: CipheringAlgorithm,
        integrity: IntegrityAlgorithm,
        knas_int: [u8; KEY_SIZE],
        knas_enc: [u8; KEY_SIZE],
    ) {
        self.ng_ksi = ng_ksi;
        self.ciphering = ciphering;
        self.integrity = integrity;
        self.knas_int = knas_int;
        self.knas_enc = knas_enc;
        self.available = true;
    }

    pub fn clear(&mut self) {
        *self = Self::new(self.perspective);
    }

    pub fn perspective(&self) -> Perspective {
        self.perspective
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn ng_ksi(&self) -> NgKsi {
        self.ng_ksi
    }

    pub fn ciphering(&self) -> CipheringAlgorithm {
        self.ciphering
    }

    pub fn integrity(&self) -> IntegrityAlgorithm {
        self.integrity
    }

    pub fn ul_count(&self) -> NasCount {
        self.ul_count
    }

    pub fn dl_count(&self) -> NasCount {
        self.dl_count
    }

    /// Outcome of the last MAC check performed by [`Self::decode`].
    pub fn mac_failed(&self) -> bool {
        self.mac_failed
    }

    /// Protects `msg` with the given header type.
    ///
    /// Without an available context the plain encoding is returned and no
    /// counter moves. `reset_counters` zeroes both counters first.
    pub fn encode(
        &mut self,
        msg: &NasMessage,
        security_header_type: SecurityHeaderType,
        reset_counters: bool,
    ) -> Result<Vec<u8>, NasError> {
        let plain = msg.encode()?;
        if !self.available || !security_header_type.is_protected() {
            return Ok(plain);
        }
        if reset_counters {
            self.ul_count.reset();
            self.dl_count.reset();
        }

        let count = self.ul_count;
        let mut payload = plain;
        if security_header_type.is_ciphered() {
            apply_cipher(
                self.ciphering,
                &self.knas_enc,
                count.get(),
                BEARER_3GPP,
                self.perspective.send_direction(),
                &mut payload,
            )?;
        }

        let mut mac_input = Vec::with_capacity(1 + payload.len());
        mac_input.push(count.sqn());
        mac_input.extend_from_slice(&payload);
        let mac = compute_mac(
            self.integrity,
            &self.knas_int,
            count.get(),
            BEARER_3GPP,
            self.perspective.send_direction(),
            &mac_input,
        )?;

        let secured = SecuredNasMessage {
            security_header_type,
            mac,
            sequence_number: count.sqn(),
            payload,
        };
        trace!(count = ?count, sht = ?security_header_type, "NAS message protected");
        self.ul_count.add_one();
        Ok(secured.encode())
    }

    /// Decodes a plain or protected NAS message.
    ///
    /// A MAC mismatch, or a MAC that cannot be computed, does not abort
    /// decoding: it is recorded in [`Self::mac_failed`] and the message is
    /// still returned.
    pub fn decode(&mut self, data: &[u8]) -> Result<NasMessage, NasError> {
        let sht = peek_security_header_type(data)?;
        if !sht.is_protected() {
            self.mac_failed = false;
            return NasMessage::decode(data);
        }

        let secured = SecuredNasMessage::decode(data)?;
        if sht.is_new_security_context() {
            self.dl_count.reset();
        }
        self.dl_count.observe_sqn(secured.sequence_number);

        if !self.available {
            warn!("protected NAS message received without a security context");
            self.mac_failed = true;
            return NasMessage::decode(&secured.payload);
        }

        let count = self.dl_count;
        let mut mac_input = Vec::with_capacity(1 + secured.payload.len());
        mac_input.push(secured.sequence_number);
        mac_input.extend_from_slice(&secured.payload);
        self.mac_failed = match compute_mac(
            self.integrity,
            &self.knas_int,
            count.get(),
            BEARER_3GPP,
            self.perspective.receive_direction(),
            &mac_input,
        ) {
            Ok(expected) if expected == secured.mac => false,
            Ok(expected) => {
                warn!(
                    received = %hex::encode(secured.mac),
                    expected = %hex::encode(expected),
                    count = ?count,
                    "NAS MAC verification failed"
                );
                true
            }
            Err(e) => {
                warn!(error = %e, count = ?count, "NAS MAC could not be verified");
                true
            }
        };

        let mut payload = secured.payload;
        if sht.is_ciphered() {
            apply_cipher(
                self.ciphering,
                &self.knas_enc,
                count.get(),
                BEARER_3GPP,
                self.perspective.receive_direction(),
                &mut payload,
            )?;
        }
        NasMessage::decode(&payload)
    }
}

impl Default for NasSecurityContext {
    fn default() -> Self {
        Self::new(Perspective::Network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{MmMessage, SecurityModeComplete};

    const KEY_INT: [u8; KEY_SIZE] = [0x2b; KEY_SIZE];
    const KEY_ENC: [u8; KEY_SIZE] = [0x4e; KEY_SIZE];

    fn pair(
        ciphering: CipheringAlgorithm,
        integrity: IntegrityAlgorithm,
    ) -> (NasSecurityContext, NasSecurityContext) {
        let mut network = NasSecurityContext::new(Perspective::Network);
        let mut device = NasSecurityContext::new(Perspective::Device);
        for ctx in [&mut network, &mut device] {
            ctx.activate(NgKsi::native(0), ciphering, integrity, KEY_INT, KEY_ENC);
        }
        (network, device)
    }

    fn registration_complete() -> NasMessage {
        NasMessage::Mm(MmMessage::RegistrationComplete)
    }

    #[test]
    fn test_unavailable_context_sends_plain() {
        let mut ctx = NasSecurityContext::default();
        let bytes = ctx
            .encode(
                &registration_complete(),
                SecurityHeaderType::IntegrityProtected,
                false,
            )
            .unwrap();
        assert_eq!(bytes, vec![0x7E, 0x00, 0x43]);
        assert_eq!(ctx.ul_count().get(), 0);
    }

    #[test]
    fn test_null_algorithms_layout() {
        let (mut network, mut device) = pair(CipheringAlgorithm::Nea0, IntegrityAlgorithm::Nia0);
        let bytes = network
            .encode(
                &registration_complete(),
                SecurityHeaderType::IntegrityProtectedAndCiphered,
                false,
            )
            .unwrap();
        assert_eq!(bytes, vec![0x7E, 0x02, 0, 0, 0, 0, 0x00, 0x7E, 0x00, 0x43]);
        assert_eq!(network.ul_count().get(), 1);

        let decoded = device.decode(&bytes).unwrap();
        assert_eq!(decoded, registration_complete());
        assert!(!device.mac_failed());
    }

    #[test]
    fn test_nia2_nea2_round_trip_both_directions() {
        let (mut network, mut device) = pair(CipheringAlgorithm::Nea2, IntegrityAlgorithm::Nia2);
        let msg = NasMessage::Mm(MmMessage::SecurityModeComplete(SecurityModeComplete::default()));

        for _ in 0..3 {
            let uplink = device
                .encode(&msg, SecurityHeaderType::IntegrityProtectedAndCiphered, false)
                .unwrap();
            assert_ne!(&uplink[7..], &msg.encode().unwrap()[..]);
            assert_eq!(network.decode(&uplink).unwrap(), msg);
            assert!(!network.mac_failed());

            let downlink = network
                .encode(
                    &registration_complete(),
                    SecurityHeaderType::IntegrityProtectedAndCiphered,
                    false,
                )
                .unwrap();
            assert_eq!(device.decode(&downlink).unwrap(), registration_complete());
            assert!(!device.mac_failed());
        }
        assert_eq!(device.ul_count().get(), 3);
        assert_eq!(network.dl_count().sqn(), 2);
    }

    #[test]
    fn test_corrupted_mac_is_flagged_but_decoded() {
        let (mut network, mut device) = pair(CipheringAlgorithm::Nea0, IntegrityAlgorithm::Nia2);
        let mut bytes = network
            .encode(&registration_complete(), SecurityHeaderType::IntegrityProtected, false)
            .unwrap();
        bytes[3] ^= 0xFF;
        assert_eq!(device.decode(&bytes).unwrap(), registration_complete());
        assert!(device.mac_failed());

        // a following plain message clears the flag
        device.decode(&[0x7E, 0x00, 0x43]).unwrap();
        assert!(!device.mac_failed());
    }

    #[test]
    fn test_reset_counters_on_new_context() {
        let (mut network, mut device) = pair(CipheringAlgorithm::Nea0, IntegrityAlgorithm::Nia2);
        for _ in 0..5 {
            let bytes = network
                .encode(&registration_complete(), SecurityHeaderType::IntegrityProtected, false)
                .unwrap();
            device.decode(&bytes).unwrap();
        }
        let bytes = network
            .encode(
                &registration_complete(),
                SecurityHeaderType::IntegrityProtectedWithNew5gNasSecurityContext,
                true,
            )
            .unwrap();
        assert_eq!(bytes[6], 0);
        device.decode(&bytes).unwrap();
        assert!(!device.mac_failed());
        assert_eq!(device.dl_count().get(), 0);
        assert_eq!(network.ul_count().get(), 1);
    }

    #[test]
    fn test_wraparound_increments_overflow() {
        let mut ctx = NasSecurityContext::new(Perspective::Device);
        ctx.activate(
            NgKsi::native(0),
            CipheringAlgorithm::Nea0,
            IntegrityAlgorithm::Nia0,
            KEY_INT,
            KEY_ENC,
        );
        let frame = |sqn: u8| vec![0x7E, 0x01, 0, 0, 0, 0, sqn, 0x7E, 0x00, 0x43];
        ctx.decode(&frame(0xFE)).unwrap();
        ctx.decode(&frame(0x01)).unwrap();
        assert_eq!(ctx.dl_count().overflow(), 1);
        assert_eq!(ctx.dl_count().sqn(), 0x01);
    }

    #[test]
    fn test_protected_without_context_sets_flag() {
        let mut ctx = NasSecurityContext::new(Perspective::Network);
        let bytes = [0x7E, 0x01, 1, 2, 3, 4, 0x00, 0x7E, 0x00, 0x43];
        assert_eq!(ctx.decode(&bytes).unwrap(), registration_complete());
        assert!(ctx.mac_failed());
    }

    #[test]
    fn test_unverifiable_mac_is_flagged_but_decoded() {
        let (_, mut device) = pair(CipheringAlgorithm::Nea0, IntegrityAlgorithm::Nia1);
        let bytes = [0x7E, 0x01, 1, 2, 3, 4, 0x00, 0x7E, 0x00, 0x43];
        assert_eq!(device.decode(&bytes).unwrap(), registration_complete());
        assert!(device.mac_failed());
        assert_eq!(device.dl_count().sqn(), 0x00);
    }

    #[test]
    fn test_unsupported_algorithm_is_an_error() {
        let (mut network, _) = pair(CipheringAlgorithm::Nea1, IntegrityAlgorithm::Nia2);
        let err = network
            .encode(
                &registration_complete(),
                SecurityHeaderType::IntegrityProtectedAndCiphered,
                false,
            )
            .unwrap_err();
        assert!(matches!(err, NasError::Crypto(_)));
    }
}
