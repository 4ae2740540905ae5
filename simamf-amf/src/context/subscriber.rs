//! Per-subscriber context
//!
//! One `Subscriber` per simulated UE. It lives behind its own
//! `tokio::sync::Mutex` (see [`super::peer::SharedSubscriber`]); every
//! handler and timer callback locks it before touching anything here.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use simamf_common::{RetryConfig, SNssai, SecurityConfig, SimConfig, SubscriberProfile, TimerConfig};
use simamf_crypto::{CipheringAlgorithm, IntegrityAlgorithm};
use simamf_nas::{GlobalLineId, NasSecurityContext, NgKsi, Perspective, QosRule};
use simamf_ngap::{UeAmbr, UeSecurityCapabilities};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use super::line::LineProfile;
use super::peer::PeerContext;
use super::session::{check_id, ExtendedState, PduSession, SessionSlots, SessionState};
use crate::error::AmfError;
use crate::state::MobilityState;
use crate::timer::TimerSet;

/// Not yet assigned AMF UE NGAP id.
pub const AMF_UE_NGAP_ID_UNSPECIFIED: u32 = u32::MAX;
/// Not yet assigned RAN UE NGAP id.
pub const RAN_UE_NGAP_ID_UNSPECIFIED: u32 = u32::MAX;

#[derive(Debug)]
pub struct Subscriber {
    amf_ue_ngap_id: u32,
    ran_ue_ngap_id: u32,
    line: LineProfile,
    kwagf: [u8; 32],
    ue_ambr: UeAmbr,
    default_slice: SNssai,
    security: NasSecurityContext,
    ue_security_capabilities: UeSecurityCapabilities,
    timers: TimerSet,
    slots: SessionSlots,
    sessions: BTreeMap<u8, PduSession>,
    extended: BTreeMap<u8, ExtendedState>,
    qos_rules: BTreeMap<u8, Vec<QosRule>>,
    current_peer: Option<Weak<PeerContext>>,
    previous_peer: Option<Weak<PeerContext>>,
    mobility: MobilityState,
    dereg_gate: Arc<Semaphore>,
    dereg_permit: Option<OwnedSemaphorePermit>,
}

impl Subscriber {
    pub fn new(
        profile: &SubscriberProfile,
        timers: &TimerConfig,
        retries: &RetryConfig,
    ) -> Result<Self, AmfError> {
        let line = LineProfile::from_profile(profile);
        line.validate()?;
        Ok(Self {
            amf_ue_ngap_id: AMF_UE_NGAP_ID_UNSPECIFIED,
            ran_ue_ngap_id: RAN_UE_NGAP_ID_UNSPECIFIED,
            line,
            kwagf: profile.kwagf_bytes()?,
            ue_ambr: UeAmbr {
                dl: profile.ue_ambr_dl,
                ul: profile.ue_ambr_ul,
            },
            default_slice: profile.slice,
            security: NasSecurityContext::new(Perspective::Network),
            ue_security_capabilities: UeSecurityCapabilities::null_only(),
            timers: TimerSet::new(timers, retries),
            slots: SessionSlots::new(),
            sessions: BTreeMap::new(),
            extended: BTreeMap::new(),
            qos_rules: BTreeMap::new(),
            current_peer: None,
            previous_peer: None,
            mobility: MobilityState::Deregistered,
            dereg_gate: Arc::new(Semaphore::new(1)),
            dereg_permit: None,
        })
    }

    /// Test subscriber built from the configuration's profile, timers and
    /// retry ceilings.
    pub fn from_config(config: &SimConfig) -> Result<Self, AmfError> {
        Self::new(&config.subscriber, &config.timers, &config.retries)
    }

    pub fn amf_ue_ngap_id(&self) -> u32 {
        self.amf_ue_ngap_id
    }

    pub fn set_amf_ue_ngap_id(&mut self, id: u32) {
        self.amf_ue_ngap_id = id;
    }

    pub fn ran_ue_ngap_id(&self) -> u32 {
        self.ran_ue_ngap_id
    }

    pub fn set_ran_ue_ngap_id(&mut self, id: u32) {
        if self.ran_ue_ngap_id != id {
            debug!(
                "RAN UE NGAP id {} -> {} for amf_ue_ngap_id={}",
                self.ran_ue_ngap_id, id, self.amf_ue_ngap_id
            );
        }
        self.ran_ue_ngap_id = id;
    }

    pub fn line(&self) -> &LineProfile {
        &self.line
    }

    pub fn global_line_id(&self) -> Option<GlobalLineId> {
        self.line.global_line_id()
    }

    pub fn kwagf(&self) -> &[u8; 32] {
        &self.kwagf
    }

    pub fn ue_ambr(&self) -> UeAmbr {
        self.ue_ambr
    }

    pub fn default_slice(&self) -> SNssai {
        self.default_slice
    }

    pub fn ue_security_capabilities(&self) -> UeSecurityCapabilities {
        self.ue_security_capabilities
    }

    pub fn security(&self) -> &NasSecurityContext {
        &self.security
    }

    pub fn security_mut(&mut self) -> &mut NasSecurityContext {
        &mut self.security
    }

    /// Installs the configured algorithms and keys. The key set identifier
    /// stays "no key available" since no authentication ran.
    pub fn activate_security(&mut self, config: &SecurityConfig) -> Result<(), AmfError> {
        let ciphering = CipheringAlgorithm::try_from(config.ciphering)
            .map_err(|e| AmfError::Security(e.to_string()))?;
        let integrity = IntegrityAlgorithm::try_from(config.integrity)
            .map_err(|e| AmfError::Security(e.to_string()))?;
        self.security.activate(
            NgKsi::no_key(),
            ciphering,
            integrity,
            config.knas_int_bytes()?,
            config.knas_enc_bytes()?,
        );
        Ok(())
    }

    pub fn timers(&self) -> &TimerSet {
        &self.timers
    }

    pub fn timers_mut(&mut self) -> &mut TimerSet {
        &mut self.timers
    }

    // ------------------------------------------------------------------
    // Peer attachment
    // ------------------------------------------------------------------

    /// Binds the subscriber to `peer`. A subscriber attached elsewhere is
    /// detached first and the old peer is remembered for one old-AMF
    /// notification. Moving to a new peer cancels every pending timer.
    pub fn attach(&mut self, peer: &Arc<PeerContext>) {
        if let Some(current) = self.current_peer() {
            if Arc::ptr_eq(&current, peer) {
                return;
            }
            self.detach();
            self.previous_peer = Some(Arc::downgrade(&current));
        }
        self.timers.cancel_all();
        self.current_peer = Some(Arc::downgrade(peer));
    }

    /// Drops the index entry on the current peer, if any.
    pub fn detach(&mut self) {
        if let Some(peer) = self.current_peer.take().and_then(|weak| weak.upgrade()) {
            peer.remove(self.amf_ue_ngap_id);
        }
    }

    pub fn current_peer(&self) -> Option<Arc<PeerContext>> {
        self.current_peer.as_ref().and_then(Weak::upgrade)
    }

    /// Read-and-clear of the previous peer's name; single use per hand-over.
    pub fn take_old_amf(&mut self) -> Option<String> {
        self.previous_peer
            .take()
            .and_then(|weak| weak.upgrade())
            .map(|peer| peer.name().to_string())
    }

    // ------------------------------------------------------------------
    // PDU sessions
    // ------------------------------------------------------------------

    pub fn allocate_session_id(&mut self) -> Result<u8, AmfError> {
        self.slots.allocate().ok_or(AmfError::ResourceExhausted)
    }

    pub fn create_session(&mut self, id: u8, snssai: SNssai) -> Result<&mut PduSession, AmfError> {
        check_id(id)?;
        if self.sessions.contains_key(&id) {
            return Err(AmfError::Conflict(format!("PDU session {id} already exists")));
        }
        self.slots.claim(id)?;
        self.set_session_state(id, SessionState::Establishing, None);
        Ok(self.sessions.entry(id).or_insert_with(|| PduSession::new(id, snssai)))
    }

    /// Removes the session, its QoS rules and extended state, and frees the
    /// id slot.
    pub fn delete_session(&mut self, id: u8) -> Result<PduSession, AmfError> {
        check_id(id)?;
        let Some(session) = self.sessions.remove(&id) else {
            return Err(if self.slots.was_released(id) {
                AmfError::Conflict(format!("PDU session {id} already deleted"))
            } else {
                AmfError::NotFound(format!("PDU session {id}"))
            });
        };
        self.slots.release(id)?;
        self.qos_rules.remove(&id);
        self.extended.remove(&id);
        Ok(session)
    }

    pub fn session(&self, id: u8) -> Option<&PduSession> {
        self.sessions.get(&id)
    }

    pub fn session_mut(&mut self, id: u8) -> Option<&mut PduSession> {
        self.sessions.get_mut(&id)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &PduSession> {
        self.sessions.values()
    }

    pub fn set_session_state(&mut self, id: u8, state: SessionState, cause: Option<String>) {
        self.extended.insert(id, ExtendedState { state, cause });
    }

    pub fn extended_state(&self, id: u8) -> Option<&ExtendedState> {
        self.extended.get(&id)
    }

    pub fn store_qos_rules(&mut self, id: u8, rules: Vec<QosRule>) {
        self.qos_rules.insert(id, rules);
    }

    pub fn qos_rules(&self, id: u8) -> Option<&[QosRule]> {
        self.qos_rules.get(&id).map(Vec::as_slice)
    }

    /// PDU session status bitmap indexed by session id.
    pub fn pdu_session_status(&self) -> [bool; 16] {
        let mut status = [false; 16];
        for id in self.sessions.keys() {
            status[usize::from(*id)] = true;
        }
        status
    }

    // ------------------------------------------------------------------
    // Mobility state and deregistration gate
    // ------------------------------------------------------------------

    pub fn mobility_state(&self) -> MobilityState {
        self.mobility
    }

    pub fn transition(&mut self, to: MobilityState) -> Result<(), AmfError> {
        let next = self.mobility.transition(to)?;
        if next != self.mobility {
            debug!(
                "amf_ue_ngap_id={} mobility {} -> {}",
                self.amf_ue_ngap_id, self.mobility, next
            );
        }
        self.mobility = next;
        Ok(())
    }

    /// The one-permit gate; acquire it without holding the subscriber lock.
    pub fn deregistration_gate(&self) -> Arc<Semaphore> {
        Arc::clone(&self.dereg_gate)
    }

    pub fn hold_deregistration(&mut self, permit: OwnedSemaphorePermit) {
        self.dereg_permit = Some(permit);
    }

    /// Gives the gate back; false if no deregistration was in flight.
    pub fn release_deregistration(&mut self) -> bool {
        self.dereg_permit.take().is_some()
    }

    pub fn deregistration_in_flight(&self) -> bool {
        self.dereg_permit.is_some()
    }

    /// Tears the subscriber down: timers cancelled, detached from its peer,
    /// sessions released, gate returned, security forgotten.
    pub fn destroy(&mut self) {
        self.timers.cancel_all();
        self.detach();
        self.previous_peer = None;
        let ids: Vec<u8> = self.sessions.keys().copied().collect();
        for id in ids {
            // ids come from the session map, so the slot is allocated
            let _ = self.delete_session(id);
        }
        self.extended.clear();
        self.qos_rules.clear();
        self.dereg_permit = None;
        self.security.clear();
        self.mobility = MobilityState::Deregistered;
        debug!("Destroyed subscriber amf_ue_ngap_id={}", self.amf_ue_ngap_id);
    }
}
