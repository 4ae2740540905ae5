//! NGAP / NAS procedure dispatcher
//!
//! One entry point, [`Dispatcher::dispatch`], takes an encoded NGAP PDU,
//! routes it by procedure code and PDU kind, and for NAS carrying
//! transports by the embedded NAS message type. Every handler runs under
//! the subscriber's own lock, as do the timer tasks it spawns, so frames
//! handled concurrently for the same subscriber are serialized. Outbound
//! PDUs are queued while the lock is held and sent after it is released.
//!
//! ```text
//! WaitingNgSetup -> WaitingInitialUe -> WaitingSecurityComplete
//!     -> WaitingSessionOrServiceEvents -> WaitingDeregistration -> Terminated
//! ```

use std::sync::{Arc, PoisonError, RwLock, Weak};

use simamf_common::{log_nas_message, log_ngap_message, Direction, SimConfig};
use simamf_nas::{
    sm_cause, DeregistrationRequest, MmMessage, NasMessage, RequestType, SecurityHeaderType,
    SmBody, SmMessage, UlNasTransport,
};
use simamf_ngap::procedures::initial_context_setup::parse_initial_context_setup_response;
use simamf_ngap::procedures::nas_transport::{
    parse_downlink_nas_transport, parse_initial_ue_message, parse_uplink_nas_transport,
};
use simamf_ngap::procedures::ng_setup::parse_ng_setup_request;
use simamf_ngap::procedures::overload::{build_overload_start, build_overload_stop, OverloadStartParams};
use simamf_ngap::procedures::pdu_session_resource::{
    parse_pdu_session_resource_release_response, parse_pdu_session_resource_setup_response,
};
use simamf_ngap::procedures::ue_context_release::{
    parse_ue_context_release_complete, parse_ue_context_release_request,
};
use simamf_ngap::{Cause, NgapCodec, NgapPdu, PduKind, ProcedureCode, ProcedureError, ProtocolIeId};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::builders;
use crate::context::{
    OverloadRecord, PeerContext, QosFlow, SessionState, SharedSubscriber, Subscriber,
    MAX_SESSION_ID, MIN_SESSION_ID,
};
use crate::error::AmfError;
use crate::io::TransportError;
use crate::state::{DispatcherState, MobilityState};
use crate::timer::{TimerExpiry, TimerId, TimerTicket};

/// 5QI and ARP priority of the default QoS flow.
const DEFAULT_FIVE_QI: u8 = 9;
const DEFAULT_ARP_PRIORITY: u8 = 8;

struct Shared {
    config: SimConfig,
    codec: Arc<dyn NgapCodec>,
    outbound: mpsc::Sender<Vec<u8>>,
    peer: RwLock<Option<Arc<PeerContext>>>,
    state: watch::Sender<DispatcherState>,
}

/// Cheap to clone; all clones drive the same engine.
#[derive(Clone)]
pub struct Dispatcher {
    shared: Arc<Shared>,
}

impl Dispatcher {
    /// `outbound` receives every encoded PDU the engine emits.
    pub fn new(config: SimConfig, codec: Arc<dyn NgapCodec>, outbound: mpsc::Sender<Vec<u8>>) -> Self {
        let (state, _) = watch::channel(DispatcherState::default());
        Self {
            shared: Arc::new(Shared {
                config,
                codec,
                outbound,
                peer: RwLock::new(None),
                state,
            }),
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.shared.config
    }

    pub fn state(&self) -> DispatcherState {
        *self.shared.state.borrow()
    }

    /// Watch channel following the dispatcher state.
    pub fn subscribe_state(&self) -> watch::Receiver<DispatcherState> {
        self.shared.state.subscribe()
    }

    /// The peer created by NG Setup, if it has happened.
    pub fn peer(&self) -> Option<Arc<PeerContext>> {
        self.shared
            .peer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn subscriber(&self, amf_ue_ngap_id: u32) -> Option<SharedSubscriber> {
        self.peer()?.get(amf_ue_ngap_id)
    }

    /// Decodes one NGAP PDU and runs the matching procedure step.
    ///
    /// Unknown procedures and NAS message types are logged and ignored.
    /// An error aborts only the current step.
    pub async fn dispatch(&self, data: &[u8]) -> Result<(), AmfError> {
        let pdu = self.shared.codec.decode(data)?;
        log_ngap_message(Direction::Rx, &pdu.name(), data);

        match (pdu.procedure_code(), pdu.kind()) {
            (ProcedureCode::NgSetup, PduKind::InitiatingMessage) => {
                self.handle_ng_setup_request(&pdu).await
            }
            (ProcedureCode::InitialUeMessage, PduKind::InitiatingMessage) => {
                self.handle_initial_ue_message(&pdu).await
            }
            (ProcedureCode::UplinkNasTransport, PduKind::InitiatingMessage) => {
                self.handle_uplink_nas_transport(&pdu).await
            }
            (ProcedureCode::DownlinkNasTransport, PduKind::InitiatingMessage) => {
                self.handle_downlink_nas_transport(&pdu).await
            }
            (ProcedureCode::InitialContextSetup, PduKind::SuccessfulOutcome) => {
                self.handle_initial_context_setup_response(&pdu).await
            }
            (ProcedureCode::PduSessionResourceSetup, PduKind::SuccessfulOutcome) => {
                self.handle_pdu_session_resource_setup_response(&pdu).await
            }
            (ProcedureCode::PduSessionResourceRelease, PduKind::SuccessfulOutcome) => {
                self.handle_pdu_session_resource_release_response(&pdu).await
            }
            (ProcedureCode::UeContextReleaseRequest, PduKind::InitiatingMessage) => {
                self.handle_ue_context_release_request(&pdu).await
            }
            (ProcedureCode::UeContextRelease, PduKind::SuccessfulOutcome) => {
                self.handle_ue_context_release_complete(&pdu).await
            }
            _ => {
                info!("Ignoring unhandled NGAP message {}", pdu.name());
                Ok(())
            }
        }
    }

    /// Records an overload indication on the peer and sends OverloadStart.
    /// Nothing is sent when the indication is empty.
    pub async fn start_overload(
        &self,
        params: &OverloadStartParams,
    ) -> Result<Option<OverloadRecord>, AmfError> {
        let peer = self.require_peer()?;
        let Some(record) = peer.start_overload(params) else {
            return Ok(None);
        };
        self.send_pdu(&build_overload_start(params)).await?;
        Ok(Some(record))
    }

    pub async fn stop_overload(&self) -> Result<(), AmfError> {
        let peer = self.require_peer()?;
        peer.stop_overload();
        self.send_pdu(&build_overload_stop()).await
    }

    // ------------------------------------------------------------------
    // NGAP handlers
    // ------------------------------------------------------------------

    async fn handle_ng_setup_request(&self, pdu: &NgapPdu) -> Result<(), AmfError> {
        let request = parse_ng_setup_request(pdu)?;
        info!(
            "NG Setup Request from {} ({} byte node id)",
            request.ran_node_name.as_deref().unwrap_or("<unnamed>"),
            request.global_ran_node_id.len()
        );

        let peer = Arc::new(PeerContext::new(&self.shared.config.amf, self.shared.outbound.clone()));
        let previous = self
            .shared
            .peer
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Arc::clone(&peer));
        if let Some(previous) = previous {
            warn!("Repeated NG Setup; dropping {} subscribers", previous.len());
            previous.clear();
        }

        self.send_pdu(&builders::ng_setup_response(&peer)).await?;
        info!("NG Setup complete, serving as {}", peer.name());
        self.advance(DispatcherState::WaitingInitialUe);
        Ok(())
    }

    async fn handle_initial_ue_message(&self, pdu: &NgapPdu) -> Result<(), AmfError> {
        let params = parse_initial_ue_message(pdu)?;
        let peer = self.require_peer()?;

        let shared = Arc::new(Mutex::new(Subscriber::from_config(&self.shared.config)?));
        let mut outbox = Outbox::default();
        {
            let mut ue = shared.lock().await;
            ue.set_ran_ue_ngap_id(params.ran_ue_ngap_id);

            let request = match decode_nas(&mut ue, &params.nas_pdu)? {
                NasMessage::Mm(MmMessage::RegistrationRequest(request)) => request,
                other => {
                    info!("Ignoring {} in InitialUEMessage", other.name());
                    return Ok(());
                }
            };
            debug!(
                "Registration Request: type={} ngKSI={:?} identity={:?}",
                request.registration_type, request.ng_ksi, request.mobile_identity
            );

            let id = peer.allocate_ue_ngap_id()?;
            ue.set_amf_ue_ngap_id(id);
            ue.attach(&peer);
            peer.insert(id, Arc::clone(&shared))?;
            info!(
                "New subscriber amf_ue_ngap_id={} ran_ue_ngap_id={}",
                id, params.ran_ue_ngap_id
            );

            if let Err(e) = self.start_security(&mut ue, &mut outbox) {
                ue.destroy();
                return Err(e);
            }
        }

        if let Err(e) = self.flush(&shared, outbox).await {
            shared.lock().await.destroy();
            return Err(e);
        }
        Ok(())
    }

    async fn handle_uplink_nas_transport(&self, pdu: &NgapPdu) -> Result<(), AmfError> {
        let params = parse_uplink_nas_transport(pdu)?;
        let (peer, shared) = self.lookup(params.amf_ue_ngap_id)?;
        let mut outbox = Outbox::default();

        let deregister = {
            let mut ue = shared.lock().await;
            ue.set_ran_ue_ngap_id(params.ran_ue_ngap_id);

            match decode_nas(&mut ue, &params.nas_pdu)? {
                NasMessage::Mm(MmMessage::SecurityModeComplete(_)) => {
                    self.on_security_mode_complete(&peer, &mut ue, &mut outbox)?;
                    false
                }
                NasMessage::Mm(MmMessage::RegistrationComplete) => {
                    on_registration_complete(&mut ue)?;
                    false
                }
                NasMessage::Mm(MmMessage::UlNasTransport(transport)) => {
                    self.on_ul_nas_transport(&mut ue, &mut outbox, transport)?
                }
                NasMessage::Mm(MmMessage::DeregistrationRequest(request)) => {
                    self.on_deregistration_request(&mut ue, &mut outbox, request)?;
                    false
                }
                other => {
                    info!("Ignoring {} in UplinkNASTransport", other.name());
                    false
                }
            }
        };

        self.flush(&shared, outbox).await?;
        if deregister {
            self.start_deregistration(&shared).await?;
        }
        Ok(())
    }

    /// The peer's answer to a subscriber-originated deregistration.
    async fn handle_downlink_nas_transport(&self, pdu: &NgapPdu) -> Result<(), AmfError> {
        let params = parse_downlink_nas_transport(pdu)?;
        let (_, shared) = self.lookup(params.amf_ue_ngap_id)?;
        let mut outbox = Outbox::default();
        {
            let mut ue = shared.lock().await;
            match decode_nas(&mut ue, &params.nas_pdu)? {
                NasMessage::Mm(MmMessage::DeregistrationAccept) => {
                    if !ue.deregistration_in_flight() {
                        warn!(
                            "Deregistration Accept without a pending request, amf_ue_ngap_id={}",
                            ue.amf_ue_ngap_id()
                        );
                    }
                    self.teardown(&mut ue, &mut outbox)?;
                    info!("Subscriber amf_ue_ngap_id={} deregistered", ue.amf_ue_ngap_id());
                }
                other => {
                    info!("Ignoring {} in DownlinkNASTransport", other.name());
                }
            }
        }
        self.flush(&shared, outbox).await
    }

    async fn handle_initial_context_setup_response(&self, pdu: &NgapPdu) -> Result<(), AmfError> {
        let params = parse_initial_context_setup_response(pdu)?;
        let (peer, shared) = self.lookup(params.amf_ue_ngap_id)?;
        let mut outbox = Outbox::default();
        {
            let mut ue = shared.lock().await;
            ue.set_ran_ue_ngap_id(params.ran_ue_ngap_id);

            let accept = builders::registration_accept(&ue, &peer);
            let nas = builders::protect(
                &mut ue,
                &accept,
                SecurityHeaderType::IntegrityProtectedAndCiphered,
                false,
            )?;
            let pdu = builders::downlink_nas_transport(&mut ue, nas, None);
            self.queue_guarded(&mut ue, &mut outbox, TimerId::T3510, &pdu)?;
        }
        self.flush(&shared, outbox).await
    }

    async fn handle_pdu_session_resource_setup_response(&self, pdu: &NgapPdu) -> Result<(), AmfError> {
        let params = parse_pdu_session_resource_setup_response(pdu)?;
        let (_, shared) = self.lookup(params.amf_ue_ngap_id)?;
        let mut ue = shared.lock().await;

        ue.timers_mut().stop(TimerId::T3580);
        for item in &params.setup {
            if ue.session(item.pdu_session_id).is_some() {
                ue.set_session_state(item.pdu_session_id, SessionState::Established, None);
                info!("PDU session {} established", item.pdu_session_id);
            } else {
                warn!("Setup response for unknown PDU session {}", item.pdu_session_id);
            }
        }
        for item in &params.failed {
            if ue.session(item.pdu_session_id).is_some() {
                ue.set_session_state(
                    item.pdu_session_id,
                    SessionState::EstablishmentFailed,
                    Some("resource setup failed".to_string()),
                );
                warn!("PDU session {} failed to set up", item.pdu_session_id);
            }
        }
        Ok(())
    }

    async fn handle_pdu_session_resource_release_response(
        &self,
        pdu: &NgapPdu,
    ) -> Result<(), AmfError> {
        let params = parse_pdu_session_resource_release_response(pdu)?;
        let (_, shared) = self.lookup(params.amf_ue_ngap_id)?;
        let mut ue = shared.lock().await;

        ue.timers_mut().stop(TimerId::T3582);
        for item in &params.released {
            // the session may already be gone if Release Complete won the race
            if ue.session(item.pdu_session_id).is_some() {
                ue.set_session_state(item.pdu_session_id, SessionState::Released, None);
            }
        }
        Ok(())
    }

    async fn handle_ue_context_release_request(&self, pdu: &NgapPdu) -> Result<(), AmfError> {
        let params = parse_ue_context_release_request(pdu)?;
        let (_, shared) = self.lookup(params.amf_ue_ngap_id)?;
        let mut outbox = Outbox::default();
        {
            let ue = shared.lock().await;
            info!(
                "UE Context Release Request amf_ue_ngap_id={} cause={:?}",
                ue.amf_ue_ngap_id(),
                params.cause
            );
            let command = builders::ue_context_release_command(&ue, Cause::RADIO_NETWORK_UNSPECIFIED);
            self.queue(&mut outbox, &command)?;
        }
        self.flush(&shared, outbox).await
    }

    async fn handle_ue_context_release_complete(&self, pdu: &NgapPdu) -> Result<(), AmfError> {
        let params = parse_ue_context_release_complete(pdu)?;
        let (_, shared) = self.lookup(params.amf_ue_ngap_id)?;
        let mut outbox = Outbox::default();
        {
            let mut ue = shared.lock().await;
            self.teardown(&mut ue, &mut outbox)?;
            info!("UE context released, amf_ue_ngap_id={}", ue.amf_ue_ngap_id());
        }
        self.flush(&shared, outbox).await
    }

    // ------------------------------------------------------------------
    // NAS procedure steps
    // ------------------------------------------------------------------

    fn start_security(&self, ue: &mut Subscriber, outbox: &mut Outbox) -> Result<(), AmfError> {
        let security = &self.shared.config.security;
        ue.transition(MobilityState::Registering)?;
        ue.activate_security(security)?;
        ue.transition(MobilityState::SecurityActivating)?;

        let command = builders::security_mode_command(security);
        let nas = builders::protect(
            ue,
            &command,
            SecurityHeaderType::IntegrityProtectedWithNew5gNasSecurityContext,
            true,
        )?;
        let pdu = builders::downlink_nas_transport(ue, nas, None);
        self.queue_guarded(ue, outbox, TimerId::T3510, &pdu)?;
        outbox.advance_to(DispatcherState::WaitingSecurityComplete);
        Ok(())
    }

    fn on_security_mode_complete(
        &self,
        peer: &PeerContext,
        ue: &mut Subscriber,
        outbox: &mut Outbox,
    ) -> Result<(), AmfError> {
        if ue.mobility_state() != MobilityState::SecurityActivating {
            warn!(
                "Security Mode Complete in state {}, amf_ue_ngap_id={}",
                ue.mobility_state(),
                ue.amf_ue_ngap_id()
            );
        }
        // Registration Accept restarts it once the context is set up
        ue.timers_mut().stop(TimerId::T3510);
        let pdu = builders::initial_context_setup_request(ue, peer, None)?;
        self.queue(outbox, &pdu)?;
        outbox.advance_to(DispatcherState::WaitingSessionOrServiceEvents);
        Ok(())
    }

    /// Handles the 5GSM payload; true when the subscriber should now start
    /// its own deregistration.
    fn on_ul_nas_transport(
        &self,
        ue: &mut Subscriber,
        outbox: &mut Outbox,
        transport: UlNasTransport,
    ) -> Result<bool, AmfError> {
        let sm = match NasMessage::decode(&transport.payload)? {
            NasMessage::Sm(sm) => sm,
            other => {
                info!("Ignoring {} in UL NAS Transport", other.name());
                return Ok(false);
            }
        };

        match sm.body {
            SmBody::EstablishmentRequest(_) => {
                self.on_establishment_request(ue, outbox, &transport, &sm)?;
                Ok(false)
            }
            SmBody::ReleaseRequest { .. } => {
                self.on_release_request(ue, outbox, &sm)?;
                Ok(false)
            }
            SmBody::ReleaseComplete { .. } => {
                ue.timers_mut().stop(TimerId::T3582);
                ue.delete_session(sm.pdu_session_id)?;
                info!(
                    "PDU session {} released, amf_ue_ngap_id={}",
                    sm.pdu_session_id,
                    ue.amf_ue_ngap_id()
                );
                Ok(true)
            }
            _ => {
                info!("Ignoring unexpected 5GSM message from subscriber");
                Ok(false)
            }
        }
    }

    fn on_establishment_request(
        &self,
        ue: &mut Subscriber,
        outbox: &mut Outbox,
        transport: &UlNasTransport,
        sm: &SmMessage,
    ) -> Result<(), AmfError> {
        let SmBody::EstablishmentRequest(request) = &sm.body else {
            return Ok(());
        };
        if transport.request_type != Some(RequestType::InitialRequest) {
            warn!(
                "Ignoring establishment with request type {:?}",
                transport.request_type
            );
            return Ok(());
        }

        let requested = transport.pdu_session_id.unwrap_or(sm.pdu_session_id);
        let id = if (MIN_SESSION_ID..=MAX_SESSION_ID).contains(&requested)
            && ue.session(requested).is_none()
        {
            requested
        } else {
            ue.allocate_session_id()?
        };
        let slice = transport.snssai.unwrap_or(ue.default_slice());
        let ambr = builders::session_ambr(ue);

        let session = ue.create_session(id, slice)?;
        session.session_type = request.pdu_session_type.unwrap_or_default();
        session.ambr = Some(ambr);
        session.qos_flows.insert(
            builders::DEFAULT_QFI,
            QosFlow {
                qfi: builders::DEFAULT_QFI,
                five_qi: DEFAULT_FIVE_QI,
                arp_priority: DEFAULT_ARP_PRIORITY,
            },
        );
        let rules = builders::default_qos_rules();
        ue.store_qos_rules(id, rules.clone());
        info!(
            "PDU session {} establishing, slice sst={} amf_ue_ngap_id={}",
            id,
            slice.sst,
            ue.amf_ue_ngap_id()
        );

        let accept = builders::pdu_session_establishment_accept(ue, id, sm.pti, rules)?;
        let nas = builders::protect(
            ue,
            &builders::dl_nas_transport(&accept)?,
            SecurityHeaderType::IntegrityProtectedAndCiphered,
            false,
        )?;
        let pdu = builders::pdu_session_resource_setup_request(ue, id, nas)?;
        self.queue_guarded(ue, outbox, TimerId::T3580, &pdu)
    }

    fn on_release_request(
        &self,
        ue: &mut Subscriber,
        outbox: &mut Outbox,
        sm: &SmMessage,
    ) -> Result<(), AmfError> {
        let id = sm.pdu_session_id;
        if ue.session(id).is_none() {
            return Err(AmfError::NotFound(format!("PDU session {id}")));
        }
        let command = builders::pdu_session_release_command(id, sm.pti, sm_cause::REGULAR_DEACTIVATION);
        let nas = builders::protect(
            ue,
            &builders::dl_nas_transport(&command)?,
            SecurityHeaderType::IntegrityProtectedAndCiphered,
            false,
        )?;
        let pdu = builders::pdu_session_resource_release_command(ue, id, nas);
        ue.set_session_state(id, SessionState::Releasing, None);
        self.queue_guarded(ue, outbox, TimerId::T3582, &pdu)
    }

    /// Subscriber-originated switch-off deregistration. At most one runs per
    /// subscriber; the gate is acquired without holding the subscriber lock.
    async fn start_deregistration(&self, shared: &SharedSubscriber) -> Result<(), AmfError> {
        let (gate, wait) = {
            let ue = shared.lock().await;
            (ue.deregistration_gate(), ue.timers().get(TimerId::T3521).interval())
        };

        let permit = tokio::time::timeout(wait, gate.acquire_owned())
            .await
            .map_err(|_| AmfError::Conflict("deregistration already in flight".to_string()))?
            .map_err(|_| AmfError::Conflict("deregistration gate closed".to_string()))?;

        let mut outbox = Outbox::default();
        {
            let mut ue = shared.lock().await;
            if ue.current_peer().is_none() {
                return Err(AmfError::NotFound(format!(
                    "subscriber amf_ue_ngap_id={} went away",
                    ue.amf_ue_ngap_id()
                )));
            }
            ue.hold_deregistration(permit);
            if let Err(e) = self.queue_deregistration_request(&mut ue, &mut outbox) {
                ue.release_deregistration();
                return Err(e);
            }
            info!("Deregistration started, amf_ue_ngap_id={}", ue.amf_ue_ngap_id());
        }
        // a failed send gives the gate back along with T3521
        self.flush(shared, outbox).await
    }

    fn queue_deregistration_request(
        &self,
        ue: &mut Subscriber,
        outbox: &mut Outbox,
    ) -> Result<(), AmfError> {
        let request = builders::deregistration_request(ue);
        let nas = builders::protect(
            ue,
            &request,
            SecurityHeaderType::IntegrityProtectedAndCiphered,
            false,
        )?;
        let pdu = builders::uplink_nas_transport(ue, nas)?;
        ue.transition(MobilityState::Deregistering)?;
        self.queue_guarded(ue, outbox, TimerId::T3521, &pdu)?;
        outbox.advance_to(DispatcherState::WaitingDeregistration);
        Ok(())
    }

    /// Device-originated deregistration.
    fn on_deregistration_request(
        &self,
        ue: &mut Subscriber,
        outbox: &mut Outbox,
        request: DeregistrationRequest,
    ) -> Result<(), AmfError> {
        info!(
            "Deregistration Request switch_off={} access={:?} amf_ue_ngap_id={}",
            request.switch_off,
            request.access_type,
            ue.amf_ue_ngap_id()
        );
        if !request.switch_off {
            let accept = NasMessage::Mm(MmMessage::DeregistrationAccept);
            let nas = builders::protect(
                ue,
                &accept,
                SecurityHeaderType::IntegrityProtectedAndCiphered,
                false,
            )?;
            let pdu = builders::downlink_nas_transport(ue, nas, None);
            self.queue(outbox, &pdu)?;
        }
        self.teardown(ue, outbox)
    }

    /// Ends a subscriber: the deregistration gate goes back, mobility moves
    /// to Deregistered and the context is destroyed. The dispatcher reaches
    /// Terminated once the outbox is flushed.
    fn teardown(&self, ue: &mut Subscriber, outbox: &mut Outbox) -> Result<(), AmfError> {
        ue.release_deregistration();
        ue.transition(MobilityState::Deregistered)?;
        ue.destroy();
        outbox.advance_to(DispatcherState::Terminated);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Timers and outbound queue
    // ------------------------------------------------------------------

    fn queue(&self, outbox: &mut Outbox, pdu: &NgapPdu) -> Result<(), AmfError> {
        let bytes = self.encode(pdu)?;
        outbox.frames.push(Outgoing { bytes, guard: None });
        Ok(())
    }

    /// Queues `pdu` and arms `timer` to retransmit it. The timer task only
    /// starts once the PDU has actually been sent.
    fn queue_guarded(
        &self,
        ue: &mut Subscriber,
        outbox: &mut Outbox,
        timer: TimerId,
        pdu: &NgapPdu,
    ) -> Result<(), AmfError> {
        let bytes = self.encode(pdu)?;
        let ticket = ue.timers_mut().start(timer, Some(bytes.clone()));
        outbox.frames.push(Outgoing {
            bytes,
            guard: Some(ticket),
        });
        Ok(())
    }

    /// Sends everything queued, in order. Must be called without the
    /// subscriber lock held. On a failed send the timers of the unsent
    /// frames are cancelled and the dispatcher state is left as it was.
    async fn flush(&self, shared: &SharedSubscriber, outbox: Outbox) -> Result<(), AmfError> {
        let Outbox { frames, advance } = outbox;
        let mut frames = frames.into_iter();
        while let Some(frame) = frames.next() {
            if let Err(e) = self.send_bytes(frame.bytes).await {
                let unsent: Vec<TimerTicket> = std::iter::once(frame.guard)
                    .chain(frames.by_ref().map(|f| f.guard))
                    .flatten()
                    .collect();
                self.rollback(shared, &unsent).await;
                return Err(e);
            }
            if let Some(ticket) = frame.guard {
                tokio::spawn(self.clone().run_timer(Arc::downgrade(shared), ticket));
            }
        }
        if let Some(state) = advance {
            self.advance(state);
        }
        Ok(())
    }

    async fn rollback(&self, shared: &SharedSubscriber, tickets: &[TimerTicket]) {
        if tickets.is_empty() {
            return;
        }
        let mut ue = shared.lock().await;
        for ticket in tickets {
            if !ue.timers_mut().cancel(ticket) {
                continue;
            }
            debug!(
                "{} cancelled after a failed send, amf_ue_ngap_id={}",
                ticket.id,
                ue.amf_ue_ngap_id()
            );
            if ticket.id == TimerId::T3521 {
                ue.release_deregistration();
            }
        }
    }

    fn run_timer(
        self,
        ue: Weak<Mutex<Subscriber>>,
        ticket: TimerTicket,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'static>> {
        Box::pin(async move { loop {
            tokio::time::sleep(ticket.interval).await;
            let Some(shared) = ue.upgrade() else {
                return;
            };
            let mut ue = shared.lock().await;
            let expiry = ue.timers_mut().expire(ticket.id, ticket.generation);
            match expiry {
                TimerExpiry::Stale => return,
                TimerExpiry::Expired => {
                    debug!("{} expired, amf_ue_ngap_id={}", ticket.id, ue.amf_ue_ngap_id());
                    return;
                }
                TimerExpiry::Retransmit { pdu, attempt } => {
                    warn!(
                        "{} expired, retransmitting (attempt {}) amf_ue_ngap_id={}",
                        ticket.id,
                        attempt,
                        ue.amf_ue_ngap_id()
                    );
                    drop(ue);
                    if let Err(e) = self.send_bytes(pdu).await {
                        error!("Retransmission failed: {}", e);
                        self.rollback(&shared, &[ticket]).await;
                        return;
                    }
                }
                TimerExpiry::Exhausted { attempts } => {
                    let mut outbox = Outbox::default();
                    if let Err(e) = self.abandon(&mut ue, &mut outbox, ticket.id, attempts) {
                        error!("Abandoning {} failed: {}", ticket.id, e);
                    }
                    drop(ue);
                    if let Err(e) = self.flush(&shared, outbox).await {
                        error!("Flush after {} failed: {}", ticket.id, e);
                    }
                    return;
                }
            }
        } })
    }

    fn abandon(
        &self,
        ue: &mut Subscriber,
        outbox: &mut Outbox,
        timer: TimerId,
        attempts: u32,
    ) -> Result<(), AmfError> {
        warn!(
            "{} exhausted after {} attempts, amf_ue_ngap_id={}",
            timer,
            attempts,
            ue.amf_ue_ngap_id()
        );
        match timer {
            TimerId::T3510 => ue.destroy(),
            TimerId::T3521 => self.teardown(ue, outbox)?,
            TimerId::T3580 => mark_sessions(
                ue,
                SessionState::Establishing,
                SessionState::EstablishmentFailed,
                "T3580 expired",
            ),
            TimerId::T3582 => mark_sessions(
                ue,
                SessionState::Releasing,
                SessionState::ReleaseRejected,
                "T3582 expired",
            ),
            _ => {}
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------

    fn require_peer(&self) -> Result<Arc<PeerContext>, AmfError> {
        self.peer()
            .ok_or_else(|| AmfError::NotFound("NG Setup has not completed".to_string()))
    }

    fn lookup(&self, amf_ue_ngap_id: u64) -> Result<(Arc<PeerContext>, SharedSubscriber), AmfError> {
        let id = u32::try_from(amf_ue_ngap_id).map_err(|_| {
            AmfError::ProtocolViolation(ProcedureError::InvalidIeValue {
                id: ProtocolIeId::AmfUeNgapId,
                reason: format!("{amf_ue_ngap_id} out of range"),
            })
        })?;
        let peer = self.require_peer()?;
        let subscriber = peer
            .get(id)
            .ok_or_else(|| AmfError::NotFound(format!("subscriber amf_ue_ngap_id={id}")))?;
        Ok((peer, subscriber))
    }

    fn encode(&self, pdu: &NgapPdu) -> Result<Vec<u8>, AmfError> {
        let bytes = self.shared.codec.encode(pdu)?;
        log_ngap_message(Direction::Tx, &pdu.name(), &bytes);
        Ok(bytes)
    }

    async fn send_pdu(&self, pdu: &NgapPdu) -> Result<(), AmfError> {
        let bytes = self.encode(pdu)?;
        self.send_bytes(bytes).await
    }

    async fn send_bytes(&self, bytes: Vec<u8>) -> Result<(), AmfError> {
        self.shared
            .outbound
            .send(bytes)
            .await
            .map_err(|_| AmfError::Transport(TransportError::Closed))
    }

    fn advance(&self, to: DispatcherState) {
        self.shared.state.send_if_modified(|state| {
            if *state == to {
                return false;
            }
            info!("Dispatcher {} -> {}", state, to);
            *state = to;
            true
        });
    }
}

/// One encoded PDU and the timer guarding it, if any.
#[derive(Debug)]
struct Outgoing {
    bytes: Vec<u8>,
    guard: Option<TimerTicket>,
}

/// PDUs built under a subscriber lock, sent after the lock is released.
#[derive(Debug, Default)]
struct Outbox {
    frames: Vec<Outgoing>,
    advance: Option<DispatcherState>,
}

impl Outbox {
    /// Dispatcher state to enter once every frame went out.
    fn advance_to(&mut self, state: DispatcherState) {
        self.advance = Some(state);
    }
}

/// Decodes a NAS PDU under the subscriber's context. A failed MAC check is
/// reported but does not stop the procedure.
fn decode_nas(ue: &mut Subscriber, bytes: &[u8]) -> Result<NasMessage, AmfError> {
    let msg = ue.security_mut().decode(bytes)?;
    log_nas_message(Direction::Rx, &msg.name(), bytes);
    if ue.security().mac_failed() {
        warn!(
            "NAS MAC check failed for {} amf_ue_ngap_id={}, continuing",
            msg.name(),
            ue.amf_ue_ngap_id()
        );
    }
    Ok(msg)
}

fn on_registration_complete(ue: &mut Subscriber) -> Result<(), AmfError> {
    ue.timers_mut().stop(TimerId::T3510);
    ue.transition(MobilityState::Registered)?;
    info!("Subscriber amf_ue_ngap_id={} registered", ue.amf_ue_ngap_id());
    Ok(())
}

fn mark_sessions(ue: &mut Subscriber, from: SessionState, to: SessionState, cause: &str) {
    let ids: Vec<u8> = ue
        .sessions()
        .map(|s| s.id)
        .filter(|id| ue.extended_state(*id).map(|e| e.state) == Some(from))
        .collect();
    for id in ids {
        ue.set_session_state(id, to, Some(cause.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simamf_ngap::procedures::nas_transport::{build_initial_ue_message, InitialUeMessageParams};
    use simamf_ngap::procedures::ng_setup::{
        build_ng_setup_request, parse_ng_setup_response, NgSetupRequestParams,
    };
    use simamf_ngap::procedures::overload::parse_overload_start;
    use simamf_ngap::procedures::ue_context_release::{
        build_ue_context_release_request, UeContextReleaseRequestParams,
    };
    use simamf_ngap::{OverloadAction, TlvCodec};

    fn dispatcher() -> (Dispatcher, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(16);
        (Dispatcher::new(SimConfig::default(), Arc::new(TlvCodec), tx), rx)
    }

    fn ng_setup_request() -> Vec<u8> {
        let pdu = build_ng_setup_request(&NgSetupRequestParams {
            global_ran_node_id: vec![0x02, 0xf8, 0x39, 0x00, 0x01],
            ran_node_name: Some("wagf-1".to_string()),
        });
        TlvCodec.encode(&pdu).unwrap()
    }

    #[tokio::test]
    async fn test_ng_setup_creates_peer() {
        let (dispatcher, mut rx) = dispatcher();
        assert_eq!(dispatcher.state(), DispatcherState::WaitingNgSetup);
        dispatcher.dispatch(&ng_setup_request()).await.unwrap();

        let response = TlvCodec.decode(&rx.recv().await.unwrap()).unwrap();
        let params = parse_ng_setup_response(&response).unwrap();
        assert_eq!(params.amf_name, "TestAMF1");
        assert_eq!(params.relative_amf_capacity, 200);
        assert_eq!(dispatcher.state(), DispatcherState::WaitingInitialUe);
        assert_eq!(dispatcher.peer().unwrap().name(), "TestAMF1");
    }

    #[tokio::test]
    async fn test_initial_ue_before_setup_is_rejected() {
        let (dispatcher, _rx) = dispatcher();
        let pdu = build_initial_ue_message(&InitialUeMessageParams {
            ran_ue_ngap_id: 1,
            nas_pdu: vec![0x7e, 0x00, 0x43],
            user_location: None,
        });
        let err = dispatcher
            .dispatch(&TlvCodec.encode(&pdu).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, AmfError::NotFound(_)));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_garbage_is_a_decode_error() {
        let (dispatcher, _rx) = dispatcher();
        let err = dispatcher.dispatch(&[0xff, 0x00]).await.unwrap_err();
        assert!(matches!(err, AmfError::Decode(_)));
    }

    #[tokio::test]
    async fn test_unknown_ue_is_not_found() {
        let (dispatcher, mut rx) = dispatcher();
        dispatcher.dispatch(&ng_setup_request()).await.unwrap();
        rx.recv().await.unwrap();

        let pdu = build_ue_context_release_request(&UeContextReleaseRequestParams {
            amf_ue_ngap_id: 42,
            ran_ue_ngap_id: 1,
            cause: Cause::RADIO_NETWORK_UNSPECIFIED,
        });
        let err = dispatcher
            .dispatch(&TlvCodec.encode(&pdu).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, AmfError::NotFound(_)));

        let pdu = build_ue_context_release_request(&UeContextReleaseRequestParams {
            amf_ue_ngap_id: u64::from(u32::MAX) + 1,
            ran_ue_ngap_id: 1,
            cause: Cause::RADIO_NETWORK_UNSPECIFIED,
        });
        let err = dispatcher
            .dispatch(&TlvCodec.encode(&pdu).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, AmfError::ProtocolViolation(_)));
    }

    #[tokio::test]
    async fn test_unhandled_procedure_is_ignored() {
        let (dispatcher, mut rx) = dispatcher();
        let pdu = build_overload_stop();
        dispatcher
            .dispatch(&TlvCodec.encode(&pdu).unwrap())
            .await
            .unwrap();
        assert!(rx.try_recv().is_err());
        assert_eq!(dispatcher.state(), DispatcherState::WaitingNgSetup);
    }

    fn shared_subscriber() -> SharedSubscriber {
        Arc::new(Mutex::new(Subscriber::from_config(&SimConfig::default()).unwrap()))
    }

    #[tokio::test]
    async fn test_failed_send_leaves_no_timer_running() {
        let (dispatcher, rx) = dispatcher();
        drop(rx);
        let shared = shared_subscriber();

        let mut outbox = Outbox::default();
        {
            let mut ue = shared.lock().await;
            dispatcher
                .queue_guarded(&mut ue, &mut outbox, TimerId::T3580, &build_overload_stop())
                .unwrap();
            dispatcher
                .queue_guarded(&mut ue, &mut outbox, TimerId::T3521, &build_overload_stop())
                .unwrap();
            let permit = ue.deregistration_gate().try_acquire_owned().unwrap();
            ue.hold_deregistration(permit);
            assert_eq!(ue.timers().running(), vec![TimerId::T3521, TimerId::T3580]);
        }
        outbox.advance_to(DispatcherState::Terminated);

        let err = dispatcher.flush(&shared, outbox).await.unwrap_err();
        assert!(matches!(err, AmfError::Transport(TransportError::Closed)));

        let ue = shared.lock().await;
        assert!(ue.timers().running().is_empty());
        assert!(!ue.deregistration_in_flight());
        assert_eq!(dispatcher.state(), DispatcherState::WaitingNgSetup);
    }

    #[tokio::test]
    async fn test_full_outbound_queue_does_not_hold_the_subscriber() {
        let (tx, mut rx) = mpsc::channel(1);
        let dispatcher = Dispatcher::new(SimConfig::default(), Arc::new(TlvCodec), tx);
        dispatcher.dispatch(&ng_setup_request()).await.unwrap();
        rx.recv().await.unwrap();

        let shared = shared_subscriber();
        {
            let mut ue = shared.lock().await;
            ue.set_amf_ue_ngap_id(1);
            ue.set_ran_ue_ngap_id(7);
            ue.attach(&dispatcher.peer().unwrap());
        }
        dispatcher.peer().unwrap().insert(1, Arc::clone(&shared)).unwrap();

        // fill the queue so the next send has to wait
        dispatcher.send_bytes(vec![0]).await.unwrap();
        let request = build_ue_context_release_request(&UeContextReleaseRequestParams {
            amf_ue_ngap_id: 1,
            ran_ue_ngap_id: 7,
            cause: Cause::RADIO_NETWORK_UNSPECIFIED,
        });
        let bytes = TlvCodec.encode(&request).unwrap();
        let handling = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.dispatch(&bytes).await })
        };
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }

        assert!(!handling.is_finished());
        assert!(shared.try_lock().is_ok());

        assert_eq!(rx.recv().await.unwrap(), vec![0]);
        handling.await.unwrap().unwrap();
        let sent = TlvCodec.decode(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(sent.procedure_code(), ProcedureCode::UeContextRelease);
    }

    #[tokio::test]
    async fn test_overload_start_and_stop() {
        let (dispatcher, mut rx) = dispatcher();
        dispatcher.dispatch(&ng_setup_request()).await.unwrap();
        rx.recv().await.unwrap();

        assert!(dispatcher
            .start_overload(&OverloadStartParams::default())
            .await
            .unwrap()
            .is_none());
        assert!(rx.try_recv().is_err());

        let params = OverloadStartParams {
            action: Some(OverloadAction::RejectRrcCrSignalling),
            traffic_load_reduction: Some(50),
            slices: vec![],
        };
        let record = dispatcher.start_overload(&params).await.unwrap().unwrap();
        assert_eq!(record.traffic_load_reduction, Some(50));
        let sent = TlvCodec.decode(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(parse_overload_start(&sent).unwrap(), params);

        dispatcher.stop_overload().await.unwrap();
        let sent = TlvCodec.decode(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(sent.procedure_code(), ProcedureCode::OverloadStop);
        assert!(dispatcher.peer().unwrap().overload().is_none());
    }
}
