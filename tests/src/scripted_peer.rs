//! Scripted access-node peer
//!
//! Plays the W-AGF side of one association against a running [`SimAmf`]:
//! it sends the NGAP a real access node would send, reads what the engine
//! answers, and keeps a device-side NAS security context so protected NAS
//! can be checked in both directions.

use std::sync::Arc;
use std::time::Duration;

use simamf_amf::{
    Association, ChannelAssociation, Dispatcher, Frame, MobilityState, SessionState, SimAmf,
};
use simamf_common::config::LineType;
use simamf_common::{SimConfig, SNssai};
use simamf_crypto::{CipheringAlgorithm, IntegrityAlgorithm};
use simamf_nas::{
    wireline_mobile_identity, GlobalLineId, MmMessage, NasMessage, NasSecurityContext, NgKsi,
    PayloadContainerType, Perspective, PduSessionEstablishmentRequest, PduSessionType,
    RegistrationRequest, RequestType, SecurityHeaderType, SecurityModeComplete, SmBody,
    SmMessage, UeSecurityCapability, UlNasTransport,
};
use simamf_ngap::procedures::initial_context_setup::{
    build_initial_context_setup_response, parse_initial_context_setup_request,
    InitialContextSetupRequestParams, InitialContextSetupResponseParams,
};
use simamf_ngap::procedures::nas_transport::{
    build_downlink_nas_transport, build_initial_ue_message, build_uplink_nas_transport,
    parse_downlink_nas_transport, parse_uplink_nas_transport, DownlinkNasTransportParams,
    InitialUeMessageParams, UplinkNasTransportParams,
};
use simamf_ngap::procedures::pdu_session_resource::{
    build_pdu_session_resource_setup_response, parse_pdu_session_resource_setup_request,
    PduSessionResourceSetupRequestParams, PduSessionResourceSetupResponseParams,
};
use simamf_ngap::procedures::ng_setup::{
    build_ng_setup_request, parse_ng_setup_response, NgSetupRequestParams, NgSetupResponseParams,
};
use simamf_ngap::{
    NgapCodec, NgapPdu, PduKind, PduSessionResourceItem, ProcedureCode, TlvCodec,
    UserLocationInformation,
};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::debug;

use crate::test_utils::{
    wait_for_condition, TestResult, DEFAULT_POLL_INTERVAL, DEFAULT_TEST_TIMEOUT,
};

/// RAN UE NGAP id the peer assigns to its only subscriber.
pub const RAN_UE_NGAP_ID: u32 = 1;

/// Procedure transaction identity used for 5GSM requests.
pub const PTI: u8 = 1;

pub struct ScriptedPeer {
    association: ChannelAssociation,
    codec: TlvCodec,
    config: SimConfig,
    /// Device-side NAS security context
    pub security: NasSecurityContext,
    pub amf_ue_ngap_id: Option<u64>,
    dispatcher: Dispatcher,
    engine: JoinHandle<()>,
}

impl ScriptedPeer {
    /// Starts an engine with `config` and connects a peer to it.
    ///
    /// The device context is activated with the configured algorithms and
    /// keys up front, standing in for the key derivation a real device runs.
    pub fn start(config: SimConfig) -> TestResult<Self> {
        let (engine_end, peer_end) = ChannelAssociation::pair(32);
        let amf = SimAmf::new(config.clone(), Arc::new(engine_end));
        let dispatcher = amf.dispatcher();
        let engine = tokio::spawn(async move {
            if let Err(e) = amf.run().await {
                debug!("engine stopped: {}", e);
            }
        });

        let mut security = NasSecurityContext::new(Perspective::Device);
        security.activate(
            NgKsi::no_key(),
            CipheringAlgorithm::try_from(config.security.ciphering)?,
            IntegrityAlgorithm::try_from(config.security.integrity)?,
            config.security.knas_int_bytes()?,
            config.security.knas_enc_bytes()?,
        );

        Ok(Self {
            association: peer_end,
            codec: TlvCodec,
            config,
            security,
            amf_ue_ngap_id: None,
            dispatcher,
            engine,
        })
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn amf_id(&self) -> TestResult<u64> {
        self.amf_ue_ngap_id.ok_or_else(|| "no AMF UE NGAP id yet".into())
    }

    // ------------------------------------------------------------------
    // Raw NGAP
    // ------------------------------------------------------------------

    pub async fn send(&self, pdu: &NgapPdu) -> TestResult {
        let bytes = self.codec.encode(pdu)?;
        self.association.send(Frame::ngap(bytes)).await?;
        Ok(())
    }

    pub async fn send_raw(&self, frame: Frame) -> TestResult {
        self.association.send(frame).await?;
        Ok(())
    }

    pub async fn recv(&self) -> TestResult<NgapPdu> {
        self.recv_within(DEFAULT_TEST_TIMEOUT).await
    }

    pub async fn recv_within(&self, wait: Duration) -> TestResult<NgapPdu> {
        let frame = timeout(wait, self.association.recv())
            .await
            .map_err(|_| format!("no PDU from the engine within {wait:?}"))??
            .ok_or("association closed")?;
        Ok(self.codec.decode(&frame.payload)?)
    }

    /// Next PDU, which must be `procedure` of `kind`.
    pub async fn expect(&self, procedure: ProcedureCode, kind: PduKind) -> TestResult<NgapPdu> {
        let pdu = self.recv().await?;
        if pdu.procedure_code() != procedure || pdu.kind() != kind {
            return Err(format!("expected {procedure:?} {kind:?}, got {}", pdu.name()).into());
        }
        Ok(pdu)
    }

    /// True when nothing arrives within `wait`.
    pub async fn is_quiet(&self, wait: Duration) -> bool {
        timeout(wait, self.association.recv()).await.is_err()
    }

    // ------------------------------------------------------------------
    // NAS helpers
    // ------------------------------------------------------------------

    pub fn user_location(&self) -> UserLocationInformation {
        UserLocationInformation {
            global_line_id: self.global_line_id().to_base64().into_bytes(),
            line_type: Some(LineType::Pon),
        }
    }

    fn global_line_id(&self) -> GlobalLineId {
        let profile = &self.config.subscriber;
        GlobalLineId::from_components(
            Some(profile.circuit_id.as_str()),
            Some(profile.remote_id.as_str()),
        )
    }

    /// Protects `msg` with the device context.
    pub fn protect(&mut self, msg: &NasMessage, sht: SecurityHeaderType) -> TestResult<Vec<u8>> {
        Ok(self.security.encode(msg, sht, false)?)
    }

    pub async fn send_uplink_nas(&mut self, msg: &NasMessage, sht: SecurityHeaderType) -> TestResult {
        let nas_pdu = self.protect(msg, sht)?;
        self.send_uplink_nas_bytes(nas_pdu).await
    }

    pub async fn send_uplink_nas_bytes(&self, nas_pdu: Vec<u8>) -> TestResult {
        let pdu = build_uplink_nas_transport(&UplinkNasTransportParams {
            amf_ue_ngap_id: self.amf_id()?,
            ran_ue_ngap_id: RAN_UE_NGAP_ID,
            nas_pdu,
            user_location: self.user_location(),
        });
        self.send(&pdu).await
    }

    /// Answers a subscriber-originated procedure the engine started.
    pub async fn send_downlink_nas(&mut self, msg: &NasMessage, sht: SecurityHeaderType) -> TestResult {
        let nas_pdu = self.protect(msg, sht)?;
        let pdu = build_downlink_nas_transport(&DownlinkNasTransportParams {
            amf_ue_ngap_id: self.amf_id()?,
            ran_ue_ngap_id: RAN_UE_NGAP_ID,
            old_amf: None,
            nas_pdu,
            allowed_nssai: None,
        });
        self.send(&pdu).await
    }

    /// Reads a DownlinkNASTransport and decodes its NAS with the device context.
    pub async fn recv_downlink_nas(&mut self) -> TestResult<(DownlinkNasTransportParams, NasMessage)> {
        let pdu = self
            .expect(ProcedureCode::DownlinkNasTransport, PduKind::InitiatingMessage)
            .await?;
        let params = parse_downlink_nas_transport(&pdu)?;
        let msg = self.security.decode(&params.nas_pdu)?;
        if self.security.mac_failed() {
            return Err(format!("MAC check failed on {}", msg.name()).into());
        }
        Ok((params, msg))
    }

    /// Reads an UplinkNASTransport the engine sent on the subscriber's behalf.
    pub async fn recv_uplink_nas(&mut self) -> TestResult<(UplinkNasTransportParams, NasMessage)> {
        let pdu = self
            .expect(ProcedureCode::UplinkNasTransport, PduKind::InitiatingMessage)
            .await?;
        let params = parse_uplink_nas_transport(&pdu)?;
        let msg = self.security.decode(&params.nas_pdu)?;
        if self.security.mac_failed() {
            return Err(format!("MAC check failed on {}", msg.name()).into());
        }
        Ok((params, msg))
    }

    /// Decodes NAS the engine placed inside another PDU.
    pub fn open_nas(&mut self, nas_pdu: &[u8]) -> TestResult<NasMessage> {
        let msg = self.security.decode(nas_pdu)?;
        if self.security.mac_failed() {
            return Err(format!("MAC check failed on {}", msg.name()).into());
        }
        Ok(msg)
    }

    // ------------------------------------------------------------------
    // Procedures
    // ------------------------------------------------------------------

    pub async fn ng_setup(&self) -> TestResult<NgSetupResponseParams> {
        let request = build_ng_setup_request(&NgSetupRequestParams {
            global_ran_node_id: vec![0x02, 0xf8, 0x39, 0x00, 0x01],
            ran_node_name: Some("wagf-1".to_string()),
        });
        self.send(&request).await?;
        let response = self
            .expect(ProcedureCode::NgSetup, PduKind::SuccessfulOutcome)
            .await?;
        Ok(parse_ng_setup_response(&response)?)
    }

    pub fn registration_request(&self) -> TestResult<NasMessage> {
        let line = self.global_line_id();
        let mac = self.config.subscriber.mac_bytes()?;
        Ok(MmMessage::RegistrationRequest(RegistrationRequest {
            registration_type: 0x01,
            ng_ksi: NgKsi::no_key(),
            mobile_identity: wireline_mobile_identity(Some(&line), Some(mac)),
            ue_security_capability: Some(UeSecurityCapability::null_only()),
            requested_nssai: None,
        })
        .into())
    }

    /// Sends a plain Registration Request in an InitialUEMessage and reads
    /// back the Security Mode Command.
    pub async fn start_registration(&mut self) -> TestResult<(DownlinkNasTransportParams, NasMessage)> {
        let request = self.registration_request()?;
        let pdu = build_initial_ue_message(&InitialUeMessageParams {
            ran_ue_ngap_id: RAN_UE_NGAP_ID,
            nas_pdu: request.encode()?,
            user_location: Some(self.user_location()),
        });
        self.send(&pdu).await?;

        let (params, msg) = self.recv_downlink_nas().await?;
        self.amf_ue_ngap_id = Some(params.amf_ue_ngap_id);
        Ok((params, msg))
    }

    pub async fn complete_security_mode(&mut self) -> TestResult<InitialContextSetupRequestParams> {
        let complete: NasMessage =
            MmMessage::SecurityModeComplete(SecurityModeComplete::default()).into();
        self.send_uplink_nas(
            &complete,
            SecurityHeaderType::IntegrityProtectedAndCipheredWithNew5gNasSecurityContext,
        )
        .await?;
        let pdu = self
            .expect(ProcedureCode::InitialContextSetup, PduKind::InitiatingMessage)
            .await?;
        Ok(parse_initial_context_setup_request(&pdu)?)
    }

    /// Answers InitialContextSetup and returns the Registration Accept.
    pub async fn complete_context_setup(&mut self) -> TestResult<NasMessage> {
        let response = build_initial_context_setup_response(&InitialContextSetupResponseParams {
            amf_ue_ngap_id: self.amf_id()?,
            ran_ue_ngap_id: RAN_UE_NGAP_ID,
        });
        self.send(&response).await?;
        let (_, msg) = self.recv_downlink_nas().await?;
        Ok(msg)
    }

    /// NG Setup through Registration Complete.
    pub async fn register(&mut self) -> TestResult {
        self.ng_setup().await?;
        self.start_registration().await?;
        self.complete_security_mode().await?;
        self.complete_context_setup().await?;
        self.send_uplink_nas(
            &MmMessage::RegistrationComplete.into(),
            SecurityHeaderType::IntegrityProtectedAndCiphered,
        )
        .await
    }

    /// Wraps a 5GSM message in UL NAS Transport.
    pub fn ul_sm(
        &self,
        sm: SmMessage,
        request_type: Option<RequestType>,
        snssai: Option<SNssai>,
    ) -> TestResult<NasMessage> {
        Ok(MmMessage::UlNasTransport(UlNasTransport {
            payload_container_type: PayloadContainerType::N1SmInformation,
            pdu_session_id: Some(sm.pdu_session_id),
            payload: NasMessage::Sm(sm).encode()?,
            request_type,
            snssai,
            dnn: Some("internet".to_string()),
        })
        .into())
    }

    pub async fn request_session(&mut self, pdu_session_id: u8) -> TestResult {
        let sm = SmMessage {
            pdu_session_id,
            pti: PTI,
            body: SmBody::EstablishmentRequest(PduSessionEstablishmentRequest {
                max_data_rate: [0xff, 0xff],
                pdu_session_type: Some(PduSessionType::Ipv4),
                ssc_mode: None,
            }),
        };
        let msg = self.ul_sm(sm, Some(RequestType::InitialRequest), None)?;
        self.send_uplink_nas(&msg, SecurityHeaderType::IntegrityProtectedAndCiphered)
            .await
    }

    pub async fn send_sm(&mut self, pdu_session_id: u8, body: SmBody) -> TestResult {
        let msg = self.ul_sm(
            SmMessage {
                pdu_session_id,
                pti: PTI,
                body,
            },
            None,
            None,
        )?;
        self.send_uplink_nas(&msg, SecurityHeaderType::IntegrityProtectedAndCiphered)
            .await
    }
}

impl ScriptedPeer {
    /// Registers and waits until the engine has processed Registration Complete.
    pub async fn register_and_settle(&mut self) -> TestResult {
        self.register().await?;
        let this = &*self;
        wait_for_condition(
            || async move { this.mobility_state().await == Some(MobilityState::Registered) },
            DEFAULT_TEST_TIMEOUT,
            DEFAULT_POLL_INTERVAL,
        )
        .await
    }

    pub async fn mobility_state(&self) -> Option<MobilityState> {
        let id = u32::try_from(self.amf_ue_ngap_id?).ok()?;
        let subscriber = self.dispatcher.subscriber(id)?;
        let state = subscriber.lock().await.mobility_state();
        Some(state)
    }

    pub async fn session_state(&self, pdu_session_id: u8) -> Option<SessionState> {
        let id = u32::try_from(self.amf_ue_ngap_id?).ok()?;
        let subscriber = self.dispatcher.subscriber(id)?;
        let ue = subscriber.lock().await;
        ue.extended_state(pdu_session_id).map(|e| e.state)
    }

    pub async fn expect_setup_request(&self) -> TestResult<PduSessionResourceSetupRequestParams> {
        let pdu = self
            .expect(ProcedureCode::PduSessionResourceSetup, PduKind::InitiatingMessage)
            .await?;
        Ok(parse_pdu_session_resource_setup_request(&pdu)?)
    }

    /// Sends a PDUSessionResourceSetupResponse listing `setup` and `failed`.
    pub async fn answer_setup(&self, setup: &[u8], failed: &[u8]) -> TestResult {
        let items = |ids: &[u8]| -> Vec<PduSessionResourceItem> {
            ids.iter()
                .map(|&pdu_session_id| PduSessionResourceItem {
                    pdu_session_id,
                    transfer: Vec::new(),
                })
                .collect()
        };
        let response =
            build_pdu_session_resource_setup_response(&PduSessionResourceSetupResponseParams {
                amf_ue_ngap_id: self.amf_id()?,
                ran_ue_ngap_id: RAN_UE_NGAP_ID,
                setup: items(setup),
                failed: items(failed),
            });
        self.send(&response).await
    }

    /// Requests session `id`, answers the setup and waits for Established.
    pub async fn establish_session(&mut self, pdu_session_id: u8) -> TestResult {
        self.request_session(pdu_session_id).await?;
        self.expect_setup_request().await?;
        self.answer_setup(&[pdu_session_id], &[]).await?;
        let this = &*self;
        wait_for_condition(
            || async move {
                this.session_state(pdu_session_id).await == Some(SessionState::Established)
            },
            DEFAULT_TEST_TIMEOUT,
            DEFAULT_POLL_INTERVAL,
        )
        .await
    }
}

impl Drop for ScriptedPeer {
    fn drop(&mut self) {
        self.engine.abort();
    }
}
