//! Simulated AMF peer context
//!
//! Created when the access node completes NG Setup and kept for the life of
//! the association. Holds what the AMF advertised, the overload record and
//! the AMF UE NGAP id index of attached subscribers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use simamf_common::{AmfIdentityConfig, Guami, PlmnSupport, SNssai};
use simamf_ngap::procedures::overload::OverloadStartParams;
use simamf_ngap::{OverloadAction, SliceOverloadItem};
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use super::subscriber::{Subscriber, AMF_UE_NGAP_ID_UNSPECIFIED};
use crate::error::AmfError;

pub type SharedSubscriber = Arc<Mutex<Subscriber>>;

/// Overload control state set by OverloadStart and cleared by OverloadStop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverloadRecord {
    pub action: Option<OverloadAction>,
    pub traffic_load_reduction: Option<u8>,
    pub slices: Vec<SliceOverloadItem>,
}

#[derive(Debug)]
pub struct PeerContext {
    name: String,
    served_guamis: Vec<Guami>,
    relative_capacity: u8,
    plmn_support: Vec<PlmnSupport>,
    /// Encoded NGAP PDUs queued for the association writer
    outbound: mpsc::Sender<Vec<u8>>,
    id_base: u32,
    next_id: AtomicU32,
    subscribers: RwLock<HashMap<u32, SharedSubscriber>>,
    overload: RwLock<Option<OverloadRecord>>,
}

impl PeerContext {
    pub fn new(identity: &AmfIdentityConfig, outbound: mpsc::Sender<Vec<u8>>) -> Self {
        Self {
            name: identity.name.clone(),
            served_guamis: identity.served_guamis.clone(),
            relative_capacity: identity.relative_capacity,
            plmn_support: identity.plmn_support.clone(),
            outbound,
            id_base: identity.ue_ngap_id_base,
            next_id: AtomicU32::new(identity.ue_ngap_id_base),
            subscribers: RwLock::new(HashMap::new()),
            overload: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn served_guamis(&self) -> &[Guami] {
        &self.served_guamis
    }

    pub fn relative_capacity(&self) -> u8 {
        self.relative_capacity
    }

    pub fn plmn_support(&self) -> &[PlmnSupport] {
        &self.plmn_support
    }

    /// Slices of the first PLMN support entry, used as the allowed NSSAI.
    pub fn allowed_nssai(&self) -> Vec<SNssai> {
        self.plmn_support
            .first()
            .map(|p| p.slices.clone())
            .unwrap_or_default()
    }

    pub fn outbound(&self) -> &mpsc::Sender<Vec<u8>> {
        &self.outbound
    }

    /// Whether the GUAMI a subscriber asked for is one this AMF serves.
    pub fn serves_guami(&self, guami: &Guami) -> bool {
        self.served_guamis.iter().any(|served| served == guami)
    }

    /// Next AMF UE NGAP id not currently in the index. The unassigned
    /// sentinel is never handed out.
    pub fn allocate_ue_ngap_id(&self) -> Result<u32, AmfError> {
        let base = self.id_base;
        for _ in 0..=self.len() {
            let id = self
                .next_id
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |cur| {
                    Some(if cur >= AMF_UE_NGAP_ID_UNSPECIFIED - 1 {
                        base
                    } else {
                        cur + 1
                    })
                })
                .unwrap_or(base);
            if id != AMF_UE_NGAP_ID_UNSPECIFIED && !self.contains(id) {
                return Ok(id);
            }
        }
        Err(AmfError::ResourceExhausted)
    }

    /// Inserts a subscriber unless the id is already taken.
    pub fn insert(&self, amf_ue_ngap_id: u32, subscriber: SharedSubscriber) -> Result<(), AmfError> {
        if amf_ue_ngap_id == AMF_UE_NGAP_ID_UNSPECIFIED {
            return Err(AmfError::Conflict("cannot index an unassigned AMF UE NGAP id".into()));
        }
        let mut index = self.write_index();
        if index.contains_key(&amf_ue_ngap_id) {
            return Err(AmfError::Conflict(format!(
                "AMF UE NGAP id {amf_ue_ngap_id} already in use"
            )));
        }
        index.insert(amf_ue_ngap_id, subscriber);
        debug!("Indexed subscriber amf_ue_ngap_id={} on {}", amf_ue_ngap_id, self.name);
        Ok(())
    }

    pub fn get(&self, amf_ue_ngap_id: u32) -> Option<SharedSubscriber> {
        self.read_index().get(&amf_ue_ngap_id).cloned()
    }

    pub fn remove(&self, amf_ue_ngap_id: u32) -> Option<SharedSubscriber> {
        self.write_index().remove(&amf_ue_ngap_id)
    }

    pub fn contains(&self, amf_ue_ngap_id: u32) -> bool {
        self.read_index().contains_key(&amf_ue_ngap_id)
    }

    pub fn len(&self) -> usize {
        self.read_index().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.write_index().clear();
    }

    /// Records an overload indication. Returns `None`, leaving any previous
    /// record in place, when the indication carries nothing.
    pub fn start_overload(&self, params: &OverloadStartParams) -> Option<OverloadRecord> {
        if params.action.is_none()
            && params.traffic_load_reduction.is_none()
            && params.slices.is_empty()
        {
            return None;
        }
        let record = OverloadRecord {
            action: params.action,
            traffic_load_reduction: params.traffic_load_reduction,
            slices: params.slices.clone(),
        };
        *self.overload.write().unwrap_or_else(PoisonError::into_inner) = Some(record.clone());
        Some(record)
    }

    pub fn stop_overload(&self) {
        *self.overload.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn overload(&self) -> Option<OverloadRecord> {
        self.overload
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn read_index(&self) -> RwLockReadGuard<'_, HashMap<u32, SharedSubscriber>> {
        self.subscribers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_index(&self) -> RwLockWriteGuard<'_, HashMap<u32, SharedSubscriber>> {
        self.subscribers.write().unwrap_or_else(PoisonError::into_inner)
    }
}
