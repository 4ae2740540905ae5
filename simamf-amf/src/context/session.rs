//! PDU session records and the session id slot table

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;

use simamf_common::SNssai;
use simamf_nas::{PduSessionType, SessionAmbr};

use crate::error::AmfError;

/// Lowest and highest PDU session id.
pub const MIN_SESSION_ID: u8 = 1;
pub const MAX_SESSION_ID: u8 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Establishing,
    Established,
    EstablishingRejected,
    EstablishmentRejected,
    EstablishmentFailed,
    Releasing,
    Released,
    ReleaseRejected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Establishing => write!(f, "Establishing"),
            SessionState::Established => write!(f, "Established"),
            SessionState::EstablishingRejected => write!(f, "EstablishingRejected"),
            SessionState::EstablishmentRejected => write!(f, "EstablishmentRejected"),
            SessionState::EstablishmentFailed => write!(f, "EstablishmentFailed"),
            SessionState::Releasing => write!(f, "Releasing"),
            SessionState::Released => write!(f, "Released"),
            SessionState::ReleaseRejected => write!(f, "ReleaseRejected"),
        }
    }
}

/// Human readable establishment/release state plus the last cause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedState {
    pub state: SessionState,
    pub cause: Option<String>,
}

/// QoS flow level parameters of one flow in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QosFlow {
    pub qfi: u8,
    pub five_qi: u8,
    pub arp_priority: u8,
}

/// User plane binding of an established session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserPlaneBinding {
    pub remote_addr: IpAddr,
    pub incoming_teid: u32,
    pub outgoing_teid: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PduSession {
    pub id: u8,
    pub snssai: SNssai,
    pub session_type: PduSessionType,
    pub ambr: Option<SessionAmbr>,
    pub cipher_required: bool,
    pub integrity_required: bool,
    /// Keyed by QFI
    pub qos_flows: HashMap<u8, QosFlow>,
    pub user_plane: Option<UserPlaneBinding>,
}

impl PduSession {
    pub fn new(id: u8, snssai: SNssai) -> Self {
        Self {
            id,
            snssai,
            session_type: PduSessionType::default(),
            ambr: None,
            cipher_required: false,
            integrity_required: false,
            qos_flows: HashMap::new(),
            user_plane: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Slot {
    #[default]
    Free,
    Allocated,
    /// Free again after a release; a second release is a conflict.
    Released,
}

/// Session ids 1..=15, handed out lowest first.
#[derive(Debug, Clone, Default)]
pub struct SessionSlots {
    slots: [Slot; MAX_SESSION_ID as usize + 1],
}

impl SessionSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the lowest free id allocated.
    pub fn allocate(&mut self) -> Option<u8> {
        let id = (MIN_SESSION_ID..=MAX_SESSION_ID).find(|&id| !self.is_allocated(id))?;
        self.slots[usize::from(id)] = Slot::Allocated;
        Some(id)
    }

    /// Marks a specific id allocated; false if it already was.
    pub fn claim(&mut self, id: u8) -> Result<bool, AmfError> {
        check_id(id)?;
        let was_free = !self.is_allocated(id);
        self.slots[usize::from(id)] = Slot::Allocated;
        Ok(was_free)
    }

    /// Returns an allocated id to the free set, exactly once.
    pub fn release(&mut self, id: u8) -> Result<(), AmfError> {
        check_id(id)?;
        let slot = &mut self.slots[usize::from(id)];
        match *slot {
            Slot::Allocated => {
                *slot = Slot::Released;
                Ok(())
            }
            Slot::Released => Err(AmfError::Conflict(format!(
                "PDU session id {id} already released"
            ))),
            Slot::Free => Err(AmfError::NotFound(format!("PDU session id {id}"))),
        }
    }

    pub fn is_allocated(&self, id: u8) -> bool {
        (MIN_SESSION_ID..=MAX_SESSION_ID).contains(&id)
            && self.slots[usize::from(id)] == Slot::Allocated
    }

    /// Whether the id was released and not allocated again since.
    pub fn was_released(&self, id: u8) -> bool {
        (MIN_SESSION_ID..=MAX_SESSION_ID).contains(&id)
            && self.slots[usize::from(id)] == Slot::Released
    }

    /// Allocation bitmap indexed by session id; index 0 is always false.
    pub fn status(&self) -> [bool; 16] {
        let mut status = [false; 16];
        for id in MIN_SESSION_ID..=MAX_SESSION_ID {
            status[usize::from(id)] = self.is_allocated(id);
        }
        status
    }
}

pub(crate) fn check_id(id: u8) -> Result<(), AmfError> {
    if (MIN_SESSION_ID..=MAX_SESSION_ID).contains(&id) {
        Ok(())
    } else {
        Err(AmfError::NotFound(format!("PDU session id {id} out of range")))
    }
}
