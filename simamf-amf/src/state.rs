//! Subscriber and dispatcher state machines
//!
//! Mobility state follows an explicit transition table; anything outside it
//! is reported as [`AmfError::InvalidTransition`] and leaves the state
//! untouched. Per-session states live with the session record, see
//! [`crate::context::session::SessionState`].

use std::fmt;

use crate::error::AmfError;

/// Coarse mobility management state of a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MobilityState {
    #[default]
    Deregistered,
    Registering,
    SecurityActivating,
    Registered,
    ServiceRequestPending,
    Deregistering,
}

impl MobilityState {
    pub const ALL: [MobilityState; 6] = [
        MobilityState::Deregistered,
        MobilityState::Registering,
        MobilityState::SecurityActivating,
        MobilityState::Registered,
        MobilityState::ServiceRequestPending,
        MobilityState::Deregistering,
    ];

    /// Transition table. Same-state moves are handled by the caller.
    pub fn can_transition_to(self, to: MobilityState) -> bool {
        use MobilityState::*;
        matches!(
            (self, to),
            (Deregistered, Registering)
                | (Registering, SecurityActivating)
                | (Registering, Deregistered)
                | (SecurityActivating, Registered)
                | (SecurityActivating, Deregistering)
                | (SecurityActivating, Deregistered)
                | (Registered, Registering)
                | (Registered, ServiceRequestPending)
                | (Registered, Deregistering)
                | (Registered, Deregistered)
                | (ServiceRequestPending, Registered)
                | (ServiceRequestPending, Deregistering)
                | (ServiceRequestPending, Deregistered)
                | (Deregistering, Deregistered)
        )
    }

    /// Validates `self -> to`; a move onto the current state is a no-op.
    pub fn transition(self, to: MobilityState) -> Result<MobilityState, AmfError> {
        if self == to || self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(AmfError::InvalidTransition { from: self, to })
        }
    }
}

impl fmt::Display for MobilityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MobilityState::Deregistered => write!(f, "Deregistered"),
            MobilityState::Registering => write!(f, "Registering"),
            MobilityState::SecurityActivating => write!(f, "SecurityActivating"),
            MobilityState::Registered => write!(f, "Registered"),
            MobilityState::ServiceRequestPending => write!(f, "ServiceRequestPending"),
            MobilityState::Deregistering => write!(f, "Deregistering"),
        }
    }
}

/// Where the engine is in the scripted end-to-end exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum DispatcherState {
    #[default]
    WaitingNgSetup,
    WaitingInitialUe,
    WaitingSecurityComplete,
    WaitingSessionOrServiceEvents,
    WaitingDeregistration,
    Terminated,
}

impl fmt::Display for DispatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatcherState::WaitingNgSetup => write!(f, "WaitingNgSetup"),
            DispatcherState::WaitingInitialUe => write!(f, "WaitingInitialUe"),
            DispatcherState::WaitingSecurityComplete => write!(f, "WaitingSecurityComplete"),
            DispatcherState::WaitingSessionOrServiceEvents => {
                write!(f, "WaitingSessionOrServiceEvents")
            }
            DispatcherState::WaitingDeregistration => write!(f, "WaitingDeregistration"),
            DispatcherState::Terminated => write!(f, "Terminated"),
        }
    }
}
