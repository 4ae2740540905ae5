//! Engine data model: subscribers, the AMF peer and PDU sessions

pub mod line;
pub mod peer;
pub mod session;
pub mod subscriber;

pub use line::{LineError, LineProfile};
pub use peer::{OverloadRecord, PeerContext, SharedSubscriber};
pub use session::{
    ExtendedState, PduSession, QosFlow, SessionSlots, SessionState, UserPlaneBinding,
    MAX_SESSION_ID, MIN_SESSION_ID,
};
pub use subscriber::{Subscriber, AMF_UE_NGAP_ID_UNSPECIFIED, RAN_UE_NGAP_ID_UNSPECIFIED};
