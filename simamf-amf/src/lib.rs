//! simamf-amf - simulated AMF procedure engine
//!
//! Plays the AMF side of NG-C toward a single access node. The engine
//! answers NG Setup, accepts wireline subscribers through registration and
//! NAS security, sets up and releases PDU sessions, and drives network
//! initiated deregistration down to UE context release.
//!
//! # Architecture
//!
//! ```text
//!          +-------------+   Frame    +-----------------+
//! peer <-->| Association |<---------->| run_association |
//!          +-------------+            +--------+--------+
//!                                      dispatch | ^ outbound PDUs
//!                                               v |
//!                                      +-----------------+
//!                                      |   Dispatcher    |--> timer tasks
//!                                      +--------+--------+
//!                                               |
//!                               PeerContext -> Subscriber -> PduSession
//! ```

pub mod app;
pub mod builders;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod io;
pub mod state;
pub mod timer;

pub use app::{SimAmf, OUTBOUND_CAPACITY};
pub use context::{PduSession, PeerContext, SessionState, SharedSubscriber, Subscriber};
pub use dispatcher::Dispatcher;
pub use error::{AmfError, DecodeError};
pub use io::{
    run_association, send_with_retry, Association, ChannelAssociation, Frame, TransportError,
    UdpAssociation,
};
pub use state::{DispatcherState, MobilityState};
pub use timer::{NasTimer, TimerExpiry, TimerId, TimerSet};
