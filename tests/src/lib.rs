//! Integration test harness for the simulated AMF
//!
//! - [`scripted_peer`] - access-node side of an in-memory association
//! - [`test_utils`] - logging, polling and state-wait helpers
//!
//! Scenario tests live next to this file and are registered as `[[test]]`
//! targets: registration, PDU session, deregistration and timers.

pub mod scripted_peer;
pub mod test_utils;

pub use scripted_peer::{ScriptedPeer, PTI, RAN_UE_NGAP_ID};
pub use test_utils::{
    init_test_logging, wait_for_condition, wait_for_state, TestResult, DEFAULT_POLL_INTERVAL,
    DEFAULT_TEST_TIMEOUT,
};
