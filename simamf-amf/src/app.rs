//! Engine assembly: dispatcher, codec and association wired together

use std::sync::Arc;

use simamf_common::SimConfig;
use simamf_ngap::TlvCodec;
use tokio::sync::mpsc;
use tracing::info;

use crate::dispatcher::Dispatcher;
use crate::error::AmfError;
use crate::io::{run_association, Association};

/// Capacity of the dispatcher's outbound PDU queue.
pub const OUTBOUND_CAPACITY: usize = 64;

/// A simulated AMF bound to one association.
pub struct SimAmf {
    dispatcher: Dispatcher,
    association: Arc<dyn Association>,
    outbound_rx: mpsc::Receiver<Vec<u8>>,
}

impl SimAmf {
    pub fn new(config: SimConfig, association: Arc<dyn Association>) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let dispatcher = Dispatcher::new(config, Arc::new(TlvCodec), outbound_tx);
        Self {
            dispatcher,
            association,
            outbound_rx,
        }
    }

    /// Handle for inspecting state or triggering AMF-initiated procedures
    /// while [`SimAmf::run`] owns the association.
    pub fn dispatcher(&self) -> Dispatcher {
        self.dispatcher.clone()
    }

    /// Serves the association until the peer closes it or a write fails.
    pub async fn run(self) -> Result<(), AmfError> {
        let config = self.dispatcher.config().clone();
        info!(
            "AMF {} serving {} GUAMI(s)",
            config.amf.name,
            config.amf.served_guamis.len()
        );
        run_association(
            self.association,
            self.dispatcher,
            self.outbound_rx,
            &config.transport,
        )
        .await?;
        info!("AMF {} stopped", config.amf.name);
        Ok(())
    }
}
