//! Association transport and the I/O loop
//!
//! The engine sees the NG-C association as a stream of [`Frame`]s. Two
//! implementations exist: an in-memory channel pair used by tests and a
//! UDP socket carrying one PDU per datagram.
//!
//! ```text
//! peer <--Association--> run_association --dispatch--> Dispatcher
//!                              ^                           |
//!                              +------ outbound mpsc ------+
//! ```

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use simamf_common::config::NGAP_PPID;
use simamf_common::TransportConfig;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::dispatcher::Dispatcher;

/// Largest datagram accepted by [`UdpAssociation`].
const MAX_DATAGRAM: usize = 65_535;

/// One complete NGAP PDU on the association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub stream_id: u16,
    /// Payload protocol identifier
    pub ppid: u32,
    pub payload: Bytes,
}

impl Frame {
    /// NGAP frame on stream 0.
    pub fn ngap(payload: impl Into<Bytes>) -> Self {
        Self {
            stream_id: 0,
            ppid: NGAP_PPID,
            payload: payload.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("write timed out after {0:?}")]
    Timeout(Duration),

    #[error("no peer address known yet")]
    NoPeer,

    #[error("association closed")]
    Closed,
}

impl TransportError {
    /// Worth another write attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Io(_) | TransportError::Timeout(_))
    }
}

#[async_trait]
pub trait Association: Send + Sync {
    /// Next inbound frame; `None` once the peer has gone away.
    async fn recv(&self) -> Result<Option<Frame>, TransportError>;

    async fn send(&self, frame: Frame) -> Result<(), TransportError>;
}

/// In-memory association. [`ChannelAssociation::pair`] returns both ends.
#[derive(Debug)]
pub struct ChannelAssociation {
    tx: mpsc::Sender<Frame>,
    rx: Mutex<mpsc::Receiver<Frame>>,
}

impl ChannelAssociation {
    pub fn pair(capacity: usize) -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::channel(capacity);
        let (b_tx, b_rx) = mpsc::channel(capacity);
        (
            Self {
                tx: a_tx,
                rx: Mutex::new(b_rx),
            },
            Self {
                tx: b_tx,
                rx: Mutex::new(a_rx),
            },
        )
    }
}

#[async_trait]
impl Association for ChannelAssociation {
    async fn recv(&self) -> Result<Option<Frame>, TransportError> {
        Ok(self.rx.lock().await.recv().await)
    }

    async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        self.tx.send(frame).await.map_err(|_| TransportError::Closed)
    }
}

/// One NGAP PDU per UDP datagram. Without a configured peer the first
/// sender becomes the peer and datagrams from anyone else are dropped.
#[derive(Debug)]
pub struct UdpAssociation {
    socket: UdpSocket,
    peer: RwLock<Option<SocketAddr>>,
    ppid: u32,
}

impl UdpAssociation {
    pub async fn bind(config: &TransportConfig) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(config.listen_addr).await?;
        info!("Listening on {}", socket.local_addr()?);
        Ok(Self {
            socket,
            peer: RwLock::new(config.peer_addr),
            ppid: config.ppid,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        *self.peer.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Association for UdpAssociation {
    async fn recv(&self) -> Result<Option<Frame>, TransportError> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let (len, from) = self.socket.recv_from(&mut buf).await?;
            match self.peer_addr() {
                Some(peer) if peer != from => {
                    warn!("Dropping {} byte datagram from unknown sender {}", len, from);
                    continue;
                }
                Some(_) => {}
                None => {
                    info!("Association peer is {}", from);
                    *self.peer.write().unwrap_or_else(PoisonError::into_inner) = Some(from);
                }
            }
            return Ok(Some(Frame {
                stream_id: 0,
                ppid: self.ppid,
                payload: Bytes::copy_from_slice(&buf[..len]),
            }));
        }
    }

    async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        let peer = self.peer_addr().ok_or(TransportError::NoPeer)?;
        self.socket.send_to(&frame.payload, peer).await?;
        Ok(())
    }
}

/// Writes `frame`, allowing `write_timeout` per attempt and `retries`
/// further attempts after the first.
pub async fn send_with_retry(
    association: &dyn Association,
    frame: Frame,
    write_timeout: Duration,
    retries: u32,
) -> Result<(), TransportError> {
    let attempts = retries.saturating_add(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let err = match timeout(write_timeout, association.send(frame.clone())).await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => e,
            Err(_) => TransportError::Timeout(write_timeout),
        };
        if !err.is_retryable() || attempt >= attempts {
            return Err(err);
        }
        warn!("Write attempt {}/{} failed: {}", attempt, attempts, err);
    }
}

/// Runs one association until the peer goes away or a write fails for good.
///
/// Each inbound frame is dispatched on its own task; per-subscriber
/// ordering is left to the dispatcher's locks.
pub async fn run_association(
    association: Arc<dyn Association>,
    dispatcher: Dispatcher,
    mut outbound: mpsc::Receiver<Vec<u8>>,
    config: &TransportConfig,
) -> Result<(), TransportError> {
    let write_timeout = config.write_timeout();
    loop {
        tokio::select! {
            inbound = association.recv() => {
                let Some(frame) = inbound? else {
                    info!("Association closed by peer");
                    return Ok(());
                };
                if frame.ppid != config.ppid {
                    warn!(
                        "Frame on stream {} has PPID 0x{:08x}, expected 0x{:08x}",
                        frame.stream_id, frame.ppid, config.ppid
                    );
                }
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    if let Err(e) = dispatcher.dispatch(&frame.payload).await {
                        if e.is_fatal() {
                            error!("Dispatch failed: {}", e);
                        } else {
                            warn!("Dispatch failed: {}", e);
                        }
                    }
                });
            }
            Some(pdu) = outbound.recv() => {
                debug!("Writing {} byte PDU", pdu.len());
                let frame = Frame {
                    stream_id: 0,
                    ppid: config.ppid,
                    payload: Bytes::from(pdu),
                };
                send_with_retry(association.as_ref(), frame, write_timeout, config.write_retries)
                    .await?;
            }
        }
    }
}
