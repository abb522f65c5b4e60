//! Fire-and-forget push/pull pattern.
//!
//! The pull side binds and fans every connected pusher into one stream.
//! The push side connects, reconnects with backoff, and keeps a bounded
//! outbound buffer while the peer is away; overflowing that buffer is a
//! fatal error rather than silent loss. Both halves observe the
//! push-class stage of the staged shutdown.

use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::frame;
use crate::shutdown::Shutdown;
use crate::WireError;

/// Frames buffered while the pull peer is unreachable.
const PUSH_BUFFER_CAPACITY: usize = 1024;

const RECONNECT_MIN: Duration = Duration::from_millis(200);
const RECONNECT_MAX: Duration = Duration::from_secs(5);

/// Sending half of the push/pull pattern.
pub struct PushSocket {
    tx: mpsc::Sender<Bytes>,
}

impl PushSocket {
    /// Connect to a pull endpoint. The connection is maintained by a
    /// background task; frames sent while disconnected are buffered.
    pub fn connect(addr: impl Into<String>, shutdown: &Shutdown) -> Self {
        let addr = addr.into();
        let (tx, rx) = mpsc::channel(PUSH_BUFFER_CAPACITY);
        tokio::spawn(push_loop(addr, rx, shutdown.push_token()));
        PushSocket { tx }
    }

    /// Queue a message for delivery. At-least-once: a frame is retried
    /// across reconnects until written.
    pub fn send<T: Serialize>(&self, msg: &T) -> Result<(), WireError> {
        let bytes = frame::encode(msg)?;
        match self.tx.try_send(bytes) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(WireError::Overflow {
                capacity: PUSH_BUFFER_CAPACITY,
            }),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(WireError::Closed),
        }
    }
}

async fn push_loop(addr: String, mut rx: mpsc::Receiver<Bytes>, cancel: CancellationToken) {
    let mut pending: Option<Bytes> = None;

    'outer: loop {
        let mut backoff = RECONNECT_MIN;
        let mut conn = loop {
            tokio::select! {
                _ = cancel.cancelled() => break 'outer,
                result = TcpStream::connect(&addr) => match result {
                    Ok(stream) => break frame::framed(stream),
                    Err(e) => {
                        debug!("push connect to {addr} failed: {e}; retrying in {backoff:?}");
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(RECONNECT_MAX);
                    }
                }
            }
        };

        loop {
            let next = match pending.take() {
                Some(bytes) => Some(bytes),
                None => tokio::select! {
                    _ = cancel.cancelled() => break 'outer,
                    frame = rx.recv() => frame,
                },
            };
            let Some(bytes) = next else { break 'outer };

            if let Err(e) = futures::SinkExt::send(&mut conn, bytes.clone()).await {
                warn!("push write to {addr} failed: {e}; reconnecting");
                pending = Some(bytes);
                continue 'outer;
            }
        }
    }
    debug!("push socket to {addr} stopped");
}

/// Receiving half of the push/pull pattern.
pub struct PullSocket {
    rx: mpsc::Receiver<Bytes>,
    local_addr: std::net::SocketAddr,
}

impl PullSocket {
    /// Bind and start accepting pushers.
    pub async fn bind(addr: impl AsRef<str>, shutdown: &Shutdown) -> Result<Self, WireError> {
        let listener = TcpListener::bind(addr.as_ref()).await?;
        let local_addr = listener.local_addr()?;
        let (tx, rx) = mpsc::channel(PUSH_BUFFER_CAPACITY);

        tokio::spawn(accept_loop(listener, tx, shutdown.push_token()));

        Ok(PullSocket { rx, local_addr })
    }

    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }

    /// Receive the next message. `None` means shutdown.
    /// A decode failure is returned so the caller can log and continue.
    pub async fn recv<T: DeserializeOwned>(&mut self) -> Option<Result<T, WireError>> {
        let bytes = self.rx.recv().await?;
        Some(frame::decode(&bytes))
    }
}

async fn accept_loop(listener: TcpListener, tx: mpsc::Sender<Bytes>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("pull: pusher connected from {peer}");
                    let tx = tx.clone();
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        let mut conn = frame::framed(stream);
                        loop {
                            tokio::select! {
                                _ = cancel.cancelled() => break,
                                result = frame::recv_raw(&mut conn) => match result {
                                    Ok(Some(bytes)) => {
                                        if tx.send(bytes).await.is_err() {
                                            break;
                                        }
                                    }
                                    Ok(None) => break,
                                    Err(e) => {
                                        warn!("pull read from {peer} failed: {e}");
                                        break;
                                    }
                                }
                            }
                        }
                    });
                }
                Err(e) => {
                    warn!("pull accept failed: {e}");
                }
            }
        }
    }
}
