//! Strictly paired request/reply pattern.
//!
//! The server hands `(request, Responder)` pairs to its owning component
//! through a channel and will not take the next request from a connection
//! until the current one has been answered. Reply servers observe the
//! first stage of the staged shutdown: on cancel they stop accepting new
//! requests but drain an in-flight handler up to the grace period, so
//! pending requesters see an answer or a clean close rather than a stall.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::frame;
use crate::frame::FramedStream;
use crate::shutdown::Shutdown;
use crate::WireError;

/// Requesting half. One outstanding request at a time; the caller owns
/// the deadline, and there are no transport-level retries.
pub struct ReqSocket {
    addr: String,
    timeout: Duration,
    conn: Mutex<Option<FramedStream>>,
}

impl ReqSocket {
    pub fn connect(addr: impl Into<String>, timeout: Duration) -> Self {
        ReqSocket {
            addr: addr.into(),
            timeout,
            conn: Mutex::new(None),
        }
    }

    pub async fn request<Q, R>(&self, request: &Q) -> Result<R, WireError>
    where
        Q: Serialize,
        R: DeserializeOwned,
    {
        let mut guard = self.conn.lock().await;
        let result = self.request_inner(&mut guard, request).await;
        if result.is_err() {
            // A failed exchange leaves the stream in an unknown state.
            *guard = None;
        }
        result
    }

    async fn request_inner<Q, R>(
        &self,
        guard: &mut Option<FramedStream>,
        request: &Q,
    ) -> Result<R, WireError>
    where
        Q: Serialize,
        R: DeserializeOwned,
    {
        let secs = self.timeout.as_secs();
        if guard.is_none() {
            let stream = tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr))
                .await
                .map_err(|_| WireError::timeout(format!("connect {}", self.addr), secs))??;
            *guard = Some(frame::framed(stream));
        }
        let Some(conn) = guard.as_mut() else {
            return Err(WireError::Closed);
        };

        frame::send(conn, request).await?;
        let reply = tokio::time::timeout(self.timeout, frame::recv::<R>(conn))
            .await
            .map_err(|_| WireError::timeout(format!("request {}", self.addr), secs))??;
        reply.ok_or(WireError::Closed)
    }
}

/// One pending request the component must answer.
pub struct Responder<R> {
    tx: oneshot::Sender<R>,
}

impl<R> Responder<R> {
    pub fn send(self, reply: R) {
        // The requester may have gone away; nothing to do then.
        let _ = self.tx.send(reply);
    }
}

/// Replying half. `recv` yields requests one at a time.
pub struct RepServer<Q, R> {
    rx: mpsc::Receiver<(Q, Responder<R>)>,
    local_addr: std::net::SocketAddr,
}

impl<Q, R> RepServer<Q, R>
where
    Q: DeserializeOwned + Send + 'static,
    R: Serialize + Send + Sync + 'static,
{
    pub async fn bind(addr: impl AsRef<str>, shutdown: &Shutdown) -> Result<Self, WireError> {
        let listener = TcpListener::bind(addr.as_ref()).await?;
        let local_addr = listener.local_addr()?;
        // Capacity 1 keeps the service loop strictly one request at a time.
        let (tx, rx) = mpsc::channel(1);

        tokio::spawn(accept_loop(
            listener,
            tx,
            shutdown.reply_token(),
            shutdown.grace(),
        ));

        Ok(RepServer { rx, local_addr })
    }

    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }

    /// Next request to answer. `None` means shutdown.
    pub async fn recv(&mut self) -> Option<(Q, Responder<R>)> {
        self.rx.recv().await
    }
}

async fn accept_loop<Q, R>(
    listener: TcpListener,
    tx: mpsc::Sender<(Q, Responder<R>)>,
    cancel: CancellationToken,
    grace: Duration,
) where
    Q: DeserializeOwned + Send + 'static,
    R: Serialize + Send + Sync + 'static,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("rep: requester connected from {peer}");
                    let tx = tx.clone();
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(stream, tx, cancel, grace).await {
                            debug!("rep connection from {peer} ended: {e}");
                        }
                    });
                }
                Err(e) => warn!("rep accept failed: {e}"),
            }
        }
    }
}

async fn serve_connection<Q, R>(
    stream: TcpStream,
    tx: mpsc::Sender<(Q, Responder<R>)>,
    cancel: CancellationToken,
    grace: Duration,
) -> Result<(), WireError>
where
    Q: DeserializeOwned,
    R: Serialize,
{
    let mut conn = frame::framed(stream);
    loop {
        // Stop accepting new requests once the reply stage has fired.
        let request = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            result = frame::recv::<Q>(&mut conn) => match result? {
                Some(request) => request,
                None => return Ok(()),
            },
        };

        let (reply_tx, mut reply_rx) = oneshot::channel();
        if tx
            .send((request, Responder { tx: reply_tx }))
            .await
            .is_err()
        {
            return Ok(());
        }

        // The request must be answered before the next one is read. On
        // cancel, the in-flight handler is drained up to the grace
        // period, then the connection is force-closed.
        let reply = tokio::select! {
            reply = &mut reply_rx => reply.ok(),
            _ = cancel.cancelled() => {
                tokio::time::timeout(grace, &mut reply_rx)
                    .await
                    .ok()
                    .and_then(Result::ok)
            }
        };
        let Some(reply) = reply else { return Ok(()) };
        frame::send(&mut conn, &reply).await?;
    }
}
