//! Multi-client request/reply.
//!
//! Unlike [`RepServer`](crate::RepServer), every client connection is
//! served by its own task, so slow requesters do not block each other.
//! Requests on a single connection are still answered in order. Routers
//! belong to the last shutdown stage, so peers can keep fetching while
//! the earlier stages drain.

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::frame;
use crate::shutdown::Shutdown;
use crate::WireError;

pub struct RouterServer {
    local_addr: std::net::SocketAddr,
}

impl RouterServer {
    /// Bind and serve every connection with `handler`.
    pub async fn bind<Q, R, F, Fut>(
        addr: impl AsRef<str>,
        shutdown: &Shutdown,
        handler: F,
    ) -> Result<Self, WireError>
    where
        Q: DeserializeOwned + Send + 'static,
        R: Serialize + Send + Sync + 'static,
        F: Fn(Q) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send,
    {
        let listener = TcpListener::bind(addr.as_ref()).await?;
        let local_addr = listener.local_addr()?;
        let handler = Arc::new(handler);
        let cancel = shutdown.request_token();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            debug!("router: client connected from {peer}");
                            let handler = Arc::clone(&handler);
                            let cancel = cancel.clone();
                            tokio::spawn(async move {
                                if let Err(e) = serve::<Q, R, F, Fut>(stream, handler, cancel).await {
                                    debug!("router connection from {peer} ended: {e}");
                                }
                            });
                        }
                        Err(e) => warn!("router accept failed: {e}"),
                    }
                }
            }
        });

        Ok(RouterServer { local_addr })
    }

    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }
}

async fn serve<Q, R, F, Fut>(
    stream: TcpStream,
    handler: Arc<F>,
    cancel: CancellationToken,
) -> Result<(), WireError>
where
    Q: DeserializeOwned,
    R: Serialize,
    F: Fn(Q) -> Fut,
    Fut: Future<Output = R>,
{
    let mut conn = frame::framed(stream);
    loop {
        let request = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            result = frame::recv::<Q>(&mut conn) => match result? {
                Some(request) => request,
                None => return Ok(()),
            },
        };
        let reply = handler(request).await;
        frame::send(&mut conn, &reply).await?;
    }
}
