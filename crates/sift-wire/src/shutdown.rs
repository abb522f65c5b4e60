//! Staged shutdown.
//!
//! Each socket class has its own cancellation signal. `begin` cancels
//! them in a fixed order: reply sockets first so pending requesters see
//! clean failures, then push/pull, then req/router, with a grace period
//! between stages for in-flight work to drain.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Default drain window between shutdown stages.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct Shutdown {
    reply: CancellationToken,
    push: CancellationToken,
    request: CancellationToken,
    grace: Duration,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::with_grace(DEFAULT_GRACE)
    }
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_grace(grace: Duration) -> Self {
        Shutdown {
            reply: CancellationToken::new(),
            push: CancellationToken::new(),
            request: CancellationToken::new(),
            grace,
        }
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Signal observed by reply (REP) sockets. First to fire.
    pub fn reply_token(&self) -> CancellationToken {
        self.reply.clone()
    }

    /// Signal observed by push/pull sockets. Second to fire.
    pub fn push_token(&self) -> CancellationToken {
        self.push.clone()
    }

    /// Signal observed by req/router sockets and outer HTTP surfaces.
    /// Last to fire.
    pub fn request_token(&self) -> CancellationToken {
        self.request.clone()
    }

    /// Run the staged shutdown: cancel each class in order with the
    /// grace period between stages.
    pub async fn begin(&self) {
        self.reply.cancel();
        tokio::time::sleep(self.grace).await;
        self.push.cancel();
        tokio::time::sleep(self.grace).await;
        self.request.cancel();
    }

    /// Cancel every class at once, skipping the staged drain. Meant for
    /// tests and abnormal exits.
    pub fn cancel_all(&self) {
        self.reply.cancel();
        self.push.cancel();
        self.request.cancel();
    }
}
