//! Mailbox service: the wire post server and the HTTP read API, side by
//! side. The post server drains with the reply stage of the staged
//! shutdown; the HTTP surface stays up until the final stage.

use std::sync::Arc;

use tracing::info;

use sift_config::SiftConfig;
use sift_wire::{MailboxPost, MailboxReply, RepServer, Shutdown, WireError};

use crate::{build_router, Mailbox};

pub struct MailboxService {
    post_addr: String,
    http_port: u16,
    mailbox: Arc<Mailbox>,
}

impl MailboxService {
    pub fn new(config: &SiftConfig, mailbox: Arc<Mailbox>) -> Self {
        MailboxService {
            post_addr: config.transport.mailbox_addr.clone(),
            http_port: config.mailbox_http_port,
            mailbox,
        }
    }

    pub async fn run(self, shutdown: Shutdown) -> Result<(), WireError> {
        let mut rep: RepServer<MailboxPost, MailboxReply> =
            RepServer::bind(&self.post_addr, &shutdown).await?;

        let app = build_router(Arc::clone(&self.mailbox));
        let listener = tokio::net::TcpListener::bind(("0.0.0.0", self.http_port)).await?;
        info!(
            "mailbox running (post {}, http {})",
            self.post_addr,
            listener.local_addr()?
        );
        let http_cancel = shutdown.request_token();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(http_cancel.cancelled_owned())
                .await;
        });

        while let Some((post, responder)) = rep.recv().await {
            let delivered = self.mailbox.post(&post.user_ids, post.payload).await;
            responder.send(MailboxReply::Success { delivered });
        }

        // The read API belongs to the final stage; hold the process
        // open until it has drained.
        shutdown.request_token().cancelled().await;
        info!("mailbox stopped");
        Ok(())
    }
}
