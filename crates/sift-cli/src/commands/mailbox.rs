use std::sync::Arc;

use sift_config::SiftConfig;
use sift_mailbox::{Mailbox, MailboxService};
use sift_wire::Shutdown;

pub async fn run(
    config: &SiftConfig,
    shutdown: Shutdown,
) -> Result<(), Box<dyn std::error::Error>> {
    let mailbox = Arc::new(Mailbox::new());
    MailboxService::new(config, mailbox).run(shutdown).await?;
    Ok(())
}
