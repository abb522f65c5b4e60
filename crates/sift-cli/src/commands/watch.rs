use std::sync::Arc;

use sift_access::AccessOracle;
use sift_config::{AccessConfig, SiftConfig};
use sift_watcher::WatcherService;
use sift_wire::Shutdown;

pub async fn run(
    config: &SiftConfig,
    shutdown: Shutdown,
) -> Result<(), Box<dyn std::error::Error>> {
    // An empty access section gets the development table so the system
    // is usable out of the box.
    let oracle = if config.access.users.is_empty() {
        Arc::new(AccessOracle::from_config(&AccessConfig::development()))
    } else {
        Arc::new(AccessOracle::from_config(&config.access))
    };

    WatcherService::new(config, oracle).run(shutdown).await?;
    Ok(())
}
