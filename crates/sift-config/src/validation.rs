use std::collections::HashSet;

use crate::SiftConfig;

/// Check a parsed configuration for internal consistency.
/// Returns human-readable problems; an empty vector means the config is usable.
pub fn validate(config: &SiftConfig) -> Vec<String> {
    let mut errors = Vec::new();

    if config.allowed_extensions.is_empty() {
        errors.push("allowed_extensions must not be empty".to_string());
    }
    for ext in &config.allowed_extensions {
        if ext.starts_with('.') {
            errors.push(format!(
                "allowed_extensions entries are written without the dot: '{ext}'"
            ));
        }
    }

    if config.chunking.window == 0 {
        errors.push("chunking.window must be positive".to_string());
    }
    if config.chunking.overlap >= config.chunking.window {
        errors.push(format!(
            "chunking.overlap ({}) must be smaller than chunking.window ({})",
            config.chunking.overlap, config.chunking.window
        ));
    }
    if config.chunking.fallback_group_size == 0 {
        errors.push("chunking.fallback_group_size must be positive".to_string());
    }

    if config.chunking.summary_fanout == 0 {
        errors.push("chunking.summary_fanout must be positive".to_string());
    }

    if config.retrieval.top_n == 0 {
        errors.push("retrieval.top_n must be positive".to_string());
    }

    let mut seen = HashSet::new();
    for addr in config.transport.addresses() {
        if !seen.insert(addr) {
            errors.push(format!("transport address '{addr}' is used more than once"));
        }
        if addr.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!("transport address '{addr}' is not host:port"));
        }
    }

    errors
}
