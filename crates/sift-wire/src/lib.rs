//! Socket patterns and message envelopes shared by every sift component.
//!
//! Three patterns over TCP, all carrying length-delimited JSON frames:
//! fire-and-forget push/pull, strictly paired request/reply, and a
//! router that serves many clients concurrently.

mod frame;
pub mod message;
mod push;
mod reply;
mod router;
mod shutdown;

pub use message::*;
pub use push::{PullSocket, PushSocket};
pub use reply::{RepServer, ReqSocket, Responder};
pub use router::RouterServer;
pub use shutdown::{Shutdown, DEFAULT_GRACE};

/// Transport failures.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Request '{operation}' timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    #[error("Channel closed")]
    Closed,

    #[error("Outbound buffer overflow ({capacity} frames)")]
    Overflow { capacity: usize },
}

impl WireError {
    pub fn timeout(operation: impl Into<String>, seconds: u64) -> Self {
        WireError::Timeout {
            operation: operation.into(),
            seconds,
        }
    }
}
