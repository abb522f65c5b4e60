//! Watcher service: turns filesystem mutations in the watched root into
//! a totally ordered stream of file events, keeps a version snapshot
//! for diffs, and answers raw-file and authorization requests.

mod events;
mod service;
mod snapshot;

pub use events::FsEventStream;
pub use service::WatcherService;
pub use snapshot::Snapshot;

/// Watcher failures.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Filesystem watch error: {0}")]
    Notify(#[from] notify::Error),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] git2::Error),

    #[error("Transport error: {0}")]
    Wire(#[from] sift_wire::WireError),
}

/// Check a path against the extension allow-list (entries without dots).
pub fn is_allowed(path: &std::path::Path, allowed_extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| allowed_extensions.iter().any(|a| a.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}
