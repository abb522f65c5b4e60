//! Bridge from notify's callback thread into the async world.

use std::path::{Path, PathBuf};

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::warn;

use sift_wire::EventKind;

use crate::WatchError;

const EVENT_BUFFER: usize = 1024;

/// Stream of `(path, kind)` pairs for files in the watched root.
/// Dropping the stream stops the underlying watcher.
pub struct FsEventStream {
    rx: mpsc::Receiver<(PathBuf, EventKind)>,
    _watcher: RecommendedWatcher,
}

impl FsEventStream {
    pub fn watch(root: &Path) -> Result<Self, WatchError> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            let event = match result {
                Ok(event) => event,
                Err(e) => {
                    warn!("filesystem watch error: {e}");
                    return;
                }
            };
            let Some(kind) = map_kind(&event) else {
                return;
            };
            for path in event.paths {
                // The receiver half lives on the runtime; this callback
                // runs on notify's own thread, so blocking is fine.
                if tx.blocking_send((path, kind)).is_err() {
                    return;
                }
            }
        })?;

        watcher.watch(root, RecursiveMode::Recursive)?;

        Ok(FsEventStream {
            rx,
            _watcher: watcher,
        })
    }

    pub async fn next(&mut self) -> Option<(PathBuf, EventKind)> {
        self.rx.recv().await
    }
}

fn map_kind(event: &Event) -> Option<EventKind> {
    use notify::EventKind as K;
    match event.kind {
        K::Create(_) => Some(EventKind::Create),
        K::Modify(_) => Some(EventKind::Update),
        K::Remove(_) => Some(EventKind::Delete),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn next_for(
        stream: &mut FsEventStream,
        path: &Path,
    ) -> Option<(PathBuf, EventKind)> {
        tokio::time::timeout(Duration::from_secs(10), async {
            while let Some((p, kind)) = stream.next().await {
                if p == path {
                    return Some((p, kind));
                }
            }
            None
        })
        .await
        .ok()
        .flatten()
    }

    #[tokio::test]
    async fn test_create_and_remove_events() {
        let tmp = TempDir::new().unwrap();
        let mut stream = FsEventStream::watch(tmp.path()).unwrap();

        let file = tmp.path().join("watched.txt");
        std::fs::write(&file, "hello").unwrap();
        let (_, kind) = next_for(&mut stream, &file).await.expect("create event");
        assert!(matches!(kind, EventKind::Create | EventKind::Update));

        std::fs::remove_file(&file).unwrap();
        let mut saw_delete = false;
        for _ in 0..5 {
            match next_for(&mut stream, &file).await {
                Some((_, EventKind::Delete)) => {
                    saw_delete = true;
                    break;
                }
                Some(_) => continue,
                None => break,
            }
        }
        assert!(saw_delete, "expected a delete event");
    }
}
