//! The watcher service loop: filesystem events in, ordered file events
//! out, with the raw-file router and the authorization reply server
//! running alongside.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use sift_access::{folder_of, AccessOracle, StructureOp};
use sift_config::SiftConfig;
use sift_wire::{
    now_ts, AccessReply, AccessRequest, EventKind, EventMeta, FetchErrorCode, FetchFileReply,
    FetchFileRequest, FileEvent, FilePayload, PushSocket, RepServer, RouterServer, Shutdown,
};

use crate::events::FsEventStream;
use crate::snapshot::Snapshot;
use crate::{is_allowed, WatchError};

pub struct WatcherService {
    watch_root: PathBuf,
    allowed_extensions: Arc<Vec<String>>,
    push_addr: String,
    router_addr: String,
    access_addr: String,
    user_id: String,
    oracle: Arc<AccessOracle>,
}

impl WatcherService {
    pub fn new(config: &SiftConfig, oracle: Arc<AccessOracle>) -> Self {
        WatcherService {
            watch_root: config.watch_root.clone(),
            allowed_extensions: Arc::new(config.allowed_extensions.clone()),
            push_addr: config.transport.push_addr.clone(),
            router_addr: config.transport.router_addr.clone(),
            access_addr: config.transport.access_addr.clone(),
            user_id: ingest_principal(),
            oracle,
        }
    }

    pub async fn run(self, shutdown: Shutdown) -> Result<(), WatchError> {
        let snapshot = Snapshot::open_or_init(&self.watch_root, &self.user_id)?;
        let push = PushSocket::connect(&self.push_addr, &shutdown);

        // Authorization reply server: the sole path by which other
        // components learn a user's allow-list.
        let mut access_server: RepServer<AccessRequest, AccessReply> =
            RepServer::bind(&self.access_addr, &shutdown).await?;
        let oracle = Arc::clone(&self.oracle);
        tokio::spawn(async move {
            while let Some((request, responder)) = access_server.recv().await {
                let pathlist = oracle.authorized(&request.user_id).await;
                debug!(
                    "authorization reply for {}: {} paths",
                    request.user_id,
                    pathlist.len()
                );
                responder.send(AccessReply::Success { pathlist });
            }
        });

        // Raw-file router, serving any number of peers.
        let root = Arc::new(self.watch_root.clone());
        let allowed = Arc::clone(&self.allowed_extensions);
        let _router = RouterServer::bind(&self.router_addr, &shutdown, {
            move |request: FetchFileRequest| {
                let root = Arc::clone(&root);
                let allowed = Arc::clone(&allowed);
                async move { handle_fetch(&root, &allowed, request).await }
            }
        })
        .await?;

        let mut stream = FsEventStream::watch(&self.watch_root)?;
        info!(
            "watching {} (push {}, router {}, access {})",
            self.watch_root.display(),
            self.push_addr,
            self.router_addr,
            self.access_addr
        );

        // Event emission stops with the push stage; the access and
        // router servers run on to their own stages.
        let cancel = shutdown.push_token();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = stream.next() => match event {
                    Some((path, kind)) => {
                        self.handle_mutation(&snapshot, &push, &path, kind).await?;
                    }
                    None => break,
                }
            }
        }

        // The raw-file router belongs to the final stage; hold the
        // process open until it has been cancelled too.
        shutdown.request_token().cancelled().await;
        info!("watcher stopped");
        Ok(())
    }

    async fn handle_mutation(
        &self,
        snapshot: &Snapshot,
        push: &PushSocket,
        path: &Path,
        kind: EventKind,
    ) -> Result<(), WatchError> {
        if in_snapshot_dir(path) || !is_allowed(path, &self.allowed_extensions) {
            return Ok(());
        }
        let relative_path = match path.strip_prefix(&self.watch_root) {
            Ok(rel) => rel.to_string_lossy().to_string(),
            Err(_) => return Ok(()),
        };

        match kind {
            EventKind::Create => {
                self.oracle
                    .update_structure(&relative_path, StructureOp::Create)
                    .await;
            }
            EventKind::Delete => {
                self.oracle
                    .update_structure(&relative_path, StructureOp::Delete)
                    .await;
            }
            EventKind::Update => {}
        }

        let liked_users = self.oracle.subscribers(folder_of(&relative_path)).await;

        // Diff against the committed tip, then commit. The commit must
        // land before the event is transmitted.
        let diff = match kind {
            EventKind::Update => snapshot.diff_for(&relative_path),
            _ => None,
        };
        let committed = match snapshot.commit_change(&relative_path, kind) {
            Ok(()) => true,
            Err(e) => {
                warn!("snapshot commit failed for {relative_path}: {e}");
                false
            }
        };

        let meta = EventMeta {
            relative_path: relative_path.clone(),
            user_id: self.user_id.clone(),
            timestamp: now_ts(),
            committed,
            liked_users,
        };

        let event = match kind {
            EventKind::Create => FileEvent::Create {
                meta,
                payload: self.read_payload(path),
            },
            EventKind::Update => FileEvent::Update {
                meta,
                payload: self.read_payload(path),
                diff,
            },
            EventKind::Delete => FileEvent::Delete { meta },
        };

        debug!("emitting {} for {relative_path}", kind.as_str());
        push.send(&event)?;
        Ok(())
    }

    /// A file that vanished between detection and read still produces an
    /// event; extraction downstream records the failure.
    fn read_payload(&self, path: &Path) -> FilePayload {
        match std::fs::read(path) {
            Ok(bytes) => FilePayload::new(bytes),
            Err(e) => {
                warn!("could not read {}: {e}", path.display());
                FilePayload::new(Vec::new())
            }
        }
    }
}

fn ingest_principal() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "sift".to_string())
}

fn in_snapshot_dir(path: &Path) -> bool {
    path.components().any(|c| c.as_os_str() == ".git")
}

/// Answer a raw-file request. Paths that escape the watched root are
/// rejected after normalization; the extension allow-list applies.
async fn handle_fetch(
    root: &Path,
    allowed_extensions: &[String],
    request: FetchFileRequest,
) -> FetchFileReply {
    let requested = Path::new(&request.relative_path);

    let relative = if requested.is_absolute() {
        match requested.strip_prefix(root) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => {
                return FetchFileReply::Error {
                    code: FetchErrorCode::OutOfRoot,
                    error: "path is outside the watched root".to_string(),
                }
            }
        }
    } else {
        requested.to_path_buf()
    };

    if relative
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        return FetchFileReply::Error {
            code: FetchErrorCode::OutOfRoot,
            error: "path is outside the watched root".to_string(),
        };
    }

    let full = root.join(&relative);
    if !full.exists() {
        return FetchFileReply::Error {
            code: FetchErrorCode::NotFound,
            error: format!("{} not found", relative.display()),
        };
    }
    if !is_allowed(&full, allowed_extensions) {
        return FetchFileReply::Error {
            code: FetchErrorCode::Unsupported,
            error: format!("{} has an unsupported extension", relative.display()),
        };
    }

    match tokio::fs::read(&full).await {
        Ok(bytes) => {
            let size = bytes.len();
            let name = full
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            FetchFileReply::Success { bytes, size, name }
        }
        Err(e) => FetchFileReply::Error {
            code: FetchErrorCode::Error,
            error: e.to_string(),
        },
    }
}
