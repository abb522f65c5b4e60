//! Preprocessor: consumes watcher events, extracts text, forwards
//! enriched documents, and serves on-demand extracted-text fetches by
//! bridging to the watcher's raw-file channel.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use sift_config::SiftConfig;
use sift_indexing::text::char_len;
use sift_indexing::{create_extractors, extractor_for, TextExtractor};
use sift_wire::{
    DocMeta, ExtractedDocument, FetchFileReply, FetchFileRequest, FetchTextReply,
    FetchTextRequest, FileEvent, PullSocket, PushSocket, RepServer, ReqSocket, Shutdown,
};

use crate::IngestError;

pub struct PreprocessorService {
    pull_addr: String,
    push_addr: String,
    rep_addr: String,
    watcher_addr: String,
    request_timeout: Duration,
    extractors: Arc<Vec<Box<dyn TextExtractor>>>,
}

impl PreprocessorService {
    pub fn new(config: &SiftConfig) -> Self {
        PreprocessorService {
            pull_addr: config.transport.push_addr.clone(),
            push_addr: config.transport.preprocess_out_addr.clone(),
            rep_addr: config.transport.preprocess_req_addr.clone(),
            watcher_addr: config.transport.router_addr.clone(),
            request_timeout: Duration::from_secs(config.transport.request_timeout_secs),
            extractors: Arc::new(create_extractors()),
        }
    }

    pub async fn run(self, shutdown: Shutdown) -> Result<(), IngestError> {
        let mut pull = PullSocket::bind(&self.pull_addr, &shutdown).await?;
        let push = PushSocket::connect(&self.push_addr, &shutdown);

        // Extracted-text fetches arrive on their own reply channel and
        // are bridged to the watcher's raw-file router.
        let mut rep: RepServer<FetchTextRequest, FetchTextReply> =
            RepServer::bind(&self.rep_addr, &shutdown).await?;
        let watcher = Arc::new(ReqSocket::connect(
            self.watcher_addr.clone(),
            self.request_timeout,
        ));
        let extractors = Arc::clone(&self.extractors);
        tokio::spawn(async move {
            while let Some((request, responder)) = rep.recv().await {
                let reply = fetch_extracted_text(&watcher, &extractors, &request).await;
                responder.send(reply);
            }
        });

        info!(
            "preprocessor running (pull {}, push {}, rep {})",
            self.pull_addr, self.push_addr, self.rep_addr
        );

        let cancel = shutdown.push_token();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = pull.recv::<FileEvent>() => match received {
                    Some(Ok(event)) => {
                        let document = self.process_event(event).await;
                        push.send(&document)?;
                    }
                    Some(Err(e)) => {
                        // One malformed event never halts the stream.
                        warn!("dropping malformed file event: {e}");
                    }
                    None => break,
                }
            }
        }

        info!("preprocessor stopped");
        Ok(())
    }

    /// Turn a file event into an extracted document. Extraction failure
    /// is recorded on the document, never raised.
    pub async fn process_event(&self, event: FileEvent) -> ExtractedDocument {
        let meta = DocMeta::from_event(&event);
        match event {
            FileEvent::Delete { .. } => ExtractedDocument::Deleted { meta },
            FileEvent::Create { payload, .. } => {
                match extract(&self.extractors, &meta.relative_path, &payload.bytes).await {
                    Ok(content) => {
                        let content_length = char_len(&content);
                        debug!(
                            "extracted {} chars from {}",
                            content_length, meta.relative_path
                        );
                        ExtractedDocument::Processed {
                            meta,
                            content,
                            content_length,
                            diff: None,
                        }
                    }
                    Err(e) => {
                        warn!("extraction failed for {}: {e}", meta.relative_path);
                        ExtractedDocument::ExtractionFailed { meta }
                    }
                }
            }
            FileEvent::Update { payload, diff, .. } => {
                match extract(&self.extractors, &meta.relative_path, &payload.bytes).await {
                    Ok(content) => {
                        let content_length = char_len(&content);
                        ExtractedDocument::Processed {
                            meta,
                            content,
                            content_length,
                            diff,
                        }
                    }
                    Err(e) => {
                        warn!("extraction failed for {}: {e}", meta.relative_path);
                        ExtractedDocument::ExtractionFailed { meta }
                    }
                }
            }
        }
    }
}

async fn extract(
    extractors: &[Box<dyn TextExtractor>],
    relative_path: &str,
    bytes: &[u8],
) -> Result<String, IngestError> {
    let extractor = extractor_for(extractors, relative_path).ok_or_else(|| {
        IngestError::Indexing(sift_indexing::IndexingError::UnsupportedFileType(
            relative_path.to_string(),
        ))
    })?;
    Ok(extractor.extract(bytes, relative_path).await?)
}

/// Serve one extracted-text request: fetch raw bytes from the watcher,
/// spool them through a per-request scratch file, extract, reply. The
/// scratch file is removed on every path out of this function.
async fn fetch_extracted_text(
    watcher: &ReqSocket,
    extractors: &[Box<dyn TextExtractor>],
    request: &FetchTextRequest,
) -> FetchTextReply {
    let raw: FetchFileReply = match watcher
        .request(&FetchFileRequest {
            relative_path: request.relative_path.clone(),
        })
        .await
    {
        Ok(reply) => reply,
        Err(e) => {
            return FetchTextReply::Error {
                error: format!("watcher fetch failed: {e}"),
            }
        }
    };

    let (bytes, size, name) = match raw {
        FetchFileReply::Success { bytes, size, name } => (bytes, size, name),
        FetchFileReply::Error { error, .. } => return FetchTextReply::Error { error },
    };

    // Scratch file lives only as long as this request; dropping the
    // handle removes it even when extraction errors out.
    let scratch = match tempfile::NamedTempFile::new() {
        Ok(mut scratch) => match scratch.write_all(&bytes).and_then(|_| scratch.flush()) {
            Ok(()) => scratch,
            Err(e) => {
                return FetchTextReply::Error {
                    error: format!("scratch write failed: {e}"),
                }
            }
        },
        Err(e) => {
            return FetchTextReply::Error {
                error: format!("scratch create failed: {e}"),
            }
        }
    };

    let spooled = match std::fs::read(scratch.path()) {
        Ok(spooled) => spooled,
        Err(e) => {
            return FetchTextReply::Error {
                error: format!("scratch read failed: {e}"),
            }
        }
    };

    match extract(extractors, &request.relative_path, &spooled).await {
        Ok(content) => FetchTextReply::Success {
            length: char_len(&content),
            content,
            name,
            size,
        },
        Err(e) => FetchTextReply::Error {
            error: format!("extraction failed: {e}"),
        },
    }
}
