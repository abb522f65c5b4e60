//! End-to-end ingestion: file events pushed into the preprocessor flow
//! through extraction, chunking, embedding, and index updates, with
//! notifications landing in a mailbox stand-in.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use sift_config::SiftConfig;
use sift_index::{EmbeddingRecord, MemoryStore};
use sift_indexing::text::char_slice;
use sift_indexing::{Chunker, RuleChunker};
use sift_ingest::{PostprocessorService, PreprocessorService};
use sift_models::{Embedder, StubEmbedder, StubLanguageModel};
use sift_wire::{
    DiffKind, DiffPayload, EventKind, EventMeta, FileEvent, FilePayload, MailboxPost,
    MailboxReply, PushSocket, RepServer, Shutdown,
};

struct Pipeline {
    push: PushSocket,
    store: Arc<MemoryStore>,
    posts: Arc<Mutex<Vec<MailboxPost>>>,
    config: SiftConfig,
    shutdown: Shutdown,
}

fn free_addr() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);
    addr
}

async fn start_pipeline() -> Pipeline {
    let shutdown = Shutdown::new();

    let yaml = format!(
        r#"
watch_root: ./data
transport:
  push_addr: {}
  router_addr: {}
  access_addr: {}
  preprocess_out_addr: {}
  preprocess_req_addr: {}
  mailbox_addr: {}
"#,
        free_addr(),
        free_addr(),
        free_addr(),
        free_addr(),
        free_addr(),
        free_addr(),
    );
    let config = SiftConfig::from_yaml(&yaml).unwrap();

    // Mailbox stand-in.
    let mut mailbox: RepServer<MailboxPost, MailboxReply> =
        RepServer::bind(&config.transport.mailbox_addr, &shutdown)
            .await
            .unwrap();
    let posts = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&posts);
    tokio::spawn(async move {
        while let Some((post, responder)) = mailbox.recv().await {
            let delivered = post.user_ids.len();
            seen.lock().unwrap().push(post);
            responder.send(MailboxReply::Success { delivered });
        }
    });

    let store = Arc::new(MemoryStore::new());
    let postprocessor = PostprocessorService::new(
        &config,
        Arc::new(StubLanguageModel::new()),
        Arc::new(StubEmbedder::new(8)),
        Arc::clone(&store) as Arc<dyn sift_index::VectorStore>,
    );
    tokio::spawn(postprocessor.run(shutdown.clone()));

    let preprocessor = PreprocessorService::new(&config);
    tokio::spawn(preprocessor.run(shutdown.clone()));
    // Let the pull sockets bind before pushing.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let push = PushSocket::connect(config.transport.push_addr.clone(), &shutdown);

    Pipeline {
        push,
        store,
        posts,
        config,
        shutdown,
    }
}

fn meta(path: &str) -> EventMeta {
    EventMeta {
        relative_path: path.to_string(),
        user_id: "alice".to_string(),
        timestamp: 1.0,
        committed: true,
        liked_users: vec!["alice".to_string(), "bob".to_string()],
    }
}

fn create_event(path: &str, content: &str) -> FileEvent {
    FileEvent::Create {
        meta: meta(path),
        payload: FilePayload::new(content.as_bytes().to_vec()),
    }
}

fn update_event(path: &str, content: &str, diff: &str) -> FileEvent {
    FileEvent::Update {
        meta: meta(path),
        payload: FilePayload::new(content.as_bytes().to_vec()),
        diff: Some(DiffPayload {
            kind: DiffKind::Modification,
            text: diff.to_string(),
        }),
    }
}

/// Poll until the store for `path` satisfies `predicate`.
async fn wait_for_records(
    store: &MemoryStore,
    path: &str,
    predicate: impl Fn(&[EmbeddingRecord]) -> bool,
) -> Vec<EmbeddingRecord> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let records = store.records_for(path).await;
        if predicate(&records) {
            return records;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("records for {path} never reached the expected state: {records:?}");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// With the stub model answering nothing, chunking deterministically
/// falls back to the rule chunker; expected records derive from it.
async fn expected_records(path: &str, content: &str) -> Vec<EmbeddingRecord> {
    let chunks = RuleChunker::with_group_size(8).chunk(content).await.unwrap();
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = StubEmbedder::new(8).embed(&texts).await.unwrap();
    chunks
        .iter()
        .zip(vectors)
        .map(|(chunk, vector)| EmbeddingRecord {
            relative_path: path.to_string(),
            char_start: chunk.char_start,
            char_end: chunk.char_end,
            vector,
        })
        .collect()
}

#[tokio::test]
async fn test_create_update_delete_lifecycle() {
    let pipeline = start_pipeline().await;
    let content_v1 = "Hello world. This is a test.";
    let path = "docs/intro.txt";

    // Create: records appear and every span maps back into the content.
    pipeline.push.send(&create_event(path, content_v1)).unwrap();
    let records = wait_for_records(&pipeline.store, path, |r| !r.is_empty()).await;
    for record in &records {
        let slice = char_slice(content_v1, record.char_start, record.char_end);
        assert!(!slice.trim().is_empty());
    }
    assert_eq!(records, expected_records(path, content_v1).await);

    let create_posts = pipeline.posts.lock().unwrap().len();
    assert!(create_posts >= 1, "create notification expected");

    // Update: the prior generation is gone, replaced wholesale.
    let content_v2 = "Hello world. This is a test. New sentence.";
    pipeline
        .push
        .send(&update_event(path, content_v2, "+New sentence."))
        .unwrap();
    let expected_v2 = expected_records(path, content_v2).await;
    let records = wait_for_records(&pipeline.store, path, |r| r == expected_v2).await;
    assert_eq!(records, expected_v2);

    // The diff notification went to subscribers minus the author.
    {
        let posts = pipeline.posts.lock().unwrap();
        let update_post = posts
            .iter()
            .find(|p| p.payload.event_type == EventKind::Update)
            .expect("update notification");
        assert_eq!(update_post.user_ids, vec!["bob".to_string()]);
        assert_eq!(update_post.payload.relative_path, path);
    }

    // Delete: nothing remains for the path.
    pipeline
        .push
        .send(&FileEvent::Delete { meta: meta(path) })
        .unwrap();
    wait_for_records(&pipeline.store, path, |r| r.is_empty()).await;
    {
        let posts = pipeline.posts.lock().unwrap();
        assert!(posts
            .iter()
            .any(|p| p.payload.event_type == EventKind::Delete));
    }

    pipeline.shutdown.cancel_all();
}

#[tokio::test]
async fn test_duplicate_create_is_idempotent() {
    let pipeline = start_pipeline().await;
    let content = "Same content both times. Nothing changes.";
    let path = "docs/dup.txt";

    pipeline.push.send(&create_event(path, content)).unwrap();
    let first = wait_for_records(&pipeline.store, path, |r| !r.is_empty()).await;

    pipeline.push.send(&create_event(path, content)).unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    let second = pipeline.store.records_for(path).await;

    assert_eq!(first, second);
    pipeline.shutdown.cancel_all();
}

#[tokio::test]
async fn test_back_to_back_updates_settle_on_last() {
    let pipeline = start_pipeline().await;
    let path = "docs/race.txt";

    pipeline
        .push
        .send(&create_event(path, "Original content here."))
        .unwrap();
    wait_for_records(&pipeline.store, path, |r| !r.is_empty()).await;

    let second = "Second revision. It is longer than the first one.";
    pipeline
        .push
        .send(&update_event(path, "First revision.", "+First revision."))
        .unwrap();
    pipeline
        .push
        .send(&update_event(path, second, "+Second revision."))
        .unwrap();

    // Final state equals processing only the second update on a clean
    // slate for the path.
    let expected = expected_records(path, second).await;
    let records = wait_for_records(&pipeline.store, path, |r| r == expected).await;
    assert_eq!(records, expected);
    pipeline.shutdown.cancel_all();
}

#[tokio::test]
async fn test_extraction_failure_does_not_halt_stream() {
    let pipeline = start_pipeline().await;

    // A PDF that is not a PDF fails extraction...
    pipeline
        .push
        .send(&create_event("docs/broken.pdf", "not a pdf at all"))
        .unwrap();
    // ...and the next event still flows through.
    pipeline
        .push
        .send(&create_event("docs/after.txt", "Still alive. Still indexing."))
        .unwrap();

    let records = wait_for_records(&pipeline.store, "docs/after.txt", |r| !r.is_empty()).await;
    assert!(!records.is_empty());
    assert!(pipeline.store.records_for("docs/broken.pdf").await.is_empty());
    assert!(pipeline.config.validate().is_empty());
    pipeline.shutdown.cancel_all();
}
