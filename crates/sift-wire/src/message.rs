//! Wire messages. Everything is JSON on the wire; file bytes travel as
//! base64 strings. Unknown enum tags fail deserialization, which the
//! receiving loops log and drop.

use serde::{Deserialize, Serialize};

/// Epoch-seconds wall clock, the timestamp representation on the wire.
pub fn now_ts() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Serde adapter for `Vec<u8>` as a base64 string.
pub mod b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// Kind of filesystem mutation, carried through the whole pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Create,
    Update,
    Delete,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Create => "create",
            EventKind::Update => "update",
            EventKind::Delete => "delete",
        }
    }
}

/// Fields present on every file event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMeta {
    /// Path relative to the watched root; the canonical file identity.
    pub relative_path: String,
    /// Ingest principal that observed the mutation.
    pub user_id: String,
    /// Wall time of detection, epoch seconds.
    pub timestamp: f64,
    /// Whether the change was recorded in the version snapshot.
    pub committed: bool,
    /// Users subscribed to the containing folder.
    pub liked_users: Vec<String>,
}

/// Raw file bytes attached to create/update events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilePayload {
    #[serde(with = "b64")]
    pub bytes: Vec<u8>,
    pub size: usize,
}

impl FilePayload {
    pub fn new(bytes: Vec<u8>) -> Self {
        let size = bytes.len();
        FilePayload { bytes, size }
    }
}

/// Textual diff against the version snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffPayload {
    pub kind: DiffKind,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    NewFile,
    Modification,
}

/// Event emitted by the watcher for every accepted filesystem mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum FileEvent {
    Create {
        #[serde(flatten)]
        meta: EventMeta,
        payload: FilePayload,
    },
    Update {
        #[serde(flatten)]
        meta: EventMeta,
        payload: FilePayload,
        #[serde(skip_serializing_if = "Option::is_none")]
        diff: Option<DiffPayload>,
    },
    Delete {
        #[serde(flatten)]
        meta: EventMeta,
    },
}

impl FileEvent {
    pub fn meta(&self) -> &EventMeta {
        match self {
            FileEvent::Create { meta, .. }
            | FileEvent::Update { meta, .. }
            | FileEvent::Delete { meta } => meta,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            FileEvent::Create { .. } => EventKind::Create,
            FileEvent::Update { .. } => EventKind::Update,
            FileEvent::Delete { .. } => EventKind::Delete,
        }
    }

    pub fn relative_path(&self) -> &str {
        &self.meta().relative_path
    }
}

/// Fields present on every extracted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocMeta {
    pub event_type: EventKind,
    pub relative_path: String,
    pub user_id: String,
    pub timestamp: f64,
    pub liked_users: Vec<String>,
}

impl DocMeta {
    pub fn from_event(event: &FileEvent) -> Self {
        let meta = event.meta();
        DocMeta {
            event_type: event.kind(),
            relative_path: meta.relative_path.clone(),
            user_id: meta.user_id.clone(),
            timestamp: meta.timestamp,
            liked_users: meta.liked_users.clone(),
        }
    }
}

/// Document produced by the preprocessor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtractedDocument {
    Processed {
        #[serde(flatten)]
        meta: DocMeta,
        content: String,
        content_length: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        diff: Option<DiffPayload>,
    },
    Deleted {
        #[serde(flatten)]
        meta: DocMeta,
    },
    ExtractionFailed {
        #[serde(flatten)]
        meta: DocMeta,
    },
}

impl ExtractedDocument {
    pub fn meta(&self) -> &DocMeta {
        match self {
            ExtractedDocument::Processed { meta, .. }
            | ExtractedDocument::Deleted { meta }
            | ExtractedDocument::ExtractionFailed { meta } => meta,
        }
    }

    pub fn relative_path(&self) -> &str {
        &self.meta().relative_path
    }
}

/// Why a raw-file fetch was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorCode {
    NotFound,
    Unsupported,
    OutOfRoot,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchFileRequest {
    pub relative_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FetchFileReply {
    Success {
        #[serde(with = "b64")]
        bytes: Vec<u8>,
        size: usize,
        name: String,
    },
    Error {
        code: FetchErrorCode,
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessRequest {
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AccessReply {
    Success { pathlist: Vec<String> },
    Error { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchTextRequest {
    pub relative_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FetchTextReply {
    Success {
        content: String,
        length: usize,
        name: String,
        size: usize,
    },
    Error {
        error: String,
    },
}

/// Payload delivered to subscribed users when a file changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub event_type: EventKind,
    pub relative_path: String,
    pub summary: String,
    pub timestamp: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailboxPost {
    pub user_ids: Vec<String>,
    pub payload: Notification,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MailboxReply {
    Success { delivered: usize },
    Error { error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> EventMeta {
        EventMeta {
            relative_path: "docs/intro.txt".to_string(),
            user_id: "alice".to_string(),
            timestamp: 1700000000.5,
            committed: true,
            liked_users: vec!["bob".to_string()],
        }
    }

    #[test]
    fn test_file_event_tagging() {
        let event = FileEvent::Create {
            meta: meta(),
            payload: FilePayload::new(b"hello".to_vec()),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "create");
        assert_eq!(json["relative_path"], "docs/intro.txt");
        // payload bytes are base64 on the wire
        assert_eq!(json["payload"]["bytes"], "aGVsbG8=");
        assert_eq!(json["payload"]["size"], 5);

        let back: FileEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_unknown_event_tag_rejected() {
        let json = serde_json::json!({
            "event_type": "rename",
            "relative_path": "a.txt",
            "user_id": "u",
            "timestamp": 0.0,
            "committed": false,
            "liked_users": []
        });
        assert!(serde_json::from_value::<FileEvent>(json).is_err());
    }

    #[test]
    fn test_extracted_document_status_tag() {
        let doc = ExtractedDocument::Processed {
            meta: DocMeta {
                event_type: EventKind::Update,
                relative_path: "docs/intro.txt".to_string(),
                user_id: "alice".to_string(),
                timestamp: 1.0,
                liked_users: vec![],
            },
            content: "text".to_string(),
            content_length: 4,
            diff: Some(DiffPayload {
                kind: DiffKind::Modification,
                text: "-a\n+b".to_string(),
            }),
        };
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["status"], "processed");
        assert_eq!(json["event_type"], "update");
        assert_eq!(json["diff"]["kind"], "modification");

        let back: ExtractedDocument = serde_json::from_value(json).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_delete_event_has_no_payload() {
        let event = FileEvent::Delete { meta: meta() };
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("payload").is_none());
    }

    #[test]
    fn test_fetch_reply_envelope() {
        let reply = FetchFileReply::Error {
            code: FetchErrorCode::OutOfRoot,
            error: "path escapes the watched root".to_string(),
        };
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["code"], "out_of_root");
    }
}
