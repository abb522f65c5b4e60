//! Per-user FIFO of notification payloads, with a wire server for
//! posting and an HTTP surface for reading.

mod http;
mod service;

pub use http::build_router;
pub use service::MailboxService;

use std::collections::HashMap;

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use sift_wire::Notification;

/// One delivered notification, timestamped at delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub message: Notification,
    pub timestamp: f64,
    pub formatted_time: String,
}

fn format_timestamp(ts: f64) -> String {
    DateTime::from_timestamp(ts as i64, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

/// In-memory mailbox: strict FIFO per user, no cross-user ordering.
#[derive(Default)]
pub struct Mailbox {
    queues: RwLock<HashMap<String, Vec<StoredMessage>>>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a timestamped copy of `payload` to each user's queue.
    /// Returns how many users were delivered to.
    pub async fn post(&self, user_ids: &[String], payload: Notification) -> usize {
        let timestamp = sift_wire::now_ts();
        let message = StoredMessage {
            message: payload,
            timestamp,
            formatted_time: format_timestamp(timestamp),
        };
        let mut queues = self.queues.write().await;
        for user_id in user_ids {
            queues
                .entry(user_id.clone())
                .or_default()
                .push(message.clone());
        }
        user_ids.len()
    }

    /// A user's messages, oldest first.
    pub async fn fetch(&self, user_id: &str) -> Vec<StoredMessage> {
        self.queues
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_wire::EventKind;

    fn notification(summary: &str) -> Notification {
        Notification {
            event_type: EventKind::Create,
            relative_path: "docs/a.txt".to_string(),
            summary: summary.to_string(),
            timestamp: 1.0,
        }
    }

    #[tokio::test]
    async fn test_fifo_per_user() {
        let mailbox = Mailbox::new();
        let users = vec!["bob".to_string()];
        mailbox.post(&users, notification("first")).await;
        mailbox.post(&users, notification("second")).await;

        let messages = mailbox.fetch("bob").await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].message.summary, "first");
        assert_eq!(messages[1].message.summary, "second");
    }

    #[tokio::test]
    async fn test_post_fans_out() {
        let mailbox = Mailbox::new();
        let users = vec!["a".to_string(), "b".to_string()];
        let delivered = mailbox.post(&users, notification("hello")).await;
        assert_eq!(delivered, 2);
        assert_eq!(mailbox.fetch("a").await.len(), 1);
        assert_eq!(mailbox.fetch("b").await.len(), 1);
        assert!(mailbox.fetch("c").await.is_empty());
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "1970-01-01 00:00:00");
        assert_eq!(format_timestamp(1700000000.5), "2023-11-14 22:13:20");
    }
}
