//! In-memory store for tests and offline runs.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{EmbeddingRecord, IndexError, SearchHit, VectorStore};

#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, EmbeddingRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, for assertions.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// All records for a path, ordered by char_start.
    pub async fn records_for(&self, relative_path: &str) -> Vec<EmbeddingRecord> {
        let mut records: Vec<EmbeddingRecord> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.relative_path == relative_path)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.char_start);
        records
    }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn upsert(&self, records: &[EmbeddingRecord]) -> Result<(), IndexError> {
        let mut guard = self.records.write().await;
        for record in records {
            guard.insert(record.id(), record.clone());
        }
        Ok(())
    }

    async fn fetch_by_path(&self, relative_path: &str) -> Result<Vec<EmbeddingRecord>, IndexError> {
        Ok(self.records_for(relative_path).await)
    }

    async fn delete_by_path(&self, relative_path: &str) -> Result<(), IndexError> {
        self.records
            .write()
            .await
            .retain(|_, r| r.relative_path != relative_path);
        Ok(())
    }

    async fn search(
        &self,
        embedding: &[f32],
        n_results: usize,
        allow: &[String],
    ) -> Result<Vec<SearchHit>, IndexError> {
        if allow.is_empty() {
            return Ok(Vec::new());
        }
        let guard = self.records.read().await;
        let mut hits: Vec<SearchHit> = guard
            .values()
            .filter(|r| allow.iter().any(|p| p == &r.relative_path))
            .map(|r| SearchHit {
                relative_path: r.relative_path.clone(),
                char_start: r.char_start,
                char_end: r.char_end,
                distance: cosine_distance(embedding, &r.vector),
            })
            .collect();
        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(n_results);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str, start: usize, end: usize, vector: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            relative_path: path.to_string(),
            char_start: start,
            char_end: end,
            vector,
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_same_id() {
        let store = MemoryStore::new();
        store
            .upsert(&[record("a.txt", 0, 5, vec![1.0, 0.0])])
            .await
            .unwrap();
        store
            .upsert(&[record("a.txt", 0, 5, vec![0.0, 1.0])])
            .await
            .unwrap();
        assert_eq!(store.len().await, 1);
        assert_eq!(store.records_for("a.txt").await[0].vector, vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_delete_by_path_removes_all_records() {
        let store = MemoryStore::new();
        store
            .upsert(&[
                record("a.txt", 0, 5, vec![1.0]),
                record("a.txt", 5, 9, vec![1.0]),
                record("b.txt", 0, 3, vec![1.0]),
            ])
            .await
            .unwrap();
        store.delete_by_path("a.txt").await.unwrap();
        assert!(store.records_for("a.txt").await.is_empty());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_fetch_by_path_returns_full_records() {
        let store = MemoryStore::new();
        store
            .upsert(&[
                record("a.txt", 0, 5, vec![1.0, 2.0]),
                record("b.txt", 0, 3, vec![3.0]),
            ])
            .await
            .unwrap();
        let fetched = store.fetch_by_path("a.txt").await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].vector, vec![1.0, 2.0]);
        assert!(store.fetch_by_path("missing.txt").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_unknown_path_is_noop() {
        let store = MemoryStore::new();
        store.delete_by_path("missing.txt").await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_search_respects_allow_list() {
        let store = MemoryStore::new();
        store
            .upsert(&[
                record("open.txt", 0, 5, vec![1.0, 0.0]),
                record("secret.txt", 0, 5, vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let hits = store
            .search(&[1.0, 0.0], 10, &["open.txt".to_string()])
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].relative_path, "open.txt");

        let none = store.search(&[1.0, 0.0], 10, &[]).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_search_orders_by_distance() {
        let store = MemoryStore::new();
        store
            .upsert(&[
                record("a.txt", 0, 5, vec![1.0, 0.0]),
                record("a.txt", 5, 9, vec![0.0, 1.0]),
            ])
            .await
            .unwrap();
        let hits = store
            .search(&[1.0, 0.1], 2, &["a.txt".to_string()])
            .await
            .unwrap();
        assert_eq!(hits[0].char_start, 0);
        assert!(hits[0].distance < hits[1].distance);
    }
}
