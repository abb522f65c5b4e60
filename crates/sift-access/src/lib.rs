//! Access oracle: the single source of truth for who may read what and
//! who hears about changes where.
//!
//! Three tables live behind one lock: user → authorized paths,
//! folder → subscribers, and folder → files. Readers take shared
//! access; `update_structure` takes exclusive access. Other components
//! only ever hold momentary copies returned by queries.

use std::collections::{BTreeMap, BTreeSet};

use sift_config::AccessConfig;
use tokio::sync::RwLock;
use tracing::debug;

/// Structural mutation applied when files appear or disappear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureOp {
    Create,
    Delete,
}

#[derive(Debug, Default)]
struct Tables {
    user_paths: BTreeMap<String, BTreeSet<String>>,
    folder_subscribers: BTreeMap<String, BTreeSet<String>>,
    folder_files: BTreeMap<String, BTreeSet<String>>,
}

/// The folder a path files under: its first component, or the path
/// itself for top-level files.
pub fn folder_of(relative_path: &str) -> &str {
    relative_path
        .split(['/', '\\'])
        .next()
        .unwrap_or(relative_path)
}

#[derive(Debug, Default)]
pub struct AccessOracle {
    tables: RwLock<Tables>,
}

impl AccessOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the tables from configuration. The folder → files index is
    /// derived from the authorized paths and kept current afterwards by
    /// `update_structure`.
    pub fn from_config(config: &AccessConfig) -> Self {
        let mut tables = Tables::default();
        for (user, paths) in &config.users {
            let entry = tables.user_paths.entry(user.clone()).or_default();
            for path in paths {
                entry.insert(path.clone());
                tables
                    .folder_files
                    .entry(folder_of(path).to_string())
                    .or_default()
                    .insert(path.clone());
            }
        }
        for (folder, users) in &config.subscribers {
            tables
                .folder_subscribers
                .entry(folder.clone())
                .or_default()
                .extend(users.iter().cloned());
        }
        AccessOracle {
            tables: RwLock::new(tables),
        }
    }

    /// Paths the user may read. Deterministic; unknown users get an
    /// empty list, never an error.
    pub async fn authorized(&self, user_id: &str) -> Vec<String> {
        self.tables
            .read()
            .await
            .user_paths
            .get(user_id)
            .map(|paths| paths.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Users subscribed to a folder.
    pub async fn subscribers(&self, folder: &str) -> Vec<String> {
        self.tables
            .read()
            .await
            .folder_subscribers
            .get(folder)
            .map(|users| users.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Record a file appearing or disappearing. Idempotent: re-adding
    /// an existing file or removing an absent one is a no-op with a
    /// diagnostic.
    pub async fn update_structure(&self, relative_path: &str, op: StructureOp) {
        let folder = folder_of(relative_path).to_string();
        let mut tables = self.tables.write().await;
        match op {
            StructureOp::Create => {
                let inserted = tables
                    .folder_files
                    .entry(folder.clone())
                    .or_default()
                    .insert(relative_path.to_string());
                if !inserted {
                    debug!("structure create for already-known file {relative_path}");
                }
            }
            StructureOp::Delete => {
                let removed = tables
                    .folder_files
                    .get_mut(&folder)
                    .map(|files| files.remove(relative_path))
                    .unwrap_or(false);
                if !removed {
                    debug!("structure delete for unknown file {relative_path}");
                } else if tables
                    .folder_files
                    .get(&folder)
                    .map(BTreeSet::is_empty)
                    .unwrap_or(false)
                {
                    tables.folder_files.remove(&folder);
                }
            }
        }
    }

    /// Files currently known under a folder.
    pub async fn folder_files(&self, folder: &str) -> Vec<String> {
        self.tables
            .read()
            .await
            .folder_files
            .get(folder)
            .map(|files| files.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Grant a user access to a path.
    pub async fn grant(&self, user_id: &str, relative_path: &str) {
        self.tables
            .write()
            .await
            .user_paths
            .entry(user_id.to_string())
            .or_default()
            .insert(relative_path.to_string());
    }
}
