//! Version snapshot of the watched root.
//!
//! The watched tree is a git repository owned exclusively by the
//! watcher. Every forwarded create/update is committed before the event
//! is transmitted; deletes get a removal commit. Updates are described
//! by a unified diff between the committed tip and the working copy.

use std::path::{Path, PathBuf};

use git2::{DiffFormat, DiffOptions, Repository, Signature, Status};
use tracing::{debug, info};

use sift_wire::{DiffKind, DiffPayload, EventKind};

use crate::WatchError;

const GITIGNORE: &str = "*.tmp\n*.swp\n*.swo\n";

pub struct Snapshot {
    repo: Repository,
    root: PathBuf,
    author: String,
}

impl Snapshot {
    /// Open the repository in `root`, initializing one (with an ignore
    /// rule for editor scratch files and an initial commit) if absent.
    pub fn open_or_init(root: &Path, author: &str) -> Result<Self, WatchError> {
        std::fs::create_dir_all(root)?;

        let repo = match Repository::open(root) {
            Ok(repo) => {
                info!("opened existing snapshot at {}", root.display());
                repo
            }
            Err(_) => {
                let repo = Repository::init(root)?;
                std::fs::write(root.join(".gitignore"), GITIGNORE)?;
                {
                    let mut index = repo.index()?;
                    index.add_path(Path::new(".gitignore"))?;
                    index.write()?;
                    let tree_id = index.write_tree()?;
                    let tree = repo.find_tree(tree_id)?;
                    let sig = Self::signature(author)?;
                    repo.commit(
                        Some("HEAD"),
                        &sig,
                        &sig,
                        &format!("Initial commit by {author}"),
                        &tree,
                        &[],
                    )?;
                }
                info!("initialized snapshot at {}", root.display());
                repo
            }
        };

        Ok(Snapshot {
            repo,
            root: root.to_path_buf(),
            author: author.to_string(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn signature(author: &str) -> Result<Signature<'static>, git2::Error> {
        Signature::now(author, &format!("{author}@sift.local"))
    }

    /// Record a change as a commit authored by the ingest principal.
    pub fn commit_change(&self, relative_path: &str, kind: EventKind) -> Result<(), WatchError> {
        let mut index = self.repo.index()?;
        match kind {
            EventKind::Delete => index.remove_path(Path::new(relative_path))?,
            EventKind::Create | EventKind::Update => index.add_path(Path::new(relative_path))?,
        }
        index.write()?;
        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;

        let verb = match kind {
            EventKind::Create => "Add",
            EventKind::Update => "Update",
            EventKind::Delete => "Delete",
        };
        let message = format!("{verb} {relative_path} by {}", self.author);

        let sig = Self::signature(&self.author)?;
        let parent = self
            .repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        self.repo
            .commit(Some("HEAD"), &sig, &sig, &message, &tree, &parents)?;
        debug!("snapshot commit: {message}");
        Ok(())
    }

    /// Unified diff for a modified file, or an all-added diff for a file
    /// the snapshot has never seen. `None` when there is nothing to say.
    pub fn diff_for(&self, relative_path: &str) -> Option<DiffPayload> {
        if self.is_untracked(relative_path) {
            return self.synthesized_diff(relative_path);
        }

        let head_tree = self.repo.head().ok()?.peel_to_tree().ok()?;
        let mut opts = DiffOptions::new();
        opts.pathspec(relative_path);
        let diff = self
            .repo
            .diff_tree_to_workdir(Some(&head_tree), Some(&mut opts))
            .ok()?;

        let mut text = String::new();
        diff.print(DiffFormat::Patch, |_, _, line| {
            match line.origin() {
                '+' | '-' | ' ' => text.push(line.origin()),
                _ => {}
            }
            text.push_str(std::str::from_utf8(line.content()).unwrap_or(""));
            true
        })
        .ok()?;

        if text.is_empty() {
            None
        } else {
            Some(DiffPayload {
                kind: DiffKind::Modification,
                text,
            })
        }
    }

    fn is_untracked(&self, relative_path: &str) -> bool {
        self.repo
            .status_file(Path::new(relative_path))
            .map(|status| status.contains(Status::WT_NEW))
            .unwrap_or(false)
    }

    /// A file with no committed ancestor diffs as all additions.
    fn synthesized_diff(&self, relative_path: &str) -> Option<DiffPayload> {
        let bytes = std::fs::read(self.root.join(relative_path)).ok()?;
        let content = String::from_utf8_lossy(&bytes);
        let mut text = format!("--- /dev/null\n+++ b/{relative_path}\n");
        for line in content.split('\n') {
            text.push('+');
            text.push_str(line);
            text.push('\n');
        }
        Some(DiffPayload {
            kind: DiffKind::NewFile,
            text,
        })
    }
}
