//! JSON dump and restore for [`MemoryStore`].

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use domains::models::{Account, Comment, Post, StreakState};

use crate::memory::{username_key, MemoryStore};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("username {0} appears on more than one account")]
    DuplicateUsername(String),
}

/// Every committed record, as plain data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub accounts: Vec<Account>,
    pub posts: Vec<Post>,
    pub comments: Vec<Comment>,
    pub streaks: Vec<StreakState>,
}

impl MemoryStore {
    /// Copies out the committed state. Records are sorted by id so two
    /// snapshots of the same state serialize identically.
    pub fn snapshot(&self) -> Snapshot {
        let tables = &self.tables;
        let mut snapshot = Snapshot {
            accounts: tables.accounts.iter().map(|e| e.value().clone()).collect(),
            posts: tables.posts.iter().map(|e| e.value().clone()).collect(),
            comments: tables.comments.iter().map(|e| e.value().clone()).collect(),
            streaks: tables.streaks.iter().map(|e| e.value().clone()).collect(),
        };
        snapshot.accounts.sort_by_key(|a| a.id);
        snapshot.posts.sort_by_key(|p| p.id);
        snapshot.comments.sort_by_key(|c| c.id);
        snapshot.streaks.sort_by_key(|s| s.account_id);
        snapshot
    }

    /// Builds a store holding exactly the records in `snapshot`, as they are.
    /// Counters are not checked here; that is the reconciler's job.
    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self, SnapshotError> {
        let store = MemoryStore::new();
        let tables = &store.tables;
        for account in snapshot.accounts {
            let name = username_key(&account.username);
            if tables.usernames.insert(name, account.id).is_some() {
                return Err(SnapshotError::DuplicateUsername(account.username));
            }
            tables.accounts.insert(account.id, account);
        }
        for post in snapshot.posts {
            tables.posts.insert(post.id, post);
        }
        for comment in snapshot.comments {
            tables.comments.insert(comment.id, comment);
        }
        for state in snapshot.streaks {
            tables.streaks.insert(state.account_id, state);
        }
        Ok(store)
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let raw = fs::read_to_string(path.as_ref())?;
        let snapshot: Snapshot = serde_json::from_str(&raw)?;
        info!(
            path = %path.as_ref().display(),
            accounts = snapshot.accounts.len(),
            posts = snapshot.posts.len(),
            "loaded snapshot"
        );
        Self::from_snapshot(snapshot)
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        let json = serde_json::to_string_pretty(&self.snapshot())?;
        fs::write(path.as_ref(), json)?;
        info!(path = %path.as_ref().display(), "saved snapshot");
        Ok(())
    }
}
