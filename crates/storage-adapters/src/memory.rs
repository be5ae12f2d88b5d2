//! # In-memory store
//!
//! `DashMap` tables holding committed records, plus a table of per-record
//! async mutexes. A [`MemoryUnitOfWork`] takes the mutexes of the records it
//! touches, stages its writes privately and publishes them all at `commit`
//! while still holding every mutex. Readers never wait on a unit of work:
//! they copy the last committed value of each record out of its table.
//! Publishing is per record, so an unlocked reader that looks at two records
//! written by one unit (both sides of a follow, a post and its new comment)
//! can observe one of them before the other.
//!
//! Lock entries are created on first use and dropped again when a commit
//! removes their record and nobody else is queued on them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, trace};

use domains::error::{EntityKind, StoreError};
use domains::feed::{feed_order, FeedFilter, Page};
use domains::ids::{AccountId, CommentId, PostId};
use domains::models::{Account, Comment, Post, StreakState};
use domains::ports::{SocialStore, UnitOfWork};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RecordKey {
    Account(AccountId),
    Post(PostId),
    Comment(CommentId),
    Streak(AccountId),
}

impl RecordKey {
    fn describe(&self) -> (EntityKind, String) {
        match self {
            RecordKey::Account(id) => (EntityKind::Account, id.to_string()),
            RecordKey::Post(id) => (EntityKind::Post, id.to_string()),
            RecordKey::Comment(id) => (EntityKind::Comment, id.to_string()),
            RecordKey::Streak(id) => (EntityKind::StreakState, id.to_string()),
        }
    }
}

/// Writes of one unit, per table. `None` marks a removal.
#[derive(Debug, Default)]
struct Staging {
    accounts: HashMap<AccountId, Account>,
    posts: HashMap<PostId, Option<Post>>,
    comments: HashMap<CommentId, Option<Comment>>,
    streaks: HashMap<AccountId, StreakState>,
}

impl Staging {
    fn len(&self) -> usize {
        self.accounts.len() + self.posts.len() + self.comments.len() + self.streaks.len()
    }

    fn contains(&self, key: RecordKey) -> bool {
        match key {
            RecordKey::Account(id) => self.accounts.contains_key(&id),
            RecordKey::Post(id) => self.posts.contains_key(&id),
            RecordKey::Comment(id) => self.comments.contains_key(&id),
            RecordKey::Streak(id) => self.streaks.contains_key(&id),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Tables {
    pub(crate) accounts: DashMap<AccountId, Account>,
    /// Lowercased username to owner. Entries are reserved as soon as an
    /// account insert is staged and released again if the unit is dropped.
    pub(crate) usernames: DashMap<String, AccountId>,
    pub(crate) posts: DashMap<PostId, Post>,
    pub(crate) comments: DashMap<CommentId, Comment>,
    pub(crate) streaks: DashMap<AccountId, StreakState>,
    locks: DashMap<RecordKey, Arc<Mutex<()>>>,
}

impl Tables {
    fn lock_for(&self, key: RecordKey) -> Arc<Mutex<()>> {
        // Clone the Arc out so no shard guard is held across an await.
        self.locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    /// Drops the mutex of a removed record unless another unit still holds
    /// a handle to it.
    fn prune_lock(&self, key: RecordKey) {
        self.locks
            .remove_if(&key, |_, mutex| Arc::strong_count(mutex) == 1);
    }

    fn exists(&self, key: RecordKey) -> bool {
        match key {
            RecordKey::Account(id) => self.accounts.contains_key(&id),
            RecordKey::Post(id) => self.posts.contains_key(&id),
            RecordKey::Comment(id) => self.comments.contains_key(&id),
            RecordKey::Streak(id) => self.streaks.contains_key(&id),
        }
    }
}

pub(crate) fn username_key(username: &str) -> String {
    username.trim().to_lowercase()
}

/// Process-local implementation of [`SocialStore`].
///
/// Cloning is cheap and every clone shares the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    pub(crate) tables: Arc<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SocialStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        Ok(Box::new(MemoryUnitOfWork::new(self.tables.clone())))
    }

    async fn account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.tables.accounts.get(&id).map(|a| a.value().clone()))
    }

    async fn account_by_username(&self, username: &str) -> Result<Option<Account>, StoreError> {
        let Some(id) = self
            .tables
            .usernames
            .get(&username_key(username))
            .map(|e| *e.value())
        else {
            return Ok(None);
        };
        self.account(id).await
    }

    async fn accounts(&self, ids: &[AccountId]) -> Result<Vec<Account>, StoreError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.tables.accounts.get(id).map(|a| a.value().clone()))
            .collect())
    }

    async fn search_accounts(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Account>, StoreError> {
        let needle = query.to_lowercase();
        let mut found: Vec<Account> = self
            .tables
            .accounts
            .iter()
            .filter(|entry| {
                let account = entry.value();
                account.username.to_lowercase().contains(&needle)
                    || account.full_name.to_lowercase().contains(&needle)
            })
            .map(|entry| entry.value().clone())
            .collect();
        found.sort_by_cached_key(|a| username_key(&a.username));
        found.truncate(limit);
        Ok(found)
    }

    async fn post(&self, id: PostId) -> Result<Option<Post>, StoreError> {
        Ok(self.tables.posts.get(&id).map(|p| p.value().clone()))
    }

    async fn comment(&self, id: CommentId) -> Result<Option<Comment>, StoreError> {
        Ok(self.tables.comments.get(&id).map(|c| c.value().clone()))
    }

    async fn streak(&self, account: AccountId) -> Result<Option<StreakState>, StoreError> {
        Ok(self.tables.streaks.get(&account).map(|s| s.value().clone()))
    }

    async fn scan_posts(&self, filter: &FeedFilter, page: Page) -> Result<Vec<Post>, StoreError> {
        let mut posts: Vec<Post> = self
            .tables
            .posts
            .iter()
            .filter(|entry| filter.admits(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        posts.sort_by(feed_order);
        Ok(page.window(posts))
    }

    async fn top_level_comments(&self, post: PostId) -> Result<Vec<Comment>, StoreError> {
        Ok(self.collect_comments(|c| c.post_id == post && c.parent_id.is_none()))
    }

    async fn replies(&self, comment: CommentId) -> Result<Vec<Comment>, StoreError> {
        Ok(self.collect_comments(|c| c.parent_id == Some(comment)))
    }

    async fn comments_of_post(&self, post: PostId) -> Result<Vec<Comment>, StoreError> {
        Ok(self.collect_comments(|c| c.post_id == post))
    }

    async fn account_ids(&self) -> Result<Vec<AccountId>, StoreError> {
        Ok(self.tables.accounts.iter().map(|e| *e.key()).collect())
    }

    async fn post_ids(&self) -> Result<Vec<PostId>, StoreError> {
        Ok(self.tables.posts.iter().map(|e| *e.key()).collect())
    }

    async fn comment_ids(&self) -> Result<Vec<CommentId>, StoreError> {
        Ok(self.tables.comments.iter().map(|e| *e.key()).collect())
    }
}

impl MemoryStore {
    fn collect_comments(&self, keep: impl Fn(&Comment) -> bool) -> Vec<Comment> {
        self.tables
            .comments
            .iter()
            .filter(|entry| keep(entry.value()))
            .map(|entry| entry.value().clone())
            .collect()
    }
}

/// Staged writes plus the record locks that protect them.
pub struct MemoryUnitOfWork {
    tables: Arc<Tables>,
    held: HashMap<RecordKey, OwnedMutexGuard<()>>,
    staged: Staging,
    reserved_usernames: Vec<(String, AccountId)>,
    closed: bool,
}

impl MemoryUnitOfWork {
    fn new(tables: Arc<Tables>) -> Self {
        Self {
            tables,
            held: HashMap::new(),
            staged: Staging::default(),
            reserved_usernames: Vec::new(),
            closed: false,
        }
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    async fn acquire(&mut self, key: RecordKey) -> Result<(), StoreError> {
        self.ensure_open()?;
        if self.held.contains_key(&key) {
            return Ok(());
        }
        let guard = self.tables.lock_for(key).lock_owned().await;
        trace!(?key, "record locked");
        self.held.insert(key, guard);
        Ok(())
    }

    fn ensure_locked(&self, key: RecordKey) -> Result<(), StoreError> {
        self.ensure_open()?;
        if self.held.contains_key(&key) {
            Ok(())
        } else {
            let (kind, id) = key.describe();
            Err(StoreError::NotLocked(kind, id))
        }
    }

    fn ensure_new(&self, key: RecordKey) -> Result<(), StoreError> {
        self.ensure_open()?;
        if self.staged.contains(key) || self.tables.exists(key) {
            let (kind, id) = key.describe();
            return Err(StoreError::Duplicate(kind, id));
        }
        Ok(())
    }

    /// Applies the staged writes and returns the keys of removed records.
    fn publish(&mut self) -> Vec<RecordKey> {
        let staged = std::mem::take(&mut self.staged);
        let mut removed = Vec::new();
        for (id, account) in staged.accounts {
            self.tables.accounts.insert(id, account);
        }
        for (id, post) in staged.posts {
            match post {
                Some(post) => self.tables.posts.insert(id, post),
                None => {
                    removed.push(RecordKey::Post(id));
                    self.tables.posts.remove(&id).map(|(_, p)| p)
                }
            };
        }
        for (id, comment) in staged.comments {
            match comment {
                Some(comment) => self.tables.comments.insert(id, comment),
                None => {
                    removed.push(RecordKey::Comment(id));
                    self.tables.comments.remove(&id).map(|(_, c)| c)
                }
            };
        }
        for (id, state) in staged.streaks {
            self.tables.streaks.insert(id, state);
        }
        removed
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn lock_account(&mut self, id: AccountId) -> Result<Option<Account>, StoreError> {
        self.acquire(RecordKey::Account(id)).await?;
        Ok(match self.staged.accounts.get(&id) {
            Some(account) => Some(account.clone()),
            None => self.tables.accounts.get(&id).map(|a| a.value().clone()),
        })
    }

    async fn lock_post(&mut self, id: PostId) -> Result<Option<Post>, StoreError> {
        self.acquire(RecordKey::Post(id)).await?;
        Ok(match self.staged.posts.get(&id) {
            Some(post) => post.clone(),
            None => self.tables.posts.get(&id).map(|p| p.value().clone()),
        })
    }

    async fn lock_comment(&mut self, id: CommentId) -> Result<Option<Comment>, StoreError> {
        self.acquire(RecordKey::Comment(id)).await?;
        Ok(match self.staged.comments.get(&id) {
            Some(comment) => comment.clone(),
            None => self.tables.comments.get(&id).map(|c| c.value().clone()),
        })
    }

    async fn lock_streak(&mut self, account: AccountId) -> Result<Option<StreakState>, StoreError> {
        self.acquire(RecordKey::Streak(account)).await?;
        Ok(match self.staged.streaks.get(&account) {
            Some(state) => Some(state.clone()),
            None => self.tables.streaks.get(&account).map(|s| s.value().clone()),
        })
    }

    fn put_account(&mut self, account: Account) -> Result<(), StoreError> {
        self.ensure_locked(RecordKey::Account(account.id))?;
        self.staged.accounts.insert(account.id, account);
        Ok(())
    }

    fn put_post(&mut self, post: Post) -> Result<(), StoreError> {
        self.ensure_locked(RecordKey::Post(post.id))?;
        self.staged.posts.insert(post.id, Some(post));
        Ok(())
    }

    fn put_comment(&mut self, comment: Comment) -> Result<(), StoreError> {
        self.ensure_locked(RecordKey::Comment(comment.id))?;
        self.staged.comments.insert(comment.id, Some(comment));
        Ok(())
    }

    fn put_streak(&mut self, state: StreakState) -> Result<(), StoreError> {
        self.ensure_locked(RecordKey::Streak(state.account_id))?;
        self.staged.streaks.insert(state.account_id, state);
        Ok(())
    }

    fn insert_account(&mut self, account: Account) -> Result<(), StoreError> {
        self.ensure_new(RecordKey::Account(account.id))?;
        let name = username_key(&account.username);
        match self.tables.usernames.entry(name.clone()) {
            Entry::Occupied(_) => {
                return Err(StoreError::Duplicate(EntityKind::Account, account.username));
            }
            Entry::Vacant(slot) => {
                slot.insert(account.id);
            }
        }
        self.reserved_usernames.push((name, account.id));
        self.staged.accounts.insert(account.id, account);
        Ok(())
    }

    fn insert_streak(&mut self, state: StreakState) -> Result<(), StoreError> {
        self.ensure_new(RecordKey::Streak(state.account_id))?;
        self.staged.streaks.insert(state.account_id, state);
        Ok(())
    }

    fn insert_post(&mut self, post: Post) -> Result<(), StoreError> {
        self.ensure_new(RecordKey::Post(post.id))?;
        self.staged.posts.insert(post.id, Some(post));
        Ok(())
    }

    fn insert_comment(&mut self, comment: Comment) -> Result<(), StoreError> {
        self.ensure_new(RecordKey::Comment(comment.id))?;
        self.staged.comments.insert(comment.id, Some(comment));
        Ok(())
    }

    fn remove_post(&mut self, id: PostId) -> Result<(), StoreError> {
        self.ensure_locked(RecordKey::Post(id))?;
        self.staged.posts.insert(id, None);
        Ok(())
    }

    fn remove_comment(&mut self, id: CommentId) -> Result<(), StoreError> {
        self.ensure_locked(RecordKey::Comment(id))?;
        self.staged.comments.insert(id, None);
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        self.ensure_open()?;
        let writes = self.staged.len();
        let removed = self.publish();
        // Reservations are now backed by committed accounts.
        self.reserved_usernames.clear();
        self.closed = true;
        self.held.clear();
        for key in removed {
            self.tables.prune_lock(key);
        }
        debug!(writes, "unit of work committed");
        Ok(())
    }
}

impl Drop for MemoryUnitOfWork {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        for (name, id) in self.reserved_usernames.drain(..) {
            self.tables.usernames.remove_if(&name, |_, owner| *owner == id);
        }
        let discarded = self.staged.len();
        if discarded > 0 {
            debug!(discarded, "unit of work dropped without commit");
        }
    }
}
