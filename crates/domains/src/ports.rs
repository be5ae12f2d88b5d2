//! # Ports
//!
//! Contracts a persistence adapter must satisfy. Mutations go through a
//! [`UnitOfWork`], which is the atomicity boundary for every operation of
//! the engine.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::feed::{FeedFilter, Page};
use crate::ids::{AccountId, CommentId, PostId};
use crate::models::{Account, Comment, Post, StreakState};

/// One all-or-nothing group of writes.
///
/// `lock_*` grants exclusive access to a record until the unit is committed
/// or dropped, and returns its current value. Locking a record twice returns
/// what has been staged for it so far. `put_*` requires the record to be
/// locked first. Nothing is visible to other callers before `commit`, and a
/// unit that is dropped uncommitted leaves no trace.
///
/// Callers must acquire locks in this order to stay deadlock free:
/// accounts by id ascending, then a post, then its comments by id ascending.
/// Streak states are only ever locked alone.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait UnitOfWork: Send {
    async fn lock_account(&mut self, id: AccountId) -> Result<Option<Account>, StoreError>;
    async fn lock_post(&mut self, id: PostId) -> Result<Option<Post>, StoreError>;
    async fn lock_comment(&mut self, id: CommentId) -> Result<Option<Comment>, StoreError>;
    async fn lock_streak(&mut self, account: AccountId) -> Result<Option<StreakState>, StoreError>;

    fn put_account(&mut self, account: Account) -> Result<(), StoreError>;
    fn put_post(&mut self, post: Post) -> Result<(), StoreError>;
    fn put_comment(&mut self, comment: Comment) -> Result<(), StoreError>;
    fn put_streak(&mut self, state: StreakState) -> Result<(), StoreError>;

    /// Stages a new account. Fails with `Duplicate` if the id or the
    /// username is taken.
    fn insert_account(&mut self, account: Account) -> Result<(), StoreError>;
    fn insert_streak(&mut self, state: StreakState) -> Result<(), StoreError>;
    fn insert_post(&mut self, post: Post) -> Result<(), StoreError>;
    fn insert_comment(&mut self, comment: Comment) -> Result<(), StoreError>;

    fn remove_post(&mut self, id: PostId) -> Result<(), StoreError>;
    fn remove_comment(&mut self, id: CommentId) -> Result<(), StoreError>;

    /// Applies every staged write, then releases the locks.
    async fn commit(&mut self) -> Result<(), StoreError>;
}

/// Data persistence contract for the social graph, posts, comments and
/// streak state.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SocialStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;

    async fn account(&self, id: AccountId) -> Result<Option<Account>, StoreError>;
    async fn account_by_username(&self, username: &str) -> Result<Option<Account>, StoreError>;
    /// Accounts for the given ids; unknown ids are skipped.
    async fn accounts(&self, ids: &[AccountId]) -> Result<Vec<Account>, StoreError>;
    /// Up to `limit` accounts whose username or full name contains `query`,
    /// ignoring case, ordered by username.
    async fn search_accounts(&self, query: &str, limit: usize)
        -> Result<Vec<Account>, StoreError>;
    async fn post(&self, id: PostId) -> Result<Option<Post>, StoreError>;
    async fn comment(&self, id: CommentId) -> Result<Option<Comment>, StoreError>;
    async fn streak(&self, account: AccountId) -> Result<Option<StreakState>, StoreError>;

    /// Posts admitted by `filter`, ordered by [`crate::feed::feed_order`]
    /// and cut to `page`.
    async fn scan_posts(&self, filter: &FeedFilter, page: Page) -> Result<Vec<Post>, StoreError>;

    /// Comments on `post` without a parent, unordered.
    async fn top_level_comments(&self, post: PostId) -> Result<Vec<Comment>, StoreError>;
    /// Direct children of `comment`, unordered.
    async fn replies(&self, comment: CommentId) -> Result<Vec<Comment>, StoreError>;
    /// Every comment attached to `post`, at any depth.
    async fn comments_of_post(&self, post: PostId) -> Result<Vec<Comment>, StoreError>;

    async fn account_ids(&self) -> Result<Vec<AccountId>, StoreError>;
    async fn post_ids(&self) -> Result<Vec<PostId>, StoreError>;
    async fn comment_ids(&self) -> Result<Vec<CommentId>, StoreError>;
}
