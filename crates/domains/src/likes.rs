//! Like membership sets and the counter that mirrors them.

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ConflictReason, EntityKind, StoreError};
use crate::feed::FeedFilter;
use crate::ids::{AccountId, CommentId, PostId};
use crate::models::{saturating_decrement, Account, Comment, Post};
use crate::ports::UnitOfWork;

/// The `likedBy` set of an entity together with its denormalized `likesCount`.
///
/// Fields are private: `add` and `remove` change both halves together, so
/// `count() == members().len()` holds unless a record was rehydrated with
/// drift already in it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Likes {
    liked_by: BTreeSet<AccountId>,
    count: u64,
}

impl Likes {
    /// Rebuilds a pair exactly as persisted, drift included.
    pub fn from_parts(liked_by: BTreeSet<AccountId>, count: u64) -> Self {
        Self { liked_by, count }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn members(&self) -> &BTreeSet<AccountId> {
        &self.liked_by
    }

    pub fn contains(&self, actor: AccountId) -> bool {
        self.liked_by.contains(&actor)
    }

    pub fn add(&mut self, actor: AccountId) -> Result<u64, ConflictReason> {
        if !self.liked_by.insert(actor) {
            return Err(ConflictReason::AlreadyLiked);
        }
        self.count += 1;
        Ok(self.count)
    }

    /// Removes `actor`. The returned flag is `false` when the counter was
    /// already zero and had to be clamped.
    pub fn remove(&mut self, actor: AccountId) -> Result<(u64, bool), ConflictReason> {
        if !self.liked_by.remove(&actor) {
            return Err(ConflictReason::NotLiked);
        }
        let in_sync = saturating_decrement(&mut self.count);
        Ok((self.count, in_sync))
    }

    /// `(recorded, actual)` when the counter disagrees with the set.
    pub fn drift(&self) -> Option<(u64, u64)> {
        let actual = self.liked_by.len() as u64;
        (self.count != actual).then_some((self.count, actual))
    }

    /// Resets the counter to the set size. Returns true if it changed.
    pub fn reconcile(&mut self) -> bool {
        let actual = self.liked_by.len() as u64;
        let changed = self.count != actual;
        self.count = actual;
        changed
    }
}

/// An entity that carries a [`Likes`] pair and can be locked in a unit of
/// work.
#[async_trait]
pub trait Likeable: Clone + Send + Sync + 'static {
    type Id: Copy + fmt::Display + Send + Sync + 'static;

    const KIND: EntityKind;

    fn id(&self) -> Self::Id;

    fn likes(&self) -> &Likes;

    fn likes_mut(&mut self) -> &mut Likes;

    /// Whether new likes may be applied right now.
    fn accepts_engagement(&self) -> bool {
        true
    }

    /// Whether `viewer` may see the record. `None` asks about an anonymous
    /// caller, or one whose account is unknown.
    fn visible_to(&self, _viewer: Option<&Account>) -> bool {
        true
    }

    async fn lock(uow: &mut dyn UnitOfWork, id: Self::Id) -> Result<Option<Self>, StoreError>;

    fn stage(self, uow: &mut dyn UnitOfWork) -> Result<(), StoreError>;
}

#[async_trait]
impl Likeable for Post {
    type Id = PostId;

    const KIND: EntityKind = EntityKind::Post;

    fn id(&self) -> PostId {
        self.id
    }

    fn likes(&self) -> &Likes {
        &self.likes
    }

    fn likes_mut(&mut self) -> &mut Likes {
        &mut self.likes
    }

    fn accepts_engagement(&self) -> bool {
        self.is_visible
    }

    fn visible_to(&self, viewer: Option<&Account>) -> bool {
        FeedFilter::profile(self.author, viewer).admits(self)
    }

    async fn lock(uow: &mut dyn UnitOfWork, id: PostId) -> Result<Option<Self>, StoreError> {
        uow.lock_post(id).await
    }

    fn stage(self, uow: &mut dyn UnitOfWork) -> Result<(), StoreError> {
        uow.put_post(self)
    }
}

#[async_trait]
impl Likeable for Comment {
    type Id = CommentId;

    const KIND: EntityKind = EntityKind::Comment;

    fn id(&self) -> CommentId {
        self.id
    }

    fn likes(&self) -> &Likes {
        &self.likes
    }

    fn likes_mut(&mut self) -> &mut Likes {
        &mut self.likes
    }

    async fn lock(uow: &mut dyn UnitOfWork, id: CommentId) -> Result<Option<Self>, StoreError> {
        uow.lock_comment(id).await
    }

    fn stage(self, uow: &mut dyn UnitOfWork) -> Result<(), StoreError> {
        uow.put_comment(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_remove_keeps_pair_in_sync() {
        let mut likes = Likes::default();
        let a = AccountId::new();
        assert_eq!(likes.add(a), Ok(1));
        assert_eq!(likes.add(a), Err(ConflictReason::AlreadyLiked));
        assert_eq!(likes.count(), 1);
        assert_eq!(likes.remove(a), Ok((0, true)));
        assert_eq!(likes.remove(a), Err(ConflictReason::NotLiked));
        assert!(likes.drift().is_none());
    }

    #[test]
    fn remove_clamps_drifted_counter() {
        let a = AccountId::new();
        let mut likes = Likes::from_parts(BTreeSet::from([a]), 0);
        assert_eq!(likes.drift(), Some((0, 1)));
        assert_eq!(likes.remove(a), Ok((0, false)));
        assert!(likes.drift().is_none());
    }

    #[test]
    fn reconcile_resets_to_set_size() {
        let mut likes = Likes::from_parts(BTreeSet::from([AccountId::new(), AccountId::new()]), 7);
        assert!(likes.reconcile());
        assert_eq!(likes.count(), 2);
        assert!(!likes.reconcile());
    }
}
