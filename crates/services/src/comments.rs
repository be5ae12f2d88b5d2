//! # Comment threads
//!
//! A comment lives on one post and optionally replies to another comment on
//! the same post. Creating or deleting one also moves the post's
//! `comments_count` and the parent's `replies_count`; all of those writes go
//! through one unit of work.
//!
//! Deleting a comment leaves its replies in place. They stay addressable by
//! id and are no longer counted by any parent.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, instrument, warn};

use domains::clock::Clock;
use domains::dto::{CommentView, NewComment, TextLimits};
use domains::error::{DomainError, EntityKind, Result};
use domains::ids::{AccountId, CommentId, PostId};
use domains::likes::Likes;
use domains::models::{saturating_decrement, Comment};
use domains::ports::SocialStore;

use crate::engagement::EngagementLedger;
use crate::support::{can_see, StoreResultExt};

/// Counters left behind by a deletion. `None` when the record they belong
/// to no longer exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommentDeletion {
    pub comment_id: CommentId,
    pub post_id: PostId,
    pub post_comments_count: Option<u64>,
    pub parent_replies_count: Option<u64>,
}

#[derive(Clone)]
pub struct CommentService {
    store: Arc<dyn SocialStore>,
    clock: Arc<dyn Clock>,
    limits: TextLimits,
    ledger: EngagementLedger,
}

impl CommentService {
    pub fn new(
        store: Arc<dyn SocialStore>,
        clock: Arc<dyn Clock>,
        limits: TextLimits,
        ledger: EngagementLedger,
    ) -> Self {
        Self {
            store,
            clock,
            limits,
            ledger,
        }
    }

    #[instrument(skip(self, input), fields(parent = ?input.parent_id))]
    pub async fn create_comment(
        &self,
        post_id: PostId,
        actor: AccountId,
        input: NewComment,
    ) -> Result<CommentView> {
        input.validate(&self.limits)?;

        let mut uow = self.store.begin().await.or_internal("create comment", post_id)?;
        let mut post = uow
            .lock_post(post_id)
            .await
            .or_internal("lock post", post_id)?
            .filter(|p| p.is_visible)
            .ok_or_else(|| DomainError::not_found(EntityKind::Post, post_id))?;
        if !can_see(self.store.as_ref(), &post, Some(actor)).await? {
            return Err(DomainError::not_found(EntityKind::Post, post_id));
        }

        let mut parent_replies = None;
        if let Some(parent_id) = input.parent_id {
            let mut parent = uow
                .lock_comment(parent_id)
                .await
                .or_internal("lock parent comment", parent_id)?
                .ok_or_else(|| DomainError::not_found(EntityKind::ParentComment, parent_id))?;
            if parent.post_id != post_id {
                return Err(DomainError::Validation(format!(
                    "parent comment {parent_id} belongs to post {}, not {post_id}",
                    parent.post_id
                )));
            }
            parent.replies_count += 1;
            parent_replies = Some(parent.replies_count);
            uow.put_comment(parent).or_internal("stage parent comment", parent_id)?;
        }

        post.comments_count += 1;
        let comments_count = post.comments_count;
        uow.put_post(post).or_internal("stage post", post_id)?;

        let now = self.clock.now();
        let comment = Comment {
            id: CommentId::new(),
            post_id,
            author: actor,
            text: input.text,
            parent_id: input.parent_id,
            likes: Likes::default(),
            replies_count: 0,
            is_edited: false,
            created_at: now,
            updated_at: now,
        };
        uow.insert_comment(comment.clone())
            .or_internal("insert comment", comment.id)?;
        uow.commit().await.or_internal("commit comment", comment.id)?;

        debug!(
            comment = %comment.id,
            %post_id,
            comments_count,
            ?parent_replies,
            "comment created"
        );
        Ok(CommentView::new(&comment, Some(actor)))
    }

    #[instrument(skip(self))]
    pub async fn delete_comment(
        &self,
        comment_id: CommentId,
        actor: AccountId,
    ) -> Result<CommentDeletion> {
        // The post id and parent id never change, so an unlocked read is
        // enough to decide what to lock.
        let snapshot = self.require(comment_id).await?;
        if snapshot.author != actor {
            return Err(DomainError::Authorization(
                "only the author can delete this comment".into(),
            ));
        }

        let mut uow = self.store.begin().await.or_internal("delete comment", comment_id)?;
        let post = uow
            .lock_post(snapshot.post_id)
            .await
            .or_internal("lock post", snapshot.post_id)?;

        let mut ids = vec![comment_id];
        ids.extend(snapshot.parent_id);
        ids.sort();
        let mut comment = None;
        let mut parent = None;
        for id in ids {
            let locked = uow
                .lock_comment(id)
                .await
                .or_internal("lock comment", id)?;
            if id == comment_id {
                comment = locked;
            } else {
                parent = locked;
            }
        }
        let comment =
            comment.ok_or_else(|| DomainError::not_found(EntityKind::Comment, comment_id))?;

        let post_comments_count = match post {
            Some(mut post) => {
                if !saturating_decrement(&mut post.comments_count) {
                    warn!(post = %post.id, comment = %comment_id, "comments_count was already zero; clamped");
                }
                let count = post.comments_count;
                uow.put_post(post).or_internal("stage post", snapshot.post_id)?;
                Some(count)
            }
            None => {
                warn!(post = %snapshot.post_id, comment = %comment_id, "deleting comment of a missing post");
                None
            }
        };

        let parent_replies_count = match parent {
            Some(mut parent) => {
                if !saturating_decrement(&mut parent.replies_count) {
                    warn!(parent = %parent.id, comment = %comment_id, "replies_count was already zero; clamped");
                }
                let count = parent.replies_count;
                let parent_id = parent.id;
                uow.put_comment(parent).or_internal("stage parent comment", parent_id)?;
                Some(count)
            }
            None => None,
        };

        uow.remove_comment(comment.id)
            .or_internal("remove comment", comment_id)?;
        uow.commit().await.or_internal("commit comment delete", comment_id)?;

        debug!(
            comment = %comment_id,
            post = %comment.post_id,
            ?post_comments_count,
            ?parent_replies_count,
            "comment deleted"
        );
        Ok(CommentDeletion {
            comment_id,
            post_id: comment.post_id,
            post_comments_count,
            parent_replies_count,
        })
    }

    /// Replaces the text of a comment. Only its author may edit it.
    #[instrument(skip(self, text))]
    pub async fn edit_comment(
        &self,
        comment_id: CommentId,
        actor: AccountId,
        text: String,
    ) -> Result<CommentView> {
        let input = NewComment {
            text,
            parent_id: None,
        };
        input.validate(&self.limits)?;

        let mut uow = self.store.begin().await.or_internal("edit comment", comment_id)?;
        let mut comment = uow
            .lock_comment(comment_id)
            .await
            .or_internal("lock comment", comment_id)?
            .ok_or_else(|| DomainError::not_found(EntityKind::Comment, comment_id))?;
        if comment.author != actor {
            return Err(DomainError::Authorization(
                "only the author can edit this comment".into(),
            ));
        }

        comment.text = input.text;
        comment.is_edited = true;
        comment.updated_at = self.clock.now();
        uow.put_comment(comment.clone())
            .or_internal("stage comment", comment_id)?;
        uow.commit().await.or_internal("commit comment edit", comment_id)?;
        Ok(CommentView::new(&comment, Some(actor)))
    }

    pub async fn get_comment(
        &self,
        comment_id: CommentId,
        viewer: Option<AccountId>,
    ) -> Result<CommentView> {
        let comment = self.require(comment_id).await?;
        Ok(CommentView::new(&comment, viewer))
    }

    /// Top-level comments of a post, newest first. A post the viewer may not
    /// see is reported as missing.
    pub async fn list_top_level(
        &self,
        post_id: PostId,
        viewer: Option<AccountId>,
    ) -> Result<Vec<CommentView>> {
        let post = self
            .store
            .post(post_id)
            .await
            .or_internal("load post", post_id)?
            .ok_or_else(|| DomainError::not_found(EntityKind::Post, post_id))?;
        if !can_see(self.store.as_ref(), &post, viewer).await? {
            return Err(DomainError::not_found(EntityKind::Post, post_id));
        }

        let mut comments = self
            .store
            .top_level_comments(post_id)
            .await
            .or_internal("list top-level comments", post_id)?;
        comments.sort_by(newest_first);
        Ok(views(&comments, viewer))
    }

    /// Direct replies to a comment, oldest first. Replies whose parent was
    /// deleted can still be listed through the parent's id.
    pub async fn list_replies(
        &self,
        comment_id: CommentId,
        viewer: Option<AccountId>,
    ) -> Result<Vec<CommentView>> {
        let mut replies = self
            .store
            .replies(comment_id)
            .await
            .or_internal("list replies", comment_id)?;
        replies.sort_by(oldest_first);
        Ok(views(&replies, viewer))
    }

    pub async fn like_comment(&self, comment_id: CommentId, actor: AccountId) -> Result<CommentView> {
        self.ledger.like_comment(comment_id, actor).await
    }

    pub async fn unlike_comment(
        &self,
        comment_id: CommentId,
        actor: AccountId,
    ) -> Result<CommentView> {
        self.ledger.unlike_comment(comment_id, actor).await
    }

    async fn require(&self, comment_id: CommentId) -> Result<Comment> {
        self.store
            .comment(comment_id)
            .await
            .or_internal("load comment", comment_id)?
            .ok_or_else(|| DomainError::not_found(EntityKind::Comment, comment_id))
    }
}

fn newest_first(a: &Comment, b: &Comment) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

fn oldest_first(a: &Comment, b: &Comment) -> Ordering {
    a.created_at
        .cmp(&b.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

fn views(comments: &[Comment], viewer: Option<AccountId>) -> Vec<CommentView> {
    comments
        .iter()
        .map(|c| CommentView::new(c, viewer))
        .collect()
}
