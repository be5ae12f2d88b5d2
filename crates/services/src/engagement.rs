//! # Engagement ledger
//!
//! Like and unlike for anything [`Likeable`]. The membership test, the set
//! change and the counter change happen on one locked record inside one unit
//! of work, so concurrent toggles on the same entity are serialized and never
//! lost or double counted.
//!
//! A post the actor may not see is reported as missing, exactly as a read
//! of it would be.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use domains::dto::{CommentView, PostView};
use domains::error::{DomainError, Result};
use domains::ids::{AccountId, CommentId, PostId};
use domains::likes::Likeable;
use domains::models::{Comment, Post};
use domains::ports::SocialStore;

use crate::support::{can_see, StoreResultExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Toggle {
    Like,
    Unlike,
}

#[derive(Clone)]
pub struct EngagementLedger {
    store: Arc<dyn SocialStore>,
}

impl EngagementLedger {
    pub fn new(store: Arc<dyn SocialStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self))]
    pub async fn like_post(&self, post: PostId, actor: AccountId) -> Result<PostView> {
        let post: Post = self.toggle(post, actor, Toggle::Like).await?;
        Ok(PostView::new(&post, Some(actor)))
    }

    #[instrument(skip(self))]
    pub async fn unlike_post(&self, post: PostId, actor: AccountId) -> Result<PostView> {
        let post: Post = self.toggle(post, actor, Toggle::Unlike).await?;
        Ok(PostView::new(&post, Some(actor)))
    }

    #[instrument(skip(self))]
    pub async fn like_comment(&self, comment: CommentId, actor: AccountId) -> Result<CommentView> {
        let comment: Comment = self.toggle(comment, actor, Toggle::Like).await?;
        Ok(CommentView::new(&comment, Some(actor)))
    }

    #[instrument(skip(self))]
    pub async fn unlike_comment(
        &self,
        comment: CommentId,
        actor: AccountId,
    ) -> Result<CommentView> {
        let comment: Comment = self.toggle(comment, actor, Toggle::Unlike).await?;
        Ok(CommentView::new(&comment, Some(actor)))
    }

    /// Applies one toggle to entity `id` and returns the committed record.
    async fn toggle<E: Likeable>(&self, id: E::Id, actor: AccountId, op: Toggle) -> Result<E> {
        let mut uow = self.store.begin().await.or_internal("toggle like", id)?;
        let mut entity = E::lock(uow.as_mut(), id)
            .await
            .or_internal("lock likeable", id)?
            .filter(|e| e.accepts_engagement())
            .ok_or_else(|| DomainError::not_found(E::KIND, id))?;
        if !can_see(self.store.as_ref(), &entity, Some(actor)).await? {
            return Err(DomainError::not_found(E::KIND, id));
        }

        let count = match op {
            Toggle::Like => entity.likes_mut().add(actor).map_err(DomainError::Conflict)?,
            Toggle::Unlike => {
                let (count, in_sync) = entity
                    .likes_mut()
                    .remove(actor)
                    .map_err(DomainError::Conflict)?;
                if !in_sync {
                    warn!(entity = %E::KIND, %id, %actor, "likes counter was already zero; clamped");
                }
                count
            }
        };

        entity
            .clone()
            .stage(uow.as_mut())
            .or_internal("stage likeable", id)?;
        uow.commit().await.or_internal("commit like", id)?;
        debug!(entity = %E::KIND, %id, %actor, ?op, likes = count, "toggle committed");
        Ok(entity)
    }
}
