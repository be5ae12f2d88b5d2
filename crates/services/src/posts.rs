use std::sync::Arc;

use tracing::{debug, instrument};

use domains::clock::Clock;
use domains::dto::{NewPost, PostUpdate, PostView, TextLimits};
use domains::error::{DomainError, EntityKind, Result};
use domains::ids::{AccountId, PostId};
use domains::likes::Likes;
use domains::models::Post;
use domains::ports::{SocialStore, UnitOfWork};

use crate::engagement::EngagementLedger;
use crate::support::{can_see, StoreResultExt};

/// Post authoring. Counters are never written here; likes go through the
/// ledger and comment counts through the comment thread.
#[derive(Clone)]
pub struct PostService {
    store: Arc<dyn SocialStore>,
    clock: Arc<dyn Clock>,
    limits: TextLimits,
    ledger: EngagementLedger,
}

impl PostService {
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

    #[instrument(skip(self, input))]
    pub async fn create_post(&self, actor: AccountId, input: NewPost) -> Result<PostView> {
        input.validate(&self.limits)?;
        self.store
            .account(actor)
            .await
            .or_internal("load author", actor)?
            .ok_or_else(|| DomainError::not_found(EntityKind::Account, actor))?;

        let now = self.clock.now();
        let post = Post {
            id: PostId::new(),
            author: actor,
            caption: input.caption.trim().to_string(),
            image_urls: input.image_urls,
            workout_ref: input.workout_ref,
            tags: input.tags,
            visibility: input.visibility.unwrap_or_default(),
            location: input.location,
            is_visible: true,
            likes: Likes::default(),
            comments_count: 0,
            created_at: now,
            updated_at: now,
        };

        let mut uow = self.store.begin().await.or_internal("create post", post.id)?;
        uow.insert_post(post.clone()).or_internal("insert post", post.id)?;
        uow.commit().await.or_internal("commit post", post.id)?;
        debug!(post = %post.id, author = %actor, visibility = ?post.visibility, "post created");
        Ok(PostView::new(&post, Some(actor)))
    }

    /// A post as seen by `viewer`. Hidden posts and posts the viewer may not
    /// see are reported as missing.
    pub async fn get_post(&self, id: PostId, viewer: Option<AccountId>) -> Result<PostView> {
        let post = self
            .store
            .post(id)
            .await
            .or_internal("load post", id)?
            .ok_or_else(|| DomainError::not_found(EntityKind::Post, id))?;
        if !can_see(self.store.as_ref(), &post, viewer).await? {
            return Err(DomainError::not_found(EntityKind::Post, id));
        }
        Ok(PostView::new(&post, viewer))
    }

    #[instrument(skip(self, update))]
    pub async fn update_post(
        &self,
        id: PostId,
        actor: AccountId,
        update: PostUpdate,
    ) -> Result<PostView> {
        update.validate(&self.limits)?;

        let mut uow = self.store.begin().await.or_internal("update post", id)?;
        let mut post = lock_owned(uow.as_mut(), id, actor).await?;
        if update.is_empty() {
            return Ok(PostView::new(&post, Some(actor)));
        }

        if let Some(caption) = update.caption {
            post.caption = caption.trim().to_string();
        }
        if let Some(image_urls) = update.image_urls {
            post.image_urls = image_urls;
        }
        if let Some(tags) = update.tags {
            post.tags = tags;
        }
        if let Some(visibility) = update.visibility {
            post.visibility = visibility;
        }
        if let Some(location) = update.location {
            post.location = location;
        }
        if let Some(is_visible) = update.is_visible {
            post.is_visible = is_visible;
        }
        post.updated_at = self.clock.now();

        uow.put_post(post.clone()).or_internal("stage post", id)?;
        uow.commit().await.or_internal("commit post update", id)?;
        debug!(post = %id, visible = post.is_visible, "post updated");
        Ok(PostView::new(&post, Some(actor)))
    }

    /// Hard-deletes a post. Its comments stay in storage.
    #[instrument(skip(self))]
    pub async fn delete_post(&self, id: PostId, actor: AccountId) -> Result<()> {
        let mut uow = self.store.begin().await.or_internal("delete post", id)?;
        let post = lock_owned(uow.as_mut(), id, actor).await?;
        uow.remove_post(post.id).or_internal("remove post", id)?;
        uow.commit().await.or_internal("commit post delete", id)?;
        debug!(post = %id, comments = post.comments_count, "post deleted");
        Ok(())
    }

    pub async fn like_post(&self, id: PostId, actor: AccountId) -> Result<PostView> {
        self.ledger.like_post(id, actor).await
    }

    pub async fn unlike_post(&self, id: PostId, actor: AccountId) -> Result<PostView> {
        self.ledger.unlike_post(id, actor).await
    }
}

/// Locks a post and checks that `actor` wrote it.
async fn lock_owned(uow: &mut dyn UnitOfWork, id: PostId, actor: AccountId) -> Result<Post> {
    let post = uow
        .lock_post(id)
        .await
        .or_internal("lock post", id)?
        .ok_or_else(|| DomainError::not_found(EntityKind::Post, id))?;
    if post.author != actor {
        return Err(DomainError::Authorization(
            "only the author can modify this post".into(),
        ));
    }
    Ok(post)
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::clock::SystemClock;
    use domains::dto::NewAccount;
    use domains::models::Visibility;
    use storage_adapters::MemoryStore;

    use crate::accounts::AccountService;

    async fn setup() -> (PostService, AccountService) {
        let store: Arc<dyn SocialStore> = Arc::new(MemoryStore::new());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let ledger = EngagementLedger::new(store.clone());
        (
            PostService::new(store.clone(), clock.clone(), TextLimits::default(), ledger),
            AccountService::new(store, clock),
        )
    }

    async fn account(accounts: &AccountService, username: &str) -> AccountId {
        accounts
            .create_account(NewAccount {
                id: None,
                username: username.into(),
                full_name: username.into(),
                profile_picture: None,
                bio: None,
            })
            .await
            .unwrap()
            .id
    }

    fn new_post(visibility: Visibility) -> NewPost {
        NewPost {
            caption: "morning row".into(),
            visibility: Some(visibility),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn private_post_is_hidden_from_others() {
        let (posts, accounts) = setup().await;
        let author = account(&accounts, "author").await;
        let other = account(&accounts, "other").await;
        let post = posts.create_post(author, new_post(Visibility::Private)).await.unwrap();

        assert!(posts.get_post(post.id, Some(author)).await.is_ok());
        let err = posts.get_post(post.id, Some(other)).await.unwrap_err();
        assert_eq!(err, DomainError::not_found(EntityKind::Post, post.id));
        assert!(posts.get_post(post.id, None).await.is_err());
    }

    #[tokio::test]
    async fn soft_delete_hides_and_refuses_likes() {
        let (posts, accounts) = setup().await;
        let author = account(&accounts, "author").await;
        let fan = account(&accounts, "fan").await;
        let post = posts.create_post(author, new_post(Visibility::Public)).await.unwrap();

        let update = PostUpdate {
            is_visible: Some(false),
            ..Default::default()
        };
        posts.update_post(post.id, author, update).await.unwrap();
        assert!(posts.get_post(post.id, Some(author)).await.is_err());
        let err = posts.like_post(post.id, fan).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));
    }

    #[tokio::test]
    async fn non_author_cannot_update_or_delete() {
        let (posts, accounts) = setup().await;
        let author = account(&accounts, "author").await;
        let other = account(&accounts, "other").await;
        let post = posts.create_post(author, new_post(Visibility::Public)).await.unwrap();

        let update = PostUpdate {
            caption: Some("hijacked".into()),
            ..Default::default()
        };
        assert!(matches!(
            posts.update_post(post.id, other, update).await,
            Err(DomainError::Authorization(_))
        ));
        assert!(matches!(
            posts.delete_post(post.id, other).await,
            Err(DomainError::Authorization(_))
        ));
        posts.delete_post(post.id, author).await.unwrap();
        assert!(posts.get_post(post.id, Some(author)).await.is_err());
    }

    #[tokio::test]
    async fn unknown_author_cannot_post() {
        let (posts, _) = setup().await;
        let ghost = AccountId::new();
        let err = posts
            .create_post(ghost, new_post(Visibility::Public))
            .await
            .unwrap_err();
        assert_eq!(err, DomainError::not_found(EntityKind::Account, ghost));
    }
}
