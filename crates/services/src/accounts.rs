use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use domains::clock::Clock;
use domains::dto::{AccountMatch, AccountSummary, NewAccount, ProfileUpdate, PublicProfile};
use domains::error::{ConflictReason, DomainError, EntityKind, Result, StoreError};
use domains::ids::AccountId;
use domains::models::{Account, StreakState};
use domains::ports::SocialStore;

use crate::support::{store_failure, StoreResultExt};

/// Most hits an account search returns.
pub const SEARCH_LIMIT: usize = 20;

/// Account lifecycle and public profiles.
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn SocialStore>,
    clock: Arc<dyn Clock>,
}

impl AccountService {
    pub fn new(store: Arc<dyn SocialStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Creates the account together with its zeroed streak state.
    #[instrument(skip(self, input), fields(username = %input.username))]
    pub async fn create_account(&self, input: NewAccount) -> Result<Account> {
        input.validate()?;

        let now = self.clock.now();
        let account = Account {
            id: input.id.unwrap_or_default(),
            username: input.username.trim().to_string(),
            full_name: input.full_name.trim().to_string(),
            profile_picture: input.profile_picture,
            bio: input.bio.unwrap_or_default(),
            followers: Default::default(),
            following: Default::default(),
            created_at: now,
        };
        let id = account.id;

        let mut uow = self.store.begin().await.or_internal("create account", id)?;
        if uow
            .lock_account(id)
            .await
            .or_internal("lock account", id)?
            .is_some()
        {
            return Err(DomainError::Validation(format!("account {id} already exists")));
        }
        uow.insert_account(account.clone()).map_err(|err| match err {
            StoreError::Duplicate(EntityKind::Account, ref name) if *name == account.username => {
                DomainError::Conflict(ConflictReason::UsernameTaken)
            }
            other => store_failure("insert account", id, other),
        })?;
        uow.insert_streak(StreakState::new(id, now))
            .or_internal("insert streak", id)?;
        uow.commit().await.or_internal("commit account", id)?;

        debug!(%id, username = %account.username, "account created");
        Ok(account)
    }

    pub async fn get_account(&self, id: AccountId) -> Result<Account> {
        self.store
            .account(id)
            .await
            .or_internal("load account", id)?
            .ok_or_else(|| DomainError::not_found(EntityKind::Account, id))
    }

    /// Case-insensitive lookup.
    pub async fn find_by_username(&self, username: &str) -> Result<Account> {
        self.store
            .account_by_username(username)
            .await
            .or_internal("load account by username", username)?
            .ok_or_else(|| DomainError::not_found(EntityKind::Account, username))
    }

    /// Changes the owner's full name, picture or bio.
    #[instrument(skip(self, update))]
    pub async fn update_profile(&self, actor: AccountId, update: ProfileUpdate) -> Result<Account> {
        update.validate()?;

        let mut uow = self.store.begin().await.or_internal("update profile", actor)?;
        let mut account = uow
            .lock_account(actor)
            .await
            .or_internal("lock account", actor)?
            .ok_or_else(|| DomainError::not_found(EntityKind::Account, actor))?;
        if update.is_empty() {
            return Ok(account);
        }

        if let Some(full_name) = update.full_name {
            account.full_name = full_name.trim().to_string();
        }
        if let Some(picture) = update.profile_picture {
            account.profile_picture = Some(picture);
        }
        if let Some(bio) = update.bio {
            account.bio = bio;
        }

        uow.put_account(account.clone()).or_internal("stage account", actor)?;
        uow.commit().await.or_internal("commit profile update", actor)?;
        debug!(%actor, "profile updated");
        Ok(account)
    }

    /// Accounts whose username or full name contains `query`, ignoring case.
    /// At most [`SEARCH_LIMIT`] hits, ordered by username.
    #[instrument(skip(self))]
    pub async fn search_accounts(
        &self,
        query: &str,
        viewer: Option<AccountId>,
    ) -> Result<Vec<AccountMatch>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(DomainError::Validation("search query is required".into()));
        }

        let following = match viewer {
            Some(v) => self
                .store
                .account(v)
                .await
                .or_internal("load viewer", v)?
                .map(|account| account.following)
                .unwrap_or_default(),
            None => BTreeSet::new(),
        };
        let found = self
            .store
            .search_accounts(query, SEARCH_LIMIT)
            .await
            .or_internal("search accounts", query)?;

        Ok(found
            .iter()
            .map(|account| AccountMatch {
                account: AccountSummary::from(account),
                bio: account.bio.clone(),
                is_following: following.contains(&account.id),
            })
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn public_profile(
        &self,
        target: AccountId,
        viewer: Option<AccountId>,
    ) -> Result<PublicProfile> {
        let account = self.get_account(target).await?;
        let streak = match self.store.streak(target).await.or_internal("load streak", target)? {
            Some(state) => state,
            None => {
                warn!(%target, "account has no streak state; reporting zeros");
                StreakState::new(target, account.created_at)
            }
        };
        let is_following = viewer.is_some_and(|v| v != target && account.followers.contains(&v));

        Ok(PublicProfile {
            account: AccountSummary::from(&account),
            bio: account.bio.clone(),
            followers_count: account.followers.len() as u64,
            following_count: account.following.len() as u64,
            total_workouts: streak.total_workouts,
            current_streak: streak.current_streak,
            is_following,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::clock::SystemClock;
    use domains::ports::{MockSocialStore, UnitOfWork};
    use storage_adapters::MemoryStore;

    fn new_account(username: &str) -> NewAccount {
        NewAccount {
            id: None,
            username: username.into(),
            full_name: "Sam Lifter".into(),
            profile_picture: None,
            bio: None,
        }
    }

    fn service() -> (AccountService, MemoryStore) {
        let store = MemoryStore::new();
        (
            AccountService::new(Arc::new(store.clone()), Arc::new(SystemClock)),
            store,
        )
    }

    #[tokio::test]
    async fn creation_seeds_a_zeroed_streak() {
        let (service, store) = service();
        let account = service.create_account(new_account("samlifts")).await.unwrap();
        let streak = store.streak(account.id).await.unwrap().unwrap();
        assert_eq!(streak, StreakState::new(account.id, account.created_at));
    }

    #[tokio::test]
    async fn username_is_unique_ignoring_case() {
        let (service, store) = service();
        service.create_account(new_account("samlifts")).await.unwrap();
        let err = service.create_account(new_account("SamLifts")).await.unwrap_err();
        assert_eq!(err, DomainError::Conflict(ConflictReason::UsernameTaken));
        assert_eq!(store.account_ids().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn supplied_id_cannot_be_reused() {
        let (service, _) = service();
        let first = service.create_account(new_account("first")).await.unwrap();
        let mut again = new_account("second");
        again.id = Some(first.id);
        let err = service.create_account(again).await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert!(service.find_by_username("second").await.is_err());
    }

    #[tokio::test]
    async fn profile_update_changes_only_supplied_fields() {
        let (service, store) = service();
        let me = service.create_account(new_account("tempo_tom")).await.unwrap();

        let updated = service
            .update_profile(
                me.id,
                ProfileUpdate {
                    full_name: Some("  Tom Tempo ".into()),
                    bio: Some("sub-20 5k".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.full_name, "Tom Tempo");
        assert_eq!(updated.bio, "sub-20 5k");
        assert_eq!(updated.username, "tempo_tom");
        assert_eq!(updated.profile_picture, None);
        assert_eq!(store.account(me.id).await.unwrap(), Some(updated));
    }

    #[tokio::test]
    async fn profile_update_of_unknown_account_is_not_found() {
        let (service, _) = service();
        let ghost = AccountId::new();
        let err = service
            .update_profile(ghost, ProfileUpdate::default())
            .await
            .unwrap_err();
        assert_eq!(err, DomainError::not_found(EntityKind::Account, ghost));
    }

    #[tokio::test]
    async fn invalid_profile_update_writes_nothing() {
        let mut store = MockSocialStore::new();
        store.expect_begin().never();
        let service = AccountService::new(Arc::new(store), Arc::new(SystemClock));
        let err = service
            .update_profile(
                AccountId::new(),
                ProfileUpdate {
                    full_name: Some(String::new()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn search_is_capped_and_marks_followed_accounts() {
        let (service, store) = service();
        let viewer = service.create_account(new_account("viewer")).await.unwrap();
        let mut runners = Vec::new();
        for i in 0..25 {
            runners.push(service.create_account(new_account(&format!("runner{i:02}"))).await.unwrap());
        }

        let mut uow = store.begin().await.unwrap();
        let mut me = uow.lock_account(viewer.id).await.unwrap().unwrap();
        me.following.insert(runners[0].id);
        uow.put_account(me).unwrap();
        uow.commit().await.unwrap();

        let hits = service.search_accounts("RUNNER", Some(viewer.id)).await.unwrap();
        assert_eq!(hits.len(), SEARCH_LIMIT);
        assert_eq!(hits[0].account.username, "runner00");
        assert!(hits[0].is_following);
        assert!(hits[1..].iter().all(|hit| !hit.is_following));

        let by_name = service.search_accounts("sam lift", None).await.unwrap();
        assert_eq!(by_name.len(), SEARCH_LIMIT);
        assert!(service.search_accounts("   ", None).await.is_err());
    }

    #[tokio::test]
    async fn own_profile_is_never_following() {
        let (service, _) = service();
        let me = service.create_account(new_account("selfie")).await.unwrap();
        let profile = service.public_profile(me.id, Some(me.id)).await.unwrap();
        assert!(!profile.is_following);
        assert_eq!(profile.followers_count, 0);
        assert_eq!(profile.current_streak, 0);
    }
}
