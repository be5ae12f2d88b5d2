//! # Follow graph
//!
//! Keeps `following` and `followers` of two accounts in lockstep. Both
//! accounts are locked (lower id first) and written in one unit of work, so
//! a half-applied follow is never observable.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, instrument, warn};

use domains::dto::AccountSummary;
use domains::error::{ConflictReason, DomainError, EntityKind, Result};
use domains::ids::AccountId;
use domains::models::Account;
use domains::ports::{SocialStore, UnitOfWork};

use crate::support::StoreResultExt;

/// Set sizes on both ends of an edge right after it changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FollowCounts {
    pub actor: AccountId,
    pub target: AccountId,
    pub following: bool,
    pub actor_following_count: u64,
    pub target_followers_count: u64,
}

#[derive(Clone)]
pub struct FollowService {
    store: Arc<dyn SocialStore>,
}

impl FollowService {
    pub fn new(store: Arc<dyn SocialStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self))]
    pub async fn follow(&self, actor: AccountId, target: AccountId) -> Result<FollowCounts> {
        if actor == target {
            return Err(DomainError::Conflict(ConflictReason::SelfFollow));
        }
        let mut uow = self.store.begin().await.or_internal("follow", actor)?;
        let (mut me, mut them) = lock_pair(uow.as_mut(), actor, target).await?;

        if me.following.contains(&target) {
            return Err(DomainError::Conflict(ConflictReason::AlreadyFollowing));
        }
        me.following.insert(target);
        if !them.followers.insert(actor) {
            warn!(%actor, %target, "follower entry existed without following entry");
        }

        let counts = counts(&me, &them, true);
        uow.put_account(me).or_internal("follow", actor)?;
        uow.put_account(them).or_internal("follow", target)?;
        uow.commit().await.or_internal("follow", actor)?;
        debug!(%actor, %target, followers = counts.target_followers_count, "follow committed");
        Ok(counts)
    }

    #[instrument(skip(self))]
    pub async fn unfollow(&self, actor: AccountId, target: AccountId) -> Result<FollowCounts> {
        if actor == target {
            return Err(DomainError::Conflict(ConflictReason::SelfFollow));
        }
        let mut uow = self.store.begin().await.or_internal("unfollow", actor)?;
        let (mut me, mut them) = lock_pair(uow.as_mut(), actor, target).await?;

        if !me.following.remove(&target) {
            return Err(DomainError::Conflict(ConflictReason::NotFollowing));
        }
        if !them.followers.remove(&actor) {
            warn!(%actor, %target, "following entry existed without follower entry");
        }

        let counts = counts(&me, &them, false);
        uow.put_account(me).or_internal("unfollow", actor)?;
        uow.put_account(them).or_internal("unfollow", target)?;
        uow.commit().await.or_internal("unfollow", actor)?;
        debug!(%actor, %target, followers = counts.target_followers_count, "unfollow committed");
        Ok(counts)
    }

    pub async fn is_following(&self, actor: AccountId, target: AccountId) -> Result<bool> {
        let account = self.require(actor).await?;
        Ok(account.follows(target))
    }

    /// Accounts following `id`, sorted by display name.
    pub async fn list_followers(&self, id: AccountId) -> Result<Vec<AccountSummary>> {
        let account = self.require(id).await?;
        self.summaries(id, &account.followers.iter().copied().collect::<Vec<_>>())
            .await
    }

    /// Accounts `id` follows, sorted by display name.
    pub async fn list_following(&self, id: AccountId) -> Result<Vec<AccountSummary>> {
        let account = self.require(id).await?;
        self.summaries(id, &account.following.iter().copied().collect::<Vec<_>>())
            .await
    }

    async fn require(&self, id: AccountId) -> Result<Account> {
        self.store
            .account(id)
            .await
            .or_internal("load account", id)?
            .ok_or_else(|| DomainError::not_found(EntityKind::Account, id))
    }

    async fn summaries(&self, owner: AccountId, ids: &[AccountId]) -> Result<Vec<AccountSummary>> {
        let accounts = self
            .store
            .accounts(ids)
            .await
            .or_internal("list follow set", owner)?;
        if accounts.len() != ids.len() {
            warn!(
                %owner,
                listed = ids.len(),
                found = accounts.len(),
                "follow set references missing accounts"
            );
        }
        let mut summaries: Vec<AccountSummary> = accounts.iter().map(AccountSummary::from).collect();
        summaries.sort_by(|a, b| {
            a.full_name
                .to_lowercase()
                .cmp(&b.full_name.to_lowercase())
                .then_with(|| a.username.cmp(&b.username))
        });
        Ok(summaries)
    }
}

/// Locks both accounts in id order and returns them as `(actor, target)`.
async fn lock_pair(
    uow: &mut dyn UnitOfWork,
    actor: AccountId,
    target: AccountId,
) -> Result<(Account, Account)> {
    let (first, second) = if actor < target {
        (actor, target)
    } else {
        (target, actor)
    };
    let mut locked = Vec::with_capacity(2);
    for id in [first, second] {
        let account = uow
            .lock_account(id)
            .await
            .or_internal("lock account", id)?
            .ok_or_else(|| DomainError::not_found(EntityKind::Account, id))?;
        locked.push(account);
    }
    let second_account = locked.pop();
    let first_account = locked.pop();
    match (first_account, second_account) {
        (Some(a), Some(b)) if first == actor => Ok((a, b)),
        (Some(a), Some(b)) => Ok((b, a)),
        _ => Err(DomainError::Internal("account pair lock incomplete".into())),
    }
}

fn counts(actor: &Account, target: &Account, following: bool) -> FollowCounts {
    FollowCounts {
        actor: actor.id,
        target: target.id,
        following,
        actor_following_count: actor.following.len() as u64,
        target_followers_count: target.followers.len() as u64,
    }
}
