//! # Reconciliation
//!
//! Offline audit of denormalized counters against the sets and child
//! collections they summarize. Nothing calls this on the request path.
//!
//! `repair` rewrites drifted counters and recreates missing streak states.
//! One-sided follow edges are only reported: which half is correct cannot be
//! decided from the data.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};

use domains::clock::Clock;
use domains::error::{EntityKind, Result};
use domains::ids::{AccountId, CommentId, PostId};
use domains::models::{Account, StreakState};
use domains::ports::SocialStore;

use crate::support::StoreResultExt;

/// Which half of a follow edge is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingHalf {
    /// `follower.following` has the edge, `followee.followers` does not.
    Followers,
    /// `followee.followers` has the edge, `follower.following` does not.
    Following,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Drift {
    PostLikes {
        post: PostId,
        recorded: u64,
        actual: u64,
    },
    PostComments {
        post: PostId,
        recorded: u64,
        actual: u64,
    },
    CommentLikes {
        comment: CommentId,
        recorded: u64,
        actual: u64,
    },
    CommentReplies {
        comment: CommentId,
        recorded: u64,
        actual: u64,
    },
    OneSidedFollow {
        follower: AccountId,
        followee: AccountId,
        missing: MissingHalf,
    },
    MissingStreak {
        account: AccountId,
    },
}

impl Drift {
    pub fn is_repairable(&self) -> bool {
        !matches!(self, Drift::OneSidedFollow { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DriftReport {
    pub accounts_scanned: usize,
    pub posts_scanned: usize,
    pub comments_scanned: usize,
    pub drifts: Vec<Drift>,
}

impl DriftReport {
    pub fn is_clean(&self) -> bool {
        self.drifts.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    pub audit: DriftReport,
    pub posts_repaired: usize,
    pub comments_repaired: usize,
    pub streaks_created: usize,
    /// Drift left in place; follow edges are never rewritten.
    pub unresolved: Vec<Drift>,
}

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn SocialStore>,
    clock: Arc<dyn Clock>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn SocialStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Reads every record once and lists the counters and edges that
    /// disagree with their source of truth. Takes no locks, so drift caused
    /// by writes racing the scan can show up and vanish on the next run.
    #[instrument(skip(self))]
    pub async fn audit(&self) -> Result<DriftReport> {
        let mut report = DriftReport::default();

        let mut account_ids = self.store.account_ids().await.or_internal("list accounts", "*")?;
        account_ids.sort();
        let accounts: HashMap<AccountId, Account> = self
            .store
            .accounts(&account_ids)
            .await
            .or_internal("load accounts", "*")?
            .into_iter()
            .map(|a| (a.id, a))
            .collect();
        report.accounts_scanned = accounts.len();
        for id in &account_ids {
            let Some(account) = accounts.get(id) else {
                continue;
            };
            follow_drift(account, &accounts, &mut report.drifts);
            if self.store.streak(*id).await.or_internal("load streak", id)?.is_none() {
                report.drifts.push(Drift::MissingStreak { account: *id });
            }
        }

        let mut comment_ids = self.store.comment_ids().await.or_internal("list comments", "*")?;
        comment_ids.sort();
        let mut comments = Vec::with_capacity(comment_ids.len());
        for id in comment_ids {
            if let Some(comment) = self.store.comment(id).await.or_internal("load comment", id)? {
                comments.push(comment);
            }
        }
        let mut per_post: HashMap<PostId, u64> = HashMap::new();
        let mut per_parent: HashMap<CommentId, u64> = HashMap::new();
        for comment in &comments {
            *per_post.entry(comment.post_id).or_default() += 1;
            if let Some(parent) = comment.parent_id {
                *per_parent.entry(parent).or_default() += 1;
            }
        }

        let mut post_ids = self.store.post_ids().await.or_internal("list posts", "*")?;
        post_ids.sort();
        for id in post_ids {
            let Some(post) = self.store.post(id).await.or_internal("load post", id)? else {
                continue;
            };
            report.posts_scanned += 1;
            if let Some((recorded, actual)) = post.likes.drift() {
                report.drifts.push(Drift::PostLikes {
                    post: id,
                    recorded,
                    actual,
                });
            }
            let actual = per_post.get(&id).copied().unwrap_or(0);
            if post.comments_count != actual {
                report.drifts.push(Drift::PostComments {
                    post: id,
                    recorded: post.comments_count,
                    actual,
                });
            }
        }

        report.comments_scanned = comments.len();
        for comment in &comments {
            if let Some((recorded, actual)) = comment.likes.drift() {
                report.drifts.push(Drift::CommentLikes {
                    comment: comment.id,
                    recorded,
                    actual,
                });
            }
            let actual = per_parent.get(&comment.id).copied().unwrap_or(0);
            if comment.replies_count != actual {
                report.drifts.push(Drift::CommentReplies {
                    comment: comment.id,
                    recorded: comment.replies_count,
                    actual,
                });
            }
        }

        for drift in &report.drifts {
            warn!(?drift, "drift detected");
        }
        info!(
            accounts = report.accounts_scanned,
            posts = report.posts_scanned,
            comments = report.comments_scanned,
            drifts = report.drifts.len(),
            "audit finished"
        );
        Ok(report)
    }

    /// Audits, then rewrites every repairable drift under a unit of work.
    /// Counters are recomputed after the record is locked, so a write that
    /// landed after the audit is taken into account.
    #[instrument(skip(self))]
    pub async fn repair(&self) -> Result<RepairReport> {
        let audit = self.audit().await?;
        let mut posts = BTreeSet::new();
        let mut comments = BTreeSet::new();
        let mut streaks = BTreeSet::new();
        let mut unresolved = Vec::new();
        for drift in &audit.drifts {
            match drift {
                Drift::PostLikes { post, .. } | Drift::PostComments { post, .. } => {
                    posts.insert(*post);
                }
                Drift::CommentLikes { comment, .. } | Drift::CommentReplies { comment, .. } => {
                    comments.insert(*comment);
                }
                Drift::MissingStreak { account } => {
                    streaks.insert(*account);
                }
                Drift::OneSidedFollow { .. } => unresolved.push(drift.clone()),
            }
        }

        let mut report = RepairReport {
            unresolved,
            ..Default::default()
        };
        for id in posts {
            if self.repair_post(id).await? {
                report.posts_repaired += 1;
            }
        }
        for id in comments {
            if self.repair_comment(id).await? {
                report.comments_repaired += 1;
            }
        }
        for id in streaks {
            if self.restore_streak(id).await? {
                report.streaks_created += 1;
            }
        }
        report.audit = audit;

        info!(
            posts = report.posts_repaired,
            comments = report.comments_repaired,
            streaks = report.streaks_created,
            unresolved = report.unresolved.len(),
            "repair finished"
        );
        Ok(report)
    }

    async fn repair_post(&self, id: PostId) -> Result<bool> {
        let mut uow = self.store.begin().await.or_internal("repair post", id)?;
        let Some(mut post) = uow.lock_post(id).await.or_internal("lock post", id)? else {
            return Ok(false);
        };
        // Comment creation and deletion lock the post, so this count is
        // stable while we hold it.
        let actual = self
            .store
            .comments_of_post(id)
            .await
            .or_internal("count comments", id)?
            .len() as u64;
        let mut changed = post.likes.reconcile();
        if post.comments_count != actual {
            post.comments_count = actual;
            changed = true;
        }
        if changed {
            uow.put_post(post).or_internal("stage post", id)?;
            uow.commit().await.or_internal("commit post repair", id)?;
            info!(post = %id, "post counters repaired");
        }
        Ok(changed)
    }

    async fn repair_comment(&self, id: CommentId) -> Result<bool> {
        let mut uow = self.store.begin().await.or_internal("repair comment", id)?;
        let Some(mut comment) = uow.lock_comment(id).await.or_internal("lock comment", id)? else {
            return Ok(false);
        };
        let actual = self
            .store
            .replies(id)
            .await
            .or_internal("count replies", id)?
            .len() as u64;
        let mut changed = comment.likes.reconcile();
        if comment.replies_count != actual {
            comment.replies_count = actual;
            changed = true;
        }
        if changed {
            uow.put_comment(comment).or_internal("stage comment", id)?;
            uow.commit().await.or_internal("commit comment repair", id)?;
            info!(comment = %id, "comment counters repaired");
        }
        Ok(changed)
    }

    async fn restore_streak(&self, account: AccountId) -> Result<bool> {
        if self.store.account(account).await.or_internal("load account", account)?.is_none() {
            return Ok(false);
        }
        let mut uow = self.store.begin().await.or_internal("restore streak", account)?;
        if uow.lock_streak(account).await.or_internal("lock streak", account)?.is_some() {
            return Ok(false);
        }
        uow.insert_streak(StreakState::new(account, self.clock.now()))
            .or_internal("insert streak", account)?;
        uow.commit().await.or_internal("commit streak restore", account)?;
        warn!(%account, entity = %EntityKind::StreakState, "recreated with zero totals");
        Ok(true)
    }
}

fn follow_drift(account: &Account, all: &HashMap<AccountId, Account>, out: &mut Vec<Drift>) {
    for followee in &account.following {
        let mirrored = all
            .get(followee)
            .is_some_and(|other| other.followers.contains(&account.id));
        if !mirrored {
            out.push(Drift::OneSidedFollow {
                follower: account.id,
                followee: *followee,
                missing: MissingHalf::Followers,
            });
        }
    }
    for follower in &account.followers {
        let mirrored = all
            .get(follower)
            .is_some_and(|other| other.following.contains(&account.id));
        if !mirrored {
            out.push(Drift::OneSidedFollow {
                follower: *follower,
                followee: account.id,
                missing: MissingHalf::Following,
            });
        }
    }
}
