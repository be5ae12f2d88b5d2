//! # services
//!
//! Business rules of the engagement engine. Every service holds the store
//! behind `Arc<dyn SocialStore>` and is cheap to clone; [`Engine`] builds a
//! consistent set of them over one store.

pub mod accounts;
pub mod comments;
pub mod engagement;
pub mod feed;
pub mod follow;
pub mod posts;
pub mod reconcile;
pub mod streak;

mod support;

use std::sync::Arc;

use chrono::{FixedOffset, Offset, Utc};

use domains::clock::{Clock, SystemClock};
use domains::dto::TextLimits;
use domains::ports::SocialStore;

pub use accounts::AccountService;
pub use comments::{CommentDeletion, CommentService};
pub use engagement::EngagementLedger;
pub use feed::{FeedService, PageLimits};
pub use follow::{FollowCounts, FollowService};
pub use posts::PostService;
pub use reconcile::{Drift, DriftReport, MissingHalf, Reconciler, RepairReport};
pub use streak::{apply_completion, StreakService};

/// Tunables shared by the services, usually taken from `configs::Settings`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    pub text_limits: TextLimits,
    pub page_limits: PageLimits,
    pub day_offset: FixedOffset,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            text_limits: TextLimits::default(),
            page_limits: PageLimits::default(),
            day_offset: Utc.fix(),
        }
    }
}

/// One instance of every service, wired to the same store and clock.
#[derive(Clone)]
pub struct Engine {
    pub accounts: AccountService,
    pub follows: FollowService,
    pub posts: PostService,
    pub engagement: EngagementLedger,
    pub comments: CommentService,
    pub feed: FeedService,
    pub streaks: StreakService,
    pub reconciler: Reconciler,
}

impl Engine {
    pub fn new(store: Arc<dyn SocialStore>, options: EngineOptions) -> Self {
        Self::with_clock(store, Arc::new(SystemClock), options)
    }

    pub fn with_clock(
        store: Arc<dyn SocialStore>,
        clock: Arc<dyn Clock>,
        options: EngineOptions,
    ) -> Self {
        let engagement = EngagementLedger::new(store.clone());
        Self {
            accounts: AccountService::new(store.clone(), clock.clone()),
            follows: FollowService::new(store.clone()),
            posts: PostService::new(
                store.clone(),
                clock.clone(),
                options.text_limits,
                engagement.clone(),
            ),
            comments: CommentService::new(
                store.clone(),
                clock.clone(),
                options.text_limits,
                engagement.clone(),
            ),
            engagement,
            feed: FeedService::new(store.clone(), options.page_limits),
            streaks: StreakService::new(store.clone(), clock.clone(), options.day_offset),
            reconciler: Reconciler::new(store, clock),
        }
    }
}
