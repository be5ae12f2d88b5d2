//! # Feed composition
//!
//! Home and profile feeds. The visibility predicate and ordering live in
//! [`domains::feed`]; this layer resolves the viewer, clamps the page and
//! hands the filter to the store.

use std::sync::Arc;

use tracing::{debug, instrument};

use domains::dto::PostView;
use domains::error::{DomainError, EntityKind, Result};
use domains::feed::{FeedFilter, Page};
use domains::ids::AccountId;
use domains::models::Account;
use domains::ports::SocialStore;

use crate::support::StoreResultExt;

/// Page size bounds applied to every feed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

impl PageLimits {
    /// Builds a page from optional request parameters. Missing values fall
    /// back to page 1 and the default size; oversized limits are capped.
    pub fn page(&self, page: Option<u32>, limit: Option<u32>) -> Result<Page> {
        let page = Page::new(page.unwrap_or(1), limit.unwrap_or(self.default_page_size))?;
        Ok(page.clamped(self.max_page_size))
    }
}

#[derive(Clone)]
pub struct FeedService {
    store: Arc<dyn SocialStore>,
    limits: PageLimits,
}

impl FeedService {
    pub fn new(store: Arc<dyn SocialStore>, limits: PageLimits) -> Self {
        Self { store, limits }
    }

    pub fn limits(&self) -> PageLimits {
        self.limits
    }

    /// Posts `viewer` may see: their own, public ones, and followers-only
    /// posts of accounts they follow. Newest first.
    #[instrument(skip(self))]
    pub async fn compose_feed(&self, viewer: AccountId, page: u32, limit: u32) -> Result<Vec<PostView>> {
        let page = self.limits.page(Some(page), Some(limit))?;
        let account = self.require(viewer).await?;
        let filter = FeedFilter::home(&account);
        self.scan(&filter, page).await
    }

    /// Posts of `target` as seen by `viewer` (anonymous when `None`).
    /// Private posts only appear when the viewer is the target.
    #[instrument(skip(self))]
    pub async fn compose_profile_feed(
        &self,
        target: AccountId,
        viewer: Option<AccountId>,
        page: u32,
        limit: u32,
    ) -> Result<Vec<PostView>> {
        let page = self.limits.page(Some(page), Some(limit))?;
        self.require(target).await?;
        let viewer_account = match viewer {
            Some(id) => Some(self.require(id).await?),
            None => None,
        };
        let filter = FeedFilter::profile(target, viewer_account.as_ref());
        self.scan(&filter, page).await
    }

    async fn scan(&self, filter: &FeedFilter, page: Page) -> Result<Vec<PostView>> {
        let posts = self
            .store
            .scan_posts(filter, page)
            .await
            .or_internal("scan posts", DisplayViewer(filter.viewer))?;
        debug!(
            viewer = ?filter.viewer,
            author = ?filter.author,
            page = page.page,
            limit = page.limit,
            returned = posts.len(),
            "feed composed"
        );
        Ok(posts
            .iter()
            .map(|post| PostView::new(post, filter.viewer))
            .collect())
    }

    async fn require(&self, id: AccountId) -> Result<Account> {
        self.store
            .account(id)
            .await
            .or_internal("load account", id)?
            .ok_or_else(|| DomainError::not_found(EntityKind::Account, id))
    }
}

struct DisplayViewer(Option<AccountId>);

impl std::fmt::Display for DisplayViewer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(id) => id.fmt(f),
            None => f.write_str("anonymous"),
        }
    }
}
