//! Feed visibility predicate, ordering and pagination window.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};
use crate::ids::AccountId;
use crate::models::{Account, Post, Visibility};

/// A 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Page {
    pub fn new(page: u32, limit: u32) -> Result<Self> {
        if page == 0 {
            return Err(DomainError::Validation("page must be at least 1".into()));
        }
        if limit == 0 {
            return Err(DomainError::Validation("limit must be at least 1".into()));
        }
        Ok(Self { page, limit })
    }

    /// Caps `limit` at `max`.
    pub fn clamped(self, max: u32) -> Self {
        Self {
            page: self.page,
            limit: self.limit.min(max.max(1)),
        }
    }

    pub fn offset(&self) -> usize {
        (self.page as usize - 1).saturating_mul(self.limit as usize)
    }

    /// Applies the window to an already ordered sequence.
    pub fn window<T>(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.offset())
            .take(self.limit as usize)
            .collect()
    }
}

/// Which posts a viewer may see. Visibility is always judged from the
/// viewer's side, never the owner's.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeedFilter {
    /// `None` for an anonymous viewer.
    pub viewer: Option<AccountId>,
    /// Accounts the viewer follows.
    pub following: BTreeSet<AccountId>,
    /// Restricts the feed to one author (profile feeds).
    pub author: Option<AccountId>,
}

impl FeedFilter {
    /// The home feed of `viewer`.
    pub fn home(viewer: &Account) -> Self {
        Self {
            viewer: Some(viewer.id),
            following: viewer.following.clone(),
            author: None,
        }
    }

    /// Posts of `target` as seen by `viewer`.
    pub fn profile(target: AccountId, viewer: Option<&Account>) -> Self {
        Self {
            viewer: viewer.map(|v| v.id),
            following: viewer.map(|v| v.following.clone()).unwrap_or_default(),
            author: Some(target),
        }
    }

    pub fn admits(&self, post: &Post) -> bool {
        if !post.is_visible {
            return false;
        }
        if self.author.is_some_and(|author| author != post.author) {
            return false;
        }
        if self.viewer == Some(post.author) {
            return true;
        }
        match post.visibility {
            Visibility::Public => true,
            Visibility::Followers => self.following.contains(&post.author),
            Visibility::Private => false,
        }
    }
}

/// Newest first; equal timestamps fall back to id ascending so that pages
/// never overlap or skip.
pub fn feed_order(a: &Post, b: &Post) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::PostId;
    use crate::likes::Likes;
    use chrono::{Duration, TimeZone, Utc};

    fn post(author: AccountId, visibility: Visibility) -> Post {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        Post {
            id: PostId::new(),
            author,
            caption: "leg day".into(),
            image_urls: vec![],
            workout_ref: None,
            tags: vec![],
            visibility,
            location: None,
            is_visible: true,
            likes: Likes::default(),
            comments_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn page_rejects_zero() {
        assert!(matches!(Page::new(0, 10), Err(DomainError::Validation(_))));
        assert!(matches!(Page::new(1, 0), Err(DomainError::Validation(_))));
    }

    #[test]
    fn page_window_skips_previous_pages() {
        let page = Page::new(2, 3).unwrap();
        assert_eq!(page.offset(), 3);
        assert_eq!(page.window(0..10), vec![3, 4, 5]);
        assert_eq!(Page::new(4, 3).unwrap().window(0..10), vec![9]);
    }

    #[test]
    fn clamp_caps_limit() {
        let page = Page::new(1, 500).unwrap().clamped(100);
        assert_eq!(page.limit, 100);
    }

    #[test]
    fn stranger_sees_only_public() {
        let viewer = AccountId::new();
        let author = AccountId::new();
        let filter = FeedFilter {
            viewer: Some(viewer),
            ..Default::default()
        };
        assert!(filter.admits(&post(author, Visibility::Public)));
        assert!(!filter.admits(&post(author, Visibility::Followers)));
        assert!(!filter.admits(&post(author, Visibility::Private)));
    }

    #[test]
    fn follower_sees_followers_posts_but_not_private() {
        let viewer = AccountId::new();
        let author = AccountId::new();
        let filter = FeedFilter {
            viewer: Some(viewer),
            following: BTreeSet::from([author]),
            author: None,
        };
        assert!(filter.admits(&post(author, Visibility::Followers)));
        assert!(!filter.admits(&post(author, Visibility::Private)));
    }

    #[test]
    fn own_posts_are_always_visible_unless_hidden() {
        let me = AccountId::new();
        let filter = FeedFilter {
            viewer: Some(me),
            ..Default::default()
        };
        assert!(filter.admits(&post(me, Visibility::Private)));
        let mut hidden = post(me, Visibility::Public);
        hidden.is_visible = false;
        assert!(!filter.admits(&hidden));
    }

    #[test]
    fn profile_filter_restricts_author() {
        let target = AccountId::new();
        let filter = FeedFilter::profile(target, None);
        assert!(filter.admits(&post(target, Visibility::Public)));
        assert!(!filter.admits(&post(target, Visibility::Private)));
        assert!(!filter.admits(&post(AccountId::new(), Visibility::Public)));
    }

    #[test]
    fn order_is_newest_first_then_id() {
        let author = AccountId::new();
        let older = post(author, Visibility::Public);
        let mut newer = post(author, Visibility::Public);
        newer.created_at = older.created_at + Duration::seconds(1);
        assert_eq!(feed_order(&newer, &older), Ordering::Less);

        let a = post(author, Visibility::Public);
        let b = post(author, Visibility::Public);
        let (lo, hi) = if a.id < b.id { (a, b) } else { (b, a) };
        assert_eq!(feed_order(&lo, &hi), Ordering::Less);
    }
}
