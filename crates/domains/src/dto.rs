//! # Request and response structures
//!
//! One structure per operation. Requests are validated at the boundary so
//! the services only check cross-entity invariants.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};
use crate::ids::{AccountId, CommentId, PostId, WorkoutId};
use crate::models::{Account, Comment, Post, StreakState, Visibility};

/// Length limits applied to user-supplied text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextLimits {
    pub max_caption_len: usize,
    pub max_comment_len: usize,
}

impl Default for TextLimits {
    fn default() -> Self {
        Self {
            max_caption_len: 500,
            max_comment_len: 500,
        }
    }
}

fn require_text(field: &str, value: &str, max: usize) -> Result<()> {
    if value.trim().is_empty() {
        return Err(DomainError::Validation(format!("{field} is required")));
    }
    if value.chars().count() > max {
        return Err(DomainError::Validation(format!(
            "{field} cannot exceed {max} characters"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAccount {
    /// Supplied by the identity collaborator; generated when absent.
    #[serde(default)]
    pub id: Option<AccountId>,
    pub username: String,
    pub full_name: String,
    #[serde(default)]
    pub profile_picture: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

impl NewAccount {
    pub fn validate(&self) -> Result<()> {
        let len = self.username.trim().chars().count();
        if !(3..=30).contains(&len) {
            return Err(DomainError::Validation(
                "username must be between 3 and 30 characters".into(),
            ));
        }
        require_text("full name", &self.full_name, 100)?;
        if let Some(bio) = &self.bio {
            if bio.chars().count() > 500 {
                return Err(DomainError::Validation("bio cannot exceed 500 characters".into()));
            }
        }
        Ok(())
    }
}

/// Profile fields an account owner may change; `None` leaves a field as is.
/// The username is fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub profile_picture: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

impl ProfileUpdate {
    pub fn validate(&self) -> Result<()> {
        if let Some(full_name) = &self.full_name {
            require_text("full name", full_name, 100)?;
        }
        if let Some(bio) = &self.bio {
            if bio.chars().count() > 500 {
                return Err(DomainError::Validation("bio cannot exceed 500 characters".into()));
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewPost {
    pub caption: String,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub workout_ref: Option<WorkoutId>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub visibility: Option<Visibility>,
    #[serde(default)]
    pub location: Option<String>,
}

impl NewPost {
    pub fn validate(&self, limits: &TextLimits) -> Result<()> {
        require_text("caption", &self.caption, limits.max_caption_len)
    }
}

/// Partial update of a post; `None` leaves a field untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PostUpdate {
    pub caption: Option<String>,
    pub image_urls: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub visibility: Option<Visibility>,
    pub location: Option<Option<String>>,
    pub is_visible: Option<bool>,
}

impl PostUpdate {
    pub fn validate(&self, limits: &TextLimits) -> Result<()> {
        match &self.caption {
            Some(caption) => require_text("caption", caption, limits.max_caption_len),
            None => Ok(()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewComment {
    pub text: String,
    #[serde(default)]
    pub parent_id: Option<CommentId>,
}

impl NewComment {
    pub fn validate(&self, limits: &TextLimits) -> Result<()> {
        require_text("comment text", &self.text, limits.max_comment_len)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub id: AccountId,
    pub username: String,
    pub full_name: String,
    pub profile_picture: Option<String>,
}

impl From<&Account> for AccountSummary {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            username: account.username.clone(),
            full_name: account.full_name.clone(),
            profile_picture: account.profile_picture.clone(),
        }
    }
}

/// One hit of an account search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMatch {
    pub account: AccountSummary,
    pub bio: String,
    /// Whether the searching viewer already follows this account.
    pub is_following: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicProfile {
    pub account: AccountSummary,
    pub bio: String,
    pub followers_count: u64,
    pub following_count: u64,
    pub total_workouts: u64,
    pub current_streak: u32,
    /// True only when a different viewer follows this account.
    pub is_following: bool,
}

/// Snapshot of a post as returned to a viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostView {
    pub id: PostId,
    pub author: AccountId,
    pub caption: String,
    pub image_urls: Vec<String>,
    pub workout_ref: Option<WorkoutId>,
    pub tags: Vec<String>,
    pub visibility: Visibility,
    pub location: Option<String>,
    pub likes_count: u64,
    pub comments_count: u64,
    pub liked_by_viewer: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PostView {
    pub fn new(post: &Post, viewer: Option<AccountId>) -> Self {
        Self {
            id: post.id,
            author: post.author,
            caption: post.caption.clone(),
            image_urls: post.image_urls.clone(),
            workout_ref: post.workout_ref,
            tags: post.tags.clone(),
            visibility: post.visibility,
            location: post.location.clone(),
            likes_count: post.likes.count(),
            comments_count: post.comments_count,
            liked_by_viewer: viewer.is_some_and(|v| post.likes.contains(v)),
            created_at: post.created_at,
            updated_at: post.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentView {
    pub id: CommentId,
    pub post_id: PostId,
    pub author: AccountId,
    pub text: String,
    pub parent_id: Option<CommentId>,
    pub likes_count: u64,
    pub replies_count: u64,
    pub liked_by_viewer: bool,
    pub is_edited: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CommentView {
    pub fn new(comment: &Comment, viewer: Option<AccountId>) -> Self {
        Self {
            id: comment.id,
            post_id: comment.post_id,
            author: comment.author,
            text: comment.text.clone(),
            parent_id: comment.parent_id,
            likes_count: comment.likes.count(),
            replies_count: comment.replies_count,
            liked_by_viewer: viewer.is_some_and(|v| comment.likes.contains(v)),
            is_edited: comment.is_edited,
            created_at: comment.created_at,
            updated_at: comment.updated_at,
        }
    }
}

/// How a completion event moved the streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreakTransition {
    /// First completion ever.
    Started,
    /// Completion on the day after the last one.
    Extended,
    /// Another completion on the same day.
    Unchanged,
    /// Gap of more than one day; streak restarted at 1.
    Reset,
    /// Event dated before the last completion; only totals moved.
    Backfilled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakUpdate {
    pub transition: StreakTransition,
    pub day: NaiveDate,
    pub state: StreakState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_update_checks_only_supplied_fields() {
        assert!(ProfileUpdate::default().validate().is_ok());
        assert!(ProfileUpdate::default().is_empty());
        let blank_name = ProfileUpdate {
            full_name: Some("  ".into()),
            ..Default::default()
        };
        assert!(matches!(blank_name.validate(), Err(DomainError::Validation(_))));
        let long_bio = ProfileUpdate {
            bio: Some("x".repeat(501)),
            ..Default::default()
        };
        assert!(long_bio.validate().is_err());
    }

    #[test]
    fn comment_text_is_required_and_bounded() {
        let limits = TextLimits::default();
        let blank = NewComment {
            text: "   ".into(),
            parent_id: None,
        };
        assert!(matches!(blank.validate(&limits), Err(DomainError::Validation(_))));

        let long = NewComment {
            text: "x".repeat(501),
            parent_id: None,
        };
        assert!(long.validate(&limits).is_err());

        let ok = NewComment {
            text: "nice pr!".into(),
            parent_id: None,
        };
        assert!(ok.validate(&limits).is_ok());
    }

    #[test]
    fn username_length_is_checked() {
        let account = NewAccount {
            id: None,
            username: "ab".into(),
            full_name: "A B".into(),
            profile_picture: None,
            bio: None,
        };
        assert!(account.validate().is_err());
    }

    #[test]
    fn empty_update_is_detected() {
        assert!(PostUpdate::default().is_empty());
        let update = PostUpdate {
            is_visible: Some(false),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }
}
