//! # Domain Models
//!
//! The records the engagement engine reads and mutates. Counters that
//! annotate a membership set live next to it and are only changed through
//! the service layer.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AccountId, CommentId, PostId, WorkoutId};
use crate::likes::Likes;

/// A user of the platform and its two follow sets.
///
/// `b ∈ a.following ⇔ a ∈ b.followers` must hold between any two accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub username: String,
    pub full_name: String,
    /// Opaque URL handed over by the file storage collaborator.
    pub profile_picture: Option<String>,
    pub bio: String,
    pub followers: BTreeSet<AccountId>,
    pub following: BTreeSet<AccountId>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn follows(&self, other: AccountId) -> bool {
        self.following.contains(&other)
    }
}

/// Who may see a post in a composed feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Followers,
    Private,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub author: AccountId,
    pub caption: String,
    pub image_urls: Vec<String>,
    pub workout_ref: Option<WorkoutId>,
    pub tags: Vec<String>,
    pub visibility: Visibility,
    pub location: Option<String>,
    /// Soft-delete flag. Hidden posts drop out of every feed and refuse
    /// new engagement.
    pub is_visible: bool,
    pub likes: Likes,
    /// Number of comments (top-level and nested) attached to this post.
    pub comments_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub author: AccountId,
    pub text: String,
    /// `None` for a top-level comment.
    pub parent_id: Option<CommentId>,
    pub likes: Likes,
    /// Number of comments whose `parent_id` points here.
    pub replies_count: u64,
    pub is_edited: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Comment {
    pub fn is_top_level(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// A workout record moving to "completed".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkoutCompletion {
    pub account_id: AccountId,
    pub workout_id: Option<WorkoutId>,
    pub completed_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub calories_burned: Option<u32>,
}

/// Per-account workout streak and running totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakState {
    pub account_id: AccountId,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_completion_date: Option<NaiveDate>,
    pub total_workouts: u64,
    pub total_workout_minutes: u64,
    pub total_calories_burned: u64,
    pub updated_at: DateTime<Utc>,
}

impl StreakState {
    /// The zeroed state created together with its account.
    pub fn new(account_id: AccountId, now: DateTime<Utc>) -> Self {
        Self {
            account_id,
            current_streak: 0,
            longest_streak: 0,
            last_completion_date: None,
            total_workouts: 0,
            total_workout_minutes: 0,
            total_calories_burned: 0,
            updated_at: now,
        }
    }
}

/// Decrements a denormalized counter, clamping at zero.
///
/// Returns `false` when the counter was already zero, which means it had
/// drifted from the collection it counts.
pub fn saturating_decrement(counter: &mut u64) -> bool {
    match counter.checked_sub(1) {
        Some(next) => {
            *counter = next;
            true
        }
        None => false,
    }
}
