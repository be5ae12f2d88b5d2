//! Replayable activity fixtures.
//!
//! Records are referred to by short keys (`"ana"`, `"p1"`) that are mapped
//! to generated ids while the fixture is replayed.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use domains::dto::{NewAccount, NewComment, NewPost};
use domains::error::DomainError;
use domains::ids::{AccountId, CommentId, PostId};
use domains::models::{Visibility, WorkoutCompletion};
use services::Engine;

#[derive(Debug, Deserialize)]
pub struct Activity {
    pub accounts: Vec<AccountSeed>,
    #[serde(default)]
    pub events: Vec<Event>,
}

#[derive(Debug, Deserialize)]
pub struct AccountSeed {
    pub key: String,
    pub username: String,
    pub full_name: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub profile_picture: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Follow {
        actor: String,
        target: String,
    },
    Unfollow {
        actor: String,
        target: String,
    },
    Post {
        key: String,
        author: String,
        caption: String,
        #[serde(default)]
        visibility: Visibility,
        #[serde(default)]
        image_urls: Vec<String>,
        #[serde(default)]
        tags: Vec<String>,
    },
    Like {
        actor: String,
        post: String,
    },
    Unlike {
        actor: String,
        post: String,
    },
    Comment {
        key: String,
        author: String,
        post: String,
        text: String,
        #[serde(default)]
        reply_to: Option<String>,
    },
    LikeComment {
        actor: String,
        comment: String,
    },
    DeleteComment {
        actor: String,
        comment: String,
    },
    Workout {
        account: String,
        completed_at: DateTime<Utc>,
        duration_minutes: u32,
        #[serde(default)]
        calories_burned: Option<u32>,
    },
}

impl Activity {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading activity fixture {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("parsing activity fixture {}", path.display()))
    }
}

/// What a replay did, for the final summary.
#[derive(Debug, Default)]
pub struct ReplayStats {
    pub applied: usize,
    pub skipped: usize,
}

#[derive(Default)]
struct Keys {
    accounts: HashMap<String, AccountId>,
    posts: HashMap<String, PostId>,
    comments: HashMap<String, CommentId>,
}

impl Keys {
    fn account(&self, key: &str) -> Result<AccountId> {
        self.accounts
            .get(key)
            .copied()
            .ok_or_else(|| anyhow!("unknown account key {key:?}"))
    }

    fn post(&self, key: &str) -> Result<PostId> {
        self.posts
            .get(key)
            .copied()
            .ok_or_else(|| anyhow!("unknown post key {key:?}"))
    }

    fn comment(&self, key: &str) -> Result<CommentId> {
        self.comments
            .get(key)
            .copied()
            .ok_or_else(|| anyhow!("unknown comment key {key:?}"))
    }
}

/// Creates the accounts and applies every event in order. Conflicts that
/// mean "already applied" are logged and skipped; anything else aborts.
pub async fn replay(engine: &Engine, activity: Activity) -> Result<ReplayStats> {
    let mut keys = Keys::default();
    let mut stats = ReplayStats::default();

    for seed in activity.accounts {
        let account = engine
            .accounts
            .create_account(NewAccount {
                id: None,
                username: seed.username,
                full_name: seed.full_name,
                profile_picture: seed.profile_picture,
                bio: seed.bio,
            })
            .await
            .with_context(|| format!("creating account {:?}", seed.key))?;
        keys.accounts.insert(seed.key, account.id);
        stats.applied += 1;
    }

    for (index, event) in activity.events.into_iter().enumerate() {
        match apply(engine, &mut keys, event).await {
            Ok(()) => stats.applied += 1,
            Err(err) => match err.downcast_ref::<DomainError>() {
                Some(domain) if domain.is_benign_retry() => {
                    warn!(index, error = %domain, "event already applied; skipped");
                    stats.skipped += 1;
                }
                _ => return Err(err.context(format!("event #{index}"))),
            },
        }
    }

    info!(applied = stats.applied, skipped = stats.skipped, "activity replayed");
    Ok(stats)
}

async fn apply(engine: &Engine, keys: &mut Keys, event: Event) -> Result<()> {
    match event {
        Event::Follow { actor, target } => {
            engine
                .follows
                .follow(keys.account(&actor)?, keys.account(&target)?)
                .await?;
        }
        Event::Unfollow { actor, target } => {
            engine
                .follows
                .unfollow(keys.account(&actor)?, keys.account(&target)?)
                .await?;
        }
        Event::Post {
            key,
            author,
            caption,
            visibility,
            image_urls,
            tags,
        } => {
            let post = engine
                .posts
                .create_post(
                    keys.account(&author)?,
                    NewPost {
                        caption,
                        image_urls,
                        tags,
                        visibility: Some(visibility),
                        ..Default::default()
                    },
                )
                .await?;
            keys.posts.insert(key, post.id);
        }
        Event::Like { actor, post } => {
            engine
                .engagement
                .like_post(keys.post(&post)?, keys.account(&actor)?)
                .await?;
        }
        Event::Unlike { actor, post } => {
            engine
                .engagement
                .unlike_post(keys.post(&post)?, keys.account(&actor)?)
                .await?;
        }
        Event::Comment {
            key,
            author,
            post,
            text,
            reply_to,
        } => {
            let parent_id = reply_to.as_deref().map(|k| keys.comment(k)).transpose()?;
            let comment = engine
                .comments
                .create_comment(
                    keys.post(&post)?,
                    keys.account(&author)?,
                    NewComment { text, parent_id },
                )
                .await?;
            keys.comments.insert(key, comment.id);
        }
        Event::LikeComment { actor, comment } => {
            engine
                .comments
                .like_comment(keys.comment(&comment)?, keys.account(&actor)?)
                .await?;
        }
        Event::DeleteComment { actor, comment } => {
            engine
                .comments
                .delete_comment(keys.comment(&comment)?, keys.account(&actor)?)
                .await?;
        }
        Event::Workout {
            account,
            completed_at,
            duration_minutes,
            calories_burned,
        } => {
            engine
                .streaks
                .record_completion(WorkoutCompletion {
                    account_id: keys.account(&account)?,
                    workout_id: None,
                    completed_at,
                    duration_minutes,
                    calories_burned,
                })
                .await?;
        }
    }
    Ok(())
}
