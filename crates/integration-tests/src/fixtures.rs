//! A fresh engine over an in-memory store, plus builders for the records
//! most scenarios start from.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use fake::faker::internet::en::Username;
use fake::faker::name::en::Name;
use fake::Fake;

use domains::clock::ManualClock;
use domains::dto::{NewAccount, NewComment, NewPost, PostView};
use domains::ids::{AccountId, CommentId, PostId};
use domains::models::{Account, Visibility, WorkoutCompletion};
use domains::ports::SocialStore;
use services::{Engine, EngineOptions};
use storage_adapters::MemoryStore;

/// Midnight UTC of the first day every scenario counts from.
pub fn day_zero() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0)
        .single()
        .expect("valid start date")
}

pub struct World {
    pub store: MemoryStore,
    pub engine: Engine,
    pub clock: Arc<ManualClock>,
    seq: AtomicU32,
}

impl World {
    /// Clock starts at 06:00 on day zero and ticks one second per read, so
    /// every created record gets a distinct timestamp.
    pub fn new() -> Self {
        Self::with_clock(ManualClock::new(
            day_zero() + Duration::hours(6),
            Duration::seconds(1),
        ))
    }

    /// Clock frozen at 06:00 on day zero; every record shares a timestamp.
    pub fn frozen() -> Self {
        Self::with_clock(ManualClock::fixed(day_zero() + Duration::hours(6)))
    }

    fn with_clock(clock: ManualClock) -> Self {
        let store = MemoryStore::new();
        let clock = Arc::new(clock);
        let shared: Arc<dyn SocialStore> = Arc::new(store.clone());
        let engine = Engine::with_clock(shared, clock.clone(), EngineOptions::default());
        Self {
            store,
            engine,
            clock,
            seq: AtomicU32::new(0),
        }
    }

    /// Creates an account with a generated, unique username.
    pub async fn account(&self) -> Account {
        let n = self.seq.fetch_add(1, Ordering::SeqCst);
        let base: String = Username().fake();
        let base: String = base
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
            .take(20)
            .collect();
        let full_name: String = Name().fake();
        self.engine
            .accounts
            .create_account(NewAccount {
                id: None,
                username: format!("{base}_{n:03}"),
                full_name,
                profile_picture: None,
                bio: None,
            })
            .await
            .expect("account creation")
    }

    pub async fn accounts(&self, n: usize) -> Vec<Account> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.account().await);
        }
        out
    }

    pub async fn post(&self, author: AccountId, visibility: Visibility) -> PostView {
        self.engine
            .posts
            .create_post(
                author,
                NewPost {
                    caption: format!("{visibility:?} session log"),
                    image_urls: vec!["https://cdn.example/img/1.jpg".into()],
                    visibility: Some(visibility),
                    ..Default::default()
                },
            )
            .await
            .expect("post creation")
    }

    pub async fn comment(
        &self,
        post: PostId,
        author: AccountId,
        parent: Option<CommentId>,
    ) -> CommentId {
        self.engine
            .comments
            .create_comment(
                post,
                author,
                NewComment {
                    text: "strong work".into(),
                    parent_id: parent,
                },
            )
            .await
            .expect("comment creation")
            .id
    }

    /// Account re-read from the store.
    pub async fn reload(&self, id: AccountId) -> Account {
        self.store
            .account(id)
            .await
            .expect("store read")
            .expect("account exists")
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

/// A 30 minute workout finished at 18:00 UTC on day `day`.
pub fn completion(account: AccountId, day: i64) -> WorkoutCompletion {
    WorkoutCompletion {
        account_id: account,
        workout_id: None,
        completed_at: day_zero() + Duration::days(day) + Duration::hours(18),
        duration_minutes: 30,
        calories_burned: Some(200),
    }
}
