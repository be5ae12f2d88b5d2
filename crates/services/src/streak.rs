//! # Workout streaks
//!
//! Day-grained streak state machine driven by workout completions. The
//! calendar day of a completion is taken in a fixed UTC offset; time of day
//! is discarded. Updates to one account's state are serialized by locking
//! its record for the whole read-modify-write.

use std::sync::Arc;

use chrono::{FixedOffset, NaiveDate};
use tracing::{debug, instrument};

use domains::clock::Clock;
use domains::dto::{StreakTransition, StreakUpdate};
use domains::error::{DomainError, EntityKind, Result};
use domains::ids::AccountId;
use domains::models::{StreakState, WorkoutCompletion};
use domains::ports::SocialStore;

use crate::support::{invariant_broken, store_failure, StoreResultExt};

/// Folds one completion on `day` into `state`.
///
/// Totals always grow. Streak counters only move for completions on or
/// after the last recorded day, and `last_completion_date` never moves
/// backwards.
pub fn apply_completion(
    state: &mut StreakState,
    day: NaiveDate,
    minutes: u32,
    calories: Option<u32>,
) -> StreakTransition {
    let transition = match state.last_completion_date {
        None => {
            state.current_streak = 1;
            StreakTransition::Started
        }
        Some(last) => match (day - last).num_days() {
            gap if gap < 0 => StreakTransition::Backfilled,
            0 => StreakTransition::Unchanged,
            1 => {
                state.current_streak = state.current_streak.saturating_add(1);
                StreakTransition::Extended
            }
            _ => {
                state.current_streak = 1;
                StreakTransition::Reset
            }
        },
    };

    if transition != StreakTransition::Backfilled {
        state.last_completion_date = Some(day);
    }
    state.longest_streak = state.longest_streak.max(state.current_streak);

    state.total_workouts = state.total_workouts.saturating_add(1);
    state.total_workout_minutes = state.total_workout_minutes.saturating_add(u64::from(minutes));
    if let Some(calories) = calories {
        state.total_calories_burned = state.total_calories_burned.saturating_add(u64::from(calories));
    }
    transition
}

#[derive(Clone)]
pub struct StreakService {
    store: Arc<dyn SocialStore>,
    clock: Arc<dyn Clock>,
    offset: FixedOffset,
}

impl StreakService {
    pub fn new(store: Arc<dyn SocialStore>, clock: Arc<dyn Clock>, offset: FixedOffset) -> Self {
        Self {
            store,
            clock,
            offset,
        }
    }

    /// The calendar day `completion` counts towards.
    pub fn day_of(&self, completion: &WorkoutCompletion) -> NaiveDate {
        completion.completed_at.with_timezone(&self.offset).date_naive()
    }

    #[instrument(skip(self, completion), fields(account = %completion.account_id))]
    pub async fn record_completion(&self, completion: WorkoutCompletion) -> Result<StreakUpdate> {
        let account = completion.account_id;
        let day = self.day_of(&completion);

        let mut uow = self.store.begin().await.or_internal("record completion", account)?;
        let Some(mut state) = uow
            .lock_streak(account)
            .await
            .or_internal("lock streak", account)?
        else {
            return Err(self.missing_state(account).await);
        };

        let transition = apply_completion(
            &mut state,
            day,
            completion.duration_minutes,
            completion.calories_burned,
        );
        state.updated_at = self.clock.now();
        uow.put_streak(state.clone()).or_internal("stage streak", account)?;
        uow.commit().await.or_internal("commit streak", account)?;

        debug!(
            %account,
            %day,
            ?transition,
            current = state.current_streak,
            longest = state.longest_streak,
            total = state.total_workouts,
            "completion recorded"
        );
        Ok(StreakUpdate {
            transition,
            day,
            state,
        })
    }

    pub async fn stats(&self, account: AccountId) -> Result<StreakState> {
        match self.store.streak(account).await.or_internal("load streak", account)? {
            Some(state) => Ok(state),
            None => Err(self.missing_state(account).await),
        }
    }

    /// `NotFound` for an unknown account, `Internal` when an existing
    /// account has lost its streak record.
    async fn missing_state(&self, account: AccountId) -> DomainError {
        match self.store.account(account).await {
            Ok(Some(_)) => invariant_broken("load streak", account, "account has no streak state"),
            Ok(None) => DomainError::not_found(EntityKind::Account, account),
            Err(err) => store_failure("load account", account, err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use domains::clock::SystemClock;
    use domains::ports::UnitOfWork;
    use storage_adapters::MemoryStore;

    fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap() + chrono::Days::new(n.into())
    }

    fn fresh() -> StreakState {
        StreakState::new(AccountId::new(), Utc::now())
    }

    #[test]
    fn consecutive_days_extend_the_streak() {
        let mut s = fresh();
        assert_eq!(apply_completion(&mut s, day(0), 30, None), StreakTransition::Started);
        assert_eq!(apply_completion(&mut s, day(1), 30, None), StreakTransition::Extended);
        assert_eq!(apply_completion(&mut s, day(2), 30, Some(250)), StreakTransition::Extended);
        assert_eq!(s.current_streak, 3);
        assert_eq!(s.longest_streak, 3);
        assert_eq!(s.total_workouts, 3);
        assert_eq!(s.total_workout_minutes, 90);
        assert_eq!(s.total_calories_burned, 250);
    }

    #[test]
    fn gap_resets_but_keeps_longest() {
        let mut s = fresh();
        apply_completion(&mut s, day(0), 20, None);
        apply_completion(&mut s, day(1), 20, None);
        assert_eq!(apply_completion(&mut s, day(4), 20, None), StreakTransition::Reset);
        assert_eq!(s.current_streak, 1);
        assert_eq!(s.longest_streak, 2);
        assert_eq!(s.last_completion_date, Some(day(4)));
    }

    #[test]
    fn same_day_is_unchanged() {
        let mut s = fresh();
        apply_completion(&mut s, day(0), 20, None);
        assert_eq!(apply_completion(&mut s, day(0), 45, None), StreakTransition::Unchanged);
        assert_eq!(s.current_streak, 1);
        assert_eq!(s.total_workouts, 2);
        assert_eq!(s.total_workout_minutes, 65);
    }

    #[test]
    fn backfill_only_moves_totals() {
        let mut s = fresh();
        apply_completion(&mut s, day(5), 20, None);
        apply_completion(&mut s, day(6), 20, None);
        assert_eq!(apply_completion(&mut s, day(2), 40, Some(100)), StreakTransition::Backfilled);
        assert_eq!(s.current_streak, 2);
        assert_eq!(s.last_completion_date, Some(day(6)));
        assert_eq!(s.total_workouts, 3);
        assert_eq!(s.total_calories_burned, 100);
    }

    #[tokio::test]
    async fn day_is_taken_in_configured_offset() {
        let store = MemoryStore::new();
        let account = AccountId::new();
        let mut uow = store.begin().await.unwrap();
        uow.insert_streak(StreakState::new(account, Utc::now())).unwrap();
        uow.commit().await.unwrap();

        // 02:00 UTC on the 2nd is still the 1st at UTC-5.
        let offset = FixedOffset::west_opt(5 * 3600).unwrap();
        let service = StreakService::new(Arc::new(store), Arc::new(SystemClock), offset);
        let update = service
            .record_completion(WorkoutCompletion {
                account_id: account,
                workout_id: None,
                completed_at: Utc.with_ymd_and_hms(2025, 1, 2, 2, 0, 0).unwrap(),
                duration_minutes: 30,
                calories_burned: None,
            })
            .await
            .unwrap();
        assert_eq!(update.day, day(0));
        assert_eq!(update.transition, StreakTransition::Started);
    }

    #[tokio::test]
    async fn unknown_account_is_not_found() {
        let service = StreakService::new(
            Arc::new(MemoryStore::new()),
            Arc::new(SystemClock),
            FixedOffset::east_opt(0).unwrap(),
        );
        let id = AccountId::new();
        let err = service.stats(id).await.unwrap_err();
        assert_eq!(err, DomainError::not_found(EntityKind::Account, id));
    }
}
