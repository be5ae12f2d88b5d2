use chrono::Duration;

use domains::dto::StreakTransition;
use domains::error::{DomainError, EntityKind};
use domains::ids::AccountId;
use integration_tests::fixtures::{completion, World};

#[tokio::test]
async fn three_consecutive_days() {
    let world = World::new();
    let me = world.account().await;
    for day in 0..3 {
        world.engine.streaks.record_completion(completion(me.id, day)).await.unwrap();
    }
    let stats = world.engine.streaks.stats(me.id).await.unwrap();
    assert_eq!(stats.current_streak, 3);
    assert!(stats.longest_streak >= 3);
    assert_eq!(stats.total_workouts, 3);
    assert_eq!(stats.total_workout_minutes, 90);
    assert_eq!(stats.total_calories_burned, 600);
}

#[tokio::test]
async fn gap_of_three_days_resets() {
    let world = World::new();
    let me = world.account().await;
    world.engine.streaks.record_completion(completion(me.id, 0)).await.unwrap();
    let update = world
        .engine
        .streaks
        .record_completion(completion(me.id, 3))
        .await
        .unwrap();
    assert_eq!(update.transition, StreakTransition::Reset);
    assert_eq!(update.state.current_streak, 1);
}

#[tokio::test]
async fn same_day_twice_keeps_streak_at_one() {
    let world = World::new();
    let me = world.account().await;
    let first = world.engine.streaks.record_completion(completion(me.id, 0)).await.unwrap();
    assert_eq!(first.transition, StreakTransition::Started);

    let mut later = completion(me.id, 0);
    later.completed_at += Duration::hours(3);
    let second = world.engine.streaks.record_completion(later).await.unwrap();
    assert_eq!(second.transition, StreakTransition::Unchanged);
    assert_eq!(second.state.current_streak, 1);
    assert_eq!(second.state.total_workouts, 2);
}

#[tokio::test]
async fn backfilled_event_only_adds_totals() {
    let world = World::new();
    let me = world.account().await;
    world.engine.streaks.record_completion(completion(me.id, 4)).await.unwrap();
    world.engine.streaks.record_completion(completion(me.id, 5)).await.unwrap();

    let update = world
        .engine
        .streaks
        .record_completion(completion(me.id, 1))
        .await
        .unwrap();
    assert_eq!(update.transition, StreakTransition::Backfilled);
    assert_eq!(update.state.current_streak, 2);
    assert_eq!(update.state.last_completion_date, Some(update.day + chrono::Days::new(4)));
    assert_eq!(update.state.total_workouts, 3);
}

#[tokio::test]
async fn profile_reflects_streak() {
    let world = World::new();
    let me = world.account().await;
    world.engine.streaks.record_completion(completion(me.id, 0)).await.unwrap();
    world.engine.streaks.record_completion(completion(me.id, 1)).await.unwrap();

    let profile = world.engine.accounts.public_profile(me.id, None).await.unwrap();
    assert_eq!(profile.current_streak, 2);
    assert_eq!(profile.total_workouts, 2);
}

#[tokio::test]
async fn completion_for_unknown_account_is_not_found() {
    let world = World::new();
    let ghost = AccountId::new();
    let err = world
        .engine
        .streaks
        .record_completion(completion(ghost, 0))
        .await
        .unwrap_err();
    assert_eq!(err, DomainError::not_found(EntityKind::Account, ghost));
}
