use std::collections::HashSet;

use domains::error::{DomainError, EntityKind};
use domains::ids::AccountId;
use domains::models::Visibility;
use integration_tests::fixtures::World;

#[tokio::test]
async fn stranger_public_and_own_posts_scenario() {
    let world = World::new();
    let a = world.account().await;
    let b = world.account().await;
    let b_public = world.post(b.id, Visibility::Public).await;
    let _b_private = world.post(b.id, Visibility::Private).await;
    let a_own = world.post(a.id, Visibility::Followers).await;

    let feed = world.engine.feed.compose_feed(a.id, 1, 10).await.unwrap();
    let ids: HashSet<_> = feed.iter().map(|p| p.id).collect();
    assert_eq!(ids, HashSet::from([b_public.id, a_own.id]));
}

#[tokio::test]
async fn followers_only_posts_need_a_follow_edge() {
    let world = World::new();
    let viewer = world.account().await;
    let author = world.account().await;
    let gated = world.post(author.id, Visibility::Followers).await;

    let before = world.engine.feed.compose_feed(viewer.id, 1, 10).await.unwrap();
    assert!(before.is_empty());

    world.engine.follows.follow(viewer.id, author.id).await.unwrap();
    let after = world.engine.feed.compose_feed(viewer.id, 1, 10).await.unwrap();
    assert_eq!(after.iter().map(|p| p.id).collect::<Vec<_>>(), vec![gated.id]);

    // Following never unlocks private posts.
    world.post(author.id, Visibility::Private).await;
    let still = world.engine.feed.compose_feed(viewer.id, 1, 10).await.unwrap();
    assert_eq!(still.len(), 1);
}

#[tokio::test]
async fn feed_is_newest_first() {
    let world = World::new();
    let me = world.account().await;
    let mut created = Vec::new();
    for _ in 0..4 {
        created.push(world.post(me.id, Visibility::Public).await.id);
    }
    created.reverse();
    let feed: Vec<_> = world
        .engine
        .feed
        .compose_feed(me.id, 1, 10)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.id)
        .collect();
    assert_eq!(feed, created);
}

#[tokio::test]
async fn pages_with_equal_timestamps_neither_overlap_nor_skip() {
    let world = World::frozen();
    let me = world.account().await;
    let mut all = Vec::new();
    for _ in 0..7 {
        all.push(world.post(me.id, Visibility::Public).await.id);
    }
    all.sort();

    let mut paged = Vec::new();
    for page in 1..=3 {
        let chunk = world.engine.feed.compose_feed(me.id, page, 3).await.unwrap();
        assert!(chunk.len() <= 3);
        paged.extend(chunk.into_iter().map(|p| p.id));
    }
    assert_eq!(paged, all);

    let beyond = world.engine.feed.compose_feed(me.id, 4, 3).await.unwrap();
    assert!(beyond.is_empty());
}

#[tokio::test]
async fn profile_feed_is_judged_from_the_viewer() {
    let world = World::new();
    let target = world.account().await;
    let follower = world.account().await;
    let stranger = world.account().await;
    world.engine.follows.follow(follower.id, target.id).await.unwrap();

    let public = world.post(target.id, Visibility::Public).await.id;
    let gated = world.post(target.id, Visibility::Followers).await.id;
    let private = world.post(target.id, Visibility::Private).await.id;
    world.post(stranger.id, Visibility::Public).await;

    let ids = |posts: Vec<domains::dto::PostView>| -> HashSet<_> {
        posts.into_iter().map(|p| p.id).collect()
    };
    let feed = &world.engine.feed;

    let own = feed.compose_profile_feed(target.id, Some(target.id), 1, 10).await.unwrap();
    assert_eq!(ids(own), HashSet::from([public, gated, private]));

    let fan = feed.compose_profile_feed(target.id, Some(follower.id), 1, 10).await.unwrap();
    assert_eq!(ids(fan), HashSet::from([public, gated]));

    let other = feed.compose_profile_feed(target.id, Some(stranger.id), 1, 10).await.unwrap();
    assert_eq!(ids(other), HashSet::from([public]));

    let anonymous = feed.compose_profile_feed(target.id, None, 1, 10).await.unwrap();
    assert_eq!(ids(anonymous), HashSet::from([public]));
}

#[tokio::test]
async fn unknown_viewer_and_bad_pages_are_errors() {
    let world = World::new();
    let ghost = AccountId::new();
    let err = world.engine.feed.compose_feed(ghost, 1, 10).await.unwrap_err();
    assert_eq!(err, DomainError::not_found(EntityKind::Account, ghost));

    let me = world.account().await;
    assert!(matches!(
        world.engine.feed.compose_feed(me.id, 0, 10).await,
        Err(DomainError::Validation(_))
    ));
    // Oversized limits are capped rather than rejected.
    assert!(world.engine.feed.compose_feed(me.id, 1, 10_000).await.unwrap().is_empty());
}
