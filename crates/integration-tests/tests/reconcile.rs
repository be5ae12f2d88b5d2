use domains::likes::Likes;
use domains::models::Visibility;
use domains::ports::{SocialStore, UnitOfWork};
use integration_tests::fixtures::{completion, World};
use services::Drift;

#[tokio::test]
async fn engine_activity_leaves_no_drift() {
    let world = World::new();
    let people = world.accounts(4).await;
    for (i, a) in people.iter().enumerate() {
        for b in people.iter().skip(i + 1) {
            world.engine.follows.follow(a.id, b.id).await.unwrap();
        }
        world.engine.streaks.record_completion(completion(a.id, 0)).await.unwrap();
    }
    world.engine.follows.unfollow(people[0].id, people[3].id).await.unwrap();

    let p = world.post(people[1].id, Visibility::Public).await;
    let top = world.comment(p.id, people[0].id, None).await;
    let reply = world.comment(p.id, people[2].id, Some(top)).await;
    world.comment(p.id, people[3].id, Some(top)).await;
    world.engine.engagement.like_post(p.id, people[0].id).await.unwrap();
    world.engine.comments.like_comment(reply, people[1].id).await.unwrap();
    world.engine.comments.delete_comment(reply, people[2].id).await.unwrap();

    let report = world.engine.reconciler.audit().await.unwrap();
    assert!(report.is_clean(), "{:?}", report.drifts);
    assert_eq!(report.accounts_scanned, 4);
    assert_eq!(report.posts_scanned, 1);
    assert_eq!(report.comments_scanned, 2);
}

#[tokio::test]
async fn repair_restores_counters_from_sets() {
    let world = World::new();
    let author = world.account().await;
    let fan = world.account().await;
    let p = world.post(author.id, Visibility::Public).await;
    world.engine.engagement.like_post(p.id, fan.id).await.unwrap();
    world.comment(p.id, fan.id, None).await;

    // Corrupt the post's counters behind the services' back.
    let mut uow = world.store.begin().await.unwrap();
    let mut post = uow.lock_post(p.id).await.unwrap().unwrap();
    post.likes = Likes::from_parts(post.likes.members().clone(), 9);
    post.comments_count = 0;
    uow.put_post(post).unwrap();
    uow.commit().await.unwrap();

    let audit = world.engine.reconciler.audit().await.unwrap();
    assert_eq!(audit.drifts.len(), 2);
    assert!(audit.drifts.iter().all(Drift::is_repairable));

    let repair = world.engine.reconciler.repair().await.unwrap();
    assert_eq!(repair.posts_repaired, 1);
    assert!(repair.unresolved.is_empty());

    let fixed = world.store.post(p.id).await.unwrap().unwrap();
    assert_eq!(fixed.likes.count(), 1);
    assert_eq!(fixed.comments_count, 1);
    assert!(world.engine.reconciler.audit().await.unwrap().is_clean());
}

#[tokio::test]
async fn report_serializes_with_kind_tags() {
    let world = World::new();
    let author = world.account().await;
    let p = world.post(author.id, Visibility::Public).await;

    let mut uow = world.store.begin().await.unwrap();
    let mut post = uow.lock_post(p.id).await.unwrap().unwrap();
    post.comments_count = 3;
    uow.put_post(post).unwrap();
    uow.commit().await.unwrap();

    let audit = world.engine.reconciler.audit().await.unwrap();
    let json = serde_json::to_value(&audit).unwrap();
    assert_eq!(json["drifts"][0]["kind"], "post_comments");
    assert_eq!(json["drifts"][0]["recorded"], 3);
    assert_eq!(json["drifts"][0]["actual"], 0);
}
