//! Service-level tests for queue policy, orchestration, and the worker
//! lifecycle, run against the in-memory backend.

mod common;

use common::{build_harness, test_config};
use driftfeed::db::ContentStore;
use driftfeed::models::{GenerationTask, TaskStatus};

#[tokio::test]
async fn rebuild_restores_exact_target_size() {
    let harness = build_harness(test_config());
    harness.seed_content("v1", "a dog surfing", vec![1.0, 0.0, 0.0]).await;
    harness.seed_content("v2", "a cat in a box", vec![0.0, 1.0, 0.0]).await;

    let added = harness.feed().rebuild("u1", None).await.unwrap();
    assert_eq!(added, 10);
    assert_eq!(harness.feed().size("u1").await.unwrap(), 10);

    // Preference-scored rebuild also lands exactly on target.
    let added = harness
        .feed()
        .rebuild("u1", Some(&[1.0, 0.0, 0.0]))
        .await
        .unwrap();
    assert_eq!(added, 10);
    assert_eq!(harness.feed().size("u1").await.unwrap(), 10);
}

#[tokio::test]
async fn preference_scored_rebuild_ranks_closest_content_first() {
    let mut config = test_config();
    config.target_feed_size = 2;
    let harness = build_harness(config);
    harness.seed_content("close", "a dog surfing", vec![1.0, 0.0, 0.0]).await;
    harness.seed_content("far", "city at night", vec![0.0, 0.0, 1.0]).await;

    harness
        .feed()
        .rebuild("u1", Some(&[1.0, 0.0, 0.0]))
        .await
        .unwrap();

    let page = harness.feed().page("u1", 0, 2).await.unwrap();
    assert_eq!(page[0].0, "close");
    assert!(page[0].1 > page[1].1);
}

#[tokio::test]
async fn add_is_idempotent_score_set() {
    let harness = build_harness(test_config());
    let feed = harness.feed();

    feed.add("u1", "v1", 0.5).await.unwrap();
    feed.add("u1", "v1", 0.5).await.unwrap();
    assert_eq!(feed.size("u1").await.unwrap(), 1);

    let page = feed.page("u1", 0, 10).await.unwrap();
    assert_eq!(page, vec![("v1".to_string(), 0.5)]);

    // Re-adding with a new score updates in place.
    feed.add("u1", "v1", 0.9).await.unwrap();
    let page = feed.page("u1", 0, 10).await.unwrap();
    assert_eq!(page, vec![("v1".to_string(), 0.9)]);
}

#[tokio::test]
async fn suffixed_ids_resolve_through_the_mapping() {
    let harness = build_harness(test_config());
    harness.seed_content("v1", "a dog surfing", vec![1.0, 0.0, 0.0]).await;

    harness.feed().rebuild("u1", None).await.unwrap();
    let page = harness.feed().page("u1", 0, 1).await.unwrap();
    let member = &page[0].0;
    assert!(member.contains(':'), "bootstrap members carry suffixes");

    let canonical = harness.feed().canonical_id("u1", member).await;
    assert_eq!(canonical, "v1");
}

#[tokio::test]
async fn queue_size_is_a_hard_ceiling() {
    let mut config = test_config();
    config.target_feed_size = 3;
    let harness = build_harness(config);
    let feed = harness.feed();

    for i in 0..6 {
        feed.add("u1", &format!("v{}", i), i as f64).await.unwrap();
    }
    let evicted = feed.evict_to_target("u1").await.unwrap();
    assert_eq!(evicted, 3);

    // The survivors are the highest-ranked entries.
    let page = feed.page("u1", 0, 10).await.unwrap();
    let ids: Vec<&str> = page.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, vec!["v5", "v4", "v3"]);
}

#[tokio::test]
async fn forced_selection_refreshes_even_below_threshold() {
    let harness = build_harness(test_config());
    harness.seed_content("weak", "a quiet street", vec![0.0, 1.0, 0.0]).await;
    // Well under the 0.1 similarity threshold.
    harness.index.seed_hit("weak", 0.02, "a quiet street").await;

    let outcome = harness
        .orchestrator()
        .refresh_for_preference("u1", &[1.0, 0.0, 0.0])
        .await
        .unwrap();

    assert!(
        outcome.existing_added >= 1,
        "forced top-K must select something while any candidate exists"
    );
    assert_eq!(outcome.tasks_enqueued, 1);
    assert!(harness.feed().size("u1").await.unwrap() >= 1);
}

#[tokio::test]
async fn watched_content_is_penalized_not_excluded() {
    let mut config = test_config();
    config.noise_factor = 0.0;
    config.guaranteed_fraction = 1.0;
    config.refresh_batch_size = 2;
    let harness = build_harness(config);

    harness.seed_content("seen", "a dog surfing", vec![1.0, 0.0, 0.0]).await;
    harness.seed_content("new", "a cat in a box", vec![0.0, 1.0, 0.0]).await;
    harness.index.seed_hit("seen", 0.5, "a dog surfing").await;
    harness.index.seed_hit("new", 0.5, "a cat in a box").await;
    harness.preferences().add_watched("u1", "seen").await.unwrap();

    harness
        .orchestrator()
        .refresh_for_preference("u1", &[1.0, 0.0, 0.0])
        .await
        .unwrap();

    let page = harness.feed().page("u1", 0, 10).await.unwrap();
    let score_of = |id: &str| {
        page.iter()
            .find(|(member, _)| member == id)
            .map(|(_, score)| *score)
    };
    let seen = score_of("seen").expect("watched content must still be eligible");
    let new = score_of("new").unwrap();
    assert!(seen < new, "watched content ranks below fresh content");
}

#[tokio::test]
async fn worker_completes_task_and_feeds_the_result_back() {
    let harness = build_harness(test_config());
    harness.seed_content("v1", "a dog surfing", vec![1.0, 0.0, 0.0]).await;
    harness.index.seed_hit("v1", 0.9, "a dog surfing").await;

    harness
        .orchestrator()
        .refresh_for_preference("u1", &[1.0, 0.0, 0.0])
        .await
        .unwrap();
    assert_eq!(harness.worker().queue_status("u1").await.unwrap().pending, 1);

    let processed = harness.worker().process_all_pending_tasks().await.unwrap();
    assert_eq!(processed, 1);

    // Completed tasks are pruned, not archived in place.
    let status = harness.worker().queue_status("u1").await.unwrap();
    assert_eq!(status.pending, 0);
    assert_eq!(status.in_progress, 0);
    assert!(!status
        .tasks
        .iter()
        .any(|task| matches!(task, GenerationTask::GenerateVideo(_))));

    // The generated video exists in metadata, the index, and the feed with
    // the high fresh-content score.
    let page = harness.feed().page("u1", 0, 20).await.unwrap();
    let generated = page
        .iter()
        .find(|(id, _)| id.starts_with("gen-"))
        .expect("generated content lands in the feed");
    assert!((generated.1 - 1.0).abs() < 1e-9);

    let record = harness
        .content
        .get_by_id(&generated.0)
        .await
        .unwrap()
        .expect("metadata saved for generated content");
    assert!(record.location.contains(&generated.0));
    assert_eq!(harness.index.upserts.read().await.len(), 1);

    let stats = harness.worker().stats_snapshot().await;
    assert_eq!(stats.videos_generated, 1);
}

#[tokio::test]
async fn failed_tasks_wait_for_explicit_resubmission() {
    let harness = build_harness(test_config());
    harness.seed_content("v1", "a dog surfing", vec![1.0, 0.0, 0.0]).await;
    harness.index.seed_hit("v1", 0.9, "a dog surfing").await;
    harness.backend.set_failure(Some("render farm on fire")).await;

    harness
        .orchestrator()
        .refresh_for_preference("u1", &[1.0, 0.0, 0.0])
        .await
        .unwrap();

    let processed = harness.worker().process_all_pending_tasks().await.unwrap();
    assert_eq!(processed, 0);

    let status = harness.worker().queue_status("u1").await.unwrap();
    assert_eq!(status.failed, 1);
    let failed_id = status
        .tasks
        .iter()
        .find_map(|task| match task {
            GenerationTask::GenerateVideo(t) if t.status == TaskStatus::Failed => Some(t.id),
            _ => None,
        })
        .unwrap();

    // Draining again does nothing: failed tasks never retry on their own.
    let processed = harness.worker().process_all_pending_tasks().await.unwrap();
    assert_eq!(processed, 0);
    assert_eq!(harness.worker().queue_status("u1").await.unwrap().failed, 1);

    // Explicit resubmission puts it back in line; a healthy backend then
    // completes it.
    harness.backend.set_failure(None).await;
    let resubmitted = harness
        .worker()
        .resubmit_failed_task("u1", failed_id)
        .await
        .unwrap();
    assert!(resubmitted);
    assert_eq!(harness.worker().queue_status("u1").await.unwrap().pending, 1);

    let processed = harness.worker().process_all_pending_tasks().await.unwrap();
    assert_eq!(processed, 1);
}

#[tokio::test]
async fn stuck_tasks_are_reset_by_the_recovery_sweep() {
    let mut config = test_config();
    // Zero age threshold: anything in-progress is immediately stuck.
    config.stuck_task_max_age_secs = 0;
    let harness = build_harness(config);
    harness.seed_content("v1", "a dog surfing", vec![1.0, 0.0, 0.0]).await;
    harness.index.seed_hit("v1", 0.9, "a dog surfing").await;

    harness
        .orchestrator()
        .refresh_for_preference("u1", &[1.0, 0.0, 0.0])
        .await
        .unwrap();

    // Claim the task and abandon it mid-flight.
    let claimed = harness.worker().next_pending_task("u1").await.unwrap();
    assert!(claimed.is_some());
    let status = harness.worker().queue_status("u1").await.unwrap();
    assert_eq!(status.in_progress, 1);

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let reset = harness.worker().reset_stuck_tasks("u1").await.unwrap();
    assert_eq!(reset, 1);

    let status = harness.worker().queue_status("u1").await.unwrap();
    assert_eq!(status.pending, 1);
    assert_eq!(status.in_progress, 0);
}

#[tokio::test]
async fn concurrent_claims_yield_exactly_one_winner() {
    let harness = build_harness(test_config());
    harness.seed_content("v1", "a dog surfing", vec![1.0, 0.0, 0.0]).await;
    harness.index.seed_hit("v1", 0.9, "a dog surfing").await;

    harness
        .orchestrator()
        .refresh_for_preference("u1", &[1.0, 0.0, 0.0])
        .await
        .unwrap();

    let worker_a = harness.state.worker.clone();
    let worker_b = harness.state.worker.clone();
    let (a, b) = tokio::join!(
        tokio::spawn(async move { worker_a.next_pending_task("u1").await.unwrap() }),
        tokio::spawn(async move { worker_b.next_pending_task("u1").await.unwrap() }),
    );
    let a = a.unwrap();
    let b = b.unwrap();

    assert!(
        a.is_some() ^ b.is_some(),
        "exactly one concurrent claim may win the single pending task"
    );
}
