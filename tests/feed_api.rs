//! HTTP-level tests driving the router end to end against the in-memory
//! backend.

mod common;

use axum_test::TestServer;
use serde_json::json;

use common::{build_harness, test_config, Harness};
use driftfeed::db::ContentStore;
use driftfeed::routes::create_router;

fn server(harness: &Harness) -> TestServer {
    TestServer::new(create_router(harness.state.clone())).unwrap()
}

#[tokio::test]
async fn health_check_is_ok() {
    let harness = build_harness(test_config());
    let server = server(&harness);
    let response = server.get("/health").await;
    response.assert_status_ok();
}

#[tokio::test]
async fn first_feed_read_bootstraps_to_target_size() {
    let harness = build_harness(test_config());
    harness.seed_content("v1", "a dog surfing", vec![1.0, 0.0, 0.0]).await;
    harness.seed_content("v2", "a cat in a box", vec![0.0, 1.0, 0.0]).await;
    harness.seed_content("v3", "city at night", vec![0.0, 0.0, 1.0]).await;

    let server = server(&harness);
    let response = server
        .get("/api/v1/feed")
        .add_query_param("user_id", "u1")
        .add_query_param("limit", "3")
        .await;
    response.assert_status_ok();

    let page: serde_json::Value = response.json();
    assert_eq!(page["success"], true);
    assert_eq!(page["items"].as_array().unwrap().len(), 3);
    assert_eq!(page["has_more"], true);
    assert_eq!(page["next_cursor"], 3);
    // Three distinct videos are repeated under unique suffixes until the
    // queue holds exactly the target size.
    assert_eq!(page["feed_size"], 10);

    let stats = harness.feed().stats("u1").await.unwrap();
    assert_eq!(stats.feed_size, 10);
    assert!(stats.is_healthy);
}

#[tokio::test]
async fn cursor_overflow_still_returns_a_page() {
    let harness = build_harness(test_config());
    harness.seed_content("v1", "a dog surfing", vec![1.0, 0.0, 0.0]).await;

    let server = server(&harness);
    let response = server
        .get("/api/v1/feed")
        .add_query_param("user_id", "u1")
        .add_query_param("cursor", "50")
        .add_query_param("limit", "3")
        .await;
    response.assert_status_ok();

    let page: serde_json::Value = response.json();
    assert_eq!(page["success"], true);
    assert_eq!(page["has_more"], true);
    assert!(
        !page["items"].as_array().unwrap().is_empty(),
        "overflowing cursor must reset and serve from the rebuilt queue"
    );
}

#[tokio::test]
async fn empty_catalog_read_fails_soft() {
    let harness = build_harness(test_config());
    let server = server(&harness);

    let response = server
        .get("/api/v1/feed")
        .add_query_param("user_id", "u1")
        .await;
    response.assert_status_ok();

    let page: serde_json::Value = response.json();
    assert_eq!(page["items"].as_array().unwrap().len(), 0);
    // Infinite-feed contract: never report exhaustion, even with nothing
    // to serve.
    assert_eq!(page["has_more"], true);
}

#[tokio::test]
async fn interactions_build_the_documented_preference_vector() {
    let harness = build_harness(test_config());
    harness.seed_content("a", "a dog surfing", vec![1.0, 0.0, 0.0]).await;
    harness.seed_content("b", "a cat in a box", vec![0.0, 1.0, 0.0]).await;
    harness.seed_content("c", "a dog and a cat", vec![1.0, 1.0, 0.0]).await;
    harness.index.seed_hit("a", 0.9, "a dog surfing").await;
    harness.index.seed_hit("b", 0.8, "a cat in a box").await;
    harness.index.seed_hit("c", 0.7, "a dog and a cat").await;

    let server = server(&harness);
    let mut last_ack = json!(null);
    for content_id in ["a", "b", "c"] {
        let response = server
            .post("/api/v1/interactions")
            .json(&json!({
                "user_id": "u1",
                "content_id": content_id,
                "interaction_type": "like",
            }))
            .await;
        response.assert_status_ok();
        last_ack = response.json();
    }

    // update_threshold is 2 in the test config, so the third like fires a
    // recompute and resets the counter to 1.
    assert_eq!(last_ack["preference_updated"], true);
    assert_eq!(last_ack["interactions_since_update"], 1);

    let response = server.get("/api/v1/preferences/u1").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let vector: Vec<f64> = body["preference"]["vector"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_f64().unwrap())
        .collect();

    assert!((vector[0] - 0.7071).abs() < 1e-3);
    assert!((vector[1] - 0.7071).abs() < 1e-3);
    assert!(vector[2].abs() < 1e-6);
    let magnitude: f64 = vector.iter().map(|v| v * v).sum::<f64>().sqrt();
    assert!((magnitude - 1.0).abs() < 1e-6);

    // Likes are consumption, so all three land in the watched set.
    let response = server.get("/api/v1/preferences/u1/watched").await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["count"], 3);

    // Engagement counters rode along with the likes.
    let record = harness.content.get_by_id("a").await.unwrap().unwrap();
    assert_eq!(record.like_count, 1);

    // The recompute notified the orchestrator, which queued exactly one
    // generation task alongside the ready-made matches.
    let response = server.get("/api/v1/queue/u1/status").await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["pending"], 1);
    assert!(body["ready"].as_u64().unwrap() >= 1);
}

#[tokio::test]
async fn interaction_on_unknown_content_is_not_found() {
    let harness = build_harness(test_config());
    let server = server(&harness);

    let response = server
        .post("/api/v1/interactions")
        .json(&json!({
            "user_id": "u1",
            "content_id": "missing",
            "interaction_type": "like",
        }))
        .await;
    response.assert_status(axum::http::StatusCode::NOT_FOUND);

    let body: serde_json::Value = response.json();
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn unknown_user_preference_is_an_explicit_null() {
    let harness = build_harness(test_config());
    let server = server(&harness);

    let response = server.get("/api/v1/preferences/nobody").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["success"], true);
    assert!(body["preference"].is_null());
}

#[tokio::test]
async fn watched_set_admin_roundtrip() {
    let harness = build_harness(test_config());
    let server = server(&harness);

    server
        .post("/api/v1/preferences/u1/watched/v1")
        .await
        .assert_status_ok();

    let response = server.get("/api/v1/preferences/u1/watched/v1").await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["has_watched"], true);

    // Suffixed ids canonicalize to the same content.
    let response = server.get("/api/v1/preferences/u1/watched/v1:2:7").await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["has_watched"], true);

    server
        .delete("/api/v1/preferences/u1/watched/v1")
        .await
        .assert_status_ok();
    let response = server.get("/api/v1/preferences/u1/watched/v1").await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["has_watched"], false);
}

#[tokio::test]
async fn feed_item_removal_reports_outcome() {
    let harness = build_harness(test_config());
    harness.feed().add("u1", "v1", 0.5).await.unwrap();

    let server = server(&harness);
    let response = server.delete("/api/v1/feed/u1/items/v1").await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["removed"], true);

    let response = server.delete("/api/v1/feed/u1/items/v1").await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["removed"], false);
}
