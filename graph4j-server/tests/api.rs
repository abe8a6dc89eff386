//! HTTP API tests over in-memory stores.

mod helpers;

use axum::http::StatusCode;
use serde_json::json;
use tower::ServiceExt;

use graph4j_rs::driver::GraphDriver;
use helpers::{body_json, delete, get, post_json, test_app};

fn ingest_body(mode: &str, wait: bool) -> serde_json::Value {
    json!({
        "group_id": "g1",
        "embedding_mode": mode,
        "wait": wait,
        "episodes": [
            { "content": "alice prefers dark roast coffee", "episode_type": "text" },
            { "content": "bob prefers green tea", "episode_type": "text" },
        ],
    })
}

#[tokio::test]
async fn health_and_root() {
    let app = test_app();

    let response = app.router.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "status": "healthy", "service": "graph4j" }));

    let response = app.router.clone().oneshot(get("/")).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["dual_store"], json!(true));

    let response = app.router.oneshot(get("/ready")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn inline_dual_ingest_reports_success_per_episode() {
    let app = test_app();

    let response = app.router.oneshot(post_json("/episodes", ingest_body("dual", true))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["success"], json!(true));
    let episodes = body["episodes"].as_array().unwrap();
    assert_eq!(episodes.len(), 2);
    for report in episodes {
        assert_eq!(report["status"], json!("success"));
        assert_eq!(report["stores"], json!(["fast", "quality"]));
    }
    assert_eq!(app.fast.node_count(), 4);
    assert_eq!(app.quality.node_count(), 4);
}

#[tokio::test]
async fn queued_ingest_returns_accepted_and_drains_on_shutdown() {
    let app = test_app();

    let response = app
        .router
        .clone()
        .oneshot(post_json("/episodes", ingest_body("fast", false)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    drop(app.router);
    drop(app.queue);
    let processed = app.worker.shutdown().await;

    assert_eq!(processed, 2);
    assert_eq!(app.fast.episode_count(), 2);
    assert_eq!(app.quality.episode_count(), 0);
}

#[tokio::test]
async fn node_search_merges_dual_results() {
    let app = test_app();
    app.router.clone().oneshot(post_json("/episodes", ingest_body("dual", true))).await.unwrap();

    let response = app
        .router
        .oneshot(post_json(
            "/search/nodes",
            json!({ "query": "coffee", "group_ids": ["g1"], "embedding_mode": "dual", "entity_types": ["Preference"] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let nodes = body["nodes"].as_array().unwrap();
    assert!(!nodes.is_empty());
    assert_eq!(nodes[0]["name"], json!("dark roast coffee"));
    assert!(body.get("degraded").is_none());
}

#[tokio::test]
async fn fact_search_with_zero_limit_is_empty() {
    let app = test_app();
    app.router.clone().oneshot(post_json("/episodes", ingest_body("default", true))).await.unwrap();

    let response = app
        .router
        .oneshot(post_json("/search/facts", json!({ "query": "tea", "max_facts": 0 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["facts"], json!([]));
}

#[tokio::test]
async fn get_memory_finds_facts_from_messages() {
    let app = test_app();
    app.router.clone().oneshot(post_json("/episodes", ingest_body("default", true))).await.unwrap();

    let response = app
        .router
        .oneshot(post_json(
            "/get-memory",
            json!({
                "group_id": "g1",
                "messages": [{ "role": "bob", "role_type": "user", "content": "what tea do I like?" }],
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let facts = body_json(response).await["facts"].as_array().unwrap().clone();
    assert!(facts.iter().any(|f| f["fact"] == json!("bob prefers green tea")));
}

#[tokio::test]
async fn entity_edge_lookup_and_delete() {
    let app = test_app();
    app.router.clone().oneshot(post_json("/episodes", ingest_body("dual", true))).await.unwrap();
    let edge = app.quality.all_edges().remove(0);

    let response = app
        .router
        .clone()
        .oneshot(get(&format!("/entity-edge/{}", edge.uuid)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["fact"], json!(edge.fact));

    let response = app
        .router
        .clone()
        .oneshot(delete(&format!("/entity-edge/{}", edge.uuid)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(app.fast.get_entity_edge(edge.uuid).await.unwrap().is_none());
    assert!(app.quality.get_entity_edge(edge.uuid).await.unwrap().is_none());

    let response = app
        .router
        .oneshot(get(&format!("/entity-edge/{}", edge.uuid)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], json!("not_found"));
}

#[tokio::test]
async fn episodes_listing_and_group_delete() {
    let app = test_app();
    app.router.clone().oneshot(post_json("/episodes", ingest_body("dual", true))).await.unwrap();

    let response = app.router.clone().oneshot(get("/episodes/g1?last_n=1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);

    let response = app.router.clone().oneshot(delete("/group/g1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.fast.node_count(), 0);
    assert_eq!(app.quality.node_count(), 0);
}

#[tokio::test]
async fn clear_wipes_both_stores() {
    let app = test_app();
    app.router.clone().oneshot(post_json("/episodes", ingest_body("dual", true))).await.unwrap();

    let response = app.router.oneshot(post_json("/clear", json!({}))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.fast.episode_count(), 0);
    assert_eq!(app.quality.episode_count(), 0);
}

#[tokio::test]
async fn bad_uuid_is_rejected() {
    let app = test_app();
    let response = app.router.oneshot(get("/entity-edge/not-a-uuid")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
