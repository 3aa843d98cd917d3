//! HTTP API integration tests

mod helpers;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use europatch_server::build_router;
use europatch_server::services::catalog::seed_catalog;
use helpers::{
    plaits_detail_page, plaits_rack_page, test_state, StubFetcher, PLAITS_URL, RACK_URL,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower::util::ServiceExt;

async fn create_test_app(fetcher: StubFetcher) -> (Router, SqlitePool) {
    let (state, pool) = test_state(Arc::new(fetcher)).await;
    (build_router(state), pool)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _pool) = create_test_app(StubFetcher::new()).await;

    for uri in ["/health", "/api/health"] {
        let (status, body) = send(&app, get(uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["module"], "europatch-server");
    }
}

#[tokio::test]
async fn test_parse_rack_requires_url() {
    let (app, _pool) = create_test_app(StubFetcher::new()).await;

    let (status, body) = send(&app, post_json("/api/parse-rack", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    assert_eq!(body["error"]["message"], "Missing modulargrid_url parameter");

    let (status, _) = send(&app, post_json("/api/parse-rack", json!({"modulargrid_url": "  "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_bodies_get_error_envelope() {
    let (app, _pool) = create_test_app(StubFetcher::new()).await;

    let raw = |content_type: &str, body: &str| {
        Request::builder()
            .method("POST")
            .uri("/api/parse-rack")
            .header("content-type", content_type)
            .body(Body::from(body.to_string()))
            .unwrap()
    };

    for request in [
        post_json("/api/parse-rack", json!({"modulargrid_url": 12345})),
        raw("text/plain", r#"{"modulargrid_url": "https://www.modulargrid.net/e/racks/view/1"}"#),
        raw("application/json", ""),
        post_json("/api/generate-patch", json!({"modules": "all", "prompt": "ambient"})),
    ] {
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
        assert!(!body["error"]["message"].as_str().unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_parse_rack_rejects_non_rack_url() {
    let (app, _pool) = create_test_app(StubFetcher::new()).await;

    let (status, body) = send(
        &app,
        post_json(
            "/api/parse-rack",
            json!({"modulargrid_url": "https://www.modulargrid.net/e/modules/view/1"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("https://www.modulargrid.net/e/racks/view/123456"));
}

#[tokio::test]
async fn test_parse_rack_then_read_back() {
    let fetcher = StubFetcher::new()
        .with_page(RACK_URL, &plaits_rack_page())
        .with_page(PLAITS_URL, &plaits_detail_page());
    let (app, _pool) = create_test_app(fetcher).await;

    let (status, parsed) = send(&app, post_json("/api/parse-rack", json!({"modulargrid_url": RACK_URL}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parsed["provenance"], "extracted");
    assert_eq!(parsed["cached"], false);
    assert_eq!(parsed["modules"][0]["name"], "Plaits");
    assert_eq!(parsed["modules"][0]["position_x"], 0);

    let rack_id = parsed["rack_id"].as_i64().unwrap();
    let (status, rack) = send(&app, get(&format!("/api/racks/{}", rack_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rack["cached"], true);
    assert_eq!(rack["rack_name"], "Test Rack");

    let (status, racks) = send(&app, get("/api/racks")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(racks.as_array().unwrap().len(), 1);

    // Manual content is never part of the module listing
    let module_id = parsed["modules"][0]["id"].as_i64().unwrap();
    let (status, module) = send(&app, get(&format!("/api/modules/{}", module_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(module["module_type"], "Oscillator");
    assert!(module.get("manual_content").is_none());
}

#[tokio::test]
async fn test_unknown_ids_are_not_found() {
    let (app, _pool) = create_test_app(StubFetcher::new()).await;

    for uri in [
        "/api/racks/42",
        "/api/modules/42",
        "/api/modules/42/manual",
        "/api/modules/42/forum-data",
        "/api/patch-ideas/42",
    ] {
        let (status, body) = send(&app, get(uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    let (status, _) = send(&app, post_json("/api/modules/42/refresh", json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_module_detail_lists_jacks_and_controls() {
    let (app, pool) = create_test_app(StubFetcher::new()).await;
    seed_catalog(&pool).await.unwrap();

    let (status, modules) = send(&app, get("/api/modules")).await;
    assert_eq!(status, StatusCode::OK);
    let maths = modules
        .as_array()
        .unwrap()
        .iter()
        .find(|m| m["name"] == "Maths")
        .unwrap();

    let (status, detail) = send(&app, get(&format!("/api/modules/{}", maths["id"]))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["manufacturer"], "Make Noise");
    assert_eq!(detail["connections"].as_array().unwrap().len(), 8);
    assert!(detail["controls"]
        .as_array()
        .unwrap()
        .iter()
        .any(|c| c["is_attenuverter"] == true));
}

#[tokio::test]
async fn test_manual_endpoint_caches_content() {
    let clouds_manual = "https://mutable-instruments.net/modules/clouds/manual/";
    let fetcher = StubFetcher::new().with_page(
        clouds_manual,
        "<html><body><h1>Clouds</h1><p>Texture synthesizer manual</p></body></html>",
    );
    let (app, pool) = create_test_app(fetcher).await;
    seed_catalog(&pool).await.unwrap();

    let (_, modules) = send(&app, get("/api/modules")).await;
    let clouds = modules
        .as_array()
        .unwrap()
        .iter()
        .find(|m| m["name"] == "Clouds")
        .unwrap();
    let uri = format!("/api/modules/{}/manual", clouds["id"]);

    let (status, manual) = send(&app, get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(manual["manual_url"], clouds_manual);
    assert_eq!(manual["manual_content"], "Clouds Texture synthesizer manual");
    assert_eq!(manual["cached"], false);

    let (_, again) = send(&app, get(&uri)).await;
    assert_eq!(again["cached"], true);

    let (_, forced) = send(&app, get(&format!("{}?force_refresh=true", uri))).await;
    assert_eq!(forced["cached"], false);
}

#[tokio::test]
async fn test_generate_patch_validation() {
    let (app, _pool) = create_test_app(StubFetcher::new()).await;

    let (status, body) = send(&app, post_json("/api/generate-patch", json!({"prompt": "ambient"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "Missing rack_id or modules parameter");

    let (status, body) = send(&app, post_json("/api/generate-patch", json!({"modules": [1]}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "Missing prompt parameter");

    let (status, _) = send(
        &app,
        post_json("/api/generate-patch", json!({"rack_id": 7, "prompt": "ambient"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        post_json("/api/generate-patch", json!({"modules": [], "prompt": "ambient"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_generate_patch_and_list_ideas() {
    let (app, pool) = create_test_app(StubFetcher::new()).await;
    seed_catalog(&pool).await.unwrap();

    let (_, modules) = send(&app, get("/api/modules")).await;
    let refs: Vec<Value> = modules
        .as_array()
        .unwrap()
        .iter()
        .map(|m| json!({"id": m["id"]}))
        .collect();

    let (status, idea) = send(
        &app,
        post_json(
            "/api/generate-patch",
            json!({"modules": refs, "prompt": "kick and snare beat", "complexity": 9}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(idea["patch_type"], "percussion");
    assert_eq!(idea["complexity"], 5);
    assert_eq!(idea["sources"][0]["source_type"], "generated");
    assert!(!idea["connections"].as_array().unwrap().is_empty());

    let (status, listed) = send(&app, get("/api/patch-ideas?patch_type=percussion")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (_, none) = send(&app, get("/api/patch-ideas?patch_type=drone")).await;
    assert!(none.as_array().unwrap().is_empty());

    let (status, detail) = send(&app, get(&format!("/api/patch-ideas/{}", idea["id"]))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["title"], idea["title"]);
}
