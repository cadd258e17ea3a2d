//! Integration test driving the façade end-to-end through an in-memory
//! store, grounded in the host codebase's `actix_web::test::init_service`
//! style (see `batata-server`'s `v1_auth_tests.rs`).

use std::sync::Arc;

use actix_web::{test, web, App};
use arbiterlock_engine::{EngineConfig, LockEngine};
use arbiterlock_server::routes;
use arbiterlock_server::state::AppState;
use arbiterlock_store::memory::InMemoryStore;
use arbiterlock_store::AtomicStore;

fn app_state() -> AppState {
    let store: Arc<dyn AtomicStore> = Arc::new(InMemoryStore::new());
    let engine = Arc::new(LockEngine::new(store, EngineConfig::default()));
    AppState { engine }
}

#[actix_web::test]
async fn acquire_then_release_round_trips_through_http() {
    let state = app_state();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(routes::configure),
    )
    .await;

    let acquire_req = test::TestRequest::post()
        .uri("/v1/locks/acquire")
        .set_json(serde_json::json!({
            "resource_type": "customer",
            "resource_id": "42",
            "agent_id": "svc-a",
            "priority": 0,
            "ttl": 60,
            "reentrant": false,
        }))
        .to_request();
    let acquired: serde_json::Value = test::call_and_read_body_json(&app, acquire_req).await;
    assert_eq!(acquired["status"], "acquired");
    let lock_id = acquired["lock_id"].as_str().unwrap().to_string();

    let status_req = test::TestRequest::get()
        .uri(&format!("/v1/locks/{lock_id}/status"))
        .to_request();
    let status: serde_json::Value = test::call_and_read_body_json(&app, status_req).await;
    assert_eq!(status["status"], "active");
    assert_eq!(status["agent_id"], "svc-a");

    let release_req = test::TestRequest::post()
        .uri("/v1/locks/release")
        .set_json(serde_json::json!({
            "lock_id": lock_id,
            "agent_id": "svc-a",
            "idempotent": false,
        }))
        .to_request();
    let released: serde_json::Value = test::call_and_read_body_json(&app, release_req).await;
    assert_eq!(released["status"], "released");
    assert!(released["next_agent"].is_null());

    let status_req = test::TestRequest::get()
        .uri(&format!("/v1/locks/{lock_id}/status"))
        .to_request();
    let status: serde_json::Value = test::call_and_read_body_json(&app, status_req).await;
    assert_eq!(status["status"], "expired");
}

#[actix_web::test]
async fn acquiring_an_already_owned_resource_non_reentrant_returns_200_with_an_error_body() {
    let state = app_state();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(routes::configure),
    )
    .await;

    let body = serde_json::json!({
        "resource_type": "customer",
        "resource_id": "7",
        "agent_id": "svc-a",
        "priority": 0,
        "ttl": 60,
        "reentrant": false,
    });

    let first = test::TestRequest::post()
        .uri("/v1/locks/acquire")
        .set_json(&body)
        .to_request();
    test::call_service(&app, first).await;

    let second = test::TestRequest::post()
        .uri("/v1/locks/acquire")
        .set_json(&body)
        .to_request();
    let resp = test::call_service(&app, second).await;
    assert_eq!(resp.status(), actix_web::http::StatusCode::OK);

    let parsed: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(parsed["status"], "error");
    assert_eq!(parsed["code"], "already_owned_not_reentrant");
}

#[actix_web::test]
async fn health_endpoint_reports_healthy() {
    let state = app_state();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(routes::configure),
    )
    .await;

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp["status"], "healthy");
}
