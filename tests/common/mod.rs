//! Common test utilities.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{NaiveDate, NaiveDateTime};
use http_body_util::BodyExt;
use tower::ServiceExt;

use strobe::clock::ManualClock;
use strobe::dispatch::Dispatcher;
use strobe::scheduler::{Engine, EngineConfig};
use strobe::server::{build_app, AppState};
use strobe::store::Store;

/// Fixed test epoch.
pub fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 5, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// Fresh migrated in-memory store.
pub async fn test_store() -> Store {
    let store = Store::open_in_memory().await.unwrap();
    store.migrate().await.unwrap();
    store
}

/// Router + store + clock wired together over in-memory SQLite.
pub struct TestApp {
    pub app: Router,
    pub store: Store,
    pub clock: ManualClock,
}

pub async fn test_app() -> TestApp {
    let store = test_store().await;
    let clock = ManualClock::new(t0());
    let app = build_app(
        AppState {
            store: store.clone(),
            clock: Arc::new(clock.clone()),
        },
        30,
    );
    TestApp { app, store, clock }
}

/// Engine over the same store/clock, driven by explicit `tick()` calls.
pub fn test_engine(store: Store, clock: ManualClock) -> Engine {
    Engine::new(
        store,
        Dispatcher::new(1024 * 1024),
        Arc::new(clock),
        EngineConfig::default(),
    )
}

/// Drive one request through the router and decode the JSON body (if any).
pub async fn request(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            builder.body(Body::from(json.to_string())).unwrap()
        }
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}
