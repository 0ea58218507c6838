use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{post, put};
use axum::{Json, Router};
use serde_json::{Value, json};

use gambit::registry::Registry;
use gambit::store::Store;

// ── Fake platform ─────────────────────────────────────────────────

#[derive(Clone)]
struct Platform {
    /// (method, path) of every request seen.
    requests: Arc<Mutex<Vec<(String, String)>>>,
    /// Descriptor bodies sent to the registration endpoint.
    descriptors: Arc<Mutex<Vec<Value>>>,
    /// Response body for `POST /external-engine`.
    register_response: Arc<Mutex<Value>>,
    /// When set, `PUT` responds 400 with this body instead of 200.
    update_error: Arc<Mutex<Option<Value>>>,
}

impl Default for Platform {
    fn default() -> Self {
        Self {
            requests: Arc::default(),
            descriptors: Arc::default(),
            register_response: Arc::new(Mutex::new(json!({ "id": "eng-7" }))),
            update_error: Arc::default(),
        }
    }
}

async fn register(State(platform): State<Platform>, Json(body): Json<Value>) -> Json<Value> {
    platform
        .requests
        .lock()
        .unwrap()
        .push(("POST".to_string(), "/external-engine".to_string()));
    platform.descriptors.lock().unwrap().push(body);
    Json(platform.register_response.lock().unwrap().clone())
}

async fn update(
    State(platform): State<Platform>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    platform
        .requests
        .lock()
        .unwrap()
        .push(("PUT".to_string(), format!("/external-engine/{id}")));
    platform.descriptors.lock().unwrap().push(body);
    match platform.update_error.lock().unwrap().clone() {
        Some(error) => (StatusCode::BAD_REQUEST, Json(error)).into_response(),
        None => Json(json!({})).into_response(),
    }
}

async fn serve(platform: Platform) -> String {
    let app = Router::new()
        .route("/external-engine", post(register))
        .route("/external-engine/{id}", put(update))
        .with_state(platform);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn registry(store: Arc<Store>, base: String) -> Registry {
    Registry::new(
        store,
        reqwest::Client::new(),
        base,
        "SECRET-HEX".to_string(),
        "Test Engine".to_string(),
    )
}

// ── Tests ─────────────────────────────────────────────────────────

#[tokio::test]
async fn first_call_registers_second_call_updates() {
    let platform = Platform::default();
    let base = serve(platform.clone()).await;
    let store = Arc::new(Store::open(":memory:").unwrap());
    let registry = registry(store.clone(), base);

    registry.handle_token("Bearer tok").await.unwrap();
    registry.handle_token("Bearer tok").await.unwrap();

    let requests = platform.requests.lock().unwrap().clone();
    assert_eq!(
        requests,
        vec![
            ("POST".to_string(), "/external-engine".to_string()),
            ("PUT".to_string(), "/external-engine/eng-7".to_string()),
        ]
    );
    // the stored identifier is unchanged
    assert_eq!(
        store.get("engine-id:Bearer tok").unwrap().unwrap(),
        "eng-7"
    );
}

#[tokio::test]
async fn descriptor_advertises_capabilities_and_secret() {
    let platform = Platform::default();
    let base = serve(platform.clone()).await;
    let store = Arc::new(Store::open(":memory:").unwrap());
    let registry = registry(store, base);

    registry.handle_token("Bearer tok").await.unwrap();

    let descriptor = platform.descriptors.lock().unwrap()[0].clone();
    assert_eq!(descriptor["name"], "Test Engine");
    assert_eq!(descriptor["providerSecret"], "SECRET-HEX");
    assert_eq!(descriptor["variants"], json!(["chess"]));
    assert_eq!(descriptor["maxHash"], 1024);
    assert!(descriptor["maxThreads"].as_u64().unwrap() >= 1);
    assert_eq!(descriptor["defaultDepth"], 6);
}

#[tokio::test]
async fn no_such_token_purges_the_stored_mapping() {
    let platform = Platform::default();
    *platform.update_error.lock().unwrap() = Some(json!({ "error": "No such token" }));
    let base = serve(platform.clone()).await;

    let store = Arc::new(Store::open(":memory:").unwrap());
    store.set("engine-id:Bearer dead", "eng-9").unwrap();
    let registry = registry(store.clone(), base);

    registry.handle_token("Bearer dead").await.unwrap();

    assert!(store.get("engine-id:Bearer dead").unwrap().is_none());
    let requests = platform.requests.lock().unwrap().clone();
    assert_eq!(
        requests,
        vec![("PUT".to_string(), "/external-engine/eng-9".to_string())]
    );
}

#[tokio::test]
async fn other_update_errors_keep_the_mapping() {
    let platform = Platform::default();
    *platform.update_error.lock().unwrap() = Some(json!({ "error": "overloaded" }));
    let base = serve(platform.clone()).await;

    let store = Arc::new(Store::open(":memory:").unwrap());
    store.set("engine-id:Bearer tok", "eng-9").unwrap();
    let registry = registry(store.clone(), base);

    assert!(registry.handle_token("Bearer tok").await.is_err());
    assert_eq!(
        store.get("engine-id:Bearer tok").unwrap().unwrap(),
        "eng-9"
    );
}

#[tokio::test]
async fn registration_without_an_id_stores_nothing() {
    let platform = Platform::default();
    *platform.register_response.lock().unwrap() = json!({});
    let base = serve(platform.clone()).await;

    let store = Arc::new(Store::open(":memory:").unwrap());
    let registry = registry(store.clone(), base);

    assert!(registry.handle_token("Bearer tok").await.is_err());
    assert!(store.list("engine-id:").unwrap().is_empty());
}

#[tokio::test]
async fn unreachable_platform_is_an_error() {
    let store = Arc::new(Store::open(":memory:").unwrap());
    let registry = registry(store.clone(), "http://127.0.0.1:9".to_string());

    assert!(registry.handle_token("Bearer tok").await.is_err());
    assert!(store.list("engine-id:").unwrap().is_empty());
}
