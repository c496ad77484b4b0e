//! Integration tests for the auth flow against an in-process stub backend:
//! login persistence, the 401 refresh-and-retry path, and the single-flight
//! guarantee under concurrent requests.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde_json::{Value, json};
use url::Url;

use flux_client::{ApiClient, ApiError, ClientConfig, CredentialStore, Credentials, MemoryCredentialStore};

struct StubBackend {
    valid_access: Mutex<String>,
    valid_refresh: Mutex<String>,
    refresh_calls: AtomicUsize,
    refresh_fails: AtomicBool,
}

impl StubBackend {
    fn new(access: &str, refresh: &str) -> Arc<Self> {
        Arc::new(Self {
            valid_access: Mutex::new(access.to_string()),
            valid_refresh: Mutex::new(refresh.to_string()),
            refresh_calls: AtomicUsize::new(0),
            refresh_fails: AtomicBool::new(false),
        })
    }

    fn token_pair(access: &str, refresh: &str) -> Value {
        json!({
            "access_token": access,
            "refresh_token": refresh,
            "token_type": "bearer",
        })
    }

    fn user() -> Value {
        json!({
            "id": 1,
            "username": "ada",
            "email": "ada@example.com",
            "is_active": true,
            "role": "member",
        })
    }
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

async fn token_route(
    State(stub): State<Arc<StubBackend>>,
    Form(params): Form<HashMap<String, String>>,
) -> impl IntoResponse {
    if params.get("username").map(String::as_str) == Some("ada")
        && params.get("password").map(String::as_str) == Some("hunter22")
    {
        let access = stub.valid_access.lock().unwrap().clone();
        let refresh = stub.valid_refresh.lock().unwrap().clone();
        (StatusCode::OK, Json(StubBackend::token_pair(&access, &refresh)))
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Incorrect username or password"})),
        )
    }
}

async fn refresh_route(
    State(stub): State<Arc<StubBackend>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    stub.refresh_calls.fetch_add(1, Ordering::SeqCst);

    // Widen the race window so concurrent 401 discoveries pile up on the
    // client-side gate while this refresh is in flight.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let presented = body.get("refresh_token").and_then(Value::as_str);
    let expected = stub.valid_refresh.lock().unwrap().clone();

    if stub.refresh_fails.load(Ordering::SeqCst) || presented != Some(expected.as_str()) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Invalid refresh token"})),
        );
    }

    let new_access = format!("{expected}-rotated-access");
    let new_refresh = format!("{expected}-rotated");
    *stub.valid_access.lock().unwrap() = new_access.clone();
    *stub.valid_refresh.lock().unwrap() = new_refresh.clone();
    (
        StatusCode::OK,
        Json(StubBackend::token_pair(&new_access, &new_refresh)),
    )
}

async fn me_route(State(stub): State<Arc<StubBackend>>, headers: HeaderMap) -> impl IntoResponse {
    let valid = stub.valid_access.lock().unwrap().clone();
    match bearer(&headers) {
        Some(token) if token == valid => (StatusCode::OK, Json(StubBackend::user())),
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Could not validate credentials"})),
        ),
    }
}

async fn logout_route() -> impl IntoResponse {
    Json(json!({"message": "Successfully logged out"}))
}

async fn spawn_backend(stub: Arc<StubBackend>) -> SocketAddr {
    let app = Router::new()
        .route("/users/token", post(token_route))
        .route("/users/refresh", post(refresh_route))
        .route("/users/me", get(me_route))
        .route("/users/logout", post(logout_route))
        .with_state(stub);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn client_for(addr: SocketAddr, store: Arc<dyn CredentialStore>) -> ApiClient {
    let config = ClientConfig::new(Url::parse(&format!("http://{addr}")).unwrap());
    ApiClient::new(config, store)
}

fn expired_store() -> Arc<MemoryCredentialStore> {
    Arc::new(MemoryCredentialStore::with_credentials(Credentials {
        access_token: "expired-access".into(),
        refresh_token: "valid-refresh".into(),
    }))
}

#[tokio::test]
async fn login_stores_tokens_and_me_succeeds() {
    let stub = StubBackend::new("access-1", "refresh-1");
    let addr = spawn_backend(stub).await;

    let store = Arc::new(MemoryCredentialStore::new());
    let client = client_for(addr, store.clone());

    client.login("ada", "hunter22").await.unwrap();
    let creds = store.load().unwrap();
    assert_eq!(creds.access_token, "access-1");
    assert_eq!(creds.refresh_token, "refresh-1");

    let user = client.current_user().await.unwrap();
    assert_eq!(user.username, "ada");
}

#[tokio::test]
async fn failed_login_stores_nothing() {
    let stub = StubBackend::new("access-1", "refresh-1");
    let addr = spawn_backend(stub).await;

    let store = Arc::new(MemoryCredentialStore::new());
    let client = client_for(addr, store.clone());

    let err = client.login("ada", "wrong").await.unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert!(store.load().is_none());

    // Still logged out: authenticated calls refuse to go to the wire.
    assert!(matches!(
        client.current_user().await,
        Err(ApiError::Unauthorized)
    ));
}

#[tokio::test]
async fn expired_token_refreshes_and_retries_once() {
    let stub = StubBackend::new("valid-refresh-rotated-access", "valid-refresh");
    // The stub's valid access token is what a successful refresh produces,
    // so the first /users/me (with the expired token) 401s and the retry
    // succeeds.
    let addr = spawn_backend(stub.clone()).await;

    let store = expired_store();
    let client = client_for(addr, store.clone());

    let user = client.current_user().await.unwrap();
    assert_eq!(user.username, "ada");
    assert_eq!(stub.refresh_calls.load(Ordering::SeqCst), 1);

    // The rotated pair replaced the expired one.
    let creds = store.load().unwrap();
    assert_eq!(creds.access_token, "valid-refresh-rotated-access");
    assert_eq!(creds.refresh_token, "valid-refresh-rotated");
}

#[tokio::test]
async fn concurrent_requests_trigger_one_backend_refresh() {
    let stub = StubBackend::new("valid-refresh-rotated-access", "valid-refresh");
    let addr = spawn_backend(stub.clone()).await;

    let store = expired_store();
    let client = client_for(addr, store);

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move { client.current_user().await }));
    }
    for task in tasks {
        let user = task.await.unwrap().unwrap();
        assert_eq!(user.username, "ada");
    }

    assert_eq!(stub.refresh_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rejected_refresh_clears_credentials() {
    let stub = StubBackend::new("some-other-access", "valid-refresh");
    stub.refresh_fails.store(true, Ordering::SeqCst);
    let addr = spawn_backend(stub.clone()).await;

    let store = expired_store();
    let client = client_for(addr, store.clone());

    let err = client.current_user().await.unwrap_err();
    assert!(matches!(err, ApiError::SessionExpired));
    assert!(store.load().is_none(), "no stale credentials may survive");
}

#[tokio::test]
async fn logout_clears_store_even_if_backend_unreachable() {
    // Point at a port nothing listens on: the logout notification fails
    // but the local session still ends.
    let store = expired_store();
    let config = ClientConfig::new(Url::parse("http://127.0.0.1:1").unwrap());
    let client = ApiClient::new(config, store.clone());

    client.logout().await.unwrap();
    assert!(store.load().is_none());
}
