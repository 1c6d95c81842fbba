//! In-process mock of the API used by the integration tests.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use sessionward::auth::{
    AuthSession, CredentialBackend, MemoryBackend, StoreError, TokenRefresher,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub enum RefreshPlan {
    Issue {
        access_token: String,
        refresh_token: Option<String>,
    },
    Reject(StatusCode),
    /// 200 with a body that is not JSON.
    Garbled,
}

impl RefreshPlan {
    pub fn issue(access_token: &str, refresh_token: &str) -> Self {
        RefreshPlan::Issue {
            access_token: access_token.to_string(),
            refresh_token: Some(refresh_token.to_string()),
        }
    }
}

pub struct MockState {
    valid_token: Mutex<String>,
    refresh_plan: Mutex<RefreshPlan>,
    /// While set, `/refresh` waits for [`MockState::release_refresh`].
    hold_refresh: AtomicBool,
    refresh_release: Notify,
    always_unauthorized: AtomicBool,
    pub refresh_calls: AtomicUsize,
    pub data_calls: AtomicUsize,
    pub refresh_bodies: Mutex<Vec<Value>>,
    pub login_bodies: Mutex<Vec<Value>>,
    pub seen_authorization: Mutex<Vec<String>>,
}

impl MockState {
    pub fn set_valid_token(&self, token: &str) {
        *self.valid_token.lock().expect("lock") = token.to_string();
    }

    pub fn set_refresh_plan(&self, plan: RefreshPlan) {
        *self.refresh_plan.lock().expect("lock") = plan;
    }

    pub fn hold_refresh(&self) {
        self.hold_refresh.store(true, Ordering::SeqCst);
    }

    /// Lets one held `/refresh` answer. A release that arrives before the
    /// call is kept for it.
    pub fn release_refresh(&self) {
        self.refresh_release.notify_one();
    }

    pub fn reject_every_token(&self) {
        self.always_unauthorized.store(true, Ordering::SeqCst);
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn data_calls(&self) -> usize {
        self.data_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_tokens_sent(&self) -> Vec<String> {
        self.refresh_bodies
            .lock()
            .expect("lock")
            .iter()
            .map(|body| body["refresh_token"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub fn seen_authorization(&self) -> Vec<String> {
        self.seen_authorization.lock().expect("lock").clone()
    }
}

pub struct MockApi {
    pub base_url: String,
    pub state: Arc<MockState>,
}

impl MockApi {
    pub async fn start() -> Self {
        let state = Arc::new(MockState {
            valid_token: Mutex::new("A1".to_string()),
            refresh_plan: Mutex::new(RefreshPlan::issue("A2", "R2")),
            hold_refresh: AtomicBool::new(false),
            refresh_release: Notify::new(),
            always_unauthorized: AtomicBool::new(false),
            refresh_calls: AtomicUsize::new(0),
            data_calls: AtomicUsize::new(0),
            refresh_bodies: Mutex::new(Vec::new()),
            login_bodies: Mutex::new(Vec::new()),
            seen_authorization: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/api/login", post(login))
            .route("/api/refresh", post(refresh))
            .route("/api/data", get(data))
            .route("/api/broken", get(broken))
            .route("/api/teapot", get(teapot))
            .route("/api/upload", post(upload))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let addr = listener.local_addr().expect("local addr should resolve");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock server failed");
        });

        Self {
            base_url: format!("http://{addr}/api/"),
            state,
        }
    }

    pub fn session(&self) -> AuthSession {
        self.session_with(Box::new(MemoryBackend::new()))
    }

    pub fn session_with(&self, backend: Box<dyn CredentialBackend>) -> AuthSession {
        AuthSession::from_parts(client(), &self.base_url, backend)
    }

    pub fn session_with_refresher(
        &self,
        backend: Box<dyn CredentialBackend>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> AuthSession {
        AuthSession::with_refresher(client(), &self.base_url, backend, refresher)
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("client should build")
}

/// An API root on a local port nothing listens on.
pub fn unreachable_base_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("listener should bind");
    let addr = listener.local_addr().expect("local addr should resolve");
    drop(listener);
    format!("http://{addr}/api/")
}

/// Resolves once `count` callers are waiting on the session's in-flight
/// refresh.
pub async fn refresh_joined_by(session: &AuthSession, count: usize) {
    let coordinator = session.dispatcher().coordinator();
    for _ in 0..2_000 {
        if coordinator.waiters() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!(
        "expected {count} callers on the refresh, saw {}",
        coordinator.waiters()
    );
}

/// Memory backend that counts writes.
pub struct CountingBackend {
    inner: MemoryBackend,
    writes: Arc<AtomicUsize>,
}

impl CountingBackend {
    pub fn new(writes: Arc<AtomicUsize>) -> Self {
        Self {
            inner: MemoryBackend::new(),
            writes,
        }
    }
}

impl CredentialBackend for CountingBackend {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.read(key)
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.inner.remove(key)
    }
}

async fn login(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    state.login_bodies.lock().expect("lock").push(body.clone());
    let username = body["username"].as_str().unwrap_or_default();
    let password = body["password_encrypted"].as_str().unwrap_or_default();

    match (username, password) {
        ("alice", "X") => Json(json!({"access_token": "A1", "refresh_token": "R1"})).into_response(),
        ("tokenless", _) => Json(json!({})).into_response(),
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "invalid credentials"})),
        )
            .into_response(),
    }
}

async fn refresh(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);
    state.refresh_bodies.lock().expect("lock").push(body);

    if state.hold_refresh.load(Ordering::SeqCst) {
        state.refresh_release.notified().await;
    }

    let plan = state.refresh_plan.lock().expect("lock");
    match &*plan {
        RefreshPlan::Issue {
            access_token,
            refresh_token,
        } => {
            state.set_valid_token(access_token);
            let mut body = json!({"access_token": access_token});
            if let Some(refresh_token) = refresh_token {
                body["refresh_token"] = json!(refresh_token);
            }
            Json(body).into_response()
        }
        RefreshPlan::Reject(status) => {
            (*status, Json(json!({"detail": "refresh token revoked"}))).into_response()
        }
        RefreshPlan::Garbled => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/html")],
            "<html>maintenance</html>",
        )
            .into_response(),
    }
}

async fn data(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    state.data_calls.fetch_add(1, Ordering::SeqCst);
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    state
        .seen_authorization
        .lock()
        .expect("lock")
        .push(authorization.clone());

    let expected = format!("Bearer {}", state.valid_token.lock().expect("lock"));
    if state.always_unauthorized.load(Ordering::SeqCst) || authorization != expected {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "token expired"})),
        )
            .into_response();
    }

    Json(json!({"ok": true, "authorization": authorization})).into_response()
}

async fn broken() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"detail": "database unavailable"})),
    )
        .into_response()
}

async fn teapot() -> Response {
    (StatusCode::IM_A_TEAPOT, "short and stout").into_response()
}

async fn upload(headers: HeaderMap, body: Bytes) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    Json(json!({"content_type": content_type, "len": body.len()})).into_response()
}
