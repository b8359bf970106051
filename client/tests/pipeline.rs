use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use client::{
    auth_repository::AuthRepository,
    config::ClientConfig,
    pipeline::{ApiRequest, AuthEvent, AuthPipeline},
    reissue::HttpReissueEndpoint,
    running_repository::HttpPersistenceSink,
    token_store::{MemoryTokenStore, TokenStore},
    AuthError, PipelineError,
};
use futures::future::join_all;
use parking_lot::Mutex;
use run_tracker_lib::{
    auth::{ReissueRequest, SignInRequest, TokenPair, TokenResponse, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY},
    coordinate::Coordinate,
    run_record::RunRecord,
};
use run_tracker_session::sink::PersistenceSink;
use tokio::sync::Notify;

const VALID_ACCESS: &str = "access-2";
const EXPIRED_ACCESS: &str = "access-1";
const REFRESH: &str = "refresh-1";

struct MockServer {
    reissue_ok: bool,
    reissue_delay: Duration,
    reissue_calls: AtomicUsize,
    protected_calls: AtomicUsize,
    runs: Mutex<Vec<RunRecord>>,
    // The first call to /slow-whoami is held until `release` fires.
    held: AtomicBool,
    arrived: Notify,
    release: Notify,
}

impl MockServer {
    fn new(reissue_ok: bool, reissue_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            reissue_ok,
            reissue_delay,
            reissue_calls: AtomicUsize::new(0),
            protected_calls: AtomicUsize::new(0),
            runs: Mutex::new(Vec::new()),
            held: AtomicBool::new(false),
            arrived: Notify::new(),
            release: Notify::new(),
        })
    }

    fn reissues(&self) -> usize {
        self.reissue_calls.load(Ordering::SeqCst)
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        self.protected_calls.fetch_add(1, Ordering::SeqCst);
        headers.get("authorization").and_then(|value| value.to_str().ok()) == Some("Bearer access-2")
    }
}

async fn whoami(State(server): State<Arc<MockServer>>, headers: HeaderMap) -> Response {
    if !server.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    "runner".into_response()
}

async fn slow_whoami(State(server): State<Arc<MockServer>>, headers: HeaderMap) -> Response {
    let authorized = server.authorized(&headers);
    if !server.held.swap(true, Ordering::SeqCst) {
        server.arrived.notify_one();
        server.release.notified().await;
    }

    if !authorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    "runner".into_response()
}

async fn save_run(State(server): State<Arc<MockServer>>, headers: HeaderMap, Json(record): Json<RunRecord>) -> Response {
    if !server.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    server.runs.lock().push(record);
    StatusCode::CREATED.into_response()
}

async fn reissue(State(server): State<Arc<MockServer>>, Json(request): Json<ReissueRequest>) -> Response {
    server.reissue_calls.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(server.reissue_delay).await;

    if !server.reissue_ok || request.refresh != REFRESH {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(TokenResponse {
        data: TokenPair {
            access: VALID_ACCESS.into(),
            refresh: "refresh-2".into(),
        },
    })
    .into_response()
}

async fn sign_in(Json(request): Json<SignInRequest>) -> Response {
    if request.email != "test@example.com" || request.password != "password" {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(TokenResponse {
        data: TokenPair {
            access: VALID_ACCESS.into(),
            refresh: REFRESH.into(),
        },
    })
    .into_response()
}

async fn serve(server: Arc<MockServer>) -> ClientConfig {
    let app = Router::new()
        .route("/whoami", get(whoami))
        .route("/slow-whoami", get(slow_whoami))
        .route("/running", post(save_run))
        .route("/auth/reissue", post(reissue))
        .route("/auth/sign-in", post(sign_in))
        .with_state(server);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    ClientConfig::new(format!("http://{addr}"))
}

fn pipeline(config: &ClientConfig, tokens: Arc<dyn TokenStore>) -> AuthPipeline {
    let http = reqwest::Client::new();
    let reissuer = Arc::new(HttpReissueEndpoint::new(http.clone(), config));
    AuthPipeline::new(http, config, tokens, reissuer)
}

fn tokens(access: &str) -> Arc<MemoryTokenStore> {
    Arc::new(MemoryTokenStore::with_pair(&TokenPair {
        access: access.into(),
        refresh: REFRESH.into(),
    }))
}

#[tokio::test]
async fn valid_token_is_sent_as_bearer() {
    let server = MockServer::new(true, Duration::ZERO);
    let config = serve(server.clone()).await;
    let pipeline = pipeline(&config, tokens(VALID_ACCESS));

    let response = pipeline.send(ApiRequest::get("/whoami")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "runner");
    assert_eq!(server.reissues(), 0);
}

#[tokio::test]
async fn missing_access_token_is_not_sent() {
    let server = MockServer::new(true, Duration::ZERO);
    let config = serve(server.clone()).await;
    let pipeline = pipeline(&config, Arc::new(MemoryTokenStore::new()));
    let mut events = pipeline.events();

    let err = pipeline.send(ApiRequest::get("/whoami")).await.unwrap_err();

    assert!(matches!(err, PipelineError::Unauthenticated));
    assert_eq!(events.try_recv().unwrap(), AuthEvent::SignInRequired);
    assert_eq!(server.protected_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn other_statuses_pass_through() {
    let server = MockServer::new(true, Duration::ZERO);
    let config = serve(server.clone()).await;
    let pipeline = pipeline(&config, tokens(EXPIRED_ACCESS));

    let response = pipeline.send(ApiRequest::get("/nowhere")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(server.reissues(), 0);
}

#[tokio::test]
async fn unauthorized_without_refresh_token_passes_through() {
    let server = MockServer::new(true, Duration::ZERO);
    let config = serve(server.clone()).await;
    let store = Arc::new(MemoryTokenStore::new());
    store.set(ACCESS_TOKEN_KEY, EXPIRED_ACCESS).await;
    let pipeline = pipeline(&config, store);

    let response = pipeline.send(ApiRequest::get("/whoami")).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(server.reissues(), 0);
}

#[tokio::test]
async fn expired_token_is_refreshed_and_request_replayed() {
    let server = MockServer::new(true, Duration::ZERO);
    let config = serve(server.clone()).await;
    let store = tokens(EXPIRED_ACCESS);
    let pipeline = pipeline(&config, store.clone());

    let response = pipeline.send(ApiRequest::get("/whoami")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(server.reissues(), 1);
    assert_eq!(store.get(ACCESS_TOKEN_KEY).await.as_deref(), Some(VALID_ACCESS));
    assert_eq!(store.get(REFRESH_TOKEN_KEY).await.as_deref(), Some("refresh-2"));
}

#[tokio::test]
async fn concurrent_unauthorized_requests_share_one_refresh() {
    let server = MockServer::new(true, Duration::from_millis(200));
    let config = serve(server.clone()).await;
    let pipeline = pipeline(&config, tokens(EXPIRED_ACCESS));

    let requests = (0..8).map(|_| pipeline.send(ApiRequest::get("/whoami")));
    let responses = join_all(requests).await;

    assert_eq!(server.reissues(), 1);
    for response in responses {
        assert_eq!(response.unwrap().status(), StatusCode::OK);
    }
    assert_eq!(pipeline.queued(), 0);
}

#[tokio::test]
async fn failed_refresh_expires_every_waiting_request() {
    let server = MockServer::new(false, Duration::from_millis(200));
    let config = serve(server.clone()).await;
    let store = tokens(EXPIRED_ACCESS);
    let pipeline = pipeline(&config, store.clone());
    let mut events = pipeline.events();

    let requests = (0..5).map(|_| pipeline.send(ApiRequest::get("/whoami")));
    let responses = join_all(requests).await;

    assert_eq!(server.reissues(), 1);
    for response in responses {
        assert!(matches!(response, Err(PipelineError::SessionExpired)));
    }
    assert_eq!(store.get(ACCESS_TOKEN_KEY).await, None);
    assert_eq!(store.get(REFRESH_TOKEN_KEY).await, None);
    assert_eq!(events.try_recv().unwrap(), AuthEvent::SessionExpired);
}

#[tokio::test]
async fn late_unauthorized_response_replays_with_the_refreshed_token() {
    let server = MockServer::new(true, Duration::ZERO);
    let config = serve(server.clone()).await;
    let pipeline = pipeline(&config, tokens(EXPIRED_ACCESS));

    let late = tokio::spawn({
        let pipeline = pipeline.clone();
        async move { pipeline.send(ApiRequest::get("/slow-whoami")).await }
    });
    server.arrived.notified().await;

    let response = pipeline.send(ApiRequest::get("/whoami")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(server.reissues(), 1);

    server.release.notify_one();
    let response = late.await.unwrap().unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "runner");
    assert_eq!(server.reissues(), 1);
}

#[tokio::test]
async fn late_unauthorized_response_after_failed_refresh_is_expired() {
    let server = MockServer::new(false, Duration::ZERO);
    let config = serve(server.clone()).await;
    let store = tokens(EXPIRED_ACCESS);
    let pipeline = pipeline(&config, store.clone());

    let late = tokio::spawn({
        let pipeline = pipeline.clone();
        async move { pipeline.send(ApiRequest::get("/slow-whoami")).await }
    });
    server.arrived.notified().await;

    let err = pipeline.send(ApiRequest::get("/whoami")).await.unwrap_err();
    assert!(matches!(err, PipelineError::SessionExpired));
    assert_eq!(store.get(REFRESH_TOKEN_KEY).await, None);

    server.release.notify_one();
    let err = late.await.unwrap().unwrap_err();
    assert!(matches!(err, PipelineError::SessionExpired));
    assert_eq!(server.reissues(), 1);
}

#[tokio::test]
async fn queued_request_times_out_without_stopping_the_refresh() {
    let server = MockServer::new(true, Duration::from_millis(500));
    let mut config = serve(server.clone()).await;
    config.refresh_timeout = Duration::from_millis(100);
    let pipeline = pipeline(&config, tokens(EXPIRED_ACCESS));

    let leader = tokio::spawn({
        let pipeline = pipeline.clone();
        async move { pipeline.send(ApiRequest::get("/whoami")).await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let queued = pipeline.send(ApiRequest::get("/whoami")).await;
    assert!(matches!(queued, Err(PipelineError::RefreshTimeout)));
    assert_eq!(pipeline.queued(), 0);

    let response = leader.await.unwrap().unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(server.reissues(), 1);
}

#[tokio::test]
async fn abandoned_request_leaves_the_queue() {
    let server = MockServer::new(true, Duration::from_millis(300));
    let config = serve(server.clone()).await;
    let pipeline = pipeline(&config, tokens(EXPIRED_ACCESS));

    let leader = tokio::spawn({
        let pipeline = pipeline.clone();
        async move { pipeline.send(ApiRequest::get("/whoami")).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let abandoned = tokio::spawn({
        let pipeline = pipeline.clone();
        async move { pipeline.send(ApiRequest::get("/whoami")).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pipeline.queued(), 1);

    abandoned.abort();
    assert!(abandoned.await.unwrap_err().is_cancelled());
    assert_eq!(pipeline.queued(), 0);

    let response = leader.await.unwrap().unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(server.reissues(), 1);
}

#[tokio::test]
async fn pipelines_do_not_share_refresh_state() {
    let server = MockServer::new(true, Duration::from_millis(100));
    let config = serve(server.clone()).await;
    let first = pipeline(&config, tokens(EXPIRED_ACCESS));
    let second = pipeline(&config, tokens(EXPIRED_ACCESS));

    let (a, b) = tokio::join!(first.send(ApiRequest::get("/whoami")), second.send(ApiRequest::get("/whoami")));

    assert_eq!(a.unwrap().status(), StatusCode::OK);
    assert_eq!(b.unwrap().status(), StatusCode::OK);
    assert_eq!(server.reissues(), 2);
}

#[tokio::test]
async fn sign_in_stores_the_token_pair() {
    let server = MockServer::new(true, Duration::ZERO);
    let config = serve(server.clone()).await;
    let store = Arc::new(MemoryTokenStore::new());
    let auth = AuthRepository::new(reqwest::Client::new(), &config, store.clone());

    let err = auth.sign_in("test@example.com", "wrong").await.unwrap_err();
    assert!(matches!(err, AuthError::Rejected(status) if status == StatusCode::UNAUTHORIZED));
    assert_eq!(store.get(ACCESS_TOKEN_KEY).await, None);

    auth.sign_in("test@example.com", "password").await.unwrap();
    assert_eq!(store.get(ACCESS_TOKEN_KEY).await.as_deref(), Some(VALID_ACCESS));
    assert_eq!(store.get(REFRESH_TOKEN_KEY).await.as_deref(), Some(REFRESH));

    auth.sign_out().await;
    assert_eq!(store.get(ACCESS_TOKEN_KEY).await, None);
}

#[tokio::test]
async fn runs_are_saved_through_the_pipeline() {
    let server = MockServer::new(true, Duration::ZERO);
    let config = serve(server.clone()).await;
    let sink = HttpPersistenceSink::new(pipeline(&config, tokens(EXPIRED_ACCESS)), config.running_path.clone());

    let record = RunRecord::new(
        "Morning".into(),
        70.,
        1,
        70.,
        vec![Coordinate::new(35.8776, 128.6284), Coordinate::new(35.8780, 128.6290)],
        Utc::now(),
    );
    sink.save(&record).await.unwrap();

    assert_eq!(server.reissues(), 1);
    assert_eq!(server.runs.lock().as_slice(), &[record]);
}
