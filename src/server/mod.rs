//! HTTP surface of the service.
//!
//! # Endpoints
//!
//! - `POST /webhook` - GitHub deliveries (204 when accepted or filtered, 400 otherwise)
//! - `GET /health` - liveness probe
//! - `GET /status` - configured components and dispatcher state as JSON

use axum::extract::DefaultBodyLimit;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub mod health;
pub mod status;
pub mod webhook;

pub use health::health_handler;
pub use status::status_handler;
pub use webhook::webhook_handler;

use crate::config::Config;
use crate::dispatch::Dispatch;
use crate::pr::RepoRef;
use crate::webhook::SignatureVerifier;

/// GitHub caps webhook payloads at 25 MB.
const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

/// Which optional collaborators have credentials.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ComponentStatus {
    pub github_token: bool,
    pub summarizer: bool,
    pub publisher_sink: bool,
}

impl ComponentStatus {
    pub fn from_config(config: &Config) -> Self {
        Self {
            github_token: config.github_token().is_some(),
            summarizer: config.summarizer_api_key().is_some(),
            publisher_sink: config.publish_sink_url().is_some(),
        }
    }
}

/// Delivery counters since startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WebhookStats {
    pub received: u64,
    pub rejected: u64,
    pub filtered: u64,
    pub dispatched: u64,
}

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    rejected: AtomicU64,
    filtered: AtomicU64,
    dispatched: AtomicU64,
}

/// Shared state handed to every handler through axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    verifier: SignatureVerifier,
    dispatcher: Arc<dyn Dispatch>,
    components: ComponentStatus,
    watched_repo: Option<RepoRef>,
    counters: Counters,
}

impl AppState {
    pub fn new(
        verifier: SignatureVerifier,
        dispatcher: Arc<dyn Dispatch>,
        components: ComponentStatus,
        watched_repo: Option<RepoRef>,
    ) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                verifier,
                dispatcher,
                components,
                watched_repo,
                counters: Counters::default(),
            }),
        }
    }

    pub fn verifier(&self) -> &SignatureVerifier {
        &self.inner.verifier
    }

    pub fn dispatcher(&self) -> &dyn Dispatch {
        self.inner.dispatcher.as_ref()
    }

    pub fn components(&self) -> ComponentStatus {
        self.inner.components
    }

    pub fn watched_repo(&self) -> Option<&RepoRef> {
        self.inner.watched_repo.as_ref()
    }

    pub fn stats(&self) -> WebhookStats {
        let counters = &self.inner.counters;
        WebhookStats {
            received: counters.received.load(Ordering::Relaxed),
            rejected: counters.rejected.load(Ordering::Relaxed),
            filtered: counters.filtered.load(Ordering::Relaxed),
            dispatched: counters.dispatched.load(Ordering::Relaxed),
        }
    }

    fn record_received(&self) {
        self.inner.counters.received.fetch_add(1, Ordering::Relaxed);
    }

    fn record_rejected(&self) {
        self.inner.counters.rejected.fetch_add(1, Ordering::Relaxed);
    }

    fn record_filtered(&self) {
        self.inner.counters.filtered.fetch_add(1, Ordering::Relaxed);
    }

    fn record_dispatched(&self) {
        self.inner.counters.dispatched.fetch_add(1, Ordering::Relaxed);
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/webhook", post(webhook_handler))
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Serve `router` on `listener` until `shutdown` resolves. Open connections
/// are allowed to finish.
pub async fn serve(
    listener: TcpListener,
    router: axum::Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use std::sync::Mutex;
    use std::time::Duration;
    use tower::ServiceExt;

    use crate::dispatch::pipeline::tests::{
        CallLog, GatedFiles, RecordingFiles, RecordingGenerator, RecordingPublisher,
    };
    use crate::dispatch::tests::wait_for;
    use crate::dispatch::{DispatchError, DispatchTask, Dispatcher, DispatcherStatus, Pipeline};
    use crate::pr::PrActivity;
    use crate::summary::{SummaryOrigin, Summarizer};
    use tokio::sync::Semaphore;
    use crate::webhook::payload::tests::pull_request_payload;
    use crate::webhook::signature::expected_signature_header;

    const SECRET: &[u8] = b"test-secret";

    /// Dispatcher that only records what it was given.
    #[derive(Default)]
    struct SpyDispatcher {
        tasks: Mutex<Vec<DispatchTask>>,
        reject: bool,
    }

    impl Dispatch for SpyDispatcher {
        fn dispatch(&self, task: DispatchTask) -> Result<(), DispatchError> {
            if self.reject {
                return Err(DispatchError::QueueFull);
            }
            self.tasks.lock().unwrap().push(task);
            Ok(())
        }

        fn status(&self) -> DispatcherStatus {
            DispatcherStatus {
                accepting: !self.reject,
                completed: self.tasks.lock().unwrap().len() as u64,
                ..DispatcherStatus::default()
            }
        }
    }

    fn test_app(secret: Option<&[u8]>, spy: Arc<SpyDispatcher>) -> (AppState, axum::Router) {
        let state = AppState::new(
            SignatureVerifier::new(secret),
            spy,
            ComponentStatus {
                github_token: true,
                ..ComponentStatus::default()
            },
            Some(RepoRef::new("octo", "widgets")),
        );
        (state.clone(), build_router(state))
    }

    fn webhook_request(
        signing_secret: Option<&[u8]>,
        event: Option<&str>,
        body: Vec<u8>,
    ) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("content-type", "application/json")
            .header("x-github-delivery", "72d3162e-cc78-11e3-81ab-4c9367dc0958");
        if let Some(event) = event {
            builder = builder.header("x-github-event", event);
        }
        if let Some(secret) = signing_secret {
            builder = builder.header(
                "x-hub-signature-256",
                expected_signature_header(secret, &body).unwrap(),
            );
        }
        builder.body(Body::from(body)).unwrap()
    }

    fn pr_body(action: &str) -> Vec<u8> {
        serde_json::to_vec(&pull_request_payload(action, 42, "alice", "Fix bug")).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    // ─── Health and status ───

    #[tokio::test]
    async fn health_returns_200() {
        let (_, app) = test_app(Some(SECRET), Arc::default());
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn status_reports_configuration_and_dispatcher() {
        let (_, app) = test_app(None, Arc::default());
        let request = Request::builder().uri("/status").body(Body::empty()).unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["configured"]["github_token"], true);
        assert_eq!(body["configured"]["summarizer"], false);
        assert_eq!(body["configured"]["signature_verification"], false);
        assert_eq!(body["repository"], "octo/widgets");
        assert_eq!(body["dispatcher"]["accepting"], true);
        assert_eq!(body["webhooks"]["received"], 0);
    }

    // ─── Webhook endpoint ───

    #[tokio::test]
    async fn opened_pull_request_is_dispatched() {
        let spy = Arc::new(SpyDispatcher::default());
        let (state, app) = test_app(Some(SECRET), spy.clone());

        let response = app
            .oneshot(webhook_request(Some(SECRET), Some("pull_request"), pr_body("opened")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let tasks = spy.tasks.lock().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].metadata.number, 42);
        assert_eq!(tasks[0].metadata.author, "alice");
        assert_eq!(tasks[0].repo, RepoRef::new("octo", "widgets"));
        assert_eq!(tasks[0].activity, PrActivity::Opened);
        assert_eq!(
            tasks[0].delivery.as_deref(),
            Some("72d3162e-cc78-11e3-81ab-4c9367dc0958")
        );
        assert_eq!(state.stats().dispatched, 1);
    }

    #[tokio::test]
    async fn invalid_signature_returns_400_without_dispatch() {
        let spy = Arc::new(SpyDispatcher::default());
        let (state, app) = test_app(Some(SECRET), spy.clone());

        let response = app
            .oneshot(webhook_request(
                Some(b"wrong-secret".as_slice()),
                Some("pull_request"),
                pr_body("opened"),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(spy.tasks.lock().unwrap().is_empty());
        assert_eq!(state.stats().rejected, 1);
    }

    #[tokio::test]
    async fn missing_signature_returns_400() {
        let spy = Arc::new(SpyDispatcher::default());
        let (_, app) = test_app(Some(SECRET), spy.clone());

        let response = app
            .oneshot(webhook_request(None, Some("pull_request"), pr_body("opened")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(spy.tasks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn closed_action_returns_204_without_dispatch() {
        let spy = Arc::new(SpyDispatcher::default());
        let (state, app) = test_app(Some(SECRET), spy.clone());

        let response = app
            .oneshot(webhook_request(Some(SECRET), Some("pull_request"), pr_body("closed")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(spy.tasks.lock().unwrap().is_empty());
        assert_eq!(state.stats().filtered, 1);
    }

    #[tokio::test]
    async fn other_event_type_is_filtered() {
        let spy = Arc::new(SpyDispatcher::default());
        let (_, app) = test_app(Some(SECRET), spy.clone());
        let body = serde_json::to_vec(&serde_json::json!({ "zen": "Keep it simple." })).unwrap();

        let response = app
            .oneshot(webhook_request(Some(SECRET), Some("ping"), body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(spy.tasks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_body_returns_400() {
        let spy = Arc::new(SpyDispatcher::default());
        let (_, app) = test_app(Some(SECRET), spy.clone());

        let response = app
            .oneshot(webhook_request(
                Some(SECRET),
                Some("pull_request"),
                b"{not json".to_vec(),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(spy.tasks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_event_header_returns_400() {
        let (_, app) = test_app(Some(SECRET), Arc::default());

        let response = app
            .oneshot(webhook_request(Some(SECRET), None, pr_body("opened")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unsigned_delivery_accepted_when_verification_disabled() {
        let spy = Arc::new(SpyDispatcher::default());
        let (_, app) = test_app(None, spy.clone());

        let response = app
            .oneshot(webhook_request(None, Some("pull_request"), pr_body("synchronize")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let tasks = spy.tasks.lock().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].activity, PrActivity::Synchronized);
    }

    #[tokio::test]
    async fn ready_for_review_is_dispatched_with_its_activity() {
        let spy = Arc::new(SpyDispatcher::default());
        let (_, app) = test_app(Some(SECRET), spy.clone());

        let response = app
            .oneshot(webhook_request(
                Some(SECRET),
                Some("pull_request"),
                pr_body("ready_for_review"),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(spy.tasks.lock().unwrap()[0].activity, PrActivity::ReadyForReview);
    }

    #[tokio::test]
    async fn full_dispatcher_still_returns_204() {
        let spy = Arc::new(SpyDispatcher {
            reject: true,
            ..SpyDispatcher::default()
        });
        let (state, app) = test_app(Some(SECRET), spy);

        let response = app
            .oneshot(webhook_request(Some(SECRET), Some("pull_request"), pr_body("opened")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(state.stats().dispatched, 0);
    }

    // ─── End to end through the real dispatcher ───

    #[tokio::test]
    async fn signed_delivery_runs_pipeline_in_order() {
        let log = CallLog::default();
        let publisher = Arc::new(RecordingPublisher::new(log.clone(), false));
        let pipeline = Arc::new(Pipeline::new(
            Arc::new(RecordingFiles {
                log: log.clone(),
                result: Ok(vec!["src/lib.rs".to_string()]),
            }),
            Arc::new(Summarizer::new(Arc::new(RecordingGenerator {
                log: log.clone(),
                reply: None,
            }))),
            publisher.clone(),
        ));
        let dispatcher = Arc::new(Dispatcher::start(pipeline, 2, 8));
        let state = AppState::new(
            SignatureVerifier::new(Some(SECRET)),
            dispatcher.clone(),
            ComponentStatus::default(),
            None,
        );

        let response = build_router(state)
            .oneshot(webhook_request(Some(SECRET), Some("pull_request"), pr_body("opened")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        dispatcher.shutdown(Duration::from_secs(5)).await;

        assert_eq!(*log.lock().unwrap(), vec!["enrich", "summarize", "publish"]);
        let published = publisher.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        let (summary, _) = &published[0];
        assert_eq!(summary.origin, SummaryOrigin::Fallback);
        assert!(summary.text.contains("alice"));
        assert!(summary.text.contains("#42"));
    }

    #[tokio::test]
    async fn response_is_sent_before_processing_finishes() {
        let gate = Arc::new(Semaphore::new(0));
        let log = CallLog::default();
        let publisher = Arc::new(RecordingPublisher::new(log.clone(), false));
        let pipeline = Arc::new(Pipeline::new(
            Arc::new(GatedFiles { gate: gate.clone() }),
            Arc::new(Summarizer::new(Arc::new(RecordingGenerator {
                log: log.clone(),
                reply: Some("Today alice fixed a bug.".to_string()),
            }))),
            publisher.clone(),
        ));
        let dispatcher = Arc::new(Dispatcher::start(pipeline, 1, 4));
        let state = AppState::new(
            SignatureVerifier::new(Some(SECRET)),
            dispatcher.clone(),
            ComponentStatus::default(),
            None,
        );

        // Enrichment cannot finish until the gate opens, so the 204 has to
        // arrive while the task is still pending.
        let response = build_router(state)
            .oneshot(webhook_request(Some(SECRET), Some("pull_request"), pr_body("opened")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(dispatcher.status().completed, 0);

        wait_for(&dispatcher, |s| s.in_flight == 1).await;
        assert!(publisher.published.lock().unwrap().is_empty());

        gate.add_permits(1);
        wait_for(&dispatcher, |s| s.completed == 1 && s.in_flight == 0).await;
        assert_eq!(*log.lock().unwrap(), vec!["summarize", "publish"]);
        assert_eq!(publisher.published.lock().unwrap().len(), 1);

        dispatcher.shutdown(Duration::from_secs(5)).await;
    }
}
