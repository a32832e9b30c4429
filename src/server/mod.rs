//! HTTP surface of the synchronization engine.
//!
//! # Endpoints
//!
//! - `POST /webhook` - Discourse webhook deliveries
//! - `GET /api/v1/posts/{id}` - Stored sync state of a post
//! - `POST /api/v1/posts/{id}/publish` - Create or update the post's topic
//! - `POST /api/v1/posts/{id}/refresh` - Refresh cached replies if due
//! - `GET /health` - Returns 200 if server is running

use std::sync::Arc;

use tower_http::trace::TraceLayer;

use crate::discourse::RemoteClient;
use crate::publish::PublishCoordinator;
use crate::refresh::PullRefreshCache;
use crate::store::PostStore;
use crate::webhook::WebhookReceiver;

pub mod error;
pub mod health;
pub mod posts;
pub mod webhook;

pub use error::ApiError;
pub use health::health_handler;
pub use posts::{post_handler, publish_handler, refresh_handler};
pub use webhook::webhook_handler;

/// Shared application state, handed to every handler through axum's `State`
/// extractor.
pub struct AppState<C> {
    inner: Arc<AppStateInner<C>>,
}

struct AppStateInner<C> {
    store: Arc<dyn PostStore>,
    publisher: PublishCoordinator<C>,
    refresher: PullRefreshCache<C>,
    receiver: WebhookReceiver,
}

impl<C> Clone for AppState<C> {
    fn clone(&self) -> Self {
        AppState {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> AppState<C> {
    /// `store` must be the store the components were built with.
    pub fn new(
        store: Arc<dyn PostStore>,
        publisher: PublishCoordinator<C>,
        refresher: PullRefreshCache<C>,
        receiver: WebhookReceiver,
    ) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                store,
                publisher,
                refresher,
                receiver,
            }),
        }
    }

    pub fn store(&self) -> &dyn PostStore {
        self.inner.store.as_ref()
    }

    pub fn publisher(&self) -> &PublishCoordinator<C> {
        &self.inner.publisher
    }

    pub fn refresher(&self) -> &PullRefreshCache<C> {
        &self.inner.refresher
    }

    pub fn receiver(&self) -> &WebhookReceiver {
        &self.inner.receiver
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router<C>(app_state: AppState<C>) -> axum::Router
where
    C: RemoteClient + Send + Sync + 'static,
{
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/webhook", post(webhook_handler::<C>))
        .route("/api/v1/posts/{id}", get(post_handler::<C>))
        .route("/api/v1/posts/{id}/publish", post(publish_handler::<C>))
        .route("/api/v1/posts/{id}/refresh", post(refresh_handler::<C>))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use std::time::Duration;
    use tower::ServiceExt;

    use crate::config::SyncConfig;
    use crate::discourse::OperationKind;
    use crate::lock::InProcessLock;
    use crate::store::MemoryStore;
    use crate::test_utils::{ScriptedRemote, created_body, test_config, topic_body};
    use crate::types::{PostId, SyncedPost, TopicId};
    use crate::webhook::{DeferredNotifier, TracingSink, compute_signature, format_signature_header};

    const SECRET: &str = "test-secret";

    struct TestApp {
        remote: ScriptedRemote,
        store: Arc<MemoryStore>,
        state: AppState<ScriptedRemote>,
    }

    fn test_app() -> TestApp {
        let config: Arc<SyncConfig> = Arc::new(test_config().with_webhook_secret(SECRET));
        let remote = ScriptedRemote::new();
        let client = Arc::new(remote.clone());
        let store = Arc::new(MemoryStore::new());
        let lock = Arc::new(InProcessLock::new());

        let publisher =
            PublishCoordinator::new(config.clone(), client.clone(), store.clone(), lock.clone());
        let refresher = PullRefreshCache::new(config.clone(), client, store.clone(), lock);
        let notifier = DeferredNotifier::new(Arc::new(TracingSink), Duration::from_secs(600));
        let receiver = WebhookReceiver::new(config, store.clone(), notifier);

        let state = AppState::new(store.clone(), publisher, refresher, receiver);
        TestApp {
            remote,
            store,
            state,
        }
    }

    fn webhook_request(secret: &str, event_type: &str, body: &Value) -> Request<Body> {
        let bytes = serde_json::to_vec(body).unwrap();
        let signature = format_signature_header(&compute_signature(&bytes, secret.as_bytes()));

        Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("content-type", "application/json")
            .header("x-discourse-event-type", event_type)
            .header("x-discourse-event", format!("{event_type}_created"))
            .header("x-discourse-event-signature", signature)
            .body(Body::from(bytes))
            .unwrap()
    }

    fn json_post(uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn linked(id: u64, topic: u64, comments: u64) -> SyncedPost {
        let mut post = SyncedPost::new(PostId(id), "Hello");
        post.remote_topic_id = Some(TopicId(topic));
        post.comments_count = comments;
        post
    }

    // ─── Health ───

    #[tokio::test]
    async fn health_returns_200() {
        let app = build_router(test_app().state);

        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"OK");
    }

    // ─── Webhook ───

    #[tokio::test]
    async fn webhook_applies_post_event() {
        let t = test_app();
        t.store.save(&linked(1, 7, 1)).unwrap();
        let app = build_router(t.state);

        let body = json!({ "post": { "topic_id": 7, "post_number": 3, "topic_title": "Hello" } });
        let response = app
            .oneshot(webhook_request(SECRET, "post", &body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({ "result": "applied", "post_id": 1, "comments_count": 2 })
        );
        let post = t.store.load(PostId(1)).unwrap().unwrap();
        assert_eq!(post.comments_count, 2);
        assert!(post.needs_refresh);
    }

    #[tokio::test]
    async fn webhook_wrong_secret_returns_401_and_changes_nothing() {
        let t = test_app();
        t.store.save(&linked(1, 7, 1)).unwrap();
        let app = build_router(t.state);

        let body = json!({ "post": { "topic_id": 7, "post_number": 3, "topic_title": "Hello" } });
        let response = app
            .oneshot(webhook_request("wrong-secret", "post", &body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"], "signature_mismatch");
        assert_eq!(t.store.load(PostId(1)).unwrap().unwrap().comments_count, 1);
    }

    #[tokio::test]
    async fn webhook_without_signature_returns_401() {
        let app = build_router(test_app().state);

        let request = Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("x-discourse-event-type", "post")
            .body(Body::from("{}"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"], "missing_signature");
    }

    #[tokio::test]
    async fn webhook_ping_is_acknowledged() {
        let app = build_router(test_app().state);

        let response = app
            .oneshot(webhook_request(SECRET, "ping", &json!({ "ping": "OK" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["result"], "ignored");
    }

    #[tokio::test]
    async fn webhook_malformed_body_returns_400() {
        let app = build_router(test_app().state);

        let response = app
            .oneshot(webhook_request(SECRET, "post", &json!({ "post": { "id": 1 } })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    // ─── Posts ───

    #[tokio::test]
    async fn publish_then_inspect() {
        let t = test_app();
        t.remote
            .respond_json(OperationKind::Create, 200, created_body(42, 7, "hello"));
        let app = build_router(t.state);

        let response = app
            .clone()
            .oneshot(json_post(
                "/api/v1/posts/1/publish",
                &json!({
                    "title": "Hello",
                    "raw": "body",
                    "embed_url": "https://blog.example.com/hello",
                    "author_username": "alice",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let report = body_json(response).await;
        assert_eq!(report["result"], "created");
        assert_eq!(report["permalink"], "https://forum.example.com/t/hello/7");

        let request = Request::builder()
            .uri("/api/v1/posts/1")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let post = body_json(response).await;
        assert_eq!(post["remote_post_id"], 42);
        assert_eq!(post["last_sync_response"], "success");
    }

    #[tokio::test]
    async fn publish_remote_failure_returns_502() {
        let t = test_app();
        t.remote.respond_json(
            OperationKind::Create,
            422,
            json!({ "errors": ["Embed url has already been taken"] }),
        );
        let app = build_router(t.state);

        let response = app
            .oneshot(json_post(
                "/api/v1/posts/1/publish",
                &json!({ "title": "Hello", "raw": "body", "embed_url": "https://b/p" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = body_json(response).await;
        assert_eq!(body["error"], "http_error");
        assert!(
            body["message"]
                .as_str()
                .unwrap()
                .contains("Embed url has already been taken")
        );
    }

    #[tokio::test]
    async fn publish_without_embed_url_returns_422() {
        let app = build_router(test_app().state);

        let response = app
            .oneshot(json_post(
                "/api/v1/posts/1/publish",
                &json!({ "title": "Hello", "raw": "body" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn refresh_fetches_due_topic() {
        let t = test_app();
        t.store.save(&linked(1, 7, 0)).unwrap();
        t.remote
            .respond_json(OperationKind::FetchTopic, 200, topic_body(5));
        let app = build_router(t.state);

        let response = app
            .oneshot(json_post("/api/v1/posts/1/refresh", &json!({})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({ "result": "refreshed", "comments_count": 4 })
        );
    }

    #[tokio::test]
    async fn unknown_post_returns_404() {
        let app = build_router(test_app().state);

        let request = Request::builder()
            .uri("/api/v1/posts/404")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "not_found");
    }
}
