//! HTTP surface: `POST /download`, `POST /transcribe`, `GET /health`.

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub mod error;
pub mod handlers;

use crate::orchestrator::DownloadOrchestrator;

/// Shared handles every request works with
pub struct ApiState {
    pub orchestrator: DownloadOrchestrator,
}

impl ApiState {
    pub fn new(orchestrator: DownloadOrchestrator) -> Self {
        Self { orchestrator }
    }
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/download", post(handlers::download))
        .route("/transcribe", post(handlers::transcribe))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API until Ctrl-C
pub async fn serve(addr: SocketAddr, state: Arc<ApiState>) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server terminated")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::AudioFormat;
    use crate::orchestrator::{KeyClock, KeyLayout};
    use crate::test_support::{sample_transcript, FakeExtractor, MemoryStore, StaticTranscriber};
    use crate::transcribe::TranscriptionService;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use tower::ServiceExt;

    struct Harness {
        router: Router,
        extractor: Arc<FakeExtractor>,
        store: Arc<MemoryStore>,
    }

    fn harness(transcriber: Option<StaticTranscriber>) -> Harness {
        let extractor = Arc::new(FakeExtractor::new("My Clip"));
        let store = Arc::new(MemoryStore::new("media"));

        let mut orchestrator =
            DownloadOrchestrator::new(extractor.clone(), store.clone(), KeyLayout::new(None, AudioFormat::Mp3))
                .with_clock(Arc::new(KeyClock::with_source(|| 1_700_000_000_000)));
        if let Some(transcriber) = transcriber {
            orchestrator = orchestrator
                .with_transcription(TranscriptionService::new(store.clone(), Arc::new(transcriber)), true);
        }

        Harness {
            router: router(Arc::new(ApiState::new(orchestrator))),
            extractor,
            store,
        }
    }

    fn post_json(path: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_download_returns_uris_and_transcript() {
        let app = harness(Some(StaticTranscriber::succeeding()));

        let response = app
            .router
            .oneshot(post_json("/download", r#"{"url":"https://valid.example/watch?id=1"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["videoURI"], "s3://media/My Clip_1700000000000_AV.mp4");
        assert_eq!(json["audioURI"], "s3://media/My Clip_1700000000000_A.mp3");
        assert_eq!(
            json["transcript"],
            serde_json::to_value(sample_transcript("s3://media/My Clip_1700000000000_A.mp3")).unwrap()
        );
    }

    #[tokio::test]
    async fn test_download_without_url_is_generic_failure() {
        for body in [r#"{"url":""}"#, r#"{}"#, r#"not json"#] {
            let app = harness(None);

            let response = app.router.oneshot(post_json("/download", body)).await.unwrap();

            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(response.headers()[&error::ERROR_CODE_HEADER], "validation_error");
            assert_eq!(body_string(response).await, error::DOWNLOAD_FAILURE_MESSAGE);
            assert_eq!(app.extractor.calls(), 0);
            assert!(app.store.operations().is_empty());
        }
    }

    #[tokio::test]
    async fn test_transcribe_returns_engine_result() {
        let app = harness(Some(StaticTranscriber::succeeding()));
        app.store.insert("My Clip_1_A.mp3", b"audio");

        let response = app
            .router
            .oneshot(post_json("/transcribe", r#"{"audioURI":"s3://media/My Clip_1_A.mp3"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json, serde_json::to_value(sample_transcript("s3://media/My Clip_1_A.mp3")).unwrap());
    }

    #[tokio::test]
    async fn test_transcribe_failure_always_responds() {
        let app = harness(Some(StaticTranscriber::failing("quota exceeded")));
        app.store.insert("a.mp3", b"audio");

        let response = app
            .router
            .oneshot(post_json("/transcribe", r#"{"audioURI":"s3://media/a.mp3"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[&error::ERROR_CODE_HEADER], "transcription_error");
        assert_eq!(body_string(response).await, error::TRANSCRIBE_FAILURE_MESSAGE);
    }

    #[tokio::test]
    async fn test_transcribe_missing_object_and_unconfigured_engine() {
        let with_engine = harness(Some(StaticTranscriber::succeeding()));
        let response = with_engine
            .router
            .oneshot(post_json("/transcribe", r#"{"audioURI":"s3://media/missing.mp3"}"#))
            .await
            .unwrap();
        assert_eq!(response.headers()[&error::ERROR_CODE_HEADER], "fetch_error");

        let without_engine = harness(None);
        let response = without_engine
            .router
            .oneshot(post_json("/transcribe", r#"{"audioURI":"s3://media/a.mp3"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[&error::ERROR_CODE_HEADER], "transcription_error");
    }

    #[tokio::test]
    async fn test_health() {
        let app = harness(None);
        let response = app
            .router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["status"], "ok");
    }
}
