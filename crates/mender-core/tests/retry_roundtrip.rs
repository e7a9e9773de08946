//! 保存 → 一覧 → 再投入 → 削除 を HTTP 越しに通す

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use mender_core::app::RetryController;
use mender_core::config::{MenderConfig, ReportFormat};
use mender_core::domain::{BlobSummary, FileMessageFactory, Message, MessageFactory};
use mender_core::impls::{FsMessageStore, InMemoryPipelineRegistry};
use mender_core::ports::{Component, MessageStore, Pipeline, PipelineError};
use tokio::sync::mpsc;
use tower::ServiceExt;

/// 受け取った payload をチャネルに流すパイプライン
struct Forward {
    tx: mpsc::UnboundedSender<(String, Vec<u8>)>,
}

#[async_trait]
impl Pipeline for Forward {
    fn id(&self) -> &str {
        "wf1"
    }

    fn message_factory(&self) -> Arc<dyn MessageFactory> {
        Arc::new(FileMessageFactory)
    }

    async fn process(&self, message: Message) -> Result<(), PipelineError> {
        let body = message
            .payload_bytes()
            .await
            .map_err(|e| PipelineError::new("wf1", e.to_string()))?;
        let _ = self.tx.send((message.id().to_string(), body.to_vec()));
        Ok(())
    }
}

async fn send(controller: &RetryController, method: Method, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = controller
        .http()
        .router()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

#[tokio::test]
async fn failed_message_is_listed_retried_and_deleted() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsMessageStore::open(dir.path()).await.unwrap());
    store
        .write(
            &Message::with_id("m1")
                .payload_with("hello")
                .header_with("pipeline", "wf1"),
        )
        .await
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut registry = InMemoryPipelineRegistry::new();
    registry.register(Arc::new(Forward { tx })).unwrap();

    let mut config = MenderConfig::default();
    config.store.base_dir = dir.path().to_path_buf();
    config.http.bind_addr = SocketAddr::from(([127, 0, 0, 1], 0));
    config.report.format = ReportFormat::Json;

    let controller = RetryController::builder(config)
        .store(store.clone())
        .registry(Arc::new(registry))
        .build()
        .unwrap();
    controller.prepare().await.unwrap();
    controller.init().await.unwrap();
    controller.start().await.unwrap();

    let (status, body) = send(&controller, Method::GET, "/api/failed/list").await;
    assert_eq!(status, StatusCode::OK);
    let listed: Vec<BlobSummary> = serde_json::from_slice(&body).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "m1");
    assert_eq!(listed[0].size, 5);

    let (status, _) = send(&controller, Method::POST, "/api/retry/m1").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let (id, payload) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(id, "m1");
    assert_eq!(payload, b"hello");

    // 再投入しても記録は残る
    assert!(store.get_metadata("m1").await.is_ok());

    let (status, _) = send(&controller, Method::DELETE, "/api/failed/delete/m1").await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(&controller, Method::GET, "/api/failed/list").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"[]");

    let (status, _) = send(&controller, Method::DELETE, "/api/failed/delete/m1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    controller.stop().await.unwrap();
    controller.close().await.unwrap();
}

#[tokio::test]
async fn unregistered_paths_are_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsMessageStore::open(dir.path()).await.unwrap());
    let mut config = MenderConfig::default();
    config.http.bind_addr = SocketAddr::from(([127, 0, 0, 1], 0));

    let controller = RetryController::builder(config)
        .store(store)
        .registry(Arc::new(InMemoryPipelineRegistry::new()))
        .build()
        .unwrap();
    controller.prepare().await.unwrap();
    controller.init().await.unwrap();
    controller.start().await.unwrap();

    let (status, _) = send(&controller, Method::GET, "/api/unknown").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    controller.stop().await.unwrap();
    // stop 後はエンドポイントが外れている
    let (status, _) = send(&controller, Method::GET, "/api/failed/list").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
