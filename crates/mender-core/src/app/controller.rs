//! RetryController - 失敗メッセージの一覧・再投入・削除を HTTP で受け付ける
//!
//! # エンドポイント（パスとメソッドは設定で変更可能）
//! - `GET    /api/failed/list`              → 200 + 一覧 / 500
//! - `POST   /api/retry/{messageId}`        → 202（受付のみ）/ 400 / 500
//! - `DELETE /api/failed/delete/{messageId}` → 200 / 400 / 404
//!
//! # リクエストの流れ
//! RECEIVED → ROUTE_CHECKED → {BAD_ROUTE | DISPATCHED} → RESPONDED
//!
//! # 並行性
//! - retry だけは Mutex で直列化する（route 判定 → store 読み出し → 組み立て → 投入まで）
//! - パイプラインの実行は RetryDispatcher の単一ワーカーで行い、ロックの外
//! - report / delete は追加のロックを持たない
//!
//! # ライフサイクル
//! prepare → init → start / stop → close を子コンポーネントに順に伝える。
//! prepare は 2 回目以降は何もしない。

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use axum::http::StatusCode;
use thiserror::Error;
use tokio::sync::Mutex;

use super::dispatcher::RetryDispatcher;
use super::http::{
    CONTENT_TYPE_HEADER, HTTP_METHOD_HEADER, HTTP_STATUS_HEADER, HTTP_URI_HEADER, HttpListener,
    RequestHandler, ResponseWriter,
};
use super::report::ReportBuilder;
use super::route::{RouteMatch, RouteMatcher};
use crate::config::{ConfigError, MenderConfig};
use crate::domain::{ControllerError, Message, StoreError};
use crate::ports::{
    BlobRenderer, Cascade, Component, LifecycleError, LifecycleState, MessageStore, Phase,
    Pipeline, PipelineRegistry,
};

const COMPONENT_NAME: &str = "retry-controller";

/// BuildError はコントローラー構築時のエラー
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("a message store is required")]
    MissingStore,

    #[error("a pipeline registry is required")]
    MissingRegistry,
}

/// EndpointKind は 3 つの論理エンドポイント
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndpointKind {
    Report,
    Retry,
    Delete,
}

impl EndpointKind {
    fn component_name(self) -> &'static str {
        match self {
            EndpointKind::Report => "report-endpoint",
            EndpointKind::Retry => "retry-endpoint",
            EndpointKind::Delete => "delete-endpoint",
        }
    }
}

/// prepare で設定から組み立てる route の一式
struct Routes {
    report: RouteMatcher,
    retry: RouteMatcher,
    delete: RouteMatcher,
}

impl Routes {
    fn from_config(config: &MenderConfig) -> Result<Self, ConfigError> {
        let invalid = |field: &'static str| {
            move |e: regex::Error| ConfigError::Invalid {
                field,
                reason: e.to_string(),
            }
        };
        Ok(Self {
            report: RouteMatcher::exact("report-route", config.http.report_path.clone()),
            retry: RouteMatcher::prefix(
                "retry-route",
                &config.http.retry_path,
                config.http.retry_method()?,
            )
            .map_err(invalid("http.retry_path"))?,
            delete: RouteMatcher::prefix(
                "delete-route",
                &config.http.delete_path,
                config.http.delete_method()?,
            )
            .map_err(invalid("http.delete_path"))?,
        })
    }

    fn get(&self, kind: EndpointKind) -> &RouteMatcher {
        match kind {
            EndpointKind::Report => &self.report,
            EndpointKind::Retry => &self.retry,
            EndpointKind::Delete => &self.delete,
        }
    }
}

/// ハンドラ間で共有する状態（永続的な状態は持たない）
struct Shared {
    store: Arc<dyn MessageStore>,
    registry: Arc<dyn PipelineRegistry>,
    report: Arc<ReportBuilder>,
    dispatcher: Arc<RetryDispatcher>,
    pipeline_header: String,
    routes: OnceLock<Routes>,
    retry_lock: Mutex<()>,
}

impl Shared {
    async fn handle(&self, kind: EndpointKind, request: Message, writer: ResponseWriter) {
        match kind {
            EndpointKind::Report => self.handle_report(request, writer).await,
            EndpointKind::Retry => self.handle_retry(request, writer).await,
            EndpointKind::Delete => self.handle_delete(request, writer).await,
        }
    }

    /// route を判定する。一致しなければ BAD_ROUTE としてエラーを返す
    fn check_route(&self, kind: EndpointKind, request: &Message) -> Result<RouteMatch, RouteFailure> {
        let routes = self.routes.get().ok_or(RouteFailure::NotPrepared)?;
        let method = request.header(HTTP_METHOD_HEADER).unwrap_or_default();
        let uri = request.header(HTTP_URI_HEADER).unwrap_or_default();
        let route = routes.get(kind).matches(method, uri);
        tracing::debug!(route = routes.get(kind).name(), method, uri, matched = route.matched, "route checked");
        if !route.matched {
            return Err(RouteFailure::Mismatch(ControllerError::RouteMismatch {
                method: method.to_string(),
                path: uri.to_string(),
            }));
        }
        Ok(route)
    }

    async fn handle_report(&self, mut message: Message, writer: ResponseWriter) {
        if let Err(failure) = self.check_route(EndpointKind::Report, &message) {
            return failure.respond(message, writer).await;
        }
        match self.store.report().await {
            Ok(blobs) => {
                self.report.build(&blobs, &mut message);
                set_status(&mut message, StatusCode::OK);
            }
            Err(e) => {
                tracing::warn!(store = self.store.name(), error = %e, "report failed");
                set_error(&mut message, StatusCode::INTERNAL_SERVER_ERROR, &e);
            }
        }
        writer.write(&message).await;
    }

    async fn handle_delete(&self, mut message: Message, writer: ResponseWriter) {
        let route = match self.check_route(EndpointKind::Delete, &message) {
            Ok(route) => route,
            Err(failure) => return failure.respond(message, writer).await,
        };
        let id = route.message_id().unwrap_or_default();

        match self.delete(id).await {
            Ok(()) => {
                tracing::info!(message_id = id, "deleted failed message");
                message.set_payload_bytes(format!("deleted {id}\n"));
                message.set_header(CONTENT_TYPE_HEADER, "text/plain");
                set_status(&mut message, StatusCode::OK);
            }
            Err(e) => {
                tracing::warn!(message_id = id, error = %e, "delete failed");
                set_error(&mut message, StatusCode::NOT_FOUND, &e);
            }
        }
        writer.write(&message).await;
    }

    async fn delete(&self, id: &str) -> Result<(), ControllerError> {
        self.store.get_metadata(id).await?;
        if !self.store.delete(id).await? {
            return Err(StoreError::NotFound(id.to_string()).into());
        }
        Ok(())
    }

    async fn handle_retry(&self, mut message: Message, writer: ResponseWriter) {
        // route 判定から投入までを 1 件ずつに制限する（パイプラインの実行は含まない）
        let _serialized = self.retry_lock.lock().await;

        let route = match self.check_route(EndpointKind::Retry, &message) {
            Ok(route) => route,
            Err(failure) => return failure.respond(message, writer).await,
        };
        let id = route.message_id().unwrap_or_default();

        let (pipeline, rebuilt) = match self.rebuild(id).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(message_id = id, error = %e, "retry rejected");
                set_error(&mut message, StatusCode::INTERNAL_SERVER_ERROR, &e);
                return writer.write(&message).await;
            }
        };

        // 先に 202 を返す。完了を知らせる手段はない
        message.set_payload_bytes(format!("accepted {id}\n"));
        message.set_header(CONTENT_TYPE_HEADER, "text/plain");
        set_status(&mut message, StatusCode::ACCEPTED);
        writer.write(&message).await;

        let pipeline_id = pipeline.id().to_string();
        match self.dispatcher.submit(pipeline, rebuilt).await {
            Ok(()) => tracing::info!(message_id = id, pipeline = %pipeline_id, "retry accepted"),
            Err(e) => {
                tracing::error!(message_id = id, pipeline = %pipeline_id, error = %e, "retry was accepted but could not be queued");
            }
        }
    }

    /// ヘッダーを読み、パイプラインを解決し、そのパイプライン用の Message を組み立てる
    async fn rebuild(&self, id: &str) -> Result<(Arc<dyn Pipeline>, Message), ControllerError> {
        let headers = self.store.get_metadata(id).await?;
        let pipeline_id = headers
            .get(&self.pipeline_header)
            .cloned()
            .ok_or_else(|| {
                ControllerError::DownstreamUnavailable(format!(
                    "message '{id}' has no '{}' header",
                    self.pipeline_header
                ))
            })?;
        let pipeline = self.registry.lookup(&pipeline_id).ok_or_else(|| {
            ControllerError::DownstreamUnavailable(format!(
                "pipeline '{pipeline_id}' is not registered"
            ))
        })?;
        if !self.dispatcher.is_running().await {
            return Err(ControllerError::DownstreamUnavailable(
                "retry dispatcher is not running".to_string(),
            ));
        }

        let factory = pipeline.message_factory();
        let message = self
            .store
            .build_for_retry_with(id, headers, factory.as_ref())
            .await?;
        Ok((pipeline, message))
    }
}

enum RouteFailure {
    NotPrepared,
    Mismatch(ControllerError),
}

impl RouteFailure {
    async fn respond(self, mut message: Message, writer: ResponseWriter) {
        match self {
            RouteFailure::NotPrepared => {
                set_error(&mut message, StatusCode::SERVICE_UNAVAILABLE, &"controller is not prepared");
            }
            RouteFailure::Mismatch(e) => {
                tracing::debug!(error = %e, "bad route");
                set_error(&mut message, StatusCode::BAD_REQUEST, &e);
            }
        }
        writer.write(&message).await;
    }
}

fn set_status(message: &mut Message, status: StatusCode) {
    message.set_header(HTTP_STATUS_HEADER, status.as_u16().to_string());
}

/// エラーの文言を payload にし、ステータスを設定する
fn set_error(message: &mut Message, status: StatusCode, error: &dyn std::fmt::Display) {
    message.set_payload_bytes(error.to_string());
    message.set_header(CONTENT_TYPE_HEADER, "text/plain");
    set_status(message, status);
}

/// HttpListener に登録されるハンドラ
struct EndpointHandler {
    kind: EndpointKind,
    shared: Arc<Shared>,
}

#[async_trait]
impl RequestHandler for EndpointHandler {
    async fn handle(&self, request: Message, writer: ResponseWriter) {
        self.shared.handle(self.kind, request, writer).await;
    }
}

/// Endpoint は start で HttpListener に登録し、stop で外すサブリスナー
struct Endpoint {
    kind: EndpointKind,
    path: String,
    shared: Arc<Shared>,
    http: Arc<HttpListener>,
}

#[async_trait]
impl Component for Endpoint {
    fn name(&self) -> &str {
        self.kind.component_name()
    }

    async fn start(&self) -> Result<(), LifecycleError> {
        let handler = Arc::new(EndpointHandler {
            kind: self.kind,
            shared: Arc::clone(&self.shared),
        });
        self.http.register(self.path.clone(), handler).await;
        Ok(())
    }

    async fn stop(&self) -> Result<(), LifecycleError> {
        self.http.unregister(&self.path).await;
        Ok(())
    }
}

/// RetryControllerBuilder は RetryController を構築
///
/// # 使用例
/// ```ignore
/// let controller = RetryControllerBuilder::new(config)
///     .store(Arc::new(store))
///     .registry(Arc::new(registry))
///     .build()?;
/// controller.prepare().await?;
/// controller.init().await?;
/// controller.start().await?;
/// ```
pub struct RetryControllerBuilder {
    config: MenderConfig,
    store: Option<Arc<dyn MessageStore>>,
    registry: Option<Arc<dyn PipelineRegistry>>,
    renderer: Option<Arc<dyn BlobRenderer>>,
    http: Option<Arc<HttpListener>>,
}

impl RetryControllerBuilder {
    pub fn new(config: MenderConfig) -> Self {
        Self {
            config,
            store: None,
            registry: None,
            renderer: None,
            http: None,
        }
    }

    pub fn store(mut self, store: Arc<dyn MessageStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn registry(mut self, registry: Arc<dyn PipelineRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// 設定の report.format より優先されるレンダラ
    pub fn renderer(mut self, renderer: Arc<dyn BlobRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// 他のハンドラと共有する HttpListener（未指定なら http.bind_addr で作る）
    pub fn http(mut self, http: Arc<HttpListener>) -> Self {
        self.http = Some(http);
        self
    }

    pub fn build(self) -> Result<RetryController, BuildError> {
        let store = self.store.ok_or(BuildError::MissingStore)?;
        let registry = self.registry.ok_or(BuildError::MissingRegistry)?;

        let report = Arc::new(match self.renderer {
            Some(renderer) => {
                ReportBuilder::new(Some(renderer), self.config.report.content_type.clone())
            }
            None => ReportBuilder::from_config(&self.config.report),
        });
        let dispatcher = Arc::new(RetryDispatcher::new(self.config.retry.shutdown_grace()));
        let http = self
            .http
            .unwrap_or_else(|| Arc::new(HttpListener::new(self.config.http.bind_addr)));

        let shared = Arc::new(Shared {
            store,
            registry,
            report: Arc::clone(&report),
            dispatcher: Arc::clone(&dispatcher),
            pipeline_header: self.config.retry.pipeline_header.clone(),
            routes: OnceLock::new(),
            retry_lock: Mutex::new(()),
        });

        // 順序: レンダラ → ワーカー → 各エンドポイント → HTTP（stop / close は逆順）
        let mut children = Cascade::new();
        children.push(report);
        children.push(dispatcher);
        for (kind, path) in [
            (EndpointKind::Report, &self.config.http.report_path),
            (EndpointKind::Retry, &self.config.http.retry_path),
            (EndpointKind::Delete, &self.config.http.delete_path),
        ] {
            children.push(Arc::new(Endpoint {
                kind,
                path: path.clone(),
                shared: Arc::clone(&shared),
                http: Arc::clone(&http),
            }));
        }
        children.push(Arc::clone(&http) as Arc<dyn Component>);

        Ok(RetryController {
            config: self.config,
            shared,
            http,
            children,
            state: Mutex::new(LifecycleState::Created),
        })
    }
}

pub struct RetryController {
    config: MenderConfig,
    shared: Arc<Shared>,
    http: Arc<HttpListener>,
    children: Cascade,
    state: Mutex<LifecycleState>,
}

impl RetryController {
    pub fn builder(config: MenderConfig) -> RetryControllerBuilder {
        RetryControllerBuilder::new(config)
    }

    pub fn config(&self) -> &MenderConfig {
        &self.config
    }

    pub fn http(&self) -> &Arc<HttpListener> {
        &self.http
    }

    pub async fn state(&self) -> LifecycleState {
        *self.state.lock().await
    }

    /// 子コンポーネントの名前（ライフサイクルを伝える順）
    pub fn component_names(&self) -> Vec<&str> {
        self.children.names()
    }

    pub async fn handle_report(&self, request: Message, writer: ResponseWriter) {
        self.shared.handle_report(request, writer).await;
    }

    pub async fn handle_retry(&self, request: Message, writer: ResponseWriter) {
        self.shared.handle_retry(request, writer).await;
    }

    pub async fn handle_delete(&self, request: Message, writer: ResponseWriter) {
        self.shared.handle_delete(request, writer).await;
    }

    /// state を確認して子に phase を伝え、成功したら state を進める
    async fn transition(&self, phase: Phase) -> Result<(), LifecycleError> {
        let mut state = self.state.lock().await;
        let next = state.after(phase).ok_or(LifecycleError::InvalidTransition {
            component: COMPONENT_NAME.to_string(),
            phase,
            state: *state,
        })?;
        self.children.run(phase).await?;
        *state = next;
        tracing::info!(component = COMPONENT_NAME, %phase, "lifecycle phase complete");
        Ok(())
    }
}

#[async_trait]
impl Component for RetryController {
    fn name(&self) -> &str {
        COMPONENT_NAME
    }

    async fn prepare(&self) -> Result<(), LifecycleError> {
        let mut state = self.state.lock().await;
        if *state != LifecycleState::Created {
            tracing::debug!(component = COMPONENT_NAME, state = ?*state, "already prepared");
            return Ok(());
        }

        self.config
            .validate()
            .map_err(|e| LifecycleError::failed(COMPONENT_NAME, Phase::Prepare, e))?;
        let routes = Routes::from_config(&self.config)
            .map_err(|e| LifecycleError::failed(COMPONENT_NAME, Phase::Prepare, e))?;
        // 一度だけ設定される（2 回目の prepare はここまで来ない）
        let _ = self.shared.routes.set(routes);

        self.children.run(Phase::Prepare).await?;
        *state = LifecycleState::Prepared;
        tracing::info!(
            component = COMPONENT_NAME,
            store = self.shared.store.name(),
            "lifecycle phase complete: prepare"
        );
        Ok(())
    }

    async fn init(&self) -> Result<(), LifecycleError> {
        self.transition(Phase::Init).await
    }

    async fn start(&self) -> Result<(), LifecycleError> {
        self.transition(Phase::Start).await
    }

    async fn stop(&self) -> Result<(), LifecycleError> {
        self.transition(Phase::Stop).await
    }

    async fn close(&self) -> Result<(), LifecycleError> {
        self.transition(Phase::Close).await
    }
}
