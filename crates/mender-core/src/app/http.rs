//! HttpListener - URL prefix ごとにハンドラを登録できる HTTP バインディング
//!
//! # フロー
//! 1. axum の fallback で全リクエストを受ける
//! 2. 最長一致の prefix でハンドラを選ぶ（なければ 404）
//! 3. method / URI をヘッダーに、body を payload に詰めた Message をハンドラに渡す
//! 4. ハンドラが ResponseWriter に書いた時点でクライアントに返す
//!
//! ハンドラは書き込み後も処理を続けられる（retry の「202 を返してから投入」のため）。

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, RwLock, oneshot};
use tokio::task::JoinHandle;

use crate::domain::Message;
use crate::ports::{Component, LifecycleError, Phase};

pub const HTTP_METHOD_HEADER: &str = "http.method";
pub const HTTP_URI_HEADER: &str = "http.uri";
pub const HTTP_STATUS_HEADER: &str = "http.status";
pub const CONTENT_TYPE_HEADER: &str = "content-type";

const MAX_REQUEST_BODY: usize = 16 * 1024 * 1024;
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// RequestHandler は 1 つの prefix に登録されるハンドラ
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, request: Message, writer: ResponseWriter);
}

/// HttpReply はクライアントに返す内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl HttpReply {
    /// Message 自身のヘッダーからステータスと content-type を読む
    pub async fn from_message(message: &Message) -> Self {
        let status = message
            .header(HTTP_STATUS_HEADER)
            .and_then(|s| s.parse::<u16>().ok())
            .and_then(|code| StatusCode::from_u16(code).ok());
        let body = message.payload_bytes().await;
        match (status, body) {
            (Some(status), Ok(body)) => Self {
                status,
                content_type: message.header(CONTENT_TYPE_HEADER).map(str::to_string),
                body,
            },
            (None, _) => Self::text(StatusCode::INTERNAL_SERVER_ERROR, "handler set no valid status"),
            (_, Err(e)) => Self::text(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to read response payload: {e}"),
            ),
        }
    }

    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: Some("text/plain".to_string()),
            body: Bytes::from(body.into()),
        }
    }
}

impl IntoResponse for HttpReply {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.body).into_response();
        if let Some(value) = self
            .content_type
            .and_then(|ct| HeaderValue::from_str(&ct).ok())
        {
            response.headers_mut().insert(header::CONTENT_TYPE, value);
        }
        response
    }
}

/// ResponseWriter はハンドラがレスポンスを 1 度だけ書き込む口
pub struct ResponseWriter {
    tx: oneshot::Sender<HttpReply>,
}

impl ResponseWriter {
    pub fn channel() -> (Self, oneshot::Receiver<HttpReply>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    pub async fn write(self, message: &Message) {
        let reply = HttpReply::from_message(message).await;
        // クライアントが切断していれば受け手はいない
        let _ = self.tx.send(reply);
    }
}

/// HTTP リクエストを Message に変換する
pub fn request_message(method: &str, uri: &str, body: Bytes) -> Message {
    Message::new()
        .header_with(HTTP_METHOD_HEADER, method)
        .header_with(HTTP_URI_HEADER, uri)
        .payload_with(body)
}

type Routes = Arc<RwLock<Vec<(String, Arc<dyn RequestHandler>)>>>;

struct RunningServer {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    join: JoinHandle<std::io::Result<()>>,
}

pub struct HttpListener {
    bind_addr: SocketAddr,
    routes: Routes,
    server: Mutex<Option<RunningServer>>,
}

impl HttpListener {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            routes: Arc::new(RwLock::new(Vec::new())),
            server: Mutex::new(None),
        }
    }

    /// prefix にハンドラを登録する（同じ prefix は置き換える）
    pub async fn register(&self, prefix: impl Into<String>, handler: Arc<dyn RequestHandler>) {
        let prefix = prefix.into();
        let mut routes = self.routes.write().await;
        routes.retain(|(existing, _)| *existing != prefix);
        tracing::debug!(prefix = %prefix, "registered http handler");
        routes.push((prefix, handler));
    }

    pub async fn unregister(&self, prefix: &str) -> bool {
        let mut routes = self.routes.write().await;
        let before = routes.len();
        routes.retain(|(existing, _)| existing != prefix);
        routes.len() != before
    }

    pub async fn prefixes(&self) -> Vec<String> {
        self.routes
            .read()
            .await
            .iter()
            .map(|(prefix, _)| prefix.clone())
            .collect()
    }

    /// 登録済みハンドラに振り分ける Router（テストでは oneshot で直接叩く）
    pub fn router(&self) -> Router {
        Router::new()
            .fallback(dispatch)
            .with_state(Arc::clone(&self.routes))
    }

    /// 起動中ならバインドしたアドレス（ポート 0 を指定した場合に使う）
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.server.lock().await.as_ref().map(|s| s.local_addr)
    }
}

async fn dispatch(State(routes): State<Routes>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let path = parts.uri.path().to_string();

    let handler = {
        let routes = routes.read().await;
        routes
            .iter()
            .filter(|(prefix, _)| path.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, handler)| Arc::clone(handler))
    };
    let Some(handler) = handler else {
        return HttpReply::text(StatusCode::NOT_FOUND, format!("no handler for {path}"))
            .into_response();
    };

    let body = match axum::body::to_bytes(body, MAX_REQUEST_BODY).await {
        Ok(body) => body,
        Err(e) => {
            return HttpReply::text(StatusCode::BAD_REQUEST, format!("failed to read body: {e}"))
                .into_response();
        }
    };

    let message = request_message(parts.method.as_str(), &parts.uri.to_string(), body);
    let (writer, reply) = ResponseWriter::channel();
    // 書き込み後の処理（retry の投入など）はクライアントの切断と無関係に最後まで走らせる
    tokio::spawn(async move { handler.handle(message, writer).await });

    match reply.await {
        Ok(reply) => reply.into_response(),
        Err(_) => HttpReply::text(StatusCode::INTERNAL_SERVER_ERROR, "handler wrote no response")
            .into_response(),
    }
}

#[async_trait]
impl Component for HttpListener {
    fn name(&self) -> &str {
        "http-listener"
    }

    async fn start(&self) -> Result<(), LifecycleError> {
        let mut server = self.server.lock().await;
        if server.is_some() {
            return Ok(());
        }
        let listener = TcpListener::bind(self.bind_addr)
            .await
            .map_err(|e| LifecycleError::failed(self.name(), Phase::Start, e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| LifecycleError::failed(self.name(), Phase::Start, e))?;

        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let router = self.router();
        let join = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });
        tracing::info!(%local_addr, "http listener started");
        *server = Some(RunningServer {
            local_addr,
            shutdown,
            join,
        });
        Ok(())
    }

    async fn stop(&self) -> Result<(), LifecycleError> {
        let Some(RunningServer {
            local_addr,
            shutdown,
            mut join,
        }) = self.server.lock().await.take()
        else {
            return Ok(());
        };
        let _ = shutdown.send(());
        match tokio::time::timeout(STOP_TIMEOUT, &mut join).await {
            Ok(Ok(Ok(()))) => tracing::info!(%local_addr, "http listener stopped"),
            Ok(Ok(Err(e))) => tracing::warn!(%local_addr, error = %e, "http listener exited with error"),
            Ok(Err(e)) => tracing::warn!(%local_addr, error = %e, "http listener task failed"),
            Err(_) => {
                tracing::warn!(%local_addr, "http listener did not stop in time; aborting");
                join.abort();
            }
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), LifecycleError> {
        self.routes.write().await.clear();
        Ok(())
    }
}
