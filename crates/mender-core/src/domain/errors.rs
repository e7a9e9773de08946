//! Errors - エラー型と分類
//!
//! # 分類
//! - StoreError: store 層のエラー（バックエンド固有の型は外に出さない）
//! - ControllerError: リクエスト単位のエラー（HTTP ステータスに変換される）
//!
//! 起動時の致命的なエラー（BuildError, ConfigError, LifecycleError）は
//! それぞれのモジュールで定義する。

use thiserror::Error;

/// StoreError は MessageStore の操作エラー
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("message '{0}' not found")]
    NotFound(String),

    #[error("operation '{0}' is not supported by this store")]
    Unsupported(&'static str),

    #[error("invalid message id '{0}'")]
    InvalidId(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        StoreError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// ControllerError はリクエスト処理中のエラー
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("no route for {method} {path}")]
    RouteMismatch { method: String, path: String },

    #[error("pipeline unavailable: {0}")]
    DownstreamUnavailable(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
