//! Pipeline port - メッセージを処理するパイプライン（workflow）
//!
//! パイプライン自体の実行セマンティクスはこのクレートの範囲外。
//! ここではレジストリからの解決と、非同期の投入口だけを定義する。

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Message, MessageFactory};

/// PipelineError はパイプライン実行の失敗
#[derive(Debug, Error)]
#[error("pipeline '{pipeline}' failed: {reason}")]
pub struct PipelineError {
    pub pipeline: String,
    pub reason: String,
}

impl PipelineError {
    pub fn new(pipeline: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            pipeline: pipeline.into(),
            reason: reason.into(),
        }
    }
}

/// Pipeline はメッセージを（再）処理する
///
/// `process` の Result が成功/失敗の継続にあたる。
#[async_trait]
pub trait Pipeline: Send + Sync {
    fn id(&self) -> &str;

    /// このパイプラインが受け取る Message の作り方
    ///
    /// FileMessageFactory を返す場合、payload は store 上のファイルを参照する。
    /// そのファイルは処理中に削除されうるので、読めないときは process でエラーにする。
    fn message_factory(&self) -> Arc<dyn MessageFactory>;

    async fn process(&self, message: Message) -> Result<(), PipelineError>;
}

/// PipelineRegistry は id からパイプラインを解決する
pub trait PipelineRegistry: Send + Sync {
    fn lookup(&self, id: &str) -> Option<Arc<dyn Pipeline>>;
}
