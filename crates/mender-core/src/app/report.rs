//! ReportBuilder - BlobSummary の一覧をレスポンス payload にする
//!
//! レンダラ本体は差し替え可能（未設定なら NameListRenderer）。
//! content-type も設定可能（未設定なら text/plain）。

use std::sync::Arc;

use crate::app::http::CONTENT_TYPE_HEADER;
use crate::config::{ReportConfig, ReportFormat};
use crate::domain::{BlobSummary, Message};
use crate::impls::{JsonBlobRenderer, NameListRenderer};
use crate::ports::{BlobRenderer, Component};

pub const DEFAULT_CONTENT_TYPE: &str = "text/plain";

pub struct ReportBuilder {
    renderer: Arc<dyn BlobRenderer>,
    content_type: String,
}

impl ReportBuilder {
    pub fn new(renderer: Option<Arc<dyn BlobRenderer>>, content_type: Option<String>) -> Self {
        Self {
            renderer: renderer.unwrap_or_else(|| Arc::new(NameListRenderer)),
            content_type: content_type.unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
        }
    }

    /// 設定の format からレンダラと content-type を決める
    pub fn from_config(config: &ReportConfig) -> Self {
        let (renderer, default_type): (Arc<dyn BlobRenderer>, &str) = match config.format {
            ReportFormat::Names => (Arc::new(NameListRenderer), DEFAULT_CONTENT_TYPE),
            ReportFormat::Json => (Arc::new(JsonBlobRenderer), "application/json"),
        };
        let content_type = config
            .content_type
            .clone()
            .unwrap_or_else(|| default_type.to_string());
        Self::new(Some(renderer), Some(content_type))
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// 一覧を message の payload に書き込み、content-type を設定する
    pub fn build(&self, blobs: &[BlobSummary], message: &mut Message) {
        message.set_payload_bytes(self.renderer.render(blobs));
        message.set_header(CONTENT_TYPE_HEADER, self.content_type.clone());
    }
}

impl Default for ReportBuilder {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl Component for ReportBuilder {
    fn name(&self) -> &str {
        "report-builder"
    }
}
