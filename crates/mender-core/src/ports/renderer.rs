//! BlobRenderer port - BlobSummary の一覧を payload に変換する
//!
//! エンコード形式（改行区切り、JSON など）は差し替え可能。

use bytes::Bytes;

use crate::domain::BlobSummary;

pub trait BlobRenderer: Send + Sync {
    fn render(&self, blobs: &[BlobSummary]) -> Bytes;
}
