//! BlobRenderer の実装
//!
//! - NameListRenderer: 1 行に 1 つの名前（デフォルト）
//! - JsonBlobRenderer: BlobSummary の JSON 配列

use bytes::Bytes;

use crate::domain::BlobSummary;
use crate::ports::BlobRenderer;

#[derive(Debug, Clone, Copy, Default)]
pub struct NameListRenderer;

impl BlobRenderer for NameListRenderer {
    fn render(&self, blobs: &[BlobSummary]) -> Bytes {
        let mut out = String::new();
        for blob in blobs {
            out.push_str(&blob.name);
            out.push('\n');
        }
        Bytes::from(out)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBlobRenderer;

impl BlobRenderer for JsonBlobRenderer {
    fn render(&self, blobs: &[BlobSummary]) -> Bytes {
        // BlobSummary は String と整数だけなのでシリアライズは失敗しない
        serde_json::to_vec(blobs)
            .map(Bytes::from)
            .unwrap_or_else(|_| Bytes::from_static(b"[]"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> Vec<BlobSummary> {
        ["m1", "m2"]
            .iter()
            .map(|name| BlobSummary {
                bucket: "/data/failed".to_string(),
                name: name.to_string(),
                size: 5,
                last_modified_epoch_millis: 1_700_000_000_000,
            })
            .collect()
    }

    #[test]
    fn name_list_is_one_name_per_line() {
        assert_eq!(NameListRenderer.render(&blobs()), "m1\nm2\n");
        assert_eq!(NameListRenderer.render(&[]), "");
    }

    #[test]
    fn json_renderer_emits_an_array_of_summaries() {
        let value: serde_json::Value =
            serde_json::from_slice(&JsonBlobRenderer.render(&blobs())).unwrap();
        assert_eq!(value[1]["name"], "m2");
        assert_eq!(value[0]["size"], 5);
        assert_eq!(value[0]["last_modified_epoch_millis"], 1_700_000_000_000_i64);
    }
}
