//! InMemoryMessageStore - テスト・開発用のストア
//!
//! # 設計原則
//! - グローバルな static は使わず、明示的に生成して注入する
//! - テストごとに独立したインスタンスを持てるので並列実行できる

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::domain::{BlobSummary, Headers, Message, MessageFactory, Payload, StoreError};
use crate::ports::MessageStore;

#[derive(Debug, Clone)]
struct StoredRecord {
    payload: Bytes,
    headers: Headers,
    stored_at_millis: i64,
}

/// InMemoryMessageStore はメモリ上の HashMap に保存する
#[derive(Default)]
pub struct InMemoryMessageStore {
    records: Mutex<HashMap<String, StoredRecord>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn write(&self, message: &Message) -> Result<(), StoreError> {
        // ファイルで裏付けられた payload もここでは読み込んで保持する
        let payload = message
            .payload_bytes()
            .await
            .map_err(|e| StoreError::io(format!("read payload for {}", message.id()), e))?;
        let record = StoredRecord {
            payload,
            headers: message.headers().clone(),
            stored_at_millis: Utc::now().timestamp_millis(),
        };
        self.records
            .lock()
            .await
            .insert(message.id().to_string(), record);
        Ok(())
    }

    async fn get_metadata(&self, id: &str) -> Result<Headers, StoreError> {
        self.records
            .lock()
            .await
            .get(id)
            .map(|record| record.headers.clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn build_for_retry_with(
        &self,
        id: &str,
        headers: Headers,
        factory: &dyn MessageFactory,
    ) -> Result<Message, StoreError> {
        let payload = self
            .records
            .lock()
            .await
            .get(id)
            .map(|record| record.payload.clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        // ファイルがないので、どの factory にもバッファとして渡す
        Ok(factory.create(id, headers, Payload::Bytes(payload)))
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.records.lock().await.remove(id).is_some())
    }

    async fn report(&self) -> Result<Vec<BlobSummary>, StoreError> {
        let records = self.records.lock().await;
        let mut blobs: Vec<BlobSummary> = records
            .iter()
            .map(|(id, record)| BlobSummary {
                bucket: "memory".to_string(),
                name: id.clone(),
                size: record.payload.len() as u64,
                last_modified_epoch_millis: record.stored_at_millis,
            })
            .collect();
        blobs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(blobs)
    }
}
