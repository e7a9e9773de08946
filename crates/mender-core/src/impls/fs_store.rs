//! FsMessageStore - ディレクトリ単位でメッセージを保存するストア
//!
//! # レイアウト
//! ```text
//! <root>/<messageId>/payload.blob          payload のバイト列
//! <root>/<messageId>/metadata.properties   "# Metadata for <messageId>" + key=value
//! ```
//!
//! # 学習ポイント
//! - tokio::fs による非同期ファイル I/O
//! - payload をメモリに載せずにコピーする（tokio::io::copy / fs::copy）
//! - std::io::Error を StoreError に変換して外に漏らさない

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::properties;
use crate::domain::{
    BlobSummary, Headers, Message, MessageFactory, Payload, PayloadMode, StoreError,
};
use crate::ports::MessageStore;

pub const PAYLOAD_FILE: &str = "payload.blob";
pub const METADATA_FILE: &str = "metadata.properties";

/// FsMessageStore はルートディレクトリ配下に 1 メッセージ 1 ディレクトリで保存する
#[derive(Debug, Clone)]
pub struct FsMessageStore {
    root: PathBuf,
}

impl FsMessageStore {
    /// ルートディレクトリを（なければ作成して）開く
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| StoreError::io(format!("create store root {}", root.display()), e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// id に対応するディレクトリ。ルートの外を指す id は拒否する
    fn record_dir(&self, id: &str) -> Result<PathBuf, StoreError> {
        if !is_safe_id(id) {
            return Err(StoreError::InvalidId(id.to_string()));
        }
        Ok(self.root.join(id))
    }

    /// 読み出し系の操作では、不正な id は「存在しない」として扱う
    fn existing_dir(&self, id: &str) -> Result<PathBuf, StoreError> {
        self.record_dir(id)
            .map_err(|_| StoreError::NotFound(id.to_string()))
    }
}

fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && !id.contains(['/', '\\', '\0'])
}

#[async_trait]
impl MessageStore for FsMessageStore {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn write(&self, message: &Message) -> Result<(), StoreError> {
        let id = message.id();
        let dir = self.record_dir(id)?;
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::io(format!("create {}", dir.display()), e))?;

        let payload_path = dir.join(PAYLOAD_FILE);
        match message.backing_file() {
            // このストア自身の payload.blob を指している場合はコピー不要
            Some(source) if source == payload_path => {}
            Some(source) => {
                fs::copy(source, &payload_path).await.map_err(|e| {
                    StoreError::io(format!("copy payload for {id} from {}", source.display()), e)
                })?;
            }
            None => {
                let mut reader = message
                    .open_payload()
                    .await
                    .map_err(|e| StoreError::io(format!("open payload for {id}"), e))?;
                let mut file = fs::File::create(&payload_path)
                    .await
                    .map_err(|e| StoreError::io(format!("create payload for {id}"), e))?;
                tokio::io::copy(&mut reader, &mut file)
                    .await
                    .map_err(|e| StoreError::io(format!("write payload for {id}"), e))?;
                file.flush()
                    .await
                    .map_err(|e| StoreError::io(format!("flush payload for {id}"), e))?;
            }
        }

        fs::write(
            dir.join(METADATA_FILE),
            properties::encode(id, message.headers()),
        )
        .await
        .map_err(|e| StoreError::io(format!("write metadata for {id}"), e))?;

        tracing::debug!(message_id = id, dir = %dir.display(), "stored message");
        Ok(())
    }

    async fn get_metadata(&self, id: &str) -> Result<Headers, StoreError> {
        let path = self.existing_dir(id)?.join(METADATA_FILE);
        match fs::read_to_string(&path).await {
            Ok(text) => Ok(properties::decode(&text)),
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    tracing::warn!(message_id = id, error = %e, "metadata is unreadable");
                }
                Err(StoreError::NotFound(id.to_string()))
            }
        }
    }

    async fn build_for_retry_with(
        &self,
        id: &str,
        headers: Headers,
        factory: &dyn MessageFactory,
    ) -> Result<Message, StoreError> {
        let payload_path = self.existing_dir(id)?.join(PAYLOAD_FILE);
        let not_found_or_io = |e: std::io::Error| {
            if e.kind() == ErrorKind::NotFound {
                StoreError::NotFound(id.to_string())
            } else {
                StoreError::io(format!("read payload for {id}"), e)
            }
        };

        let payload = match factory.payload_mode() {
            PayloadMode::FileBacked => {
                fs::metadata(&payload_path).await.map_err(not_found_or_io)?;
                Payload::File(payload_path)
            }
            PayloadMode::Buffered => {
                let bytes = fs::read(&payload_path).await.map_err(not_found_or_io)?;
                Payload::Bytes(bytes.into())
            }
        };
        Ok(factory.create(id, headers, payload))
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let Ok(dir) = self.record_dir(id) else {
            return Ok(false);
        };
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(format!("delete {}", dir.display()), e)),
        }
    }

    async fn report(&self) -> Result<Vec<BlobSummary>, StoreError> {
        let listing_error = |e| StoreError::io(format!("list {}", self.root.display()), e);
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(listing_error(e)),
        };

        let bucket = self.root.display().to_string();
        let mut blobs = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(listing_error)? {
            // 一覧の途中で削除されたレコードは載せない
            let meta = match entry.metadata().await {
                Ok(meta) => meta,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(listing_error(e)),
            };
            if !meta.is_dir() {
                continue;
            }
            // ディレクトリ自体のサイズではなく payload の実サイズを返す
            let size = fs::metadata(entry.path().join(PAYLOAD_FILE))
                .await
                .map(|m| m.len())
                .unwrap_or(0);
            let last_modified_epoch_millis = meta
                .modified()
                .map(|t| DateTime::<Utc>::from(t).timestamp_millis())
                .unwrap_or(0);
            blobs.push(BlobSummary {
                bucket: bucket.clone(),
                name: entry.file_name().to_string_lossy().into_owned(),
                size,
                last_modified_epoch_millis,
            });
        }
        blobs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(blobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FileMessageFactory;
    use rstest::rstest;

    async fn store() -> (tempfile::TempDir, FsMessageStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsMessageStore::open(dir.path().join("failed")).await.unwrap();
        (dir, store)
    }

    fn failed_message(id: &str, payload: &'static str) -> Message {
        Message::with_id(id)
            .payload_with(payload)
            .header_with("pipeline", "wf1")
            .header_with("reason", "timeout: upstream=10s")
    }

    #[tokio::test]
    async fn write_then_build_for_retry_round_trips() {
        let (_dir, store) = store().await;
        let original = failed_message("m1", "hello");
        store.write(&original).await.unwrap();

        let rebuilt = store.build_for_retry("m1").await.unwrap();
        assert_eq!(rebuilt.id(), "m1");
        assert_eq!(rebuilt.headers(), original.headers());
        assert_eq!(rebuilt.payload_bytes().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn write_produces_the_documented_layout() {
        let (_dir, store) = store().await;
        store.write(&failed_message("m1", "hello")).await.unwrap();

        let record = store.root().join("m1");
        assert_eq!(fs::read(record.join(PAYLOAD_FILE)).await.unwrap(), b"hello");
        let metadata = fs::read_to_string(record.join(METADATA_FILE)).await.unwrap();
        assert!(metadata.starts_with("# Metadata for m1\n"));
        assert!(metadata.contains("pipeline=wf1\n"));
    }

    #[tokio::test]
    async fn write_replaces_the_previous_record() {
        let (_dir, store) = store().await;
        store.write(&failed_message("m1", "first")).await.unwrap();
        store
            .write(&Message::with_id("m1").payload_with("second").header_with("pipeline", "wf2"))
            .await
            .unwrap();

        let headers = store.get_metadata("m1").await.unwrap();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("pipeline").map(String::as_str), Some("wf2"));
        let rebuilt = store.build_for_retry("m1").await.unwrap();
        assert_eq!(rebuilt.payload_bytes().await.unwrap(), "second");
    }

    #[tokio::test]
    async fn file_backed_messages_are_copied_and_rebuilt_without_buffering() {
        let (dir, store) = store().await;
        let source = dir.path().join("incoming.bin");
        fs::write(&source, b"large payload").await.unwrap();
        let mut message = Message::with_id("big");
        message.set_payload(Payload::File(source));
        store.write(&message).await.unwrap();

        let rebuilt = store
            .build_for_retry_with("big", Headers::new(), &FileMessageFactory)
            .await
            .unwrap();
        assert_eq!(
            rebuilt.backing_file(),
            Some(store.root().join("big").join(PAYLOAD_FILE).as_path())
        );
        assert_eq!(rebuilt.payload_bytes().await.unwrap(), "large payload");

        // 自分自身の payload.blob を指す Message を書き戻しても壊れない
        store.write(&rebuilt).await.unwrap();
        assert_eq!(rebuilt.payload_bytes().await.unwrap(), "large payload");
    }

    #[tokio::test]
    async fn file_backed_retry_loses_its_payload_when_the_record_is_deleted() {
        let (_dir, store) = store().await;
        store.write(&failed_message("m1", "hello")).await.unwrap();
        let rebuilt = store
            .build_for_retry_with("m1", Headers::new(), &FileMessageFactory)
            .await
            .unwrap();

        assert!(store.delete("m1").await.unwrap());
        let err = rebuilt.payload_bytes().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[rstest]
    #[case("never-written")]
    #[case("..")]
    #[case("a/b")]
    #[case("")]
    #[tokio::test]
    async fn unknown_ids_are_not_found(#[case] id: &str) {
        let (_dir, store) = store().await;
        assert!(store.get_metadata(id).await.unwrap_err().is_not_found());
        assert!(store.build_for_retry(id).await.unwrap_err().is_not_found());
        assert!(!store.delete(id).await.unwrap());
    }

    #[tokio::test]
    async fn write_rejects_ids_that_escape_the_root() {
        let (_dir, store) = store().await;
        let err = store.write(&Message::with_id("../escape")).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidId(_)));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (_dir, store) = store().await;
        store.write(&failed_message("m1", "hello")).await.unwrap();

        assert!(store.delete("m1").await.unwrap());
        assert!(!store.delete("m1").await.unwrap());
        assert!(store.get_metadata("m1").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn report_lists_records_with_payload_size() {
        let (_dir, store) = store().await;
        store.write(&failed_message("b", "hello")).await.unwrap();
        store.write(&failed_message("a", "hi")).await.unwrap();
        fs::write(store.root().join("stray.txt"), b"not a record").await.unwrap();

        let blobs = store.report().await.unwrap();
        let names: Vec<_> = blobs.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(blobs[0].size, 2);
        assert_eq!(blobs[1].size, 5);
        assert_eq!(blobs[0].bucket, store.root().display().to_string());
        assert!(blobs[0].last_modified_epoch_millis > 0);
    }

    #[tokio::test]
    async fn report_on_a_missing_root_is_empty() {
        let (_dir, store) = store().await;
        fs::remove_dir_all(store.root()).await.unwrap();
        assert!(store.report().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn report_tolerates_records_deleted_while_listing() {
        let (_dir, store) = store().await;
        let store = std::sync::Arc::new(store);
        for round in 0..20 {
            let ids: Vec<String> = (0..50).map(|i| format!("r{round}-m{i}")).collect();
            for id in &ids {
                store.write(&failed_message(id, "x")).await.unwrap();
            }

            let deletes: Vec<_> = ids
                .into_iter()
                .map(|id| {
                    let store = std::sync::Arc::clone(&store);
                    tokio::spawn(async move { store.delete(&id).await })
                })
                .collect();
            let listed = store.report().await.unwrap();
            assert!(listed.len() <= 50);
            for delete in deletes {
                assert!(delete.await.unwrap().unwrap());
            }
        }
        assert!(store.report().await.unwrap().is_empty());
    }
}
