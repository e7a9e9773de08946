//! MessageStore port - 失敗したメッセージの永続ストア
//!
//! MessageStore は以下を管理します：
//! - payload（巨大になりうるのでストリーミングで扱う）
//! - ヘッダー（元のパイプライン id などのメタデータ）
//!
//! # 設計原則
//! - 必須操作は write / get_metadata / build_for_retry_with の 3 つ
//! - build_for_retry / delete / report はデフォルト実装を持つ
//! - バックエンド固有のエラー型は StoreError に変換して返す
//! - 操作間のトランザクションはない（同じ id への write と delete の競合は後勝ち）

use async_trait::async_trait;

use crate::domain::{
    BlobSummary, DefaultMessageFactory, Headers, Message, MessageFactory, StoreError,
};

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// ログ出力用の名前
    fn name(&self) -> &str;

    /// message.id() に payload とヘッダーを保存する（既存のレコードは置き換える）
    async fn write(&self, message: &Message) -> Result<(), StoreError>;

    /// id のヘッダーを返す。存在しなければ NotFound
    async fn get_metadata(&self, id: &str) -> Result<Headers, StoreError>;

    /// 渡されたヘッダーと factory で再投入用の Message を組み立てる
    ///
    /// 呼び出し側が get_metadata 済みの場合に再読み込みを避けるため、
    /// ヘッダーは引数で受け取る。
    async fn build_for_retry_with(
        &self,
        id: &str,
        headers: Headers,
        factory: &dyn MessageFactory,
    ) -> Result<Message, StoreError>;

    /// メタデータを読み、デフォルトの factory で Message を組み立てる
    async fn build_for_retry(&self, id: &str) -> Result<Message, StoreError> {
        let headers = self.get_metadata(id).await?;
        self.build_for_retry_with(id, headers, &DefaultMessageFactory)
            .await
    }

    /// レコードを削除する。実際に削除したら true
    async fn delete(&self, _id: &str) -> Result<bool, StoreError> {
        Err(StoreError::Unsupported("delete"))
    }

    /// 保存済みレコードの一覧
    async fn report(&self) -> Result<Vec<BlobSummary>, StoreError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Payload;

    /// 必須操作だけを実装したストア
    struct ReadOnlyStore;

    #[async_trait]
    impl MessageStore for ReadOnlyStore {
        fn name(&self) -> &str {
            "read-only"
        }

        async fn write(&self, _message: &Message) -> Result<(), StoreError> {
            Ok(())
        }

        async fn get_metadata(&self, id: &str) -> Result<Headers, StoreError> {
            if id != "known" {
                return Err(StoreError::NotFound(id.to_string()));
            }
            let mut headers = Headers::new();
            headers.insert("pipeline".to_string(), "wf1".to_string());
            Ok(headers)
        }

        async fn build_for_retry_with(
            &self,
            id: &str,
            headers: Headers,
            factory: &dyn MessageFactory,
        ) -> Result<Message, StoreError> {
            Ok(factory.create(id, headers, Payload::Bytes("stored".into())))
        }
    }

    #[tokio::test]
    async fn default_build_for_retry_reads_metadata_first() {
        let message = ReadOnlyStore.build_for_retry("known").await.unwrap();
        assert_eq!(message.id(), "known");
        assert_eq!(message.header("pipeline"), Some("wf1"));

        let err = ReadOnlyStore.build_for_retry("unknown").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn default_delete_is_unsupported() {
        let err = ReadOnlyStore.delete("known").await.unwrap_err();
        assert!(matches!(err, StoreError::Unsupported("delete")));
    }

    #[tokio::test]
    async fn default_report_is_empty() {
        assert!(ReadOnlyStore.report().await.unwrap().is_empty());
    }
}
