//! BlobSummary - 保存済みメッセージの一覧用レコード
//!
//! payload を含まず、場所・サイズ・更新時刻だけを表す。
//! 一覧表示専用で、StoredRecord に戻すことはない。

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobSummary {
    /// 格納先（ディレクトリやバケット）
    pub bucket: String,
    /// メッセージ id
    pub name: String,
    /// payload のバイト数
    pub size: u64,
    pub last_modified_epoch_millis: i64,
}

impl BlobSummary {
    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.last_modified_epoch_millis)
            .single()
    }
}
