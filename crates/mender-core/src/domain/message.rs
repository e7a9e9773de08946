//! Message - パイプラインを流れるデータの単位
//!
//! Message は id・headers・payload の 3 つで構成されます。
//! payload はメモリ上のバッファか、ファイルへの参照のどちらかです。
//!
//! # 学習ポイント
//! - enum による表現の切り替え（Bytes / File）
//! - 大きな payload を AsyncRead としてストリーミングで扱う
//! - trait object（`dyn MessageFactory`）による生成方法の差し替え

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use bytes::Bytes;
use tokio::io::AsyncRead;
use ulid::Ulid;

/// ヘッダーのマップ
///
/// 挿入順は意味を持たないので、比較と永続化が安定する BTreeMap を使う。
pub type Headers = BTreeMap<String, String>;

/// Payload の読み出し用ストリーム
pub type PayloadReader = Pin<Box<dyn AsyncRead + Send>>;

/// Payload はメモリ上のバイト列か、ファイルへの参照
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Bytes(Bytes),
    File(PathBuf),
}

impl Default for Payload {
    fn default() -> Self {
        Payload::Bytes(Bytes::new())
    }
}

/// Message は id・ヘッダー・payload を持つデータの単位
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    id: String,
    headers: Headers,
    payload: Payload,
}

impl Message {
    /// ULID で id を採番した空の Message を作成
    pub fn new() -> Self {
        Self::with_id(Ulid::new().to_string())
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            headers: Headers::new(),
            payload: Payload::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn set_headers(&mut self, headers: Headers) {
        self.headers = headers;
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(key.into(), value.into());
    }

    /// Builder 風にヘッダーを追加
    pub fn header_with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(key, value);
        self
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn set_payload(&mut self, payload: Payload) {
        self.payload = payload;
    }

    pub fn set_payload_bytes(&mut self, bytes: impl Into<Bytes>) {
        self.payload = Payload::Bytes(bytes.into());
    }

    /// Builder 風に payload を設定
    pub fn payload_with(mut self, bytes: impl Into<Bytes>) -> Self {
        self.set_payload_bytes(bytes);
        self
    }

    /// payload がファイルで裏付けられていればそのパス
    pub fn backing_file(&self) -> Option<&Path> {
        match &self.payload {
            Payload::File(path) => Some(path),
            Payload::Bytes(_) => None,
        }
    }

    /// payload をストリームとして開く
    pub async fn open_payload(&self) -> io::Result<PayloadReader> {
        match &self.payload {
            Payload::Bytes(bytes) => Ok(Box::pin(io::Cursor::new(bytes.clone()))),
            Payload::File(path) => {
                let file = tokio::fs::File::open(path).await?;
                Ok(Box::pin(file))
            }
        }
    }

    /// payload 全体をメモリに読み込む
    ///
    /// ファイルで裏付けられている場合は全体を読むので、巨大な payload には使わないこと。
    pub async fn payload_bytes(&self) -> io::Result<Bytes> {
        match &self.payload {
            Payload::Bytes(bytes) => Ok(bytes.clone()),
            Payload::File(path) => tokio::fs::read(path).await.map(Bytes::from),
        }
    }
}

impl Default for Message {
    fn default() -> Self {
        Self::new()
    }
}

/// PayloadMode は MessageFactory が作る Message の payload の持ち方
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadMode {
    /// payload をメモリに読み込む
    Buffered,
    /// payload をファイル参照のまま保持する（コピーしない）
    FileBacked,
}

/// MessageFactory は再投入用の Message を組み立てる
///
/// パイプラインごとに期待する Message の形が異なるため、
/// store は factory に従って payload を用意する。
pub trait MessageFactory: Send + Sync {
    fn payload_mode(&self) -> PayloadMode;

    /// id・ヘッダー・payload から Message を作成
    fn create(&self, id: &str, headers: Headers, payload: Payload) -> Message {
        let mut message = Message::with_id(id);
        message.set_headers(headers);
        message.set_payload(payload);
        message
    }
}

/// メモリ上に payload を持つデフォルトの factory
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultMessageFactory;

impl MessageFactory for DefaultMessageFactory {
    fn payload_mode(&self) -> PayloadMode {
        PayloadMode::Buffered
    }
}

/// ファイル参照のまま payload を持つ factory
///
/// FsMessageStore では保存済みの `payload.blob` を直接指す。
/// 再投入の受付後、パイプラインが読む前にレコードが削除されると
/// payload の読み出しは NotFound になる。
#[derive(Debug, Clone, Copy, Default)]
pub struct FileMessageFactory;

impl MessageFactory for FileMessageFactory {
    fn payload_mode(&self) -> PayloadMode {
        PayloadMode::FileBacked
    }
}
