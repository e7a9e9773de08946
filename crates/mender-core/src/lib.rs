//! mender-core
//!
//! 失敗したメッセージを保存し、HTTP から一覧・再投入・削除するための部品。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（Message, Payload, BlobSummary, errors）
//! - **ports**: 抽象化レイヤー（MessageStore, Pipeline, PipelineRegistry, BlobRenderer, Component）
//! - **impls**: 実装（FsMessageStore, InMemoryMessageStore, レンダラ, InMemoryPipelineRegistry）
//! - **app**: アプリケーションロジック（RetryController, RetryDispatcher, HttpListener）
//! - **config**: TOML 設定

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
