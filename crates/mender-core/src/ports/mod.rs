//! Ports - 抽象化レイヤー
//!
//! 各 trait は外部の協調者（ストレージ、パイプライン、レンダラ）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - store は HTTP を知らない
//! - controller はファイルシステムに直接触れない（必ず MessageStore を経由する）

pub mod lifecycle;
pub mod message_store;
pub mod pipeline;
pub mod renderer;

// 主要な trait を再エクスポート
pub use self::lifecycle::{Cascade, Component, LifecycleError, LifecycleState, Phase};
pub use self::message_store::MessageStore;
pub use self::pipeline::{Pipeline, PipelineError, PipelineRegistry};
pub use self::renderer::BlobRenderer;
