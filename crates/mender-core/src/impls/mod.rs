//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **FsMessageStore**: ディレクトリ単位の永続ストア（本番用）
//! - **InMemoryMessageStore**: テスト・開発用のストア
//! - **NameListRenderer / JsonBlobRenderer**: 一覧のレンダラ
//! - **InMemoryPipelineRegistry**: パイプラインの登録表

pub mod fs_store;
pub mod memory_store;
pub mod properties;
pub mod registry;
pub mod renderer;

// 主要な型を再エクスポート
pub use self::fs_store::FsMessageStore;
pub use self::memory_store::InMemoryMessageStore;
pub use self::registry::{InMemoryPipelineRegistry, RegistryError};
pub use self::renderer::{JsonBlobRenderer, NameListRenderer};
