//! Tracing の初期化
//!
//! filter の優先順位: `RUST_LOG` → `MENDER_LOG` → 設定の `[log] filter` → 既定値。
//! 解釈できない指定は読み飛ばして次の候補を使う。

use std::env;

use mender_core::config::LogConfig;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,mender_core=debug,mender=debug";

pub fn init(config: &LogConfig) {
    let candidates = [
        env::var("RUST_LOG").ok(),
        env::var("MENDER_LOG").ok(),
        config.filter.clone(),
    ];
    let _ = tracing_subscriber::fmt()
        .with_target(true)
        .with_env_filter(pick_filter(candidates))
        .try_init();
}

/// 最初に空でなく、かつ解釈できる指定を採用する
fn pick_filter(candidates: impl IntoIterator<Item = Option<String>>) -> EnvFilter {
    candidates
        .into_iter()
        .flatten()
        .filter(|directives| !directives.trim().is_empty())
        .find_map(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}
