//! mender - 失敗メッセージの再投入サーバー
//!
//! 1. 設定を読み込む（--config, 個別の上書き）
//! 2. FsMessageStore と組み込みパイプラインを用意する
//! 3. RetryController を prepare → init → start
//! 4. Ctrl-C で stop → close

mod logging;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use mender_core::app::RetryController;
use mender_core::config::MenderConfig;
use mender_core::domain::{DefaultMessageFactory, Message, MessageFactory};
use mender_core::impls::{FsMessageStore, InMemoryPipelineRegistry};
use mender_core::ports::{Component, Pipeline, PipelineError};

#[derive(Debug, Parser)]
#[command(name = "mender", about = "Serve failed messages for listing, retry and deletion")]
struct Args {
    /// TOML 設定ファイル
    #[arg(long)]
    config: Option<PathBuf>,

    /// store.base_dir を上書き
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// http.bind_addr を上書き
    #[arg(long)]
    bind: Option<SocketAddr>,
}

/// 再投入されたメッセージをログに出すだけの組み込みパイプライン
struct LogPipeline;

#[async_trait]
impl Pipeline for LogPipeline {
    fn id(&self) -> &str {
        "log"
    }

    fn message_factory(&self) -> Arc<dyn MessageFactory> {
        Arc::new(DefaultMessageFactory)
    }

    async fn process(&self, message: Message) -> Result<(), PipelineError> {
        let payload = message
            .payload_bytes()
            .await
            .map_err(|e| PipelineError::new("log", e.to_string()))?;
        tracing::info!(
            message_id = message.id(),
            headers = ?message.headers(),
            bytes = payload.len(),
            "retried message"
        );
        Ok(())
    }
}

fn load_config(args: &Args) -> anyhow::Result<MenderConfig> {
    let mut config = match &args.config {
        Some(path) => MenderConfig::load(path)?,
        None => MenderConfig::default(),
    };
    if let Some(base_dir) = &args.base_dir {
        config.store.base_dir = base_dir.clone();
    }
    if let Some(bind) = args.bind {
        config.http.bind_addr = bind;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    logging::init(&config.log);

    let store = FsMessageStore::open(&config.store.base_dir)
        .await
        .with_context(|| format!("open store at {}", config.store.base_dir.display()))?;
    let mut registry = InMemoryPipelineRegistry::new();
    registry.register(Arc::new(LogPipeline))?;

    let controller = RetryController::builder(config)
        .store(Arc::new(store))
        .registry(Arc::new(registry))
        .build()?;

    controller.prepare().await?;
    controller.init().await?;
    controller.start().await?;
    if let Some(addr) = controller.http().local_addr().await {
        tracing::info!(%addr, "mender is listening");
    }

    tokio::signal::ctrl_c()
        .await
        .context("wait for ctrl-c")?;
    tracing::info!("shutting down");

    controller.stop().await?;
    controller.close().await?;
    Ok(())
}
