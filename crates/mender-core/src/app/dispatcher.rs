//! RetryDispatcher - 再投入メッセージを 1 本のワーカーで順に処理する
//!
//! # 設計原則
//! - HTTP のスレッドはパイプラインの完了を待たない
//! - 投入順 = 処理順（FIFO）。パイプラインが遅ければキューが伸びるだけで、
//!   同時実行数は増えない
//! - 実行中の再投入はキャンセルしない
//! - shutdown はキューを閉じて grace 期間だけ待つ。期限を過ぎた分は諦めてログに残す
//!
//! # 学習ポイント
//! - mpsc::unbounded_channel + tokio::spawn による単一コンシューマ
//! - tokio::time::timeout による期限付きの join

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::domain::{ControllerError, Message};
use crate::ports::{Component, LifecycleError, Pipeline};

struct RetryJob {
    pipeline: Arc<dyn Pipeline>,
    message: Message,
}

#[derive(Default)]
struct WorkerSlot {
    tx: Option<mpsc::UnboundedSender<RetryJob>>,
    join: Option<JoinHandle<()>>,
}

pub struct RetryDispatcher {
    grace: Duration,
    slot: Mutex<WorkerSlot>,
    pending: Arc<AtomicUsize>,
}

impl RetryDispatcher {
    pub fn new(grace: Duration) -> Self {
        Self {
            grace,
            slot: Mutex::new(WorkerSlot::default()),
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 投入済みで、まだ処理が終わっていない件数
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub async fn is_running(&self) -> bool {
        self.slot.lock().await.tx.is_some()
    }

    /// ワーカーを起動する（起動済みなら何もしない）
    pub async fn spawn_worker(&self) {
        let mut slot = self.slot.lock().await;
        if slot.tx.is_some() {
            return;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        slot.tx = Some(tx);
        slot.join = Some(tokio::spawn(worker_loop(rx, Arc::clone(&self.pending))));
    }

    /// メッセージをキューに積む。完了は待たない
    pub async fn submit(
        &self,
        pipeline: Arc<dyn Pipeline>,
        message: Message,
    ) -> Result<(), ControllerError> {
        let slot = self.slot.lock().await;
        let tx = slot.tx.as_ref().ok_or_else(|| {
            ControllerError::DownstreamUnavailable("retry dispatcher is not running".to_string())
        })?;

        self.pending.fetch_add(1, Ordering::SeqCst);
        if tx.send(RetryJob { pipeline, message }).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(ControllerError::DownstreamUnavailable(
                "retry worker has exited".to_string(),
            ));
        }
        Ok(())
    }

    /// キューを閉じ、grace 期間だけ残りの処理を待つ
    pub async fn shutdown(&self) {
        let (tx, join) = {
            let mut slot = self.slot.lock().await;
            (slot.tx.take(), slot.join.take())
        };
        // sender を落とすとワーカーは残りを処理してから抜ける
        drop(tx);
        let Some(mut join) = join else {
            return;
        };

        match tokio::time::timeout(self.grace, &mut join).await {
            Ok(_) => tracing::info!("retry worker drained"),
            Err(_) => {
                tracing::warn!(
                    grace_secs = self.grace.as_secs(),
                    abandoned = self.pending(),
                    "retry worker did not drain in time; abandoning pending retries"
                );
                join.abort();
            }
        }
    }
}

async fn worker_loop(mut rx: mpsc::UnboundedReceiver<RetryJob>, pending: Arc<AtomicUsize>) {
    while let Some(RetryJob { pipeline, message }) = rx.recv().await {
        let pipeline_id = pipeline.id().to_string();
        let message_id = message.id().to_string();

        // パイプライン内の panic でワーカーが止まらないよう、1 件ずつ別タスクで実行して待つ
        let outcome = tokio::spawn(async move { pipeline.process(message).await }).await;
        match outcome {
            Ok(Ok(())) => {
                tracing::info!(pipeline = %pipeline_id, message_id = %message_id, "retry completed");
            }
            Ok(Err(e)) => {
                tracing::error!(pipeline = %pipeline_id, message_id = %message_id, error = %e, "retry failed");
            }
            Err(e) => {
                tracing::error!(pipeline = %pipeline_id, message_id = %message_id, error = %e, "retry task panicked");
            }
        }
        pending.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Component for RetryDispatcher {
    fn name(&self) -> &str {
        "retry-dispatcher"
    }

    async fn start(&self) -> Result<(), LifecycleError> {
        self.spawn_worker().await;
        Ok(())
    }

    async fn stop(&self) -> Result<(), LifecycleError> {
        self.shutdown().await;
        Ok(())
    }
}
