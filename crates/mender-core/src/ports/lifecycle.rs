//! Lifecycle port - prepare → init → start / stop → close
//!
//! # 設計原則
//! - 継承ではなく、子コンポーネントの明示的なリスト（Cascade）を順に回す
//! - prepare / init / start は登録順、stop / close は逆順
//! - 各フェーズのデフォルト実装は何もしない

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// Phase はライフサイクルの各段階
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Prepare,
    Init,
    Start,
    Stop,
    Close,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Prepare => "prepare",
            Phase::Init => "init",
            Phase::Start => "start",
            Phase::Stop => "stop",
            Phase::Close => "close",
        };
        f.write_str(s)
    }
}

/// LifecycleState はコンポーネントの現在の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Prepared,
    Initialized,
    Started,
    Stopped,
    Closed,
}

impl LifecycleState {
    /// phase を適用した後の状態。許されない遷移なら None
    ///
    /// - stop → start で再起動できる
    /// - close は started 以外のどこからでも可能
    pub fn after(self, phase: Phase) -> Option<LifecycleState> {
        use LifecycleState::*;
        match (self, phase) {
            (Created, Phase::Prepare) => Some(Prepared),
            (Prepared, Phase::Init) => Some(Initialized),
            (Initialized | Stopped, Phase::Start) => Some(Started),
            (Started, Phase::Stop) => Some(Stopped),
            (Created | Prepared | Initialized | Stopped, Phase::Close) => Some(Closed),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("{component}: cannot {phase} while {state:?}")]
    InvalidTransition {
        component: String,
        phase: Phase,
        state: LifecycleState,
    },

    #[error("{component}: {phase} failed: {reason}")]
    Failed {
        component: String,
        phase: Phase,
        reason: String,
    },
}

impl LifecycleError {
    pub fn failed(component: impl Into<String>, phase: Phase, reason: impl fmt::Display) -> Self {
        LifecycleError::Failed {
            component: component.into(),
            phase,
            reason: reason.to_string(),
        }
    }
}

/// Component はライフサイクルを持つ部品
#[async_trait]
pub trait Component: Send + Sync {
    fn name(&self) -> &str;

    async fn prepare(&self) -> Result<(), LifecycleError> {
        Ok(())
    }

    async fn init(&self) -> Result<(), LifecycleError> {
        Ok(())
    }

    async fn start(&self) -> Result<(), LifecycleError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), LifecycleError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), LifecycleError> {
        Ok(())
    }
}

/// Cascade は子コンポーネントに同じフェーズを順に適用する
#[derive(Default, Clone)]
pub struct Cascade {
    children: Vec<Arc<dyn Component>>,
}

impl Cascade {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, child: Arc<dyn Component>) {
        self.children.push(child);
    }

    pub fn names(&self) -> Vec<&str> {
        self.children.iter().map(|c| c.name()).collect()
    }

    /// 全ての子に phase を適用する。最初の失敗で止まる
    pub async fn run(&self, phase: Phase) -> Result<(), LifecycleError> {
        let reverse = matches!(phase, Phase::Stop | Phase::Close);
        let ordered: Vec<&Arc<dyn Component>> = if reverse {
            self.children.iter().rev().collect()
        } else {
            self.children.iter().collect()
        };

        for child in ordered {
            tracing::debug!(component = child.name(), %phase, "lifecycle phase");
            match phase {
                Phase::Prepare => child.prepare().await?,
                Phase::Init => child.init().await?,
                Phase::Start => child.start().await?,
                Phase::Stop => child.stop().await?,
                Phase::Close => child.close().await?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        name: String,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Component for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        async fn start(&self) -> Result<(), LifecycleError> {
            self.log.lock().unwrap().push(format!("start:{}", self.name));
            Ok(())
        }

        async fn stop(&self) -> Result<(), LifecycleError> {
            self.log.lock().unwrap().push(format!("stop:{}", self.name));
            Ok(())
        }
    }

    #[tokio::test]
    async fn cascade_starts_forward_and_stops_in_reverse() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut cascade = Cascade::new();
        for name in ["store", "http"] {
            cascade.push(Arc::new(Recorder {
                name: name.to_string(),
                log: log.clone(),
            }));
        }

        cascade.run(Phase::Start).await.unwrap();
        cascade.run(Phase::Stop).await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["start:store", "start:http", "stop:http", "stop:store"]
        );
    }

    #[test]
    fn state_transitions_follow_the_phase_order() {
        let state = LifecycleState::Created;
        assert_eq!(state.after(Phase::Start), None);

        let state = state.after(Phase::Prepare).unwrap();
        let state = state.after(Phase::Init).unwrap();
        let state = state.after(Phase::Start).unwrap();
        assert_eq!(state.after(Phase::Close), None);

        let state = state.after(Phase::Stop).unwrap();
        assert_eq!(state.after(Phase::Start), Some(LifecycleState::Started));
        assert_eq!(state.after(Phase::Close), Some(LifecycleState::Closed));
    }
}
