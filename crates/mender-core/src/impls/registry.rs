//! InMemoryPipelineRegistry - id → Pipeline の対応表
//!
//! 初期化時に登録し（mutable）、実行時は参照だけ（immutable）。
//! ロックを持たずにシンプルに保つ。

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::ports::{Pipeline, PipelineRegistry};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("pipeline '{0}' is already registered")]
    AlreadyRegistered(String),
}

#[derive(Default)]
pub struct InMemoryPipelineRegistry {
    pipelines: HashMap<String, Arc<dyn Pipeline>>,
}

impl InMemoryPipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pipeline を登録する（同じ id の二重登録はエラー）
    pub fn register(&mut self, pipeline: Arc<dyn Pipeline>) -> Result<(), RegistryError> {
        let id = pipeline.id().to_string();
        if self.pipelines.contains_key(&id) {
            return Err(RegistryError::AlreadyRegistered(id));
        }
        self.pipelines.insert(id, pipeline);
        Ok(())
    }

    pub fn registered_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.pipelines.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

impl PipelineRegistry for InMemoryPipelineRegistry {
    fn lookup(&self, id: &str) -> Option<Arc<dyn Pipeline>> {
        self.pipelines.get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DefaultMessageFactory, Message, MessageFactory};
    use crate::ports::PipelineError;
    use async_trait::async_trait;

    struct NoopPipeline(&'static str);

    #[async_trait]
    impl Pipeline for NoopPipeline {
        fn id(&self) -> &str {
            self.0
        }

        fn message_factory(&self) -> Arc<dyn MessageFactory> {
            Arc::new(DefaultMessageFactory)
        }

        async fn process(&self, _message: Message) -> Result<(), PipelineError> {
            Ok(())
        }
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = InMemoryPipelineRegistry::new();
        registry.register(Arc::new(NoopPipeline("wf1"))).unwrap();
        registry.register(Arc::new(NoopPipeline("wf2"))).unwrap();

        assert_eq!(registry.lookup("wf1").map(|p| p.id().to_string()), Some("wf1".to_string()));
        assert!(registry.lookup("missing").is_none());
        assert_eq!(registry.registered_ids(), vec!["wf1", "wf2"]);
    }

    #[test]
    fn double_registration_is_rejected() {
        let mut registry = InMemoryPipelineRegistry::new();
        registry.register(Arc::new(NoopPipeline("wf1"))).unwrap();
        let result = registry.register(Arc::new(NoopPipeline("wf1")));
        assert!(matches!(result, Err(RegistryError::AlreadyRegistered(id)) if id == "wf1"));
        assert_eq!(registry.len(), 1);
    }
}
