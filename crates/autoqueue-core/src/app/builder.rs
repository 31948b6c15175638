//! QueueManagerBuilder - キューマネージャの構築とワイヤリング
//!
//! # Fail-fast 設計
//! - ストアとエージェントマネージャは必須。最初のトリガーで落ちるのではなく、
//!   `build()` がどちらが欠けているかを報告する
//! - 何かを作る前に設定を検証する
//! - Clock と EventSink は `SystemClock` と `NoopEventSink` がデフォルト

use std::sync::Arc;

use super::config::{ConfigError, ManagerConfig};
use super::queue_manager::TaskQueueManager;
use crate::impls::NoopEventSink;
use crate::ports::{AgentManager, Clock, EventSink, ProjectStore, SystemClock};

/// # 使用例
/// ```ignore
/// let manager = QueueManagerBuilder::new()
///     .store(store)
///     .agents(agents)
///     .events(events)
///     .build()?;
/// manager.start();
/// ```
#[derive(Default)]
pub struct QueueManagerBuilder {
    store: Option<Arc<dyn ProjectStore>>,
    agents: Option<Arc<dyn AgentManager>>,
    events: Option<Arc<dyn EventSink>>,
    clock: Option<Arc<dyn Clock>>,
    config: ManagerConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing collaborator: {0}. Set it on the builder before build().")]
    Missing(&'static str),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl QueueManagerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(mut self, store: Arc<dyn ProjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn agents(mut self, agents: Arc<dyn AgentManager>) -> Self {
        self.agents = Some(agents);
        self
    }

    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Arc<TaskQueueManager>, BuildError> {
        self.config.validate()?;
        let store = self.store.ok_or(BuildError::Missing("store"))?;
        let agents = self.agents.ok_or(BuildError::Missing("agents"))?;
        let events = self.events.unwrap_or_else(|| Arc::new(NoopEventSink) as Arc<dyn EventSink>);
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);

        Ok(Arc::new(TaskQueueManager::new(
            store,
            agents,
            events,
            clock,
            self.config,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{InMemoryProjectStore, SimulatedAgentManager};

    fn collaborators() -> (Arc<InMemoryProjectStore>, Arc<SimulatedAgentManager>) {
        let store = Arc::new(InMemoryProjectStore::new());
        let agents = Arc::new(SimulatedAgentManager::new(store.clone()));
        (store, agents)
    }

    #[test]
    fn build_success_with_defaults() {
        let (store, agents) = collaborators();
        let manager = QueueManagerBuilder::new().store(store).agents(agents).build();
        assert!(manager.is_ok());
    }

    #[test]
    fn build_reports_missing_store() {
        let (_, agents) = collaborators();
        let result = QueueManagerBuilder::new().agents(agents).build();
        assert!(matches!(result, Err(BuildError::Missing("store"))));
    }

    #[test]
    fn build_reports_missing_agents() {
        let (store, _) = collaborators();
        let result = QueueManagerBuilder::new().store(store).build();
        assert!(matches!(result, Err(BuildError::Missing("agents"))));
    }

    #[test]
    fn build_rejects_invalid_config() {
        let (store, agents) = collaborators();
        let result = QueueManagerBuilder::new()
            .store(store)
            .agents(agents)
            .config(ManagerConfig {
                prune_interval_secs: 0,
                ..ManagerConfig::default()
            })
            .build();
        assert!(matches!(result, Err(BuildError::Config(ConfigError::Invalid(_)))));
    }
}
