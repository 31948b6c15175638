//! AgentManager port - タスクごとにコーディングエージェントを実行する
//!
//! `start_task_execution` を呼んだ時点で実行の所有権はエージェントマネージャに移る。
//! スケジューラは終了を exit チャネル経由でしか知らない。

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::domain::{AgentError, AgentExit, SpecId, TaskId};

/// 開始要求に添えるオプション
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOptions {
    /// ユーザーではなくキューが開始を決めたときに立てる
    pub auto_queued: bool,
}

#[async_trait]
pub trait AgentManager: Send + Sync {
    /// このタスクのエージェントが実行中か
    fn is_running(&self, task_id: &TaskId) -> bool;

    /// 実行中タスク ID のライブ集合（全プロジェクト分）
    fn running_tasks(&self) -> Vec<TaskId>;

    async fn start_task_execution(
        &self,
        task_id: &TaskId,
        project_path: &Path,
        spec_id: &SpecId,
        options: ExecutionOptions,
    ) -> Result<(), AgentError>;

    async fn kill_all(&self) -> Result<(), AgentError>;

    /// 実行終了の通知を購読
    fn subscribe_exits(&self) -> broadcast::Receiver<AgentExit>;
}
