//! Events - スケジューラの境界をまたぐイベント
//!
//! - [`AgentExit`]: 入力。実行終了時にエージェントマネージャが発行
//! - [`QueueEvent`]: 出力。UI 向けにスケジューラが発行

use serde::{Deserialize, Serialize};

use super::ids::{ProjectId, TaskId};
use super::status::QueueStatus;

/// 終了したエージェント実行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentExit {
    pub task_id: TaskId,
    /// シグナルで終了した場合は `None`
    pub exit_code: Option<i32>,
    pub reason: String,
}

impl AgentExit {
    pub fn new(task_id: TaskId, exit_code: Option<i32>, reason: impl Into<String>) -> Self {
        Self {
            task_id,
            exit_code,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum QueueEvent {
    /// トリガーサイクルの終了時とキュー設定の変更時に発行
    #[serde(rename_all = "camelCase")]
    QueueStatusUpdate {
        project_id: ProjectId,
        status: QueueStatus,
    },
}

impl QueueEvent {
    /// UI ブリッジが使うチャネル名
    pub fn name(&self) -> &'static str {
        match self {
            QueueEvent::QueueStatusUpdate { .. } => "queue-status-update",
        }
    }

    pub fn project_id(&self) -> &ProjectId {
        match self {
            QueueEvent::QueueStatusUpdate { project_id, .. } => project_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_update_serializes_with_its_channel_name() {
        let event = QueueEvent::QueueStatusUpdate {
            project_id: ProjectId::new("P1"),
            status: QueueStatus::default(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.name());
        assert_eq!(json["projectId"], "P1");
        assert_eq!(json["status"]["backlogCount"], 0);
    }
}
