//! エラー型
//!
//! # 分類
//! - `AgentError`: エージェントマネージャが実行を開始/停止できなかった
//! - `StoreError`: プロジェクトストアがレコードを見つけられない/書けない
//! - `QueueError`: スケジューラが呼び出し側に返すエラー

use thiserror::Error;

use super::ids::{ProjectId, TaskId};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AgentError {
    #[error("failed to start task {task_id}: {message}")]
    StartFailed { task_id: TaskId, message: String },

    #[error("task {0} is already running")]
    AlreadyRunning(TaskId),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("project not found: {0}")]
    ProjectNotFound(ProjectId),
}

#[derive(Debug, Error)]
pub enum QueueError {
    /// `start_task_execution` が拒否された。タスクは backlog に残り、
    /// 次のトリガーで再び選ばれる
    #[error("dispatch of task {task_id} failed")]
    Dispatch {
        task_id: TaskId,
        #[source]
        source: AgentError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid max concurrent value: {0}")]
    InvalidConcurrency(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn dispatch_error_keeps_agent_cause() {
        let err = QueueError::Dispatch {
            task_id: TaskId::new("T1"),
            source: AgentError::StartFailed {
                task_id: TaskId::new("T1"),
                message: "spawn failed".into(),
            },
        };
        assert_eq!(err.to_string(), "dispatch of task T1 failed");
        let cause = err.source().unwrap().to_string();
        assert!(cause.contains("spawn failed"));
    }

    #[test]
    fn store_error_converts() {
        let err: QueueError = StoreError::ProjectNotFound(ProjectId::new("P9")).into();
        assert_eq!(err.to_string(), "project not found: P9");
    }
}
