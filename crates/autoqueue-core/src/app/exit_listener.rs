//! ExitListener - エージェントの終了通知をキューのトリガーに変える
//!
//! 終了ごとに別タスクで処理するので、あるプロジェクトの遅い開始が
//! 別プロジェクトの終了処理を待たせない。チャネルが遅れた（Lagged）場合は
//! 落ちた終了通知が分からないので、全プロジェクトをトリガーし直す。

use std::sync::Weak;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;

use super::queue_manager::TaskQueueManager;
use crate::domain::AgentExit;

pub(crate) async fn run(
    manager: Weak<TaskQueueManager>,
    mut exits: broadcast::Receiver<AgentExit>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        let received = tokio::select! {
            _ = stop.changed() => break,
            received = exits.recv() => received,
        };
        let Some(manager) = manager.upgrade() else {
            break;
        };

        match received {
            Ok(exit) => {
                tokio::spawn(async move {
                    if let Err(err) = manager
                        .handle_task_exit(&exit.task_id, exit.exit_code, &exit.reason)
                        .await
                    {
                        tracing::error!(task_id = %exit.task_id, error = %err, "failed to refill queue after task exit");
                    }
                });
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "exit channel lagged; re-triggering all queues");
                tokio::spawn(async move {
                    if let Err(err) = manager.trigger_all_queues().await {
                        tracing::error!(error = %err, "failed to re-trigger queues after lag");
                    }
                });
            }
            Err(RecvError::Closed) => break,
        }
    }
    tracing::debug!("exit listener stopped");
}
