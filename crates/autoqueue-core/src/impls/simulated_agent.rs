//! SimulatedAgentManager - 何も実行しないエージェントマネージャ
//!
//! 実行中集合を追跡し、実際のエージェントマネージャと同じようにストアへ
//! status を反映する:
//! - start: （任意の遅延）→ 実行中集合 + `in_progress`
//! - `finish`: 実行中集合から除去 + `completed`/`failed` + exit 通知
//! - `kill_all`: 全実行中タスク → `paused` + exit 通知
//!
//! CLI デモとテストで使う。テストからは開始失敗の注入や開始要求の検査もできる。

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::domain::{AgentError, AgentExit, SpecId, TaskId, TaskStatus};
use crate::ports::{AgentManager, ExecutionOptions, ProjectStore};

const EXIT_CHANNEL_CAPACITY: usize = 256;

/// 成功した `start_task_execution` 呼び出し 1 件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRecord {
    pub task_id: TaskId,
    pub project_path: PathBuf,
    pub spec_id: SpecId,
    pub options: ExecutionOptions,
}

#[derive(Default)]
struct AgentState {
    running: BTreeSet<TaskId>,
    starts: Vec<StartRecord>,
    fail_next: Option<String>,
    starting: usize,
    max_starting: usize,
}

pub struct SimulatedAgentManager {
    store: Arc<dyn ProjectStore>,
    state: Mutex<AgentState>,
    exits: broadcast::Sender<AgentExit>,
    start_latency: Duration,
    success_status: TaskStatus,
}

impl SimulatedAgentManager {
    pub fn new(store: Arc<dyn ProjectStore>) -> Self {
        let (exits, _) = broadcast::channel(EXIT_CHANNEL_CAPACITY);
        Self {
            store,
            state: Mutex::new(AgentState::default()),
            exits,
            start_latency: Duration::ZERO,
            success_status: TaskStatus::Completed,
        }
    }

    /// 開始ごとに遅延を入れる（実プロセスの起動を模す）
    pub fn with_start_latency(mut self, latency: Duration) -> Self {
        self.start_latency = latency;
        self
    }

    /// 終了コード 0 のときに書く status（デフォルトは `completed`）
    pub fn with_success_status(mut self, status: TaskStatus) -> Self {
        self.success_status = status;
        self
    }

    /// exit 通知チャネルの容量。購読者がこれ以上遅れると `Lagged` になる
    pub fn with_exit_capacity(mut self, capacity: usize) -> Self {
        let (exits, _) = broadcast::channel(capacity.max(1));
        self.exits = exits;
        self
    }

    fn lock(&self) -> MutexGuard<'_, AgentState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 次の開始を `message` で失敗させる
    pub fn fail_next_start(&self, message: impl Into<String>) {
        self.lock().fail_next = Some(message.into());
    }

    /// 開始要求なしで実行中集合に入れる（キュー外で開始された扱い）
    pub fn track_external_run(&self, task_id: TaskId) {
        self.lock().running.insert(task_id);
    }

    pub fn starts(&self) -> Vec<StartRecord> {
        self.lock().starts.clone()
    }

    pub fn start_count(&self) -> usize {
        self.lock().starts.len()
    }

    pub fn starts_for(&self, task_id: &TaskId) -> usize {
        self.lock().starts.iter().filter(|s| &s.task_id == task_id).count()
    }

    /// 同時に処理中だった開始要求数の最大値
    pub fn max_concurrent_starts(&self) -> usize {
        self.lock().max_starting
    }

    /// 実行を終える。実行中でなければ `false`
    pub fn finish(&self, task_id: &TaskId, exit_code: Option<i32>) -> bool {
        if !self.lock().running.remove(task_id) {
            return false;
        }
        let (status, reason) = match exit_code {
            Some(0) => (self.success_status, "completed"),
            _ => (TaskStatus::Failed, "failed"),
        };
        self.write_status(task_id, status);
        self.publish(AgentExit::new(task_id.clone(), exit_code, reason));
        true
    }

    fn write_status(&self, task_id: &TaskId, status: TaskStatus) {
        let found = self.store.get_projects().into_iter().find_map(|project| {
            self.store
                .get_tasks(&project.id)
                .into_iter()
                .find(|t| &t.id == task_id)
                .map(|task| (project.id, task))
        });
        let Some((project_id, mut task)) = found else {
            tracing::debug!(task_id = %task_id, "task not in store; status not written");
            return;
        };
        task.status = status;
        match self.store.set_task(&project_id, task) {
            Ok(()) => tracing::debug!(task_id = %task_id, %status, "task status written"),
            Err(err) => {
                tracing::warn!(task_id = %task_id, %status, error = %err, "failed to write task status")
            }
        }
    }

    fn publish(&self, exit: AgentExit) {
        // 購読者がいなくてもよい
        let _ = self.exits.send(exit);
    }
}

#[async_trait]
impl AgentManager for SimulatedAgentManager {
    fn is_running(&self, task_id: &TaskId) -> bool {
        self.lock().running.contains(task_id)
    }

    fn running_tasks(&self) -> Vec<TaskId> {
        self.lock().running.iter().cloned().collect()
    }

    async fn start_task_execution(
        &self,
        task_id: &TaskId,
        project_path: &Path,
        spec_id: &SpecId,
        options: ExecutionOptions,
    ) -> Result<(), AgentError> {
        {
            let mut state = self.lock();
            if state.running.contains(task_id) {
                return Err(AgentError::AlreadyRunning(task_id.clone()));
            }
            if let Some(message) = state.fail_next.take() {
                return Err(AgentError::StartFailed {
                    task_id: task_id.clone(),
                    message,
                });
            }
            state.starting += 1;
            state.max_starting = state.max_starting.max(state.starting);
        }

        if !self.start_latency.is_zero() {
            tokio::time::sleep(self.start_latency).await;
        }

        {
            let mut state = self.lock();
            state.starting -= 1;
            state.running.insert(task_id.clone());
            state.starts.push(StartRecord {
                task_id: task_id.clone(),
                project_path: project_path.to_path_buf(),
                spec_id: spec_id.clone(),
                options,
            });
        }
        self.write_status(task_id, TaskStatus::InProgress);
        tracing::debug!(task_id = %task_id, spec_id = %spec_id, "simulated agent started");
        Ok(())
    }

    async fn kill_all(&self) -> Result<(), AgentError> {
        let killed: Vec<TaskId> = std::mem::take(&mut self.lock().running).into_iter().collect();
        for task_id in killed {
            self.write_status(&task_id, TaskStatus::Paused);
            self.publish(AgentExit::new(task_id, None, "killed"));
        }
        Ok(())
    }

    fn subscribe_exits(&self) -> broadcast::Receiver<AgentExit> {
        self.exits.subscribe()
    }
}
