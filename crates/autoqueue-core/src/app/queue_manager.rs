//! TaskQueueManager - プロジェクトごとの同時実行上限の下で backlog タスクを実行へ昇格
//!
//! # フロー
//! 1. トリガーが来る（エージェント終了、設定変更、明示的な呼び出し）
//! 2. `trigger_queue` がプロジェクトを processing queue に登録する。
//!    サイクルはプロジェクトごとに 1 つだけで、後続のトリガーはそれに合流する
//! 3. `can_start_more_tasks` が真の間、タスクを 1 件ずつ開始する。
//!    各判定は直前の開始が残した実行中集合を見る
//! 4. サイクル終了時に `queue-status-update` を発行する
//!
//! プロジェクト間で共有するロックはなく、サイクルは独立に走る。

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::config::{ManagerConfig, QUEUE_MAX_CONCURRENT, QUEUE_MIN_CONCURRENT, resolve_queue_config};
use super::in_flight::{Admission, CycleGuard, ProcessingQueue, ProcessingSnapshot};
use super::{exit_listener, prune_loop, selection};
use crate::domain::{
    ProjectId, ProjectSettingsPatch, QueueConfig, QueueError, QueueEvent, QueueSettings,
    QueueStatus, TaskId, TaskStatus,
};
use crate::ports::{AgentManager, Clock, EventSink, ExecutionOptions, ProjectStore};

pub struct TaskQueueManager {
    store: Arc<dyn ProjectStore>,
    agents: Arc<dyn AgentManager>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    config: ManagerConfig,
    processing: ProcessingQueue,
    shutting_down: AtomicBool,
    stop_tx: watch::Sender<bool>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskQueueManager {
    /// 通常はデフォルトを埋めてくれる `QueueManagerBuilder` を使う
    pub fn new(
        store: Arc<dyn ProjectStore>,
        agents: Arc<dyn AgentManager>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        config: ManagerConfig,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            store,
            agents,
            events,
            clock,
            config,
            processing: ProcessingQueue::new(),
            shutting_down: AtomicBool::new(false),
            stop_tx,
            background: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// exit listener と prune loop を起動する。2 回目以降や `stop` 後は何もしない
    pub fn start(self: &Arc<Self>) {
        if self.is_shutting_down() {
            tracing::warn!("queue manager is shutting down; not starting background tasks");
            return;
        }
        let mut background = self.background.lock().unwrap_or_else(PoisonError::into_inner);
        if !background.is_empty() {
            return;
        }

        let weak = Arc::downgrade(self);
        background.push(tokio::spawn(exit_listener::run(
            weak.clone(),
            self.agents.subscribe_exits(),
            self.stop_tx.subscribe(),
        )));
        background.push(tokio::spawn(prune_loop::run(
            weak,
            self.config.prune_interval(),
            self.stop_tx.subscribe(),
        )));
        tracing::info!(
            prune_interval_secs = self.config.prune_interval_secs,
            stale_after_secs = self.config.stale_after_secs,
            "queue manager started"
        );
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// プロジェクトのキューポリシー。未知のプロジェクトや不正な値は
    /// 安全なデフォルトに落とすので、失敗しない
    pub fn get_queue_config(&self, project_id: &ProjectId) -> QueueConfig {
        resolve_queue_config(self.store.get_project(project_id).as_ref())
    }

    /// 表示用。保存済みタスク一覧から数える
    pub fn get_queue_status(&self, project_id: &ProjectId) -> QueueStatus {
        let config = self.get_queue_config(project_id);
        let tasks = self.store.get_tasks(project_id);
        let count = |status: TaskStatus| tasks.iter().filter(|t| t.status == status).count();
        QueueStatus {
            enabled: config.enabled,
            max_concurrent: config.max_concurrent,
            running_count: count(TaskStatus::InProgress),
            backlog_count: count(TaskStatus::Backlog),
        }
    }

    /// 空き判定はエージェントマネージャのライブ実行中集合で行う
    /// （保存済み status より先行していることがある）
    pub fn can_start_more_tasks(&self, project_id: &ProjectId) -> bool {
        let config = self.get_queue_config(project_id);
        if !config.enabled {
            return false;
        }

        let tasks = self.store.get_tasks(project_id);
        let live: HashSet<TaskId> = self.agents.running_tasks().into_iter().collect();
        let running = tasks.iter().filter(|t| live.contains(&t.id)).count();
        if running >= config.max_concurrent {
            return false;
        }

        tasks.iter().any(|t| t.is_backlog())
    }

    /// 最も優先度が高く最も古い backlog タスクを開始する
    ///
    /// 開始するものがない、または選んだタスクが既に実行中なら `Ok(false)`。
    /// 開始が拒否されたら [`QueueError::Dispatch`] を返し、タスクは backlog に残る。
    pub async fn trigger_next_task(&self, project_id: &ProjectId) -> Result<bool, QueueError> {
        let Some(project) = self.store.get_project(project_id) else {
            return Ok(false);
        };
        let tasks = self.store.get_tasks(project_id);
        let Some(task) = selection::next_backlog_task(&tasks) else {
            tracing::debug!(project_id = %project_id, "no backlog task to start");
            return Ok(false);
        };

        if self.agents.is_running(&task.id) {
            tracing::debug!(
                project_id = %project_id,
                task_id = %task.id,
                "next backlog task is already running; skipping"
            );
            return Ok(false);
        }

        tracing::info!(
            project_id = %project_id,
            task_id = %task.id,
            priority = ?task.metadata.priority,
            "starting queued task"
        );
        self.agents
            .start_task_execution(
                &task.id,
                &project.path,
                &task.spec_id,
                ExecutionOptions { auto_queued: true },
            )
            .await
            .map_err(|source| QueueError::Dispatch {
                task_id: task.id.clone(),
                source,
            })?;
        Ok(true)
    }

    /// プロジェクトのキューの空きスロットをすべて埋める
    ///
    /// 既にサイクルが走っていればそれに合流する。所有者は終了前にもう一度
    /// 再評価し、この呼び出しはそのサイクルの完了時に戻る。
    /// エラーは所有者の呼び出し側にだけ返る。
    pub async fn trigger_queue(&self, project_id: &ProjectId) -> Result<(), QueueError> {
        if self.is_shutting_down() {
            return Ok(());
        }
        if !self.get_queue_config(project_id).enabled {
            return Ok(());
        }

        match self.processing.admit(project_id, self.clock.now()) {
            Admission::Owner(guard) => {
                let result = self.run_cycle(project_id, &guard).await;
                drop(guard);
                self.emit_queue_status_update(project_id);
                result
            }
            Admission::Joined(wait) => {
                wait.wait().await;
                Ok(())
            }
            Admission::Closed => Ok(()),
        }
    }

    /// ストアの全プロジェクトをトリガーする。exit 通知の取りこぼし後や起動時に使う
    pub async fn trigger_all_queues(&self) -> Result<(), QueueError> {
        let mut first_error = None;
        for project in self.store.get_projects() {
            if let Err(err) = self.trigger_queue(&project.id).await {
                tracing::error!(project_id = %project.id, error = %err, "queue trigger failed");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn run_cycle(&self, project_id: &ProjectId, guard: &CycleGuard<'_>) -> Result<(), QueueError> {
        loop {
            let started = self.fill_open_slots(project_id, guard).await?;
            tracing::debug!(project_id = %project_id, cycle = guard.cycle(), started, "queue pass finished");

            if !guard.finish_or_rerun(self.clock.now()) {
                return Ok(());
            }
            tracing::debug!(project_id = %project_id, cycle = guard.cycle(), "re-running queue pass");
        }
    }

    async fn fill_open_slots(
        &self,
        project_id: &ProjectId,
        guard: &CycleGuard<'_>,
    ) -> Result<usize, QueueError> {
        let limit = self.get_queue_config(project_id).max_concurrent;
        let mut started = 0;
        // エージェントマネージャの反映が遅れても、1 パスの開始数はスロット数まで
        while started < limit && !self.is_shutting_down() && self.can_start_more_tasks(project_id) {
            if !self.trigger_next_task(project_id).await? {
                break;
            }
            started += 1;
            guard.touch(self.clock.now());
        }
        Ok(started)
    }

    /// エージェント実行の終了を受けて、そのプロジェクトのキューを補充する。
    /// 未知のタスクの終了は無視する
    pub async fn handle_task_exit(
        &self,
        task_id: &TaskId,
        exit_code: Option<i32>,
        reason: &str,
    ) -> Result<(), QueueError> {
        if self.is_shutting_down() {
            return Ok(());
        }

        let Some(project_id) = self.find_task_project(task_id) else {
            tracing::debug!(task_id = %task_id, "exit for unknown task ignored");
            return Ok(());
        };

        tracing::info!(
            project_id = %project_id,
            task_id = %task_id,
            exit_code = ?exit_code,
            reason,
            "task exited; refilling queue"
        );
        self.trigger_queue(&project_id).await
    }

    fn find_task_project(&self, task_id: &TaskId) -> Option<ProjectId> {
        self.store
            .get_projects()
            .into_iter()
            .find(|project| self.store.get_tasks(&project.id).iter().any(|t| &t.id == task_id))
            .map(|project| project.id)
    }

    /// stale 期間より長く動きのない processing エントリを解放し、その件数を返す
    pub fn prune_processing_queue(&self) -> usize {
        self.processing
            .prune(self.clock.now(), self.config.stale_after())
            .len()
    }

    pub fn processing_snapshot(&self) -> Vec<ProcessingSnapshot> {
        self.processing.snapshot()
    }

    /// キュー設定を保存して通知し、有効ならキューを補充する
    ///
    /// 明示的に渡された範囲外の上限は丸めずにエラーにする。
    pub async fn update_queue_config(
        &self,
        project_id: &ProjectId,
        enabled: bool,
        max_concurrent: usize,
    ) -> Result<QueueConfig, QueueError> {
        if !(QUEUE_MIN_CONCURRENT..=QUEUE_MAX_CONCURRENT).contains(&max_concurrent) {
            return Err(QueueError::InvalidConcurrency(format!(
                "{max_concurrent} is outside {QUEUE_MIN_CONCURRENT}..={QUEUE_MAX_CONCURRENT}"
            )));
        }

        self.store.update_project_settings(
            project_id,
            ProjectSettingsPatch {
                queue_config: Some(QueueSettings {
                    enabled: Some(enabled),
                    max_concurrent: Some(max_concurrent.into()),
                }),
            },
        )?;
        tracing::info!(project_id = %project_id, enabled, max_concurrent, "queue settings updated");

        self.emit_queue_status_update(project_id);
        if enabled {
            self.trigger_queue(project_id).await?;
        }
        Ok(self.get_queue_config(project_id))
    }

    /// 現在の状態を EventSink に発行
    pub fn emit_queue_status_update(&self, project_id: &ProjectId) {
        let status = self.get_queue_status(project_id);
        self.events.emit(QueueEvent::QueueStatusUpdate {
            project_id: project_id.clone(),
            status,
        });
    }

    /// トリガーの受け付けをやめ、実行中のサイクルの完了を待つ
    ///
    /// これが返った後、このマネージャがタスクを開始することはない。
    /// 複数回呼んでもよい。
    pub async fn stop(&self) {
        if !self.shutting_down.swap(true, Ordering::SeqCst) {
            tracing::info!("stopping queue manager");
        }
        let _ = self.stop_tx.send(true);

        let in_flight = self.processing.close();
        if !in_flight.is_empty() {
            tracing::debug!(count = in_flight.len(), "waiting for in-flight queue cycles");
        }
        for wait in in_flight {
            wait.wait().await;
        }

        let handles: Vec<JoinHandle<()>> = std::mem::take(
            &mut *self.background.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for handle in handles {
            if let Err(err) = handle.await
                && !err.is_cancelled()
            {
                tracing::error!(error = %err, "queue background task failed");
            }
        }
    }
}
