//! ProjectStore port - プロジェクト/タスクのリポジトリ
//!
//! プロジェクト・設定・タスクの唯一の情報源。スケジューラは読むだけで、
//! 書くのは設定のみ。タスクの status はタスクを実行する側が書く。

use crate::domain::{Project, ProjectId, ProjectSettingsPatch, StoreError, Task};

/// 同期・副作用なしの読み取り。どのタスクから呼んでもよい
pub trait ProjectStore: Send + Sync {
    fn get_project(&self, project_id: &ProjectId) -> Option<Project>;

    /// 既知の全プロジェクト。終了したタスクの所属を引くのに使う
    fn get_projects(&self) -> Vec<Project>;

    /// プロジェクトのタスク一覧。未知のプロジェクトなら空
    fn get_tasks(&self, project_id: &ProjectId) -> Vec<Task>;

    /// タスクを追加または置換（ID で照合）
    fn set_task(&self, project_id: &ProjectId, task: Task) -> Result<(), StoreError>;

    fn update_project_settings(
        &self,
        project_id: &ProjectId,
        patch: ProjectSettingsPatch,
    ) -> Result<(), StoreError>;
}
