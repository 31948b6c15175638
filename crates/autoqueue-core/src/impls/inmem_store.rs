//! InMemoryProjectStore - project/task store for development and tests.
//!
//! - `RwLock` guarded maps; readers never wait on each other.
//! - Tasks keep insertion order per project, so ties in queue ordering are
//!   resolved the same way every run.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::domain::{Project, ProjectId, ProjectSettingsPatch, StoreError, Task, TaskId};
use crate::ports::ProjectStore;

#[derive(Default)]
struct StoreState {
    projects: BTreeMap<ProjectId, Project>,
    tasks: HashMap<ProjectId, Vec<Task>>,
}

#[derive(Default)]
pub struct InMemoryProjectStore {
    state: RwLock<StoreState>,
}

impl InMemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace a project. Its tasks are kept.
    pub fn insert_project(&self, project: Project) {
        let mut state = self.write();
        state.tasks.entry(project.id.clone()).or_default();
        state.projects.insert(project.id.clone(), project);
    }

    /// Remove a project and all of its tasks.
    pub fn remove_project(&self, project_id: &ProjectId) -> Option<Project> {
        let mut state = self.write();
        state.tasks.remove(project_id);
        state.projects.remove(project_id)
    }

    pub fn get_task(&self, project_id: &ProjectId, task_id: &TaskId) -> Option<Task> {
        self.read()
            .tasks
            .get(project_id)?
            .iter()
            .find(|t| &t.id == task_id)
            .cloned()
    }

    pub fn remove_task(&self, project_id: &ProjectId, task_id: &TaskId) -> Option<Task> {
        let mut state = self.write();
        let tasks = state.tasks.get_mut(project_id)?;
        let index = tasks.iter().position(|t| &t.id == task_id)?;
        Some(tasks.remove(index))
    }
}

impl ProjectStore for InMemoryProjectStore {
    fn get_project(&self, project_id: &ProjectId) -> Option<Project> {
        self.read().projects.get(project_id).cloned()
    }

    fn get_projects(&self) -> Vec<Project> {
        self.read().projects.values().cloned().collect()
    }

    fn get_tasks(&self, project_id: &ProjectId) -> Vec<Task> {
        self.read()
            .tasks
            .get(project_id)
            .cloned()
            .unwrap_or_default()
    }

    fn set_task(&self, project_id: &ProjectId, task: Task) -> Result<(), StoreError> {
        let mut state = self.write();
        if !state.projects.contains_key(project_id) {
            return Err(StoreError::ProjectNotFound(project_id.clone()));
        }
        let tasks = state.tasks.entry(project_id.clone()).or_default();
        match tasks.iter_mut().find(|t| t.id == task.id) {
            Some(existing) => *existing = task,
            None => tasks.push(task),
        }
        Ok(())
    }

    fn update_project_settings(
        &self,
        project_id: &ProjectId,
        patch: ProjectSettingsPatch,
    ) -> Result<(), StoreError> {
        let mut state = self.write();
        let project = state
            .projects
            .get_mut(project_id)
            .ok_or_else(|| StoreError::ProjectNotFound(project_id.clone()))?;
        project.settings.apply(patch);
        Ok(())
    }
}
