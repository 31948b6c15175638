//! Domain - ドメインモデル（ID、タスク、プロジェクト、状態、イベント、エラー）

pub mod errors;
pub mod events;
pub mod ids;
pub mod project;
pub mod status;
pub mod task;

pub use errors::{AgentError, QueueError, StoreError};
pub use events::{AgentExit, QueueEvent};
pub use ids::{ProjectId, SpecId, TaskId};
pub use project::{Project, ProjectSettings, ProjectSettingsPatch, QueueConfig, QueueSettings};
pub use status::QueueStatus;
pub use task::{CreatedAt, Task, TaskMetadata, TaskPriority, TaskStatus, priority_weight};
