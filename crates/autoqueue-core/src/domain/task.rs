//! Task - プロジェクトストアが保持するタスクモデル
//!
//! スケジューラはタスクを読むだけで `status` を書き換えない。
//! 状態遷移の責任はエージェントマネージャ（またはその代理のストア）にある。

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ProjectId, SpecId, TaskId};

/// タスクのライフサイクル状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// キューに拾われるのを待っている
    Backlog,
    /// エージェントの実行が開始済み
    InProgress,
    Completed,
    Failed,
    Paused,
    HumanReview,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Backlog => "backlog",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Paused => "paused",
            TaskStatus::HumanReview => "human_review",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ユーザーが付ける優先度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Urgent,
    High,
    Medium,
    Low,
}

impl TaskPriority {
    /// 並び順の重み（大きいほど先に実行）
    pub fn weight(self) -> u8 {
        match self {
            TaskPriority::Urgent => 4,
            TaskPriority::High => 3,
            TaskPriority::Medium => 2,
            TaskPriority::Low => 1,
        }
    }
}

/// 省略可能な優先度の重み。優先度なしは 0
pub fn priority_weight(priority: Option<TaskPriority>) -> u8 {
    priority.map(TaskPriority::weight).unwrap_or(0)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
}

/// ストアから届いたままの作成日時
///
/// ストアからはタイムスタンプ、エポックミリ秒、自由テキストのどれかが届く。
/// テキストはそのまま保持し、並べるときだけ解釈する（[`CreatedAt::sort_key`]）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CreatedAt {
    At(DateTime<Utc>),
    EpochMillis(i64),
    Text(String),
}

impl CreatedAt {
    /// 比較用のエポックミリ秒
    ///
    /// 有効な日時として解釈できない値は `f64::INFINITY` になり、
    /// すべての有効な日時より後ろに並ぶ。
    pub fn sort_key(&self) -> f64 {
        match self {
            CreatedAt::At(at) => at.timestamp_millis() as f64,
            CreatedAt::EpochMillis(ms) => {
                if DateTime::<Utc>::from_timestamp_millis(*ms).is_some() {
                    *ms as f64
                } else {
                    f64::INFINITY
                }
            }
            CreatedAt::Text(text) => parse_text(text)
                .map(|at| at.timestamp_millis() as f64)
                .unwrap_or(f64::INFINITY),
        }
    }

    /// [`CreatedAt::sort_key`] が解釈できたか
    pub fn is_valid(&self) -> bool {
        self.sort_key().is_finite()
    }
}

impl From<DateTime<Utc>> for CreatedAt {
    fn from(at: DateTime<Utc>) -> Self {
        CreatedAt::At(at)
    }
}

fn parse_text(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Some(at.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }
    None
}

/// ユーザー定義のコーディングタスク
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub project_id: ProjectId,
    pub spec_id: SpecId,
    #[serde(default)]
    pub title: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub metadata: TaskMetadata,
    pub created_at: CreatedAt,
}

impl Task {
    /// 優先度なしの backlog タスク。spec id はタスク ID と同じ値になる
    pub fn new(id: impl Into<TaskId>, project_id: ProjectId, created_at: impl Into<CreatedAt>) -> Self {
        let id = id.into();
        Self {
            spec_id: SpecId::new(id.as_str()),
            id,
            project_id,
            title: String::new(),
            status: TaskStatus::Backlog,
            metadata: TaskMetadata::default(),
            created_at: created_at.into(),
        }
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.metadata.priority = Some(priority);
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_spec_id(mut self, spec_id: SpecId) -> Self {
        self.spec_id = spec_id;
        self
    }

    pub fn is_backlog(&self) -> bool {
        self.status == TaskStatus::Backlog
    }

    pub fn priority_weight(&self) -> u8 {
        priority_weight(self.metadata.priority)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    #[rstest]
    #[case(Some(TaskPriority::Urgent), 4)]
    #[case(Some(TaskPriority::High), 3)]
    #[case(Some(TaskPriority::Medium), 2)]
    #[case(Some(TaskPriority::Low), 1)]
    #[case(None, 0)]
    fn priority_weights(#[case] priority: Option<TaskPriority>, #[case] expected: u8) {
        assert_eq!(priority_weight(priority), expected);
    }

    #[test]
    fn status_displays_store_spelling() {
        assert_eq!(TaskStatus::InProgress.to_string(), "in_progress");
        assert_eq!(
            serde_json::to_value(TaskStatus::HumanReview).unwrap(),
            serde_json::json!(TaskStatus::HumanReview.as_str())
        );
    }

    #[test]
    fn created_at_normalizes_every_valid_form() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let ms = at.timestamp_millis() as f64;

        assert_eq!(CreatedAt::At(at).sort_key(), ms);
        assert_eq!(CreatedAt::EpochMillis(at.timestamp_millis()).sort_key(), ms);
        assert_eq!(CreatedAt::Text("2024-01-01T12:00:00Z".into()).sort_key(), ms);
        assert_eq!(CreatedAt::Text("2024-01-01T12:00:00.000Z".into()).sort_key(), ms);
        assert_eq!(CreatedAt::Text("2024-01-01T12:00:00".into()).sort_key(), ms);
    }

    #[rstest]
    #[case("invalid-date")]
    #[case("")]
    #[case("2024-13-45")]
    fn unparseable_text_sorts_last(#[case] raw: &str) {
        let created = CreatedAt::Text(raw.to_string());
        assert_eq!(created.sort_key(), f64::INFINITY);
        assert!(!created.is_valid());
    }

    #[test]
    fn created_at_deserializes_from_store_json() {
        let iso: CreatedAt = serde_json::from_str("\"2024-01-01T12:00:00Z\"").unwrap();
        assert!(matches!(iso, CreatedAt::At(_)));

        let epoch: CreatedAt = serde_json::from_str("1704110400000").unwrap();
        assert_eq!(epoch, CreatedAt::EpochMillis(1_704_110_400_000));

        let junk: CreatedAt = serde_json::from_str("\"invalid-date\"").unwrap();
        assert_eq!(junk, CreatedAt::Text("invalid-date".into()));
    }

    #[test]
    fn task_json_uses_store_field_names() {
        let json = serde_json::json!({
            "id": "T1",
            "projectId": "P1",
            "specId": "001-login",
            "status": "in_progress",
            "metadata": { "priority": "urgent" },
            "createdAt": "2024-01-01T00:00:00Z"
        });
        let task: Task = serde_json::from_value(json).unwrap();
        assert_eq!(task.id.as_str(), "T1");
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.priority_weight(), 4);
        assert_eq!(task.title, "");
    }
}
