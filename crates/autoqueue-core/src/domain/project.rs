//! Project - プロジェクトモデルとキュー設定

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ids::ProjectId;

/// 永続化されたままのキュー設定
///
/// 値は信用しない。`maxConcurrent` は欠けていたり、小数・範囲外・数値以外で
/// あったりする。`app::config::resolve_queue_config` が常に安全な
/// [`QueueConfig`] に変換する。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent: Option<serde_json::Value>,
}

/// プロジェクトごとの設定。ここで解釈するのは `queueConfig` だけで、
/// それ以外のキーはそのまま持ち回す
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_config: Option<QueueSettings>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// 設定の部分更新。`None` のフィールドは変更しない
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_config: Option<QueueSettings>,
}

impl ProjectSettings {
    pub fn apply(&mut self, patch: ProjectSettingsPatch) {
        if let Some(queue_config) = patch.queue_config {
            self.queue_config = Some(queue_config);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: ProjectId,
    #[serde(default)]
    pub name: String,
    /// git リポジトリのルートパス
    pub path: PathBuf,
    #[serde(default)]
    pub settings: ProjectSettings,
}

impl Project {
    pub fn new(id: impl Into<ProjectId>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            path: path.into(),
            settings: ProjectSettings::default(),
        }
    }

    pub fn with_queue_settings(mut self, settings: QueueSettings) -> Self {
        self.settings.queue_config = Some(settings);
        self
    }
}

/// 検証済みのキューポリシー
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueConfig {
    pub enabled: bool,
    pub max_concurrent: usize,
}
