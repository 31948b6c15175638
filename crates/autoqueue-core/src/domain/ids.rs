//! Domain identifiers - 型付き ID
//!
//! プロジェクトとタスクの ID はストアから不透明な文字列として届くので、
//! `Id<T>` は数値ではなく `String` を包む。ローカルで発行する ID
//! （`ports::IdGenerator`）は ULID の文字列表現で、作成順にソートできる。
//!
//! ## Phantom Type パターン
//! 実装は全種類の ID で共有し、`T`（サイズ 0 のマーカー）でコンパイル時に区別する。
//! `ProjectId` を期待する場所に `TaskId` は渡せない。

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// ID 種別ごとのマーカー trait
pub trait IdMarker: Send + Sync + 'static {
    /// 新しい ID を生成するときの接頭辞（例: "task-"）
    fn prefix() -> &'static str;
}

/// 汎用の文字列 ID
#[derive(Serialize, Deserialize)]
#[serde(transparent, bound = "")]
pub struct Id<T: IdMarker> {
    value: String,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    /// 外部から受け取った ID をそのまま包む
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _marker: PhantomData,
        }
    }

    /// ULID から接頭辞付きの ID を作る
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self::new(format!("{}{}", T::prefix(), ulid))
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

// derive すると `T` に境界が付く。マーカーは値を持たない enum なので手書きする
impl<T: IdMarker> Clone for Id<T> {
    fn clone(&self) -> Self {
        Self::new(self.value.clone())
    }
}

impl<T: IdMarker> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T: IdMarker> Eq for Id<T> {}

impl<T: IdMarker> std::hash::Hash for Id<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T: IdMarker> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: IdMarker> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value.cmp(&other.value)
    }
}

impl<T: IdMarker> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.value)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl<T: IdMarker> From<&str> for Id<T> {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl<T: IdMarker> From<String> for Id<T> {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl<T: IdMarker> Borrow<str> for Id<T> {
    fn borrow(&self) -> &str {
        &self.value
    }
}

// ========================================
// マーカー型
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Project {}

impl IdMarker for Project {
    fn prefix() -> &'static str {
        "project-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {}

impl IdMarker for Task {
    fn prefix() -> &'static str {
        "task-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Spec {}

impl IdMarker for Spec {
    fn prefix() -> &'static str {
        "spec-"
    }
}

/// Project の ID（管理対象のローカル git リポジトリ）
pub type ProjectId = Id<Project>;

/// プロジェクト内の Task の ID
pub type TaskId = Id<Task>;

/// エージェント実行の起点となる spec ディレクトリの ID
pub type SpecId = Id<Spec>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generated_ids_carry_their_prefix() {
        let project = ProjectId::from_ulid(Ulid::new());
        let task = TaskId::from_ulid(Ulid::new());
        let spec = SpecId::from_ulid(Ulid::new());

        assert!(project.as_str().starts_with("project-"));
        assert!(task.as_str().starts_with("task-"));
        assert!(spec.as_str().starts_with("spec-"));

        // let _: ProjectId = task; // <- コンパイルエラー
    }

    #[test]
    fn external_ids_are_kept_verbatim() {
        let id = TaskId::new("001-add-login");
        assert_eq!(id.as_str(), "001-add-login");
        assert_eq!(id.to_string(), "001-add-login");
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = TaskId::new("T1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"T1\"");

        let back: TaskId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn ids_can_be_looked_up_by_str() {
        let mut set: HashSet<TaskId> = HashSet::new();
        set.insert(TaskId::new("T1"));
        assert!(set.contains("T1"));
        assert!(!set.contains("T2"));
    }
}
