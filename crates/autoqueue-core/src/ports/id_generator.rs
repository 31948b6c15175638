//! IdGenerator port - ローカルで作るレコードの ID 生成
//!
//! ストアから届いた ID はそのまま使う。これはプロセス自身が作るプロジェクトと
//! タスク（CLI デモ、テスト）専用。

use crate::domain::ids::{ProjectId, SpecId, TaskId};
use crate::ports::Clock;
use ulid::Ulid;

pub trait IdGenerator: Send + Sync {
    fn generate_project_id(&self) -> ProjectId;

    fn generate_task_id(&self) -> TaskId;

    fn generate_spec_id(&self) -> SpecId;
}

/// ULID ベースの生成器
///
/// 時刻部分は注入した Clock から取るので、`FixedClock` なら同じ時刻接頭辞になる。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_project_id(&self) -> ProjectId {
        ProjectId::from_ulid(self.next_ulid())
    }

    fn generate_task_id(&self) -> TaskId {
        TaskId::from_ulid(self.next_ulid())
    }

    fn generate_spec_id(&self) -> SpecId {
        SpecId::from_ulid(self.next_ulid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn seeded_task_ids_do_not_collide() {
        let ids = UlidGenerator::new(SystemClock);
        let generated: std::collections::HashSet<TaskId> =
            (0..100).map(|_| ids.generate_task_id()).collect();
        assert_eq!(generated.len(), 100);
    }

    #[test]
    fn fixed_clock_ids_share_the_time_prefix() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let id_gen = UlidGenerator::new(FixedClock::new(fixed_time));

        let id1 = id_gen.generate_task_id();
        let id2 = id_gen.generate_task_id();
        assert_ne!(id1, id2);

        // "task-" + タイムスタンプ部 10 文字
        let prefix = |id: &TaskId| id.as_str()[..15].to_string();
        assert_eq!(prefix(&id1), prefix(&id2));

        let ulid: Ulid = id1.as_str()["task-".len()..].parse().unwrap();
        assert_eq!(ulid.timestamp_ms(), fixed_time.timestamp_millis() as u64);
    }

    #[test]
    fn different_id_kinds_are_generated() {
        let id_gen = UlidGenerator::new(SystemClock);

        assert!(id_gen.generate_project_id().as_str().starts_with("project-"));
        assert!(id_gen.generate_task_id().as_str().starts_with("task-"));
        assert!(id_gen.generate_spec_id().as_str().starts_with("spec-"));
    }
}
