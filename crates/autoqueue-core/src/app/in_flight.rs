//! ProcessingQueue - トリガーサイクルのプロジェクト単位 single-flight 登録簿
//!
//! # 不変条件
//! - エントリはプロジェクトごとに高々 1 つ
//! - 最初の呼び出し側がサイクルの所有者になり [`CycleGuard`] を得る。
//!   並行する呼び出し側は既存エントリに合流し、待てる [`CycleWait`] を得る
//!
//! エントリは所有者の終了（guard の drop）か、[`ProcessingQueue::prune`] が
//! stale 期間より古いと判断したときに消える。prune は後続トリガーのために
//! ロックを解放するだけで、詰まったサイクル自体は止めない。
//! 再入の `depth` は診断用の記録で、prune の判断には使わない。
//!
//! 内部の mutex を `.await` をまたいで保持しない。

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::watch;

use crate::domain::ProjectId;

/// depth はここで頭打ち
pub const MAX_TRACKED_DEPTH: u32 = 50;

struct ProcessingEntry {
    cycle: u64,
    done: watch::Receiver<bool>,
    last_updated: DateTime<Utc>,
    depth: u32,
    rerun_requested: bool,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<ProjectId, ProcessingEntry>,
    next_cycle: u64,
    closed: bool,
}

/// エントリ 1 件の診断用ビュー
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingSnapshot {
    pub project_id: ProjectId,
    pub cycle: u64,
    pub depth: u32,
    pub last_updated: DateTime<Utc>,
    pub rerun_requested: bool,
}

/// [`ProcessingQueue::admit`] の結果
pub enum Admission<'a> {
    /// 実行中のサイクルはない。呼び出し側が走らせる
    Owner(CycleGuard<'a>),
    /// 既にサイクルが走っている。呼び出し側はその完了を待てる
    Joined(CycleWait),
    /// 停止のため閉じられている
    Closed,
}

#[derive(Default)]
pub struct ProcessingQueue {
    inner: Mutex<Inner>,
}

impl ProcessingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `project_id` のサイクル実行を申し込む
    ///
    /// 合流するとエントリの depth と最終活動時刻が更新され、所有者に
    /// 解放前にもう一度再評価するよう依頼する。
    pub fn admit(&self, project_id: &ProjectId, now: DateTime<Utc>) -> Admission<'_> {
        let mut inner = self.lock();
        if inner.closed {
            return Admission::Closed;
        }

        if let Some(entry) = inner.entries.get_mut(project_id) {
            entry.depth = (entry.depth + 1).min(MAX_TRACKED_DEPTH);
            entry.last_updated = now;
            entry.rerun_requested = true;
            tracing::debug!(
                project_id = %project_id,
                cycle = entry.cycle,
                depth = entry.depth,
                "joined in-flight queue cycle"
            );
            return Admission::Joined(CycleWait {
                done: entry.done.clone(),
            });
        }

        inner.next_cycle += 1;
        let cycle = inner.next_cycle;
        let (done_tx, done_rx) = watch::channel(false);
        inner.entries.insert(
            project_id.clone(),
            ProcessingEntry {
                cycle,
                done: done_rx,
                last_updated: now,
                depth: 1,
                rerun_requested: false,
            },
        );
        Admission::Owner(CycleGuard {
            queue: self,
            project_id: project_id.clone(),
            cycle,
            done: done_tx,
        })
    }

    /// `stale_after` より長く動きのないエントリを取り除き、解放したプロジェクトを返す
    pub fn prune(&self, now: DateTime<Utc>, stale_after: TimeDelta) -> Vec<ProjectId> {
        let mut inner = self.lock();
        let mut pruned = Vec::new();
        inner.entries.retain(|project_id, entry| {
            let stale = now.signed_duration_since(entry.last_updated) > stale_after;
            if stale {
                tracing::warn!(
                    project_id = %project_id,
                    cycle = entry.cycle,
                    depth = entry.depth,
                    last_updated = %entry.last_updated,
                    "releasing stale queue cycle"
                );
                pruned.push(project_id.clone());
            }
            !stale
        });
        pruned
    }

    /// 新しいサイクルを拒否し、まだ走っている全サイクルの待機ハンドルを返す
    /// 再度呼ぶとその時点で走っているものを返す
    pub fn close(&self) -> Vec<CycleWait> {
        let mut inner = self.lock();
        inner.closed = true;
        inner
            .entries
            .values()
            .map(|entry| CycleWait {
                done: entry.done.clone(),
            })
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn contains(&self, project_id: &ProjectId) -> bool {
        self.lock().entries.contains_key(project_id)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<ProcessingSnapshot> {
        let inner = self.lock();
        let mut snapshot: Vec<ProcessingSnapshot> = inner
            .entries
            .iter()
            .map(|(project_id, entry)| ProcessingSnapshot {
                project_id: project_id.clone(),
                cycle: entry.cycle,
                depth: entry.depth,
                last_updated: entry.last_updated,
                rerun_requested: entry.rerun_requested,
            })
            .collect();
        snapshot.sort_by(|a, b| a.project_id.cmp(&b.project_id));
        snapshot
    }

    fn touch(&self, project_id: &ProjectId, cycle: u64, now: DateTime<Utc>) {
        let mut inner = self.lock();
        if let Some(entry) = inner.entries.get_mut(project_id)
            && entry.cycle == cycle
        {
            entry.last_updated = now;
        }
    }

    fn finish_or_rerun(&self, project_id: &ProjectId, cycle: u64, now: DateTime<Utc>) -> bool {
        let mut inner = self.lock();
        let closed = inner.closed;
        let Some(entry) = inner.entries.get_mut(project_id) else {
            return false;
        };
        if entry.cycle != cycle {
            // 実行中に prune され、新しいサイクルに置き換わった
            return false;
        }
        if entry.rerun_requested && !closed {
            entry.rerun_requested = false;
            entry.last_updated = now;
            return true;
        }
        inner.entries.remove(project_id);
        false
    }

    fn release(&self, project_id: &ProjectId, cycle: u64) {
        let mut inner = self.lock();
        if inner
            .entries
            .get(project_id)
            .is_some_and(|entry| entry.cycle == cycle)
        {
            inner.entries.remove(project_id);
        }
    }
}

/// 実行中サイクルの所有権
///
/// drop するとエントリを（まだ自分のものなら）解放し、待機者を全員起こす。
pub struct CycleGuard<'a> {
    queue: &'a ProcessingQueue,
    project_id: ProjectId,
    cycle: u64,
    done: watch::Sender<bool>,
}

impl CycleGuard<'_> {
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// stale と見なされないよう活動を記録
    pub fn touch(&self, now: DateTime<Utc>) {
        self.queue.touch(&self.project_id, self.cycle, now);
    }

    /// 保留中の再実行要求を消費する（`true`、エントリは残る）か、
    /// エントリを取り除く（`false`）。閉じた後は再実行しない。
    pub fn finish_or_rerun(&self, now: DateTime<Utc>) -> bool {
        self.queue.finish_or_rerun(&self.project_id, self.cycle, now)
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.queue.release(&self.project_id, self.cycle);
        let _ = self.done.send(true);
    }
}

/// 他者が所有するサイクルを待つハンドル
pub struct CycleWait {
    done: watch::Receiver<bool>,
}

impl CycleWait {
    /// 所有サイクルが終わるか、所有者がいなくなると解決する
    pub async fn wait(mut self) {
        // Err は guard が通知なしに drop されたということ。終了扱い
        let _ = self.done.wait_for(|done| *done).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn project(id: &str) -> ProjectId {
        ProjectId::new(id)
    }

    fn owner(admission: Admission<'_>) -> CycleGuard<'_> {
        match admission {
            Admission::Owner(guard) => guard,
            _ => panic!("expected to own the cycle"),
        }
    }

    #[test]
    fn second_admission_joins_instead_of_creating_an_entry() {
        let queue = ProcessingQueue::new();
        let p = project("P1");

        let guard = owner(queue.admit(&p, t0()));
        assert!(matches!(queue.admit(&p, t0()), Admission::Joined(_)));
        assert_eq!(queue.len(), 1);

        let snap = &queue.snapshot()[0];
        assert_eq!(snap.depth, 2);
        assert!(snap.rerun_requested);

        drop(guard);
        assert!(queue.is_empty());
    }

    #[test]
    fn projects_do_not_share_entries() {
        let queue = ProcessingQueue::new();
        let _a = owner(queue.admit(&project("A"), t0()));
        let _b = owner(queue.admit(&project("B"), t0()));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn rerun_is_granted_once_per_request() {
        let queue = ProcessingQueue::new();
        let p = project("P1");
        let guard = owner(queue.admit(&p, t0()));

        assert!(!matches!(queue.admit(&p, t0()), Admission::Owner(_)));
        assert!(guard.finish_or_rerun(t0()));
        assert!(queue.contains(&p));

        assert!(!guard.finish_or_rerun(t0()));
        assert!(!queue.contains(&p));
    }

    #[test]
    fn pruning_is_age_based_only() {
        let queue = ProcessingQueue::new();
        let deep = project("deep-but-fresh");
        let old = project("shallow-but-old");
        let stale_after = TimeDelta::minutes(5);

        let _old_guard = owner(queue.admit(&old, t0()));

        let _deep_guard = owner(queue.admit(&deep, t0()));
        for _ in 0..80 {
            let _ = queue.admit(&deep, t0() + TimeDelta::minutes(6) - TimeDelta::seconds(1));
        }

        let pruned = queue.prune(t0() + TimeDelta::minutes(6), stale_after);
        assert_eq!(pruned, vec![old.clone()]);

        let remaining = queue.snapshot();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].project_id, deep);
        assert_eq!(remaining[0].depth, MAX_TRACKED_DEPTH);
    }

    #[test]
    fn pruned_owner_does_not_release_its_successor() {
        let queue = ProcessingQueue::new();
        let p = project("P1");

        let stuck = owner(queue.admit(&p, t0()));
        queue.prune(t0() + TimeDelta::minutes(10), TimeDelta::minutes(5));
        assert!(queue.is_empty());

        let fresh = owner(queue.admit(&p, t0() + TimeDelta::minutes(10)));
        assert_ne!(stuck.cycle(), fresh.cycle());

        drop(stuck);
        assert!(queue.contains(&p));
        drop(fresh);
        assert!(queue.is_empty());
    }

    #[test]
    fn close_refuses_new_cycles() {
        let queue = ProcessingQueue::new();
        let p = project("P1");
        let guard = owner(queue.admit(&p, t0()));

        let waits = queue.close();
        assert_eq!(waits.len(), 1);
        assert!(queue.is_closed());
        assert!(matches!(queue.admit(&project("P2"), t0()), Admission::Closed));

        // 閉じた後は保留中の再実行要求を捨てる
        assert!(!guard.finish_or_rerun(t0()));
    }

    #[tokio::test]
    async fn waiters_resolve_when_the_owner_drops() {
        let queue = std::sync::Arc::new(ProcessingQueue::new());
        let p = project("P1");

        let guard = owner(queue.admit(&p, t0()));
        let Admission::Joined(wait) = queue.admit(&p, t0()) else {
            panic!("expected to join");
        };

        let waiter = tokio::spawn(wait.wait());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
