//! PruneLoop - stale な processing エントリの定期解放
//!
//! # フロー
//! 1. `prune_interval` ごとに tick
//! 2. `TaskQueueManager::prune_processing_queue()` が stale 期間より長く
//!    動きのないエントリを落とす
//! 3. 停止シグナルか、マネージャが破棄されたら終了

use std::sync::Weak;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use super::queue_manager::TaskQueueManager;

pub(crate) async fn run(
    manager: Weak<TaskQueueManager>,
    every: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // 最初の tick は即座に完了する
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = ticker.tick() => {
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                let pruned = manager.prune_processing_queue();
                if pruned > 0 {
                    tracing::warn!(pruned, "released stale queue cycles");
                }
            }
        }
    }
    tracing::debug!("prune loop stopped");
}
