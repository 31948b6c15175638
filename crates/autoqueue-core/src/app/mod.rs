//! App - ports の上に組み立てたキュースケジューラ
//!
//! # 構成
//! - **config**: ポリシー定数、キュー設定の解決、`ManagerConfig`
//! - **selection**: backlog の並び順（優先度 → 作成日時）
//! - **in_flight**: プロジェクト単位の single-flight 登録簿（`ProcessingQueue`）
//! - **TaskQueueManager**: トリガーサイクル、起動可否、ステータス、停止
//! - **QueueManagerBuilder**: Fail-fast 検証付きのワイヤリング
//! - **exit_listener** / **prune_loop**: マネージャが所有するバックグラウンドタスク

pub mod builder;
pub mod config;
mod exit_listener;
pub mod in_flight;
mod prune_loop;
pub mod queue_manager;
pub mod selection;

pub use self::builder::{BuildError, QueueManagerBuilder};
pub use self::config::{
    ConfigError, ManagerConfig, QUEUE_MAX_CONCURRENT, QUEUE_MIN_CONCURRENT,
    is_valid_queue_concurrent, parse_queue_concurrent,
};
pub use self::in_flight::{ProcessingQueue, ProcessingSnapshot};
pub use self::queue_manager::TaskQueueManager;
