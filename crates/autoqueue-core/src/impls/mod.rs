//! Impls - ports のインメモリ実装（開発・テスト用）
//!
//! # 含まれるもの
//! - **InMemoryProjectStore**: プロジェクト/タスクのストア
//! - **SimulatedAgentManager**: 何も起動せず実行だけを追跡するエージェントマネージャ
//! - **BroadcastEventSink** / **NoopEventSink**: イベントの配信
//!
//! 本番の協調相手（永続ストア、実エージェントプロセス、UI ブリッジ）は
//! このクレートの外で同じ trait を実装する。

pub mod event_sinks;
pub mod inmem_store;
pub mod simulated_agent;

pub use self::event_sinks::{BroadcastEventSink, NoopEventSink};
pub use self::inmem_store::InMemoryProjectStore;
pub use self::simulated_agent::{SimulatedAgentManager, StartRecord};
