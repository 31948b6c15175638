//! autoqueue-core
//!
//! Automatic task queue for coding agents.
//!
//! 空きが出るたびにプロジェクトの backlog タスクを実行へ昇格させる。
//! 判定サイクルはプロジェクトごとに同時に 1 つだけ。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, task, project, status, events, errors）
//! - **ports**: 抽象化レイヤー（ProjectStore, AgentManager, EventSink, Clock, IdGenerator）
//! - **app**: スケジューラ本体（`TaskQueueManager`）、設定、builder
//! - **impls**: 開発・テスト用のインメモリ実装
//! - **observability**: tracing の初期化

pub mod app;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;

pub use app::{QueueManagerBuilder, TaskQueueManager};
