//! Ports - 協調相手とのインターフェース
//!
//! 各 trait はスケジューラが所有しないものとの境界:
//! プロジェクトストア、エージェントマネージャ、UI イベントバス、時刻、ID 生成。
//! インメモリ実装は `impls` にある。

pub mod agent;
pub mod clock;
pub mod event_sink;
pub mod id_generator;
pub mod task_store;

pub use self::agent::{AgentManager, ExecutionOptions};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_sink::EventSink;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::task_store::ProjectStore;
