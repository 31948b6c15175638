//! EventSink port - UI 向けの通知

use crate::domain::QueueEvent;

/// 投げっぱなしの発行者。実装はブロックしてはならず、
/// 購読者がいなくても呼び出し側を失敗させない
pub trait EventSink: Send + Sync {
    fn emit(&self, event: QueueEvent);
}
