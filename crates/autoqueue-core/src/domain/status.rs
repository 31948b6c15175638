//! QueueStatus - UI パネルに表示するキューの状態

use serde::{Deserialize, Serialize};

/// 保存済みタスク一覧から数えた値（エージェントのライブ状態ではない）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub enabled: bool,
    pub max_concurrent: usize,
    pub running_count: usize,
    pub backlog_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_payload_field_names() {
        let status = QueueStatus {
            enabled: true,
            max_concurrent: 2,
            running_count: 1,
            backlog_count: 4,
        };
        assert_eq!(
            serde_json::to_value(status).unwrap(),
            serde_json::json!({
                "enabled": true,
                "maxConcurrent": 2,
                "runningCount": 1,
                "backlogCount": 4
            })
        );
    }
}
