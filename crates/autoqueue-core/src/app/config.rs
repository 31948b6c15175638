//! Config - キューのポリシー定数とマネージャ設定
//!
//! # 2 つの層
//! - プロジェクトごとのキュー設定（ストア由来）: 寛容に解決する。
//!   不正な値は安全なデフォルトに落とし、エラーにはしない
//! - プロセス全体の `ManagerConfig`（TOML + 環境変数）: 起動時に厳密に検証
//!   （Fail-fast）

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Project, QueueConfig, QueueSettings};

pub const QUEUE_MIN_CONCURRENT: usize = 1;
pub const QUEUE_MAX_CONCURRENT: usize = 3;

/// これより古い processing エントリは prune で解放される
pub const DEFAULT_STALE_AFTER_SECS: u64 = 5 * 60;
pub const DEFAULT_PRUNE_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_STATUS_CHANNEL_CAPACITY: usize = 64;

pub const ENV_STALE_AFTER_SECS: &str = "AUTOQUEUE_STALE_AFTER_SECS";
pub const ENV_PRUNE_INTERVAL_SECS: &str = "AUTOQUEUE_PRUNE_INTERVAL_SECS";

/// `value` が `[QUEUE_MIN_CONCURRENT, QUEUE_MAX_CONCURRENT]` の整数か
pub fn is_valid_queue_concurrent(value: &serde_json::Value) -> bool {
    parse_queue_concurrent(value).is_some()
}

/// `value` を同時実行数として解釈する
///
/// 整数値の浮動小数（`2.0`）は受け付ける。文字列・真偽値・小数・範囲外は `None`。
pub fn parse_queue_concurrent(value: &serde_json::Value) -> Option<usize> {
    let integer = if let Some(n) = value.as_u64() {
        n
    } else {
        let f = value.as_f64()?;
        if !f.is_finite() || f.fract() != 0.0 || f < 0.0 {
            return None;
        }
        f as u64
    };
    let integer = usize::try_from(integer).ok()?;
    (QUEUE_MIN_CONCURRENT..=QUEUE_MAX_CONCURRENT)
        .contains(&integer)
        .then_some(integer)
}

/// 保存された設定を、呼び出し側が検証なしで使える `QueueConfig` に解決
pub fn resolve_queue_settings(settings: Option<&QueueSettings>) -> QueueConfig {
    let enabled = settings.and_then(|s| s.enabled).unwrap_or(false);
    let max_concurrent = settings
        .and_then(|s| s.max_concurrent.as_ref())
        .and_then(parse_queue_concurrent)
        .unwrap_or(QUEUE_MIN_CONCURRENT);
    QueueConfig {
        enabled,
        max_concurrent,
    }
}

/// 存在しないかもしれないプロジェクトの設定。未知のプロジェクトは無効扱い
pub fn resolve_queue_config(project: Option<&Project>) -> QueueConfig {
    match project {
        Some(project) => resolve_queue_settings(project.settings.queue_config.as_ref()),
        None => QueueConfig {
            enabled: false,
            max_concurrent: QUEUE_MIN_CONCURRENT,
        },
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// キューマネージャのプロセス全体の設定
///
/// ```toml
/// stale_after_secs = 300
/// prune_interval_secs = 60
/// status_channel_capacity = 64
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManagerConfig {
    pub stale_after_secs: u64,
    pub prune_interval_secs: u64,
    pub status_channel_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: DEFAULT_STALE_AFTER_SECS,
            prune_interval_secs: DEFAULT_PRUNE_INTERVAL_SECS,
            status_channel_capacity: DEFAULT_STATUS_CHANNEL_CAPACITY,
        }
    }
}

impl ManagerConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// `AUTOQUEUE_*` 環境変数で上書き
    pub fn apply_env_overrides(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// 任意の lookup から上書き（本番では環境変数）
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_STALE_AFTER_SECS) {
            self.stale_after_secs = parse_secs(ENV_STALE_AFTER_SECS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_PRUNE_INTERVAL_SECS) {
            self.prune_interval_secs = parse_secs(ENV_PRUNE_INTERVAL_SECS, &raw)?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stale_after_secs == 0 {
            return Err(ConfigError::Invalid("stale_after_secs must be > 0".into()));
        }
        if self.prune_interval_secs == 0 {
            return Err(ConfigError::Invalid("prune_interval_secs must be > 0".into()));
        }
        if self.status_channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "status_channel_capacity must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn stale_after(&self) -> TimeDelta {
        i64::try_from(self.stale_after_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX)
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_secs)
    }
}

fn parse_secs(key: &str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{key} must be a number of seconds, got {raw:?}")))
}
