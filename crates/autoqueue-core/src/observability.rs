//! Observability - ログ出力の初期化

use tracing_subscriber::EnvFilter;

/// `RUST_LOG`（未設定・不正なら `default_directive`）で絞った `fmt` subscriber を入れる
///
/// グローバル subscriber が既にあれば `false`。
pub fn init_tracing(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}
