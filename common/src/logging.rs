//! ロギング初期化ユーティリティ
//!
//! `MOCKHUB_LOG_LEVEL`（フォールバック `RUST_LOG`）からフィルタを構築し、
//! `MOCKHUB_LOG_DIR` が設定されていれば日次ローテーションのJSONファイルにも出力する。

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

use crate::config::get_env_with_fallback;
use crate::error::{CommonError, CommonResult};

/// ログ出力を保持するガード（プロセス終了まで保持すること）
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// フィルタ文字列を解決する
pub fn resolve_filter() -> String {
    get_env_with_fallback("MOCKHUB_LOG_LEVEL", "RUST_LOG").unwrap_or_else(|| "info".to_string())
}

/// ロギングを初期化する
///
/// `component` はログファイル名の接頭辞に使う（例: `coordinator`）。
pub fn init(component: &str) -> CommonResult<LoggingGuard> {
    let directive = resolve_filter();
    let filter = EnvFilter::try_new(&directive)
        .map_err(|e| CommonError::Config(format!("Invalid log level '{}': {}", directive, e)))?;

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> =
        vec![fmt::layer().with_target(true).boxed()];

    let mut file_guard = None;
    if let Ok(dir) = std::env::var("MOCKHUB_LOG_DIR") {
        let appender = tracing_appender::rolling::daily(&dir, format!("{}.log", component));
        let (writer, guard) = tracing_appender::non_blocking(appender);
        layers.push(
            fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .boxed(),
        );
        file_guard = Some(guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| CommonError::Config(format!("Failed to initialize logging: {}", e)))?;

    Ok(LoggingGuard { _file: file_guard })
}
