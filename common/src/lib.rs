//! Mockhub Common
//!
//! Coordinator と Agent で共有する型・プロトコル・マッチャー

#![warn(missing_docs)]

/// 共通型定義（MockService, MockApis 等）
pub mod types;

/// 通信プロトコル定義（同期・ディスパッチ）
pub mod protocol;

/// エンドポイントマッチャー（URIテンプレート）
pub mod matcher;

/// エラー型定義
pub mod error;

/// 設定管理
pub mod config;

/// ロギング初期化ユーティリティ
pub mod logging;
