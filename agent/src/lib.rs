//! MockHub Agent
//!
//! 各ノード上で動作し、割り当てられたモックサービスを起動・停止して
//! リクエスト数をコントロールプレーンへ同期するエージェント

#![warn(missing_docs)]

/// ディスパッチAPI
pub mod api;

/// コマンドライン引数
pub mod cli;

/// コントロールプレーン通信クライアント
pub mod client;

/// エンドポイント単位のカウンター
pub mod counter;

/// ノード登録・ハートビート
pub mod node;

/// ルーティングテーブル
pub mod routing;

/// モックサービスの実行時インスタンス
pub mod runtime;

/// エージェント起動
pub mod server;

/// サービス管理
pub mod supervisor;

/// 同期ワーカー
pub mod sync;

#[cfg(test)]
pub(crate) mod test_support;
