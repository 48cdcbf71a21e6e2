//! MockHub Coordinator
//!
//! モックサービスのライフサイクルをノードを跨いで管理するコントロールプレーン

#![warn(missing_docs)]

/// REST APIハンドラー
pub mod api;

/// コマンドライン引数
pub mod cli;

/// データベースアクセス
pub mod db;

/// Agentへのコマンドディスパッチ
pub mod dispatch;

/// クラスタ単位のシングルフライトジョブ
pub mod jobs;

/// ライフサイクルオーケストレーター
pub mod lifecycle;

/// クォータチェック
pub mod quota;

/// ノード登録管理
pub mod registry;

/// サーバー起動
pub mod server;

use std::sync::Arc;

/// アプリケーション状態
#[derive(Clone)]
pub struct AppState {
    /// ノードレジストリ
    pub registry: registry::NodeRegistry,
    /// ライフサイクルオーケストレーター
    pub orchestrator: Arc<lifecycle::LifecycleOrchestrator>,
    /// 同期プロトコルの共有トークン（未設定なら認証しない）
    pub sync_token: Option<String>,
}
