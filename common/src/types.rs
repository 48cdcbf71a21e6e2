//! 共通型定義
//!
//! MockService, MockApis, ApisSource 等のコアデータ型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::CommonError;

/// HTTPメソッド
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
    /// HEAD
    Head,
    /// OPTIONS
    Options,
    /// TRACE
    Trace,
}

impl HttpMethod {
    /// HttpMethodを文字列に変換
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Trace => "TRACE",
        }
    }
}

impl FromStr for HttpMethod {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            "HEAD" => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            "TRACE" => Ok(Self::Trace),
            other => Err(CommonError::Validation(format!(
                "Unsupported HTTP method: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// モックサービスの状態
///
/// `Created → Running ⇄ Stopped`、`Deleted` は `Created` / `Stopped` からのみ到達可能
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MockServiceStatus {
    /// 作成済み（未起動）
    #[default]
    Created,
    /// 稼働中
    Running,
    /// 停止中
    Stopped,
    /// 削除済み（論理削除）
    Deleted,
}

impl MockServiceStatus {
    /// MockServiceStatusを文字列に変換
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Deleted => "deleted",
        }
    }

    /// 削除済み以外を「アクティブ」とみなす
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Deleted)
    }

    /// 指定状態への遷移が許可されているか
    pub fn can_transition_to(&self, next: MockServiceStatus) -> bool {
        use MockServiceStatus::*;
        matches!(
            (self, next),
            (Created, Running)
                | (Running, Stopped)
                | (Stopped, Running)
                | (Created, Deleted)
                | (Stopped, Deleted)
        )
    }
}

impl FromStr for MockServiceStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "running" => Self::Running,
            "stopped" => Self::Stopped,
            "deleted" => Self::Deleted,
            _ => Self::Created,
        })
    }
}

impl std::fmt::Display for MockServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// モックリクエストのログ出力レベル
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RequestLogLevel {
    /// ログ出力なし
    None,
    /// メソッド・パス・ステータスのみ
    #[default]
    Basic,
    /// ヘッダーとボディサイズも出力
    Full,
}

/// モックサービス設定
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MockServiceSetting {
    /// 同時処理リクエスト数の上限
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
    /// リクエストボディの最大サイズ（バイト）
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// リクエストログレベル
    #[serde(default)]
    pub log_level: RequestLogLevel,
    /// プッシュバック先（実APIのベースURL）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pushback_url: Option<String>,
}

fn default_max_concurrent_requests() -> usize {
    256
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

impl Default for MockServiceSetting {
    fn default() -> Self {
        Self {
            max_concurrent_requests: default_max_concurrent_requests(),
            max_body_bytes: default_max_body_bytes(),
            log_level: RequestLogLevel::default(),
            pushback_url: None,
        }
    }
}

/// モックサービス認証キー
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MockAuthKey {
    /// ヘッダー名
    pub header: String,
    /// 期待する値
    pub value: String,
}

/// モックサービス
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MockService {
    /// 一意識別子
    pub id: Uuid,
    /// 所属プロジェクト
    pub project_id: Uuid,
    /// サービス名
    pub name: String,
    /// 割り当てノード
    pub node_id: Uuid,
    /// リッスンポート
    pub service_port: u16,
    /// ドメイン（任意）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_domain: Option<String>,
    /// 認証有効フラグ
    #[serde(default)]
    pub auth_enabled: bool,
    /// 認証キー一覧（auth_enabled時に使用）
    #[serde(default)]
    pub auth_keys: Vec<MockAuthKey>,
    /// 状態
    pub status: MockServiceStatus,
    /// 設定
    #[serde(default)]
    pub setting: MockServiceSetting,
    /// 作成日時
    pub created_at: DateTime<Utc>,
    /// 更新日時
    pub updated_at: DateTime<Utc>,
}

/// モックエンドポイントの由来
///
/// ライブ参照を持つのは `AssocApis` のみ。参照先が消えた場合は `None` になる（ソフトアンリンク）。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApisSource {
    /// 手動作成
    Created,
    /// 一括インポート
    AngusImport,
    /// 実APIのコピー（以後は独立して変化する）
    CopyApis,
    /// 実APIへのライブ参照
    AssocApis {
        /// 参照先の実API ID
        #[serde(default)]
        api_id: Option<Uuid>,
    },
}

impl ApisSource {
    /// 種別名を文字列に変換
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::AngusImport => "ANGUS_IMPORT",
            Self::CopyApis => "COPY_APIS",
            Self::AssocApis { .. } => "ASSOC_APIS",
        }
    }

    /// ライブ参照中の実API ID
    pub fn assoc_api_id(&self) -> Option<Uuid> {
        match self {
            Self::AssocApis { api_id } => *api_id,
            _ => None,
        }
    }

    /// 種別名と参照IDから復元
    pub fn from_parts(kind: &str, api_id: Option<Uuid>) -> Result<Self, CommonError> {
        match kind {
            "CREATED" => Ok(Self::Created),
            "ANGUS_IMPORT" => Ok(Self::AngusImport),
            "COPY_APIS" => Ok(Self::CopyApis),
            "ASSOC_APIS" => Ok(Self::AssocApis { api_id }),
            other => Err(CommonError::Validation(format!(
                "Unknown apis source: {}",
                other
            ))),
        }
    }
}

/// モックレスポンス定義
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MockApisResponse {
    /// ステータスコード
    #[serde(default = "default_response_status")]
    pub status: u16,
    /// レスポンスヘッダー
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// レスポンスボディ
    #[serde(default)]
    pub body: String,
    /// 応答遅延（ミリ秒）
    #[serde(default)]
    pub delay_ms: u64,
}

fn default_response_status() -> u16 {
    200
}

/// 擬似エラー定義
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SimulatedError {
    /// 返却するステータスコード
    pub status: u16,
    /// エラーメッセージ
    #[serde(default)]
    pub message: String,
}

/// モックエンドポイント
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MockApis {
    /// 一意識別子
    pub id: Uuid,
    /// 所属モックサービス
    pub mock_service_id: Uuid,
    /// 表示名
    #[serde(default)]
    pub summary: String,
    /// HTTPメソッド
    pub method: HttpMethod,
    /// パスパターン（URIテンプレート）
    pub endpoint: String,
    /// 由来
    pub source: ApisSource,
    /// 応答定義
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<MockApisResponse>,
    /// 擬似エラー定義
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulate_error: Option<SimulatedError>,
    /// 実APIへのプッシュバック
    #[serde(default)]
    pub pushback: bool,
    /// 作成日時
    pub created_at: DateTime<Utc>,
    /// 更新日時
    pub updated_at: DateTime<Utc>,
}

impl MockApis {
    /// ライブ参照を持つか
    pub fn has_live_association(&self) -> bool {
        self.source.assoc_api_id().is_some()
    }
}

/// プラットフォーム上の実API定義（読み取り専用）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RealApi {
    /// 一意識別子
    pub id: Uuid,
    /// 所属プロジェクト
    pub project_id: Uuid,
    /// 表示名
    #[serde(default)]
    pub summary: String,
    /// HTTPメソッド
    pub method: HttpMethod,
    /// パス
    pub endpoint: String,
}

/// ノードの状態
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// オンライン
    Online,
    /// オフライン
    Offline,
}

/// モックサービスを稼働させるノード
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    /// 一意識別子
    pub id: Uuid,
    /// マシン名
    pub machine_name: String,
    /// IPアドレス
    pub ip_address: IpAddr,
    /// エージェントAPIポート
    pub agent_port: u16,
    /// 状態
    pub status: NodeStatus,
    /// 登録日時
    pub registered_at: DateTime<Utc>,
    /// 最終ハートビート時刻
    pub last_seen: DateTime<Utc>,
}

impl Node {
    /// エージェントAPIのベースURL
    pub fn agent_url(&self) -> String {
        match self.ip_address {
            IpAddr::V4(ip) => format!("http://{}:{}", ip, self.agent_port),
            IpAddr::V6(ip) => format!("http://[{}]:{}", ip, self.agent_port),
        }
    }
}
