//! 通信プロトコル定義
//!
//! Agent↔Coordinator間の通信メッセージ（同期プロトコル・ディスパッチプロトコル）

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;
use uuid::Uuid;

use crate::types::{
    HttpMethod, MockApisResponse, MockAuthKey, MockServiceSetting, SimulatedError,
};

/// エンドポイントごとのカウンター（ワイヤ表現）
///
/// ホットパス上の並行カウンターとは別の型で、スナップショット時にのみ生成される。
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApisCounter {
    /// 受信リクエスト数
    #[serde(default)]
    pub request: u64,
    /// プッシュバック数
    #[serde(default)]
    pub pushback: u64,
    /// 擬似エラー応答数
    #[serde(default)]
    pub simulate_error: u64,
    /// 正常応答数
    #[serde(default)]
    pub success: u64,
    /// 例外数
    #[serde(default)]
    pub exception: u64,
}

impl ApisCounter {
    /// 全フィールドが0か
    pub fn is_zero(&self) -> bool {
        self.request == 0
            && self.pushback == 0
            && self.simulate_error == 0
            && self.success == 0
            && self.exception == 0
    }

    /// 加算（飽和演算）
    pub fn add(&mut self, other: &ApisCounter) {
        self.request = self.request.saturating_add(other.request);
        self.pushback = self.pushback.saturating_add(other.pushback);
        self.simulate_error = self.simulate_error.saturating_add(other.simulate_error);
        self.success = self.success.saturating_add(other.success);
        self.exception = self.exception.saturating_add(other.exception);
    }
}

/// カウンタースナップショット（MockApis ID → カウンター）
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct CounterSnapshot(pub BTreeMap<Uuid, ApisCounter>);

impl CounterSnapshot {
    /// 空か
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// エントリ数
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// 指定エンドポイントのカウンター
    pub fn get(&self, apis_id: &Uuid) -> Option<&ApisCounter> {
        self.0.get(apis_id)
    }

    /// 別スナップショットを加算でマージ
    pub fn merge(&mut self, other: &CounterSnapshot) {
        for (id, counter) in &other.0 {
            self.0.entry(*id).or_default().add(counter);
        }
    }

    /// エントリを列挙
    pub fn iter(&self) -> impl Iterator<Item = (&Uuid, &ApisCounter)> {
        self.0.iter()
    }
}

/// エンドポイント詳細取得のフィルタ
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApisDetailQuery {
    /// メソッドで絞り込み
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<HttpMethod>,
    /// エンドポイントで絞り込み（正規化後の完全一致）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// ノード登録リクエスト
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegisterNodeRequest {
    /// ノードID（Agentが生成・保持）
    pub node_id: Uuid,
    /// マシン名
    pub machine_name: String,
    /// IPアドレス
    pub ip_address: IpAddr,
    /// エージェントAPIポート
    pub agent_port: u16,
}

/// ノード登録レスポンス
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegisterNodeResponse {
    /// ノードID
    pub node_id: Uuid,
    /// ステータス ("registered" または "updated")
    pub status: RegisterStatus,
}

/// 登録ステータス
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RegisterStatus {
    /// 新規登録
    Registered,
    /// 既存ノード更新
    Updated,
}

/// Agentへの起動・停止コマンドの応答
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentCommandResponse {
    /// 対象モックサービス
    pub service_id: Uuid,
    /// 成功フラグ
    pub success: bool,
    /// 起動時のバインドアドレス（host:port）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// 失敗理由
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// バッチ操作の失敗内容
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OperationFailure {
    /// エラー種別
    pub kind: String,
    /// メッセージ
    pub message: String,
}

/// バッチ操作のID単位の結果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceOperationResult {
    /// 対象モックサービス
    pub id: Uuid,
    /// 成功フラグ
    pub success: bool,
    /// 起動時のバインドアドレス
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// 失敗内容
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationFailure>,
}

impl ServiceOperationResult {
    /// 成功結果
    pub fn ok(id: Uuid, address: Option<String>) -> Self {
        Self {
            id,
            success: true,
            address,
            error: None,
        }
    }

    /// 失敗結果
    pub fn failed(id: Uuid, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            address: None,
            error: Some(OperationFailure {
                kind: kind.into(),
                message: message.into(),
            }),
        }
    }
}

/// モックサービス作成リクエスト
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateMockServiceRequest {
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
    /// 認証キー
    #[serde(default)]
    pub auth_keys: Vec<MockAuthKey>,
    /// 設定
    #[serde(default)]
    pub setting: MockServiceSetting,
}

/// モックエンドポイント追加リクエスト
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewMockApis {
    /// 表示名
    #[serde(default)]
    pub summary: String,
    /// HTTPメソッド
    pub method: HttpMethod,
    /// パスパターン
    pub endpoint: String,
    /// 応答定義
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<MockApisResponse>,
    /// 擬似エラー定義
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulate_error: Option<SimulatedError>,
    /// 実APIへのプッシュバック
    #[serde(default)]
    pub pushback: bool,
}

/// 一括インポートの1オペレーション
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImportOperation {
    /// 表示名
    #[serde(default)]
    pub summary: String,
    /// HTTPメソッド
    pub method: HttpMethod,
    /// パス
    pub endpoint: String,
    /// 応答定義
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<MockApisResponse>,
}

/// 一括インポートリクエスト
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImportOperationsRequest {
    /// インポート対象
    pub operations: Vec<ImportOperation>,
}

/// 実APIインポートモード
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    /// 一度きりのコピー（COPY_APIS）
    Copy,
    /// ライブ参照（ASSOC_APIS）
    Assoc,
}

/// 実APIインポートリクエスト
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImportRealApisRequest {
    /// 実API ID一覧
    pub real_api_ids: Vec<Uuid>,
    /// モード
    pub mode: ImportMode,
}

/// インポート結果
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportSummary {
    /// 作成されたエンドポイントID
    pub created: Vec<Uuid>,
    /// 既存と同一のためスキップした件数
    pub skipped: usize,
    /// 見つからなかった実API ID
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<Uuid>,
}

/// ID一覧によるバッチリクエスト
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchIdsRequest {
    /// 対象ID
    pub ids: Vec<Uuid>,
}

/// 削除リクエスト
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteServicesRequest {
    /// 対象ID
    pub ids: Vec<Uuid>,
    /// 関連付けがあっても削除する
    #[serde(default)]
    pub force: bool,
}

/// 関連付けリクエスト
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssociateRequest {
    /// 参照先の実API
    pub real_api_id: Uuid,
}

/// アンリンク結果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnlinkResponse {
    /// 参照を外したエンドポイント数
    pub unlinked: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apis_counter_wire_names() {
        let counter = ApisCounter {
            request: 3,
            pushback: 1,
            simulate_error: 2,
            success: 1,
            exception: 0,
        };
        let json = serde_json::to_value(counter).unwrap();
        assert_eq!(json["request"], 3);
        assert_eq!(json["simulateError"], 2);
        assert_eq!(json["exception"], 0);
    }

    #[test]
    fn test_counter_snapshot_is_plain_map() {
        let id = Uuid::nil();
        let mut map = BTreeMap::new();
        map.insert(
            id,
            ApisCounter {
                request: 5,
                ..Default::default()
            },
        );
        let snapshot = CounterSnapshot(map);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json[id.to_string()]["request"], 5);

        // 欠けたフィールドは0として扱う
        let parsed: CounterSnapshot =
            serde_json::from_str(&format!(r#"{{"{}":{{"success":2}}}}"#, id)).unwrap();
        assert_eq!(parsed.get(&id).unwrap().success, 2);
        assert_eq!(parsed.get(&id).unwrap().request, 0);
    }

    #[test]
    fn test_counter_merge_is_additive() {
        let id = Uuid::new_v4();
        let mut a = CounterSnapshot::default();
        a.0.insert(
            id,
            ApisCounter {
                request: 1,
                success: 1,
                ..Default::default()
            },
        );
        let b = a.clone();
        a.merge(&b);
        assert_eq!(a.get(&id).unwrap().request, 2);
        assert_eq!(a.get(&id).unwrap().success, 2);
        assert!(!a.get(&id).unwrap().is_zero());
    }

    #[test]
    fn test_register_status_serialization() {
        assert_eq!(
            serde_json::to_string(&RegisterStatus::Registered).unwrap(),
            "\"registered\""
        );
        assert_eq!(
            serde_json::to_string(&RegisterStatus::Updated).unwrap(),
            "\"updated\""
        );
    }

    #[test]
    fn test_operation_result_shapes() {
        let id = Uuid::new_v4();
        let ok = ServiceOperationResult::ok(id, Some("10.0.0.1:8080".to_string()));
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["success"], true);
        assert!(json.get("error").is_none());

        let failed = ServiceOperationResult::failed(id, "timeout_error", "node timed out");
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["kind"], "timeout_error");
    }

    #[test]
    fn test_delete_request_force_defaults_false() {
        let req: DeleteServicesRequest =
            serde_json::from_str(&format!(r#"{{"ids":["{}"]}}"#, Uuid::nil())).unwrap();
        assert!(!req.force);
    }
}
