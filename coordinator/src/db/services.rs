//! モックサービスのデータベース操作

use chrono::{DateTime, Utc};
use mockhub_common::types::{MockService, MockServiceStatus};
use sqlx::SqlitePool;
use uuid::Uuid;

pub(crate) fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, project_id, name, node_id, service_port, service_domain,
           auth_enabled, auth_keys, status, setting, created_at, updated_at
    FROM mock_services
"#;

/// モックサービスを登録
pub async fn insert_service(pool: &SqlitePool, service: &MockService) -> Result<(), sqlx::Error> {
    let auth_keys = serde_json::to_string(&service.auth_keys).unwrap_or_else(|_| "[]".into());
    let setting = serde_json::to_string(&service.setting).unwrap_or_else(|_| "{}".into());

    sqlx::query(
        r#"
        INSERT INTO mock_services (
            id, project_id, name, node_id, service_port, service_domain,
            auth_enabled, auth_keys, status, setting, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(service.id.to_string())
    .bind(service.project_id.to_string())
    .bind(&service.name)
    .bind(service.node_id.to_string())
    .bind(service.service_port as i64)
    .bind(&service.service_domain)
    .bind(service.auth_enabled)
    .bind(&auth_keys)
    .bind(service.status.as_str())
    .bind(&setting)
    .bind(service.created_at.to_rfc3339())
    .bind(service.updated_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// IDでモックサービスを取得（削除済みも含む）
pub async fn get_service(pool: &SqlitePool, id: Uuid) -> Result<Option<MockService>, sqlx::Error> {
    let row = sqlx::query_as::<_, MockServiceRow>(&format!("{} WHERE id = ?", SELECT_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    Ok(row.map(Into::into))
}

/// アクティブなモックサービス一覧
pub async fn list_active_services(pool: &SqlitePool) -> Result<Vec<MockService>, sqlx::Error> {
    let rows = sqlx::query_as::<_, MockServiceRow>(&format!(
        "{} WHERE status != 'deleted' ORDER BY created_at",
        SELECT_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// ステータスを更新
pub async fn update_status(
    pool: &SqlitePool,
    id: Uuid,
    status: MockServiceStatus,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE mock_services SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// プロジェクト内で同名のアクティブサービスが存在するか
pub async fn exists_active_name(
    pool: &SqlitePool,
    project_id: Uuid,
    name: &str,
) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM mock_services WHERE project_id = ? AND name = ? AND status != 'deleted'",
    )
    .bind(project_id.to_string())
    .bind(name)
    .fetch_one(pool)
    .await?;

    Ok(count > 0)
}

/// 同一ドメインのアクティブサービスが存在するか
pub async fn exists_active_domain(pool: &SqlitePool, domain: &str) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM mock_services WHERE service_domain = ? AND status != 'deleted'",
    )
    .bind(domain)
    .fetch_one(pool)
    .await?;

    Ok(count > 0)
}

/// (node, port) を使用中のアクティブサービスが存在するか
pub async fn exists_active_port(
    pool: &SqlitePool,
    node_id: Uuid,
    port: u16,
) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM mock_services WHERE node_id = ? AND service_port = ? AND status != 'deleted'",
    )
    .bind(node_id.to_string())
    .bind(port as i64)
    .fetch_one(pool)
    .await?;

    Ok(count > 0)
}

/// プロジェクトのアクティブサービス数
pub async fn count_active_by_project(
    pool: &SqlitePool,
    project_id: Uuid,
) -> Result<u64, sqlx::Error> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM mock_services WHERE project_id = ? AND status != 'deleted'",
    )
    .bind(project_id.to_string())
    .fetch_one(pool)
    .await?;

    Ok(count.max(0) as u64)
}

/// ノードのアクティブサービス数
pub async fn count_active_by_node(pool: &SqlitePool, node_id: Uuid) -> Result<u64, sqlx::Error> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM mock_services WHERE node_id = ? AND status != 'deleted'",
    )
    .bind(node_id.to_string())
    .fetch_one(pool)
    .await?;

    Ok(count.max(0) as u64)
}

#[derive(sqlx::FromRow)]
struct MockServiceRow {
    id: String,
    project_id: String,
    name: String,
    node_id: String,
    service_port: i64,
    service_domain: Option<String>,
    auth_enabled: bool,
    auth_keys: String,
    status: String,
    setting: String,
    created_at: String,
    updated_at: String,
}

impl From<MockServiceRow> for MockService {
    fn from(row: MockServiceRow) -> Self {
        MockService {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            project_id: Uuid::parse_str(&row.project_id).unwrap_or_default(),
            name: row.name,
            node_id: Uuid::parse_str(&row.node_id).unwrap_or_default(),
            service_port: u16::try_from(row.service_port).unwrap_or_default(),
            service_domain: row.service_domain,
            auth_enabled: row.auth_enabled,
            auth_keys: serde_json::from_str(&row.auth_keys).unwrap_or_default(),
            status: row.status.parse().unwrap_or_default(),
            setting: serde_json::from_str(&row.setting).unwrap_or_default(),
            created_at: parse_timestamp(&row.created_at),
            updated_at: parse_timestamp(&row.updated_at),
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_service(node_id: Uuid, port: u16) -> MockService {
    let now = Utc::now();
    MockService {
        id: Uuid::new_v4(),
        project_id: Uuid::nil(),
        name: format!("svc-{}", port),
        node_id,
        service_port: port,
        service_domain: None,
        auth_enabled: false,
        auth_keys: Vec::new(),
        status: MockServiceStatus::Created,
        setting: Default::default(),
        created_at: now,
        updated_at: now,
    }
}
