//! モックエンドポイントのデータベース操作

use chrono::Utc;
use mockhub_common::types::{ApisSource, HttpMethod, MockApis};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::services::parse_timestamp;

const SELECT_COLUMNS: &str = r#"
    SELECT id, mock_service_id, summary, method, endpoint, source_kind, assoc_api_id,
           response, simulate_error, pushback, created_at, updated_at
    FROM mock_apis
"#;

/// モックエンドポイントを登録
pub async fn insert_apis(pool: &SqlitePool, apis: &MockApis) -> Result<(), sqlx::Error> {
    let response = apis
        .response
        .as_ref()
        .and_then(|r| serde_json::to_string(r).ok());
    let simulate_error = apis
        .simulate_error
        .as_ref()
        .and_then(|e| serde_json::to_string(e).ok());

    sqlx::query(
        r#"
        INSERT INTO mock_apis (
            id, mock_service_id, summary, method, endpoint, source_kind, assoc_api_id,
            response, simulate_error, pushback, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(apis.id.to_string())
    .bind(apis.mock_service_id.to_string())
    .bind(&apis.summary)
    .bind(apis.method.as_str())
    .bind(&apis.endpoint)
    .bind(apis.source.as_str())
    .bind(apis.source.assoc_api_id().map(|id| id.to_string()))
    .bind(&response)
    .bind(&simulate_error)
    .bind(apis.pushback)
    .bind(apis.created_at.to_rfc3339())
    .bind(apis.updated_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// IDでモックエンドポイントを取得
pub async fn get_apis(pool: &SqlitePool, id: Uuid) -> Result<Option<MockApis>, sqlx::Error> {
    let row = sqlx::query_as::<_, MockApisRow>(&format!("{} WHERE id = ?", SELECT_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    Ok(row.map(Into::into))
}

/// サービスに属するモックエンドポイント一覧
pub async fn list_by_service(
    pool: &SqlitePool,
    service_id: Uuid,
) -> Result<Vec<MockApis>, sqlx::Error> {
    let rows = sqlx::query_as::<_, MockApisRow>(&format!(
        "{} WHERE mock_service_id = ? ORDER BY created_at",
        SELECT_COLUMNS
    ))
    .bind(service_id.to_string())
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// (service, method, endpoint) が既に存在するか
pub async fn exists_identity(
    pool: &SqlitePool,
    service_id: Uuid,
    method: HttpMethod,
    endpoint: &str,
) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM mock_apis WHERE mock_service_id = ? AND method = ? AND endpoint = ?",
    )
    .bind(service_id.to_string())
    .bind(method.as_str())
    .bind(endpoint)
    .fetch_one(pool)
    .await?;

    Ok(count > 0)
}

/// 由来（関連付け）を更新
pub async fn update_source(
    pool: &SqlitePool,
    id: Uuid,
    source: ApisSource,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE mock_apis SET source_kind = ?, assoc_api_id = ?, updated_at = ? WHERE id = ?",
    )
    .bind(source.as_str())
    .bind(source.assoc_api_id().map(|id| id.to_string()))
    .bind(Utc::now().to_rfc3339())
    .bind(id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// 指定実APIへの参照をすべて外す（ソフトアンリンク）
pub async fn clear_association(pool: &SqlitePool, real_api_id: Uuid) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE mock_apis SET assoc_api_id = NULL, updated_at = ? WHERE assoc_api_id = ?",
    )
    .bind(Utc::now().to_rfc3339())
    .bind(real_api_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// 参照中の実API ID一覧（重複なし）
pub async fn list_associated_real_api_ids(pool: &SqlitePool) -> Result<Vec<Uuid>, sqlx::Error> {
    let ids: Vec<String> = sqlx::query_scalar(
        "SELECT DISTINCT assoc_api_id FROM mock_apis WHERE assoc_api_id IS NOT NULL",
    )
    .fetch_all(pool)
    .await?;

    Ok(ids
        .iter()
        .filter_map(|raw| Uuid::parse_str(raw).ok())
        .collect())
}

/// サービス内のライブ参照数
pub async fn count_live_associations(
    pool: &SqlitePool,
    service_id: Uuid,
) -> Result<u64, sqlx::Error> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM mock_apis WHERE mock_service_id = ? AND assoc_api_id IS NOT NULL",
    )
    .bind(service_id.to_string())
    .fetch_one(pool)
    .await?;

    Ok(count.max(0) as u64)
}

/// モックエンドポイントを削除
pub async fn delete_apis(pool: &SqlitePool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM mock_apis WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// サービスに属するモックエンドポイントをすべて削除
pub async fn delete_by_service(pool: &SqlitePool, service_id: Uuid) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM mock_apis WHERE mock_service_id = ?")
        .bind(service_id.to_string())
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

#[derive(sqlx::FromRow)]
struct MockApisRow {
    id: String,
    mock_service_id: String,
    summary: String,
    method: String,
    endpoint: String,
    source_kind: String,
    assoc_api_id: Option<String>,
    response: Option<String>,
    simulate_error: Option<String>,
    pushback: bool,
    created_at: String,
    updated_at: String,
}

impl From<MockApisRow> for MockApis {
    fn from(row: MockApisRow) -> Self {
        let assoc_api_id = row
            .assoc_api_id
            .as_deref()
            .and_then(|raw| Uuid::parse_str(raw).ok());
        let source = ApisSource::from_parts(&row.source_kind, assoc_api_id).unwrap_or_else(|e| {
            tracing::warn!(apis_id = %row.id, error = %e, "Unknown source kind, treating as created");
            ApisSource::Created
        });

        MockApis {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            mock_service_id: Uuid::parse_str(&row.mock_service_id).unwrap_or_default(),
            summary: row.summary,
            method: row.method.parse().unwrap_or(HttpMethod::Get),
            endpoint: row.endpoint,
            source,
            response: row
                .response
                .as_deref()
                .and_then(|raw| serde_json::from_str(raw).ok()),
            simulate_error: row
                .simulate_error
                .as_deref()
                .and_then(|raw| serde_json::from_str(raw).ok()),
            pushback: row.pushback,
            created_at: parse_timestamp(&row.created_at),
            updated_at: parse_timestamp(&row.updated_at),
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_apis(
    service_id: Uuid,
    method: HttpMethod,
    endpoint: &str,
    source: ApisSource,
) -> MockApis {
    let now = Utc::now();
    MockApis {
        id: Uuid::new_v4(),
        mock_service_id: service_id,
        summary: String::new(),
        method,
        endpoint: endpoint.to_string(),
        source,
        response: None,
        simulate_error: None,
        pushback: false,
        created_at: now,
        updated_at: now,
    }
}
