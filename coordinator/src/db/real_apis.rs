//! 実API定義のデータベース操作
//!
//! 実API定義はプラットフォーム側が管理する。Coordinatorは参照のみ行い、
//! 書き込みは取り込み・テスト用途に限る。

use mockhub_common::types::{HttpMethod, RealApi};
use sqlx::SqlitePool;
use uuid::Uuid;

/// IDで実APIを取得
pub async fn get_real_api(pool: &SqlitePool, id: Uuid) -> Result<Option<RealApi>, sqlx::Error> {
    let row = sqlx::query_as::<_, RealApiRow>(
        "SELECT id, project_id, summary, method, endpoint FROM real_apis WHERE id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Into::into))
}

/// 実APIを登録・更新
pub async fn upsert_real_api(pool: &SqlitePool, api: &RealApi) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO real_apis (id, project_id, summary, method, endpoint)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            project_id = excluded.project_id,
            summary = excluded.summary,
            method = excluded.method,
            endpoint = excluded.endpoint
        "#,
    )
    .bind(api.id.to_string())
    .bind(api.project_id.to_string())
    .bind(&api.summary)
    .bind(api.method.as_str())
    .bind(&api.endpoint)
    .execute(pool)
    .await?;

    Ok(())
}

/// 実APIを削除
pub async fn delete_real_api(pool: &SqlitePool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM real_apis WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

#[derive(sqlx::FromRow)]
struct RealApiRow {
    id: String,
    project_id: String,
    summary: String,
    method: String,
    endpoint: String,
}

impl From<RealApiRow> for RealApi {
    fn from(row: RealApiRow) -> Self {
        RealApi {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            project_id: Uuid::parse_str(&row.project_id).unwrap_or_default(),
            summary: row.summary,
            method: row.method.parse().unwrap_or(HttpMethod::Get),
            endpoint: row.endpoint,
        }
    }
}
