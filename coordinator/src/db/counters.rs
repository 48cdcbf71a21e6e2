//! 累積カウンターのデータベース操作
//!
//! ノードからアップロードされた差分を加算で適用する（`stored += delta`）。

use chrono::Utc;
use mockhub_common::protocol::{ApisCounter, CounterSnapshot};
use sqlx::SqlitePool;
use uuid::Uuid;

/// サービスのカウンター差分を加算適用
///
/// 対象サービスに属さないエンドポイントIDは無視する。適用した件数を返す。
pub async fn apply_delta(
    pool: &SqlitePool,
    service_id: Uuid,
    delta: &CounterSnapshot,
) -> Result<u64, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let now = Utc::now().to_rfc3339();
    let service = service_id.to_string();
    let mut applied = 0u64;

    for (apis_id, counter) in delta.iter() {
        if counter.is_zero() {
            continue;
        }

        let owned: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM mock_apis WHERE id = ? AND mock_service_id = ?",
        )
        .bind(apis_id.to_string())
        .bind(&service)
        .fetch_one(&mut *tx)
        .await?;
        if owned == 0 {
            tracing::debug!(apis_id = %apis_id, service_id = %service_id, "Ignoring counter for unknown apis");
            continue;
        }

        sqlx::query(
            r#"
            INSERT INTO mock_apis_counters (
                apis_id, mock_service_id, request, pushback, simulate_error, success, exception, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(apis_id) DO UPDATE SET
                request = request + excluded.request,
                pushback = pushback + excluded.pushback,
                simulate_error = simulate_error + excluded.simulate_error,
                success = success + excluded.success,
                exception = exception + excluded.exception,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(apis_id.to_string())
        .bind(&service)
        .bind(to_db(counter.request))
        .bind(to_db(counter.pushback))
        .bind(to_db(counter.simulate_error))
        .bind(to_db(counter.success))
        .bind(to_db(counter.exception))
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        applied += 1;
    }

    tx.commit().await?;
    Ok(applied)
}

/// サービスの累積カウンター一覧
pub async fn list_by_service(
    pool: &SqlitePool,
    service_id: Uuid,
) -> Result<CounterSnapshot, sqlx::Error> {
    let rows = sqlx::query_as::<_, CounterRow>(
        r#"
        SELECT apis_id, request, pushback, simulate_error, success, exception
        FROM mock_apis_counters
        WHERE mock_service_id = ?
        "#,
    )
    .bind(service_id.to_string())
    .fetch_all(pool)
    .await?;

    Ok(CounterSnapshot(
        rows.into_iter()
            .filter_map(|row| {
                let id = Uuid::parse_str(&row.apis_id).ok()?;
                Some((id, row.into()))
            })
            .collect(),
    ))
}

/// エンドポイントのカウンターを削除
pub async fn delete_counter(pool: &SqlitePool, apis_id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM mock_apis_counters WHERE apis_id = ?")
        .bind(apis_id.to_string())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// サービスのカウンターをすべて削除
pub async fn delete_by_service(pool: &SqlitePool, service_id: Uuid) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM mock_apis_counters WHERE mock_service_id = ?")
        .bind(service_id.to_string())
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

fn to_db(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[derive(sqlx::FromRow)]
struct CounterRow {
    apis_id: String,
    request: i64,
    pushback: i64,
    simulate_error: i64,
    success: i64,
    exception: i64,
}

impl From<CounterRow> for ApisCounter {
    fn from(row: CounterRow) -> Self {
        ApisCounter {
            request: row.request.max(0) as u64,
            pushback: row.pushback.max(0) as u64,
            simulate_error: row.simulate_error.max(0) as u64,
            success: row.success.max(0) as u64,
            exception: row.exception.max(0) as u64,
        }
    }
}
