//! クラスタジョブロック（リース）のデータベース操作
//!
//! ジョブ名をキーにしたリース。期限切れのリースは別のオーナーが取得できる。

use chrono::Utc;
use sqlx::SqlitePool;
use std::time::Duration;

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn expiry(ttl: Duration) -> i64 {
    now_millis().saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
}

/// リースの取得を試みる
///
/// 未取得・期限切れ・自分が保持中のいずれかなら取得できる。
pub async fn try_acquire(
    pool: &SqlitePool,
    name: &str,
    owner: &str,
    ttl: Duration,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO job_locks (name, owner, expires_at) VALUES (?, ?, ?)
        ON CONFLICT(name) DO UPDATE SET
            owner = excluded.owner,
            expires_at = excluded.expires_at
        WHERE job_locks.expires_at <= ? OR job_locks.owner = excluded.owner
        "#,
    )
    .bind(name)
    .bind(owner)
    .bind(expiry(ttl))
    .bind(now_millis())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// 保持中のリースを延長
///
/// 既に期限切れ、または他のオーナーに奪われていれば `false`。
pub async fn renew(
    pool: &SqlitePool,
    name: &str,
    owner: &str,
    ttl: Duration,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE job_locks SET expires_at = ? WHERE name = ? AND owner = ? AND expires_at > ?",
    )
    .bind(expiry(ttl))
    .bind(name)
    .bind(owner)
    .bind(now_millis())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// リースを解放
pub async fn release(pool: &SqlitePool, name: &str, owner: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM job_locks WHERE name = ? AND owner = ?")
        .bind(name)
        .bind(owner)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
