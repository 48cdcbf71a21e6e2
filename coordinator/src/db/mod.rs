//! データベースアクセス層
//!
//! SQLiteデータベースへの接続とクエリ実行

/// モックサービス
pub mod services;

/// モックエンドポイント
pub mod apis;

/// 累積カウンター
pub mod counters;

/// 実API定義（参照用）
pub mod real_apis;

/// クラスタジョブロック
pub mod job_locks;

/// Repository trait定義
pub mod traits;

use mockhub_common::error::{CoordinatorError, CoordinatorResult};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

/// データベース接続プールを作成
///
/// インメモリDBの場合は接続を1本に固定する（接続ごとに別DBになるため）。
pub async fn create_pool(database_url: &str) -> CoordinatorResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| CoordinatorError::Database(e.to_string()))?
        .create_if_missing(true);

    let in_memory = database_url.contains(":memory:");
    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(5)
    };

    let pool = pool_options
        .connect_with(options)
        .await
        .map_err(|e| CoordinatorError::Database(e.to_string()))?;

    // マイグレーション実行
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| CoordinatorError::Database(format!("Migration failed: {}", e)))?;

    Ok(pool)
}

/// sqlxエラーをCoordinatorErrorへ変換（一意制約違反はConflict）
pub fn map_db_error(err: sqlx::Error) -> CoordinatorError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return CoordinatorError::Conflict(db_err.message().to_string());
        }
    }
    CoordinatorError::Database(err.to_string())
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    create_pool("sqlite::memory:")
        .await
        .expect("Failed to create test database")
}
