//! # Database Migration System
//!
//! Ordered, idempotent schema migrations with a tracking table. Migration
//! SQL is embedded at compile time from the `migrations/` directory using
//! a timestamp-based naming convention: `YYYYMMDDHHMMSS_description.sql`.

use sqlx::sqlite::SqlitePool;

/// Embedded migrations, applied in array order.
const MIGRATIONS: &[(&str, &str)] = &[(
    "20240601000001_initial_schema",
    include_str!("../../migrations/20240601000001_initial_schema.sql"),
)];

/// Manages schema migrations for the pipeline store.
pub struct DatabaseMigrations;

impl DatabaseMigrations {
    /// Run all outstanding migrations in order.
    pub async fn run_all(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        Self::ensure_migration_table(pool).await?;

        for (version, sql) in MIGRATIONS {
            if Self::is_applied(pool, version).await? {
                continue;
            }

            let mut tx = pool.begin().await?;
            sqlx::raw_sql(sql).execute(&mut *tx).await?;
            sqlx::query("INSERT INTO schema_migrations (version) VALUES (?)")
                .bind(version)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            tracing::debug!(version = %version, "migration applied");
        }

        Ok(())
    }

    async fn ensure_migration_table(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version TEXT PRIMARY KEY,
                applied_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn is_applied(pool: &SqlitePool, version: &str) -> Result<bool, sqlx::Error> {
        let applied: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM schema_migrations WHERE version = ?)",
        )
        .bind(version)
        .fetch_one(pool)
        .await?;
        Ok(applied)
    }
}
