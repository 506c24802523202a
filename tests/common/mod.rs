//! Shared fixtures for the integration suite: a migrated temp-file
//! database and a seeded entity hierarchy.

use pipeline_core::config::PipelineConfig;
use pipeline_core::database::{DatabaseConnection, DatabaseMigrations};
use sqlx::sqlite::SqlitePool;
use tempfile::TempDir;

/// A migrated database backed by a temp file. The directory is removed
/// when the fixture drops.
pub struct TestDb {
    pub pool: SqlitePool,
    pub config: PipelineConfig,
    _dir: TempDir,
}

pub async fn test_db() -> TestDb {
    pipeline_core::logging::init_structured_logging();
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let config = PipelineConfig {
        database_url: format!("sqlite://{}", dir.path().join("pipeline.db").display()),
        ..PipelineConfig::default()
    };
    let connection = DatabaseConnection::connect(&config)
        .await
        .expect("failed to connect");
    DatabaseMigrations::run_all(connection.pool())
        .await
        .expect("failed to run migrations");
    TestDb {
        pool: connection.pool().clone(),
        config,
        _dir: dir,
    }
}

/// Ids of one seeded project / sequence / shot / asset / task chain.
#[allow(dead_code)]
pub struct SeededIds {
    pub project_id: i64,
    pub sequence_id: i64,
    pub shot_id: i64,
    pub asset_id: i64,
    pub task_id: i64,
    pub artist_id: i64,
}

#[allow(dead_code)]
pub async fn seed_entities(pool: &SqlitePool) -> SeededIds {
    let project_id = insert_returning_id(
        pool,
        "INSERT INTO projects (name, base_path) VALUES ('TestShow', '/show/TestShow')",
    )
    .await;
    let sequence_id = insert_returning_id(
        pool,
        &format!("INSERT INTO sequences (project_id, name) VALUES ({project_id}, '010')"),
    )
    .await;
    let shot_id = insert_returning_id(
        pool,
        &format!(
            "INSERT INTO shots (project_id, sequence_id, name) VALUES ({project_id}, {sequence_id}, '0020')"
        ),
    )
    .await;
    let asset_id = insert_returning_id(
        pool,
        &format!("INSERT INTO assets (project_id, name) VALUES ({project_id}, 'barrel')"),
    )
    .await;
    let artist_id = 501;
    let task_id = insert_returning_id(
        pool,
        &format!(
            "INSERT INTO tasks (project_id, artist_id, name) VALUES ({project_id}, {artist_id}, 'fx_task')"
        ),
    )
    .await;

    SeededIds {
        project_id,
        sequence_id,
        shot_id,
        asset_id,
        task_id,
        artist_id,
    }
}

async fn insert_returning_id(pool: &SqlitePool, sql: &str) -> i64 {
    sqlx::query(sql)
        .execute(pool)
        .await
        .expect("seed insert failed")
        .last_insert_rowid()
}
