//! SQLite-backed store (sqlx).

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use uuid::Uuid;

use super::{ExecutionStore, RunStore};
use crate::error::{Error, Result};
use crate::model::{
    BrowserKind, ExecutionStatus, RunStatus, TestExecution, TestRun, TestType,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS test_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL,
    url TEXT NOT NULL,
    browser TEXT NOT NULL,
    test_type TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    total_tests INTEGER NOT NULL DEFAULT 0,
    passed_tests INTEGER NOT NULL DEFAULT 0,
    failed_tests INTEGER NOT NULL DEFAULT 0,
    error_message TEXT
);

CREATE TABLE IF NOT EXISTS test_executions (
    id TEXT PRIMARY KEY,
    run_id INTEGER NOT NULL,
    test_name TEXT NOT NULL,
    test_description TEXT,
    status TEXT NOT NULL,
    error_message TEXT,
    evidence_path TEXT,
    duration_ms INTEGER,
    executed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_test_runs_project ON test_runs (project_id, started_at);
CREATE INDEX IF NOT EXISTS idx_test_executions_run ON test_executions (run_id);
"#;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema
    pub async fn connect(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        for statement in SCHEMA.split(';').filter(|s| !s.trim().is_empty()) {
            sqlx::query(statement).execute(&pool).await?;
        }

        Ok(Self { pool })
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| Error::Store(format!("bad timestamp '{}': {}", s, e)))
}

fn row_to_run(row: &SqliteRow) -> Result<TestRun> {
    let browser: String = row.try_get("browser")?;
    let test_type: String = row.try_get("test_type")?;
    let status: String = row.try_get("status")?;
    let started_at: String = row.try_get("started_at")?;
    let completed_at: Option<String> = row.try_get("completed_at")?;

    Ok(TestRun {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        url: row.try_get("url")?,
        browser: BrowserKind::parse(&browser)
            .ok_or_else(|| Error::Store(format!("bad browser value '{}'", browser)))?,
        test_type: TestType::parse(&test_type)
            .ok_or_else(|| Error::Store(format!("bad test type value '{}'", test_type)))?,
        status: RunStatus::from_str(&status).map_err(Error::Store)?,
        started_at: parse_timestamp(&started_at)?,
        completed_at: completed_at.as_deref().map(parse_timestamp).transpose()?,
        total_tests: row.try_get::<i64, _>("total_tests")? as u32,
        passed_tests: row.try_get::<i64, _>("passed_tests")? as u32,
        failed_tests: row.try_get::<i64, _>("failed_tests")? as u32,
        error_message: row.try_get("error_message")?,
    })
}

fn row_to_execution(row: &SqliteRow) -> Result<TestExecution> {
    let id: String = row.try_get("id")?;
    let status: String = row.try_get("status")?;
    let executed_at: String = row.try_get("executed_at")?;
    let duration_ms: Option<i64> = row.try_get("duration_ms")?;

    Ok(TestExecution {
        id: Uuid::parse_str(&id).map_err(|e| Error::Store(format!("bad execution id: {}", e)))?,
        run_id: row.try_get("run_id")?,
        test_name: row.try_get("test_name")?,
        test_description: row.try_get("test_description")?,
        status: ExecutionStatus::from_str(&status).map_err(Error::Store)?,
        error_message: row.try_get("error_message")?,
        evidence_path: row.try_get("evidence_path")?,
        duration_ms: duration_ms.map(|d| d as u64),
        executed_at: parse_timestamp(&executed_at)?,
    })
}

#[async_trait]
impl RunStore for SqliteStore {
    async fn create_run(
        &self,
        project_id: i64,
        url: &str,
        browser: BrowserKind,
        test_type: TestType,
    ) -> Result<TestRun> {
        let started_at = Utc::now();
        let result = sqlx::query(
            "INSERT INTO test_runs (project_id, url, browser, test_type, status, started_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(project_id)
        .bind(url)
        .bind(browser.as_str())
        .bind(test_type.as_str())
        .bind(RunStatus::Pending.to_string())
        .bind(started_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(TestRun {
            id: result.last_insert_rowid(),
            project_id,
            url: url.to_string(),
            browser,
            test_type,
            status: RunStatus::Pending,
            started_at,
            completed_at: None,
            total_tests: 0,
            passed_tests: 0,
            failed_tests: 0,
            error_message: None,
        })
    }

    async fn get_run(&self, id: i64) -> Result<TestRun> {
        let row = sqlx::query("SELECT * FROM test_runs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found(format!("test run not found with id: {}", id)))?;
        row_to_run(&row)
    }

    async fn list_runs(&self, project_id: i64) -> Result<Vec<TestRun>> {
        let rows = sqlx::query(
            "SELECT * FROM test_runs WHERE project_id = ? ORDER BY started_at DESC, id DESC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_run).collect()
    }

    async fn update_run(&self, run: &TestRun) -> Result<()> {
        let result = sqlx::query(
            "UPDATE test_runs SET status = ?, completed_at = ?, total_tests = ?, \
             passed_tests = ?, failed_tests = ?, error_message = ? WHERE id = ?",
        )
        .bind(run.status.to_string())
        .bind(run.completed_at.map(|t| t.to_rfc3339()))
        .bind(run.total_tests as i64)
        .bind(run.passed_tests as i64)
        .bind(run.failed_tests as i64)
        .bind(run.error_message.as_deref())
        .bind(run.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!(
                "test run not found with id: {}",
                run.id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ExecutionStore for SqliteStore {
    async fn create_execution(&self, execution: &TestExecution) -> Result<()> {
        sqlx::query(
            "INSERT INTO test_executions (id, run_id, test_name, test_description, status, \
             error_message, evidence_path, duration_ms, executed_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(execution.id.to_string())
        .bind(execution.run_id)
        .bind(&execution.test_name)
        .bind(execution.test_description.as_deref())
        .bind(execution.status.to_string())
        .bind(execution.error_message.as_deref())
        .bind(execution.evidence_path.as_deref())
        .bind(execution.duration_ms.map(|d| d as i64))
        .bind(execution.executed_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_execution(&self, execution: &TestExecution) -> Result<()> {
        let result = sqlx::query(
            "UPDATE test_executions SET status = ?, error_message = ?, evidence_path = ?, \
             duration_ms = ? WHERE id = ?",
        )
        .bind(execution.status.to_string())
        .bind(execution.error_message.as_deref())
        .bind(execution.evidence_path.as_deref())
        .bind(execution.duration_ms.map(|d| d as i64))
        .bind(execution.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!(
                "test execution not found with id: {}",
                execution.id
            )));
        }
        Ok(())
    }

    async fn list_executions(&self, run_id: i64) -> Result<Vec<TestExecution>> {
        let rows = sqlx::query(
            "SELECT * FROM test_executions WHERE run_id = ? ORDER BY executed_at, id",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_execution).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::connect(&dir.path().join("selrun.db"))
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn run_round_trip() {
        let (_dir, store) = temp_store().await;
        let mut run = store
            .create_run(1, "https://example.com", BrowserKind::Firefox, TestType::Smoke)
            .await
            .unwrap();
        assert_eq!(run.status, RunStatus::Pending);

        run.status = RunStatus::Failed;
        run.error_message = Some("boom".to_string());
        run.completed_at = Some(Utc::now());
        store.update_run(&run).await.unwrap();

        let loaded = store.get_run(run.id).await.unwrap();
        assert_eq!(loaded.status, RunStatus::Failed);
        assert_eq!(loaded.browser, BrowserKind::Firefox);
        assert_eq!(loaded.error_message.as_deref(), Some("boom"));
        assert!(loaded.completed_at.is_some());
    }

    #[tokio::test]
    async fn unknown_run_is_not_found() {
        let (_dir, store) = temp_store().await;
        assert!(matches!(
            store.get_run(99).await.unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn list_runs_most_recent_first() {
        let (_dir, store) = temp_store().await;
        let a = store
            .create_run(3, "https://a.example", BrowserKind::Chromium, TestType::Smoke)
            .await
            .unwrap();
        let b = store
            .create_run(3, "https://b.example", BrowserKind::Chromium, TestType::Smoke)
            .await
            .unwrap();

        let runs = store.list_runs(3).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].id, b.id);
        assert_eq!(runs[1].id, a.id);
    }

    #[tokio::test]
    async fn execution_round_trip() {
        let (_dir, store) = temp_store().await;
        let mut execution = TestExecution::new(9, "checkout flow", Some("buys a thing".into()));
        store.create_execution(&execution).await.unwrap();

        execution.mark_failed("step 2 failed".into(), Some("/tmp/x.png".into()), 120);
        store.update_execution(&execution).await.unwrap();

        let listed = store.list_executions(9).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, ExecutionStatus::Failed);
        assert_eq!(listed[0].evidence_path.as_deref(), Some("/tmp/x.png"));
        assert_eq!(listed[0].duration_ms, Some(120));
    }
}
