//! In-memory store, the default persistence backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ExecutionStore, RunStore};
use crate::error::{Error, Result};
use crate::model::{BrowserKind, RunStatus, TestExecution, TestRun, TestType};

#[derive(Default)]
pub struct MemoryStore {
    runs: RwLock<HashMap<i64, TestRun>>,
    executions: RwLock<HashMap<Uuid, TestExecution>>,
    next_run_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
            executions: RwLock::new(HashMap::new()),
            next_run_id: AtomicI64::new(1),
        }
    }
}

#[async_trait]
impl RunStore for MemoryStore {
    async fn create_run(
        &self,
        project_id: i64,
        url: &str,
        browser: BrowserKind,
        test_type: TestType,
    ) -> Result<TestRun> {
        let id = self.next_run_id.fetch_add(1, Ordering::SeqCst);
        let run = TestRun {
            id,
            project_id,
            url: url.to_string(),
            browser,
            test_type,
            status: RunStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            total_tests: 0,
            passed_tests: 0,
            failed_tests: 0,
            error_message: None,
        };
        self.runs.write().await.insert(id, run.clone());
        Ok(run)
    }

    async fn get_run(&self, id: i64) -> Result<TestRun> {
        self.runs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("test run not found with id: {}", id)))
    }

    async fn list_runs(&self, project_id: i64) -> Result<Vec<TestRun>> {
        let runs = self.runs.read().await;
        let mut matched: Vec<TestRun> = runs
            .values()
            .filter(|r| r.project_id == project_id)
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        Ok(matched)
    }

    async fn update_run(&self, run: &TestRun) -> Result<()> {
        let mut runs = self.runs.write().await;
        if !runs.contains_key(&run.id) {
            return Err(Error::not_found(format!(
                "test run not found with id: {}",
                run.id
            )));
        }
        runs.insert(run.id, run.clone());
        Ok(())
    }
}

#[async_trait]
impl ExecutionStore for MemoryStore {
    async fn create_execution(&self, execution: &TestExecution) -> Result<()> {
        self.executions
            .write()
            .await
            .insert(execution.id, execution.clone());
        Ok(())
    }

    async fn update_execution(&self, execution: &TestExecution) -> Result<()> {
        let mut executions = self.executions.write().await;
        if !executions.contains_key(&execution.id) {
            return Err(Error::not_found(format!(
                "test execution not found with id: {}",
                execution.id
            )));
        }
        executions.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn list_executions(&self, run_id: i64) -> Result<Vec<TestExecution>> {
        let executions = self.executions.read().await;
        let mut matched: Vec<TestExecution> = executions
            .values()
            .filter(|e| e.run_id == run_id)
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.executed_at.cmp(&b.executed_at));
        Ok(matched)
    }
}
