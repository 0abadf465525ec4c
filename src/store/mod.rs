//! Persistence interfaces for run and execution records.
//!
//! The orchestrator only ever talks to these traits; the default backing
//! store is in-memory, with a SQLite implementation selectable by config.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{BrowserKind, TestExecution, TestRun, TestType};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Create/read/update access to TestRun records
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Insert a new PENDING run with zero counters and assign its id
    async fn create_run(
        &self,
        project_id: i64,
        url: &str,
        browser: BrowserKind,
        test_type: TestType,
    ) -> Result<TestRun>;

    async fn get_run(&self, id: i64) -> Result<TestRun>;

    /// Runs for a project, most-recently-started first
    async fn list_runs(&self, project_id: i64) -> Result<Vec<TestRun>>;

    async fn update_run(&self, run: &TestRun) -> Result<()>;
}

/// Create/read/update access to per-case TestExecution records
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn create_execution(&self, execution: &TestExecution) -> Result<()>;

    async fn update_execution(&self, execution: &TestExecution) -> Result<()>;

    /// Executions for a run, in creation order
    async fn list_executions(&self, run_id: i64) -> Result<Vec<TestExecution>>;
}
