//! Drives a batch of test cases through one browser session, persisting a
//! TestExecution record per case as it moves through its lifecycle.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};

use super::steps::StepExecutor;
use crate::browser::SessionManager;
use crate::evidence::EvidenceStore;
use crate::model::{BrowserKind, ExecutionStatus, TestCase, TestExecution};
use crate::store::ExecutionStore;

/// Aggregate result of one batch, reported back to the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub passed: u32,
    pub failed: u32,
}

pub struct CaseRunner {
    sessions: Arc<SessionManager>,
    executions: Arc<dyn ExecutionStore>,
    evidence: Arc<EvidenceStore>,
    wait_timeout_ms: u64,
    settle_delay_ms: u64,
    abort_case_on_failure: bool,
}

impl CaseRunner {
    pub fn new(
        sessions: Arc<SessionManager>,
        executions: Arc<dyn ExecutionStore>,
        evidence: Arc<EvidenceStore>,
        wait_timeout_ms: u64,
        settle_delay_ms: u64,
        abort_case_on_failure: bool,
    ) -> Self {
        Self {
            sessions,
            executions,
            evidence,
            wait_timeout_ms,
            settle_delay_ms,
            abort_case_on_failure,
        }
    }

    /// Run every case against a single session for `run_id`.
    ///
    /// Session acquisition failure aborts the whole batch; anything after
    /// that is absorbed into per-case FAILED records. The session is
    /// released on every exit path.
    pub async fn run(
        &self,
        run_id: i64,
        browser: BrowserKind,
        cases: &[TestCase],
    ) -> Result<ExecutionSummary> {
        let driver = self
            .sessions
            .acquire(run_id, browser)
            .await
            .with_context(|| format!("failed to acquire browser session for run {}", run_id))?;

        let executor = StepExecutor::new(
            driver,
            self.evidence.clone(),
            run_id,
            self.wait_timeout_ms,
            self.settle_delay_ms,
            self.abort_case_on_failure,
        );

        let mut summary = ExecutionSummary { passed: 0, failed: 0 };
        for case in cases {
            match self.run_case(&executor, run_id, case).await {
                ExecutionStatus::Passed => summary.passed += 1,
                _ => summary.failed += 1,
            }
        }

        self.sessions.release(run_id).await;
        log::info!(
            "test run {} batch complete: {} passed, {} failed",
            run_id,
            summary.passed,
            summary.failed
        );
        Ok(summary)
    }

    async fn run_case(
        &self,
        executor: &StepExecutor,
        run_id: i64,
        case: &TestCase,
    ) -> ExecutionStatus {
        let mut execution = TestExecution::new(run_id, &case.name, case.description.clone());
        if let Err(e) = self.executions.create_execution(&execution).await {
            log::error!("failed to record execution for '{}': {}", case.name, e);
        }

        execution.status = ExecutionStatus::Running;
        if let Err(e) = self.executions.update_execution(&execution).await {
            log::error!("failed to update execution for '{}': {}", case.name, e);
        }

        let start = Instant::now();
        let outcome = executor.execute_case(case).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        if outcome.passed {
            execution.mark_passed(duration_ms);
        } else {
            let message = outcome
                .first_failure()
                .map(|r| format!("{}: {}", r.action, r.message))
                .unwrap_or_else(|| "no steps executed".to_string());
            execution.mark_failed(message, outcome.failure_evidence(), duration_ms);
        }

        if let Err(e) = self.executions.update_execution(&execution).await {
            log::error!("failed to finalize execution for '{}': {}", case.name, e);
        }
        execution.status
    }
}
