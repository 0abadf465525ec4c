//! Test run orchestration.
//!
//! `start_run` validates, persists a PENDING record, and spawns the
//! asynchronous workflow: generate test cases, dispatch them for execution,
//! finalize counters and terminal status. Workflow failures are absorbed
//! into the run record; callers only ever see validation and lookup errors.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;

use crate::engine::{CaseRunner, ExecutionSummary};
use crate::error::{Error, Result};
use crate::generator::TestGenerator;
use crate::model::{BrowserKind, RunStatus, TestCase, TestExecution, TestRun, TestType};
use crate::store::{ExecutionStore, RunStore};

/// How a dispatch call concluded
pub enum DispatchOutcome {
    /// Execution ran to completion and produced a summary
    Completed(ExecutionSummary),
    /// Execution was handed off; results arrive via the results callback
    Accepted,
}

/// Hands a generated batch to whatever executes it
#[async_trait]
pub trait ExecutionDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        run_id: i64,
        browser: BrowserKind,
        cases: &[TestCase],
    ) -> anyhow::Result<DispatchOutcome>;
}

/// Runs the batch on this process's own case runner
pub struct InProcessDispatcher {
    runner: Arc<CaseRunner>,
}

impl InProcessDispatcher {
    pub fn new(runner: Arc<CaseRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl ExecutionDispatcher for InProcessDispatcher {
    async fn dispatch(
        &self,
        run_id: i64,
        browser: BrowserKind,
        cases: &[TestCase],
    ) -> anyhow::Result<DispatchOutcome> {
        let summary = self.runner.run(run_id, browser, cases).await?;
        Ok(DispatchOutcome::Completed(summary))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DispatchRequest<'a> {
    test_run_id: i64,
    browser: &'a str,
    test_cases: &'a [TestCase],
}

/// Posts the batch to a remote executor service
pub struct RemoteDispatcher {
    client: reqwest::Client,
    endpoint: String,
}

impl RemoteDispatcher {
    pub fn new(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl ExecutionDispatcher for RemoteDispatcher {
    async fn dispatch(
        &self,
        run_id: i64,
        browser: BrowserKind,
        cases: &[TestCase],
    ) -> anyhow::Result<DispatchOutcome> {
        let request = DispatchRequest {
            test_run_id: run_id,
            browser: browser.as_str(),
            test_cases: cases,
        };
        self.client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;
        log::info!("dispatched {} test cases for run {}", cases.len(), run_id);
        Ok(DispatchOutcome::Accepted)
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    runs: Arc<dyn RunStore>,
    executions: Arc<dyn ExecutionStore>,
    generator: Arc<dyn TestGenerator>,
    dispatcher: Arc<dyn ExecutionDispatcher>,
    generation_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        runs: Arc<dyn RunStore>,
        executions: Arc<dyn ExecutionStore>,
        generator: Arc<dyn TestGenerator>,
        dispatcher: Arc<dyn ExecutionDispatcher>,
        generation_timeout: Duration,
    ) -> Self {
        Self {
            runs,
            executions,
            generator,
            dispatcher,
            generation_timeout,
        }
    }

    /// Validate the request, persist a PENDING run, and kick off the
    /// workflow in the background. Returns the PENDING snapshot.
    pub async fn start_run(
        &self,
        project_id: i64,
        url: &str,
        browser: Option<&str>,
        test_type: &str,
    ) -> Result<TestRun> {
        if url.trim().is_empty() {
            return Err(Error::validation("url must not be empty"));
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(Error::validation(format!("url must be absolute: {}", url)));
        }
        let browser = match browser {
            None => BrowserKind::default(),
            Some(s) => BrowserKind::parse(s)
                .ok_or_else(|| Error::validation(format!("unknown browser: {}", s)))?,
        };
        let test_type = TestType::parse(test_type)
            .ok_or_else(|| Error::validation(format!("unknown test type: {}", test_type)))?;

        let run = self.runs.create_run(project_id, url, browser, test_type).await?;
        log::info!(
            "created test run {} for project {} ({})",
            run.id,
            project_id,
            url
        );

        let orchestrator = self.clone();
        let snapshot = run.clone();
        tokio::spawn(async move {
            orchestrator.process_run(snapshot).await;
        });

        Ok(run)
    }

    pub async fn get_run(&self, id: i64) -> Result<TestRun> {
        self.runs.get_run(id).await
    }

    pub async fn list_runs(&self, project_id: i64) -> Result<Vec<TestRun>> {
        self.runs.list_runs(project_id).await
    }

    pub async fn list_executions(&self, run_id: i64) -> Result<Vec<TestExecution>> {
        // Surface NotFound for unknown runs rather than an empty list
        self.runs.get_run(run_id).await?;
        self.executions.list_executions(run_id).await
    }

    /// Request a stop. Only a RUNNING run moves to STOPPED; anything else
    /// is returned unchanged. In-flight browser work is not interrupted,
    /// but its late results will no longer change the record.
    pub async fn stop_run(&self, id: i64) -> Result<TestRun> {
        let mut run = self.runs.get_run(id).await?;
        if run.status != RunStatus::Running {
            log::info!("stop requested for run {} in status {}", id, run.status);
            return Ok(run);
        }
        run.status = RunStatus::Stopped;
        run.completed_at = Some(Utc::now());
        self.runs.update_run(&run).await?;
        log::info!("test run {} stopped", id);
        Ok(run)
    }

    /// Results callback used by a remote executor. Ignored once the run is
    /// terminal, so a stop always wins over late results.
    pub async fn report_results(&self, run_id: i64, passed: u32, failed: u32) -> Result<TestRun> {
        let mut run = self.runs.get_run(run_id).await?;
        if run.status.is_terminal() {
            log::warn!(
                "ignoring late results for run {} (already {})",
                run_id,
                run.status
            );
            return Ok(run);
        }
        run.passed_tests = passed;
        run.failed_tests = failed;
        run.status = if failed > 0 {
            RunStatus::Failed
        } else {
            RunStatus::Passed
        };
        run.completed_at = Some(Utc::now());
        self.runs.update_run(&run).await?;
        log::info!(
            "test run {} finished: {} ({} passed, {} failed)",
            run_id,
            run.status,
            passed,
            failed
        );
        Ok(run)
    }

    /// The asynchronous workflow body. Every failure ends in a terminal
    /// FAILED record; nothing escapes.
    async fn process_run(&self, mut run: TestRun) {
        run.status = RunStatus::Running;
        if let Err(e) = self.runs.update_run(&run).await {
            log::error!("failed to mark run {} running: {}", run.id, e);
            return;
        }

        let generated = tokio::time::timeout(
            self.generation_timeout,
            self.generator.generate(&run.url, run.browser, run.test_type),
        )
        .await;

        let cases = match generated {
            Err(_) => {
                self.mark_failed(
                    run.id,
                    format!(
                        "test generation timed out after {}s",
                        self.generation_timeout.as_secs()
                    ),
                )
                .await;
                return;
            }
            Ok(Err(e)) => {
                self.mark_failed(run.id, format!("test generation failed: {:#}", e))
                    .await;
                return;
            }
            Ok(Ok(cases)) => cases,
        };

        if cases.is_empty() {
            self.mark_failed(run.id, "no test cases generated".to_string())
                .await;
            return;
        }

        // Re-read before writing: a stop may have landed during generation,
        // and a stale snapshot must not resurrect a terminal run.
        let mut run = match self.runs.get_run(run.id).await {
            Ok(run) => run,
            Err(e) => {
                log::error!("failed to reload run {}: {}", run.id, e);
                return;
            }
        };
        if run.status != RunStatus::Running {
            log::info!(
                "run {} is {} after generation; skipping dispatch",
                run.id,
                run.status
            );
            return;
        }
        run.total_tests = cases.len() as u32;
        if let Err(e) = self.runs.update_run(&run).await {
            log::error!("failed to record total tests for run {}: {}", run.id, e);
        }

        match self.dispatcher.dispatch(run.id, run.browser, &cases).await {
            Ok(DispatchOutcome::Completed(summary)) => {
                if let Err(e) = self
                    .report_results(run.id, summary.passed, summary.failed)
                    .await
                {
                    log::error!("failed to finalize run {}: {}", run.id, e);
                }
            }
            Ok(DispatchOutcome::Accepted) => {
                log::info!("run {} awaiting results from remote executor", run.id);
            }
            Err(e) => {
                self.mark_failed(run.id, format!("execution dispatch failed: {:#}", e))
                    .await;
            }
        }
    }

    /// Move a run to FAILED with an error message, unless it is already
    /// terminal (a stop that raced the workflow stays STOPPED).
    async fn mark_failed(&self, run_id: i64, message: String) {
        log::error!("test run {} failed: {}", run_id, message);
        let mut run = match self.runs.get_run(run_id).await {
            Ok(run) => run,
            Err(e) => {
                log::error!("failed to load run {}: {}", run_id, e);
                return;
            }
        };
        if run.status.is_terminal() {
            return;
        }
        run.status = RunStatus::Failed;
        run.error_message = Some(message);
        run.completed_at = Some(Utc::now());
        if let Err(e) = self.runs.update_run(&run).await {
            log::error!("failed to persist failure for run {}: {}", run_id, e);
        }
    }
}
