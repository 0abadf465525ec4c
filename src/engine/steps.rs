//! Declarative step interpreter.
//!
//! Each `TestStep` is parsed into a closed `StepAction` and executed
//! against one browser session. Failures are data: every step produces a
//! `StepResult` and nothing thrown by a handler escapes the step boundary.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::browser::driver::{BrowserDriver, Locator};
use crate::evidence::EvidenceStore;
use crate::model::{StepResult, TestCase, TestStep};

/// Failure category tags recorded on StepResult
pub mod error_kind {
    pub const UNSUPPORTED_ACTION: &str = "unsupported_action";
    pub const INVALID_STEP: &str = "invalid_step";
    pub const RESOLVE_TIMEOUT: &str = "resolve_timeout";
    pub const ASSERTION_FAILED: &str = "assertion_failed";
    pub const DRIVER_ERROR: &str = "driver_error";
}

/// The closed action vocabulary. Parsing is case-insensitive; anything
/// outside the vocabulary surfaces as an explicit parse error rather than
/// a silent skip.
#[derive(Debug, Clone, PartialEq)]
pub enum StepAction {
    OpenUrl { url: String },
    Click { selector: String },
    Type { selector: String, value: String },
    Submit { selector: String },
    Wait { seconds: u64 },
    AssertText { selector: String, expected: String },
    AssertElementPresent { selector: String },
    Scroll { selector: String },
    SelectDropdown { selector: String, value: String },
    Clear { selector: String },
}

#[derive(Debug, Error, PartialEq)]
pub enum StepParseError {
    #[error("unsupported action: {0}")]
    Unsupported(String),
    #[error("action '{action}' requires field '{field}'")]
    MissingField { action: String, field: &'static str },
    #[error("invalid wait duration: '{0}' is not a whole number of seconds")]
    InvalidWait(String),
}

impl StepParseError {
    pub fn kind(&self) -> &'static str {
        match self {
            StepParseError::Unsupported(_) => error_kind::UNSUPPORTED_ACTION,
            StepParseError::MissingField { .. } | StepParseError::InvalidWait(_) => {
                error_kind::INVALID_STEP
            }
        }
    }
}

impl StepAction {
    pub fn from_step(step: &TestStep) -> Result<Self, StepParseError> {
        let action = step.action.to_lowercase();

        let selector = |field: &'static str| -> Result<String, StepParseError> {
            step.selector
                .clone()
                .filter(|s| !s.is_empty())
                .ok_or_else(|| StepParseError::MissingField {
                    action: action.clone(),
                    field,
                })
        };

        match action.as_str() {
            "open_url" => {
                let url = step.url.clone().filter(|u| !u.is_empty()).ok_or_else(|| {
                    StepParseError::MissingField {
                        action: action.clone(),
                        field: "url",
                    }
                })?;
                Ok(StepAction::OpenUrl { url })
            }
            "click" => Ok(StepAction::Click {
                selector: selector("selector")?,
            }),
            "type" => Ok(StepAction::Type {
                selector: selector("selector")?,
                value: step.value.clone().ok_or(StepParseError::MissingField {
                    action: action.clone(),
                    field: "value",
                })?,
            }),
            "submit" => Ok(StepAction::Submit {
                selector: selector("selector")?,
            }),
            "wait" => {
                let value = step.value.clone().ok_or(StepParseError::MissingField {
                    action: action.clone(),
                    field: "value",
                })?;
                let seconds = value
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| StepParseError::InvalidWait(value))?;
                Ok(StepAction::Wait { seconds })
            }
            "assert_text" => Ok(StepAction::AssertText {
                selector: selector("selector")?,
                expected: step
                    .expected_text
                    .clone()
                    .ok_or(StepParseError::MissingField {
                        action: action.clone(),
                        field: "expectedText",
                    })?,
            }),
            "assert_element_present" => Ok(StepAction::AssertElementPresent {
                selector: selector("selector")?,
            }),
            "scroll" => Ok(StepAction::Scroll {
                selector: selector("selector")?,
            }),
            "select_dropdown" => Ok(StepAction::SelectDropdown {
                selector: selector("selector")?,
                value: step.value.clone().ok_or(StepParseError::MissingField {
                    action: action.clone(),
                    field: "value",
                })?,
            }),
            "clear" => Ok(StepAction::Clear {
                selector: selector("selector")?,
            }),
            _ => Err(StepParseError::Unsupported(step.action.clone())),
        }
    }
}

/// A step failure caught at the step boundary
struct StepFailure {
    kind: &'static str,
    message: String,
}

impl StepFailure {
    fn driver(e: anyhow::Error) -> Self {
        Self {
            kind: error_kind::DRIVER_ERROR,
            message: e.to_string(),
        }
    }
}

/// Outcome of one executed test case
#[derive(Debug)]
pub struct CaseOutcome {
    pub results: Vec<StepResult>,
    pub passed: bool,
}

impl CaseOutcome {
    /// Message of the first failing step, if any
    pub fn first_failure(&self) -> Option<&StepResult> {
        self.results.iter().find(|r| !r.success)
    }

    /// Evidence path of the last failing step that has one
    pub fn failure_evidence(&self) -> Option<String> {
        self.results
            .iter()
            .rev()
            .filter(|r| !r.success)
            .find_map(|r| r.evidence_path.clone())
    }
}

/// Executes ordered steps against one browser session
pub struct StepExecutor {
    driver: Arc<dyn BrowserDriver>,
    evidence: Arc<EvidenceStore>,
    run_id: i64,
    wait_timeout_ms: u64,
    settle_delay_ms: u64,
    /// When true, a failing step ends the case early. Default is to keep
    /// executing the remaining steps for maximal evidence.
    abort_on_failure: bool,
}

impl StepExecutor {
    pub fn new(
        driver: Arc<dyn BrowserDriver>,
        evidence: Arc<EvidenceStore>,
        run_id: i64,
        wait_timeout_ms: u64,
        settle_delay_ms: u64,
        abort_on_failure: bool,
    ) -> Self {
        Self {
            driver,
            evidence,
            run_id,
            wait_timeout_ms,
            settle_delay_ms,
            abort_on_failure,
        }
    }

    /// Execute every step of a case in order.
    ///
    /// The case passes iff all of its steps succeeded.
    pub async fn execute_case(&self, case: &TestCase) -> CaseOutcome {
        log::info!(
            "executing test case '{}' ({} steps)",
            case.name,
            case.steps.len()
        );

        let mut results = Vec::with_capacity(case.steps.len());
        for step in &case.steps {
            let result = self.execute_step(step).await;
            let failed = !result.success;
            results.push(result);
            if failed && self.abort_on_failure {
                log::info!("aborting case '{}' after first step failure", case.name);
                break;
            }
        }

        // A case with no steps proves nothing and counts as failed
        let passed = !case.steps.is_empty()
            && results.len() == case.steps.len()
            && results.iter().all(|r| r.success);
        CaseOutcome { results, passed }
    }

    /// Execute one step. Never fails: handler errors are caught here and
    /// recorded on the returned StepResult.
    pub async fn execute_step(&self, step: &TestStep) -> StepResult {
        log::info!(
            "executing step: {} {}",
            step.action,
            step.selector.as_deref().unwrap_or("")
        );
        let start = Instant::now();

        let (success, message, kind, evidence_path) = match self.dispatch(step).await {
            Ok(()) => {
                let evidence = self
                    .evidence
                    .capture(self.driver.as_ref(), self.run_id, &step.action)
                    .await;
                (
                    true,
                    "step executed successfully".to_string(),
                    String::new(),
                    evidence,
                )
            }
            Err(failure) => {
                log::error!("step '{}' failed: {}", step.action, failure.message);
                // Secondary capture failure is already swallowed by the
                // evidence store; the step keeps its own failure.
                let evidence = self
                    .evidence
                    .capture(
                        self.driver.as_ref(),
                        self.run_id,
                        &format!("{}_ERROR", step.action),
                    )
                    .await;
                (false, failure.message, failure.kind.to_string(), evidence)
            }
        };

        StepResult {
            action: step.action.clone(),
            selector: step.selector.clone(),
            success,
            message,
            error_kind: kind,
            evidence_path: evidence_path.map(|p| p.display().to_string()),
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn dispatch(&self, step: &TestStep) -> Result<(), StepFailure> {
        let action = StepAction::from_step(step).map_err(|e| StepFailure {
            kind: e.kind(),
            message: e.to_string(),
        })?;

        match action {
            StepAction::OpenUrl { url } => {
                self.driver.goto(&url).await.map_err(StepFailure::driver)
            }
            StepAction::Click { selector } => {
                let locator = self.resolve(&selector).await?;
                self.settle(&locator).await?;
                self.driver.click(&locator).await.map_err(StepFailure::driver)
            }
            StepAction::Type { selector, value } => {
                let locator = self.resolve(&selector).await?;
                self.settle(&locator).await?;
                self.driver
                    .type_text(&locator, &value)
                    .await
                    .map_err(StepFailure::driver)
            }
            StepAction::Submit { selector } => {
                let locator = self.resolve(&selector).await?;
                self.driver.submit(&locator).await.map_err(StepFailure::driver)
            }
            StepAction::Wait { seconds } => {
                tokio::time::sleep(Duration::from_secs(seconds)).await;
                Ok(())
            }
            StepAction::AssertText { selector, expected } => {
                let locator = self.resolve(&selector).await?;
                let actual = self
                    .driver
                    .read_text(&locator)
                    .await
                    .map_err(StepFailure::driver)?;
                if actual.contains(&expected) {
                    Ok(())
                } else {
                    Err(StepFailure {
                        kind: error_kind::ASSERTION_FAILED,
                        message: format!(
                            "text mismatch. expected: '{}', actual: '{}'",
                            expected, actual
                        ),
                    })
                }
            }
            StepAction::AssertElementPresent { selector } => {
                // Resolution without throwing is the whole assertion
                self.resolve(&selector).await.map(|_| ())
            }
            StepAction::Scroll { selector } => {
                let locator = self.resolve(&selector).await?;
                self.settle(&locator).await
            }
            StepAction::SelectDropdown { selector, value } => {
                let locator = self.resolve(&selector).await?;
                self.driver
                    .select_by_label(&locator, &value)
                    .await
                    .map_err(StepFailure::driver)
            }
            StepAction::Clear { selector } => {
                let locator = self.resolve(&selector).await?;
                self.driver.clear(&locator).await.map_err(StepFailure::driver)
            }
        }
    }

    /// Block until the selector resolves; timeout is a step failure.
    async fn resolve(&self, selector: &str) -> Result<Locator, StepFailure> {
        let locator = Locator::parse(selector);
        self.driver
            .wait_for(&locator, self.wait_timeout_ms)
            .await
            .map_err(|e| StepFailure {
                kind: error_kind::RESOLVE_TIMEOUT,
                message: e.to_string(),
            })?;
        Ok(locator)
    }

    /// Scroll the element into view and give the page a moment to settle
    async fn settle(&self, locator: &Locator) -> Result<(), StepFailure> {
        self.driver
            .scroll_into_view(locator)
            .await
            .map_err(StepFailure::driver)?;
        tokio::time::sleep(Duration::from_millis(self.settle_delay_ms)).await;
        Ok(())
    }
}
