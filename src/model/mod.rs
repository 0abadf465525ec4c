//! Core domain types for test runs, test cases, and step results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a test run
///
/// Transitions are monotonic: `Pending -> Running -> {Passed, Failed,
/// Stopped}`. The three terminal states absorb all further transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Pending,
    Running,
    Passed,
    Failed,
    Stopped,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Passed | RunStatus::Failed | RunStatus::Stopped)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Pending => "PENDING",
            RunStatus::Running => "RUNNING",
            RunStatus::Passed => "PASSED",
            RunStatus::Failed => "FAILED",
            RunStatus::Stopped => "STOPPED",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(RunStatus::Pending),
            "RUNNING" => Ok(RunStatus::Running),
            "PASSED" => Ok(RunStatus::Passed),
            "FAILED" => Ok(RunStatus::Failed),
            "STOPPED" => Ok(RunStatus::Stopped),
            other => Err(format!("unknown run status: {}", other)),
        }
    }
}

/// Status of a single executed test case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Passed,
    Failed,
    Skipped,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Passed | ExecutionStatus::Failed | ExecutionStatus::Skipped
        )
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionStatus::Pending => "PENDING",
            ExecutionStatus::Running => "RUNNING",
            ExecutionStatus::Passed => "PASSED",
            ExecutionStatus::Failed => "FAILED",
            ExecutionStatus::Skipped => "SKIPPED",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ExecutionStatus::Pending),
            "RUNNING" => Ok(ExecutionStatus::Running),
            "PASSED" => Ok(ExecutionStatus::Passed),
            "FAILED" => Ok(ExecutionStatus::Failed),
            "SKIPPED" => Ok(ExecutionStatus::Skipped),
            other => Err(format!("unknown execution status: {}", other)),
        }
    }
}

/// Browser engine used for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserKind {
    /// Strict parse used at run start. Accepts the Chromium-family aliases
    /// `chrome` and `edge`; anything else is a validation failure.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "chromium" | "chrome" | "edge" => Some(BrowserKind::Chromium),
            "firefox" => Some(BrowserKind::Firefox),
            "webkit" => Some(BrowserKind::Webkit),
            _ => None,
        }
    }

    /// Lenient parse used at the execution boundary: unknown kinds fall
    /// back to Chromium with a warning, never an error.
    pub fn parse_or_default(s: &str) -> Self {
        BrowserKind::parse(s).unwrap_or_else(|| {
            log::warn!("unknown browser '{}', defaulting to chromium", s);
            BrowserKind::Chromium
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserKind::Chromium => "chromium",
            BrowserKind::Firefox => "firefox",
            BrowserKind::Webkit => "webkit",
        }
    }
}

/// Category of tests requested from the generation collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestType {
    Functional,
    Smoke,
    Regression,
    Accessibility,
}

impl TestType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "functional" => Some(TestType::Functional),
            "smoke" => Some(TestType::Smoke),
            "regression" => Some(TestType::Regression),
            "accessibility" => Some(TestType::Accessibility),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TestType::Functional => "functional",
            TestType::Smoke => "smoke",
            TestType::Regression => "regression",
            TestType::Accessibility => "accessibility",
        }
    }
}

/// One end-to-end automation request. Append-only audit record: runs are
/// created once, mutated by the orchestrator at each workflow stage, and
/// never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRun {
    pub id: i64,
    pub project_id: i64,
    pub url: String,
    pub browser: BrowserKind,
    pub test_type: TestType,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_tests: u32,
    pub passed_tests: u32,
    pub failed_tests: u32,
    pub error_message: Option<String>,
}

/// One row per test case actually run, linked to a TestRun by id only so
/// the executing component can live out-of-process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestExecution {
    pub id: Uuid,
    pub run_id: i64,
    pub test_name: String,
    pub test_description: Option<String>,
    pub status: ExecutionStatus,
    pub error_message: Option<String>,
    pub evidence_path: Option<String>,
    pub duration_ms: Option<u64>,
    pub executed_at: DateTime<Utc>,
}

impl TestExecution {
    pub fn new(run_id: i64, test_name: &str, test_description: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id,
            test_name: test_name.to_string(),
            test_description,
            status: ExecutionStatus::Pending,
            error_message: None,
            evidence_path: None,
            duration_ms: None,
            executed_at: Utc::now(),
        }
    }

    pub fn mark_passed(&mut self, duration_ms: u64) {
        self.status = ExecutionStatus::Passed;
        self.duration_ms = Some(duration_ms);
    }

    pub fn mark_failed(
        &mut self,
        error: String,
        evidence_path: Option<String>,
        duration_ms: u64,
    ) {
        self.status = ExecutionStatus::Failed;
        self.error_message = Some(error);
        self.evidence_path = evidence_path;
        self.duration_ms = Some(duration_ms);
    }
}

/// A named, ordered sequence of steps. Immutable once received.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub steps: Vec<TestStep>,
}

/// A single declarative browser action. Not every field is meaningful for
/// every action; unused fields are ignored, never rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestStep {
    pub action: String,
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub expected_text: Option<String>,
}

/// Outcome of one executed step. Produced exactly once per step, immutable
/// after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub action: String,
    pub selector: Option<String>,
    pub success: bool,
    pub message: String,
    /// Failure category tag; empty on success
    pub error_kind: String,
    pub evidence_path: Option<String>,
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_run_statuses() {
        assert!(!RunStatus::Pending.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Passed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Stopped.is_terminal());
    }

    #[test]
    fn run_status_round_trips_through_strings() {
        for status in [
            RunStatus::Pending,
            RunStatus::Running,
            RunStatus::Passed,
            RunStatus::Failed,
            RunStatus::Stopped,
        ] {
            let parsed: RunStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn browser_parse_accepts_chromium_aliases() {
        assert_eq!(BrowserKind::parse("chrome"), Some(BrowserKind::Chromium));
        assert_eq!(BrowserKind::parse("edge"), Some(BrowserKind::Chromium));
        assert_eq!(BrowserKind::parse("Firefox"), Some(BrowserKind::Firefox));
        assert_eq!(BrowserKind::parse("safari"), None);
    }

    #[test]
    fn lenient_browser_parse_falls_back_to_chromium() {
        assert_eq!(BrowserKind::parse_or_default("netscape"), BrowserKind::Chromium);
    }

    #[test]
    fn test_type_rejects_unknown_values() {
        assert_eq!(TestType::parse("smoke"), Some(TestType::Smoke));
        assert_eq!(TestType::parse("chaos"), None);
    }

    #[test]
    fn step_deserializes_with_missing_fields() {
        let step: TestStep = serde_json::from_str(r##"{"action": "open_url", "url": "https://example.com"}"##).unwrap();
        assert_eq!(step.action, "open_url");
        assert!(step.selector.is_none());
        assert!(step.expected_text.is_none());
    }

    #[test]
    fn case_deserializes_camel_case_expected_text() {
        let json = r##"{"name": "login", "steps": [{"action": "assert_text", "selector": "#msg", "expectedText": "Welcome"}]}"##;
        let case: TestCase = serde_json::from_str(json).unwrap();
        assert_eq!(case.steps[0].expected_text.as_deref(), Some("Welcome"));
    }
}
