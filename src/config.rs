use std::path::PathBuf;

/// Service configuration
///
/// Defaults match the documented design values; every field can be
/// overridden through a `SELRUN_*` environment variable or a CLI flag.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// HTTP listen port
    pub port: u16,

    /// Base directory for screenshot evidence
    pub evidence_dir: PathBuf,

    /// Test generation service endpoint
    pub generator_url: String,

    /// Timeout for one generation call (seconds)
    pub generation_timeout_secs: u64,

    /// Remote executor endpoint. When set, test cases are dispatched over
    /// HTTP and results arrive through the results callback; when unset,
    /// execution runs in-process.
    pub remote_executor_url: Option<String>,

    /// Timeout for a remote dispatch call (seconds)
    pub dispatch_timeout_secs: u64,

    /// Element resolution timeout (ms)
    pub element_wait_timeout_ms: u64,

    /// Settle delay after scrolling an element into view (ms)
    pub settle_delay_ms: u64,

    /// Page navigation timeout (ms)
    pub navigation_timeout_ms: u64,

    /// Run browsers headless
    pub headless: bool,

    /// Stop executing a case's remaining steps after the first failure.
    /// Default keeps executing to collect maximal evidence.
    pub abort_case_on_failure: bool,

    /// SQLite database path. When unset, records live in memory.
    pub sqlite_path: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            evidence_dir: PathBuf::from("./screenshots"),
            generator_url: "http://localhost:8000/api/generate".to_string(),
            generation_timeout_secs: 300,
            remote_executor_url: None,
            dispatch_timeout_secs: 30,
            element_wait_timeout_ms: 10_000,
            settle_delay_ms: 500,
            navigation_timeout_ms: 30_000,
            headless: true,
            abort_case_on_failure: false,
            sqlite_path: None,
        }
    }
}

impl ServiceConfig {
    /// Build a config from defaults plus `SELRUN_*` environment overrides
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("SELRUN_PORT") {
            if let Ok(port) = v.parse() {
                config.port = port;
            }
        }
        if let Ok(v) = std::env::var("SELRUN_EVIDENCE_DIR") {
            config.evidence_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("SELRUN_GENERATOR_URL") {
            config.generator_url = v;
        }
        if let Ok(v) = std::env::var("SELRUN_GENERATION_TIMEOUT_SECS") {
            if let Ok(secs) = v.parse() {
                config.generation_timeout_secs = secs;
            }
        }
        if let Ok(v) = std::env::var("SELRUN_EXECUTOR_URL") {
            if !v.is_empty() {
                config.remote_executor_url = Some(v);
            }
        }
        if let Ok(v) = std::env::var("SELRUN_HEADLESS") {
            config.headless = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("SELRUN_ABORT_ON_FAILURE") {
            config.abort_case_on_failure = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("SELRUN_SQLITE_PATH") {
            if !v.is_empty() {
                config.sqlite_path = Some(PathBuf::from(v));
            }
        }

        config
    }
}
