use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use selrun::browser::{BrowserConfig, PlaywrightFactory, SessionManager};
use selrun::config::ServiceConfig;
use selrun::engine::CaseRunner;
use selrun::evidence::EvidenceStore;
use selrun::generator::HttpTestGenerator;
use selrun::model::{BrowserKind, TestCase};
use selrun::orchestrator::{
    ExecutionDispatcher, InProcessDispatcher, Orchestrator, RemoteDispatcher,
};
use selrun::server::{self, AppState};
use selrun::store::{ExecutionStore, MemoryStore, RunStore, SqliteStore};

#[derive(Parser)]
#[command(name = "selrun")]
#[command(version = "0.1.0")]
#[command(about = "Browser test automation service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the orchestration API server
    Serve {
        /// HTTP listen port
        #[arg(short, long)]
        port: Option<u16>,

        /// Base directory for screenshot evidence
        #[arg(short, long)]
        evidence_dir: Option<PathBuf>,

        /// Test generation service endpoint
        #[arg(short, long)]
        generator_url: Option<String>,

        /// SQLite database path (in-memory store when omitted)
        #[arg(long)]
        sqlite: Option<PathBuf>,

        /// Run browsers with a visible window
        #[arg(long, default_value = "false")]
        headed: bool,
    },

    /// Execute a test case file against a URL-driven browser session
    Exec {
        /// Path to a YAML or JSON file of test cases
        path: PathBuf,

        /// Browser engine (chromium, firefox, webkit)
        #[arg(short, long, default_value = "chromium")]
        browser: String,

        /// Output directory for screenshot evidence
        #[arg(short, long, default_value = "./screenshots")]
        evidence_dir: PathBuf,

        /// Stop a case at its first failing step
        #[arg(long, default_value = "false")]
        abort_on_failure: bool,

        /// Run the browser with a visible window
        #[arg(long, default_value = "false")]
        headed: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            evidence_dir,
            generator_url,
            sqlite,
            headed,
        } => {
            let mut config = ServiceConfig::from_env();
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(dir) = evidence_dir {
                config.evidence_dir = dir;
            }
            if let Some(url) = generator_url {
                config.generator_url = url;
            }
            if let Some(path) = sqlite {
                config.sqlite_path = Some(path);
            }
            if headed {
                config.headless = false;
            }
            serve(config).await?;
        }

        Commands::Exec {
            path,
            browser,
            evidence_dir,
            abort_on_failure,
            headed,
        } => {
            let browser = BrowserKind::parse(&browser)
                .ok_or_else(|| anyhow::anyhow!("unknown browser: {}", browser))?;
            let passed = exec(&path, browser, &evidence_dir, abort_on_failure, headed).await?;
            if !passed {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

async fn serve(config: ServiceConfig) -> anyhow::Result<()> {
    let (runs, executions): (Arc<dyn RunStore>, Arc<dyn ExecutionStore>) =
        match &config.sqlite_path {
            Some(path) => {
                let store = Arc::new(SqliteStore::connect(path).await?);
                println!("💾 Using SQLite store: {}", path.display());
                (store.clone(), store)
            }
            None => {
                let store = Arc::new(MemoryStore::new());
                (store.clone(), store)
            }
        };

    let sessions = Arc::new(SessionManager::new(Arc::new(PlaywrightFactory::new(
        BrowserConfig {
            headless: config.headless,
            navigation_timeout_ms: config.navigation_timeout_ms,
            ..Default::default()
        },
    ))));

    let runner = Arc::new(CaseRunner::new(
        sessions.clone(),
        executions.clone(),
        Arc::new(EvidenceStore::new(config.evidence_dir.clone())),
        config.element_wait_timeout_ms,
        config.settle_delay_ms,
        config.abort_case_on_failure,
    ));

    let dispatcher: Arc<dyn ExecutionDispatcher> = match &config.remote_executor_url {
        Some(url) => {
            println!("🔗 Dispatching execution to: {}", url.cyan());
            Arc::new(RemoteDispatcher::new(
                url,
                Duration::from_secs(config.dispatch_timeout_secs),
            )?)
        }
        None => Arc::new(InProcessDispatcher::new(runner.clone())),
    };

    let generator = Arc::new(HttpTestGenerator::new(
        &config.generator_url,
        Duration::from_secs(config.generation_timeout_secs),
    )?);

    let orchestrator = Orchestrator::new(
        runs,
        executions,
        generator,
        dispatcher,
        Duration::from_secs(config.generation_timeout_secs),
    );

    server::serve(
        AppState {
            orchestrator,
            runner,
            sessions,
        },
        config.port,
    )
    .await
}

async fn exec(
    path: &PathBuf,
    browser: BrowserKind,
    evidence_dir: &PathBuf,
    abort_on_failure: bool,
    headed: bool,
) -> anyhow::Result<bool> {
    let cases = load_cases(path)?;
    if cases.is_empty() {
        anyhow::bail!("no test cases in {}", path.display());
    }

    println!(
        "{} Running {} test case(s) from: {}",
        "▶".green().bold(),
        cases.len(),
        path.display()
    );
    println!("  Browser: {}", browser.as_str().cyan());
    println!("  Evidence: {}", evidence_dir.display().to_string().cyan());

    let store = Arc::new(MemoryStore::new());
    let sessions = Arc::new(SessionManager::new(Arc::new(PlaywrightFactory::new(
        BrowserConfig {
            headless: !headed,
            ..Default::default()
        },
    ))));
    let defaults = ServiceConfig::default();
    let runner = CaseRunner::new(
        sessions,
        store.clone(),
        Arc::new(EvidenceStore::new(evidence_dir.clone())),
        defaults.element_wait_timeout_ms,
        defaults.settle_delay_ms,
        abort_on_failure,
    );

    // Ad-hoc runs get a synthetic run id; evidence lands under its directory
    let run_id = chrono::Utc::now().timestamp();
    let summary = runner.run(run_id, browser, &cases).await?;

    println!();
    for execution in store.list_executions(run_id).await? {
        match execution.error_message {
            None => println!("  {} {}", "✓".green(), execution.test_name),
            Some(error) => {
                println!("  {} {}", "✗".red(), execution.test_name.red());
                println!("    {}", error.red());
                if let Some(evidence) = execution.evidence_path {
                    println!("    evidence: {}", evidence.yellow());
                }
            }
        }
    }
    println!(
        "\n{} {} passed, {} failed",
        if summary.failed == 0 {
            "✅".to_string()
        } else {
            "❌".to_string()
        },
        summary.passed.to_string().green(),
        summary.failed.to_string().red()
    );

    Ok(summary.failed == 0)
}

/// Test cases load from YAML or JSON, either as a bare list or under a
/// top-level `tests` key.
fn load_cases(path: &PathBuf) -> anyhow::Result<Vec<TestCase>> {
    #[derive(serde::Deserialize)]
    struct CaseFile {
        tests: Vec<TestCase>,
    }

    let content = std::fs::read_to_string(path)?;
    let json = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let cases = if json {
        serde_json::from_str::<Vec<TestCase>>(&content)
            .or_else(|_| serde_json::from_str::<CaseFile>(&content).map(|f| f.tests))?
    } else {
        serde_yaml::from_str::<Vec<TestCase>>(&content)
            .or_else(|_| serde_yaml::from_str::<CaseFile>(&content).map(|f| f.tests))?
    };
    Ok(cases)
}
