//! Screenshot evidence storage.
//!
//! Artifacts land under `<base>/test-run-<runId>/<label>_<timestamp>.png`.
//! Capture is best-effort: any failure returns None and is logged, never
//! raised into the step that asked for it.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::Result;
use chrono::Utc;
use regex::Regex;

use crate::browser::driver::BrowserDriver;

fn label_sanitizer() -> &'static Regex {
    static SANITIZER: OnceLock<Regex> = OnceLock::new();
    SANITIZER.get_or_init(|| Regex::new("[^A-Za-z0-9]").expect("static regex"))
}

/// Replace everything outside `[A-Za-z0-9]` with underscores
pub fn sanitize_label(label: &str) -> String {
    label_sanitizer().replace_all(label, "_").into_owned()
}

pub struct EvidenceStore {
    base_dir: PathBuf,
}

impl EvidenceStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn run_dir(&self, run_id: i64) -> PathBuf {
        self.base_dir.join(format!("test-run-{}", run_id))
    }

    /// Capture a screenshot from the session and store it under the run's
    /// directory. Returns the stored path, or None on any failure.
    pub async fn capture(
        &self,
        driver: &dyn BrowserDriver,
        run_id: i64,
        label: &str,
    ) -> Option<PathBuf> {
        match self.try_capture(driver, run_id, label).await {
            Ok(path) => {
                log::debug!("screenshot captured: {}", path.display());
                Some(path)
            }
            Err(e) => {
                log::error!("failed to capture screenshot '{}': {}", label, e);
                None
            }
        }
    }

    async fn try_capture(
        &self,
        driver: &dyn BrowserDriver,
        run_id: i64,
        label: &str,
    ) -> Result<PathBuf> {
        let dir = self.run_dir(run_id);
        std::fs::create_dir_all(&dir)?;

        // Millisecond timestamp keeps rapid repeated captures unique
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S_%3f");
        let filename = format!("{}_{}.png", sanitize_label(label), timestamp);
        let path = dir.join(filename);

        let bytes = driver.screenshot().await?;
        std::fs::write(&path, bytes)?;
        Ok(path)
    }

    /// Read a stored artifact back as bytes
    pub fn read(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(std::fs::read(path)?)
    }

    /// Remove the run's evidence directory; best-effort.
    pub fn delete_run_evidence(&self, run_id: i64) {
        let dir = self.run_dir(run_id);
        if dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                log::error!("failed to delete evidence for test run {}: {}", run_id, e);
            } else {
                log::info!("deleted evidence for test run {}", run_id);
            }
        }
    }
}
