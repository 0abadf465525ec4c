//! Live browser session lifecycle, keyed by run id.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex;

use super::driver::{BrowserDriver, DriverFactory};
use crate::model::BrowserKind;

/// Owns every live browser session. At most one session exists per run id;
/// `acquire` is idempotent under concurrent calls for the same id.
pub struct SessionManager {
    factory: Arc<dyn DriverFactory>,
    sessions: Mutex<HashMap<i64, Arc<dyn BrowserDriver>>>,
}

impl SessionManager {
    pub fn new(factory: Arc<dyn DriverFactory>) -> Self {
        Self {
            factory,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Return the live session for `run_id`, creating one if needed.
    ///
    /// The map lock is held across creation so two concurrent acquires for
    /// the same run never race into duplicate sessions.
    pub async fn acquire(
        &self,
        run_id: i64,
        kind: BrowserKind,
    ) -> Result<Arc<dyn BrowserDriver>> {
        let mut sessions = self.sessions.lock().await;
        if let Some(driver) = sessions.get(&run_id) {
            return Ok(driver.clone());
        }

        let driver = self.factory.create(kind).await?;
        log::info!("created {} session for test run {}", kind.as_str(), run_id);
        sessions.insert(run_id, driver.clone());
        Ok(driver)
    }

    /// Close and remove the session for `run_id` if present. Close errors
    /// are logged and swallowed; teardown never raises.
    pub async fn release(&self, run_id: i64) {
        let removed = self.sessions.lock().await.remove(&run_id);
        if let Some(driver) = removed {
            if let Err(e) = driver.close().await {
                log::error!("error closing session for test run {}: {}", run_id, e);
            } else {
                log::info!("closed session for test run {}", run_id);
            }
        }
    }

    /// Close every live session; used during process shutdown.
    pub async fn release_all(&self) {
        let drained: Vec<(i64, Arc<dyn BrowserDriver>)> =
            self.sessions.lock().await.drain().collect();
        log::info!("closing all active sessions: {}", drained.len());
        for (run_id, driver) in drained {
            if let Err(e) = driver.close().await {
                log::error!("error closing session for test run {}: {}", run_id, e);
            }
        }
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}
