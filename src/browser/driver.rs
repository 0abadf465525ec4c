//! Browser capability surface used by the step execution engine.
//!
//! The engine never touches Playwright directly; it speaks to this trait so
//! tests can substitute a scripted driver.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::model::BrowserKind;

/// Element locator, classified from the raw selector string.
///
/// A selector is treated as XPath when it starts with `//` or `(`;
/// everything else is a CSS selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Css(String),
    XPath(String),
}

impl Locator {
    pub fn parse(selector: &str) -> Self {
        if selector.starts_with("//") || selector.starts_with('(') {
            Locator::XPath(selector.to_string())
        } else {
            Locator::Css(selector.to_string())
        }
    }

    /// Playwright selector string for this locator
    pub fn as_playwright(&self) -> String {
        match self {
            Locator::Css(css) => css.clone(),
            Locator::XPath(xpath) => format!("xpath={}", xpath),
        }
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Locator::Css(s) | Locator::XPath(s) => f.write_str(s),
        }
    }
}

/// One live browser automation session
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    fn kind(&self) -> BrowserKind;

    /// Navigate the session to a URL
    async fn goto(&self, url: &str) -> Result<()>;

    /// Block until the element is present, up to `timeout_ms`. Timing out
    /// is an error; this is the resolution step every element action runs
    /// through first.
    async fn wait_for(&self, locator: &Locator, timeout_ms: u64) -> Result<()>;

    async fn click(&self, locator: &Locator) -> Result<()>;

    /// Clear existing content and send `text` as keystrokes
    async fn type_text(&self, locator: &Locator, text: &str) -> Result<()>;

    /// Submit the element's enclosing form
    async fn submit(&self, locator: &Locator) -> Result<()>;

    async fn clear(&self, locator: &Locator) -> Result<()>;

    /// Text content of the element (value for inputs)
    async fn read_text(&self, locator: &Locator) -> Result<String>;

    /// Choose a dropdown option by visible label. Err when no option
    /// carries that label.
    async fn select_by_label(&self, locator: &Locator, label: &str) -> Result<()>;

    async fn scroll_into_view(&self, locator: &Locator) -> Result<()>;

    /// Capture the current viewport as PNG bytes
    async fn screenshot(&self) -> Result<Vec<u8>>;

    /// Tear the session down. Implementations must make this best-effort.
    async fn close(&self) -> Result<()>;
}

/// Creates driver instances; the session manager owns one of these.
/// Production wires in the Playwright factory, tests a scripted one.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn create(&self, kind: BrowserKind) -> Result<Arc<dyn BrowserDriver>>;
}
