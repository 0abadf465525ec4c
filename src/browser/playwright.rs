//! Playwright-backed browser driver.

use anyhow::{Context, Result};
use async_trait::async_trait;
use playwright::api::{Browser, BrowserContext, Page, ScreenshotType, Viewport};
use playwright::Playwright;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::driver::{BrowserDriver, DriverFactory, Locator};
use crate::model::BrowserKind;

/// Launch options shared by every session
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub headless: bool,
    pub navigation_timeout_ms: u64,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            navigation_timeout_ms: 30_000,
            viewport_width: 1280,
            viewport_height: 720,
        }
    }
}

pub struct PlaywrightDriver {
    #[allow(dead_code)]
    playwright: Arc<Playwright>,
    #[allow(dead_code)]
    browser: Arc<Browser>,
    #[allow(dead_code)]
    context: Arc<BrowserContext>,
    page: Arc<Mutex<Page>>,
    kind: BrowserKind,
    config: BrowserConfig,
}

impl PlaywrightDriver {
    pub async fn launch(kind: BrowserKind, config: BrowserConfig) -> Result<Self> {
        let playwright = Playwright::initialize()
            .await
            .context("Failed to initialize Playwright")?;

        let browser = match kind {
            BrowserKind::Chromium => {
                playwright
                    .chromium()
                    .launcher()
                    .headless(config.headless)
                    .launch()
                    .await
                    .context("Failed to launch Chromium")?
            }
            BrowserKind::Firefox => {
                playwright
                    .firefox()
                    .launcher()
                    .headless(config.headless)
                    .launch()
                    .await
                    .context("Failed to launch Firefox")?
            }
            BrowserKind::Webkit => {
                playwright
                    .webkit()
                    .launcher()
                    .headless(config.headless)
                    .launch()
                    .await
                    .context("Failed to launch Webkit")?
            }
        };

        let context = browser.context_builder().build().await?;
        let page = context.new_page().await?;

        page.set_viewport_size(Viewport {
            width: config.viewport_width as i32,
            height: config.viewport_height as i32,
        })
        .await?;

        Ok(Self {
            playwright: Arc::new(playwright),
            browser: Arc::new(browser),
            context: Arc::new(context),
            page: Arc::new(Mutex::new(page)),
            kind,
            config,
        })
    }
}

#[async_trait]
impl BrowserDriver for PlaywrightDriver {
    fn kind(&self) -> BrowserKind {
        self.kind
    }

    async fn goto(&self, url: &str) -> Result<()> {
        let page = self.page.lock().await;
        page.goto_builder(url)
            .timeout(self.config.navigation_timeout_ms as f64)
            .goto()
            .await
            .context("Failed to navigate to URL")?;
        Ok(())
    }

    async fn wait_for(&self, locator: &Locator, timeout_ms: u64) -> Result<()> {
        let page = self.page.lock().await;
        let sel = locator.as_playwright();
        page.wait_for_selector_builder(&sel)
            .timeout(timeout_ms as f64)
            .wait_for_selector()
            .await
            .map_err(|_| {
                anyhow::anyhow!("element not resolved within {}ms: {}", timeout_ms, locator)
            })?;
        Ok(())
    }

    async fn click(&self, locator: &Locator) -> Result<()> {
        let page = self.page.lock().await;
        let sel = locator.as_playwright();
        page.click_builder(&sel)
            .click()
            .await
            .with_context(|| format!("Failed to click: {}", locator))?;
        Ok(())
    }

    async fn type_text(&self, locator: &Locator, text: &str) -> Result<()> {
        let page = self.page.lock().await;
        let sel = locator.as_playwright();
        let element = page
            .query_selector(&sel)
            .await?
            .with_context(|| format!("element not found: {}", locator))?;

        // fill("") clears the field and leaves it focused; the keyboard
        // then delivers the value as real keystrokes
        element.fill_builder("").fill().await?;
        page.keyboard.input_text(text).await?;
        Ok(())
    }

    async fn submit(&self, locator: &Locator) -> Result<()> {
        let page = self.page.lock().await;
        let sel = locator.as_playwright();
        let js = "el => { \
            const form = el.form || el.closest('form'); \
            if (!form) { throw new Error('no enclosing form'); } \
            form.submit(); \
        }";
        let _: () = page
            .evaluate_on_selector(&sel, js, None::<String>)
            .await
            .with_context(|| format!("Failed to submit form for: {}", locator))?;
        Ok(())
    }

    async fn clear(&self, locator: &Locator) -> Result<()> {
        let page = self.page.lock().await;
        let sel = locator.as_playwright();
        let element = page
            .query_selector(&sel)
            .await?
            .with_context(|| format!("element not found: {}", locator))?;
        element.fill_builder("").fill().await?;
        Ok(())
    }

    async fn read_text(&self, locator: &Locator) -> Result<String> {
        let page = self.page.lock().await;
        let sel = locator.as_playwright();
        let js = "el => el.value || el.innerText || el.textContent || ''";
        let text: String = page
            .evaluate_on_selector(&sel, js, None::<String>)
            .await
            .with_context(|| format!("Failed to read text from: {}", locator))?;
        Ok(text)
    }

    async fn select_by_label(&self, locator: &Locator, label: &str) -> Result<()> {
        let page = self.page.lock().await;
        let sel = locator.as_playwright();
        let js = "(el, label) => { \
            const options = Array.from(el.options || []); \
            for (const option of options) { \
                if (option.label === label || option.text === label) { \
                    el.value = option.value; \
                    el.dispatchEvent(new Event('input', { bubbles: true })); \
                    el.dispatchEvent(new Event('change', { bubbles: true })); \
                    return true; \
                } \
            } \
            return false; \
        }";
        let matched: bool = page
            .evaluate_on_selector(&sel, js, Some(label.to_string()))
            .await
            .with_context(|| format!("Failed to select option on: {}", locator))?;
        if !matched {
            anyhow::bail!("no option with label '{}' in: {}", label, locator);
        }
        Ok(())
    }

    async fn scroll_into_view(&self, locator: &Locator) -> Result<()> {
        let page = self.page.lock().await;
        let sel = locator.as_playwright();
        let element = page
            .query_selector(&sel)
            .await?
            .with_context(|| format!("element not found: {}", locator))?;
        element.scroll_into_view_if_needed(None).await?;
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        let page = self.page.lock().await;
        let bytes = page
            .screenshot_builder()
            .r#type(ScreenshotType::Png)
            .screenshot()
            .await?;
        Ok(bytes)
    }

    async fn close(&self) -> Result<()> {
        // Parking the page releases the target; the browser process itself
        // goes down when the last Arc drops.
        let page = self.page.lock().await;
        page.goto_builder("about:blank").goto().await?;
        Ok(())
    }
}

/// Production driver factory
pub struct PlaywrightFactory {
    config: BrowserConfig,
}

impl PlaywrightFactory {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl DriverFactory for PlaywrightFactory {
    async fn create(&self, kind: BrowserKind) -> Result<Arc<dyn BrowserDriver>> {
        let driver = PlaywrightDriver::launch(kind, self.config.clone()).await?;
        Ok(Arc::new(driver))
    }
}
