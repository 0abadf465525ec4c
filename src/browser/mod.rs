pub mod driver;
pub mod playwright;
pub mod session;

pub use driver::{BrowserDriver, DriverFactory, Locator};
pub use playwright::{BrowserConfig, PlaywrightFactory};
pub use session::SessionManager;
