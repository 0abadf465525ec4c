pub mod browser;
pub mod config;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod generator;
pub mod model;
pub mod orchestrator;
pub mod server;
pub mod store;

// Re-export common items
pub use config::ServiceConfig;
pub use model::{RunStatus, TestCase, TestRun};
pub use orchestrator::Orchestrator;
