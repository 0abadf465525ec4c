//! Client for the external test-generation collaborator.
//!
//! The collaborator turns a target URL into declarative test cases. Only
//! the wire contract lives here; how tests are produced is its business.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::model::{BrowserKind, TestCase, TestType};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub url: String,
    pub context: GenerationContext,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationContext {
    pub browser: String,
    pub test_type: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResponse {
    #[serde(default)]
    pub tests: Vec<TestCase>,
}

/// Produces test cases for a URL. Implemented over HTTP in production and
/// stubbed in tests.
#[async_trait]
pub trait TestGenerator: Send + Sync {
    async fn generate(
        &self,
        url: &str,
        browser: BrowserKind,
        test_type: TestType,
    ) -> anyhow::Result<Vec<TestCase>>;
}

/// HTTP client for the generation service
pub struct HttpTestGenerator {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTestGenerator {
    pub fn new(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl TestGenerator for HttpTestGenerator {
    async fn generate(
        &self,
        url: &str,
        browser: BrowserKind,
        test_type: TestType,
    ) -> anyhow::Result<Vec<TestCase>> {
        let request = GenerationRequest {
            url: url.to_string(),
            context: GenerationContext {
                browser: browser.as_str().to_string(),
                test_type: test_type.as_str().to_string(),
            },
        };

        log::info!(
            "requesting test generation for {} (browser={}, type={})",
            url,
            browser.as_str(),
            test_type.as_str()
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let body: GenerationResponse = response.json().await?;
        log::info!("generation service returned {} test cases", body.tests.len());
        Ok(body.tests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_to_contract_shape() {
        let request = GenerationRequest {
            url: "https://example.com".to_string(),
            context: GenerationContext {
                browser: "chromium".to_string(),
                test_type: "smoke".to_string(),
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["url"], "https://example.com");
        assert_eq!(json["context"]["browser"], "chromium");
        assert_eq!(json["context"]["testType"], "smoke");
    }

    #[test]
    fn response_tolerates_absent_tests_field() {
        let body: GenerationResponse = serde_json::from_str("{}").unwrap();
        assert!(body.tests.is_empty());
    }

    #[test]
    fn response_parses_full_case() {
        let json = r##"{
            "tests": [{
                "name": "login",
                "description": "logs in",
                "steps": [
                    {"action": "open_url", "url": "https://example.com"},
                    {"action": "type", "selector": "#user", "value": "alice"},
                    {"action": "assert_text", "selector": "#greeting", "expectedText": "Hello"}
                ]
            }]
        }"##;
        let body: GenerationResponse = serde_json::from_str(json).unwrap();
        assert_eq!(body.tests.len(), 1);
        assert_eq!(body.tests[0].steps.len(), 3);
        assert_eq!(body.tests[0].steps[2].expected_text.as_deref(), Some("Hello"));
    }
}
