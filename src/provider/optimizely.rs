//! REST client for the Optimizely Classic experiment API.

use super::AnalyticsProvider;
use crate::config::ProviderConfig;
use crate::models::{Experiment, Project, StatRecord};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// HTTP client for the analytics provider.
#[derive(Debug, Clone)]
pub struct OptimizelyClient {
    base_url: String,
    timeout_seconds: u64,
    http_client: reqwest::Client,
}

impl OptimizelyClient {
    /// Create a client from the `[provider]` config section.
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout_seconds: config.timeout_seconds,
            http_client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, token: &str, path: &str) -> Result<T> {
        let url = self.url(path);
        debug!("GET {}", url);

        let response = self
            .http_client
            .get(&url)
            .header("Token", token)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    anyhow::anyhow!("Request to {} timed out after {}s", url, self.timeout_seconds)
                } else if e.is_connect() {
                    anyhow::anyhow!("Cannot connect to analytics API at {}", self.base_url)
                } else {
                    anyhow::anyhow!("Failed to send request: {}", e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Analytics API error {}: {}", status, body));
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))
    }
}

impl AnalyticsProvider for OptimizelyClient {
    async fn list_projects(&self, token: &str) -> Result<Vec<Project>> {
        self.get_json(token, "projects/").await
    }

    async fn list_experiments(&self, token: &str, project_id: &str) -> Result<Vec<Experiment>> {
        self.get_json(token, &format!("projects/{}/experiments/", project_id))
            .await
    }

    async fn fetch_stats(&self, token: &str, experiment_id: &str) -> Result<Vec<StatRecord>> {
        self.get_json(token, &format!("experiments/{}/stats", experiment_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_without_double_slash() {
        let client = OptimizelyClient::new(&ProviderConfig {
            base_url: "https://api.example.com/v1/".to_string(),
            timeout_seconds: 5,
        })
        .unwrap();

        assert_eq!(
            client.url("projects/12/experiments/"),
            "https://api.example.com/v1/projects/12/experiments/"
        );
    }

    #[tokio::test]
    async fn test_connection_error_is_reported() {
        let client = OptimizelyClient::new(&ProviderConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_seconds: 2,
        })
        .unwrap();

        let result = client.list_projects("token").await;
        assert!(result.is_err());
    }
}
