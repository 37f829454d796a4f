//! Slack Web API client (`chat.postMessage`).

use super::{ChatDelivery, DeliveryReceipt, OutgoingMessage};
use crate::config::DeliveryConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Response envelope of the Slack Web API.
#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    ts: Option<String>,
}

/// HTTP client for posting chat messages.
#[derive(Debug, Clone)]
pub struct SlackClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl SlackClient {
    /// Create a client from the `[delivery]` config section.
    pub fn new(config: &DeliveryConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }
}

/// Form fields for `chat.postMessage`.
fn form_fields(message: &OutgoingMessage) -> Vec<(&'static str, &str)> {
    let mut fields = vec![
        ("channel", message.channel.as_str()),
        ("text", message.text.as_str()),
        ("username", message.username.as_str()),
        ("as_user", "false"),
    ];

    if let Some(ref icon) = message.icon_emoji {
        fields.push(("icon_emoji", icon.as_str()));
    }
    if let Some(ref attachments) = message.attachments {
        fields.push(("attachments", attachments.as_str()));
    }

    fields
}

fn into_receipt(response: PostMessageResponse, channel: &str) -> Result<DeliveryReceipt> {
    if !response.ok {
        return Err(anyhow::anyhow!(
            "Slack rejected message to {}: {}",
            channel,
            response.error.as_deref().unwrap_or("unknown error")
        ));
    }

    Ok(DeliveryReceipt {
        channel: response.channel.unwrap_or_else(|| channel.to_string()),
        timestamp: response.ts,
    })
}

impl ChatDelivery for SlackClient {
    async fn post_message(&self, token: &str, message: &OutgoingMessage) -> Result<DeliveryReceipt> {
        let url = format!("{}/chat.postMessage", self.base_url);
        debug!("Posting message to {}", message.channel);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(token)
            .form(&form_fields(message))
            .send()
            .await
            .with_context(|| format!("Failed to send message to {}", message.channel))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Slack API error {}: {}", status, body));
        }

        let body: PostMessageResponse = response
            .json()
            .await
            .context("Failed to parse Slack response")?;

        into_receipt(body, &message.channel)
    }
}
