//! Chat message delivery.
//!
//! The pipeline posts through [`ChatDelivery`]. [`SlackClient`] talks to the
//! chat service; [`StdoutDelivery`] prints messages for dry runs.

pub mod slack;

pub use slack::SlackClient;

use anyhow::Result;
use std::future::Future;
use std::io::Write;

/// A message ready to be posted to a channel.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub channel: String,
    /// Poster display name.
    pub username: String,
    pub icon_emoji: Option<String>,
    pub text: String,
    /// Serialized JSON attachments array.
    pub attachments: Option<String>,
}

/// Acknowledgment returned by the chat service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub channel: String,
    /// Service-assigned message timestamp, if any.
    pub timestamp: Option<String>,
}

/// Posts messages to a chat service. The token is passed on every call.
pub trait ChatDelivery {
    fn post_message(
        &self,
        token: &str,
        message: &OutgoingMessage,
    ) -> impl Future<Output = Result<DeliveryReceipt>> + Send;
}

/// Writes messages to stdout instead of posting them.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutDelivery;

impl ChatDelivery for StdoutDelivery {
    async fn post_message(&self, _token: &str, message: &OutgoingMessage) -> Result<DeliveryReceipt> {
        let mut out = std::io::stdout();

        writeln!(out, "--- {} as {} ---", message.channel, message.username)?;
        writeln!(out, "{}", message.text)?;
        if let Some(ref attachments) = message.attachments {
            writeln!(out, "attachments: {}", attachments)?;
        }
        writeln!(out)?;

        Ok(DeliveryReceipt {
            channel: message.channel.clone(),
            timestamp: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_stdout_delivery_acknowledges() {
        let message = OutgoingMessage {
            channel: "#ab-tests".to_string(),
            username: "Experiment results (Storefront)".to_string(),
            icon_emoji: None,
            text: "```\nExperiment: Checkout\n```".to_string(),
            attachments: None,
        };

        let receipt = assert_ok!(StdoutDelivery.post_message("unused", &message).await);
        assert_eq!(receipt.channel, "#ab-tests");
        assert_eq!(receipt.timestamp, None);
    }
}
