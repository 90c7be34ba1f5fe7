use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::{ChannelAdapter, SendResult};
use crate::error::NotificationError;
use crate::provider::PushGatewayConfig;
use crate::types::{AlertMessage, Channel, NotificationMetadata};

/// Sends push notifications through an HTTP gateway that accepts a batch
/// of device tokens per request.
pub struct HttpPushAdapter {
    http_client: Client,
    config: PushGatewayConfig,
}

impl HttpPushAdapter {
    pub fn new(config: PushGatewayConfig) -> Result<Self, NotificationError> {
        if config.url.trim().is_empty() {
            return Err(NotificationError::InvalidConfig("Missing push.url".into()));
        }
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NotificationError::InvalidConfig(e.to_string()))?;
        Ok(Self {
            http_client,
            config,
        })
    }
}

#[async_trait]
impl ChannelAdapter for HttpPushAdapter {
    async fn send(
        &self,
        recipient: &str,
        message: &AlertMessage,
        metadata: &NotificationMetadata,
    ) -> Result<SendResult, NotificationError> {
        self.send_batch(&[recipient.to_string()], message, metadata)
            .await
    }

    async fn send_batch(
        &self,
        recipients: &[String],
        message: &AlertMessage,
        metadata: &NotificationMetadata,
    ) -> Result<SendResult, NotificationError> {
        if recipients.is_empty() {
            return Err(NotificationError::RecipientMissing(Channel::Push));
        }

        let payload = json!({
            "tokens": recipients,
            "title": message.title(),
            "body": message.body,
            "data": {
                "eventId": metadata.event_id,
                "extra": metadata.data
            }
        });

        let mut request = self.http_client.post(&self.config.url).json(&payload);
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotificationError::transport(Channel::Push, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error = response.text().await.unwrap_or_default();
            return Ok(SendResult::rejected(format!(
                "Push gateway returned {status}: {error}"
            )));
        }

        // Gateways may accept the batch but reject individual tokens.
        let body = response.json::<serde_json::Value>().await.unwrap_or_default();
        let failed: Vec<&str> = body
            .get("failedTokens")
            .and_then(|v| v.as_array())
            .map(|tokens| tokens.iter().filter_map(|t| t.as_str()).collect())
            .unwrap_or_default();
        if !failed.is_empty() {
            return Ok(SendResult::rejected(format!(
                "Push gateway rejected {} of {} tokens",
                failed.len(),
                recipients.len()
            )));
        }

        let external_id = body.get("id").and_then(|id| id.as_str()).map(String::from);
        Ok(SendResult::delivered(external_id))
    }

    fn channel(&self) -> Channel {
        Channel::Push
    }

    fn name(&self) -> &'static str {
        "http-push"
    }
}
