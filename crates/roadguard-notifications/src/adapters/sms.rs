use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde_json::json;
use sha2::Sha256;
use time::OffsetDateTime;

use super::{ChannelAdapter, SendResult};
use crate::error::NotificationError;
use crate::provider::SmsGatewayConfig;
use crate::types::{AlertMessage, Channel, NotificationMetadata};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-RoadGuard-Signature";
pub const TIMESTAMP_HEADER: &str = "X-RoadGuard-Timestamp";

/// Sends SMS through an HTTP gateway with one JSON POST per recipient.
pub struct HttpSmsAdapter {
    http_client: Client,
    config: SmsGatewayConfig,
}

impl HttpSmsAdapter {
    pub fn new(config: SmsGatewayConfig) -> Result<Self, NotificationError> {
        if config.url.trim().is_empty() {
            return Err(NotificationError::InvalidConfig("Missing sms.url".into()));
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

    fn sign_payload(payload: &str, secret: &str) -> Result<String, NotificationError> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| NotificationError::InvalidConfig(e.to_string()))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

#[async_trait]
impl ChannelAdapter for HttpSmsAdapter {
    async fn send(
        &self,
        recipient: &str,
        message: &AlertMessage,
        metadata: &NotificationMetadata,
    ) -> Result<SendResult, NotificationError> {
        if recipient.trim().is_empty() {
            return Err(NotificationError::RecipientMissing(Channel::Sms));
        }

        let timestamp = OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default();

        let payload = json!({
            "to": recipient,
            "from": self.config.sender,
            "body": message.body,
            "eventId": metadata.event_id,
            "data": metadata.data,
            "timestamp": timestamp
        });
        let payload_str = serde_json::to_string(&payload)
            .map_err(|e| NotificationError::transport(Channel::Sms, e.to_string()))?;

        let mut request = self
            .http_client
            .post(&self.config.url)
            .header("Content-Type", "application/json")
            .header(TIMESTAMP_HEADER, &timestamp);

        if let Some(headers) = &self.config.headers {
            for (key, value) in headers {
                request = request.header(key, value);
            }
        }

        if let Some(secret) = &self.config.secret {
            let signature = Self::sign_payload(&payload_str, secret)?;
            request = request.header(SIGNATURE_HEADER, format!("sha256={signature}"));
        }

        let response = request
            .body(payload_str)
            .send()
            .await
            .map_err(|e| NotificationError::transport(Channel::Sms, e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let external_id = response
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|body| body.get("id").and_then(|id| id.as_str()).map(String::from));
            Ok(SendResult::delivered(external_id))
        } else {
            let error = response.text().await.unwrap_or_default();
            Ok(SendResult::rejected(format!("SMS gateway returned {status}: {error}")))
        }
    }

    fn channel(&self) -> Channel {
        Channel::Sms
    }

    fn name(&self) -> &'static str {
        "http-sms"
    }
}
