pub mod email;
pub mod log;
pub mod push;
pub mod sms;

use async_trait::async_trait;

use crate::error::NotificationError;
use crate::types::{AlertMessage, Channel, NotificationMetadata};

/// Result of a gateway call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendResult {
    pub success: bool,
    pub external_id: Option<String>,
    pub error: Option<String>,
}

impl SendResult {
    pub fn delivered(external_id: Option<String>) -> Self {
        Self {
            success: true,
            external_id,
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            external_id: None,
            error: Some(error.into()),
        }
    }
}

/// Transport for one notification channel
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Deliver `message` to a single recipient address.
    async fn send(
        &self,
        recipient: &str,
        message: &AlertMessage,
        metadata: &NotificationMetadata,
    ) -> Result<SendResult, NotificationError>;

    /// Deliver `message` to many recipients. Adapters whose gateway accepts
    /// batches override this with a single call.
    async fn send_batch(
        &self,
        recipients: &[String],
        message: &AlertMessage,
        metadata: &NotificationMetadata,
    ) -> Result<SendResult, NotificationError> {
        let mut failures = Vec::new();
        for recipient in recipients {
            match self.send(recipient, message, metadata).await {
                Ok(result) if result.success => {}
                Ok(result) => failures.push(result.error.unwrap_or_default()),
                Err(e) => failures.push(e.to_string()),
            }
        }
        if failures.is_empty() {
            Ok(SendResult::delivered(None))
        } else {
            Ok(SendResult::rejected(failures.join("; ")))
        }
    }

    fn channel(&self) -> Channel;

    /// Short transport name for logs
    fn name(&self) -> &'static str;
}

pub use email::SmtpEmailAdapter;
pub use log::LogAdapter;
pub use push::HttpPushAdapter;
pub use sms::HttpSmsAdapter;
