use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tracing::info;

use super::{ChannelAdapter, SendResult};
use crate::error::NotificationError;
use crate::types::{AlertMessage, Channel, NotificationMetadata};

/// Development transport: logs the message instead of sending it.
pub struct LogAdapter {
    channel: Channel,
    sent: AtomicUsize,
}

impl LogAdapter {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            sent: AtomicUsize::new(0),
        }
    }

    /// Number of recipients logged so far.
    pub fn sent_count(&self) -> usize {
        self.sent.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ChannelAdapter for LogAdapter {
    async fn send(
        &self,
        recipient: &str,
        message: &AlertMessage,
        metadata: &NotificationMetadata,
    ) -> Result<SendResult, NotificationError> {
        if recipient.trim().is_empty() {
            return Err(NotificationError::RecipientMissing(self.channel));
        }
        info!(
            channel = %self.channel,
            recipient,
            event_id = metadata.event_id.as_deref().unwrap_or("-"),
            subject = message.title(),
            body = %message.body,
            "Notification (log transport)"
        );
        self.sent.fetch_add(1, Ordering::Relaxed);
        Ok(SendResult::delivered(None))
    }

    fn channel(&self) -> Channel {
        self.channel
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
