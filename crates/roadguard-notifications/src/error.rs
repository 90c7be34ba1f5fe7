use thiserror::Error;

use crate::types::Channel;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Transport failed on {channel}: {message}")]
    Transport { channel: Channel, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No {0} recipient given")]
    RecipientMissing(Channel),

    #[error("Invalid recipient '{0}'")]
    InvalidRecipient(String),

    #[error("Contact directory unavailable: {0}")]
    Directory(String),
}

impl NotificationError {
    pub fn transport(channel: Channel, message: impl Into<String>) -> Self {
        Self::Transport {
            channel,
            message: message.into(),
        }
    }
}
