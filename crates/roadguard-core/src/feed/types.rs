use serde::{Deserialize, Serialize};

use crate::event::AccidentEvent;

/// Name of the real-time channel observers subscribe to.
pub const FEED_CHANNEL: &str = "hospital-feed";

/// Kind of feed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeedMessageType {
    /// Event was just reported
    #[serde(rename = "NEW_EVENT")]
    NewEvent,
    /// Event state changed
    #[serde(rename = "UPDATE_EVENT")]
    UpdateEvent,
}

impl FeedMessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedMessageType::NewEvent => "NEW_EVENT",
            FeedMessageType::UpdateEvent => "UPDATE_EVENT",
        }
    }
}

impl std::fmt::Display for FeedMessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Message broadcast to observers: `{type, payload}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedMessage {
    #[serde(rename = "type")]
    pub message_type: FeedMessageType,
    pub payload: AccidentEvent,
}

impl FeedMessage {
    pub fn new_event(event: AccidentEvent) -> Self {
        Self {
            message_type: FeedMessageType::NewEvent,
            payload: event,
        }
    }

    pub fn update_event(event: AccidentEvent) -> Self {
        Self {
            message_type: FeedMessageType::UpdateEvent,
            payload: event,
        }
    }

    pub fn event_id(&self) -> &str {
        &self.payload.id
    }
}
