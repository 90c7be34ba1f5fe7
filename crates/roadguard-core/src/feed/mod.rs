//! Live feed of accident event changes.
//!
//! Every committed write to an event is published as a [`FeedMessage`] on the
//! [`FeedBroadcaster`]. Observers (hospital and driver clients) subscribe and
//! receive messages published after they subscribed; there is no replay.
//!
//! ```text
//!   store commit ──▶ FeedBroadcaster ──▶ observer 1
//!                    (version gate)  ├─▶ observer 2
//!                                    └─▶ observer N
//! ```
//!
//! Messages for the same event are delivered in commit order: a publish whose
//! event version is not newer than the last published version is dropped.

pub mod broadcaster;
pub mod types;

pub use broadcaster::FeedBroadcaster;
pub use types::{FEED_CHANNEL, FeedMessage, FeedMessageType};
