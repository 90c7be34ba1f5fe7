pub mod contact;
pub mod error;
pub mod event;
pub mod feed;
pub mod id;
pub mod timestamp;

pub use contact::Contact;
pub use error::{CoreError, ErrorCategory, Result};
pub use event::{AccidentEvent, AccidentReport, EventStatus, GeoLocation, Transition, validate_severity};
pub use feed::{FEED_CHANNEL, FeedBroadcaster, FeedMessage, FeedMessageType};
pub use id::{generate_id, validate_id};
pub use timestamp::{ClientTimestamp, now_utc};
