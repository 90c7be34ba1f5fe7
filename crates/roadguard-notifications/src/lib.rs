pub mod adapters;
pub mod directory;
pub mod dispatcher;
pub mod error;
pub mod provider;
pub mod templates;
pub mod types;

pub use adapters::{
    ChannelAdapter, HttpPushAdapter, HttpSmsAdapter, LogAdapter, SendResult, SmtpEmailAdapter,
};
pub use directory::{ContactDirectory, StaticContactDirectory};
pub use dispatcher::NotificationDispatcher;
pub use error::NotificationError;
pub use provider::{PushGatewayConfig, ProviderConfig, SmsGatewayConfig, SmtpConfig};
pub use templates::{AlertComposer, AlertTemplates};
pub use types::*;
