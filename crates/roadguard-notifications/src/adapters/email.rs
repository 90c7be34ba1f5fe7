use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};

use super::{ChannelAdapter, SendResult};
use crate::error::NotificationError;
use crate::provider::SmtpConfig;
use crate::types::{AlertMessage, Channel, NotificationMetadata};

/// Sends plain-text email through an SMTP relay.
pub struct SmtpEmailAdapter {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpEmailAdapter {
    pub fn new(config: &SmtpConfig) -> Result<Self, NotificationError> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| NotificationError::InvalidConfig(format!("Invalid from: {e}")))?;

        let builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| NotificationError::InvalidConfig(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };
        let mut builder = builder.port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            mailer: builder.build(),
            from,
        })
    }

    fn build_message(
        &self,
        recipient: &str,
        message: &AlertMessage,
        metadata: &NotificationMetadata,
    ) -> Result<Message, NotificationError> {
        let to: Mailbox = recipient
            .parse()
            .map_err(|_| NotificationError::InvalidRecipient(recipient.to_string()))?;

        let mut body = message.body.clone();
        if let Some(event_id) = &metadata.event_id {
            body.push_str(&format!("\n\nReference: {event_id}"));
        }

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.title())
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| NotificationError::transport(Channel::Email, e.to_string()))
    }
}

#[async_trait]
impl ChannelAdapter for SmtpEmailAdapter {
    async fn send(
        &self,
        recipient: &str,
        message: &AlertMessage,
        metadata: &NotificationMetadata,
    ) -> Result<SendResult, NotificationError> {
        if recipient.trim().is_empty() {
            return Err(NotificationError::RecipientMissing(Channel::Email));
        }
        let email = self.build_message(recipient, message, metadata)?;

        match self.mailer.send(email).await {
            Ok(response) => Ok(SendResult::delivered(Some(
                response.message().collect::<Vec<_>>().join(" "),
            ))),
            Err(e) => Ok(SendResult::rejected(e.to_string())),
        }
    }

    fn channel(&self) -> Channel {
        Channel::Email
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}
