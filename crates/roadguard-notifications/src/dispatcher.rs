//! Fan-out of an alert to every reachable contact.

use std::sync::Arc;

use futures_util::future::join_all;
use roadguard_core::Contact;
use tracing::{debug, info, warn};

use crate::adapters::{
    ChannelAdapter, HttpPushAdapter, HttpSmsAdapter, LogAdapter, SendResult, SmtpEmailAdapter,
};
use crate::error::NotificationError;
use crate::provider::ProviderConfig;
use crate::types::{AlertMessage, Channel, ChannelOutcome, DispatchReport, NotificationMetadata};

/// Sends alerts over SMS, push and email.
///
/// Transport failures never escape [`NotificationDispatcher::notify_contacts`];
/// they are logged and recorded in the returned [`DispatchReport`].
#[derive(Clone)]
pub struct NotificationDispatcher {
    sms: Arc<dyn ChannelAdapter>,
    push: Arc<dyn ChannelAdapter>,
    email: Arc<dyn ChannelAdapter>,
}

impl NotificationDispatcher {
    pub fn new(
        sms: Arc<dyn ChannelAdapter>,
        push: Arc<dyn ChannelAdapter>,
        email: Arc<dyn ChannelAdapter>,
    ) -> Self {
        Self { sms, push, email }
    }

    /// Dispatcher that only logs, for every channel.
    pub fn logging() -> Self {
        Self::new(
            Arc::new(LogAdapter::new(Channel::Sms)),
            Arc::new(LogAdapter::new(Channel::Push)),
            Arc::new(LogAdapter::new(Channel::Email)),
        )
    }

    /// Build adapters from gateway configuration. Channels without a
    /// section use the logging transport.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, NotificationError> {
        let sms: Arc<dyn ChannelAdapter> = match &config.sms {
            Some(sms) => Arc::new(HttpSmsAdapter::new(sms.clone())?),
            None => Arc::new(LogAdapter::new(Channel::Sms)),
        };
        let push: Arc<dyn ChannelAdapter> = match &config.push {
            Some(push) => Arc::new(HttpPushAdapter::new(push.clone())?),
            None => Arc::new(LogAdapter::new(Channel::Push)),
        };
        let email: Arc<dyn ChannelAdapter> = match &config.email {
            Some(email) => Arc::new(SmtpEmailAdapter::new(email)?),
            None => Arc::new(LogAdapter::new(Channel::Email)),
        };
        info!(
            sms = sms.name(),
            push = push.name(),
            email = email.name(),
            "Notification transports configured"
        );
        Ok(Self::new(sms, push, email))
    }

    /// Alert every contact on each channel it can be reached by.
    ///
    /// Phones get one SMS each, emails one message each, and all push
    /// tokens share a single batched call. Sends run concurrently and the
    /// call returns once every attempt has finished. No retries.
    pub async fn notify_contacts(
        &self,
        contacts: &[Contact],
        message: &AlertMessage,
        metadata: &NotificationMetadata,
    ) -> DispatchReport {
        let mut sends = Vec::new();

        for contact in contacts {
            if let Some(phone) = non_empty(&contact.phone) {
                sends.push(deliver(self.sms.as_ref(), vec![phone], message, metadata));
            }
            if let Some(email) = non_empty(&contact.email) {
                sends.push(deliver(self.email.as_ref(), vec![email], message, metadata));
            }
            if !contact.is_reachable() {
                debug!(contact = contact.display_name(), "Contact has no channel, skipped");
            }
        }

        let tokens: Vec<String> = contacts
            .iter()
            .filter_map(|c| non_empty(&c.push_token))
            .collect();
        if !tokens.is_empty() {
            sends.push(deliver(self.push.as_ref(), tokens, message, metadata));
        }

        let report = DispatchReport {
            outcomes: join_all(sends).await,
        };
        info!(
            event_id = metadata.event_id.as_deref().unwrap_or("-"),
            contacts = contacts.len(),
            attempted = report.attempted(),
            failed = report.failed(),
            "Contact notification finished"
        );
        report
    }
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("sms", &self.sms.name())
            .field("push", &self.push.name())
            .field("email", &self.email.name())
            .finish()
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

async fn deliver(
    adapter: &dyn ChannelAdapter,
    recipients: Vec<String>,
    message: &AlertMessage,
    metadata: &NotificationMetadata,
) -> ChannelOutcome {
    let channel = adapter.channel();
    let result = if recipients.len() == 1 {
        adapter.send(&recipients[0], message, metadata).await
    } else {
        adapter.send_batch(&recipients, message, metadata).await
    };
    let result = result.unwrap_or_else(|e| SendResult::rejected(e.to_string()));

    if !result.success {
        warn!(
            channel = %channel,
            transport = adapter.name(),
            recipients = recipients.len(),
            event_id = metadata.event_id.as_deref().unwrap_or("-"),
            error = result.error.as_deref().unwrap_or("unknown"),
            "Notification send failed"
        );
    }

    ChannelOutcome {
        channel,
        recipients: recipients.len(),
        success: result.success,
        external_id: result.external_id,
        error: result.error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every call and fails when told to.
    struct ScriptedAdapter {
        channel: Channel,
        fail: bool,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedAdapter {
        fn new(channel: Channel, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                channel,
                fail,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChannelAdapter for ScriptedAdapter {
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
            _message: &AlertMessage,
            _metadata: &NotificationMetadata,
        ) -> Result<SendResult, NotificationError> {
            self.calls.lock().unwrap().push(recipients.to_vec());
            if self.fail {
                Err(NotificationError::transport(self.channel, "gateway down"))
            } else {
                Ok(SendResult::delivered(None))
            }
        }

        fn channel(&self) -> Channel {
            self.channel
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn test_push_tokens_are_batched() {
        let sms = ScriptedAdapter::new(Channel::Sms, false);
        let push = ScriptedAdapter::new(Channel::Push, false);
        let email = ScriptedAdapter::new(Channel::Email, false);
        let dispatcher = NotificationDispatcher::new(sms.clone(), push.clone(), email.clone());

        let contacts = vec![
            Contact::new("A").with_phone("+1").with_push_token("t1"),
            Contact::new("B").with_push_token("t2").with_email("b@example.com"),
            Contact::new("C"),
        ];
        let report = dispatcher
            .notify_contacts(&contacts, &AlertMessage::new("help"), &NotificationMetadata::default())
            .await;

        assert_eq!(report.attempted(), 3);
        assert_eq!(report.failed(), 0);
        assert_eq!(sms.calls(), vec![vec!["+1".to_string()]]);
        assert_eq!(push.calls(), vec![vec!["t1".to_string(), "t2".to_string()]]);
        assert_eq!(email.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_partial_failure_is_recorded_not_raised() {
        let sms = ScriptedAdapter::new(Channel::Sms, false);
        let push = ScriptedAdapter::new(Channel::Push, true);
        let email = ScriptedAdapter::new(Channel::Email, false);
        let dispatcher = NotificationDispatcher::new(sms, push, email);

        let contacts = vec![
            Contact::default().with_phone("+15550100"),
            Contact::default().with_push_token("bad"),
        ];
        let report = dispatcher
            .notify_contacts(
                &contacts,
                &AlertMessage::new("help"),
                &NotificationMetadata::for_event("e1"),
            )
            .await;

        assert_eq!(report.attempted(), 2);
        assert_eq!(report.succeeded(), 1);
        let push_outcome = report.for_channel(Channel::Push).next().unwrap();
        assert!(!push_outcome.success);
        assert!(push_outcome.error.as_deref().unwrap().contains("gateway down"));
    }

    #[tokio::test]
    async fn test_no_contacts_is_a_noop() {
        let report = NotificationDispatcher::logging()
            .notify_contacts(&[], &AlertMessage::new("help"), &NotificationMetadata::default())
            .await;
        assert_eq!(report.attempted(), 0);
    }

    #[test]
    fn test_from_empty_config_uses_log_transport() {
        let dispatcher = NotificationDispatcher::from_config(&ProviderConfig::default()).unwrap();
        assert_eq!(dispatcher.sms.name(), "log");
        assert_eq!(dispatcher.push.name(), "log");
    }
}
