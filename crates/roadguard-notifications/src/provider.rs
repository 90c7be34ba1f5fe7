//! Gateway configuration for each notification channel.
//!
//! A channel whose section is absent falls back to the logging transport.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Channel gateway settings, as found under `[notifications]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub sms: Option<SmsGatewayConfig>,
    #[serde(default)]
    pub push: Option<PushGatewayConfig>,
    #[serde(default)]
    pub email: Option<SmtpConfig>,
}

/// HTTP SMS gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsGatewayConfig {
    pub url: String,
    /// Sender id or number shown to recipients
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    /// HMAC-SHA256 key for the `X-RoadGuard-Signature` header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// HTTP push gateway accepting batched device tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushGatewayConfig {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// SMTP relay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Upgrade the connection with STARTTLS; disable only for local relays
    #[serde(default = "default_true")]
    pub starttls: bool,
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_smtp_port() -> u16 {
    587
}

fn default_true() -> bool {
    true
}

/// Hide secrets before a config is logged or returned.
pub fn mask_secrets(mut config: ProviderConfig) -> ProviderConfig {
    if let Some(sms) = config.sms.as_mut()
        && sms.secret.is_some()
    {
        sms.secret = Some("***".to_string());
    }
    if let Some(push) = config.push.as_mut()
        && push.api_key.is_some()
    {
        push.api_key = Some("***".to_string());
    }
    if let Some(email) = config.email.as_mut()
        && email.password.is_some()
    {
        email.password = Some("***".to_string());
    }
    config
}
