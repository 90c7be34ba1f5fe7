use roadguard_core::Contact;
use roadguard_notifications::{
    AlertTemplates, ProviderConfig, PushGatewayConfig, SmsGatewayConfig, SmtpConfig,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::{net::SocketAddr, time::Duration};

/// Upper bound for escalation timings (30 days)
pub const MAX_ESCALATION_SECS: u64 = 30 * 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Escalation scheduler timing
    #[serde(default)]
    pub escalation: EscalationConfig,
    /// Live feed and event listing
    #[serde(default)]
    pub feed: FeedConfig,
    /// Notification gateways and alert templates
    #[serde(default)]
    pub notifications: NotificationsConfig,
    /// Static emergency contact directory
    #[serde(default)]
    pub directory: DirectoryConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        // Escalation validations
        if self.escalation.interval_secs == 0 {
            return Err("escalation.interval_secs must be > 0".into());
        }
        if self.escalation.deadline_secs == 0 {
            return Err("escalation.deadline_secs must be > 0".into());
        }
        if self.escalation.interval_secs > MAX_ESCALATION_SECS {
            return Err(format!(
                "escalation.interval_secs must be <= {MAX_ESCALATION_SECS}"
            ));
        }
        if self.escalation.deadline_secs > MAX_ESCALATION_SECS {
            return Err(format!(
                "escalation.deadline_secs must be <= {MAX_ESCALATION_SECS}"
            ));
        }
        if self.escalation.batch_limit == 0 {
            return Err("escalation.batch_limit must be > 0".into());
        }
        // Feed validations
        if self.feed.capacity == 0 {
            return Err("feed.capacity must be > 0".into());
        }
        if self.feed.default_limit == 0 {
            return Err("feed.default_limit must be > 0".into());
        }
        if self.feed.default_limit > self.feed.max_limit {
            return Err("feed.default_limit must be <= feed.max_limit".into());
        }
        // Gateway validations
        if let Some(sms) = &self.notifications.sms
            && sms.url.trim().is_empty()
        {
            return Err("notifications.sms.url must not be empty".into());
        }
        if let Some(push) = &self.notifications.push
            && push.url.trim().is_empty()
        {
            return Err("notifications.push.url must not be empty".into());
        }
        if let Some(email) = &self.notifications.email
            && (email.host.trim().is_empty() || email.from.trim().is_empty())
        {
            return Err("notifications.email requires host and from".into());
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_body_limit() -> usize {
    64 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationConfig {
    /// Run the scheduler at all
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between scans
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Seconds a notified event may stay unacknowledged
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
    /// Upper bound on candidates handled per scan
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
}

fn default_true() -> bool {
    true
}
fn default_interval_secs() -> u64 {
    30
}
fn default_deadline_secs() -> u64 {
    120
}
fn default_batch_limit() -> usize {
    500
}

impl EscalationConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn deadline(&self) -> time::Duration {
        time::Duration::seconds(i64::try_from(self.deadline_secs).unwrap_or(i64::MAX))
    }
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            interval_secs: default_interval_secs(),
            deadline_secs: default_deadline_secs(),
            batch_limit: default_batch_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Messages buffered per observer before it starts skipping
    #[serde(default = "default_feed_capacity")]
    pub capacity: usize,
    /// `GET /events` page size when no limit is given
    #[serde(default = "default_list_limit")]
    pub default_limit: usize,
    #[serde(default = "default_list_max")]
    pub max_limit: usize,
}

fn default_feed_capacity() -> usize {
    1024
}
fn default_list_limit() -> usize {
    50
}
fn default_list_max() -> usize {
    500
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            capacity: default_feed_capacity(),
            default_limit: default_list_limit(),
            max_limit: default_list_max(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NotificationsConfig {
    #[serde(default)]
    pub sms: Option<SmsGatewayConfig>,
    #[serde(default)]
    pub push: Option<PushGatewayConfig>,
    #[serde(default)]
    pub email: Option<SmtpConfig>,
    #[serde(default)]
    pub templates: AlertTemplates,
}

impl NotificationsConfig {
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            sms: self.sms.clone(),
            push: self.push.clone(),
            email: self.email.clone(),
        }
    }
}

/// One contact as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DirectoryContact {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub push_token: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl From<DirectoryContact> for Contact {
    fn from(entry: DirectoryContact) -> Self {
        Contact {
            name: entry.name,
            phone: entry.phone,
            push_token: entry.push_token,
            email: entry.email,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DirectoryConfig {
    /// user id -> contacts
    #[serde(default)]
    pub users: HashMap<String, Vec<DirectoryContact>>,
}

impl DirectoryConfig {
    pub fn contacts(&self) -> HashMap<String, Vec<Contact>> {
        self.users
            .iter()
            .map(|(user, contacts)| {
                (
                    user.clone(),
                    contacts.iter().cloned().map(Contact::from).collect(),
                )
            })
            .collect()
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::{Path, PathBuf};

    pub const DEFAULT_CONFIG_PATH: &str = "roadguard.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., ROADGUARD__ESCALATION__DEADLINE_SECS=60
        builder = builder.add_source(
            Environment::with_prefix("ROADGUARD")
                .prefix_separator("__")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }

    pub fn load_config_with_default_path<P: AsRef<Path>>(
        path: Option<P>,
    ) -> Result<AppConfig, String> {
        let p = path
            .as_ref()
            .map(|p| p.as_ref().to_string_lossy().to_string());
        load_config(p.as_deref())
    }
}
