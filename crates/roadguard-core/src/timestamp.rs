use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::{CoreError, Result};

/// Occurrence time as sent by a client: epoch milliseconds or an RFC 3339 string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientTimestamp {
    EpochMillis(i64),
    Text(String),
}

impl ClientTimestamp {
    pub fn resolve(&self) -> Result<OffsetDateTime> {
        match self {
            ClientTimestamp::EpochMillis(ms) => from_epoch_millis(*ms),
            ClientTimestamp::Text(s) => parse_rfc3339(s),
        }
    }
}

pub fn from_epoch_millis(ms: i64) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .map_err(|e| CoreError::invalid_timestamp(format!("{ms}: {e}")))
}

pub fn parse_rfc3339(s: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(s, &Rfc3339)
        .map_err(|e| CoreError::invalid_timestamp(format!("'{s}': {e}")))
}

pub fn format_rfc3339(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_default()
}

pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}
