use uuid::Uuid;

use crate::error::{CoreError, Result};

/// Generate a new accident event id.
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Check that an id taken from a request path looks like one we issued.
pub fn validate_id(id: &str) -> Result<()> {
    Uuid::parse_str(id)
        .map(|_| ())
        .map_err(|_| CoreError::not_found(id))
}
