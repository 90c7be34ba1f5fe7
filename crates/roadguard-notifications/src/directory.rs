//! Lookup of a user's emergency contacts.

use std::collections::HashMap;

use async_trait::async_trait;
use roadguard_core::Contact;

use crate::error::NotificationError;

/// Source of emergency contacts for a reporting user.
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    /// Contacts to alert for `user_id`. An unknown user has no contacts.
    async fn contacts_for(&self, user_id: &str) -> Result<Vec<Contact>, NotificationError>;
}

/// Directory held in memory, typically loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticContactDirectory {
    contacts: HashMap<String, Vec<Contact>>,
}

impl StaticContactDirectory {
    pub fn new(contacts: HashMap<String, Vec<Contact>>) -> Self {
        Self { contacts }
    }

    pub fn insert(&mut self, user_id: impl Into<String>, contacts: Vec<Contact>) {
        self.contacts.insert(user_id.into(), contacts);
    }

    /// Number of users with contacts on file.
    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }
}

#[async_trait]
impl ContactDirectory for StaticContactDirectory {
    async fn contacts_for(&self, user_id: &str) -> Result<Vec<Contact>, NotificationError> {
        Ok(self.contacts.get(user_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_lookup() {
        let mut directory = StaticContactDirectory::default();
        directory.insert("u1", vec![Contact::new("Asha").with_phone("+15550100")]);

        let found = directory.contacts_for("u1").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].phone.as_deref(), Some("+15550100"));
        assert!(directory.contacts_for("u2").await.unwrap().is_empty());
    }
}
