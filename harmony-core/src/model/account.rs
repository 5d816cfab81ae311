use crate::error::ValidationError;
use crate::handle::{DisplayName, Handle};
use crate::role::RoleMap;
use crate::types::{AccountId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Contact address, unique across all accounts
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Mail(String);

impl Mail {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        if raw.chars().any(char::is_whitespace) {
            return Err(ValidationError::new("mail", "address contains whitespace"));
        }
        let (local, domain) = raw
            .split_once('@')
            .ok_or_else(|| ValidationError::new("mail", "address has no @"))?;
        if local.is_empty() {
            return Err(ValidationError::new("mail", "local part is empty"));
        }
        if domain.contains('@') {
            return Err(ValidationError::new("mail", "address has more than one @"));
        }
        let dot = domain.find('.');
        if domain.starts_with('.') || domain.ends_with('.') || dot.is_none() {
            return Err(ValidationError::new("mail", "domain must contain an interior ."));
        }
        Ok(Mail(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Mail {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Mail::parse(&value)
    }
}

impl From<Mail> for String {
    fn from(mail: Mail) -> Self {
        mail.0
    }
}

impl fmt::Display for Mail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A registered account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub display_name: DisplayName,
    /// Assigned at registration, never changes
    pub handle: Handle,
    pub mail: Mail,
    /// Community handle → role held there
    pub memberships: RoleMap,
    pub created_at: Timestamp,
}

impl Account {
    /// Fresh account with no memberships
    pub fn new(display_name: DisplayName, handle: Handle, mail: Mail, created_at: Timestamp) -> Self {
        Self {
            id: AccountId::generate(),
            display_name,
            handle,
            mail,
            memberships: RoleMap::new(),
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mail_accepts_plain_addresses() {
        assert!(Mail::parse("alice@example.com").is_ok());
        assert!(Mail::parse("a.b+tag@mail.example.org").is_ok());
    }

    #[test]
    fn test_mail_rejects_malformed_addresses() {
        for raw in [
            "",
            "alice",
            "@example.com",
            "alice@",
            "alice@localhost",
            "alice@.com",
            "alice@example.",
            "alice@@example.com",
            "al ice@example.com",
            "alice@exa@mple.com",
        ] {
            assert!(Mail::parse(raw).is_err(), "accepted {raw:?}");
        }
    }

    #[test]
    fn test_new_account_has_no_memberships() {
        let account = Account::new(
            DisplayName::parse("alice").unwrap(),
            "alice:0001".parse().unwrap(),
            Mail::parse("alice@example.com").unwrap(),
            Timestamp::from_millis(1),
        );
        assert!(account.memberships.is_empty());
        assert_eq!(account.id.as_str().len(), 32);
    }
}
