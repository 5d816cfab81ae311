/*
    types.rs - Common types shared by every aggregate

    Defines:
    - Timestamps (milliseconds since the Unix epoch)
    - Opaque, store-assigned identifiers for accounts, communities and repair records
*/

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Unix timestamp in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Create a timestamp representing the current time
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(duration.as_millis() as u64)
    }

    /// Create a timestamp from milliseconds since epoch
    pub fn from_millis(millis: u64) -> Self {
        Timestamp(millis)
    }

    /// Get milliseconds since epoch
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Whole seconds since epoch
    pub fn as_secs(&self) -> u64 {
        self.0 / 1000
    }

    pub fn saturating_add(self, duration: Duration) -> Self {
        Timestamp(self.0.saturating_add(duration.as_millis() as u64))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident, $field:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Assign a fresh identifier
            pub fn generate() -> Self {
                $name(Uuid::new_v4().simple().to_string())
            }

            /// Parse an identifier received from a caller
            pub fn parse(raw: &str) -> Result<Self, ValidationError> {
                let uuid = Uuid::try_parse(raw.trim())
                    .map_err(|_| ValidationError::new($field, "not a valid identifier"))?;
                Ok($name(uuid.simple().to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

opaque_id!(
    /// Store-assigned account identifier
    AccountId,
    "account_id"
);

opaque_id!(
    /// Store-assigned community identifier
    CommunityId,
    "community_id"
);

opaque_id!(
    /// Identifier of a membership repair record
    RepairId,
    "repair_id"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_generation() {
        let id1 = AccountId::generate();
        let id2 = AccountId::generate();
        assert_ne!(id1, id2, "Generated IDs should be unique");
        assert_eq!(id1.as_str().len(), 32);
    }

    #[test]
    fn test_id_parse_normalizes_hyphenated_form() {
        let id = CommunityId::generate();
        let hyphenated = Uuid::try_parse(id.as_str()).unwrap().hyphenated().to_string();
        assert_eq!(CommunityId::parse(&hyphenated).unwrap(), id);
    }

    #[test]
    fn test_id_parse_rejects_garbage() {
        let err = AccountId::parse("not-an-id").unwrap_err();
        assert_eq!(err.field, "account_id");
    }

    #[test]
    fn test_timestamp_add() {
        let ts = Timestamp::from_millis(1_000);
        assert_eq!(ts.saturating_add(Duration::from_secs(300)).as_millis(), 301_000);
        assert_eq!(Timestamp::from_millis(u64::MAX).saturating_add(Duration::from_secs(1)).0, u64::MAX);
    }
}
