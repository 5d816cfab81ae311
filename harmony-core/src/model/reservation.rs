use std::collections::BTreeSet;

/// Issued suffix codes for one display name, with the version the store
/// last committed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reservation {
    pub codes: BTreeSet<u16>,
    pub version: u64,
}
