//! Helpers shared by unit and integration tests
//!
//! Enabled for this crate's own tests and, through the `test-utils` feature,
//! for the other workspace crates.

mod clock;
mod faulty;
mod fixtures;

pub use clock::ManualClock;
pub use faulty::FaultyStore;
pub use fixtures::{assert_mirrored, registry_fixture, test_config, Fixture};
