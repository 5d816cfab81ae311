//! Persisted aggregates
//!
//! [`Account`] and [`Community`] each mirror one side of a membership. The
//! community side is authoritative; see [`crate::membership`] for how the
//! two are kept in step.

mod account;
mod community;
mod repair;
mod reservation;

pub use account::{Account, Mail};
pub use community::{Community, CommunityPatch, RosterError};
pub use repair::{Repair, SagaOperation};
pub use reservation::Reservation;
