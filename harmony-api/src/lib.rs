//! HTTP surface for the Harmony identity & membership core
//!
//! Thin axum layer: handlers parse the request, ask the [`Guard`] when a
//! route needs a role, and delegate to the core services held in
//! [`AppState`]. Every failure leaves as `{"error": ..., "kind": ...}`.
//!
//! [`Guard`]: harmony_core::auth::Guard

pub mod api;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod server;
pub mod state;
pub mod types;

pub use api::build_router;
pub use error::{ApiError, ApiResult};
pub use server::serve;
pub use state::AppState;
