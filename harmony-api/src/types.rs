//! Request/Response bodies

use harmony_core::types::{CommunityId, Timestamp};
use serde::{Deserialize, Serialize};

// ============================================================================
// Accounts
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterAccountRequest {
    pub display_name: String,
    pub mail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateAccountRequest {
    pub display_name: String,
}

// ============================================================================
// Communities
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCommunityRequest {
    pub display_name: String,
    #[serde(default)]
    pub image: Option<String>,
}

/// Absent fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateCommunityRequest {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

// ============================================================================
// Invites
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteResponse {
    pub link: String,
    pub community_id: CommunityId,
    pub expires_at: Timestamp,
}

/// `?t=` on the join route: the invite's expiry in epoch milliseconds
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JoinParams {
    pub t: Option<String>,
}

// ============================================================================
// Misc
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
}
