//! HTTP handlers

use crate::error::{ApiError, ApiResult};
use crate::extract::{Caller, RequestHost};
use crate::state::AppState;
use crate::types::*;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use harmony_core::auth::Guard;
use harmony_core::model::{Account, Community};
use harmony_core::{AccountId, CommunityId, ErrorKind, Role};

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::new(ErrorKind::Validation, rejection.body_text()))
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

// ============================================================================
// Account Handlers
// ============================================================================

/// POST /accounts - Register a new account
pub async fn register_account(
    State(state): State<AppState>,
    payload: Result<Json<RegisterAccountRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Account>)> {
    let req = body(payload)?;
    let account = state
        .harmony
        .identity
        .register(&req.display_name, &req.mail)
        .await?;
    Ok((StatusCode::CREATED, Json(account)))
}

/// GET /accounts/:id
pub async fn get_account(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<Account>> {
    caller.subject()?;
    let id = AccountId::parse(&id)?;
    Ok(Json(state.harmony.identity.account(&id).await?))
}

/// PATCH /accounts/:id - Change the display name; the handle stays
pub async fn update_account(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    payload: Result<Json<UpdateAccountRequest>, JsonRejection>,
) -> ApiResult<Json<Account>> {
    caller.subject()?;
    let id = AccountId::parse(&id)?;
    let account = state.harmony.identity.account(&id).await?;
    Guard::require_self(caller.claims(), &account.handle)?;

    let req = body(payload)?;
    let account = state.harmony.identity.rename(&id, &req.display_name).await?;
    Ok(Json(account))
}

/// DELETE /accounts/:id
pub async fn delete_account(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    caller.subject()?;
    let id = AccountId::parse(&id)?;
    let account = state.harmony.identity.account(&id).await?;
    Guard::require_self(caller.claims(), &account.handle)?;

    state.harmony.registry.delete_account(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Community Handlers
// ============================================================================

/// POST /communities - Create a community owned by the caller
pub async fn create_community(
    State(state): State<AppState>,
    caller: Caller,
    payload: Result<Json<CreateCommunityRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Community>)> {
    let owner = caller.subject()?;
    let req = body(payload)?;
    let community = state
        .harmony
        .registry
        .create_community(&req.display_name, &owner, req.image)
        .await?;
    Ok((StatusCode::CREATED, Json(community)))
}

/// GET /communities/:id
pub async fn get_community(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<Community>> {
    caller.subject()?;
    let id = CommunityId::parse(&id)?;
    Ok(Json(state.harmony.registry.community(&id).await?))
}

/// PATCH /communities/:id - Rename or re-image; admin and above
pub async fn update_community(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    payload: Result<Json<UpdateCommunityRequest>, JsonRejection>,
) -> ApiResult<Json<Community>> {
    caller.subject()?;
    let id = CommunityId::parse(&id)?;
    let community = state.harmony.registry.community(&id).await?;
    Guard::require(caller.claims(), &community.handle, Role::Admin)?;

    let req = body(payload)?;
    let community = state
        .harmony
        .registry
        .update_community(&id, req.display_name.as_deref(), req.image)
        .await?;
    Ok(Json(community))
}

/// DELETE /communities/:id - admin and above
pub async fn delete_community(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    caller.subject()?;
    let id = CommunityId::parse(&id)?;
    let community = state.harmony.registry.community(&id).await?;
    Guard::require(caller.claims(), &community.handle, Role::Admin)?;

    state.harmony.registry.delete_community(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Membership Handlers
// ============================================================================

/// GET /communities/:id/invite - Mint a join link; members and above
pub async fn create_invite(
    State(state): State<AppState>,
    caller: Caller,
    RequestHost(host): RequestHost,
    Path(id): Path<String>,
) -> ApiResult<Json<InviteResponse>> {
    caller.subject()?;
    let id = CommunityId::parse(&id)?;
    let link = state.harmony.invites.issue(&id, caller.claims()).await?;

    Ok(Json(InviteResponse {
        link: link.url(&state.invite_base(host.as_deref())),
        community_id: link.community_id,
        expires_at: link.expires_at,
    }))
}

/// POST /communities/:id/join?t= - Add the caller as a member
pub async fn join_community(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    params: Result<Query<JoinParams>, QueryRejection>,
) -> ApiResult<StatusCode> {
    let account = caller.subject()?;
    let id = CommunityId::parse(&id)?;
    let Query(params) =
        params.map_err(|rejection| ApiError::new(ErrorKind::Invalid, rejection.body_text()))?;

    state.harmony.invites.validate_for_join(&id, params.t.as_deref())?;
    state.harmony.registry.join(&id, &account).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /communities/:id/leave
pub async fn leave_community(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let account = caller.subject()?;
    let id = CommunityId::parse(&id)?;
    state.harmony.registry.leave(&id, &account).await?;
    Ok(StatusCode::NO_CONTENT)
}
