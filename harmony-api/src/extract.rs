//! Request extractors

use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use harmony_core::auth::{AuthError, Claims, ClaimsVerifier, Guard};
use harmony_core::Handle;

/// Verified bearer claims, or `None` when the request carries no
/// `Authorization` header. A header that is present but does not verify is
/// rejected with 401 before the handler runs.
#[derive(Debug, Clone)]
pub struct Caller(pub Option<Claims>);

impl Caller {
    pub fn claims(&self) -> Option<&Claims> {
        self.0.as_ref()
    }

    /// The caller's account handle; `Unauthenticated` when anonymous
    pub fn subject(&self) -> Result<Handle, ApiError> {
        Ok(Guard::subject(self.claims())?)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(header::AUTHORIZATION) else {
            return Ok(Caller(None));
        };
        let token = value
            .to_str()
            .ok()
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::Unauthenticated("expected `Bearer <token>`".into()))?;

        let claims = state.harmony.verifier.verify(token)?;
        Ok(Caller(Some(claims)))
    }
}

/// Value of the Host header, if any
pub struct RequestHost(pub Option<String>);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for RequestHost {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let host = parts
            .headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(RequestHost(host))
    }
}
