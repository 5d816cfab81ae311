use super::{AuthError, Claims};
use crate::handle::Handle;
use crate::role::Role;
use crate::telemetry;
use tracing::debug;

/// Stateless role checks over verified claims
#[derive(Debug, Default, Clone, Copy)]
pub struct Guard;

impl Guard {
    /// The caller's account handle
    pub fn subject(claims: Option<&Claims>) -> Result<Handle, AuthError> {
        let claims = claims.ok_or_else(|| AuthError::Unauthenticated("no credentials".into()))?;
        claims
            .subject
            .parse()
            .map_err(|_| AuthError::Unauthenticated("subject is not an account handle".into()))
    }

    pub fn has_at_least(claims: &Claims, community: &Handle, required: Role) -> bool {
        claims
            .role_in(community)
            .is_some_and(|held| held.satisfies(required))
    }

    /// Caller's handle if it holds at least `required` in `community`
    pub fn require(claims: Option<&Claims>, community: &Handle, required: Role) -> Result<Handle, AuthError> {
        let subject = Self::subject(claims)?;
        match claims {
            Some(claims) if Self::has_at_least(claims, community, required) => Ok(subject),
            _ => {
                debug!(subject = %subject, community = %community, required = %required, "Role check failed");
                metrics::counter!(telemetry::AUTH_DENIED).increment(1);
                Err(AuthError::InsufficientRole {
                    subject,
                    community: community.clone(),
                    required,
                })
            }
        }
    }

    /// Caller's handle if it is `account`
    pub fn require_self(claims: Option<&Claims>, account: &Handle) -> Result<Handle, AuthError> {
        let subject = Self::subject(claims)?;
        if &subject != account {
            metrics::counter!(telemetry::AUTH_DENIED).increment(1);
            return Err(AuthError::NotSelf { subject });
        }
        Ok(subject)
    }
}
