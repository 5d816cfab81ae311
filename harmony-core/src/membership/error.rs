use crate::error::{Classify, ErrorKind, ValidationError};
use crate::handle::{Handle, HandleError};
use crate::model::SagaOperation;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MembershipError {
    #[error("community {0} not found")]
    CommunityNotFound(String),

    #[error("account {0} not found")]
    AccountNotFound(String),

    #[error("{account} is already a member of {community}")]
    AlreadyMember { account: Handle, community: Handle },

    #[error("{account} is not a member of {community}")]
    NotMember { account: Handle, community: Handle },

    #[error("{account} owns {community} and cannot leave it")]
    OwnerCannotLeave { account: Handle, community: Handle },

    #[error("{account} still owns {count} communities")]
    OwnsCommunities { account: Handle, count: usize },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Handle(#[from] HandleError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The community side committed; the account side did not and a repair
    /// record was left for reconciliation
    #[error("{operation} committed for {community} but not yet for {account}: {source}")]
    PartiallyApplied {
        operation: SagaOperation,
        community: Handle,
        account: Handle,
        #[source]
        source: StoreError,
    },
}

impl Classify for MembershipError {
    fn kind(&self) -> ErrorKind {
        match self {
            MembershipError::CommunityNotFound(_) | MembershipError::AccountNotFound(_) => ErrorKind::NotFound,
            MembershipError::AlreadyMember { .. }
            | MembershipError::NotMember { .. }
            | MembershipError::OwnerCannotLeave { .. }
            | MembershipError::OwnsCommunities { .. } => ErrorKind::Conflict,
            MembershipError::Validation(_) => ErrorKind::Validation,
            MembershipError::Handle(e) => e.kind(),
            MembershipError::Store(e) => e.kind(),
            MembershipError::PartiallyApplied { .. } => ErrorKind::PartiallyApplied,
        }
    }
}
