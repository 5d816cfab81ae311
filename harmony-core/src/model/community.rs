use crate::handle::{DisplayName, Handle};
use crate::role::{Role, RoleMap};
use crate::types::{CommunityId, Timestamp};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A community ("server")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Community {
    pub id: CommunityId,
    pub display_name: DisplayName,
    pub handle: Handle,
    pub image: Option<String>,
    /// Account handle of the creator; fixed for the community's lifetime
    pub owner: Handle,
    /// Account handle → role; always contains `owner → Owner`
    pub members: RoleMap,
    pub created_at: Timestamp,
}

/// Roster edits that would break the one-owner rule or duplicate a member
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RosterError {
    #[error("{0} is already a member")]
    AlreadyMember(Handle),

    #[error("the owner role is only assigned at creation")]
    SecondOwner,

    #[error("{0} owns the community and cannot be removed")]
    OwnerRemoval(Handle),
}

impl Community {
    /// New community whose roster holds only its owner
    pub fn new(
        display_name: DisplayName,
        handle: Handle,
        owner: Handle,
        image: Option<String>,
        created_at: Timestamp,
    ) -> Self {
        let mut members = RoleMap::new();
        members.set(owner.clone(), Role::Owner);
        Self {
            id: CommunityId::generate(),
            display_name,
            handle,
            image,
            owner,
            members,
            created_at,
        }
    }

    pub fn role_of(&self, account: &Handle) -> Option<Role> {
        self.members.get(account)
    }

    pub fn is_member(&self, account: &Handle) -> bool {
        self.members.contains(account)
    }

    pub fn is_owner(&self, account: &Handle) -> bool {
        &self.owner == account
    }

    pub fn add_member(&mut self, account: Handle, role: Role) -> Result<(), RosterError> {
        if role == Role::Owner {
            return Err(RosterError::SecondOwner);
        }
        self.members
            .insert_new(account.clone(), role)
            .map_err(|_| RosterError::AlreadyMember(account))
    }

    /// Remove a non-owner member, returning the role it held
    pub fn remove_member(&mut self, account: &Handle) -> Result<Option<Role>, RosterError> {
        if self.is_owner(account) {
            return Err(RosterError::OwnerRemoval(account.clone()));
        }
        Ok(self.members.remove(account))
    }

    pub fn apply(&mut self, patch: &CommunityPatch) {
        if let Some(name) = &patch.display_name {
            self.display_name = name.clone();
        }
        if let Some(image) = &patch.image {
            self.image = Some(image.clone());
        }
    }
}

/// Mutable community fields; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityPatch {
    pub display_name: Option<DisplayName>,
    pub image: Option<String>,
}

impl CommunityPatch {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.image.is_none()
    }
}
