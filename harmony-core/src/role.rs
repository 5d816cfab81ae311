//! Community roles and the handle → role container used on both sides of a
//! membership

use crate::error::ValidationError;
use crate::handle::Handle;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::{self, BTreeMap};
use std::fmt;
use std::str::FromStr;

/// Community-level roles, ordered by privilege: `Member < Admin < Owner`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Assigned on join
    Member,
    /// Can rename the community, change its image, delete it
    Admin,
    /// Assigned once, at creation; never removed by leave
    Owner,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Admin => "admin",
            Role::Owner => "owner",
        }
    }

    /// True when this role grants at least `required`
    pub fn satisfies(self, required: Role) -> bool {
        self >= required
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "member" => Ok(Role::Member),
            "admin" => Ok(Role::Admin),
            "owner" => Ok(Role::Owner),
            other => Err(ValidationError::new("role", format!("unknown role `{}`", other))),
        }
    }
}

/// Mapping from a handle (account or community) to the role it holds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleMap(BTreeMap<Handle, Role>);

impl RoleMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, handle: &Handle) -> Option<Role> {
        self.0.get(handle).copied()
    }

    pub fn contains(&self, handle: &Handle) -> bool {
        self.0.contains_key(handle)
    }

    /// Insert a handle that must not be present yet. Returns the role already
    /// recorded when it is.
    pub fn insert_new(&mut self, handle: Handle, role: Role) -> Result<(), Role> {
        match self.0.entry(handle) {
            btree_map::Entry::Occupied(existing) => Err(*existing.get()),
            btree_map::Entry::Vacant(slot) => {
                slot.insert(role);
                Ok(())
            }
        }
    }

    /// Insert or overwrite
    pub fn set(&mut self, handle: Handle, role: Role) -> Option<Role> {
        self.0.insert(handle, role)
    }

    pub fn remove(&mut self, handle: &Handle) -> Option<Role> {
        self.0.remove(handle)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Handle, Role)> {
        self.0.iter().map(|(h, r)| (h, *r))
    }

    pub fn handles(&self) -> impl Iterator<Item = &Handle> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(Handle, Role)> for RoleMap {
    fn from_iter<I: IntoIterator<Item = (Handle, Role)>>(iter: I) -> Self {
        RoleMap(iter.into_iter().collect())
    }
}
