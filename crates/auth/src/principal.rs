use serde::{Deserialize, Serialize};

use sendwatch_core::UserId;

use crate::{Permission, Role};

/// The signed-in console user as reported by the auth collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: UserId,
    pub role: Role,
}

impl CurrentUser {
    pub fn new(id: UserId, role: Role) -> Self {
        Self { id, role }
    }
}

/// Precomputed capability set for the current user.
///
/// The monitor consumes this as-is; it never derives capabilities from
/// tokens itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub user: CurrentUser,
    pub is_admin: bool,
    pub can_manage_campaigns: bool,
}

impl Capabilities {
    pub fn new(user: CurrentUser, is_admin: bool, can_manage_campaigns: bool) -> Self {
        Self {
            user,
            is_admin,
            can_manage_campaigns,
        }
    }

    /// Derive capabilities from a role and a permission grant list.
    ///
    /// - `admin` role or the `*` grant => admin
    /// - admins and holders of `campaigns.manage` may manage campaigns
    pub fn from_grants(user: CurrentUser, permissions: &[Permission]) -> Self {
        let is_admin = user.role.is_admin() || permissions.iter().any(Permission::is_wildcard);
        let can_manage_campaigns =
            is_admin || permissions.iter().any(|p| *p == Permission::MANAGE_CAMPAIGNS);

        Self {
            user,
            is_admin,
            can_manage_campaigns,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user.id
    }
}
