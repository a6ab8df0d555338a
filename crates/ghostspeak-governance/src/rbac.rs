//! Role-based access control
//!
//! | Role      | Permissions                                                                 |
//! |-----------|-----------------------------------------------------------------------------|
//! | user      | vote                                                                        |
//! | verifier  | vote, verify_agent                                                          |
//! | moderator | create_proposal, vote, cancel_proposal, verify_agent, manage_proposals, manage_verifications |
//! | admin     | everything                                                                  |
//!
//! An assignment whose expiry has passed is inactive regardless of its
//! stored `active` flag.

use chrono::{DateTime, Utc};
use ghostspeak_types::{Address, CallContext, GhostSpeakError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, info};

/// Governance roles, ordered user < verifier < moderator < admin
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Verifier,
    Moderator,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Verifier => write!(f, "verifier"),
            Self::Moderator => write!(f, "moderator"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

/// Governance permissions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    // Voting
    CreateProposal,
    Vote,
    CancelProposal,

    // Verification
    VerifyAgent,
    ManageProposals,
    ManageVerifications,

    // Admin
    GrantRole,
    RevokeRole,
    ManageTreasury,
    UpgradeProtocol,
    EmergencyActions,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::CreateProposal => "create_proposal",
            Self::Vote => "vote",
            Self::CancelProposal => "cancel_proposal",
            Self::VerifyAgent => "verify_agent",
            Self::ManageProposals => "manage_proposals",
            Self::ManageVerifications => "manage_verifications",
            Self::GrantRole => "grant_role",
            Self::RevokeRole => "revoke_role",
            Self::ManageTreasury => "manage_treasury",
            Self::UpgradeProtocol => "upgrade_protocol",
            Self::EmergencyActions => "emergency_actions",
        };
        f.write_str(s)
    }
}

impl Role {
    /// Fixed permission set of the role
    pub fn permissions(&self) -> &'static [Permission] {
        use Permission::*;
        match self {
            Role::User => &[Vote],
            Role::Verifier => &[Vote, VerifyAgent],
            Role::Moderator => &[
                CreateProposal,
                Vote,
                CancelProposal,
                VerifyAgent,
                ManageProposals,
                ManageVerifications,
            ],
            Role::Admin => &[
                CreateProposal,
                Vote,
                CancelProposal,
                VerifyAgent,
                ManageProposals,
                ManageVerifications,
                GrantRole,
                RevokeRole,
                ManageTreasury,
                UpgradeProtocol,
                EmergencyActions,
            ],
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }
}

/// One grant of a role to an address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub address: Address,
    pub role: Role,
    pub granted_by: Address,
    pub granted_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
}

impl RoleAssignment {
    /// Active flag set and expiry (if any) not yet reached
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.active && self.expires_at.map_or(true, |expiry| now < expiry)
    }
}

/// Request to grant a role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantRoleRequest {
    pub address: Address,
    pub role: Role,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Every role assignment known to the client
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRegistry {
    assignments: Vec<RoleAssignment>,
}

impl RoleRegistry {
    /// A registry whose only entry is `admin`, self-granted at `now`
    pub fn bootstrap(admin: Address, now: DateTime<Utc>) -> Self {
        info!(admin = %admin, "role registry bootstrapped");
        Self {
            assignments: vec![RoleAssignment {
                address: admin.clone(),
                role: Role::Admin,
                granted_by: admin,
                granted_at: now,
                expires_at: None,
                active: true,
            }],
        }
    }

    pub fn assignments(&self) -> &[RoleAssignment] {
        &self.assignments
    }

    /// Roles currently active for an address, highest first
    pub fn active_roles(&self, address: &Address, now: DateTime<Utc>) -> Vec<Role> {
        let mut roles: Vec<Role> = self
            .assignments
            .iter()
            .filter(|a| &a.address == address && a.is_active_at(now))
            .map(|a| a.role)
            .collect();
        roles.sort_unstable_by(|a, b| b.cmp(a));
        roles.dedup();
        roles
    }

    /// Highest active role
    pub fn effective_role(&self, address: &Address, now: DateTime<Utc>) -> Option<Role> {
        self.active_roles(address, now).into_iter().next()
    }

    /// Union of permissions over every active role
    pub fn permissions(&self, address: &Address, now: DateTime<Utc>) -> BTreeSet<Permission> {
        self.active_roles(address, now)
            .iter()
            .flat_map(|role| role.permissions().iter().copied())
            .collect()
    }

    pub fn has_permission(&self, address: &Address, permission: Permission, now: DateTime<Utc>) -> bool {
        self.active_roles(address, now)
            .iter()
            .any(|role| role.has_permission(permission))
    }

    /// Fail with `MissingPermission` unless the address holds `permission`
    pub fn require_permission(
        &self,
        address: &Address,
        permission: Permission,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if self.has_permission(address, permission, now) {
            return Ok(());
        }
        debug!(address = %address, permission = %permission, "permission denied");
        Err(GhostSpeakError::MissingPermission {
            address: address.to_string(),
            permission: permission.to_string(),
        })
    }

    /// Grant a role; the caller needs `grant_role`
    pub fn grant_role(&self, request: &GrantRoleRequest, ctx: &CallContext) -> Result<Self> {
        self.require_permission(&ctx.caller, Permission::GrantRole, ctx.now)?;
        if let Some(expiry) = request.expires_at {
            if expiry <= ctx.now {
                return Err(GhostSpeakError::invalid_input("expires_at", "must be in the future"));
            }
        }
        if self
            .assignments
            .iter()
            .any(|a| a.address == request.address && a.role == request.role && a.is_active_at(ctx.now))
        {
            return Err(GhostSpeakError::RoleAlreadyAssigned {
                address: request.address.to_string(),
                role: request.role.to_string(),
            });
        }

        let mut next = self.clone();
        next.assignments.push(RoleAssignment {
            address: request.address.clone(),
            role: request.role,
            granted_by: ctx.caller.clone(),
            granted_at: ctx.now,
            expires_at: request.expires_at,
            active: true,
        });
        info!(
            address = %request.address,
            role = %request.role,
            granted_by = %ctx.caller,
            "role granted"
        );
        Ok(next)
    }

    /// Revoke a role; the caller needs `revoke_role` and cannot target themself
    pub fn revoke_role(&self, address: &Address, role: Role, ctx: &CallContext) -> Result<Self> {
        if address == &ctx.caller {
            return Err(GhostSpeakError::CannotRevokeOwnRole {
                address: address.to_string(),
            });
        }
        self.require_permission(&ctx.caller, Permission::RevokeRole, ctx.now)?;

        let mut next = self.clone();
        let mut revoked = false;
        for assignment in next
            .assignments
            .iter_mut()
            .filter(|a| &a.address == address && a.role == role && a.is_active_at(ctx.now))
        {
            assignment.active = false;
            revoked = true;
        }
        if !revoked {
            return Err(GhostSpeakError::RoleNotFound {
                address: address.to_string(),
                role: role.to_string(),
            });
        }
        info!(address = %address, role = %role, revoked_by = %ctx.caller, "role revoked");
        Ok(next)
    }

    /// Clear the active flag on expired assignments; returns how many changed
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> (Self, usize) {
        let mut next = self.clone();
        let mut swept = 0;
        for assignment in next.assignments.iter_mut() {
            if assignment.active && !assignment.is_active_at(now) {
                assignment.active = false;
                swept += 1;
            }
        }
        if swept > 0 {
            debug!(swept, "expired role assignments cleared");
        }
        (next, swept)
    }

    /// Drop assignments that are revoked or expired at `now`; returns how many
    /// were removed
    pub fn prune_inactive(&self, now: DateTime<Utc>) -> (Self, usize) {
        let mut next = self.clone();
        next.assignments.retain(|a| a.is_active_at(now));
        let pruned = self.assignments.len() - next.assignments.len();
        if pruned > 0 {
            debug!(pruned, "inactive role assignments pruned");
        }
        (next, pruned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn addr(c: char) -> Address {
        Address::parse(&c.to_string().repeat(32)).unwrap()
    }

    fn setup() -> (RoleRegistry, CallContext) {
        let now = Utc::now();
        (RoleRegistry::bootstrap(addr('A'), now), CallContext::new(addr('A'), now))
    }

    fn grant(address: Address, role: Role) -> GrantRoleRequest {
        GrantRoleRequest {
            address,
            role,
            expires_at: None,
        }
    }

    #[test]
    fn test_role_ordering() {
        assert!(Role::Admin > Role::Moderator);
        assert!(Role::Moderator > Role::Verifier);
        assert!(Role::Verifier > Role::User);
    }

    #[test]
    fn test_permission_matrix() {
        assert_eq!(Role::User.permissions(), &[Permission::Vote]);
        assert!(Role::Verifier.has_permission(Permission::VerifyAgent));
        assert!(!Role::Verifier.has_permission(Permission::CreateProposal));
        assert!(Role::Moderator.has_permission(Permission::ManageVerifications));
        assert!(!Role::Moderator.has_permission(Permission::GrantRole));
        for role in [Role::User, Role::Verifier, Role::Moderator] {
            for permission in role.permissions() {
                assert!(Role::Admin.has_permission(*permission));
            }
        }
        assert_eq!(Permission::GrantRole.to_string(), "grant_role");
    }

    #[test]
    fn test_grant_admin_twice_fails() {
        let (registry, admin) = setup();
        let registry = registry.grant_role(&grant(addr('B'), Role::Admin), &admin).unwrap();
        let err = registry
            .grant_role(&grant(addr('B'), Role::Admin), &admin)
            .unwrap_err();
        assert!(matches!(err, GhostSpeakError::RoleAlreadyAssigned { .. }));
    }

    #[test]
    fn test_cannot_revoke_own_role() {
        let (registry, admin) = setup();
        let err = registry.revoke_role(&addr('A'), Role::Admin, &admin).unwrap_err();
        assert!(matches!(err, GhostSpeakError::CannotRevokeOwnRole { .. }));
    }

    #[test]
    fn test_grant_requires_permission() {
        let (registry, admin) = setup();
        let registry = registry.grant_role(&grant(addr('M'), Role::Moderator), &admin).unwrap();
        let moderator = CallContext::new(addr('M'), admin.now);
        let err = registry
            .grant_role(&grant(addr('C'), Role::User), &moderator)
            .unwrap_err();
        assert!(matches!(err, GhostSpeakError::MissingPermission { .. }));
    }

    #[test]
    fn test_revoke_role() {
        let (registry, admin) = setup();
        let registry = registry.grant_role(&grant(addr('V'), Role::Verifier), &admin).unwrap();
        let registry = registry.revoke_role(&addr('V'), Role::Verifier, &admin).unwrap();
        assert_eq!(registry.effective_role(&addr('V'), admin.now), None);

        let err = registry.revoke_role(&addr('V'), Role::Verifier, &admin).unwrap_err();
        assert!(matches!(err, GhostSpeakError::RoleNotFound { .. }));

        // Regrant after revocation is allowed
        assert!(registry.grant_role(&grant(addr('V'), Role::Verifier), &admin).is_ok());
    }

    #[test]
    fn test_effective_role_and_permission_union() {
        let (registry, admin) = setup();
        let registry = registry.grant_role(&grant(addr('B'), Role::User), &admin).unwrap();
        let registry = registry.grant_role(&grant(addr('B'), Role::Verifier), &admin).unwrap();
        assert_eq!(registry.effective_role(&addr('B'), admin.now), Some(Role::Verifier));
        let permissions = registry.permissions(&addr('B'), admin.now);
        assert!(permissions.contains(&Permission::Vote));
        assert!(permissions.contains(&Permission::VerifyAgent));
        assert_eq!(permissions.len(), 2);
    }

    #[test]
    fn test_expired_assignment_is_inactive() {
        let (registry, admin) = setup();
        let request = GrantRoleRequest {
            address: addr('B'),
            role: Role::Moderator,
            expires_at: Some(admin.now + Duration::days(7)),
        };
        let registry = registry.grant_role(&request, &admin).unwrap();
        assert_eq!(registry.effective_role(&addr('B'), admin.now), Some(Role::Moderator));

        let later = admin.now + Duration::days(8);
        // Flag is still set, expiry wins
        assert!(registry.assignments()[1].active);
        assert_eq!(registry.effective_role(&addr('B'), later), None);
        assert!(!registry.has_permission(&addr('B'), Permission::CreateProposal, later));

        // An expired assignment does not block a fresh grant
        assert!(registry.grant_role(&request_at(later), &admin.at(later)).is_ok());

        let (swept, count) = registry.sweep_expired(later);
        assert_eq!(count, 1);
        assert!(!swept.assignments()[1].active);
        assert!(swept.assignments()[0].active);
    }

    fn request_at(now: DateTime<Utc>) -> GrantRoleRequest {
        GrantRoleRequest {
            address: addr('B'),
            role: Role::Moderator,
            expires_at: Some(now + Duration::days(7)),
        }
    }

    #[test]
    fn test_prune_inactive() {
        let (registry, admin) = setup();
        let registry = registry.grant_role(&grant(addr('V'), Role::Verifier), &admin).unwrap();
        let registry = registry.revoke_role(&addr('V'), Role::Verifier, &admin).unwrap();
        let registry = registry.grant_role(&request_at(admin.now), &admin).unwrap();
        assert_eq!(registry.assignments().len(), 3);

        let (pruned, count) = registry.prune_inactive(admin.now + Duration::days(8));
        assert_eq!(count, 2);
        assert_eq!(pruned.assignments().len(), 1);
        assert_eq!(pruned.effective_role(&addr('A'), admin.now), Some(Role::Admin));
    }

    #[test]
    fn test_registry_serde() {
        let (registry, admin) = setup();
        let registry = registry.grant_role(&grant(addr('M'), Role::Moderator), &admin).unwrap();

        assert_eq!(serde_json::to_string(&Role::Moderator).unwrap(), "\"moderator\"");
        assert_eq!(Role::default(), Role::User);
        let raw = serde_json::to_string(&registry).unwrap();
        let decoded: RoleRegistry = serde_json::from_str(&raw).unwrap();
        assert_eq!(decoded, registry);
    }

    #[test]
    fn test_past_expiry_rejected() {
        let (registry, admin) = setup();
        let request = GrantRoleRequest {
            address: addr('B'),
            role: Role::User,
            expires_at: Some(admin.now - Duration::seconds(1)),
        };
        assert!(registry.grant_role(&request, &admin).is_err());
    }
}
