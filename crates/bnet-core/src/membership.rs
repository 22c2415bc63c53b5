//! Membership records, statuses and roles
//!
//! A [`MembershipRecord`] is one immutable version of a party's membership in
//! a network. Status changes and role grants never mutate a record in place:
//! the helpers below return the next version, which only becomes current once
//! it is committed consuming the previous one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::identifiers::{MembershipId, NetworkId, PartyId};

/// Lifecycle status of a membership version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MembershipStatus {
    /// Self-issued or requested, not yet admitted
    Pending,
    /// Admitted and able to transact within the network
    Active,
    /// Temporarily barred; may be re-activated
    Suspended,
    /// Permanently removed
    Revoked,
}

impl MembershipStatus {
    /// Statuses that still count as belonging to the network
    pub fn live() -> BTreeSet<MembershipStatus> {
        [Self::Pending, Self::Active, Self::Suspended]
            .into_iter()
            .collect()
    }

    /// Every status, revoked included
    pub fn all() -> BTreeSet<MembershipStatus> {
        [Self::Pending, Self::Active, Self::Suspended, Self::Revoked]
            .into_iter()
            .collect()
    }
}

impl fmt::Display for MembershipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "PENDING",
            Self::Active => "ACTIVE",
            Self::Suspended => "SUSPENDED",
            Self::Revoked => "REVOKED",
        };
        f.write_str(label)
    }
}

/// Individual administrative capability carried by a role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Permission {
    /// Activate pending or suspended memberships
    ActivateMembership,
    /// Suspend memberships
    SuspendMembership,
    /// Revoke memberships
    RevokeMembership,
    /// Change the roles of other memberships
    ModifyRoles,
    /// Change the business identity attached to a membership
    ModifyBusinessIdentity,
    /// Create and modify relationship groups
    ModifyGroups,
}

impl Permission {
    /// Every permission, in declaration order
    pub const ALL: [Permission; 6] = [
        Permission::ActivateMembership,
        Permission::SuspendMembership,
        Permission::RevokeMembership,
        Permission::ModifyRoles,
        Permission::ModifyBusinessIdentity,
        Permission::ModifyGroups,
    ];
}

/// Named capability grant attached to a membership version
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Role {
    /// Role name
    pub name: String,
    /// Permissions granted by the role
    pub permissions: BTreeSet<Permission>,
}

impl Role {
    /// Name of the administrative role granted to a network's creator
    pub const ADMIN: &'static str = "admin";

    /// Create a role with the given permissions
    pub fn new(name: impl Into<String>, permissions: impl IntoIterator<Item = Permission>) -> Self {
        Self {
            name: name.into(),
            permissions: permissions.into_iter().collect(),
        }
    }

    /// Administrative authority over the network
    pub fn admin() -> Self {
        Self::new(Self::ADMIN, Permission::ALL)
    }

    /// Whether this role is the administrative role
    pub fn is_admin(&self) -> bool {
        self.name == Self::ADMIN
    }
}

/// Opaque business identity payload attached to a membership
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusinessIdentity(pub serde_json::Value);

/// Ledger identity plus optional business identity of a member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipIdentity {
    /// Party owning the membership
    pub party: PartyId,
    /// Application-defined identity payload
    pub business_identity: Option<BusinessIdentity>,
}

/// One immutable version of a membership
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipRecord {
    /// Linear id shared by all versions of this membership
    pub membership_id: MembershipId,
    /// Owner identity
    pub identity: MembershipIdentity,
    /// Network the membership belongs to
    pub network_id: NetworkId,
    /// Lifecycle status
    pub status: MembershipStatus,
    /// Roles granted to this version
    pub roles: BTreeSet<Role>,
    /// Parties that store and observe this record
    pub participants: Vec<PartyId>,
    /// When the first version was issued
    pub issued: DateTime<Utc>,
    /// When this version was produced
    pub modified: DateTime<Utc>,
}

impl MembershipRecord {
    /// Self-issued pending membership owned by `party`
    pub fn pending(
        membership_id: MembershipId,
        party: PartyId,
        network_id: NetworkId,
        business_identity: Option<BusinessIdentity>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            membership_id,
            identity: MembershipIdentity {
                party: party.clone(),
                business_identity,
            },
            network_id,
            status: MembershipStatus::Pending,
            roles: BTreeSet::new(),
            participants: vec![party],
            issued: now,
            modified: now,
        }
    }

    /// Party owning this membership
    pub fn owner(&self) -> &PartyId {
        &self.identity.party
    }

    /// Next version with a different status
    pub fn with_status(&self, status: MembershipStatus, now: DateTime<Utc>) -> Self {
        Self {
            status,
            modified: now,
            ..self.clone()
        }
    }

    /// Next version with a replaced role set
    pub fn with_roles(&self, roles: BTreeSet<Role>, now: DateTime<Utc>) -> Self {
        Self {
            roles,
            modified: now,
            ..self.clone()
        }
    }

    /// Next version with a replaced business identity
    pub fn with_business_identity(
        &self,
        business_identity: Option<BusinessIdentity>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut next = self.clone();
        next.identity.business_identity = business_identity;
        next.modified = now;
        next
    }

    /// Whether the membership is active
    pub fn is_active(&self) -> bool {
        self.status == MembershipStatus::Active
    }

    /// Whether any granted role carries the permission
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.roles
            .iter()
            .any(|role| role.permissions.contains(&permission))
    }

    /// Whether the administrative role has been granted
    pub fn is_authorised(&self) -> bool {
        self.roles.iter().any(Role::is_admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> MembershipRecord {
        MembershipRecord::pending(
            MembershipId::new(),
            PartyId::new("O=BNO_0,L=New York,C=US"),
            NetworkId::new("NET-1"),
            None,
            Utc::now(),
        )
    }

    #[test]
    fn test_pending_record_is_self_participant() {
        let pending = record();
        assert_eq!(pending.status, MembershipStatus::Pending);
        assert_eq!(pending.participants, vec![pending.owner().clone()]);
        assert!(pending.roles.is_empty());
    }

    #[test]
    fn test_versions_keep_identity() {
        let pending = record();
        let later = pending.modified + chrono::Duration::seconds(5);
        let active = pending.with_status(MembershipStatus::Active, later);
        let authorised = active.with_roles([Role::admin()].into_iter().collect(), later);

        assert_eq!(authorised.membership_id, pending.membership_id);
        assert_eq!(authorised.issued, pending.issued);
        assert!(authorised.is_active());
        assert!(authorised.is_authorised());
        assert!(authorised.has_permission(Permission::ModifyGroups));
        assert!(!active.has_permission(Permission::ModifyGroups));
    }
}
