//! Relationship groups

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::identifiers::{GroupId, MembershipId, PartyId};

/// Named grouping of memberships within a network
///
/// Created once, when an authorised membership first requests group
/// formation. `member_of` always contains `group_id` itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipGroup {
    /// Group identity
    pub group_id: GroupId,
    /// Human readable name
    pub name: Option<String>,
    /// Membership this relationship belongs to
    pub membership_id: MembershipId,
    /// Groups the membership belongs to
    pub member_of: BTreeSet<GroupId>,
    /// Parties storing the record
    pub participants: Vec<PartyId>,
    /// Issuance timestamp
    pub issued: DateTime<Utc>,
}

impl RelationshipGroup {
    /// Default group for a freshly authorised membership
    pub fn default_for(
        membership_id: MembershipId,
        group_id: GroupId,
        name: Option<String>,
        issuer: PartyId,
        now: DateTime<Utc>,
    ) -> Self {
        let member_of = [group_id.clone()].into_iter().collect();
        Self {
            group_id,
            name,
            membership_id,
            member_of,
            participants: vec![issuer],
            issued: now,
        }
    }
}
