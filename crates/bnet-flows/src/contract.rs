//! Contract rules for membership and relationship group transitions
//!
//! A transition is checked against its intent tag. Membership changes other
//! than the creator's own bootstrap steps must carry an authorising reference:
//! an ACTIVE membership of the same network, holding the matching permission,
//! whose owner proposes and signs the transition.
//!
//! Bootstrap steps are reserved for a network's founding membership: the
//! validating node must see no other membership of that network.

use async_trait::async_trait;
use bnet_core::{
    BnError, Command, ContractValidator, LedgerState, MembershipQuery, MembershipRecord,
    MembershipStatus, Permission, ProposedTransition, RelationshipGroup, Result, Role,
    TransitionBody,
};

/// Validator enforcing the business network membership rules
#[derive(Debug, Clone, Copy, Default)]
pub struct BusinessNetworkContract;

impl BusinessNetworkContract {
    /// Create the validator
    pub fn new() -> Self {
        Self
    }
}

/// Rule check scoped to one command
struct Check<'a> {
    body: &'a TransitionBody,
}

impl<'a> Check<'a> {
    fn ensure(&self, condition: bool, reason: &str) -> Result<()> {
        if condition {
            Ok(())
        } else {
            Err(BnError::invalid_transition(self.body.command, reason))
        }
    }

    fn output_membership(&self) -> Result<&'a MembershipRecord> {
        match &self.body.output {
            LedgerState::Membership(record) => Ok(record),
            other => Err(BnError::invalid_transition(
                self.body.command,
                format!("output must be a membership, found {}", other.type_name()),
            )),
        }
    }

    fn output_group(&self) -> Result<&'a RelationshipGroup> {
        match &self.body.output {
            LedgerState::Group(group) => Ok(group),
            other => Err(BnError::invalid_transition(
                self.body.command,
                format!("output must be a relationship group, found {}", other.type_name()),
            )),
        }
    }

    fn input_membership(&self) -> Result<&'a MembershipRecord> {
        let input = self
            .body
            .input
            .as_ref()
            .ok_or_else(|| BnError::invalid_transition(self.body.command, "prior version required"))?;
        input.state.as_membership().ok_or_else(|| {
            BnError::invalid_transition(self.body.command, "prior version must be a membership")
        })
    }

    /// Input and output are versions of the same membership
    fn same_membership(&self, input: &MembershipRecord, output: &MembershipRecord) -> Result<()> {
        self.ensure(
            input.membership_id == output.membership_id,
            "membership id cannot change",
        )?;
        self.ensure(input.network_id == output.network_id, "network cannot change")?;
        self.ensure(input.owner() == output.owner(), "owning party cannot change")?;
        self.ensure(input.issued == output.issued, "issuance time cannot change")?;
        self.ensure(
            input.participants == output.participants,
            "participants cannot change",
        )
    }

    fn owner_signs(&self, record: &MembershipRecord) -> Result<()> {
        self.ensure(
            self.body.required_signers.contains(record.owner()),
            "membership owner must sign",
        )
    }

    fn proposed_by_owner(&self, record: &MembershipRecord) -> bool {
        &self.body.proposer == record.owner()
    }

    /// Find the reference membership that authorises this change
    fn authorised_by(&self, network: &MembershipRecord, permission: Permission) -> Result<&'a MembershipRecord> {
        self.body
            .references
            .iter()
            .filter_map(|reference| reference.state.as_membership())
            .find(|reference| {
                reference.is_active()
                    && reference.network_id == network.network_id
                    && reference.has_permission(permission)
                    && reference.owner() == &self.body.proposer
                    && self.body.required_signers.contains(reference.owner())
            })
            .ok_or_else(|| {
                BnError::invalid_transition(
                    self.body.command,
                    format!(
                        "{} lacks an active membership of {} with {permission:?}",
                        self.body.proposer, network.network_id
                    ),
                )
            })
    }
}

impl BusinessNetworkContract {
    /// Rules that depend only on the transition itself
    fn check_rules(&self, transition: &ProposedTransition) -> Result<()> {
        let check = Check {
            body: transition.body(),
        };
        match transition.command() {
            Command::RequestMembership => {
                let output = check.output_membership()?;
                check.ensure(check.body.input.is_none(), "request cannot consume a prior version")?;
                check.ensure(output.status == MembershipStatus::Pending, "requested membership must be PENDING")?;
                check.ensure(output.roles.is_empty(), "requested membership cannot carry roles")?;
                check.ensure(
                    output.participants.contains(output.owner()),
                    "owner must participate in its membership",
                )?;
                check.owner_signs(output)
            }
            Command::ActivateMembership { bootstrap } => {
                let input = check.input_membership()?;
                let output = check.output_membership()?;
                check.same_membership(input, output)?;
                check.ensure(
                    matches!(input.status, MembershipStatus::Pending | MembershipStatus::Suspended),
                    "only PENDING or SUSPENDED memberships can be activated",
                )?;
                check.ensure(output.status == MembershipStatus::Active, "output must be ACTIVE")?;
                check.ensure(input.roles == output.roles, "activation cannot change roles")?;
                if bootstrap {
                    check.ensure(
                        input.status == MembershipStatus::Pending && check.proposed_by_owner(input),
                        "bootstrap activation is the owner activating its own pending membership",
                    )?;
                    check.owner_signs(output)
                } else {
                    check.authorised_by(input, Permission::ActivateMembership).map(|_| ())
                }
            }
            Command::SuspendMembership => {
                let input = check.input_membership()?;
                let output = check.output_membership()?;
                check.same_membership(input, output)?;
                check.ensure(input.status == MembershipStatus::Active, "only ACTIVE memberships can be suspended")?;
                check.ensure(output.status == MembershipStatus::Suspended, "output must be SUSPENDED")?;
                check.ensure(input.roles == output.roles, "suspension cannot change roles")?;
                check.authorised_by(input, Permission::SuspendMembership).map(|_| ())
            }
            Command::RevokeMembership => {
                let input = check.input_membership()?;
                let output = check.output_membership()?;
                check.same_membership(input, output)?;
                check.ensure(input.status != MembershipStatus::Revoked, "membership already REVOKED")?;
                check.ensure(output.status == MembershipStatus::Revoked, "output must be REVOKED")?;
                check.authorised_by(input, Permission::RevokeMembership).map(|_| ())
            }
            Command::ModifyRoles { bootstrap } => {
                let input = check.input_membership()?;
                let output = check.output_membership()?;
                check.same_membership(input, output)?;
                check.ensure(input.is_active(), "roles can only be granted to ACTIVE memberships")?;
                check.ensure(output.is_active(), "role change cannot change status")?;
                check.ensure(input.roles != output.roles, "role set unchanged")?;
                if bootstrap {
                    check.ensure(
                        check.proposed_by_owner(input)
                            && input.roles.is_empty()
                            && output.roles.len() == 1
                            && output.roles.contains(&Role::admin()),
                        "bootstrap authorisation grants the admin role to the owner's unprivileged membership",
                    )?;
                    check.owner_signs(output)
                } else {
                    check.authorised_by(input, Permission::ModifyRoles).map(|_| ())
                }
            }
            Command::ModifyBusinessIdentity => {
                let input = check.input_membership()?;
                let output = check.output_membership()?;
                check.same_membership(input, output)?;
                check.ensure(input.is_active(), "business identity changes need an ACTIVE membership")?;
                check.ensure(
                    input.status == output.status && input.roles == output.roles,
                    "only the business identity may change",
                )?;
                check.ensure(
                    input.identity.business_identity != output.identity.business_identity,
                    "business identity unchanged",
                )?;
                if check.proposed_by_owner(input) {
                    check.owner_signs(output)
                } else {
                    check.authorised_by(input, Permission::ModifyBusinessIdentity).map(|_| ())
                }
            }
            Command::IssueGroup => {
                let group = check.output_group()?;
                check.ensure(check.body.input.is_none(), "group issuance cannot consume a prior version")?;
                check.ensure(group.member_of.contains(&group.group_id), "group must list its own id")?;
                check.ensure(
                    group.participants.contains(&check.body.proposer),
                    "issuer must participate in the group",
                )?;
                let authority = check
                    .body
                    .references
                    .iter()
                    .filter_map(|reference| reference.state.as_membership())
                    .find(|reference| reference.membership_id == group.membership_id)
                    .ok_or_else(|| {
                        BnError::invalid_transition(
                            Command::IssueGroup,
                            format!("authorising membership {} not referenced", group.membership_id),
                        )
                    })?;
                check.ensure(authority.is_active(), "authorising membership must be ACTIVE")?;
                check.ensure(
                    authority.has_permission(Permission::ModifyGroups),
                    "authorising membership lacks ModifyGroups",
                )?;
                check.owner_signs(authority)
            }
        }
    }

    /// Fail unless the input is the only membership of its network
    async fn ensure_founding(
        &self,
        transition: &ProposedTransition,
        ledger: &dyn MembershipQuery,
    ) -> Result<()> {
        let check = Check {
            body: transition.body(),
        };
        let input = check.input_membership()?;
        let others = ledger
            .query_memberships(&input.network_id, &MembershipStatus::all())
            .await?
            .into_iter()
            .filter(|record| record.membership_id != input.membership_id)
            .count();
        check.ensure(
            others == 0,
            "bootstrap steps are reserved for the founding membership of a network",
        )
    }
}

#[async_trait]
impl ContractValidator for BusinessNetworkContract {
    async fn validate(
        &self,
        transition: &ProposedTransition,
        ledger: &dyn MembershipQuery,
    ) -> Result<()> {
        self.check_rules(transition)?;
        match transition.command() {
            Command::ActivateMembership { bootstrap: true }
            | Command::ModifyRoles { bootstrap: true } => {
                self.ensure_founding(transition, ledger).await
            }
            _ => Ok(()),
        }
    }
}
