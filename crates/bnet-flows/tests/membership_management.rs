//! Membership changes after a network exists

use assert_matches::assert_matches;
use bnet_core::{
    BnError, BusinessIdentity, GroupId, MembershipId, MembershipStatus, NetworkId, Permission,
    Role, VaultStore,
};
use bnet_flows::{CreateNetworkRequest, MemoryVault, NetworkCreated};
use bnet_testkit::{init_test_tracing, TestNetwork, TestNode};
use serde_json::json;
use std::collections::BTreeSet;

const BNO: &str = "O=BNO,L=New York,C=US";
const ALICE: &str = "O=Alice Corp,L=Madrid,C=ES";
const BOB: &str = "O=Bob Plc,L=Rome,C=IT";
const MALLORY: &str = "O=Mallory Ltd,L=Valletta,C=MT";

struct Fixture {
    network: TestNetwork,
    bno: TestNode,
    created: NetworkCreated,
}

impl Fixture {
    async fn new() -> Self {
        init_test_tracing();
        let network = TestNetwork::new();
        let bno = network.node(BNO);
        let created = bno
            .orchestrator()
            .start(CreateNetworkRequest::new("NET-1").with_group("GRP-1", "Initial"))
            .await
            .unwrap();
        Self {
            network,
            bno,
            created,
        }
    }

    fn network_id(&self) -> NetworkId {
        self.created.network_id.clone()
    }

    /// A node reading the operator's vault
    fn member(&self, legal_name: &str) -> TestNode {
        let vault = self.bno.vault().clone();
        self.network.node_with(legal_name, |builder| builder.with_vault(vault))
    }

    async fn request(&self, member: &TestNode) -> MembershipId {
        let membership_id = MembershipId::new();
        member
            .memberships()
            .request_membership(membership_id, member.party().clone(), self.network_id(), None)
            .await
            .unwrap();
        membership_id
    }

    async fn admit(&self, member: &TestNode) -> MembershipId {
        let membership_id = self.request(member).await;
        self.bno.memberships().activate(membership_id).await.unwrap();
        membership_id
    }

    async fn status(&self, membership_id: MembershipId) -> MembershipStatus {
        let current = self.bno.memberships().current(membership_id).await.unwrap();
        current.membership().unwrap().status
    }
}

#[tokio::test]
async fn test_operator_drives_full_lifecycle() {
    let fixture = Fixture::new().await;
    let alice = fixture.member(ALICE);
    let alice_id = fixture.request(&alice).await;
    assert_eq!(fixture.status(alice_id).await, MembershipStatus::Pending);

    let memberships = fixture.bno.memberships();
    memberships.activate(alice_id).await.unwrap();
    assert_eq!(fixture.status(alice_id).await, MembershipStatus::Active);
    memberships.suspend(alice_id).await.unwrap();
    assert_eq!(fixture.status(alice_id).await, MembershipStatus::Suspended);
    memberships.activate(alice_id).await.unwrap();
    assert_eq!(fixture.status(alice_id).await, MembershipStatus::Active);
    let revoked = memberships.revoke(alice_id).await.unwrap();
    assert_eq!(revoked.membership().unwrap().status, MembershipStatus::Revoked);

    let live = memberships
        .query(&fixture.network_id(), &MembershipStatus::live())
        .await
        .unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].owner(), fixture.bno.party());

    let revoked = memberships
        .query(&fixture.network_id(), &BTreeSet::from([MembershipStatus::Revoked]))
        .await
        .unwrap();
    assert_eq!(revoked.len(), 1);
    assert_eq!(revoked[0].membership_id, alice_id);

    let history = fixture.bno.vault().membership_history(alice_id).await.unwrap();
    assert_eq!(history.len(), 5);
}

#[tokio::test]
async fn test_outsider_cannot_bootstrap_into_existing_network() {
    let fixture = Fixture::new().await;
    let mallory = fixture.member(MALLORY);
    let bno_id = fixture.created.membership.membership_id().unwrap();

    let pending = mallory
        .memberships()
        .issue_pending(MembershipId::new(), fixture.network_id(), None)
        .await
        .unwrap();
    let mallory_id = pending.membership_id().unwrap();

    let err = mallory.memberships().activate_own(&pending).await.unwrap_err();
    assert_matches!(err, BnError::InvalidTransition { ref command, .. } if command == "ActivateMembership");
    assert_eq!(fixture.status(mallory_id).await, MembershipStatus::Pending);

    let err = mallory.memberships().suspend(bno_id).await.unwrap_err();
    assert_matches!(err, BnError::InvalidTransition { .. });
    assert_eq!(fixture.status(bno_id).await, MembershipStatus::Active);
}

#[tokio::test]
async fn test_admitted_member_cannot_grant_itself_admin() {
    let fixture = Fixture::new().await;
    let alice = fixture.member(ALICE);
    let alice_id = fixture.admit(&alice).await;
    let active = alice.memberships().current(alice_id).await.unwrap();

    let err = alice.memberships().authorise_own(&active).await.unwrap_err();

    assert_matches!(err, BnError::InvalidTransition { ref command, .. } if command == "ModifyRoles");
    let current = fixture.bno.memberships().current(alice_id).await.unwrap();
    assert!(current.membership().unwrap().roles.is_empty());
}

#[tokio::test]
async fn test_member_without_permission_cannot_suspend() {
    let fixture = Fixture::new().await;
    let alice = fixture.member(ALICE);
    let bob = fixture.member(BOB);
    fixture.admit(&alice).await;
    let bob_id = fixture.admit(&bob).await;

    let err = alice.memberships().suspend(bob_id).await.unwrap_err();

    assert_matches!(err, BnError::InvalidTransition { ref command, .. } if command == "SuspendMembership");
    assert_eq!(fixture.status(bob_id).await, MembershipStatus::Active);
}

#[tokio::test]
async fn test_granted_role_lets_member_suspend() {
    let fixture = Fixture::new().await;
    let alice = fixture.member(ALICE);
    let bob = fixture.member(BOB);
    let alice_id = fixture.admit(&alice).await;
    let bob_id = fixture.admit(&bob).await;

    let operator = Role::new("operator", [Permission::SuspendMembership]);
    let updated = fixture
        .bno
        .memberships()
        .modify_roles(alice_id, BTreeSet::from([operator.clone()]))
        .await
        .unwrap();
    assert_eq!(updated.membership().unwrap().roles, BTreeSet::from([operator]));

    alice.memberships().suspend(bob_id).await.unwrap();
    assert_eq!(fixture.status(bob_id).await, MembershipStatus::Suspended);

    // Suspension does not extend to revocation
    let err = alice.memberships().revoke(bob_id).await.unwrap_err();
    assert_matches!(err, BnError::InvalidTransition { .. });
}

#[tokio::test]
async fn test_roles_cannot_be_granted_to_pending_membership() {
    let fixture = Fixture::new().await;
    let alice = fixture.member(ALICE);
    let alice_id = fixture.request(&alice).await;

    let err = fixture
        .bno
        .memberships()
        .modify_roles(alice_id, BTreeSet::from([Role::admin()]))
        .await
        .unwrap_err();

    assert_matches!(err, BnError::InvalidTransition { ref command, .. } if command == "ModifyRoles");
    assert_eq!(fixture.status(alice_id).await, MembershipStatus::Pending);
}

#[tokio::test]
async fn test_stale_prior_version_conflicts() {
    let fixture = Fixture::new().await;
    let alice = fixture.member(ALICE);
    let alice_id = fixture.request(&alice).await;

    // Snapshot of the operator's view before the activation lands
    let stale = MemoryVault::new();
    let bno_id = fixture.created.membership.membership_id().unwrap();
    for membership_id in [bno_id, alice_id] {
        for version in fixture.bno.vault().membership_history(membership_id).await.unwrap() {
            stale.record(&version).await.unwrap();
        }
    }
    fixture.bno.memberships().activate(alice_id).await.unwrap();

    let lagging = fixture
        .network
        .node_with(BNO, |builder| builder.with_vault(stale.clone()));
    let err = lagging.memberships().activate(alice_id).await.unwrap_err();

    assert!(err.requires_state_refresh());
    let consumed_by = assert_matches!(err, BnError::Conflict { consumed_by, .. } => consumed_by);
    let current = fixture.bno.memberships().current(alice_id).await.unwrap();
    assert_eq!(current.state_ref.tx_id, consumed_by);
    // The stale vault is untouched
    assert_eq!(stale.membership_history(alice_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_owner_updates_own_business_identity() {
    let fixture = Fixture::new().await;
    let alice = fixture.member(ALICE);
    let alice_id = fixture.admit(&alice).await;

    let identity = BusinessIdentity(json!({ "lei": "5493001KJTIIGC8Y1R12", "sector": "logistics" }));
    let updated = alice
        .memberships()
        .modify_business_identity(alice_id, Some(identity.clone()))
        .await
        .unwrap();

    let record = updated.membership().unwrap();
    assert_eq!(record.identity.business_identity, Some(identity));
    assert_eq!(record.status, MembershipStatus::Active);
    assert_eq!(record.roles, BTreeSet::new());
}

#[tokio::test]
async fn test_unreachable_member_blocks_change() {
    let fixture = Fixture::new().await;
    let alice = fixture.member(ALICE);
    let alice_id = fixture.admit(&alice).await;
    let before = fixture.bno.memberships().current(alice_id).await.unwrap();

    fixture.network.signer().remove_identity(alice.party());
    let err = fixture.bno.memberships().suspend(alice_id).await.unwrap_err();

    assert_matches!(err, BnError::Signature { ref party, .. } if party == alice.party());
    let after = fixture.bno.memberships().current(alice_id).await.unwrap();
    assert_eq!(after, before);
}

#[tokio::test]
async fn test_default_group_issuance_is_not_idempotent() {
    let fixture = Fixture::new().await;
    let bno_id = fixture.created.membership.membership_id().unwrap();
    let groups = fixture.bno.groups();

    let first = groups
        .create_default_group(bno_id, GroupId::new("GRP-2"), Some("Second".to_string()))
        .await
        .unwrap();
    let second = groups
        .create_default_group(bno_id, GroupId::new("GRP-2"), Some("Second".to_string()))
        .await
        .unwrap();

    assert_ne!(first.state_ref, second.state_ref);
    let issued = fixture.bno.vault().groups_for_membership(bno_id).await.unwrap();
    assert_eq!(issued.len(), 3);
}
