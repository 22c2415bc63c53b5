//! Network creation saga, end to end

use assert_matches::assert_matches;
use bnet_consensus::SerialFilterSlot;
use bnet_core::{
    BnError, Command, ConsensusService, MembershipQuery, MembershipStatus, NetworkId, NodeConfig,
    Role, VaultStore,
};
use bnet_flows::{
    BusinessNetworkContract, CreateNetworkRequest, MemoryVault, NodeBuilder, SagaStep,
};
use bnet_testkit::transitions::party_identity;
use bnet_testkit::{
    init_test_tracing, DecliningSigner, DelayedConsensus, FlakySagaStore, LogCapture,
    RejectingValidator, TestNetwork,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

const BNO: &str = "O=BNO,L=New York,C=US";
const OTHER_BNO: &str = "O=Other BNO,L=Frankfurt,C=DE";

fn net1() -> CreateNetworkRequest {
    CreateNetworkRequest::new("NET-1").with_group("GRP-1", "Initial")
}

#[tokio::test]
async fn test_creates_authorised_membership_and_default_group() {
    init_test_tracing();
    let network = TestNetwork::new();
    let node = network.node(BNO);

    let created = node.orchestrator().start(net1()).await.unwrap();

    let membership = created.membership.membership().unwrap();
    assert_eq!(created.network_id, NetworkId::new("NET-1"));
    assert_eq!(membership.status, MembershipStatus::Active);
    assert_eq!(membership.roles, BTreeSet::from([Role::admin()]));
    assert_eq!(membership.owner(), node.party());

    let group = created.group.group().unwrap();
    assert_eq!(group.group_id.as_str(), "GRP-1");
    assert_eq!(group.name.as_deref(), Some("Initial"));
    assert_eq!(group.membership_id, membership.membership_id);

    let live = node
        .vault()
        .query_memberships(&NetworkId::new("NET-1"), &MembershipStatus::live())
        .await
        .unwrap();
    assert_eq!(live.len(), 1);

    let history = node.vault().membership_history(membership.membership_id).await.unwrap();
    let statuses: Vec<_> = history
        .iter()
        .map(|version| version.membership().unwrap().status)
        .collect();
    assert_eq!(
        statuses,
        vec![MembershipStatus::Pending, MembershipStatus::Active, MembershipStatus::Active]
    );
    assert!(history[1].membership().unwrap().roles.is_empty());

    let groups = node.vault().groups_for_membership(membership.membership_id).await.unwrap();
    assert_eq!(groups.len(), 1);

    let saga = node.orchestrator().saga(created.saga_id).await.unwrap();
    assert_eq!(saga.cursor, SagaStep::GroupCreated);
    assert!(saga.is_terminal());
}

#[tokio::test]
async fn test_generated_identifiers_when_request_is_empty() {
    let network = TestNetwork::new();
    let node = network.node(BNO);

    let created = node
        .orchestrator()
        .start(CreateNetworkRequest::default())
        .await
        .unwrap();

    assert!(!created.network_id.as_str().is_empty());
    assert_eq!(created.group.group().unwrap().name, None);
    assert!(node.vault().network_exists(&created.network_id).await.unwrap());
}

#[tokio::test]
async fn test_sequential_duplicate_rejected_before_any_write() {
    let network = TestNetwork::new();
    let node = network.node(BNO);
    node.orchestrator().start(net1()).await.unwrap();
    let outputs = node.vault().len().await;

    let err = node.orchestrator().start(net1()).await.unwrap_err();

    assert_matches!(err, BnError::DuplicateNetwork { ref network_id } if network_id.as_str() == "NET-1");
    assert_eq!(node.vault().len().await, outputs);

    let failed = node
        .orchestrator()
        .sagas()
        .await
        .unwrap()
        .into_iter()
        .find(|saga| saga.failure.is_some())
        .unwrap();
    assert_eq!(failed.cursor, SagaStep::Start);
    assert!(failed.is_terminal());

    let err = node.orchestrator().resume(failed.id).await.unwrap_err();
    assert_matches!(err, BnError::DuplicateNetwork { .. });
}

/// The guard is a local read, so two nodes that have not seen each other's
/// commits both create NET-1. This records current behaviour, not intent.
#[tokio::test]
async fn test_concurrent_duplicate_on_two_nodes_both_commit() {
    let network = TestNetwork::new();
    let first = network.node(BNO);
    let second = network.node(OTHER_BNO);

    let (a, b) = tokio::join!(
        first.orchestrator().start(net1()),
        second.orchestrator().start(net1())
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.network_id, b.network_id);
    assert_ne!(a.membership.membership_id(), b.membership.membership_id());
    assert_eq!(a.group.group().unwrap().group_id, b.group.group().unwrap().group_id);
}

#[tokio::test]
async fn test_spawned_creations_complete_independently() {
    let network = TestNetwork::new();
    let node = network.node(BNO);

    let handles: Vec<_> = (0..5)
        .map(|i| {
            let request = CreateNetworkRequest::new(format!("NET-{i}").as_str())
                .with_group("GRP-1", "Initial");
            node.orchestrator().spawn(request)
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let created = handle.await.unwrap().unwrap();
        assert_eq!(created.network_id, NetworkId::new(format!("NET-{i}")));
        let live = node
            .vault()
            .query_memberships(&created.network_id, &MembershipStatus::live())
            .await
            .unwrap();
        assert_eq!(live.len(), 1);
    }
}

#[tokio::test]
async fn test_versions_form_one_chain_for_every_observer() {
    let network = TestNetwork::new();
    let node = network.node(BNO);
    let created = node.orchestrator().start(net1()).await.unwrap();
    let membership_id = created.membership.membership_id().unwrap();

    let history = node.vault().membership_history(membership_id).await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].input, None);
    for pair in history.windows(2) {
        assert_eq!(pair[1].input, Some(pair[0].state_ref));
        assert!(pair[1].proof.sequence > pair[0].proof.sequence);
    }

    // An observer receiving the versions out of order sees the same sequence
    let observer = MemoryVault::new();
    for version in history.iter().rev() {
        observer.record(version).await.unwrap();
    }
    assert_eq!(observer.membership_history(membership_id).await.unwrap(), history);
    assert_eq!(
        observer.latest_membership(membership_id).await.unwrap(),
        Some(created.membership.clone())
    );
}

#[tokio::test]
async fn test_role_failure_leaves_active_membership_without_role_or_group() {
    init_test_tracing();
    let network = TestNetwork::new();
    let validator = Arc::new(RejectingValidator::rejecting(
        Arc::new(BusinessNetworkContract::new()),
        "ModifyRoles",
    ));
    let node = network.node_with(BNO, |builder| builder.with_validator(validator.clone()));

    let err = node.orchestrator().start(net1()).await.unwrap_err();
    assert_matches!(err, BnError::InvalidTransition { ref command, .. } if command == "ModifyRoles");
    assert_eq!(validator.rejections(), 1);

    let active = node
        .vault()
        .query_memberships(&NetworkId::new("NET-1"), &BTreeSet::from([MembershipStatus::Active]))
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
    assert!(active[0].roles.is_empty());
    let groups = node
        .vault()
        .groups_for_membership(active[0].membership_id)
        .await
        .unwrap();
    assert!(groups.is_empty());

    let saga = node.orchestrator().sagas().await.unwrap().remove(0);
    assert_eq!(saga.cursor, SagaStep::ActiveCommitted);
    assert_eq!(saga.failure.as_ref().map(|f| f.step), Some(SagaStep::ActiveCommitted));

    validator.heal();
    let created = node.orchestrator().resume(saga.id).await.unwrap();
    assert!(created.membership.membership().unwrap().is_authorised());
    let history = node
        .vault()
        .membership_history(active[0].membership_id)
        .await
        .unwrap();
    assert_eq!(history.len(), 3);
}

#[tokio::test]
async fn test_group_failure_wrapped_and_resumable() {
    let network = TestNetwork::new();
    let validator = Arc::new(RejectingValidator::rejecting(
        Arc::new(BusinessNetworkContract::new()),
        "IssueGroup",
    ));
    let node = network.node_with(BNO, |builder| builder.with_validator(validator.clone()));

    let err = node.orchestrator().start(net1()).await.unwrap_err();
    let membership_id = assert_matches!(
        err,
        BnError::GroupCreation { membership_id, ref cause }
            if matches!(**cause, BnError::InvalidTransition { .. }) => membership_id
    );

    let current = node.memberships().current(membership_id).await.unwrap();
    assert!(current.membership().unwrap().is_authorised());
    assert!(node.vault().groups_for_membership(membership_id).await.unwrap().is_empty());

    validator.heal();
    let saga = node.orchestrator().sagas().await.unwrap().remove(0);
    node.orchestrator().resume(saga.id).await.unwrap();
    // Resuming a completed saga re-reads the outcome instead of issuing again
    node.orchestrator().resume(saga.id).await.unwrap();
    assert_eq!(node.vault().groups_for_membership(membership_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_crash_between_commit_and_cursor_write_resumes_without_reissue() {
    init_test_tracing();
    let network = TestNetwork::new();
    // Writes: 1 = Start, 2 = GuardChecked, 3 = PendingCommitted
    let store = Arc::new(FlakySagaStore::failing_from(3));
    let node = network.node_with(BNO, |builder| builder.with_saga_store(store.clone()));

    let err = node.orchestrator().start(net1()).await.unwrap_err();
    assert_matches!(err, BnError::Storage { .. });

    let saga = node.orchestrator().sagas().await.unwrap().remove(0);
    assert_eq!(saga.cursor, SagaStep::GuardChecked);
    assert!(saga.failure.is_none());
    let pending = node.memberships().current(saga.membership_id).await.unwrap();
    assert_eq!(pending.membership().unwrap().status, MembershipStatus::Pending);

    store.heal();
    let outcomes = node.orchestrator().recover_incomplete().await.unwrap();
    assert_eq!(outcomes.len(), 1);
    let (saga_id, outcome) = &outcomes[0];
    assert_eq!(*saga_id, saga.id);
    outcome.as_ref().unwrap();

    let history = node.vault().membership_history(saga.membership_id).await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].state_ref, pending.state_ref);
    assert_eq!(history[1].command, Command::ActivateMembership { bootstrap: true });

    let stored = node.orchestrator().saga(saga.id).await.unwrap();
    assert_eq!(stored.cursor, SagaStep::GroupCreated);
    assert_eq!(stored.attempts, 1);
    assert!(node.orchestrator().recover_incomplete().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_declined_signature_stops_before_first_commit() {
    let network = TestNetwork::new();
    let signer = Arc::new(DecliningSigner::new(network.signer().clone()));
    let node = network.node_with(BNO, |builder| builder.with_signer(signer.clone()));
    signer.decline(node.party().clone());

    let err = node.orchestrator().start(net1()).await.unwrap_err();

    assert_matches!(err, BnError::Signature { ref party, .. } if party == node.party());
    assert!(node.vault().is_empty().await);
    assert!(!node.vault().network_exists(&NetworkId::new("NET-1")).await.unwrap());
}

#[tokio::test]
async fn test_slow_finality_is_awaited_and_reported() {
    let (logs, _guard) = LogCapture::install();
    let network = TestNetwork::new();
    let delayed = Arc::new(DelayedConsensus::new(
        network.consensus().clone(),
        Duration::from_millis(40),
    ));
    network.party(BNO);

    let mut config = NodeConfig::test(BNO);
    config.pipeline.finality_warn_interval_ms = 5;
    let node = NodeBuilder::new(config, party_identity(BNO))
        .with_consensus(delayed)
        .with_signer(network.signer().clone())
        .build()
        .unwrap();

    let created = node.orchestrator().start(net1()).await.unwrap();
    assert!(created.membership.membership().unwrap().is_authorised());

    assert!(logs.count("Still awaiting finality") >= 1, "{}", logs.contents());
    assert!(logs.contents().contains("waited_ms="));
    assert!(logs.contents().contains("service=single-coordinator"));
}

#[tokio::test]
async fn test_node_resolves_consensus_from_configuration() {
    let config = NodeConfig::from_toml_str(
        r#"
        legal_name = "O=BNO,L=New York,C=US"

        [consensus.bft]
        replica_id = 0
        cluster_addresses = ["bft0:11000", "bft1:11000", "bft2:11000", "bft3:11000"]
        "#,
    )
    .unwrap();

    let node = NodeBuilder::new(config, party_identity(BNO))
        .with_filter_slot(Arc::new(SerialFilterSlot::new()))
        .build()
        .unwrap();
    assert_eq!(node.consensus().name(), "bft");

    let created = node.orchestrator().start(net1()).await.unwrap();
    assert_eq!(created.membership.proof.service, "bft");
}
