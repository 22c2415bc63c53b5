//! Finality behaviour of the built-in consensus services

use assert_matches::assert_matches;
use bnet_consensus::{
    BftService, ReplicatedLogService, SerialFilter, SerialFilterSlot, SingleCoordinatorService,
};
use bnet_core::{BftParams, BnError, ConsensusService, NetworkId, ReplicatedLogParams};
use bnet_testkit::init_test_tracing;
use bnet_testkit::transitions::{party_identity, signed_issuance, signed_spend};
use std::sync::Arc;

const NOTARY: &str = "O=Notary,L=London,C=GB";
const BANK: &str = "O=Bank A,L=London,C=GB";

fn bft(n: usize, slot: Arc<SerialFilterSlot>) -> BftService {
    let params = BftParams {
        replica_id: 0,
        cluster_addresses: (0..n).map(|i| format!("bft{i}:11000")).collect(),
    };
    BftService::new(party_identity(NOTARY), &params, slot).unwrap()
}

fn replicated_log(followers: usize) -> ReplicatedLogService {
    let params = ReplicatedLogParams {
        node_address: "raft0:10000".to_string(),
        cluster_addresses: (1..=followers).map(|i| format!("raft{i}:10000")).collect(),
    };
    ReplicatedLogService::new(party_identity(NOTARY), &params, Arc::new(SerialFilterSlot::new())).unwrap()
}

#[tokio::test]
async fn test_single_coordinator_detects_double_spend() {
    init_test_tracing();
    let service = SingleCoordinatorService::new(party_identity(NOTARY));
    let bank = party_identity(BANK);

    let issuance = signed_issuance(&bank, &NetworkId::new("NET-1"));
    let issued = service.finalize(&issuance).await.unwrap();
    issued.verify(&issuance.id()).unwrap();
    assert_eq!(issued.sequence, 1);

    let first = signed_spend(&bank, &issuance);
    let second = signed_spend(&bank, &issuance);
    let proof = service.finalize(&first).await.unwrap();
    assert_eq!(proof.sequence, 2);

    let err = service.finalize(&second).await.unwrap_err();
    assert_matches!(err, BnError::Conflict { consumed_by, .. } if consumed_by == first.id());
    assert!(err.requires_state_refresh());

    // Replaying a finalised transaction returns its original position
    let replay = service.finalize(&first).await.unwrap();
    assert_eq!(replay.sequence, 2);
}

#[tokio::test]
async fn test_unsigned_transition_rejected() {
    let service = SingleCoordinatorService::new(party_identity(NOTARY));
    let mut issuance = signed_issuance(&party_identity(BANK), &NetworkId::new("NET-1"));
    issuance.signatures.clear();

    let err = service.finalize(&issuance).await.unwrap_err();
    assert_matches!(err, BnError::Signature { .. });
}

#[tokio::test]
async fn test_bft_tolerates_f_offline_replicas() {
    init_test_tracing();
    let service = bft(4, Arc::new(SerialFilterSlot::new()));
    let bank = party_identity(BANK);
    service.set_replica_online(3, false).unwrap();

    let issuance = signed_issuance(&bank, &NetworkId::new("NET-1"));
    let proof = service.finalize(&issuance).await.unwrap();
    assert_eq!(proof.service, "bft");
    proof.verify(&issuance.id()).unwrap();

    service.set_replica_online(2, false).unwrap();
    let err = service
        .finalize(&signed_spend(&bank, &issuance))
        .await
        .unwrap_err();
    assert_matches!(err, BnError::Finality { .. });
}

#[tokio::test]
async fn test_bft_rejects_conflict_seen_by_quorum() {
    let service = bft(4, Arc::new(SerialFilterSlot::new()));
    let bank = party_identity(BANK);

    let issuance = signed_issuance(&bank, &NetworkId::new("NET-1"));
    service.finalize(&issuance).await.unwrap();

    service.set_replica_online(3, false).unwrap();
    let first = signed_spend(&bank, &issuance);
    service.finalize(&first).await.unwrap();

    // Replica 3 missed the first spend and accepts, the rest report the conflict
    service.set_replica_online(3, true).unwrap();
    service.set_replica_online(0, false).unwrap();
    let err = service
        .finalize(&signed_spend(&bank, &issuance))
        .await
        .unwrap_err();
    assert_matches!(err, BnError::Conflict { consumed_by, .. } if consumed_by == first.id());
}

#[tokio::test]
async fn test_bft_replicas_honour_installed_filter() {
    let slot = Arc::new(SerialFilterSlot::new());
    slot.install(SerialFilter::allow_list("requests-only", ["UniquenessRequest"]))
        .unwrap();
    let service = bft(4, slot);

    let issuance = signed_issuance(&party_identity(BANK), &NetworkId::new("NET-1"));
    let err = service.finalize(&issuance).await.unwrap_err();

    assert_matches!(err, BnError::Finality { ref message } if message.contains("MembershipRecord"));
}

#[tokio::test]
async fn test_replicated_log_catches_up_lagging_follower() {
    init_test_tracing();
    let service = replicated_log(2);
    let bank = party_identity(BANK);
    assert_eq!(service.majority(), 2);

    service.set_follower_online(1, false).unwrap();
    let first = signed_issuance(&bank, &NetworkId::new("NET-1"));
    let second = signed_issuance(&bank, &NetworkId::new("NET-2"));
    assert_eq!(service.finalize(&first).await.unwrap().sequence, 1);
    assert_eq!(service.finalize(&second).await.unwrap().sequence, 2);
    assert_eq!(service.follower_log_len(0), Some(2));
    assert_eq!(service.follower_log_len(1), Some(0));

    service.set_follower_online(1, true).unwrap();
    let third = signed_spend(&bank, &first);
    assert_eq!(service.finalize(&third).await.unwrap().sequence, 3);
    assert_eq!(service.follower_log_len(1), Some(3));
    assert_eq!(service.committed_len(), 3);
}

#[tokio::test]
async fn test_replicated_log_without_majority_fails() {
    let service = replicated_log(2);
    service.set_follower_online(0, false).unwrap();
    service.set_follower_online(1, false).unwrap();

    let issuance = signed_issuance(&party_identity(BANK), &NetworkId::new("NET-1"));
    let err = service.finalize(&issuance).await.unwrap_err();

    assert_matches!(err, BnError::Finality { .. });
    assert_eq!(service.committed_len(), 0);
}

#[tokio::test]
async fn test_replicated_log_rejects_double_spend() {
    let service = replicated_log(2);
    let bank = party_identity(BANK);

    let issuance = signed_issuance(&bank, &NetworkId::new("NET-1"));
    service.finalize(&issuance).await.unwrap();
    let first = signed_spend(&bank, &issuance);
    service.finalize(&first).await.unwrap();

    let err = service
        .finalize(&signed_spend(&bank, &issuance))
        .await
        .unwrap_err();
    assert_matches!(err, BnError::Conflict { consumed_by, .. } if consumed_by == first.id());
    assert_eq!(service.committed_len(), 2);
}
