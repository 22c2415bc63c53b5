//! Signed transition builders for consensus-level tests

use bnet_core::{
    Command, LedgerState, MembershipId, MembershipRecord, MembershipStatus, NetworkId,
    NodeIdentity, PartyId, ProposedTransition, ResolvedState, SignedTransition, TransitionBody,
    TransitionSignature,
};
use chrono::Utc;
use std::collections::BTreeSet;
use uuid::Uuid;

/// Deterministic identity derived from a legal name
pub fn party_identity(legal_name: &str) -> NodeIdentity {
    let seed = blake3::hash(legal_name.as_bytes());
    NodeIdentity::from_seed(PartyId::new(legal_name), *seed.as_bytes())
}

/// A PENDING membership issuance signed by its owner
pub fn signed_issuance(owner: &NodeIdentity, network_id: &NetworkId) -> SignedTransition {
    let record = MembershipRecord::pending(
        MembershipId::new(),
        owner.party().clone(),
        network_id.clone(),
        None,
        Utc::now(),
    );
    signed(owner, None, LedgerState::Membership(record), Command::RequestMembership)
}

/// A fresh transition consuming the output of `prior`
///
/// Each call produces a distinct transaction, so two calls on the same prior
/// form a double spend.
pub fn signed_spend(owner: &NodeIdentity, prior: &SignedTransition) -> SignedTransition {
    let input = ResolvedState {
        state_ref: prior.transition.output_ref(),
        state: prior.transition.body().output.clone(),
    };
    let output = match &input.state {
        LedgerState::Membership(record) => {
            LedgerState::Membership(record.with_status(MembershipStatus::Active, Utc::now()))
        }
        other => other.clone(),
    };
    signed(
        owner,
        Some(input),
        output,
        Command::ActivateMembership { bootstrap: true },
    )
}

fn signed(
    owner: &NodeIdentity,
    input: Option<ResolvedState>,
    output: LedgerState,
    command: Command,
) -> SignedTransition {
    let transition = ProposedTransition::seal(TransitionBody {
        input,
        output,
        command,
        references: Vec::new(),
        required_signers: BTreeSet::from([owner.party().clone()]),
        proposer: owner.party().clone(),
        nonce: Uuid::new_v4(),
        created_at: Utc::now(),
    })
    .unwrap();
    let signature = TransitionSignature::sign(owner, &transition);
    SignedTransition {
        transition,
        signatures: vec![signature],
    }
}
