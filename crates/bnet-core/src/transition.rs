//! Ledger transitions: proposals, signatures, finality proofs and commits
//!
//! A transition consumes at most one prior version and produces exactly one
//! output. Its identifier is the BLAKE3 digest of the canonical JSON body, so
//! signatures and finality proofs bind to the full content including the
//! random nonce that keeps otherwise identical proposals distinct.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

use crate::crypto::{verify_signature, NodeIdentity};
use crate::errors::{BnError, Result};
use crate::identifiers::{MembershipId, PartyId, StateRef, TxId};
use crate::membership::MembershipRecord;
use crate::relationship::RelationshipGroup;

/// Intent tag describing the kind of change a transition makes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// Issue a new pending membership
    RequestMembership,
    /// Move a membership to ACTIVE; `bootstrap` marks the creator activating itself
    ActivateMembership {
        /// Self-activation of a network creator
        bootstrap: bool,
    },
    /// Move a membership to SUSPENDED
    SuspendMembership,
    /// Move a membership to REVOKED
    RevokeMembership,
    /// Replace the role set; `bootstrap` marks the creator authorising itself
    ModifyRoles {
        /// Self-authorisation of a network creator
        bootstrap: bool,
    },
    /// Replace the business identity payload
    ModifyBusinessIdentity,
    /// Issue a relationship group
    IssueGroup,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::RequestMembership => "RequestMembership",
            Self::ActivateMembership { .. } => "ActivateMembership",
            Self::SuspendMembership => "SuspendMembership",
            Self::RevokeMembership => "RevokeMembership",
            Self::ModifyRoles { .. } => "ModifyRoles",
            Self::ModifyBusinessIdentity => "ModifyBusinessIdentity",
            Self::IssueGroup => "IssueGroup",
        };
        f.write_str(label)
    }
}

/// Any record that can live on the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerState {
    /// A membership version
    Membership(MembershipRecord),
    /// A relationship group
    Group(RelationshipGroup),
}

impl LedgerState {
    /// Membership payload, if any
    pub fn as_membership(&self) -> Option<&MembershipRecord> {
        match self {
            Self::Membership(record) => Some(record),
            Self::Group(_) => None,
        }
    }

    /// Group payload, if any
    pub fn as_group(&self) -> Option<&RelationshipGroup> {
        match self {
            Self::Group(group) => Some(group),
            Self::Membership(_) => None,
        }
    }

    /// Parties storing the record
    pub fn participants(&self) -> &[PartyId] {
        match self {
            Self::Membership(record) => &record.participants,
            Self::Group(group) => &group.participants,
        }
    }

    /// Type tag used on the wire
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Membership(_) => "MembershipRecord",
            Self::Group(_) => "RelationshipGroup",
        }
    }
}

/// A committed state together with its location on the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedState {
    /// Where the state was committed
    pub state_ref: StateRef,
    /// The committed state
    pub state: LedgerState,
}

/// The change a caller wants committed, before it is bound to a prior version
#[derive(Debug, Clone)]
pub struct ProposedChange {
    /// Proposed output record
    pub output: LedgerState,
    /// Intent tag
    pub command: Command,
    /// Committed states consulted but not consumed
    pub references: Vec<ResolvedState>,
}

impl ProposedChange {
    /// Change without reference states
    pub fn new(output: LedgerState, command: Command) -> Self {
        Self {
            output,
            command,
            references: Vec::new(),
        }
    }

    /// Attach a reference state
    pub fn with_reference(mut self, reference: ResolvedState) -> Self {
        self.references.push(reference);
        self
    }
}

/// Canonical body of a transition; the transaction id is its digest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionBody {
    /// Consumed prior version, absent for first issuance
    pub input: Option<ResolvedState>,
    /// Produced record
    pub output: LedgerState,
    /// Intent tag
    pub command: Command,
    /// Reference states
    pub references: Vec<ResolvedState>,
    /// Parties whose signatures are required
    pub required_signers: BTreeSet<PartyId>,
    /// Party building the transition
    pub proposer: PartyId,
    /// Distinguishes otherwise identical proposals
    pub nonce: Uuid,
    /// When the transition was built
    pub created_at: DateTime<Utc>,
}

/// A transition ready for validation and signing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedTransition {
    id: TxId,
    body: TransitionBody,
}

impl ProposedTransition {
    /// Seal a body, computing its transaction id
    pub fn seal(body: TransitionBody) -> Result<Self> {
        let id = Self::digest(&body)?;
        Ok(Self { id, body })
    }

    fn digest(body: &TransitionBody) -> Result<TxId> {
        let bytes = serde_json::to_vec(body)?;
        Ok(TxId::digest(&bytes))
    }

    /// Transaction id
    pub fn id(&self) -> TxId {
        self.id
    }

    /// Canonical body
    pub fn body(&self) -> &TransitionBody {
        &self.body
    }

    /// Consumed input reference
    pub fn input_ref(&self) -> Option<StateRef> {
        self.body.input.as_ref().map(|input| input.state_ref)
    }

    /// Intent tag
    pub fn command(&self) -> Command {
        self.body.command
    }

    /// Output state reference once committed
    pub fn output_ref(&self) -> StateRef {
        StateRef::new(self.id, 0)
    }

    /// Recompute the digest and compare with the stored id
    pub fn verify_integrity(&self) -> Result<()> {
        if Self::digest(&self.body)? != self.id {
            return Err(BnError::crypto(format!(
                "transaction {} does not match its body",
                self.id
            )));
        }
        Ok(())
    }
}

/// One party's signature over a transaction id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionSignature {
    /// Signing party
    pub party: PartyId,
    /// ed25519 public key
    pub public_key: [u8; 32],
    /// ed25519 signature over the transaction id bytes
    pub signature: Vec<u8>,
}

impl TransitionSignature {
    /// Sign a transition with a local identity
    pub fn sign(identity: &NodeIdentity, transition: &ProposedTransition) -> Self {
        Self {
            party: identity.party().clone(),
            public_key: identity.public_key(),
            signature: identity.sign(transition.id().as_bytes()),
        }
    }

    /// Verify against a transaction id
    pub fn verify(&self, tx_id: &TxId) -> Result<()> {
        verify_signature(&self.public_key, tx_id.as_bytes(), &self.signature)
            .map_err(|e| BnError::signature(self.party.clone(), e.to_string()))
    }
}

/// A transition carrying the signatures of its required signers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransition {
    /// The proposed transition
    pub transition: ProposedTransition,
    /// Collected signatures
    pub signatures: Vec<TransitionSignature>,
}

impl SignedTransition {
    /// Transaction id
    pub fn id(&self) -> TxId {
        self.transition.id()
    }

    /// Check integrity and that every required signer signed validly
    pub fn verify_required_signatures(&self) -> Result<()> {
        self.transition.verify_integrity()?;
        let tx_id = self.id();
        for party in &self.transition.body().required_signers {
            let signature = self
                .signatures
                .iter()
                .find(|sig| &sig.party == party)
                .ok_or_else(|| BnError::signature(party.clone(), "signature missing"))?;
            signature.verify(&tx_id)?;
        }
        Ok(())
    }
}

/// Evidence that a consensus service finalised a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalityProof {
    /// Finalised transaction
    pub tx_id: TxId,
    /// Name of the consensus service
    pub service: String,
    /// Consensus node identity
    pub notary: PartyId,
    /// Consensus node public key
    pub notary_key: [u8; 32],
    /// Position in the service's commit order
    pub sequence: u64,
    /// Signature over `tx_id || sequence`
    pub signature: Vec<u8>,
}

impl FinalityProof {
    fn message(tx_id: &TxId, sequence: u64) -> Vec<u8> {
        let mut message = Vec::with_capacity(40);
        message.extend_from_slice(tx_id.as_bytes());
        message.extend_from_slice(&sequence.to_be_bytes());
        message
    }

    /// Issue a proof signed by the consensus node identity
    pub fn issue(identity: &NodeIdentity, service: &str, tx_id: TxId, sequence: u64) -> Self {
        Self {
            tx_id,
            service: service.to_string(),
            notary: identity.party().clone(),
            notary_key: identity.public_key(),
            sequence,
            signature: identity.sign(&Self::message(&tx_id, sequence)),
        }
    }

    /// Verify the proof for the expected transaction
    pub fn verify(&self, expected: &TxId) -> Result<()> {
        if &self.tx_id != expected {
            return Err(BnError::finality(format!(
                "proof is for {} but {} was submitted",
                self.tx_id, expected
            )));
        }
        verify_signature(
            &self.notary_key,
            &Self::message(&self.tx_id, self.sequence),
            &self.signature,
        )
    }
}

/// A durably committed output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedRecord {
    /// Location of the output
    pub state_ref: StateRef,
    /// The committed state
    pub state: LedgerState,
    /// Prior version consumed by the transition, if any
    pub input: Option<StateRef>,
    /// Intent tag of the committing transition
    pub command: Command,
    /// Proof of finality
    pub proof: FinalityProof,
}

impl CommittedRecord {
    /// Build the committed view of a finalised transition
    pub fn from_finalised(transition: &ProposedTransition, proof: FinalityProof) -> Self {
        Self {
            state_ref: transition.output_ref(),
            state: transition.body().output.clone(),
            input: transition.input_ref(),
            command: transition.command(),
            proof,
        }
    }

    /// Membership payload, or an error naming what was found instead
    pub fn membership(&self) -> Result<&MembershipRecord> {
        self.state.as_membership().ok_or_else(|| {
            BnError::invalid(format!(
                "{} holds a {}, not a membership",
                self.state_ref,
                self.state.type_name()
            ))
        })
    }

    /// Group payload, or an error naming what was found instead
    pub fn group(&self) -> Result<&RelationshipGroup> {
        self.state.as_group().ok_or_else(|| {
            BnError::invalid(format!(
                "{} holds a {}, not a group",
                self.state_ref,
                self.state.type_name()
            ))
        })
    }

    /// Membership id when this is a membership version
    pub fn membership_id(&self) -> Option<MembershipId> {
        self.state.as_membership().map(|record| record.membership_id)
    }

    /// View as a resolved state, for use as input or reference
    pub fn resolved(&self) -> ResolvedState {
        ResolvedState {
            state_ref: self.state_ref,
            state: self.state.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::NetworkId;

    fn body(proposer: &NodeIdentity) -> TransitionBody {
        let record = MembershipRecord::pending(
            MembershipId::new(),
            proposer.party().clone(),
            NetworkId::new("NET-1"),
            None,
            Utc::now(),
        );
        TransitionBody {
            input: None,
            output: LedgerState::Membership(record),
            command: Command::RequestMembership,
            references: Vec::new(),
            required_signers: [proposer.party().clone()].into_iter().collect(),
            proposer: proposer.party().clone(),
            nonce: Uuid::new_v4(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_signed_transition_requires_all_signers() {
        let alice = NodeIdentity::from_seed(PartyId::new("O=Alice,L=Paris,C=FR"), [1u8; 32]);
        let mut body = body(&alice);
        body.required_signers.insert(PartyId::new("O=Bob,L=Paris,C=FR"));
        let transition = ProposedTransition::seal(body).unwrap();

        let signed = SignedTransition {
            signatures: vec![TransitionSignature::sign(&alice, &transition)],
            transition,
        };
        let err = signed.verify_required_signatures().unwrap_err();
        assert!(matches!(err, BnError::Signature { party, .. } if party.as_str() == "O=Bob,L=Paris,C=FR"));
    }

    #[test]
    fn test_tampered_body_fails_integrity() {
        let alice = NodeIdentity::from_seed(PartyId::new("O=Alice,L=Paris,C=FR"), [1u8; 32]);
        let transition = ProposedTransition::seal(body(&alice)).unwrap();
        let mut json = serde_json::to_value(&transition).unwrap();
        json["body"]["command"] = serde_json::json!("IssueGroup");
        let tampered: ProposedTransition = serde_json::from_value(json).unwrap();
        assert!(tampered.verify_integrity().is_err());
    }

    #[test]
    fn test_finality_proof_binds_sequence() {
        let notary = NodeIdentity::from_seed(PartyId::new("O=Notary,L=London,C=GB"), [9u8; 32]);
        let tx_id = TxId::digest(b"tx");
        let mut proof = FinalityProof::issue(&notary, "single-coordinator", tx_id, 4);
        assert!(proof.verify(&tx_id).is_ok());
        proof.sequence = 5;
        assert!(proof.verify(&tx_id).is_err());
        assert!(proof.verify(&TxId::digest(b"other")).is_err());
    }
}
