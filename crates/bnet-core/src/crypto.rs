//! Signing identities and signature verification

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use std::fmt;

use crate::errors::{BnError, Result};
use crate::identifiers::PartyId;

/// A party's legal name bound to its ed25519 signing key
///
/// Used both by transaction signers and by consensus nodes, whose proofs of
/// finality are signed with the node's consensus identity.
#[derive(Clone)]
pub struct NodeIdentity {
    party: PartyId,
    signing_key: SigningKey,
}

impl NodeIdentity {
    /// Bind a signing key to a party
    pub fn new(party: PartyId, signing_key: SigningKey) -> Self {
        Self { party, signing_key }
    }

    /// Deterministic identity from a 32-byte seed
    pub fn from_seed(party: PartyId, seed: [u8; 32]) -> Self {
        Self::new(party, SigningKey::from_bytes(&seed))
    }

    /// Legal identity
    pub fn party(&self) -> &PartyId {
        &self.party
    }

    /// Raw public key bytes
    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing_key.sign(message).to_bytes().to_vec()
    }
}

impl fmt::Debug for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeIdentity")
            .field("party", &self.party)
            .field("public_key", &hex::encode(self.public_key()))
            .finish()
    }
}

/// Verify an ed25519 signature over `message`
pub fn verify_signature(public_key: &[u8; 32], message: &[u8], signature: &[u8]) -> Result<()> {
    let key = VerifyingKey::from_bytes(public_key)?;
    let signature = Signature::from_slice(signature)?;
    key.verify(message, &signature)
        .map_err(|e| BnError::crypto(format!("signature verification failed: {e}")))
}
