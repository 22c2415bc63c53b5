//! Input uniqueness tracking shared by the built-in services
//!
//! A provider remembers which transaction consumed each input. A transaction
//! is finalised at most once; replaying an already finalised transaction
//! returns its original sequence number instead of a conflict so a caller
//! that lost the first response can safely resubmit.

use bnet_core::{BnError, Result, StateRef, TxId};
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Default)]
struct ConsumedStates {
    consumed: HashMap<StateRef, TxId>,
    finalised: HashMap<TxId, u64>,
}

impl ConsumedStates {
    fn check(&self, tx_id: TxId, inputs: &[StateRef]) -> Result<()> {
        for input in inputs {
            match self.consumed.get(input) {
                Some(consumer) if *consumer != tx_id => {
                    return Err(BnError::Conflict {
                        state_ref: *input,
                        consumed_by: *consumer,
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn apply(&mut self, tx_id: TxId, inputs: &[StateRef], sequence: u64) {
        for input in inputs {
            self.consumed.insert(*input, tx_id);
        }
        self.finalised.insert(tx_id, sequence);
    }
}

/// Record of consumed inputs for one replica
#[derive(Debug, Default)]
pub struct UniquenessProvider {
    state: Mutex<ConsumedStates>,
}

impl UniquenessProvider {
    /// Empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail with `Conflict` if any input was consumed by another transaction
    pub fn check(&self, tx_id: TxId, inputs: &[StateRef]) -> Result<()> {
        self.state.lock().check(tx_id, inputs)
    }

    /// Record the transaction as finalised at `sequence`
    pub fn apply(&self, tx_id: TxId, inputs: &[StateRef], sequence: u64) {
        self.state.lock().apply(tx_id, inputs, sequence);
    }

    /// Check and apply atomically; `next_sequence` is only called for new transactions
    pub fn commit(
        &self,
        tx_id: TxId,
        inputs: &[StateRef],
        next_sequence: impl FnOnce() -> u64,
    ) -> Result<u64> {
        let mut state = self.state.lock();
        if let Some(sequence) = state.finalised.get(&tx_id) {
            return Ok(*sequence);
        }
        state.check(tx_id, inputs)?;
        let sequence = next_sequence();
        state.apply(tx_id, inputs, sequence);
        Ok(sequence)
    }

    /// Sequence of an already finalised transaction
    pub fn sequence_of(&self, tx_id: &TxId) -> Option<u64> {
        self.state.lock().finalised.get(tx_id).copied()
    }

    /// Transaction that consumed an input, if any
    pub fn consumed_by(&self, state_ref: &StateRef) -> Option<TxId> {
        self.state.lock().consumed.get(state_ref).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_spend_conflicts() {
        let provider = UniquenessProvider::new();
        let input = StateRef::new(TxId::digest(b"issue"), 0);
        let first = TxId::digest(b"activate-a");
        let second = TxId::digest(b"activate-b");

        assert_eq!(provider.commit(first, &[input], || 1).unwrap(), 1);
        let err = provider.commit(second, &[input], || 2).unwrap_err();
        assert_eq!(
            err,
            BnError::Conflict {
                state_ref: input,
                consumed_by: first
            }
        );
        assert_eq!(provider.consumed_by(&input), Some(first));
    }

    #[test]
    fn test_replay_returns_original_sequence() {
        let provider = UniquenessProvider::new();
        let tx = TxId::digest(b"issue");
        assert_eq!(provider.commit(tx, &[], || 7).unwrap(), 7);
        assert_eq!(provider.commit(tx, &[], || 8).unwrap(), 7);
        assert_eq!(provider.sequence_of(&tx), Some(7));
    }
}
