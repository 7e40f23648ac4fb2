use std::collections::{HashMap, HashSet};

use crate::errors::{ErrorKind, Result};
use crate::network::TopicPartition;
use crate::protocol::{ProducerEpoch, ProducerId, NO_PRODUCER_EPOCH, NO_PRODUCER_ID};

/// Lifecycle of the idempotent/transactional producer identity.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TxnState {
    /// No producer id and none required.
    None,
    /// InitProducerId in flight.
    Initializing,
    /// Producer id assigned; no transaction open.
    Ready,
    InTransaction,
    Committing,
    Aborting,
    /// A fatal sequencing/epoch error; the producer id must be
    /// re-initialized (or the transaction aborted) before further sends.
    Error,
}

/// Producer-side sequencing and transaction bookkeeping, guarded by one
/// mutex in the producer.
#[derive(Debug)]
pub struct TransactionState {
    pub producer_id: ProducerId,
    pub producer_epoch: ProducerEpoch,
    pub transactional_id: Option<String>,
    pub state: TxnState,
    /// Next sequence per partition; advanced only on acknowledgement.
    sequences: HashMap<TopicPartition, i32>,
    /// Partitions written since `begin_transaction`, to be registered with
    /// the coordinator before EndTxn.
    txn_partitions: HashSet<TopicPartition>,
}

impl TransactionState {
    pub fn new(transactional_id: Option<String>) -> Self {
        TransactionState {
            producer_id: NO_PRODUCER_ID,
            producer_epoch: NO_PRODUCER_EPOCH,
            transactional_id,
            state: TxnState::None,
            sequences: HashMap::new(),
            txn_partitions: HashSet::new(),
        }
    }

    pub fn has_producer_id(&self) -> bool {
        self.producer_id != NO_PRODUCER_ID
    }

    pub fn is_transactional(&self) -> bool {
        self.transactional_id.is_some()
    }

    pub fn in_transaction(&self) -> bool {
        self.state == TxnState::InTransaction
    }

    /// Adopt a broker-assigned identity; sequences restart at zero.
    pub fn set_producer_id(&mut self, producer_id: ProducerId, producer_epoch: ProducerEpoch) {
        self.producer_id = producer_id;
        self.producer_epoch = producer_epoch;
        self.sequences.clear();
        self.txn_partitions.clear();
        self.state = TxnState::Ready;
    }

    /// The sequence the next batch for this partition goes out with.
    pub fn sequence(&self, tp: &TopicPartition) -> i32 {
        self.sequences.get(tp).copied().unwrap_or(0)
    }

    /// Advance after the broker acknowledged `count` records.
    pub fn advance_sequence(&mut self, tp: &TopicPartition, count: i32) {
        *self.sequences.entry(tp.clone()).or_insert(0) += count;
    }

    pub fn begin(&mut self) -> Result<()> {
        if !self.is_transactional() {
            bail!(ErrorKind::ValidationError(
                "transactional.id is not configured".into()
            ));
        }
        match self.state {
            TxnState::Ready => {
                self.txn_partitions.clear();
                self.state = TxnState::InTransaction;
                Ok(())
            }
            state => bail!(ErrorKind::ValidationError(format!(
                "cannot begin a transaction in state {:?}",
                state
            ))),
        }
    }

    /// Record a partition touched by the open transaction.
    pub fn add_partition(&mut self, tp: &TopicPartition) {
        if self.in_transaction() {
            self.txn_partitions.insert(tp.clone());
        }
    }

    /// The partitions to register via AddPartitionsToTxn.
    pub fn txn_partitions(&self) -> Vec<TopicPartition> {
        let mut partitions: Vec<_> = self.txn_partitions.iter().cloned().collect();
        partitions.sort();
        partitions
    }

    pub fn transition_to_end(&mut self, committing: bool) -> Result<()> {
        if !self.is_transactional() {
            bail!(ErrorKind::ValidationError(
                "transactional.id is not configured".into()
            ));
        }
        match self.state {
            TxnState::InTransaction => {
                self.state = if committing {
                    TxnState::Committing
                } else {
                    TxnState::Aborting
                };
                Ok(())
            }
            // aborting is allowed from the error state to fence the epoch
            TxnState::Error if !committing => {
                self.state = TxnState::Aborting;
                Ok(())
            }
            state => bail!(ErrorKind::ValidationError(format!(
                "no open transaction to end in state {:?}",
                state
            ))),
        }
    }

    pub fn finish_end(&mut self) {
        self.txn_partitions.clear();
        self.state = TxnState::Ready;
    }

    /// An unrecoverable sequencing error; see spec for OUT_OF_ORDER handling.
    pub fn poison(&mut self) {
        self.state = TxnState::Error;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequences_advance_only_on_ack() {
        let mut state = TransactionState::new(None);
        state.set_producer_id(9000, 0);

        let tp = TopicPartition::new("t", 0);
        assert_eq!(state.sequence(&tp), 0);
        // a retry before the ack keeps reading the same sequence
        assert_eq!(state.sequence(&tp), 0);

        state.advance_sequence(&tp, 5);
        assert_eq!(state.sequence(&tp), 5);
        assert_eq!(state.sequence(&TopicPartition::new("t", 1)), 0);
    }

    #[test]
    fn test_transaction_lifecycle() {
        let mut state = TransactionState::new(Some("txn".into()));
        state.set_producer_id(1, 0);

        state.begin().unwrap();
        assert!(state.in_transaction());

        let tp = TopicPartition::new("t", 0);
        state.add_partition(&tp);
        assert_eq!(state.txn_partitions(), vec![tp]);

        state.transition_to_end(true).unwrap();
        assert_eq!(state.state, TxnState::Committing);
        state.finish_end();
        assert_eq!(state.state, TxnState::Ready);
        assert!(state.txn_partitions().is_empty());
    }

    #[test]
    fn test_begin_requires_transactional_id() {
        let mut state = TransactionState::new(None);
        state.set_producer_id(1, 0);
        assert!(state.begin().is_err());
    }

    #[test]
    fn test_double_begin_rejected() {
        let mut state = TransactionState::new(Some("txn".into()));
        state.set_producer_id(1, 0);
        state.begin().unwrap();
        assert!(state.begin().is_err());
    }

    #[test]
    fn test_error_state_allows_abort_only() {
        let mut state = TransactionState::new(Some("txn".into()));
        state.set_producer_id(1, 0);
        state.begin().unwrap();
        state.poison();

        assert!(state.transition_to_end(true).is_err());
        state.transition_to_end(false).unwrap();
        assert_eq!(state.state, TxnState::Aborting);
    }
}
