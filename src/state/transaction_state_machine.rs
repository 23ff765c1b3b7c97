//! Forward-only status progression of a single transaction record.
//!
//! A record is created either optimistically, as `submitted` under a
//! synthetic hash, or by a chain event. Every later update is merged over it
//! field by field, and its status may only move along
//! [TRANSACTION_STATUS_TRANSITIONS]. An update that would move the status
//! backwards (a late `pending` after `mined`, say) still contributes its
//! other fields, but the status stays where it was.
//!
//! When an update carries no status, one is derived: a block number means
//! `mined`, and any update for a `submitted` record means the wallet has
//! broadcast it, so `pending`.

use crate::config_models::network::NetworkId;
use crate::models::address::Address;
use crate::models::transaction::key_id;
use crate::models::transaction::Transaction;
use crate::models::transaction::TransactionPatch;
use crate::models::transaction::TransactionStatus;
use crate::models::transaction::TransactionType;

// Each sub-array is indexed by the integer value of the corresponding
// TransactionStatus variant and lists the statuses allowed to follow it.
//
// mined -> failed is allowed: a reverted transaction is included in a block,
// and the chain reader may report the block number before the receipt.
#[rustfmt::skip]
const TRANSACTION_STATUS_TRANSITIONS: [&[TransactionStatus]; 4] = [
    // TransactionStatus::Submitted
    &[
        TransactionStatus::Pending,
        TransactionStatus::Mined,
        TransactionStatus::Failed,
    ],

    // TransactionStatus::Pending
    &[
        TransactionStatus::Mined,
        TransactionStatus::Failed,
    ],

    // TransactionStatus::Mined
    &[
        TransactionStatus::Failed,
    ],

    // TransactionStatus::Failed
    &[],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid transaction status transition from {} to {}", old_status, new_status)]
pub struct InvalidStatusTransition {
    pub old_status: TransactionStatus,
    pub new_status: TransactionStatus,
}

/// true if a record in `from` may move to `to`. Staying put is allowed.
pub fn transition_allowed(from: TransactionStatus, to: TransactionStatus) -> bool {
    from == to || TRANSACTION_STATUS_TRANSITIONS[from as usize].contains(&to)
}

/// the status a record ends up in after `next` is proposed.
pub fn advance(
    current: Option<TransactionStatus>,
    next: TransactionStatus,
) -> Result<TransactionStatus, InvalidStatusTransition> {
    match current {
        None => Ok(next),
        Some(old_status) if transition_allowed(old_status, next) => Ok(next),
        Some(old_status) => Err(InvalidStatusTransition {
            old_status,
            new_status: next,
        }),
    }
}

/// the status implied by `patch` when it does not carry one.
fn derived_status(existing: &Transaction, merged: &Transaction) -> Option<TransactionStatus> {
    if merged.is_mined() {
        Some(TransactionStatus::Mined)
    } else if existing.status == Some(TransactionStatus::Submitted) {
        Some(TransactionStatus::Pending)
    } else {
        existing.status
    }
}

/// merges `patch` over `existing`, enforcing the forward-only status rule.
pub fn apply_transaction_update(existing: &Transaction, patch: &TransactionPatch) -> Transaction {
    let mut merged = existing.clone();
    merged.apply(patch);

    let proposed = patch.status.or_else(|| derived_status(existing, &merged));
    merged.status = match proposed {
        None => existing.status,
        Some(next) => match advance(existing.status, next) {
            Ok(status) => Some(status),
            Err(e) => {
                tracing::debug!("{}: ignoring status of update for {}", e, existing.hash);
                existing.status
            }
        },
    };

    merged
}

/// Optimistic record for a purchase dispatched to the wallet, before its
/// hash is known.
pub fn submitted_transaction(
    hash: String,
    lock: &Address,
    account: &Address,
    input: Option<String>,
    network: NetworkId,
) -> Transaction {
    let mut transaction = Transaction::new(hash);
    transaction.from = Some(account.clone());
    transaction.beneficiary = Some(account.clone());
    transaction.to = Some(lock.clone());
    transaction.lock = Some(lock.clone());
    transaction.key = Some(key_id(lock, account));
    transaction.input = input;
    transaction.status = Some(TransactionStatus::Submitted);
    transaction.kind = Some(TransactionType::KeyPurchase);
    transaction.network = Some(network);
    transaction
}

#[cfg(test)]
mod state_machine_tests {
    use tracing_test::traced_test;

    use super::*;

    fn submitted() -> Transaction {
        submitted_transaction(
            "0xhash".to_string(),
            &Address::new("0xlock"),
            &Address::new("0xme"),
            None,
            NetworkId::DEV,
        )
    }

    mod worker {
        use super::*;

        pub const HAPPY_PATH: [TransactionStatus; 3] = [
            TransactionStatus::Submitted,
            TransactionStatus::Pending,
            TransactionStatus::Mined,
        ];

        pub fn all_statuses() -> [TransactionStatus; 4] {
            [
                TransactionStatus::Submitted,
                TransactionStatus::Pending,
                TransactionStatus::Mined,
                TransactionStatus::Failed,
            ]
        }
    }

    #[test]
    fn happy_path_is_allowed() {
        for pair in worker::HAPPY_PATH.windows(2) {
            assert!(transition_allowed(pair[0], pair[1]));
        }
    }

    #[test]
    fn no_transition_moves_backwards() {
        for from in worker::all_statuses() {
            for to in worker::all_statuses() {
                if to.rank() < from.rank() {
                    assert!(!transition_allowed(from, to), "{} -> {}", from, to);
                }
            }
        }
    }

    #[test]
    fn failed_is_terminal() {
        for to in worker::all_statuses() {
            assert_eq!(
                to == TransactionStatus::Failed,
                transition_allowed(TransactionStatus::Failed, to)
            );
        }
    }

    #[traced_test]
    #[test]
    fn update_without_status_moves_submitted_to_pending() {
        let updated = apply_transaction_update(
            &submitted(),
            &TransactionPatch {
                confirmations: Some(0),
                ..Default::default()
            },
        );
        assert_eq!(Some(TransactionStatus::Pending), updated.status);
    }

    #[traced_test]
    #[test]
    fn block_number_means_mined() {
        let updated = apply_transaction_update(
            &submitted(),
            &TransactionPatch {
                block_number: Some(1234),
                confirmations: Some(1),
                ..Default::default()
            },
        );
        assert_eq!(Some(TransactionStatus::Mined), updated.status);
        assert_eq!(1234, updated.block_number);
        assert_eq!(1, updated.confirmations);
    }

    #[traced_test]
    #[test]
    fn late_pending_does_not_undo_mined() {
        let mined = apply_transaction_update(
            &submitted(),
            &TransactionPatch {
                status: Some(TransactionStatus::Mined),
                block_number: Some(10),
                ..Default::default()
            },
        );
        let late = apply_transaction_update(
            &mined,
            &TransactionPatch {
                status: Some(TransactionStatus::Pending),
                confirmations: Some(3),
                ..Default::default()
            },
        );

        assert_eq!(Some(TransactionStatus::Mined), late.status);
        assert_eq!(3, late.confirmations);
        assert!(logs_contain("invalid transaction status transition"));
    }

    #[test]
    fn absent_fields_are_kept() {
        let updated = apply_transaction_update(&submitted(), &TransactionPatch::default());
        assert_eq!(Some(Address::new("0xlock")), updated.lock);
        assert_eq!(Some("0xlock-0xme".to_string()), updated.key);
    }
}
