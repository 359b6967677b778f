//! Context-free transaction checks.

use std::collections::HashSet;

use crw_chain::transaction::Transaction;

use crate::error::TransactionError;

/// Checks that the transaction has at least one input and one output.
pub fn has_inputs_and_outputs(tx: &Transaction) -> Result<(), TransactionError> {
    if tx.inputs.is_empty() {
        Err(TransactionError::NoInputs)
    } else if tx.outputs.is_empty() {
        Err(TransactionError::NoOutputs)
    } else {
        Ok(())
    }
}

/// Checks that no two inputs of a non-coinbase transaction spend the same
/// outpoint.
pub fn no_duplicate_inputs(tx: &Transaction) -> Result<(), TransactionError> {
    let mut seen = HashSet::new();
    for input in &tx.inputs {
        if let crw_chain::transparent::Input::PrevOut { outpoint, .. } = input {
            if !seen.insert(outpoint) {
                return Err(TransactionError::DuplicateOutPoint);
            }
        }
    }
    Ok(())
}

/// Checks that `tx` serializes to no more than the maximum transaction size.
pub fn is_not_too_large(tx: &Transaction) -> Result<(), TransactionError> {
    if tx.len() as u64 > crw_chain::transaction::MAX_TX_SIZE {
        return Err(TransactionError::ExceedsSizeLimit);
    }
    Ok(())
}
