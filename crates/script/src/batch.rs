//! Parallel script verification across a transaction's inputs.
//!
//! Inputs share no mutable state, so each one can be checked on its own
//! worker; callers hand the whole transaction to the rayon pool and get
//! back the first failure, if any.

use baddcoin_primitives::transaction::Transaction;
use rayon::prelude::*;

use crate::interpreter::{ScriptError, TransactionSignatureChecker, VerifyFlags};

/// The output consumed by one transaction input.
#[derive(Clone, Debug)]
pub struct SpentOutput {
    pub script_pubkey: Vec<u8>,
    pub value: i64,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum BatchError {
    /// One spent output must be supplied per input.
    SpentOutputMismatch,
    /// Script verification failed for the given input.
    Input { index: usize, error: ScriptError },
}

impl std::fmt::Display for BatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchError::SpentOutputMismatch => {
                write!(f, "spent output count does not match input count")
            }
            BatchError::Input { index, error } => {
                write!(f, "script verification failed on input {index}: {error}")
            }
        }
    }
}

impl std::error::Error for BatchError {}

/// Verifies every input of `tx` against its spent output concurrently.
pub fn verify_transaction_scripts(
    tx: &Transaction,
    spent_outputs: &[SpentOutput],
    flags: VerifyFlags,
) -> Result<(), BatchError> {
    if spent_outputs.len() != tx.inputs.len() {
        return Err(BatchError::SpentOutputMismatch);
    }

    tx.inputs
        .par_iter()
        .enumerate()
        .try_for_each(|(index, input)| {
            let spent = &spent_outputs[index];
            let checker = TransactionSignatureChecker::new(tx, index, spent.value);
            crate::interpreter::verify_script(
                &input.script_sig,
                &spent.script_pubkey,
                &input.witness,
                flags,
                &checker,
            )
            .map_err(|error| BatchError::Input { index, error })
        })
}
