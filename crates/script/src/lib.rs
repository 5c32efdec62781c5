//! Script verification and signature hashing.

pub mod batch;
pub mod interpreter;
pub mod sighash;
pub mod standard;
pub mod verify;

pub use batch::{verify_transaction_scripts, BatchError, SpentOutput};
pub use interpreter::{ScriptError, TransactionSignatureChecker, VerifyFlags};
pub use sighash::{signature_hash, SigVersion, SighashType};
pub use verify::{
    block_script_flags, consensus_version, verify_script, verify_script_with_amount, VerifyError,
};
