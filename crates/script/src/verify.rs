//! Stable verification API.
//!
//! A re-expression of the external C verification surface as safe Rust:
//! byte slices in, a pass/fail verdict plus a small error enumeration out.
//! Flag bit values and the error list are a compatibility contract and
//! must not change between releases.

use baddcoin_consensus::params::ConsensusParams;
use baddcoin_primitives::encoding::Decoder;
use baddcoin_primitives::transaction::Transaction;

use crate::interpreter::{verify_script as eval_verify, TransactionSignatureChecker, VerifyFlags};

/// Version of this API, for compatibility checks by external callers.
pub const API_VERSION: u32 = 1;

pub const VERIFY_NONE: u32 = 0;
/// Evaluate P2SH (BIP16) subscripts.
pub const VERIFY_P2SH: u32 = 1 << 0;
/// Enforce strict DER (BIP66) compliance.
pub const VERIFY_DERSIG: u32 = 1 << 2;
/// Enforce NULLDUMMY (BIP147).
pub const VERIFY_NULLDUMMY: u32 = 1 << 4;
/// Enable CHECKLOCKTIMEVERIFY (BIP65).
pub const VERIFY_CHECKLOCKTIMEVERIFY: u32 = 1 << 9;
/// Enable CHECKSEQUENCEVERIFY (BIP112).
pub const VERIFY_CHECKSEQUENCEVERIFY: u32 = 1 << 10;
/// Enable WITNESS (BIP141).
pub const VERIFY_WITNESS: u32 = 1 << 11;
/// Union of every flag this API accepts.
pub const VERIFY_ALL: u32 = VERIFY_P2SH
    | VERIFY_DERSIG
    | VERIFY_NULLDUMMY
    | VERIFY_CHECKLOCKTIMEVERIFY
    | VERIFY_CHECKSEQUENCEVERIFY
    | VERIFY_WITNESS;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum VerifyError {
    /// The input index does not address an input of the transaction.
    TxIndex,
    /// The transaction deserialized to fewer bytes than were supplied.
    TxSizeMismatch,
    /// The transaction bytes do not deserialize.
    TxDeserialize,
    /// The witness flag requires the spent output amount.
    AmountRequired,
    /// Unrecognized bits in the flags argument.
    InvalidFlags,
}

impl std::fmt::Display for VerifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerifyError::TxIndex => write!(f, "input index out of range"),
            VerifyError::TxSizeMismatch => write!(f, "serialized transaction size mismatch"),
            VerifyError::TxDeserialize => write!(f, "transaction deserialization failed"),
            VerifyError::AmountRequired => {
                write!(f, "amount is required when witness verification is enabled")
            }
            VerifyError::InvalidFlags => write!(f, "unrecognized verification flags"),
        }
    }
}

impl std::error::Error for VerifyError {}

pub fn consensus_version() -> u32 {
    API_VERSION
}

/// Verifies that input `n_in` of the serialized transaction correctly
/// spends `script_pubkey` under the given flags.
///
/// `Ok(true)` means the spend is valid, `Ok(false)` that the script was
/// rejected; `Err` reports a malformed call rather than a verdict.
pub fn verify_script(
    script_pubkey: &[u8],
    tx_to: &[u8],
    n_in: usize,
    flags: u32,
) -> Result<bool, VerifyError> {
    // The legacy entry point cannot bind an amount into the signature hash.
    if flags & VERIFY_WITNESS != 0 {
        return Err(VerifyError::AmountRequired);
    }
    verify_with(script_pubkey, 0, tx_to, n_in, flags)
}

/// As [`verify_script`], with the spent output amount bound in so witness
/// signature hashes can commit to it.
pub fn verify_script_with_amount(
    script_pubkey: &[u8],
    amount: i64,
    tx_to: &[u8],
    n_in: usize,
    flags: u32,
) -> Result<bool, VerifyError> {
    verify_with(script_pubkey, amount, tx_to, n_in, flags)
}

fn verify_with(
    script_pubkey: &[u8],
    amount: i64,
    tx_to: &[u8],
    n_in: usize,
    flags: u32,
) -> Result<bool, VerifyError> {
    if flags & !VERIFY_ALL != 0 {
        return Err(VerifyError::InvalidFlags);
    }

    let mut decoder = Decoder::new(tx_to);
    let tx = Transaction::consensus_decode(&mut decoder).map_err(|err| {
        baddcoin_log::log_debug!("transaction deserialization failed: {err}");
        VerifyError::TxDeserialize
    })?;
    if n_in >= tx.inputs.len() {
        return Err(VerifyError::TxIndex);
    }
    if !decoder.is_empty() {
        return Err(VerifyError::TxSizeMismatch);
    }

    let checker = TransactionSignatureChecker::new(&tx, n_in, amount);
    let input = &tx.inputs[n_in];
    match eval_verify(
        &input.script_sig,
        script_pubkey,
        &input.witness,
        VerifyFlags::from_bits(flags),
        &checker,
    ) {
        Ok(()) => Ok(true),
        Err(err) => {
            baddcoin_log::log_debug!("script verification failed on input {n_in}: {err}");
            Ok(false)
        }
    }
}

/// Script flags effective for a block at the given height.
///
/// Derived fresh per validation call from the buried softfork heights;
/// never persisted.
pub fn block_script_flags(params: &ConsensusParams, height: i32) -> VerifyFlags {
    let mut flags = VerifyFlags::P2SH;
    if height >= params.bip66_height {
        flags |= VerifyFlags::DERSIG;
    }
    if height >= params.bip65_height {
        flags |= VerifyFlags::CHECKLOCKTIMEVERIFY;
    }
    if height >= params.csv_height {
        flags |= VerifyFlags::CHECKSEQUENCEVERIFY;
    }
    if height >= params.segwit_height {
        flags |= VerifyFlags::WITNESS | VerifyFlags::NULLDUMMY;
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_bit_values_are_stable() {
        assert_eq!(VERIFY_P2SH, 1);
        assert_eq!(VERIFY_DERSIG, 4);
        assert_eq!(VERIFY_NULLDUMMY, 16);
        assert_eq!(VERIFY_CHECKLOCKTIMEVERIFY, 512);
        assert_eq!(VERIFY_CHECKSEQUENCEVERIFY, 1024);
        assert_eq!(VERIFY_WITNESS, 2048);
        assert_eq!(VERIFY_ALL, 1 | 4 | 16 | 512 | 1024 | 2048);
        assert_eq!(consensus_version(), 1);
    }

    #[test]
    fn typed_flags_match_raw_bits() {
        assert_eq!(VerifyFlags::P2SH.bits(), VERIFY_P2SH);
        assert_eq!(VerifyFlags::DERSIG.bits(), VERIFY_DERSIG);
        assert_eq!(VerifyFlags::NULLDUMMY.bits(), VERIFY_NULLDUMMY);
        assert_eq!(
            VerifyFlags::CHECKLOCKTIMEVERIFY.bits(),
            VERIFY_CHECKLOCKTIMEVERIFY
        );
        assert_eq!(
            VerifyFlags::CHECKSEQUENCEVERIFY.bits(),
            VERIFY_CHECKSEQUENCEVERIFY
        );
        assert_eq!(VerifyFlags::WITNESS.bits(), VERIFY_WITNESS);
    }

    #[test]
    fn buried_softforks_active_from_genesis() {
        let params = baddcoin_consensus::chain_params(baddcoin_consensus::Network::Mainnet).consensus;
        let flags = block_script_flags(&params, 0);
        assert!(flags.contains(VerifyFlags::P2SH));
        assert!(flags.contains(VerifyFlags::DERSIG));
        assert!(flags.contains(VerifyFlags::CHECKLOCKTIMEVERIFY));
        assert!(flags.contains(VerifyFlags::CHECKSEQUENCEVERIFY));
        assert!(flags.contains(VerifyFlags::WITNESS));
        assert!(flags.contains(VerifyFlags::NULLDUMMY));
    }

    #[test]
    fn disabled_segwit_height_never_activates() {
        use baddcoin_consensus::RegtestOptions;

        let options = RegtestOptions {
            segwit_height: Some(-1),
            version_bits_params: Vec::new(),
        };
        let params = baddcoin_consensus::regtest_chain_params_with(&options)
            .expect("valid overrides")
            .consensus;
        for height in [0, 1_000_000, i32::MAX - 1] {
            let flags = block_script_flags(&params, height);
            assert!(!flags.contains(VerifyFlags::WITNESS));
            assert!(!flags.contains(VerifyFlags::NULLDUMMY));
        }
    }
}
