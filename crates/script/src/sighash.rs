//! Transaction signature hashing.
//!
//! Legacy hashing covers base and P2SH spends; witness v0 spends commit to
//! the spent amount and the precomputable prevout/sequence/output digests.

use baddcoin_primitives::encoding::{Encodable, Encoder};
use baddcoin_primitives::hash::{sha256d, Hash256};
use baddcoin_primitives::transaction::Transaction;

use crate::standard::next_instruction;

pub const SIGHASH_ALL: u32 = 0x01;
pub const SIGHASH_NONE: u32 = 0x02;
pub const SIGHASH_SINGLE: u32 = 0x03;
pub const SIGHASH_ANYONECANPAY: u32 = 0x80;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SighashType(pub u32);

impl SighashType {
    pub fn base_type(self) -> u32 {
        self.0 & 0x1f
    }

    pub fn has_anyone_can_pay(self) -> bool {
        (self.0 & SIGHASH_ANYONECANPAY) != 0
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SigVersion {
    Base,
    WitnessV0,
}

const OP_CODESEPARATOR: u8 = 0xab;

/// Hash signed in place of transaction data when a legacy SIGHASH_SINGLE
/// input has no matching output.
const ONE_HASH: Hash256 = [
    1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0,
];

/// Computes the digest a signature over `input_index` commits to.
///
/// `input_index` must address an existing input; callers validate it first.
pub fn signature_hash(
    script_code: &[u8],
    tx: &Transaction,
    input_index: usize,
    sighash_type: SighashType,
    amount: i64,
    sigversion: SigVersion,
) -> Hash256 {
    match sigversion {
        SigVersion::Base => legacy_signature_hash(script_code, tx, input_index, sighash_type),
        SigVersion::WitnessV0 => {
            witness_signature_hash(script_code, tx, input_index, sighash_type, amount)
        }
    }
}

fn legacy_signature_hash(
    script_code: &[u8],
    tx: &Transaction,
    input_index: usize,
    sighash_type: SighashType,
) -> Hash256 {
    debug_assert!(input_index < tx.inputs.len());
    let anyone_can_pay = sighash_type.has_anyone_can_pay();
    let base = sighash_type.base_type();

    // Historic quirk: signing SIGHASH_SINGLE with no matching output hashes
    // the constant one instead of failing.
    if base == SIGHASH_SINGLE && input_index >= tx.outputs.len() {
        return ONE_HASH;
    }

    let script_code = strip_code_separators(script_code);

    let mut encoder = Encoder::new();
    encoder.write_i32_le(tx.version);

    let input_count = if anyone_can_pay { 1 } else { tx.inputs.len() };
    encoder.write_varint(input_count as u64);
    for idx in 0..input_count {
        let actual_index = if anyone_can_pay { input_index } else { idx };
        let input = &tx.inputs[actual_index];
        input.prevout.consensus_encode(&mut encoder);
        let is_signing = actual_index == input_index;
        if is_signing {
            encoder.write_var_bytes(&script_code);
        } else {
            encoder.write_varint(0);
        }
        if !is_signing && (base == SIGHASH_NONE || base == SIGHASH_SINGLE) {
            encoder.write_u32_le(0);
        } else {
            encoder.write_u32_le(input.sequence);
        }
    }

    let output_count = if base == SIGHASH_NONE {
        0
    } else if base == SIGHASH_SINGLE {
        input_index + 1
    } else {
        tx.outputs.len()
    };
    encoder.write_varint(output_count as u64);
    for idx in 0..output_count {
        if base == SIGHASH_SINGLE && idx != input_index {
            // Blanked outputs before the matching one.
            encoder.write_i64_le(-1);
            encoder.write_varint(0);
        } else {
            tx.outputs[idx].consensus_encode(&mut encoder);
        }
    }

    encoder.write_u32_le(tx.lock_time);
    encoder.write_u32_le(sighash_type.0);
    sha256d(&encoder.into_inner())
}

fn witness_signature_hash(
    script_code: &[u8],
    tx: &Transaction,
    input_index: usize,
    sighash_type: SighashType,
    amount: i64,
) -> Hash256 {
    debug_assert!(input_index < tx.inputs.len());
    let anyone_can_pay = sighash_type.has_anyone_can_pay();
    let base = sighash_type.base_type();

    let hash_prevouts = if !anyone_can_pay {
        let mut encoder = Encoder::new();
        for input in &tx.inputs {
            input.prevout.consensus_encode(&mut encoder);
        }
        sha256d(&encoder.into_inner())
    } else {
        [0u8; 32]
    };

    let hash_sequence = if !anyone_can_pay && base != SIGHASH_SINGLE && base != SIGHASH_NONE {
        let mut encoder = Encoder::new();
        for input in &tx.inputs {
            encoder.write_u32_le(input.sequence);
        }
        sha256d(&encoder.into_inner())
    } else {
        [0u8; 32]
    };

    let hash_outputs = if base != SIGHASH_SINGLE && base != SIGHASH_NONE {
        let mut encoder = Encoder::new();
        for output in &tx.outputs {
            output.consensus_encode(&mut encoder);
        }
        sha256d(&encoder.into_inner())
    } else if base == SIGHASH_SINGLE && input_index < tx.outputs.len() {
        let mut encoder = Encoder::new();
        tx.outputs[input_index].consensus_encode(&mut encoder);
        sha256d(&encoder.into_inner())
    } else {
        [0u8; 32]
    };

    let input = &tx.inputs[input_index];
    let mut encoder = Encoder::new();
    encoder.write_i32_le(tx.version);
    encoder.write_bytes(&hash_prevouts);
    encoder.write_bytes(&hash_sequence);
    input.prevout.consensus_encode(&mut encoder);
    encoder.write_var_bytes(script_code);
    encoder.write_i64_le(amount);
    encoder.write_u32_le(input.sequence);
    encoder.write_bytes(&hash_outputs);
    encoder.write_u32_le(tx.lock_time);
    encoder.write_u32_le(sighash_type.0);
    sha256d(&encoder.into_inner())
}

/// Drops OP_CODESEPARATOR occurrences from the script being committed to.
fn strip_code_separators(script: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(script.len());
    let mut cursor = 0usize;
    while cursor < script.len() {
        let next = next_instruction(script, cursor).unwrap_or(script.len());
        if script[cursor] != OP_CODESEPARATOR {
            out.extend_from_slice(&script[cursor..next]);
        }
        cursor = next;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use baddcoin_primitives::{OutPoint, TxIn, TxOut, SEQUENCE_FINAL};

    fn two_in_two_out() -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![
                TxIn {
                    prevout: OutPoint {
                        hash: [0x11; 32],
                        index: 0,
                    },
                    script_sig: Vec::new(),
                    sequence: SEQUENCE_FINAL,
                    witness: Vec::new(),
                },
                TxIn {
                    prevout: OutPoint {
                        hash: [0x22; 32],
                        index: 1,
                    },
                    script_sig: Vec::new(),
                    sequence: 0xffff_fffe,
                    witness: Vec::new(),
                },
            ],
            outputs: vec![
                TxOut {
                    value: 100,
                    script_pubkey: vec![0x51],
                },
                TxOut {
                    value: 200,
                    script_pubkey: vec![0x52],
                },
            ],
            lock_time: 0,
        }
    }

    #[test]
    fn single_without_matching_output_hashes_one() {
        let mut tx = two_in_two_out();
        tx.outputs.truncate(1);
        let hash = signature_hash(
            &[0xac],
            &tx,
            1,
            SighashType(SIGHASH_SINGLE),
            0,
            SigVersion::Base,
        );
        assert_eq!(hash, ONE_HASH);
    }

    #[test]
    fn code_separators_are_stripped() {
        let tx = two_in_two_out();
        let with_separator = vec![0x76, OP_CODESEPARATOR, 0xac];
        let without = vec![0x76, 0xac];
        let a = signature_hash(
            &with_separator,
            &tx,
            0,
            SighashType(SIGHASH_ALL),
            0,
            SigVersion::Base,
        );
        let b = signature_hash(&without, &tx, 0, SighashType(SIGHASH_ALL), 0, SigVersion::Base);
        assert_eq!(a, b);
    }

    #[test]
    fn sighash_types_produce_distinct_digests() {
        let tx = two_in_two_out();
        let script = vec![0xac];
        let all = signature_hash(&script, &tx, 0, SighashType(SIGHASH_ALL), 0, SigVersion::Base);
        let none = signature_hash(&script, &tx, 0, SighashType(SIGHASH_NONE), 0, SigVersion::Base);
        let single = signature_hash(
            &script,
            &tx,
            0,
            SighashType(SIGHASH_SINGLE),
            0,
            SigVersion::Base,
        );
        let anyone = signature_hash(
            &script,
            &tx,
            0,
            SighashType(SIGHASH_ALL | SIGHASH_ANYONECANPAY),
            0,
            SigVersion::Base,
        );
        assert_ne!(all, none);
        assert_ne!(all, single);
        assert_ne!(all, anyone);
        assert_ne!(none, single);
    }

    #[test]
    fn witness_digest_commits_to_amount() {
        let tx = two_in_two_out();
        let script = vec![0x76, 0xa9, 0x14];
        let a = signature_hash(
            &script,
            &tx,
            0,
            SighashType(SIGHASH_ALL),
            50_000,
            SigVersion::WitnessV0,
        );
        let b = signature_hash(
            &script,
            &tx,
            0,
            SighashType(SIGHASH_ALL),
            50_001,
            SigVersion::WitnessV0,
        );
        assert_ne!(a, b);

        // The legacy digest ignores the amount entirely.
        let c = signature_hash(
            &script,
            &tx,
            0,
            SighashType(SIGHASH_ALL),
            50_000,
            SigVersion::Base,
        );
        let d = signature_hash(
            &script,
            &tx,
            0,
            SighashType(SIGHASH_ALL),
            50_001,
            SigVersion::Base,
        );
        assert_eq!(c, d);
    }
}
