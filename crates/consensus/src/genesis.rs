//! Genesis block reconstruction and the startup self-check.

use baddcoin_primitives::{Block, BlockHeader, OutPoint, Transaction, TxIn, TxOut, SEQUENCE_FINAL};

use crate::params::ConsensusParams;

const GENESIS_TIMESTAMP: &str = "BBC NEWS 14/09/2020, coronavirus enters 2nd lockdown in UK";

const GENESIS_OUTPUT_PUBKEY: &str =
    "04efffc90487376698fa74540d0dcef6ce456bc132a5c7602df5275a65982bf99eeacd5f25894237b4bf9f79697748ae4e94ab2b975bf52ee29f60a1a2df6dd4e4";

const OP_CHECKSIG: u8 = 0xac;

/// Builds the genesis block from the declared parameter inputs.
///
/// The coinbase input carries the launch-era difficulty constant, the
/// number four, and the newspaper headline; the single output pays the
/// block reward to the founder key.
pub fn genesis_block(params: &ConsensusParams) -> Block {
    let mut script_sig = Vec::new();
    push_script_num(&mut script_sig, 504_365_040);
    push_script_num(&mut script_sig, 4);
    push_data(&mut script_sig, GENESIS_TIMESTAMP.as_bytes());

    let mut script_pubkey = Vec::new();
    push_data(&mut script_pubkey, &parse_hex(GENESIS_OUTPUT_PUBKEY));
    script_pubkey.push(OP_CHECKSIG);

    let coinbase = Transaction {
        version: 1,
        inputs: vec![TxIn {
            prevout: OutPoint::null(),
            script_sig,
            sequence: SEQUENCE_FINAL,
            witness: Vec::new(),
        }],
        outputs: vec![TxOut {
            value: params.genesis.reward,
            script_pubkey,
        }],
        lock_time: 0,
    };

    let merkle_root = coinbase.txid();
    Block {
        header: BlockHeader {
            version: params.genesis.version,
            prev_block: [0u8; 32],
            merkle_root,
            time: params.genesis.time,
            bits: params.genesis.bits,
            nonce: params.genesis.nonce,
        },
        transactions: vec![coinbase],
    }
}

/// Verifies that the reconstructed genesis block matches the pinned hash
/// and merkle root. A mismatch means the binary itself is miscompiled or
/// its parameters corrupted; that is an invariant violation, not a runtime
/// condition, so the process aborts.
pub(crate) fn check_genesis(params: &ConsensusParams) {
    let genesis = genesis_block(params);
    assert_eq!(
        genesis.hash(),
        params.hash_genesis_block,
        "{}: computed genesis block hash does not match the expected value",
        params.network.as_str()
    );
    assert_eq!(
        genesis.merkle_root(),
        params.genesis_merkle_root,
        "{}: computed genesis merkle root does not match the expected value",
        params.network.as_str()
    );
}

fn push_data(script: &mut Vec<u8>, data: &[u8]) {
    debug_assert!(data.len() <= 75, "direct pushes only");
    script.push(data.len() as u8);
    script.extend_from_slice(data);
}

fn push_script_num(script: &mut Vec<u8>, value: i64) {
    push_data(script, &script_num_encode(value));
}

fn script_num_encode(value: i64) -> Vec<u8> {
    if value == 0 {
        return Vec::new();
    }
    let negative = value < 0;
    let mut abs = value.unsigned_abs();
    let mut result = Vec::new();
    while abs > 0 {
        result.push((abs & 0xff) as u8);
        abs >>= 8;
    }
    if let Some(last) = result.last_mut() {
        if (*last & 0x80) != 0 {
            result.push(if negative { 0x80 } else { 0 });
        } else if negative {
            *last |= 0x80;
        }
    }
    result
}

fn parse_hex(hex: &str) -> Vec<u8> {
    debug_assert!(hex.len() % 2 == 0);
    (0..hex.len() / 2)
        .map(|i| {
            u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).expect("hard-coded hex is well-formed")
        })
        .collect()
}
