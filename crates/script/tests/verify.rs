//! End-to-end tests of the stable verification API.

use baddcoin_primitives::hash::{hash160, sha256};
use baddcoin_primitives::{OutPoint, Transaction, TxIn, TxOut, SEQUENCE_FINAL};
use baddcoin_script::sighash::{signature_hash, SigVersion, SighashType, SIGHASH_ALL};
use baddcoin_script::verify::{
    consensus_version, verify_script, verify_script_with_amount, VerifyError,
    VERIFY_CHECKLOCKTIMEVERIFY, VERIFY_DERSIG, VERIFY_NULLDUMMY, VERIFY_P2SH, VERIFY_WITNESS,
};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};

const VERIFY_ALL: u32 = baddcoin_script::verify::VERIFY_ALL;

const OP_1: u8 = 0x51;
const OP_DUP: u8 = 0x76;
const OP_EQUAL: u8 = 0x87;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_HASH160: u8 = 0xa9;
const OP_CHECKLOCKTIMEVERIFY: u8 = 0xb1;
const OP_CHECKSIG: u8 = 0xac;
const OP_CHECKMULTISIG: u8 = 0xae;

fn keypair(seed: u8) -> (SecretKey, PublicKey) {
    let secp = Secp256k1::new();
    let secret = SecretKey::from_slice(&[seed; 32]).expect("valid secret key");
    let public = PublicKey::from_secret_key(&secp, &secret);
    (secret, public)
}

fn push(data: &[u8]) -> Vec<u8> {
    assert!(data.len() <= 75);
    let mut out = vec![data.len() as u8];
    out.extend_from_slice(data);
    out
}

fn p2pkh_script(pubkey: &PublicKey) -> Vec<u8> {
    let hash = hash160(&pubkey.serialize());
    let mut script = vec![OP_DUP, OP_HASH160, 0x14];
    script.extend_from_slice(&hash);
    script.push(OP_EQUALVERIFY);
    script.push(OP_CHECKSIG);
    script
}

fn p2sh_script(redeem_script: &[u8]) -> Vec<u8> {
    let hash = hash160(redeem_script);
    let mut script = vec![OP_HASH160, 0x14];
    script.extend_from_slice(&hash);
    script.push(OP_EQUAL);
    script
}

fn spending_tx() -> Transaction {
    Transaction {
        version: 2,
        inputs: vec![TxIn {
            prevout: OutPoint {
                hash: [0x11; 32],
                index: 0,
            },
            script_sig: Vec::new(),
            sequence: SEQUENCE_FINAL,
            witness: Vec::new(),
        }],
        outputs: vec![TxOut {
            value: 4_999_000_000,
            script_pubkey: vec![OP_1],
        }],
        lock_time: 0,
    }
}

fn sign_legacy(tx: &Transaction, input: usize, script_code: &[u8], secret: &SecretKey) -> Vec<u8> {
    let secp = Secp256k1::new();
    let digest = signature_hash(
        script_code,
        tx,
        input,
        SighashType(SIGHASH_ALL),
        0,
        SigVersion::Base,
    );
    let message = Message::from_digest_slice(&digest).expect("32-byte digest");
    let mut signature = secp.sign_ecdsa(&message, secret).serialize_der().to_vec();
    signature.push(SIGHASH_ALL as u8);
    signature
}

fn sign_witness(
    tx: &Transaction,
    input: usize,
    script_code: &[u8],
    amount: i64,
    secret: &SecretKey,
) -> Vec<u8> {
    let secp = Secp256k1::new();
    let digest = signature_hash(
        script_code,
        tx,
        input,
        SighashType(SIGHASH_ALL),
        amount,
        SigVersion::WitnessV0,
    );
    let message = Message::from_digest_slice(&digest).expect("32-byte digest");
    let mut signature = secp.sign_ecdsa(&message, secret).serialize_der().to_vec();
    signature.push(SIGHASH_ALL as u8);
    signature
}

#[test]
fn reports_api_version_one() {
    assert_eq!(consensus_version(), 1);
}

#[test]
fn p2pkh_spend_verifies() {
    let (secret, public) = keypair(1);
    let script_pubkey = p2pkh_script(&public);

    let mut tx = spending_tx();
    let signature = sign_legacy(&tx, 0, &script_pubkey, &secret);
    let mut script_sig = push(&signature);
    script_sig.extend_from_slice(&push(&public.serialize()));
    tx.inputs[0].script_sig = script_sig;
    let bytes = tx.to_bytes();

    assert_eq!(
        verify_script(&script_pubkey, &bytes, 0, VERIFY_P2SH | VERIFY_DERSIG),
        Ok(true)
    );

    // The same spend against another key's output is rejected.
    let (_, other) = keypair(2);
    assert_eq!(
        verify_script(&p2pkh_script(&other), &bytes, 0, VERIFY_P2SH),
        Ok(false)
    );
}

#[test]
fn p2sh_redeem_script_executes() {
    let redeem_script = vec![OP_1];
    let script_pubkey = p2sh_script(&redeem_script);

    let mut tx = spending_tx();
    tx.inputs[0].script_sig = push(&redeem_script);
    let bytes = tx.to_bytes();

    assert_eq!(verify_script(&script_pubkey, &bytes, 0, VERIFY_P2SH), Ok(true));

    // Wrong redeem script hash.
    let other = p2sh_script(&[OP_1, OP_1]);
    assert_eq!(verify_script(&other, &bytes, 0, VERIFY_P2SH), Ok(false));
}

/// The flags argument alone decides the verdict for a lax-DER signature.
#[test]
fn dersig_flag_flips_verdict() {
    let (secret, public) = keypair(1);
    let mut script_pubkey = push(&public.serialize());
    script_pubkey.push(OP_CHECKSIG);

    let mut tx = spending_tx();
    let secp = Secp256k1::new();
    let digest = signature_hash(
        &script_pubkey,
        &tx,
        0,
        SighashType(SIGHASH_ALL),
        0,
        SigVersion::Base,
    );
    let message = Message::from_digest_slice(&digest).expect("32-byte digest");
    let compact = secp.sign_ecdsa(&message, &secret).serialize_compact();
    let mut signature = lax_der_signature(&compact);
    signature.push(SIGHASH_ALL as u8);
    tx.inputs[0].script_sig = push(&signature);
    let bytes = tx.to_bytes();

    assert_eq!(verify_script(&script_pubkey, &bytes, 0, VERIFY_P2SH), Ok(true));
    assert_eq!(
        verify_script(&script_pubkey, &bytes, 0, VERIFY_P2SH | VERIFY_DERSIG),
        Ok(false)
    );
}

/// DER encoding with two redundant leading zero bytes in R: accepted by the
/// historic lax parser, rejected by strict DER.
fn lax_der_signature(compact: &[u8; 64]) -> Vec<u8> {
    let mut r = vec![0u8, 0u8];
    r.extend_from_slice(&compact[..32]);
    let s = canonical_integer(&compact[32..]);

    let mut out = vec![0x30, (4 + r.len() + s.len()) as u8, 0x02, r.len() as u8];
    out.extend_from_slice(&r);
    out.push(0x02);
    out.push(s.len() as u8);
    out.extend_from_slice(&s);
    out
}

fn canonical_integer(bytes: &[u8]) -> Vec<u8> {
    let mut start = 0;
    while start < bytes.len() - 1 && bytes[start] == 0 {
        start += 1;
    }
    let mut out = Vec::new();
    if bytes[start] & 0x80 != 0 {
        out.push(0);
    }
    out.extend_from_slice(&bytes[start..]);
    out
}

#[test]
fn p2wpkh_spend_verifies() {
    let (secret, public) = keypair(1);
    let pubkey_hash = hash160(&public.serialize());
    let mut script_pubkey = vec![0x00, 0x14];
    script_pubkey.extend_from_slice(&pubkey_hash);

    let amount = 100_000;
    let mut tx = spending_tx();
    let script_code = p2pkh_script(&public);
    let signature = sign_witness(&tx, 0, &script_code, amount, &secret);
    tx.inputs[0].witness = vec![signature, public.serialize().to_vec()];
    let bytes = tx.to_bytes();

    assert_eq!(
        verify_script_with_amount(&script_pubkey, amount, &bytes, 0, VERIFY_ALL),
        Ok(true)
    );
    // The witness digest commits to the amount.
    assert_eq!(
        verify_script_with_amount(&script_pubkey, amount + 1, &bytes, 0, VERIFY_ALL),
        Ok(false)
    );
}

#[test]
fn p2wsh_spend_verifies() {
    let (secret, public) = keypair(1);
    let mut witness_script = push(&public.serialize());
    witness_script.push(OP_CHECKSIG);
    let mut script_pubkey = vec![0x00, 0x20];
    script_pubkey.extend_from_slice(&sha256(&witness_script));

    let amount = 250_000;
    let mut tx = spending_tx();
    let signature = sign_witness(&tx, 0, &witness_script, amount, &secret);
    tx.inputs[0].witness = vec![signature, witness_script];
    let bytes = tx.to_bytes();

    assert_eq!(
        verify_script_with_amount(&script_pubkey, amount, &bytes, 0, VERIFY_ALL),
        Ok(true)
    );
}

#[test]
fn p2sh_wrapped_p2wpkh_spend_verifies() {
    let (secret, public) = keypair(1);
    let pubkey_hash = hash160(&public.serialize());
    let mut redeem_script = vec![0x00, 0x14];
    redeem_script.extend_from_slice(&pubkey_hash);
    let script_pubkey = p2sh_script(&redeem_script);

    let amount = 75_000;
    let mut tx = spending_tx();
    let script_code = p2pkh_script(&public);
    let signature = sign_witness(&tx, 0, &script_code, amount, &secret);
    tx.inputs[0].script_sig = push(&redeem_script);
    tx.inputs[0].witness = vec![signature, public.serialize().to_vec()];
    let bytes = tx.to_bytes();

    assert_eq!(
        verify_script_with_amount(&script_pubkey, amount, &bytes, 0, VERIFY_ALL),
        Ok(true)
    );
}

#[test]
fn stray_witness_rejected() {
    let (secret, public) = keypair(1);
    let script_pubkey = p2pkh_script(&public);

    let mut tx = spending_tx();
    let signature = sign_legacy(&tx, 0, &script_pubkey, &secret);
    let mut script_sig = push(&signature);
    script_sig.extend_from_slice(&push(&public.serialize()));
    tx.inputs[0].script_sig = script_sig;
    tx.inputs[0].witness = vec![vec![0x01]];
    let bytes = tx.to_bytes();

    assert_eq!(
        verify_script_with_amount(&script_pubkey, 0, &bytes, 0, VERIFY_ALL),
        Ok(false)
    );
}

#[test]
fn nulldummy_flag_flips_verdict() {
    let (secret, public) = keypair(1);
    // Bare 1-of-1 multisig output.
    let mut script_pubkey = vec![OP_1];
    script_pubkey.extend_from_slice(&push(&public.serialize()));
    script_pubkey.push(OP_1);
    script_pubkey.push(OP_CHECKMULTISIG);

    let mut tx = spending_tx();
    let signature = sign_legacy(&tx, 0, &script_pubkey, &secret);
    // Non-empty dummy element.
    let mut script_sig = vec![OP_1];
    script_sig.extend_from_slice(&push(&signature));
    tx.inputs[0].script_sig = script_sig;
    let bytes = tx.to_bytes();

    assert_eq!(verify_script(&script_pubkey, &bytes, 0, VERIFY_P2SH), Ok(true));
    assert_eq!(
        verify_script(&script_pubkey, &bytes, 0, VERIFY_P2SH | VERIFY_NULLDUMMY),
        Ok(false)
    );
}

#[test]
fn locktime_rule_enforced_through_api() {
    let mut tx = spending_tx();
    tx.lock_time = 100;
    tx.inputs[0].sequence = 0xffff_fffe;
    let bytes = tx.to_bytes();

    // <99> CHECKLOCKTIMEVERIFY leaves a truthy stack when satisfied.
    let satisfied = vec![0x01, 99, OP_CHECKLOCKTIMEVERIFY];
    assert_eq!(
        verify_script(&satisfied, &bytes, 0, VERIFY_CHECKLOCKTIMEVERIFY),
        Ok(true)
    );

    let unsatisfied = vec![0x01, 101, OP_CHECKLOCKTIMEVERIFY];
    assert_eq!(
        verify_script(&unsatisfied, &bytes, 0, VERIFY_CHECKLOCKTIMEVERIFY),
        Ok(false)
    );
    // Without the flag the opcode is a no-op and the spend stands.
    assert_eq!(verify_script(&unsatisfied, &bytes, 0, VERIFY_P2SH), Ok(true));
}

#[test]
fn witness_flag_without_amount_is_rejected() {
    let tx = spending_tx();
    let bytes = tx.to_bytes();
    assert_eq!(
        verify_script(&[OP_1], &bytes, 0, VERIFY_ALL),
        Err(VerifyError::AmountRequired)
    );
    assert_eq!(
        verify_script(&[OP_1], &bytes, 0, VERIFY_WITNESS),
        Err(VerifyError::AmountRequired)
    );
}

#[test]
fn input_index_out_of_range_is_rejected() {
    let tx = spending_tx();
    let bytes = tx.to_bytes();
    assert_eq!(
        verify_script(&[OP_1], &bytes, 1, VERIFY_P2SH),
        Err(VerifyError::TxIndex)
    );
    assert_eq!(
        verify_script_with_amount(&[OP_1], 0, &bytes, 7, VERIFY_ALL),
        Err(VerifyError::TxIndex)
    );
}

#[test]
fn unknown_flag_bits_are_rejected() {
    let tx = spending_tx();
    let bytes = tx.to_bytes();
    assert_eq!(
        verify_script(&[OP_1], &bytes, 0, 1 << 20),
        Err(VerifyError::InvalidFlags)
    );
    // Interpreter-internal bits are not part of the stable surface.
    assert_eq!(
        verify_script(&[OP_1], &bytes, 0, VERIFY_P2SH | (1 << 1)),
        Err(VerifyError::InvalidFlags)
    );
}

#[test]
fn malformed_transactions_are_rejected() {
    assert_eq!(
        verify_script(&[OP_1], &[0xde, 0xad, 0xbe], 0, VERIFY_P2SH),
        Err(VerifyError::TxDeserialize)
    );

    let mut bytes = spending_tx().to_bytes();
    bytes.push(0x00);
    assert_eq!(
        verify_script(&[OP_1], &bytes, 0, VERIFY_P2SH),
        Err(VerifyError::TxSizeMismatch)
    );
}
