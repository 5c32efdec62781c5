//! Table-driven interpreter cases from tests/vectors/scripts.json.

use baddcoin_primitives::{OutPoint, Transaction, TxIn, TxOut, SEQUENCE_FINAL};
use baddcoin_script::interpreter::{
    verify_script, ScriptError, TransactionSignatureChecker, VerifyFlags,
};

fn hex_to_bytes(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    let mut bytes = Vec::with_capacity(hex.len() / 2);
    let mut iter = hex.as_bytes().iter().copied();
    while let (Some(high), Some(low)) = (iter.next(), iter.next()) {
        let high = (high as char).to_digit(16)? as u8;
        let low = (low as char).to_digit(16)? as u8;
        bytes.push(high << 4 | low);
    }
    Some(bytes)
}

fn parse_flags(names: &str) -> VerifyFlags {
    let mut flags = VerifyFlags::NONE;
    for token in names.split(',') {
        flags |= match token.trim() {
            "NONE" => VerifyFlags::NONE,
            "P2SH" => VerifyFlags::P2SH,
            "DERSIG" => VerifyFlags::DERSIG,
            "NULLDUMMY" => VerifyFlags::NULLDUMMY,
            "MINIMALDATA" => VerifyFlags::MINIMALDATA,
            "DISCOURAGE_UPGRADABLE_NOPS" => VerifyFlags::DISCOURAGE_UPGRADABLE_NOPS,
            "CLEANSTACK" => VerifyFlags::CLEANSTACK,
            "CHECKLOCKTIMEVERIFY" => VerifyFlags::CHECKLOCKTIMEVERIFY,
            "CHECKSEQUENCEVERIFY" => VerifyFlags::CHECKSEQUENCEVERIFY,
            "WITNESS" => VerifyFlags::WITNESS,
            other => panic!("unknown flag token {other:?}"),
        };
    }
    flags
}

fn expected_result(token: &str) -> Result<(), ScriptError> {
    match token {
        "OK" => Ok(()),
        "EVAL_FALSE" => Err(ScriptError::EvalFalse),
        "OP_RETURN" => Err(ScriptError::OpReturn),
        "VERIFY" => Err(ScriptError::Verify),
        "EQUALVERIFY" => Err(ScriptError::EqualVerify),
        "NUMEQUALVERIFY" => Err(ScriptError::NumEqualVerify),
        "BAD_OPCODE" => Err(ScriptError::BadOpcode),
        "DISABLED_OPCODE" => Err(ScriptError::DisabledOpcode),
        "UNBALANCED_CONDITIONAL" => Err(ScriptError::UnbalancedConditional),
        "MINIMALDATA" => Err(ScriptError::MinimalData),
        "SIG_PUSHONLY" => Err(ScriptError::SigPushOnly),
        "CLEANSTACK" => Err(ScriptError::CleanStack),
        other => panic!("unknown expected result {other:?}"),
    }
}

fn dummy_tx() -> Transaction {
    Transaction {
        version: 1,
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
            value: 1_000,
            script_pubkey: vec![0x51],
        }],
        lock_time: 0,
    }
}

#[test]
fn script_vectors() {
    let vectors = include_str!("vectors/scripts.json");
    let rows: Vec<serde_json::Value> = serde_json::from_str(vectors).expect("parse script vectors");
    let tx = dummy_tx();
    let checker = TransactionSignatureChecker::new(&tx, 0, 0);
    let mut exercised = 0usize;

    for row in rows {
        let values = row.as_array().expect("vector row");
        if values.len() == 1 {
            // Comment row.
            continue;
        }
        assert_eq!(values.len(), 4, "unexpected script vector row {row}");

        let script_sig = hex_to_bytes(values[0].as_str().expect("scriptSig hex")).expect("hex");
        let script_pubkey =
            hex_to_bytes(values[1].as_str().expect("scriptPubKey hex")).expect("hex");
        let flags = parse_flags(values[2].as_str().expect("flags"));
        let expected = expected_result(values[3].as_str().expect("expected"));

        let result = verify_script(&script_sig, &script_pubkey, &[], flags, &checker);
        assert_eq!(result, expected, "vector {row} diverged");
        exercised += 1;
    }
    assert!(exercised >= 30, "expected to exercise the full table");
}
