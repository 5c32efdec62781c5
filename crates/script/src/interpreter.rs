//! Script interpreter and validation.

use std::sync::OnceLock;

use baddcoin_consensus::constants::{
    LOCKTIME_THRESHOLD, MAX_OPS_PER_SCRIPT, MAX_PUBKEYS_PER_MULTISIG, MAX_SCRIPT_ELEMENT_SIZE,
    MAX_SCRIPT_SIZE, MAX_STACK_SIZE, SEQUENCE_LOCKTIME_DISABLE_FLAG, SEQUENCE_LOCKTIME_MASK,
    SEQUENCE_LOCKTIME_TYPE_FLAG,
};
use baddcoin_primitives::hash::{sha256, sha256d};
use baddcoin_primitives::transaction::{Transaction, SEQUENCE_FINAL};
use ripemd::{Digest as RipemdDigest, Ripemd160};
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1, VerifyOnly};
use sha1::Sha1;

use crate::sighash::{signature_hash, SigVersion, SighashType, SIGHASH_ANYONECANPAY, SIGHASH_SINGLE};
use crate::standard::{is_p2sh, is_push_only, next_instruction, parse_witness_program};

/// Typed set of script verification flags.
///
/// Bit positions are a stable contract shared with the verification API;
/// the raw integer form only appears at that boundary.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct VerifyFlags(u32);

impl VerifyFlags {
    pub const NONE: Self = Self(0);
    /// Evaluate P2SH subscripts.
    pub const P2SH: Self = Self(1 << 0);
    /// Enforce strict signature and pubkey encodings beyond DER.
    pub const STRICTENC: Self = Self(1 << 1);
    /// Enforce strict DER signature encoding.
    pub const DERSIG: Self = Self(1 << 2);
    /// Require low-S signatures.
    pub const LOW_S: Self = Self(1 << 3);
    /// Require the multisig dummy element to be empty.
    pub const NULLDUMMY: Self = Self(1 << 4);
    /// Require scriptSig to be push-only.
    pub const SIGPUSHONLY: Self = Self(1 << 5);
    /// Require minimal push encodings and minimal script numbers.
    pub const MINIMALDATA: Self = Self(1 << 6);
    /// Reject use of upgradable NOP opcodes.
    pub const DISCOURAGE_UPGRADABLE_NOPS: Self = Self(1 << 7);
    /// Require exactly one stack element after evaluation.
    pub const CLEANSTACK: Self = Self(1 << 8);
    /// Enable CHECKLOCKTIMEVERIFY.
    pub const CHECKLOCKTIMEVERIFY: Self = Self(1 << 9);
    /// Enable CHECKSEQUENCEVERIFY.
    pub const CHECKSEQUENCEVERIFY: Self = Self(1 << 10);
    /// Enable witness program evaluation.
    pub const WITNESS: Self = Self(1 << 11);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl std::ops::BitOr for VerifyFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for VerifyFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Flags applied by consensus when connecting blocks.
pub const MANDATORY_VERIFY_FLAGS: VerifyFlags = VerifyFlags::P2SH;

const OP_0: u8 = 0x00;
const OP_PUSHDATA1: u8 = 0x4c;
const OP_PUSHDATA2: u8 = 0x4d;
const OP_PUSHDATA4: u8 = 0x4e;
const OP_1NEGATE: u8 = 0x4f;
const OP_1: u8 = 0x51;
const OP_16: u8 = 0x60;
const OP_NOP: u8 = 0x61;
const OP_IF: u8 = 0x63;
const OP_NOTIF: u8 = 0x64;
const OP_VERIF: u8 = 0x65;
const OP_VERNOTIF: u8 = 0x66;
const OP_ELSE: u8 = 0x67;
const OP_ENDIF: u8 = 0x68;
const OP_VERIFY: u8 = 0x69;
const OP_RETURN: u8 = 0x6a;
const OP_TOALTSTACK: u8 = 0x6b;
const OP_FROMALTSTACK: u8 = 0x6c;
const OP_2DROP: u8 = 0x6d;
const OP_2DUP: u8 = 0x6e;
const OP_3DUP: u8 = 0x6f;
const OP_2OVER: u8 = 0x70;
const OP_2ROT: u8 = 0x71;
const OP_2SWAP: u8 = 0x72;
const OP_IFDUP: u8 = 0x73;
const OP_DEPTH: u8 = 0x74;
const OP_DROP: u8 = 0x75;
const OP_DUP: u8 = 0x76;
const OP_NIP: u8 = 0x77;
const OP_OVER: u8 = 0x78;
const OP_PICK: u8 = 0x79;
const OP_ROLL: u8 = 0x7a;
const OP_ROT: u8 = 0x7b;
const OP_SWAP: u8 = 0x7c;
const OP_TUCK: u8 = 0x7d;
const OP_CAT: u8 = 0x7e;
const OP_SUBSTR: u8 = 0x7f;
const OP_LEFT: u8 = 0x80;
const OP_RIGHT: u8 = 0x81;
const OP_SIZE: u8 = 0x82;
const OP_INVERT: u8 = 0x83;
const OP_AND: u8 = 0x84;
const OP_OR: u8 = 0x85;
const OP_XOR: u8 = 0x86;
const OP_EQUAL: u8 = 0x87;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_1ADD: u8 = 0x8b;
const OP_1SUB: u8 = 0x8c;
const OP_2MUL: u8 = 0x8d;
const OP_2DIV: u8 = 0x8e;
const OP_NEGATE: u8 = 0x8f;
const OP_ABS: u8 = 0x90;
const OP_NOT: u8 = 0x91;
const OP_0NOTEQUAL: u8 = 0x92;
const OP_ADD: u8 = 0x93;
const OP_SUB: u8 = 0x94;
const OP_MUL: u8 = 0x95;
const OP_DIV: u8 = 0x96;
const OP_MOD: u8 = 0x97;
const OP_LSHIFT: u8 = 0x98;
const OP_RSHIFT: u8 = 0x99;
const OP_BOOLAND: u8 = 0x9a;
const OP_BOOLOR: u8 = 0x9b;
const OP_NUMEQUAL: u8 = 0x9c;
const OP_NUMEQUALVERIFY: u8 = 0x9d;
const OP_NUMNOTEQUAL: u8 = 0x9e;
const OP_LESSTHAN: u8 = 0x9f;
const OP_GREATERTHAN: u8 = 0xa0;
const OP_LESSTHANOREQUAL: u8 = 0xa1;
const OP_GREATERTHANOREQUAL: u8 = 0xa2;
const OP_MIN: u8 = 0xa3;
const OP_MAX: u8 = 0xa4;
const OP_WITHIN: u8 = 0xa5;
const OP_RIPEMD160: u8 = 0xa6;
const OP_SHA1: u8 = 0xa7;
const OP_SHA256: u8 = 0xa8;
const OP_HASH160: u8 = 0xa9;
const OP_HASH256: u8 = 0xaa;
const OP_CODESEPARATOR: u8 = 0xab;
const OP_CHECKSIG: u8 = 0xac;
const OP_CHECKSIGVERIFY: u8 = 0xad;
const OP_CHECKMULTISIG: u8 = 0xae;
const OP_CHECKMULTISIGVERIFY: u8 = 0xaf;
const OP_NOP1: u8 = 0xb0;
const OP_CHECKLOCKTIMEVERIFY: u8 = 0xb1;
const OP_CHECKSEQUENCEVERIFY: u8 = 0xb2;
const OP_NOP4: u8 = 0xb3;
const OP_NOP10: u8 = 0xb9;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ScriptError {
    EvalFalse,
    OpReturn,
    ScriptSize,
    PushSize,
    OpCount,
    StackSize,
    SigCount,
    PubkeyCount,
    Verify,
    EqualVerify,
    CheckSigVerify,
    CheckMultiSigVerify,
    NumEqualVerify,
    BadOpcode,
    DisabledOpcode,
    InvalidStackOperation,
    InvalidAltstackOperation,
    UnbalancedConditional,
    ScriptNumOverflow,
    NegativeLockTime,
    UnsatisfiedLockTime,
    SigDer,
    SigHashType,
    SigHighS,
    SigNullDummy,
    PubkeyEncoding,
    MinimalData,
    SigPushOnly,
    CleanStack,
    WitnessProgramWrongLength,
    WitnessProgramWitnessEmpty,
    WitnessProgramMismatch,
    WitnessMalleated,
    WitnessMalleatedP2sh,
    WitnessUnexpected,
}

impl std::fmt::Display for ScriptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = match self {
            ScriptError::EvalFalse => "script evaluated without error but finished with a false/empty top stack element",
            ScriptError::OpReturn => "OP_RETURN was encountered",
            ScriptError::ScriptSize => "script is too big",
            ScriptError::PushSize => "push value size limit exceeded",
            ScriptError::OpCount => "operation limit exceeded",
            ScriptError::StackSize => "stack size limit exceeded",
            ScriptError::SigCount => "signature count negative or greater than pubkey count",
            ScriptError::PubkeyCount => "pubkey count negative or limit exceeded",
            ScriptError::Verify => "script failed an OP_VERIFY operation",
            ScriptError::EqualVerify => "script failed an OP_EQUALVERIFY operation",
            ScriptError::CheckSigVerify => "script failed an OP_CHECKSIGVERIFY operation",
            ScriptError::CheckMultiSigVerify => "script failed an OP_CHECKMULTISIGVERIFY operation",
            ScriptError::NumEqualVerify => "script failed an OP_NUMEQUALVERIFY operation",
            ScriptError::BadOpcode => "opcode missing or not understood",
            ScriptError::DisabledOpcode => "attempted to use a disabled opcode",
            ScriptError::InvalidStackOperation => "operation not valid with the current stack size",
            ScriptError::InvalidAltstackOperation => "operation not valid with the current altstack size",
            ScriptError::UnbalancedConditional => "invalid OP_IF construction",
            ScriptError::ScriptNumOverflow => "script number overflow",
            ScriptError::NegativeLockTime => "negative locktime",
            ScriptError::UnsatisfiedLockTime => "locktime requirement not satisfied",
            ScriptError::SigDer => "non-canonical DER signature",
            ScriptError::SigHashType => "signature hash type missing or not understood",
            ScriptError::SigHighS => "non-canonical signature: S value is unnecessarily high",
            ScriptError::SigNullDummy => "dummy CHECKMULTISIG argument must be zero",
            ScriptError::PubkeyEncoding => "public key is neither compressed or uncompressed",
            ScriptError::MinimalData => "data push larger than necessary",
            ScriptError::SigPushOnly => "only push operators allowed in signatures",
            ScriptError::CleanStack => "extra items left on stack after execution",
            ScriptError::WitnessProgramWrongLength => "witness program has incorrect length",
            ScriptError::WitnessProgramWitnessEmpty => "witness program was passed an empty witness",
            ScriptError::WitnessProgramMismatch => "witness program hash mismatch",
            ScriptError::WitnessMalleated => "witness requires empty scriptSig",
            ScriptError::WitnessMalleatedP2sh => "witness requires only-redeemscript scriptSig",
            ScriptError::WitnessUnexpected => "witness provided for non-witness script",
        };
        write!(f, "{message}")
    }
}

impl std::error::Error for ScriptError {}

static SECP256K1_VERIFY: OnceLock<Secp256k1<VerifyOnly>> = OnceLock::new();

fn secp256k1_verify() -> &'static Secp256k1<VerifyOnly> {
    SECP256K1_VERIFY.get_or_init(Secp256k1::verification_only)
}

/// Checks signatures, locktimes, and sequences against a spending transaction.
pub struct TransactionSignatureChecker<'a> {
    tx: &'a Transaction,
    input_index: usize,
    amount: i64,
}

impl<'a> TransactionSignatureChecker<'a> {
    pub fn new(tx: &'a Transaction, input_index: usize, amount: i64) -> Self {
        Self {
            tx,
            input_index,
            amount,
        }
    }

    fn check_sig(
        &self,
        sig_with_type: &[u8],
        pubkey_bytes: &[u8],
        script_code: &[u8],
        sigversion: SigVersion,
    ) -> bool {
        if sig_with_type.is_empty() || self.input_index >= self.tx.inputs.len() {
            return false;
        }
        let Ok(pubkey) = PublicKey::from_slice(pubkey_bytes) else {
            return false;
        };
        let (der, hash_type) = sig_with_type.split_at(sig_with_type.len() - 1);
        // Verification itself is always lax about the encoding; strictness
        // is a separate, flag-gated check.
        let Ok(mut sig) = Signature::from_der_lax(der) else {
            return false;
        };
        sig.normalize_s();

        let sighash = signature_hash(
            script_code,
            self.tx,
            self.input_index,
            SighashType(hash_type[0] as u32),
            self.amount,
            sigversion,
        );
        let Ok(message) = Message::from_digest_slice(&sighash) else {
            return false;
        };
        secp256k1_verify()
            .verify_ecdsa(&message, &sig, &pubkey)
            .is_ok()
    }

    fn check_lock_time(&self, lock_time: i64) -> bool {
        let tx_lock_time = self.tx.lock_time as i64;
        // Both values must be on the same side of the height/time divide.
        let same_kind = (tx_lock_time < LOCKTIME_THRESHOLD && lock_time < LOCKTIME_THRESHOLD)
            || (tx_lock_time >= LOCKTIME_THRESHOLD && lock_time >= LOCKTIME_THRESHOLD);
        if !same_kind {
            return false;
        }
        if lock_time > tx_lock_time {
            return false;
        }
        // A final sequence opts the input out of locktime entirely.
        self.tx.inputs[self.input_index].sequence != SEQUENCE_FINAL
    }

    fn check_sequence(&self, sequence: i64) -> bool {
        let tx_sequence = self.tx.inputs[self.input_index].sequence as i64;
        if self.tx.version < 2 {
            return false;
        }
        if tx_sequence & SEQUENCE_LOCKTIME_DISABLE_FLAG as i64 != 0 {
            return false;
        }

        let lock_time_mask = (SEQUENCE_LOCKTIME_TYPE_FLAG | SEQUENCE_LOCKTIME_MASK) as i64;
        let type_flag = SEQUENCE_LOCKTIME_TYPE_FLAG as i64;
        let tx_masked = tx_sequence & lock_time_mask;
        let masked = sequence & lock_time_mask;

        let same_kind = (tx_masked < type_flag && masked < type_flag)
            || (tx_masked >= type_flag && masked >= type_flag);
        if !same_kind {
            return false;
        }
        masked <= tx_masked
    }
}

/// Verifies that `script_sig` (plus any witness) satisfies `script_pubkey`
/// under the given flags.
pub fn verify_script(
    script_sig: &[u8],
    script_pubkey: &[u8],
    witness: &[Vec<u8>],
    flags: VerifyFlags,
    checker: &TransactionSignatureChecker<'_>,
) -> Result<(), ScriptError> {
    if flags.contains(VerifyFlags::SIGPUSHONLY) && !is_push_only(script_sig) {
        return Err(ScriptError::SigPushOnly);
    }

    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut had_witness = false;

    eval_script(script_sig, &mut stack, flags, checker, SigVersion::Base)?;
    let stack_copy = if flags.contains(VerifyFlags::P2SH) {
        stack.clone()
    } else {
        Vec::new()
    };
    eval_script(script_pubkey, &mut stack, flags, checker, SigVersion::Base)?;
    if !stack.last().map_or(false, |top| cast_to_bool(top)) {
        return Err(ScriptError::EvalFalse);
    }

    if flags.contains(VerifyFlags::WITNESS) {
        if let Some((version, program)) = parse_witness_program(script_pubkey) {
            had_witness = true;
            // A bare witness program must not carry a scriptSig.
            if !script_sig.is_empty() {
                return Err(ScriptError::WitnessMalleated);
            }
            verify_witness_program(witness, version, program, flags, checker)?;
            stack.truncate(1);
        }
    }

    if flags.contains(VerifyFlags::P2SH) && is_p2sh(script_pubkey) {
        if !is_push_only(script_sig) {
            return Err(ScriptError::SigPushOnly);
        }
        stack = stack_copy;
        let redeem_script = stack.pop().ok_or(ScriptError::InvalidStackOperation)?;
        eval_script(&redeem_script, &mut stack, flags, checker, SigVersion::Base)?;
        if !stack.last().map_or(false, |top| cast_to_bool(top)) {
            return Err(ScriptError::EvalFalse);
        }

        if flags.contains(VerifyFlags::WITNESS) {
            if let Some((version, program)) = parse_witness_program(&redeem_script) {
                had_witness = true;
                // The scriptSig must be exactly the push of the program.
                if script_sig != push_encode(&redeem_script) {
                    return Err(ScriptError::WitnessMalleatedP2sh);
                }
                verify_witness_program(witness, version, program, flags, checker)?;
                stack.truncate(1);
            }
        }
    }

    if flags.contains(VerifyFlags::CLEANSTACK) && stack.len() != 1 {
        return Err(ScriptError::CleanStack);
    }

    if flags.contains(VerifyFlags::WITNESS) && !had_witness && !witness.is_empty() {
        return Err(ScriptError::WitnessUnexpected);
    }

    Ok(())
}

fn verify_witness_program(
    witness: &[Vec<u8>],
    version: u8,
    program: &[u8],
    flags: VerifyFlags,
    checker: &TransactionSignatureChecker<'_>,
) -> Result<(), ScriptError> {
    if version != 0 {
        // Unknown witness versions are reserved for future upgrades and
        // succeed unconditionally under consensus rules.
        return Ok(());
    }

    if program.len() == 32 {
        // Script path: the last witness element is the witness script.
        if witness.is_empty() {
            return Err(ScriptError::WitnessProgramWitnessEmpty);
        }
        let (initial_stack, witness_script) = witness.split_at(witness.len() - 1);
        let witness_script = &witness_script[0];
        if sha256(witness_script) != program {
            return Err(ScriptError::WitnessProgramMismatch);
        }
        execute_witness_script(witness_script, initial_stack.to_vec(), flags, checker)
    } else if program.len() == 20 {
        // Key path: exactly a signature and a public key, run against the
        // implied pay-to-pubkey-hash script.
        if witness.len() != 2 {
            return Err(ScriptError::WitnessProgramMismatch);
        }
        let mut script_code = vec![OP_DUP, OP_HASH160, 0x14];
        script_code.extend_from_slice(program);
        script_code.push(OP_EQUALVERIFY);
        script_code.push(OP_CHECKSIG);
        execute_witness_script(&script_code, witness.to_vec(), flags, checker)
    } else {
        Err(ScriptError::WitnessProgramWrongLength)
    }
}

fn execute_witness_script(
    script: &[u8],
    mut stack: Vec<Vec<u8>>,
    flags: VerifyFlags,
    checker: &TransactionSignatureChecker<'_>,
) -> Result<(), ScriptError> {
    for element in &stack {
        if element.len() > MAX_SCRIPT_ELEMENT_SIZE {
            return Err(ScriptError::PushSize);
        }
    }
    eval_script(script, &mut stack, flags, checker, SigVersion::WitnessV0)?;
    // Witness execution implicitly requires a clean stack.
    if stack.len() != 1 {
        return Err(ScriptError::CleanStack);
    }
    if !cast_to_bool(&stack[0]) {
        return Err(ScriptError::EvalFalse);
    }
    Ok(())
}

pub fn eval_script(
    script: &[u8],
    stack: &mut Vec<Vec<u8>>,
    flags: VerifyFlags,
    checker: &TransactionSignatureChecker<'_>,
    sigversion: SigVersion,
) -> Result<(), ScriptError> {
    if script.len() > MAX_SCRIPT_SIZE {
        return Err(ScriptError::ScriptSize);
    }

    let require_minimal = flags.contains(VerifyFlags::MINIMALDATA);
    let mut cursor = 0usize;
    let mut begin_code_hash = 0usize;
    let mut exec_stack: Vec<bool> = Vec::new();
    let mut altstack: Vec<Vec<u8>> = Vec::new();
    let mut op_count = 0usize;

    while cursor < script.len() {
        let exec = exec_stack.iter().all(|branch| *branch);
        let opcode = script[cursor];
        cursor += 1;

        if opcode > OP_16 {
            op_count += 1;
            if op_count > MAX_OPS_PER_SCRIPT {
                return Err(ScriptError::OpCount);
            }
        }

        // Disabled opcodes invalidate the script wherever they appear.
        if matches!(
            opcode,
            OP_CAT
                | OP_SUBSTR
                | OP_LEFT
                | OP_RIGHT
                | OP_INVERT
                | OP_AND
                | OP_OR
                | OP_XOR
                | OP_2MUL
                | OP_2DIV
                | OP_MUL
                | OP_DIV
                | OP_MOD
                | OP_LSHIFT
                | OP_RSHIFT
        ) {
            return Err(ScriptError::DisabledOpcode);
        }

        if opcode <= OP_PUSHDATA4 {
            let data = read_push(script, &mut cursor, opcode)?;
            if require_minimal && !check_minimal_push(&data, opcode) {
                return Err(ScriptError::MinimalData);
            }
            if exec {
                stack.push(data);
            }
        } else if exec || (OP_IF..=OP_ENDIF).contains(&opcode) {
            match opcode {
                OP_1NEGATE => {
                    stack.push(script_num_encode(-1));
                }
                OP_1..=OP_16 => {
                    stack.push(script_num_encode((opcode - OP_1 + 1) as i64));
                }

                OP_NOP => {}
                OP_NOP1 | OP_NOP4..=OP_NOP10 => {
                    if flags.contains(VerifyFlags::DISCOURAGE_UPGRADABLE_NOPS) {
                        return Err(ScriptError::BadOpcode);
                    }
                }

                OP_CHECKLOCKTIMEVERIFY => {
                    if !flags.contains(VerifyFlags::CHECKLOCKTIMEVERIFY) {
                        if flags.contains(VerifyFlags::DISCOURAGE_UPGRADABLE_NOPS) {
                            return Err(ScriptError::BadOpcode);
                        }
                    } else {
                        let top = stack.last().ok_or(ScriptError::InvalidStackOperation)?;
                        // Accept up to 5 bytes; locktimes exceed the 4-byte
                        // script number range.
                        let lock_time = script_num_decode(top, require_minimal, 5)?;
                        if lock_time < 0 {
                            return Err(ScriptError::NegativeLockTime);
                        }
                        if !checker.check_lock_time(lock_time) {
                            return Err(ScriptError::UnsatisfiedLockTime);
                        }
                    }
                }
                OP_CHECKSEQUENCEVERIFY => {
                    if !flags.contains(VerifyFlags::CHECKSEQUENCEVERIFY) {
                        if flags.contains(VerifyFlags::DISCOURAGE_UPGRADABLE_NOPS) {
                            return Err(ScriptError::BadOpcode);
                        }
                    } else {
                        let top = stack.last().ok_or(ScriptError::InvalidStackOperation)?;
                        let sequence = script_num_decode(top, require_minimal, 5)?;
                        if sequence < 0 {
                            return Err(ScriptError::NegativeLockTime);
                        }
                        // With the disable bit set in the script value the
                        // opcode behaves as a NOP.
                        if sequence & SEQUENCE_LOCKTIME_DISABLE_FLAG as i64 == 0
                            && !checker.check_sequence(sequence)
                        {
                            return Err(ScriptError::UnsatisfiedLockTime);
                        }
                    }
                }

                OP_IF | OP_NOTIF => {
                    let mut branch = false;
                    if exec {
                        let value = stack.pop().ok_or(ScriptError::UnbalancedConditional)?;
                        branch = cast_to_bool(&value);
                        if opcode == OP_NOTIF {
                            branch = !branch;
                        }
                    }
                    exec_stack.push(branch);
                }
                OP_VERIF | OP_VERNOTIF => {
                    return Err(ScriptError::BadOpcode);
                }
                OP_ELSE => {
                    let top = exec_stack
                        .last_mut()
                        .ok_or(ScriptError::UnbalancedConditional)?;
                    *top = !*top;
                }
                OP_ENDIF => {
                    if exec_stack.pop().is_none() {
                        return Err(ScriptError::UnbalancedConditional);
                    }
                }
                OP_VERIFY => {
                    let value = pop(stack)?;
                    if !cast_to_bool(&value) {
                        return Err(ScriptError::Verify);
                    }
                }
                OP_RETURN => {
                    return Err(ScriptError::OpReturn);
                }

                OP_TOALTSTACK => {
                    altstack.push(pop(stack)?);
                }
                OP_FROMALTSTACK => {
                    stack.push(
                        altstack
                            .pop()
                            .ok_or(ScriptError::InvalidAltstackOperation)?,
                    );
                }
                OP_2DROP => {
                    pop(stack)?;
                    pop(stack)?;
                }
                OP_2DUP => {
                    if stack.len() < 2 {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    let a = stack[stack.len() - 2].clone();
                    let b = stack[stack.len() - 1].clone();
                    stack.push(a);
                    stack.push(b);
                }
                OP_3DUP => {
                    if stack.len() < 3 {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    let a = stack[stack.len() - 3].clone();
                    let b = stack[stack.len() - 2].clone();
                    let c = stack[stack.len() - 1].clone();
                    stack.push(a);
                    stack.push(b);
                    stack.push(c);
                }
                OP_2OVER => {
                    if stack.len() < 4 {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    let a = stack[stack.len() - 4].clone();
                    let b = stack[stack.len() - 3].clone();
                    stack.push(a);
                    stack.push(b);
                }
                OP_2ROT => {
                    if stack.len() < 6 {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    let a = stack.remove(stack.len() - 6);
                    let b = stack.remove(stack.len() - 5);
                    stack.push(a);
                    stack.push(b);
                }
                OP_2SWAP => {
                    if stack.len() < 4 {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    let len = stack.len();
                    stack.swap(len - 4, len - 2);
                    stack.swap(len - 3, len - 1);
                }
                OP_IFDUP => {
                    let top = stack.last().ok_or(ScriptError::InvalidStackOperation)?;
                    if cast_to_bool(top) {
                        let duplicate = top.clone();
                        stack.push(duplicate);
                    }
                }
                OP_DEPTH => {
                    stack.push(script_num_encode(stack.len() as i64));
                }
                OP_DROP => {
                    pop(stack)?;
                }
                OP_DUP => {
                    let top = stack
                        .last()
                        .ok_or(ScriptError::InvalidStackOperation)?
                        .clone();
                    stack.push(top);
                }
                OP_NIP => {
                    if stack.len() < 2 {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    let len = stack.len();
                    stack.remove(len - 2);
                }
                OP_OVER => {
                    if stack.len() < 2 {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    let second = stack[stack.len() - 2].clone();
                    stack.push(second);
                }
                OP_PICK | OP_ROLL => {
                    let n = script_num_decode(&pop(stack)?, require_minimal, 4)?;
                    if n < 0 || n as usize >= stack.len() {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    let position = stack.len() - 1 - n as usize;
                    let value = if opcode == OP_ROLL {
                        stack.remove(position)
                    } else {
                        stack[position].clone()
                    };
                    stack.push(value);
                }
                OP_ROT => {
                    if stack.len() < 3 {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    let third = stack.remove(stack.len() - 3);
                    stack.push(third);
                }
                OP_SWAP => {
                    if stack.len() < 2 {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    let len = stack.len();
                    stack.swap(len - 2, len - 1);
                }
                OP_TUCK => {
                    if stack.len() < 2 {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    let top = stack[stack.len() - 1].clone();
                    let position = stack.len() - 2;
                    stack.insert(position, top);
                }
                OP_SIZE => {
                    let len = stack.last().ok_or(ScriptError::InvalidStackOperation)?.len();
                    stack.push(script_num_encode(len as i64));
                }

                OP_EQUAL | OP_EQUALVERIFY => {
                    let b = pop(stack)?;
                    let a = pop(stack)?;
                    let equal = a == b;
                    if opcode == OP_EQUALVERIFY {
                        if !equal {
                            return Err(ScriptError::EqualVerify);
                        }
                    } else {
                        stack.push(bool_to_vec(equal));
                    }
                }

                OP_1ADD | OP_1SUB | OP_NEGATE | OP_ABS | OP_NOT | OP_0NOTEQUAL => {
                    let value = script_num_decode(&pop(stack)?, require_minimal, 4)?;
                    let result = match opcode {
                        OP_1ADD => value + 1,
                        OP_1SUB => value - 1,
                        OP_NEGATE => -value,
                        OP_ABS => value.abs(),
                        OP_NOT => (value == 0) as i64,
                        _ => (value != 0) as i64,
                    };
                    stack.push(script_num_encode(result));
                }
                OP_ADD | OP_SUB | OP_BOOLAND | OP_BOOLOR | OP_NUMEQUAL | OP_NUMEQUALVERIFY
                | OP_NUMNOTEQUAL | OP_LESSTHAN | OP_GREATERTHAN | OP_LESSTHANOREQUAL
                | OP_GREATERTHANOREQUAL | OP_MIN | OP_MAX => {
                    let b = script_num_decode(&pop(stack)?, require_minimal, 4)?;
                    let a = script_num_decode(&pop(stack)?, require_minimal, 4)?;
                    let result = match opcode {
                        OP_ADD => a + b,
                        OP_SUB => a - b,
                        OP_BOOLAND => (a != 0 && b != 0) as i64,
                        OP_BOOLOR => (a != 0 || b != 0) as i64,
                        OP_NUMEQUAL | OP_NUMEQUALVERIFY => (a == b) as i64,
                        OP_NUMNOTEQUAL => (a != b) as i64,
                        OP_LESSTHAN => (a < b) as i64,
                        OP_GREATERTHAN => (a > b) as i64,
                        OP_LESSTHANOREQUAL => (a <= b) as i64,
                        OP_GREATERTHANOREQUAL => (a >= b) as i64,
                        OP_MIN => a.min(b),
                        _ => a.max(b),
                    };
                    if opcode == OP_NUMEQUALVERIFY {
                        if result == 0 {
                            return Err(ScriptError::NumEqualVerify);
                        }
                    } else {
                        stack.push(script_num_encode(result));
                    }
                }
                OP_WITHIN => {
                    let max = script_num_decode(&pop(stack)?, require_minimal, 4)?;
                    let min = script_num_decode(&pop(stack)?, require_minimal, 4)?;
                    let value = script_num_decode(&pop(stack)?, require_minimal, 4)?;
                    stack.push(bool_to_vec(min <= value && value < max));
                }

                OP_RIPEMD160 => {
                    let data = pop(stack)?;
                    let mut hasher = Ripemd160::new();
                    hasher.update(data);
                    stack.push(hasher.finalize().to_vec());
                }
                OP_SHA1 => {
                    let data = pop(stack)?;
                    let mut hasher = Sha1::new();
                    hasher.update(data);
                    stack.push(hasher.finalize().to_vec());
                }
                OP_SHA256 => {
                    let data = pop(stack)?;
                    stack.push(sha256(&data).to_vec());
                }
                OP_HASH160 => {
                    let data = pop(stack)?;
                    stack.push(baddcoin_primitives::hash::hash160(&data).to_vec());
                }
                OP_HASH256 => {
                    let data = pop(stack)?;
                    stack.push(sha256d(&data).to_vec());
                }

                OP_CODESEPARATOR => {
                    begin_code_hash = cursor;
                }

                OP_CHECKSIG | OP_CHECKSIGVERIFY => {
                    if stack.len() < 2 {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    let pubkey = pop(stack)?;
                    let sig = pop(stack)?;

                    let mut script_code = script[begin_code_hash..].to_vec();
                    if sigversion == SigVersion::Base {
                        find_and_delete(&mut script_code, &push_encode(&sig));
                    }

                    check_signature_encoding(&sig, flags)?;
                    check_pubkey_encoding(&pubkey, flags)?;
                    let ok = checker.check_sig(&sig, &pubkey, &script_code, sigversion);

                    if opcode == OP_CHECKSIGVERIFY {
                        if !ok {
                            return Err(ScriptError::CheckSigVerify);
                        }
                    } else {
                        stack.push(bool_to_vec(ok));
                    }
                }
                OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                    let key_count = script_num_decode(&pop(stack)?, require_minimal, 4)?;
                    if key_count < 0 || key_count as usize > MAX_PUBKEYS_PER_MULTISIG {
                        return Err(ScriptError::PubkeyCount);
                    }
                    op_count += key_count as usize;
                    if op_count > MAX_OPS_PER_SCRIPT {
                        return Err(ScriptError::OpCount);
                    }
                    let mut pubkeys = Vec::with_capacity(key_count as usize);
                    for _ in 0..key_count {
                        pubkeys.push(pop(stack)?);
                    }
                    pubkeys.reverse();

                    let sig_count = script_num_decode(&pop(stack)?, require_minimal, 4)?;
                    if sig_count < 0 || sig_count > key_count {
                        return Err(ScriptError::SigCount);
                    }
                    let mut sigs = Vec::with_capacity(sig_count as usize);
                    for _ in 0..sig_count {
                        sigs.push(pop(stack)?);
                    }
                    sigs.reverse();

                    // The protocol bug consumes one extra element.
                    let dummy = pop(stack)?;
                    if flags.contains(VerifyFlags::NULLDUMMY) && !dummy.is_empty() {
                        return Err(ScriptError::SigNullDummy);
                    }

                    let mut script_code = script[begin_code_hash..].to_vec();
                    if sigversion == SigVersion::Base {
                        for sig in &sigs {
                            find_and_delete(&mut script_code, &push_encode(sig));
                        }
                    }

                    let mut sig_index = 0usize;
                    let mut key_index = 0usize;
                    while sig_index < sigs.len() && key_index < pubkeys.len() {
                        let sig = &sigs[sig_index];
                        let key = &pubkeys[key_index];
                        check_signature_encoding(sig, flags)?;
                        check_pubkey_encoding(key, flags)?;
                        if checker.check_sig(sig, key, &script_code, sigversion) {
                            sig_index += 1;
                        }
                        key_index += 1;
                        // Not enough keys left to satisfy the remaining sigs.
                        if pubkeys.len() - key_index < sigs.len() - sig_index {
                            break;
                        }
                    }

                    let success = sig_index == sigs.len();
                    if opcode == OP_CHECKMULTISIGVERIFY {
                        if !success {
                            return Err(ScriptError::CheckMultiSigVerify);
                        }
                    } else {
                        stack.push(bool_to_vec(success));
                    }
                }

                _ => {
                    return Err(ScriptError::BadOpcode);
                }
            }
        }

        if stack.len() + altstack.len() > MAX_STACK_SIZE {
            return Err(ScriptError::StackSize);
        }
    }

    if !exec_stack.is_empty() {
        return Err(ScriptError::UnbalancedConditional);
    }

    Ok(())
}

fn read_push(script: &[u8], cursor: &mut usize, opcode: u8) -> Result<Vec<u8>, ScriptError> {
    let len = match opcode {
        OP_0 => 0,
        0x01..=0x4b => opcode as usize,
        OP_PUSHDATA1 => read_le_int(script, cursor, 1)?,
        OP_PUSHDATA2 => read_le_int(script, cursor, 2)?,
        OP_PUSHDATA4 => read_le_int(script, cursor, 4)?,
        _ => unreachable!("caller dispatches push opcodes only"),
    };
    if len > MAX_SCRIPT_ELEMENT_SIZE {
        return Err(ScriptError::PushSize);
    }
    if *cursor + len > script.len() {
        return Err(ScriptError::BadOpcode);
    }
    let data = script[*cursor..*cursor + len].to_vec();
    *cursor += len;
    Ok(data)
}

fn read_le_int(script: &[u8], cursor: &mut usize, width: usize) -> Result<usize, ScriptError> {
    if *cursor + width > script.len() {
        return Err(ScriptError::BadOpcode);
    }
    let mut value = 0usize;
    for i in 0..width {
        value |= (script[*cursor + i] as usize) << (8 * i);
    }
    *cursor += width;
    Ok(value)
}

fn pop(stack: &mut Vec<Vec<u8>>) -> Result<Vec<u8>, ScriptError> {
    stack.pop().ok_or(ScriptError::InvalidStackOperation)
}

fn bool_to_vec(value: bool) -> Vec<u8> {
    if value {
        vec![1]
    } else {
        Vec::new()
    }
}

pub(crate) fn cast_to_bool(data: &[u8]) -> bool {
    for (index, byte) in data.iter().enumerate() {
        if *byte != 0 {
            // Negative zero counts as false.
            return !(index == data.len() - 1 && *byte == 0x80);
        }
    }
    false
}

pub(crate) fn script_num_encode(value: i64) -> Vec<u8> {
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

pub(crate) fn script_num_decode(
    data: &[u8],
    require_minimal: bool,
    max_size: usize,
) -> Result<i64, ScriptError> {
    if data.len() > max_size {
        return Err(ScriptError::ScriptNumOverflow);
    }
    if require_minimal && !data.is_empty() {
        // The most significant byte may only be a bare sign bit if the byte
        // below it needs its high bit.
        if data[data.len() - 1] & 0x7f == 0
            && (data.len() <= 1 || data[data.len() - 2] & 0x80 == 0)
        {
            return Err(ScriptError::MinimalData);
        }
    }
    if data.is_empty() {
        return Ok(0);
    }

    let mut result: i64 = 0;
    for (i, byte) in data.iter().enumerate() {
        result |= (*byte as i64) << (8 * i);
    }
    let last = data[data.len() - 1];
    if last & 0x80 != 0 {
        let mask = !(0x80i64 << (8 * (data.len() - 1)));
        result &= mask;
        result = -result;
    }
    Ok(result)
}

fn check_minimal_push(data: &[u8], opcode: u8) -> bool {
    if data.is_empty() {
        return opcode == OP_0;
    }
    if data.len() == 1 && (1..=16).contains(&data[0]) {
        return opcode == OP_1 + (data[0] - 1);
    }
    if data.len() == 1 && data[0] == 0x81 {
        return opcode == OP_1NEGATE;
    }
    if data.len() <= 75 {
        return opcode as usize == data.len();
    }
    if data.len() <= 255 {
        return opcode == OP_PUSHDATA1;
    }
    if data.len() <= 65535 {
        return opcode == OP_PUSHDATA2;
    }
    true
}

/// Canonical push encoding of a data element.
pub(crate) fn push_encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 5);
    if data.len() < OP_PUSHDATA1 as usize {
        out.push(data.len() as u8);
    } else if data.len() <= 0xff {
        out.push(OP_PUSHDATA1);
        out.push(data.len() as u8);
    } else if data.len() <= 0xffff {
        out.push(OP_PUSHDATA2);
        out.extend_from_slice(&(data.len() as u16).to_le_bytes());
    } else {
        out.push(OP_PUSHDATA4);
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    }
    out.extend_from_slice(data);
    out
}

/// Removes every occurrence of `needle` found at an opcode boundary.
///
/// Legacy signature hashing deletes the signature's own push from the
/// script being hashed.
fn find_and_delete(script: &mut Vec<u8>, needle: &[u8]) {
    if needle.is_empty() {
        return;
    }
    let mut out = Vec::with_capacity(script.len());
    let mut cursor = 0usize;
    while cursor < script.len() {
        while script[cursor..].starts_with(needle) {
            cursor += needle.len();
            if cursor >= script.len() {
                break;
            }
        }
        if cursor >= script.len() {
            break;
        }
        let next = match next_instruction(script, cursor) {
            Some(next) => next,
            // Truncated trailing push: keep the remainder untouched.
            None => script.len(),
        };
        out.extend_from_slice(&script[cursor..next]);
        cursor = next;
    }
    *script = out;
}

fn check_signature_encoding(sig: &[u8], flags: VerifyFlags) -> Result<(), ScriptError> {
    // An empty signature is a valid way to make CHECKSIG fail cleanly.
    if sig.is_empty() {
        return Ok(());
    }
    if flags.intersects(VerifyFlags::DERSIG | VerifyFlags::LOW_S | VerifyFlags::STRICTENC)
        && !is_valid_signature_encoding(sig)
    {
        return Err(ScriptError::SigDer);
    }
    if flags.contains(VerifyFlags::LOW_S) && !is_low_der_signature(sig) {
        return Err(ScriptError::SigHighS);
    }
    if flags.contains(VerifyFlags::STRICTENC) && !is_defined_hashtype_signature(sig) {
        return Err(ScriptError::SigHashType);
    }
    Ok(())
}

fn check_pubkey_encoding(pubkey: &[u8], flags: VerifyFlags) -> Result<(), ScriptError> {
    if flags.contains(VerifyFlags::STRICTENC) && !is_compressed_or_uncompressed_pubkey(pubkey) {
        return Err(ScriptError::PubkeyEncoding);
    }
    Ok(())
}

fn is_compressed_or_uncompressed_pubkey(pubkey: &[u8]) -> bool {
    match pubkey.len() {
        33 => pubkey[0] == 0x02 || pubkey[0] == 0x03,
        65 => pubkey[0] == 0x04,
        _ => false,
    }
}

/// Structural strict-DER check over `signature || sighash_type`.
fn is_valid_signature_encoding(sig: &[u8]) -> bool {
    // Minimum and maximum size constraints.
    if sig.len() < 9 || sig.len() > 73 {
        return false;
    }
    // A signature is of type 0x30 (compound).
    if sig[0] != 0x30 {
        return false;
    }
    // Make sure the length covers the entire signature.
    if sig[1] as usize != sig.len() - 3 {
        return false;
    }
    let len_r = sig[3] as usize;
    if 5 + len_r >= sig.len() {
        return false;
    }
    let len_s = sig[5 + len_r] as usize;
    if len_r + len_s + 7 != sig.len() {
        return false;
    }
    // Check whether the R element is an integer.
    if sig[2] != 0x02 {
        return false;
    }
    if len_r == 0 {
        return false;
    }
    // Negative numbers are not allowed for R.
    if sig[4] & 0x80 != 0 {
        return false;
    }
    // Null bytes at the start of R are not allowed, unless R would otherwise
    // be interpreted as a negative number.
    if len_r > 1 && sig[4] == 0x00 && sig[5] & 0x80 == 0 {
        return false;
    }
    // Check whether the S element is an integer.
    if sig[len_r + 4] != 0x02 {
        return false;
    }
    if len_s == 0 {
        return false;
    }
    if sig[len_r + 6] & 0x80 != 0 {
        return false;
    }
    if len_s > 1 && sig[len_r + 6] == 0x00 && sig[len_r + 7] & 0x80 == 0 {
        return false;
    }
    true
}

fn is_low_der_signature(sig: &[u8]) -> bool {
    // Caller has already established strict DER structure.
    let der = &sig[..sig.len() - 1];
    let Ok(parsed) = Signature::from_der(der) else {
        return false;
    };
    let mut normalized = parsed;
    normalized.normalize_s();
    normalized == parsed
}

fn is_defined_hashtype_signature(sig: &[u8]) -> bool {
    let hash_type = sig[sig.len() - 1] as u32 & !SIGHASH_ANYONECANPAY;
    (0x01..=SIGHASH_SINGLE).contains(&hash_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_num_roundtrip() {
        for value in [0i64, 1, -1, 127, 128, -128, 255, 256, 0x7fff_ffff, -0x7fff_ffff] {
            let encoded = script_num_encode(value);
            assert_eq!(script_num_decode(&encoded, true, 5), Ok(value));
        }
    }

    #[test]
    fn script_num_minimal_encoding_enforced() {
        // 0x0100 is 1 with a redundant trailing zero byte.
        assert_eq!(
            script_num_decode(&[0x01, 0x00], true, 4),
            Err(ScriptError::MinimalData)
        );
        assert_eq!(script_num_decode(&[0x01, 0x00], false, 4), Ok(1));
        // 0x0080 is negative zero with padding.
        assert_eq!(
            script_num_decode(&[0x00, 0x80], true, 4),
            Err(ScriptError::MinimalData)
        );
    }

    #[test]
    fn script_num_size_limit() {
        assert_eq!(
            script_num_decode(&[1, 2, 3, 4, 5], false, 4),
            Err(ScriptError::ScriptNumOverflow)
        );
        assert!(script_num_decode(&[1, 2, 3, 4, 5], false, 5).is_ok());
    }

    #[test]
    fn cast_to_bool_rules() {
        assert!(!cast_to_bool(&[]));
        assert!(!cast_to_bool(&[0x00]));
        assert!(!cast_to_bool(&[0x00, 0x00]));
        // Negative zero.
        assert!(!cast_to_bool(&[0x80]));
        assert!(!cast_to_bool(&[0x00, 0x80]));
        assert!(cast_to_bool(&[0x01]));
        assert!(cast_to_bool(&[0x80, 0x00]));
    }

    #[test]
    fn find_and_delete_removes_push() {
        let sig = vec![0xaa; 8];
        let needle = push_encode(&sig);
        let mut script = Vec::new();
        script.extend_from_slice(&needle);
        script.push(OP_DUP);
        script.extend_from_slice(&needle);
        script.push(OP_CHECKSIG);
        find_and_delete(&mut script, &needle);
        assert_eq!(script, vec![OP_DUP, OP_CHECKSIG]);
    }

    #[test]
    fn find_and_delete_respects_opcode_boundaries() {
        // The needle bytes appear inside a larger push and must survive.
        let needle = vec![0x02, 0xaa, 0xbb];
        let mut script = vec![0x04, 0x02, 0xaa, 0xbb, 0xcc];
        let original = script.clone();
        find_and_delete(&mut script, &needle);
        assert_eq!(script, original);
    }

    #[test]
    fn push_encoding_sizes() {
        assert_eq!(push_encode(&[]), vec![0x00]);
        assert_eq!(push_encode(&[0xaa])[0], 0x01);
        assert_eq!(push_encode(&vec![0xaa; 75])[0], 75);
        assert_eq!(push_encode(&vec![0xaa; 76])[0], OP_PUSHDATA1);
        assert_eq!(push_encode(&vec![0xaa; 256])[0], OP_PUSHDATA2);
    }

    #[test]
    fn der_signature_structure() {
        // 71-byte signature with sighash byte, canonical structure.
        let mut sig = vec![0x30, 0x44, 0x02, 0x20];
        sig.extend_from_slice(&[0x11; 32]);
        sig.extend_from_slice(&[0x02, 0x20]);
        sig.extend_from_slice(&[0x22; 32]);
        sig.push(0x01);
        assert!(is_valid_signature_encoding(&sig));

        // Wrong compound tag.
        let mut bad = sig.clone();
        bad[0] = 0x31;
        assert!(!is_valid_signature_encoding(&bad));

        // Negative R.
        let mut bad = sig.clone();
        bad[4] = 0x80;
        assert!(!is_valid_signature_encoding(&bad));

        assert!(!is_valid_signature_encoding(&[0x30, 0x01, 0x01]));
    }
}
