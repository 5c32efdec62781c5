//! Standard script classification utilities.

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScriptType {
    P2Pk,
    P2Pkh,
    P2Sh,
    P2Wpkh,
    P2Wsh,
    NullData,
    Unknown,
}

const OP_0: u8 = 0x00;
const OP_PUSHDATA1: u8 = 0x4c;
const OP_PUSHDATA2: u8 = 0x4d;
const OP_PUSHDATA4: u8 = 0x4e;
const OP_16: u8 = 0x60;
const OP_RETURN: u8 = 0x6a;
const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUAL: u8 = 0x87;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;

pub fn classify_script_pubkey(script: &[u8]) -> ScriptType {
    if is_p2pkh(script) {
        ScriptType::P2Pkh
    } else if is_p2sh(script) {
        ScriptType::P2Sh
    } else if is_p2wpkh(script) {
        ScriptType::P2Wpkh
    } else if is_p2wsh(script) {
        ScriptType::P2Wsh
    } else if is_p2pk(script) {
        ScriptType::P2Pk
    } else if script.first() == Some(&OP_RETURN) {
        ScriptType::NullData
    } else {
        ScriptType::Unknown
    }
}

fn is_p2pkh(script: &[u8]) -> bool {
    script.len() == 25
        && script[0] == OP_DUP
        && script[1] == OP_HASH160
        && script[2] == 0x14
        && script[23] == OP_EQUALVERIFY
        && script[24] == OP_CHECKSIG
}

pub fn is_p2sh(script: &[u8]) -> bool {
    script.len() == 23 && script[0] == OP_HASH160 && script[1] == 0x14 && script[22] == OP_EQUAL
}

fn is_p2wpkh(script: &[u8]) -> bool {
    script.len() == 22 && script[0] == OP_0 && script[1] == 0x14
}

fn is_p2wsh(script: &[u8]) -> bool {
    script.len() == 34 && script[0] == OP_0 && script[1] == 0x20
}

fn is_p2pk(script: &[u8]) -> bool {
    let key_len = match script.first().copied() {
        Some(len @ 33) => len,
        Some(len @ 65) => len,
        _ => return false,
    };

    let expected_len = key_len as usize + 2;
    script.len() == expected_len && script[script.len() - 1] == OP_CHECKSIG
}

/// Decomposes a witness program locking script into (version, program).
///
/// A witness program is a version opcode (OP_0 or OP_1 through OP_16)
/// followed by a single direct push of 2 to 40 bytes.
pub fn parse_witness_program(script: &[u8]) -> Option<(u8, &[u8])> {
    if script.len() < 4 || script.len() > 42 {
        return None;
    }
    let version_op = script[0];
    if version_op != OP_0 && !(0x51..=OP_16).contains(&version_op) {
        return None;
    }
    let push_len = script[1] as usize;
    if push_len + 2 != script.len() {
        return None;
    }
    let version = if version_op == OP_0 {
        0
    } else {
        version_op - 0x50
    };
    Some((version, &script[2..]))
}

/// End position of the instruction starting at `cursor`, or `None` if the
/// push data runs past the end of the script.
pub(crate) fn next_instruction(script: &[u8], cursor: usize) -> Option<usize> {
    let opcode = *script.get(cursor)?;
    let mut pos = cursor + 1;
    let len = match opcode {
        0x01..=0x4b => opcode as usize,
        OP_PUSHDATA1 => {
            let len = *script.get(pos)? as usize;
            pos += 1;
            len
        }
        OP_PUSHDATA2 => {
            if pos + 2 > script.len() {
                return None;
            }
            let len = u16::from_le_bytes([script[pos], script[pos + 1]]) as usize;
            pos += 2;
            len
        }
        OP_PUSHDATA4 => {
            if pos + 4 > script.len() {
                return None;
            }
            let len = u32::from_le_bytes([
                script[pos],
                script[pos + 1],
                script[pos + 2],
                script[pos + 3],
            ]) as usize;
            pos += 4;
            len
        }
        _ => 0,
    };
    if pos + len > script.len() {
        return None;
    }
    Some(pos + len)
}

/// Whether the script consists solely of push operations.
pub fn is_push_only(script: &[u8]) -> bool {
    let mut cursor = 0usize;
    while cursor < script.len() {
        // Anything above OP_16 is not a push operation.
        if script[cursor] > OP_16 {
            return false;
        }
        match next_instruction(script, cursor) {
            Some(next) => cursor = next,
            None => return false,
        }
    }
    true
}
