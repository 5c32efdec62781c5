//! Transaction types and consensus serialization.
//!
//! The wire format is the extended transaction encoding: when any input
//! carries witness data the body is framed by the 0x00 marker and 0x01
//! flag bytes, and per-input witness stacks follow the outputs. The txid
//! always commits to the witness-stripped encoding.

use crate::encoding::{Decodable, DecodeError, Decoder, Encodable, Encoder};
use crate::hash::{sha256d, Hash256};
use crate::outpoint::OutPoint;

/// Sequence number disabling locktime semantics for an input.
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

/// Marker flag bit announcing witness data in the extended format.
const WITNESS_FLAG: u8 = 0x01;

#[derive(Clone, Debug, PartialEq)]
pub struct TxIn {
    pub prevout: OutPoint,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
    /// Witness stack for this input; empty for non-witness spends.
    pub witness: Vec<Vec<u8>>,
}

impl TxIn {
    pub fn has_witness(&self) -> bool {
        !self.witness.is_empty()
    }
}

impl Encodable for TxIn {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        self.prevout.consensus_encode(encoder);
        encoder.write_var_bytes(&self.script_sig);
        encoder.write_u32_le(self.sequence);
    }
}

impl Decodable for TxIn {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let prevout = OutPoint::consensus_decode(decoder)?;
        let script_sig = decoder.read_var_bytes()?;
        let sequence = decoder.read_u32_le()?;
        Ok(Self {
            prevout,
            script_sig,
            sequence,
            witness: Vec::new(),
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TxOut {
    pub value: i64,
    pub script_pubkey: Vec<u8>,
}

impl Encodable for TxOut {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_i64_le(self.value);
        encoder.write_var_bytes(&self.script_pubkey);
    }
}

impl Decodable for TxOut {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let value = decoder.read_i64_le()?;
        let script_pubkey = decoder.read_var_bytes()?;
        Ok(Self {
            value,
            script_pubkey,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
}

impl Transaction {
    pub fn has_witness(&self) -> bool {
        self.inputs.iter().any(TxIn::has_witness)
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].prevout.is_null()
    }

    pub fn consensus_encode(&self, encoder: &mut Encoder) {
        self.encode_with(encoder, true);
    }

    pub fn consensus_encode_without_witness(&self, encoder: &mut Encoder) {
        self.encode_with(encoder, false);
    }

    fn encode_with(&self, encoder: &mut Encoder, allow_witness: bool) {
        encoder.write_i32_le(self.version);
        let with_witness = allow_witness && self.has_witness();
        if with_witness {
            encoder.write_u8(0x00);
            encoder.write_u8(WITNESS_FLAG);
        }
        encoder.write_varint(self.inputs.len() as u64);
        for input in &self.inputs {
            input.consensus_encode(encoder);
        }
        encoder.write_varint(self.outputs.len() as u64);
        for output in &self.outputs {
            output.consensus_encode(encoder);
        }
        if with_witness {
            for input in &self.inputs {
                encoder.write_varint(input.witness.len() as u64);
                for item in &input.witness {
                    encoder.write_var_bytes(item);
                }
            }
        }
        encoder.write_u32_le(self.lock_time);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut encoder = Encoder::new();
        self.consensus_encode(&mut encoder);
        encoder.into_inner()
    }

    /// Hash of the witness-stripped encoding.
    pub fn txid(&self) -> Hash256 {
        let mut encoder = Encoder::new();
        self.consensus_encode_without_witness(&mut encoder);
        sha256d(&encoder.into_inner())
    }

    /// Hash of the full encoding; equals `txid` for non-witness transactions.
    pub fn wtxid(&self) -> Hash256 {
        sha256d(&self.to_bytes())
    }

    pub fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let version = decoder.read_i32_le()?;

        let mut flags = 0u8;
        let mut inputs = read_inputs(decoder)?;
        let outputs;
        if inputs.is_empty() {
            // Extended format: empty input vector doubles as the marker.
            flags = decoder.read_u8()?;
            if flags != 0 {
                inputs = read_inputs(decoder)?;
                outputs = read_outputs(decoder)?;
            } else {
                outputs = Vec::new();
            }
        } else {
            outputs = read_outputs(decoder)?;
        }

        let mut tx = Transaction {
            version,
            inputs,
            outputs,
            lock_time: 0,
        };

        if (flags & WITNESS_FLAG) != 0 {
            flags ^= WITNESS_FLAG;
            for input in &mut tx.inputs {
                let items = decoder.read_varint()?;
                let items = usize::try_from(items).map_err(|_| DecodeError::SizeTooLarge)?;
                let mut witness = Vec::with_capacity(items.min(1024));
                for _ in 0..items {
                    witness.push(decoder.read_var_bytes()?);
                }
                input.witness = witness;
            }
            if !tx.has_witness() {
                return Err(DecodeError::InvalidData("superfluous witness record"));
            }
        }
        if flags != 0 {
            return Err(DecodeError::InvalidData("unknown transaction optional data"));
        }

        tx.lock_time = decoder.read_u32_le()?;
        Ok(tx)
    }

    /// Decodes a transaction that must span the entire input slice.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut decoder = Decoder::new(bytes);
        let tx = Self::consensus_decode(&mut decoder)?;
        if !decoder.is_empty() {
            return Err(DecodeError::TrailingBytes);
        }
        Ok(tx)
    }
}

fn read_inputs(decoder: &mut Decoder) -> Result<Vec<TxIn>, DecodeError> {
    let count = decoder.read_varint()?;
    let count = usize::try_from(count).map_err(|_| DecodeError::SizeTooLarge)?;
    let mut inputs = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        inputs.push(TxIn::consensus_decode(decoder)?);
    }
    Ok(inputs)
}

fn read_outputs(decoder: &mut Decoder) -> Result<Vec<TxOut>, DecodeError> {
    let count = decoder.read_varint()?;
    let count = usize::try_from(count).map_err(|_| DecodeError::SizeTooLarge)?;
    let mut outputs = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        outputs.push(TxOut::consensus_decode(decoder)?);
    }
    Ok(outputs)
}
