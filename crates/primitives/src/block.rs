//! Block header and block types.

use crate::encoding::{Decodable, DecodeError, Decoder, Encodable, Encoder};
use crate::hash::{sha256d, Hash256};
use crate::transaction::Transaction;

#[derive(Clone, Debug, PartialEq)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_block: Hash256,
    pub merkle_root: Hash256,
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    pub fn hash(&self) -> Hash256 {
        let mut encoder = Encoder::new();
        self.consensus_encode(&mut encoder);
        sha256d(&encoder.into_inner())
    }
}

impl Encodable for BlockHeader {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_i32_le(self.version);
        encoder.write_hash_le(&self.prev_block);
        encoder.write_hash_le(&self.merkle_root);
        encoder.write_u32_le(self.time);
        encoder.write_u32_le(self.bits);
        encoder.write_u32_le(self.nonce);
    }
}

impl Decodable for BlockHeader {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        Ok(Self {
            version: decoder.read_i32_le()?,
            prev_block: decoder.read_hash_le()?,
            merkle_root: decoder.read_hash_le()?,
            time: decoder.read_u32_le()?,
            bits: decoder.read_u32_le()?,
            nonce: decoder.read_u32_le()?,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    /// Merkle root over the transaction ids.
    pub fn merkle_root(&self) -> Hash256 {
        let txids: Vec<Hash256> = self.transactions.iter().map(Transaction::txid).collect();
        merkle_root(&txids)
    }

    pub fn consensus_encode(&self, encoder: &mut Encoder) {
        self.header.consensus_encode(encoder);
        encoder.write_varint(self.transactions.len() as u64);
        for tx in &self.transactions {
            tx.consensus_encode(encoder);
        }
    }

    pub fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let header = BlockHeader::consensus_decode(decoder)?;
        let count = decoder.read_varint()?;
        let count = usize::try_from(count).map_err(|_| DecodeError::SizeTooLarge)?;
        let mut transactions = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            transactions.push(Transaction::consensus_decode(decoder)?);
        }
        Ok(Self {
            header,
            transactions,
        })
    }
}

/// Pairwise sha256d merkle root; an odd level duplicates its last entry.
pub fn merkle_root(hashes: &[Hash256]) -> Hash256 {
    if hashes.is_empty() {
        return [0u8; 32];
    }
    let mut level: Vec<Hash256> = hashes.to_vec();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            let last = *level.last().expect("level is non-empty");
            level.push(last);
        }
        let mut next = Vec::with_capacity(level.len() / 2);
        for pair in level.chunks(2) {
            let mut concat = [0u8; 64];
            concat[..32].copy_from_slice(&pair[0]);
            concat[32..].copy_from_slice(&pair[1]);
            next.push(sha256d(&concat));
        }
        level = next;
    }
    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merkle_root_single_leaf_is_identity() {
        let leaf = [0xabu8; 32];
        assert_eq!(merkle_root(&[leaf]), leaf);
    }

    #[test]
    fn merkle_root_duplicates_odd_leaf() {
        let a = [0x01u8; 32];
        let b = [0x02u8; 32];
        let c = [0x03u8; 32];
        // Three leaves hash as if the last were present twice.
        assert_eq!(merkle_root(&[a, b, c]), merkle_root(&[a, b, c, c]));
    }
}
