//! Block headers and their fixed-layout binary codec
//!
//! The encoded header-without-hash starts with the two fields the inner
//! miner mutates in place: the nonce occupies bytes [0,8) and the
//! creation time bytes [8,16), both little-endian. Everything after is
//! a deterministic encoding of the remaining fields and stays invariant
//! across a mining attempt.

use crate::crypto::pow_hash;
use crate::types::{BlockHash, BlockHashRecord, BlockHeight, ChainId, Nonce, Target, Time};
use crate::version::ChainwebVersion;
use crate::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Read, Write};

/// Byte offset of the nonce in an encoded header
pub const NONCE_OFFSET: usize = 0;
/// Byte offset of the creation time in an encoded header
pub const TIME_OFFSET: usize = 8;

/// A block header of one chain of a chainweb
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Proof-of-work nonce
    pub nonce: Nonce,
    /// Block creation time
    pub creation_time: Time,
    /// Hash of the parent block on the same chain
    pub parent: BlockHash,
    /// Referenced blocks on the neighboring chains of the chain graph
    pub adjacents: BlockHashRecord,
    /// Difficulty target this header's PoW hash must meet
    pub target: Target,
    /// Content address of the block payload
    pub payload_hash: BlockHash,
    /// Chain this block extends
    pub chain_id: ChainId,
    /// Height on that chain
    pub height: BlockHeight,
    /// Chainweb version
    pub version: ChainwebVersion,
}

impl BlockHeader {
    /// Encoded size of a header with `adjacent_count` adjacent entries
    pub fn encoded_size(adjacent_count: usize) -> usize {
        // nonce + time + parent + count + entries + target + payload
        // + chain + height + version
        8 + 8 + 32 + 2 + adjacent_count * 36 + 32 + 32 + 4 + 8 + 4
    }

    /// Canonical fixed-layout encoding of this header, without its hash
    pub fn encode_without_hash(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::encoded_size(self.adjacents.len()));
        // Infallible writes into a Vec
        buf.write_u64::<LittleEndian>(self.nonce.value()).unwrap();
        buf.write_i64::<LittleEndian>(self.creation_time.micros())
            .unwrap();
        buf.write_all(self.parent.as_bytes()).unwrap();
        buf.write_u16::<LittleEndian>(self.adjacents.len() as u16)
            .unwrap();
        for (cid, hash) in &self.adjacents {
            buf.write_u32::<LittleEndian>(cid.value()).unwrap();
            buf.write_all(hash.as_bytes()).unwrap();
        }
        buf.write_all(&self.target.to_bytes()).unwrap();
        buf.write_all(self.payload_hash.as_bytes()).unwrap();
        buf.write_u32::<LittleEndian>(self.chain_id.value()).unwrap();
        buf.write_u64::<LittleEndian>(self.height.value()).unwrap();
        buf.write_u32::<LittleEndian>(self.version.code()).unwrap();
        buf
    }

    /// Decode a header from its canonical encoding
    pub fn decode_without_hash(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);

        let nonce = Nonce::new(cursor.read_u64::<LittleEndian>()?);
        let creation_time = Time::from_micros(cursor.read_i64::<LittleEndian>()?);
        let parent = read_hash(&mut cursor)?;

        let count = cursor.read_u16::<LittleEndian>()? as usize;
        let mut adjacents = BlockHashRecord::new();
        for _ in 0..count {
            let cid = ChainId::new(cursor.read_u32::<LittleEndian>()?);
            let hash = read_hash(&mut cursor)?;
            if adjacents.insert(cid, hash).is_some() {
                return Err(Error::header(format!(
                    "Duplicate adjacent entry for chain {}",
                    cid
                )));
            }
        }

        let mut target_bytes = [0u8; 32];
        cursor.read_exact(&mut target_bytes)?;
        let target = Target::from_bytes(&target_bytes)?;
        let payload_hash = read_hash(&mut cursor)?;
        let chain_id = ChainId::new(cursor.read_u32::<LittleEndian>()?);
        let height = BlockHeight::new(cursor.read_u64::<LittleEndian>()?);
        let version = ChainwebVersion::from_code(cursor.read_u32::<LittleEndian>()?)?;

        if cursor.position() != bytes.len() as u64 {
            return Err(Error::header(format!(
                "Trailing bytes after header: expected {}, got {}",
                cursor.position(),
                bytes.len()
            )));
        }

        Ok(Self {
            nonce,
            creation_time,
            parent,
            adjacents,
            target,
            payload_hash,
            chain_id,
            height,
            version,
        })
    }

    /// The block hash: the PoW hash of the encoded header-without-hash.
    /// It must meet `target` for the header to be valid.
    pub fn block_hash(&self) -> BlockHash {
        pow_hash(&self.encode_without_hash())
    }

    /// Whether this header's own PoW hash meets its target
    pub fn meets_own_target(&self) -> bool {
        self.target.meets(self.block_hash().as_bytes())
    }
}

fn read_hash(cursor: &mut Cursor<&[u8]>) -> Result<BlockHash> {
    let mut bytes = [0u8; 32];
    cursor.read_exact(&mut bytes)?;
    Ok(BlockHash::new(bytes))
}

/// Overwrite the nonce slot of an encoded header in place
pub fn inject_nonce(buf: &mut [u8], nonce: Nonce) {
    buf[NONCE_OFFSET..NONCE_OFFSET + 8].copy_from_slice(&nonce.to_le_bytes());
}

/// Overwrite the creation-time slot of an encoded header in place
pub fn inject_time(buf: &mut [u8], time: Time) {
    buf[TIME_OFFSET..TIME_OFFSET + 8].copy_from_slice(&time.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> BlockHeader {
        let v = ChainwebVersion::TestPetersen;
        let mut h = v.genesis_header(ChainId::new(2));
        h.nonce = Nonce::new(0xfeed_f00d_dead_beef);
        h.creation_time = Time::from_micros(1_700_000_123_456_789);
        h.height = BlockHeight::new(17);
        h.target = Target::new([7, 0, 0, u64::MAX >> 9]);
        h
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        for h in [
            sample_header(),
            ChainwebVersion::TestSingleton.genesis_header(ChainId::new(0)),
        ] {
            let bytes = h.encode_without_hash();
            assert_eq!(bytes.len(), BlockHeader::encoded_size(h.adjacents.len()));
            let decoded = BlockHeader::decode_without_hash(&bytes).unwrap();
            assert_eq!(decoded, h);
        }
    }

    #[test]
    fn test_nonce_and_time_offsets() {
        let h = sample_header();
        let bytes = h.encode_without_hash();
        assert_eq!(&bytes[NONCE_OFFSET..NONCE_OFFSET + 8], &h.nonce.to_le_bytes());
        assert_eq!(
            &bytes[TIME_OFFSET..TIME_OFFSET + 8],
            &h.creation_time.to_le_bytes()
        );
    }

    #[test]
    fn test_inject_then_decode() {
        let h = sample_header();
        let mut bytes = h.encode_without_hash();

        let nonce = Nonce::new(0x0123_4567_89ab_cdef);
        let time = Time::from_micros(42);
        inject_nonce(&mut bytes, nonce);
        inject_time(&mut bytes, time);

        let decoded = BlockHeader::decode_without_hash(&bytes).unwrap();
        assert_eq!(decoded.nonce, nonce);
        assert_eq!(decoded.creation_time, time);

        // Every other field is untouched
        let mut expected = h.clone();
        expected.nonce = nonce;
        expected.creation_time = time;
        assert_eq!(decoded, expected);
    }

    #[test]
    fn test_decode_rejects_truncation_and_trailing() {
        let bytes = sample_header().encode_without_hash();
        assert!(BlockHeader::decode_without_hash(&bytes[..bytes.len() - 1]).is_err());

        let mut long = bytes.clone();
        long.push(0);
        assert!(BlockHeader::decode_without_hash(&long).is_err());
    }

    #[test]
    fn test_decode_rejects_unknown_version() {
        let h = sample_header();
        let mut bytes = h.encode_without_hash();
        let n = bytes.len();
        bytes[n - 4..].copy_from_slice(&0xdead_beefu32.to_le_bytes());
        assert!(matches!(
            BlockHeader::decode_without_hash(&bytes),
            Err(Error::UnknownVersion { .. })
        ));
    }

    #[test]
    fn test_block_hash_depends_on_nonce() {
        let mut h = sample_header();
        let h1 = h.block_hash();
        h.nonce.increment();
        assert_ne!(h1, h.block_hash());
    }

    #[test]
    fn test_genesis_meets_trivial_target() {
        let g = ChainwebVersion::TestSingleton.genesis_header(ChainId::new(0));
        assert!(g.meets_own_target());
    }
}
