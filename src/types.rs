//! Core types for the chainweb mining core
//!
//! Fundamental types shared by the header codec, the cut model, and the
//! mining loops, with binary encoding and JSON serialization.

use crate::{Error, Result};
use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Chain identifier (4 bytes)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ChainId(pub u32);

impl ChainId {
    /// Create a new chain ID
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the chain ID value
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Block height on a single chain
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct BlockHeight(pub u64);

impl BlockHeight {
    /// Create a new block height
    pub fn new(height: u64) -> Self {
        Self(height)
    }

    /// Get the height value
    pub fn value(&self) -> u64 {
        self.0
    }

    /// The height of the child block
    pub fn succ(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Whether this is the genesis height
    pub fn is_genesis(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for BlockHeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Proof-of-work nonce (8 bytes, little-endian at offset 0 of the
/// encoded header)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Nonce(pub u64);

impl Nonce {
    /// Create a new nonce
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the nonce value
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Convert to bytes (little-endian)
    pub fn to_le_bytes(&self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    /// Advance to the next candidate nonce
    pub fn increment(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Block creation time in microseconds since the Unix epoch
/// (8 bytes, little-endian at offset 8 of the encoded header)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Time(pub i64);

impl Time {
    /// The Unix epoch, used as the preliminary creation time of a
    /// candidate header before the inner loop stamps it
    pub const EPOCH: Time = Time(0);

    /// Create a time from microseconds since the epoch
    pub fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    /// Current wall-clock time
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp_micros())
    }

    /// Microseconds since the epoch
    pub fn micros(&self) -> i64 {
        self.0
    }

    /// Convert to bytes (little-endian)
    pub fn to_le_bytes(&self) -> [u8; 8] {
        self.0.to_le_bytes()
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}us", self.0)
    }
}

/// Mining target representing the difficulty threshold
///
/// A candidate hash meets the target iff, read as a 256-bit
/// little-endian unsigned integer, it is not greater than the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Target {
    /// 256-bit target value stored as 4 64-bit words in little-endian order
    words: [u64; 4],
}

impl Target {
    /// Size of an encoded target in bytes
    pub const SIZE: usize = 32;

    /// Create a new target from a 256-bit value
    pub fn new(words: [u64; 4]) -> Self {
        Self { words }
    }

    /// The little-endian words of this target
    pub fn words(&self) -> [u64; 4] {
        self.words
    }

    /// Create target from bytes (32 bytes, little-endian)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::SIZE {
            return Err(Error::target(format!(
                "Invalid target length: expected 32 bytes, got {}",
                bytes.len()
            )));
        }
        let mut words = [0u64; 4];
        LittleEndian::read_u64_into(bytes, &mut words);
        Ok(Self::new(words))
    }

    /// Convert target to bytes (32 bytes, little-endian)
    pub fn to_bytes(&self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        LittleEndian::write_u64_into(&self.words, &mut bytes);
        bytes
    }

    /// Check if a 32-byte PoW hash meets this target
    pub fn meets(&self, hash: &[u8; 32]) -> bool {
        // Compare from the most significant word down; both sides are
        // little-endian 256-bit integers.
        for i in (0..4).rev() {
            let hash_word = LittleEndian::read_u64(&hash[i * 8..(i + 1) * 8]);
            if hash_word < self.words[i] {
                return true;
            } else if hash_word > self.words[i] {
                return false;
            }
        }
        true
    }

    /// Maximum possible target (easiest difficulty)
    pub fn max() -> Self {
        Self::new([u64::MAX; 4])
    }

    /// Minimum possible target (hardest difficulty; unreachable)
    pub fn min() -> Self {
        Self::new([0; 4])
    }

    /// Convert to hexadecimal string (big-endian for display)
    pub fn to_hex_be(&self) -> String {
        format!(
            "{:016x}{:016x}{:016x}{:016x}",
            self.words[3], self.words[2], self.words[1], self.words[0]
        )
    }
}

impl FromStr for Target {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != 64 {
            return Err(Error::target(format!(
                "Invalid target hex length: expected 64 chars, got {}",
                s.len()
            )));
        }
        // Parse as big-endian hex string
        let mut words = [0u64; 4];
        for i in 0..4 {
            let start = i * 16;
            let end = start + 16;
            words[3 - i] = u64::from_str_radix(&s[start..end], 16)
                .map_err(|e| Error::target(format!("Invalid hex in target: {}", e)))?;
        }
        Ok(Self::new(words))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex_be())
    }
}

impl Serialize for Target {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex_be())
    }
}

impl<'de> Deserialize<'de> for Target {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Target::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// A block hash: the PoW hash of the encoded header-without-hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockHash(pub [u8; 32]);

impl BlockHash {
    /// Size of a block hash in bytes
    pub const SIZE: usize = 32;

    /// Create a block hash from raw digest bytes
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Create from a byte slice
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != Self::SIZE {
            return Err(Error::header(format!(
                "Invalid block hash length: expected 32 bytes, got {}",
                slice.len()
            )));
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Serialize for BlockHash {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for BlockHash {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        BlockHash::from_slice(&bytes).map_err(serde::de::Error::custom)
    }
}

/// Adjacent-parent record: for a header on some chain, the hashes of
/// the referenced blocks on each neighboring chain of the chain graph.
///
/// A `BTreeMap` keeps the binary encoding deterministic.
pub type BlockHashRecord = BTreeMap<ChainId, BlockHash>;

/// A block payload together with its outputs, as produced by the
/// execution service. Content-addressed by `payload_hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadWithOutputs {
    /// Content address of this payload
    pub payload_hash: BlockHash,
    /// Opaque miner reward data
    pub miner_data: Vec<u8>,
    /// Serialized transactions with their outputs
    pub transactions: Vec<Vec<u8>>,
}

impl PayloadWithOutputs {
    /// Compute the content address of this payload's data
    pub fn compute_hash(&self) -> BlockHash {
        let mut buf = Vec::with_capacity(
            16 + self.miner_data.len()
                + self.transactions.iter().map(|t| 8 + t.len()).sum::<usize>(),
        );
        buf.extend_from_slice(&(self.miner_data.len() as u64).to_le_bytes());
        buf.extend_from_slice(&self.miner_data);
        buf.extend_from_slice(&(self.transactions.len() as u64).to_le_bytes());
        for tx in &self.transactions {
            buf.extend_from_slice(&(tx.len() as u64).to_le_bytes());
            buf.extend_from_slice(tx);
        }
        crate::crypto::pow_hash(&buf)
    }
}

/// Miner identity passed through to the execution service when
/// requesting a new block payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinerInfo {
    /// Account receiving the mining reward
    pub account: String,
    /// Public key guarding the reward account (hex)
    pub public_key: String,
}

impl MinerInfo {
    /// Create a new miner identity, validating the public key format
    pub fn new(account: impl Into<String>, public_key: impl Into<String>) -> Result<Self> {
        let public_key = public_key.into();
        if public_key.len() != 64 {
            return Err(Error::config(format!(
                "Invalid public key length: expected 64 hex chars, got {}",
                public_key.len()
            )));
        }
        hex::decode(&public_key)
            .map_err(|e| Error::config(format!("Invalid hex in public key: {}", e)))?;
        Ok(Self {
            account: account.into(),
            public_key,
        })
    }

    /// The default account name for a bare public key (k: prefix)
    pub fn default_account(public_key: &str) -> String {
        format!("k:{}", public_key)
    }
}
