//! Miner configuration

use crate::types::MinerInfo;
use serde::{Deserialize, Serialize};

/// Configuration of the in-node miner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinerConfig {
    /// Identity passed to the execution service when requesting block
    /// payloads; the mining reward accrues to this account
    pub miner_info: MinerInfo,
}

impl MinerConfig {
    /// Create a configuration for the given miner identity
    pub fn new(miner_info: MinerInfo) -> Self {
        Self { miner_info }
    }
}
