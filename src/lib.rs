//! Chainweb mining core
//!
//! The in-node proof-of-work miner of a multi-chain (chainweb)
//! blockchain. The miner continuously tries to extend the node's
//! current cut by producing a new block on some chain whose
//! adjacent-parent dependencies are satisfied, racing each attempt
//! against newer cuts observed from the network:
//!
//! - [`coordinator::MiningCoordinator`] runs the mine/await-cut race,
//! - [`extend::CutExtender`] performs one attempt end to end,
//! - [`miner`] holds the portable and optimized hash loops,
//! - [`cut`], [`header`], [`cache`] model cuts, headers, and the
//!   per-epoch difficulty-target cache,
//! - [`store`] defines the collaborator contracts (cut store, header
//!   databases, payload store, execution service) plus in-memory
//!   backends for standalone nodes and tests.

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod crypto;
pub mod cut;
pub mod error;
pub mod extend;
pub mod header;
pub mod miner;
pub mod store;
pub mod types;
pub mod version;

pub use config::MinerConfig;
pub use error::{Error, Result};
pub use types::*;
pub use version::ChainwebVersion;
