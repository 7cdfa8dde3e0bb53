//! Chain state sources for the balance manager.

pub mod blockfrost;
pub mod memory;
pub mod venue;

use async_trait::async_trait;
use serde::Serialize;
use vault_types::{Utxo, VaultResult};

pub use blockfrost::{BlockfrostIndexer, IndexerConfig};
pub use memory::MemoryLedger;
pub use venue::{MarketInfo, VenueClient};

/// Unspent outputs currently sitting at one address.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct AddressState {
    pub address: String,
    pub utxos: Vec<Utxo>,
}

#[async_trait]
pub trait ChainIndexer: Send + Sync {
    /// Always hits the source; implementations must not cache between calls.
    async fn query_address(&self, address: &str) -> VaultResult<AddressState>;
}
