pub mod codec;
pub mod datum;
pub mod error;
pub mod hash;
pub mod network;
pub mod plutus;
pub mod registry;
pub mod transaction;
pub mod utxo;

pub use datum::{TradeSide, VaultDatum, VaultRedeemer};
pub use error::{ErrorKind, VaultError, VaultResult};
pub use hash::{DataHash, KeyHash, ScriptHash, TxHash};
pub use network::{Network, PlutusVersion};
pub use registry::{ContractRegistryEntry, ContractStatus, NewContract};
pub use transaction::UnsignedTransaction;
pub use utxo::{OutputRef, Utxo, VaultBalanceSnapshot};

/// Lovelace per ADA. Conversion happens only at presentation boundaries.
pub const LOVELACE_PER_ADA: u64 = 1_000_000;

pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
