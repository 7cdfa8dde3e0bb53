//! In-process ledger. Tracks lovelace UTxOs per address and applies built
//! transactions so flows can run end to end without a network.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;
use vault_types::hash::blake2b_256;
use vault_types::{OutputRef, TxHash, UnsignedTransaction, Utxo, VaultError, VaultResult};

use crate::{AddressState, ChainIndexer};

#[derive(Default)]
struct LedgerState {
    utxos: BTreeMap<OutputRef, Utxo>,
    offline: bool,
    latency: Option<Duration>,
    minted: u64,
}

#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> VaultResult<std::sync::MutexGuard<'_, LedgerState>> {
        self.state
            .lock()
            .map_err(|_| VaultError::IndexerUnavailable("ledger lock poisoned".into()))
    }

    /// Create an output out of thin air, as a faucet would.
    pub fn fund(
        &self,
        address: &str,
        lovelace: u64,
        inline_datum: Option<Vec<u8>>,
    ) -> VaultResult<OutputRef> {
        self.fund_with_assets(address, lovelace, inline_datum, BTreeMap::new())
    }

    pub fn fund_with_assets(
        &self,
        address: &str,
        lovelace: u64,
        inline_datum: Option<Vec<u8>>,
        assets: BTreeMap<String, u64>,
    ) -> VaultResult<OutputRef> {
        let mut state = self.lock()?;
        state.minted += 1;
        let mut preimage = b"faucet".to_vec();
        preimage.extend_from_slice(&state.minted.to_be_bytes());
        let out_ref = OutputRef::new(TxHash(blake2b_256(&preimage)), 0);
        let mut utxo = Utxo::lovelace_only(out_ref, address, lovelace, inline_datum);
        utxo.assets = assets;
        state.utxos.insert(out_ref, utxo);
        Ok(out_ref)
    }

    /// Spend the transaction's inputs and create its outputs. Fails without
    /// touching state if any input is already gone.
    pub fn apply(&self, tx: &UnsignedTransaction) -> VaultResult<TxHash> {
        let id = tx.id()?;
        let mut created = Vec::with_capacity(tx.outputs.len());
        for (i, out) in tx.outputs.iter().enumerate() {
            let out_ref = OutputRef::new(id, i as u32);
            created.push(Utxo::lovelace_only(
                out_ref,
                &out.address,
                out.lovelace,
                out.inline_datum.as_ref().map(|d| d.to_cbor()).transpose()?,
            ));
        }

        let mut state = self.lock()?;
        if let Some(missing) = tx.inputs.iter().find(|i| !state.utxos.contains_key(*i)) {
            return Err(VaultError::InsufficientInput(format!(
                "input {missing} is already spent or never existed"
            )));
        }
        // Outputs carry lovelace only, so spending assets would burn them.
        if let Some(burnt) = tx
            .inputs
            .iter()
            .find(|i| state.utxos.get(*i).is_some_and(Utxo::holds_assets))
        {
            return Err(VaultError::InsufficientInput(format!(
                "input {burnt} holds native assets no output carries"
            )));
        }
        for input in &tx.inputs {
            state.utxos.remove(input);
        }
        for utxo in created {
            state.utxos.insert(utxo.out_ref, utxo);
        }
        debug!(tx = %id, inputs = tx.inputs.len(), outputs = tx.outputs.len(), "applied transaction");
        Ok(id)
    }

    /// While offline every query fails as an unreachable indexer would.
    pub fn set_offline(&self, offline: bool) -> VaultResult<()> {
        self.lock()?.offline = offline;
        Ok(())
    }

    /// Delay every query, for exercising caller timeouts.
    pub fn set_latency(&self, latency: Option<Duration>) -> VaultResult<()> {
        self.lock()?.latency = latency;
        Ok(())
    }

    pub fn balance(&self, address: &str) -> VaultResult<u64> {
        Ok(self
            .lock()?
            .utxos
            .values()
            .filter(|u| u.address == address)
            .map(|u| u.lovelace)
            .sum())
    }
}

#[async_trait]
impl ChainIndexer for MemoryLedger {
    async fn query_address(&self, address: &str) -> VaultResult<AddressState> {
        let (offline, latency) = {
            let state = self.lock()?;
            (state.offline, state.latency)
        };
        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }
        if offline {
            return Err(VaultError::IndexerUnavailable(format!(
                "ledger offline while querying {address}"
            )));
        }
        let utxos = self
            .lock()?
            .utxos
            .values()
            .filter(|u| u.address == address)
            .cloned()
            .collect();
        Ok(AddressState {
            address: address.to_string(),
            utxos,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vault_types::transaction::TxOutput;
    use vault_types::Network;

    #[tokio::test]
    async fn fund_then_spend() {
        let ledger = MemoryLedger::new();
        let src = ledger.fund("addr_test1_alice", 50_000_000, None).unwrap();
        ledger.fund("addr_test1_alice", 5_000_000, None).unwrap();
        assert_eq!(ledger.balance("addr_test1_alice").unwrap(), 55_000_000);

        let mut tx = UnsignedTransaction::new(Network::Testnet);
        tx.inputs.push(src);
        tx.outputs.push(TxOutput {
            address: "addr_test1_bob".into(),
            address_bytes: vec![0x60; 29],
            lovelace: 49_800_000,
            inline_datum: None,
        });
        tx.fee = 200_000;
        ledger.apply(&tx).unwrap();

        let bob = ledger.query_address("addr_test1_bob").await.unwrap();
        assert_eq!(bob.utxos.len(), 1);
        assert_eq!(bob.utxos[0].lovelace, 49_800_000);
        assert_eq!(ledger.balance("addr_test1_alice").unwrap(), 5_000_000);

        // Same input again is a double spend.
        assert!(matches!(ledger.apply(&tx), Err(VaultError::InsufficientInput(_))));
    }

    #[test]
    fn spending_assets_without_carrying_them_is_rejected() {
        let ledger = MemoryLedger::new();
        let assets = BTreeMap::from([("aa".repeat(28) + "746f6b656e", 5u64)]);
        let src = ledger
            .fund_with_assets("addr_test1_alice", 10_000_000, None, assets)
            .unwrap();
        let mut tx = UnsignedTransaction::new(Network::Testnet);
        tx.inputs.push(src);
        tx.fee = 200_000;
        assert!(matches!(ledger.apply(&tx), Err(VaultError::InsufficientInput(_))));
        assert_eq!(ledger.balance("addr_test1_alice").unwrap(), 10_000_000);
    }

    #[tokio::test]
    async fn offline_ledger_is_unavailable() {
        let ledger = MemoryLedger::new();
        ledger.set_offline(true).unwrap();
        let err = ledger.query_address("addr_test1_alice").await.unwrap_err();
        assert!(err.is_retryable());
        ledger.set_offline(false).unwrap();
        assert!(ledger.query_address("addr_test1_alice").await.unwrap().utxos.is_empty());
    }
}
