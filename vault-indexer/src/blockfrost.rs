//! Blockfrost-compatible HTTP indexer.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};
use vault_types::{OutputRef, Utxo, VaultError, VaultResult};

use crate::{AddressState, ChainIndexer};

const PAGE_SIZE: usize = 100;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct IndexerConfig {
    pub base_url: String,
    pub project_id: String,
    /// Per request.
    pub timeout_secs: u64,
    pub max_attempts: u32,
    /// First retry delay; doubles per attempt.
    pub backoff_ms: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://cardano-preprod.blockfrost.io/api/v0".into(),
            project_id: String::new(),
            timeout_secs: 10,
            max_attempts: 3,
            backoff_ms: 250,
        }
    }
}

#[derive(Deserialize, Debug)]
struct BfAmount {
    unit: String,
    quantity: String,
}

#[derive(Deserialize, Debug)]
struct BfUtxo {
    tx_hash: String,
    output_index: u32,
    amount: Vec<BfAmount>,
    #[serde(default)]
    inline_datum: Option<String>,
}

enum FetchError {
    Transient(String),
    Fatal(VaultError),
}

pub struct BlockfrostIndexer {
    client: Client,
    config: IndexerConfig,
}

impl BlockfrostIndexer {
    pub fn new(config: IndexerConfig) -> VaultResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .user_agent(concat!("vault-engine/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| VaultError::IndexerUnavailable(format!("http client init: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    async fn fetch_page(&self, address: &str, page: u32) -> Result<Vec<BfUtxo>, FetchError> {
        let url = format!(
            "{}/addresses/{}/utxos",
            self.config.base_url.trim_end_matches('/'),
            address
        );
        let resp = self
            .client
            .get(&url)
            .query(&[("page", page.to_string()), ("count", PAGE_SIZE.to_string())])
            .header("project_id", &self.config.project_id)
            .send()
            .await
            .map_err(|e| FetchError::Transient(format!("request failed: {e}")))?;

        let status = resp.status();
        match classify(status) {
            StatusClass::Ok => resp
                .json::<Vec<BfUtxo>>()
                .await
                .map_err(|e| FetchError::Transient(format!("malformed utxo page: {e}"))),
            StatusClass::Empty => Ok(Vec::new()),
            StatusClass::Retry => Err(FetchError::Transient(format!("indexer returned {status}"))),
            StatusClass::BadAddress => Err(FetchError::Fatal(VaultError::invalid_address(
                address,
                "rejected by indexer",
            ))),
            StatusClass::Fail => Err(FetchError::Fatal(VaultError::IndexerUnavailable(format!(
                "indexer returned {status} for {address}"
            )))),
        }
    }

    async fn fetch_with_retry(&self, address: &str, page: u32) -> VaultResult<Vec<BfUtxo>> {
        let attempts = self.config.max_attempts.max(1);
        let mut last = String::new();
        for attempt in 1..=attempts {
            match self.fetch_page(address, page).await {
                Ok(rows) => return Ok(rows),
                Err(FetchError::Fatal(e)) => return Err(e),
                Err(FetchError::Transient(reason)) => {
                    warn!(address, page, attempt, %reason, "indexer request failed");
                    last = reason;
                    if attempt < attempts {
                        let delay = self
                            .config
                            .backoff_ms
                            .saturating_mul(1u64 << (attempt - 1).min(10));
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                }
            }
        }
        Err(VaultError::IndexerUnavailable(format!(
            "{address} page {page} after {attempts} attempts: {last}"
        )))
    }
}

#[async_trait]
impl ChainIndexer for BlockfrostIndexer {
    async fn query_address(&self, address: &str) -> VaultResult<AddressState> {
        let mut utxos = Vec::new();
        let mut page = 1;
        loop {
            let rows = self.fetch_with_retry(address, page).await?;
            let full = rows.len() >= PAGE_SIZE;
            for row in rows {
                utxos.push(into_utxo(address, row)?);
            }
            if !full {
                break;
            }
            page += 1;
        }
        debug!(address, count = utxos.len(), pages = page, "queried address");
        Ok(AddressState {
            address: address.to_string(),
            utxos,
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
enum StatusClass {
    Ok,
    /// Address never seen on chain.
    Empty,
    Retry,
    BadAddress,
    Fail,
}

fn classify(status: StatusCode) -> StatusClass {
    match status {
        s if s.is_success() => StatusClass::Ok,
        StatusCode::NOT_FOUND => StatusClass::Empty,
        StatusCode::BAD_REQUEST => StatusClass::BadAddress,
        StatusCode::TOO_MANY_REQUESTS => StatusClass::Retry,
        s if s.is_server_error() => StatusClass::Retry,
        _ => StatusClass::Fail,
    }
}

fn into_utxo(address: &str, row: BfUtxo) -> VaultResult<Utxo> {
    let malformed = |what: String| VaultError::IndexerUnavailable(format!("malformed utxo: {what}"));
    let tx_hash = row
        .tx_hash
        .parse()
        .map_err(|e| malformed(format!("{e}")))?;
    let mut lovelace = 0u64;
    let mut assets = BTreeMap::new();
    for amount in &row.amount {
        let q = amount
            .quantity
            .parse::<u64>()
            .map_err(|e| malformed(format!("quantity {:?}: {e}", amount.quantity)))?;
        if amount.unit == "lovelace" {
            lovelace = lovelace
                .checked_add(q)
                .ok_or_else(|| malformed("lovelace overflow".into()))?;
        } else {
            let held: &mut u64 = assets.entry(amount.unit.clone()).or_default();
            *held = held
                .checked_add(q)
                .ok_or_else(|| malformed(format!("{} overflow", amount.unit)))?;
        }
    }
    let inline_datum = row
        .inline_datum
        .map(|d| hex::decode(&d).map_err(|e| malformed(format!("inline datum: {e}"))))
        .transpose()?;
    Ok(Utxo {
        out_ref: OutputRef::new(tx_hash, row.output_index),
        address: address.to_string(),
        lovelace,
        inline_datum,
        assets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"[
        {
            "address": "addr_test1wq",
            "tx_hash": "39a7a284c2a0948189dc45dec670211cd4d72f7b66c5726c08d9b3df11e44d58",
            "tx_index": 0,
            "output_index": 1,
            "amount": [
                { "unit": "lovelace", "quantity": "42000000" },
                { "unit": "b0d07d45fe9514f80213f4020e5a61241458be626841cde717cb38a7", "quantity": "12" }
            ],
            "block": "7eb8e27d18686c7db9a18f8bbcfe34e3fed6e047afaa2d969904d15e934847e6",
            "data_hash": null,
            "inline_datum": "d8799f00ff",
            "reference_script_hash": null
        }
    ]"#;

    #[test]
    fn page_rows_become_utxos() {
        let rows: Vec<BfUtxo> = serde_json::from_str(PAGE).unwrap();
        let utxo = into_utxo("addr_test1wq", rows.into_iter().next().unwrap()).unwrap();
        assert_eq!(utxo.lovelace, 42_000_000);
        assert_eq!(utxo.out_ref.index, 1);
        assert_eq!(utxo.inline_datum, Some(vec![0xd8, 0x79, 0x9f, 0x00, 0xff]));
        assert!(utxo.holds_assets());
        assert_eq!(
            utxo.assets["b0d07d45fe9514f80213f4020e5a61241458be626841cde717cb38a7"],
            12
        );
    }

    #[test]
    fn bad_quantity_is_indexer_failure() {
        let row = BfUtxo {
            tx_hash: "00".repeat(32),
            output_index: 0,
            amount: vec![BfAmount {
                unit: "lovelace".into(),
                quantity: "-5".into(),
            }],
            inline_datum: None,
        };
        let err = into_utxo("addr", row).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn status_classes() {
        assert_eq!(classify(StatusCode::OK), StatusClass::Ok);
        assert_eq!(classify(StatusCode::NOT_FOUND), StatusClass::Empty);
        assert_eq!(classify(StatusCode::TOO_MANY_REQUESTS), StatusClass::Retry);
        assert_eq!(classify(StatusCode::BAD_GATEWAY), StatusClass::Retry);
        assert_eq!(classify(StatusCode::BAD_REQUEST), StatusClass::BadAddress);
        assert_eq!(classify(StatusCode::FORBIDDEN), StatusClass::Fail);
    }

    #[tokio::test]
    async fn unreachable_indexer_is_retryable_failure() {
        let indexer = BlockfrostIndexer::new(IndexerConfig {
            base_url: "http://127.0.0.1:9".into(),
            project_id: "test".into(),
            timeout_secs: 1,
            max_attempts: 2,
            backoff_ms: 1,
        })
        .unwrap();
        let err = indexer.query_address("addr_test1wq").await.unwrap_err();
        assert!(matches!(err, VaultError::IndexerUnavailable(_)));
        assert!(err.is_retryable());
    }
}
