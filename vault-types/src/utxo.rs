use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::hash::TxHash;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct OutputRef {
    pub tx_hash: TxHash,
    pub index: u32,
}

impl OutputRef {
    pub fn new(tx_hash: TxHash, index: u32) -> Self {
        Self { tx_hash, index }
    }
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tx_hash, self.index)
    }
}

impl std::str::FromStr for OutputRef {
    type Err = crate::error::VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hash, index) = s.split_once('#').ok_or_else(|| {
            crate::error::VaultError::Decoding(format!("output reference {s:?} must be hash#index"))
        })?;
        let index = index.parse::<u32>().map_err(|e| {
            crate::error::VaultError::Decoding(format!("output index {index:?}: {e}"))
        })?;
        Ok(OutputRef::new(hash.parse()?, index))
    }
}

/// Unspent output as reported by the chain indexer. Builders never spend an
/// output carrying native assets, so feasibility arithmetic is lovelace only.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Utxo {
    pub out_ref: OutputRef,
    pub address: String,
    pub lovelace: u64,
    #[serde(default, with = "opt_hex", skip_serializing_if = "Option::is_none")]
    pub inline_datum: Option<Vec<u8>>,
    /// Native assets by `policy id ++ asset name` hex unit.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub assets: BTreeMap<String, u64>,
}

impl Utxo {
    pub fn lovelace_only(
        out_ref: OutputRef,
        address: &str,
        lovelace: u64,
        inline_datum: Option<Vec<u8>>,
    ) -> Self {
        Self {
            out_ref,
            address: address.to_string(),
            lovelace,
            inline_datum,
            assets: BTreeMap::new(),
        }
    }

    pub fn holds_assets(&self) -> bool {
        self.assets.values().any(|q| *q > 0)
    }
}

/// Point-in-time view of a vault address. Valid for one decision cycle only.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VaultBalanceSnapshot {
    pub address: String,
    pub total_lovelace: u64,
    pub utxos: Vec<Utxo>,
    pub queried_at: u64,
}

impl VaultBalanceSnapshot {
    pub fn from_utxos(address: &str, utxos: Vec<Utxo>, queried_at: u64) -> Self {
        let total_lovelace = utxos
            .iter()
            .fold(0u64, |acc, u| acc.saturating_add(u.lovelace));
        Self {
            address: address.to_string(),
            total_lovelace,
            utxos,
            queried_at,
        }
    }
}

mod opt_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => s.serialize_str(&hex::encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        raw.map(|h| hex::decode(h).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_totals_utxos() {
        let utxos = vec![
            Utxo::lovelace_only(OutputRef::new(TxHash([1; 32]), 0), "addr_test1v", 60, None),
            Utxo::lovelace_only(
                OutputRef::new(TxHash([2; 32]), 1),
                "addr_test1v",
                40,
                Some(vec![0xd8, 0x79, 0x80]),
            ),
        ];
        let snapshot = VaultBalanceSnapshot::from_utxos("addr_test1v", utxos, 1_700_000_000);
        assert_eq!(snapshot.total_lovelace, 100);

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"inlineDatum\":\"d87980\""));
        assert!(!json.contains("assets"));
        let back: VaultBalanceSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn output_ref_parses_hash_index_form() {
        let text = format!("{}#3", TxHash([9; 32]));
        let parsed: OutputRef = text.parse().unwrap();
        assert_eq!(parsed, OutputRef::new(TxHash([9; 32]), 3));
        assert_eq!(parsed.to_string(), text);
        assert!("nohash".parse::<OutputRef>().is_err());
    }
}
