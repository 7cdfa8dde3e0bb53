use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::VaultError;
use crate::network::PlutusVersion;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ContractStatus {
    Testing,
    Active,
    Stuck,
    Deprecated,
}

impl ContractStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractStatus::Testing => "testing",
            ContractStatus::Active => "active",
            ContractStatus::Stuck => "stuck",
            ContractStatus::Deprecated => "deprecated",
        }
    }
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractStatus {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "testing" => Ok(ContractStatus::Testing),
            "active" => Ok(ContractStatus::Active),
            "stuck" => Ok(ContractStatus::Stuck),
            "deprecated" => Ok(ContractStatus::Deprecated),
            other => Err(VaultError::Decoding(format!("unknown contract status {other:?}"))),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RegistryNote {
    /// Unix seconds.
    pub at: u64,
    pub text: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EntryMetadata {
    #[serde(default)]
    pub notes: Vec<RegistryNote>,
    #[serde(default)]
    pub updated_at: u64,
    /// Keys written by other tools; carried through rewrites untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl EntryMetadata {
    pub fn push_note(&mut self, at: u64, text: impl Into<String>) {
        self.notes.push(RegistryNote {
            at,
            text: text.into(),
        });
        self.updated_at = at;
    }

    pub fn mentions(&self, needle: &str) -> bool {
        self.notes.iter().any(|n| n.text.contains(needle))
    }
}

/// One row of the durable contract registry. Field names are the on-disk
/// interchange format and must not change.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContractRegistryEntry {
    pub id: String,
    pub contract_address: String,
    /// Hex blake2b-224.
    pub script_hash: String,
    /// Hex script bytes as compiled.
    #[serde(rename = "scriptCBOR")]
    pub script_cbor: String,
    pub plutus_version: PlutusVersion,
    pub status: ContractStatus,
    #[serde(default)]
    pub purpose: String,
    /// Unix seconds.
    pub deployed_at: u64,
    #[serde(default)]
    pub metadata: EntryMetadata,
}

impl ContractRegistryEntry {
    pub fn script_bytes(&self) -> Result<Vec<u8>, VaultError> {
        hex::decode(&self.script_cbor)
            .map_err(|e| VaultError::Decoding(format!("entry {} script bytes: {e}", self.id)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContract {
    pub contract_address: String,
    pub script_hash: String,
    pub script_bytes: Vec<u8>,
    pub plutus_version: PlutusVersion,
    pub purpose: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_uses_interchange_field_names() {
        let raw = r#"{
            "id": "contract_1",
            "contractAddress": "addr_test1wabc",
            "scriptHash": "00",
            "scriptCBOR": "4e4d01000033222220051200120011",
            "plutusVersion": "V2",
            "status": "active",
            "purpose": "agent vault",
            "deployedAt": 1700000000,
            "metadata": { "notes": [], "deployTx": "abcd" }
        }"#;
        let entry: ContractRegistryEntry = serde_json::from_str(raw).unwrap();
        assert_eq!(entry.status, ContractStatus::Active);
        assert_eq!(entry.plutus_version, PlutusVersion::V2);
        assert_eq!(entry.metadata.extra.get("deployTx").unwrap(), "abcd");

        let out = serde_json::to_value(&entry).unwrap();
        for key in [
            "id",
            "contractAddress",
            "scriptHash",
            "scriptCBOR",
            "plutusVersion",
            "status",
            "purpose",
            "deployedAt",
            "metadata",
        ] {
            assert!(out.get(key).is_some(), "missing {key}");
        }
        assert_eq!(out["metadata"]["deployTx"], "abcd");
    }

    #[test]
    fn notes_are_appended() {
        let mut meta = EntryMetadata::default();
        meta.push_note(1, "deployed");
        meta.push_note(2, "verified");
        assert_eq!(meta.notes.len(), 2);
        assert!(meta.mentions("verified"));
        assert_eq!(meta.updated_at, 2);
    }
}
