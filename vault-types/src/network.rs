use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::VaultError;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    /// Network id carried in the low nibble of a Shelley address header.
    pub fn network_id(&self) -> u8 {
        match self {
            Network::Mainnet => 1,
            Network::Testnet => 0,
        }
    }

    pub fn from_network_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Network::Mainnet),
            0 => Some(Network::Testnet),
            _ => None,
        }
    }

    pub fn address_hrp(&self) -> &'static str {
        match self {
            Network::Mainnet => "addr",
            Network::Testnet => "addr_test",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => f.write_str("mainnet"),
            Network::Testnet => f.write_str("testnet"),
        }
    }
}

impl FromStr for Network {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "testnet" | "preprod" | "preview" => Ok(Network::Testnet),
            other => Err(VaultError::Decoding(format!(
                "unknown network {other:?}, use mainnet or testnet"
            ))),
        }
    }
}

/// Plutus language version a compiled validator targets.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PlutusVersion {
    #[serde(rename = "PlutusV1", alias = "V1")]
    V1,
    #[serde(rename = "PlutusV2", alias = "V2")]
    V2,
    #[serde(rename = "PlutusV3", alias = "V3")]
    V3,
}

impl PlutusVersion {
    pub const ALL: [PlutusVersion; 3] = [PlutusVersion::V1, PlutusVersion::V2, PlutusVersion::V3];

    /// Prefix byte hashed in front of the script bytes.
    pub fn script_tag(&self) -> u8 {
        match self {
            PlutusVersion::V1 => 0x01,
            PlutusVersion::V2 => 0x02,
            PlutusVersion::V3 => 0x03,
        }
    }

    /// Language id used by cost models and language views.
    pub fn language_id(&self) -> u8 {
        self.script_tag() - 1
    }

    /// Witness-set key holding scripts of this language.
    pub fn witness_key(&self) -> u64 {
        match self {
            PlutusVersion::V1 => 3,
            PlutusVersion::V2 => 6,
            PlutusVersion::V3 => 7,
        }
    }
}

impl fmt::Display for PlutusVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlutusVersion::V1 => f.write_str("PlutusV1"),
            PlutusVersion::V2 => f.write_str("PlutusV2"),
            PlutusVersion::V3 => f.write_str("PlutusV3"),
        }
    }
}

impl FromStr for PlutusVersion {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().trim_start_matches("plutus") {
            "v1" | "1" => Ok(PlutusVersion::V1),
            "v2" | "2" => Ok(PlutusVersion::V2),
            "v3" | "3" => Ok(PlutusVersion::V3),
            _ => Err(VaultError::Decoding(format!("unknown Plutus version {s:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_parsing_accepts_short_and_long_forms() {
        assert_eq!("PlutusV2".parse::<PlutusVersion>().unwrap(), PlutusVersion::V2);
        assert_eq!("v3".parse::<PlutusVersion>().unwrap(), PlutusVersion::V3);
        assert!("V4".parse::<PlutusVersion>().is_err());
        let legacy: PlutusVersion = serde_json::from_str("\"V1\"").unwrap();
        assert_eq!(legacy, PlutusVersion::V1);
    }

    #[test]
    fn network_ids_match_address_headers() {
        assert_eq!(Network::Mainnet.network_id(), 1);
        assert_eq!(Network::from_network_id(0), Some(Network::Testnet));
        assert_eq!(Network::from_network_id(3), None);
        assert_eq!("preprod".parse::<Network>().unwrap(), Network::Testnet);
    }
}
