//! Shelley address encoding for vault (script) and owner (key) credentials.

use bech32::{FromBase32, ToBase32, Variant};
use vault_types::{KeyHash, Network, ScriptHash, VaultError, VaultResult};

const ENTERPRISE_KEY: u8 = 0b0110;
const ENTERPRISE_SCRIPT: u8 = 0b0111;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential {
    Key(KeyHash),
    Script(ScriptHash),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShelleyAddress {
    pub network: Network,
    pub payment: Credential,
    /// Raw header + credential bytes, as carried in transaction outputs.
    pub bytes: Vec<u8>,
}

impl ShelleyAddress {
    pub fn script_hash(&self) -> Option<ScriptHash> {
        match self.payment {
            Credential::Script(hash) => Some(hash),
            Credential::Key(_) => None,
        }
    }
}

pub fn enterprise_script_bytes(hash: &ScriptHash, network: Network) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(1 + ScriptHash::LEN);
    bytes.push((ENTERPRISE_SCRIPT << 4) | network.network_id());
    bytes.extend_from_slice(hash.as_bytes());
    bytes
}

/// Enterprise address controlled by `hash`. The network is deliberately a
/// required argument: a testnet hash rendered with a mainnet prefix is a
/// different, empty address.
pub fn derive_address(hash: &ScriptHash, network: Network) -> VaultResult<String> {
    encode(&enterprise_script_bytes(hash, network), network)
}

pub fn enterprise_key_address(key: &KeyHash, network: Network) -> VaultResult<String> {
    let mut bytes = Vec::with_capacity(1 + KeyHash::LEN);
    bytes.push((ENTERPRISE_KEY << 4) | network.network_id());
    bytes.extend_from_slice(key.as_bytes());
    encode(&bytes, network)
}

fn encode(bytes: &[u8], network: Network) -> VaultResult<String> {
    bech32::encode(network.address_hrp(), bytes.to_base32(), Variant::Bech32)
        .map_err(|e| VaultError::Encoding(format!("bech32 encoding: {e}")))
}

pub fn decode_address(address: &str) -> VaultResult<ShelleyAddress> {
    let (hrp, data, variant) =
        bech32::decode(address).map_err(|e| VaultError::invalid_address(address, e.to_string()))?;
    if variant != Variant::Bech32 {
        return Err(VaultError::invalid_address(address, "bech32m is not a Shelley address"));
    }
    let bytes = Vec::<u8>::from_base32(&data)
        .map_err(|e| VaultError::invalid_address(address, e.to_string()))?;
    let header = *bytes
        .first()
        .ok_or_else(|| VaultError::invalid_address(address, "empty payload"))?;

    let network = Network::from_network_id(header & 0x0f).ok_or_else(|| {
        VaultError::invalid_address(address, format!("unknown network id {}", header & 0x0f))
    })?;
    if hrp != network.address_hrp() {
        return Err(VaultError::invalid_address(
            address,
            format!("prefix {hrp:?} does not match {network} network id in header"),
        ));
    }

    let kind = header >> 4;
    let expected_len = match kind {
        0..=3 => Some(57),
        6 | 7 => Some(29),
        4 | 5 => None,
        _ => {
            return Err(VaultError::invalid_address(
                address,
                format!("address type {kind} has no payment credential"),
            ))
        }
    };
    match expected_len {
        Some(len) if bytes.len() != len => {
            return Err(VaultError::invalid_address(
                address,
                format!("type {kind} address must be {len} bytes, got {}", bytes.len()),
            ))
        }
        None if bytes.len() < 30 => {
            return Err(VaultError::invalid_address(address, "pointer address too short"))
        }
        _ => {}
    }

    let cred = &bytes[1..29];
    let payment = if kind & 1 == 1 {
        Credential::Script(ScriptHash::from_slice(cred)?)
    } else {
        Credential::Key(KeyHash::from_slice(cred)?)
    };

    Ok(ShelleyAddress {
        network,
        payment,
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_address_round_trips() {
        let hash = ScriptHash([0xab; 28]);
        let addr = derive_address(&hash, Network::Testnet).unwrap();
        assert!(addr.starts_with("addr_test1w"));

        let decoded = decode_address(&addr).unwrap();
        assert_eq!(decoded.network, Network::Testnet);
        assert_eq!(decoded.script_hash(), Some(hash));
        assert_eq!(decoded.bytes[0], 0x70);
    }

    #[test]
    fn networks_give_different_addresses() {
        let hash = ScriptHash([0x01; 28]);
        let main = derive_address(&hash, Network::Mainnet).unwrap();
        let test = derive_address(&hash, Network::Testnet).unwrap();
        assert!(main.starts_with("addr1w"));
        assert_ne!(main, test);
        assert_eq!(decode_address(&main).unwrap().bytes[0], 0x71);
    }

    #[test]
    fn prefix_and_header_network_must_agree() {
        // Mainnet header bytes rendered under the testnet prefix.
        let bytes = enterprise_script_bytes(&ScriptHash([0x02; 28]), Network::Mainnet);
        let mixed = bech32::encode("addr_test", bytes.to_base32(), Variant::Bech32).unwrap();
        assert!(matches!(
            decode_address(&mixed),
            Err(VaultError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn key_addresses_carry_key_credentials() {
        let key = KeyHash([0x33; 28]);
        let addr = enterprise_key_address(&key, Network::Testnet).unwrap();
        let decoded = decode_address(&addr).unwrap();
        assert_eq!(decoded.payment, Credential::Key(key));
        assert_eq!(decoded.script_hash(), None);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(decode_address("not-an-address").is_err());
        assert!(decode_address("").is_err());
    }
}
