//! Script hashing and the version/encoding probe used to resolve stuck contracts.

use ciborium::value::Value;
use serde::Serialize;
use std::collections::BTreeMap;
use vault_types::hash::blake2b_224_prefixed;
use vault_types::{Network, PlutusVersion, ScriptHash, VaultError, VaultResult};

use crate::address::{decode_address, derive_address};

pub fn hash_script(bytes: &[u8], version: PlutusVersion) -> ScriptHash {
    ScriptHash(blake2b_224_prefixed(version.script_tag(), bytes))
}

/// Hash under every supported language. Never picks one.
pub fn probe_all_versions(bytes: &[u8]) -> BTreeMap<PlutusVersion, ScriptHash> {
    PlutusVersion::ALL
        .iter()
        .map(|v| (*v, hash_script(bytes, *v)))
        .collect()
}

/// True when `bytes` under `version` controls `address` on the address's own network.
pub fn verify_match(address: &str, bytes: &[u8], version: PlutusVersion) -> VaultResult<bool> {
    let decoded = decode_address(address)?;
    let expected = decoded.script_hash().ok_or_else(|| {
        VaultError::invalid_address(address, "payment credential is a key, not a script")
    })?;
    Ok(hash_script(bytes, version) == expected)
}

/// How the compiled bytes were transformed before hashing.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ScriptForm {
    AsCompiled,
    /// One CBOR byte-string layer removed.
    Unwrapped,
    /// One CBOR byte-string layer added.
    Wrapped,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScriptCandidate {
    pub version: PlutusVersion,
    pub form: ScriptForm,
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub hash: ScriptHash,
    pub address: String,
}

pub fn unwrap_cbor_bytes(bytes: &[u8]) -> Option<Vec<u8>> {
    let mut cursor = bytes;
    match ciborium::de::from_reader::<Value, _>(&mut cursor) {
        Ok(Value::Bytes(inner)) if cursor.is_empty() => Some(inner),
        _ => None,
    }
}

pub fn wrap_cbor_bytes(bytes: &[u8]) -> VaultResult<Vec<u8>> {
    let mut out = Vec::with_capacity(bytes.len() + 9);
    ciborium::ser::into_writer(&Value::Bytes(bytes.to_vec()), &mut out)
        .map_err(|e| VaultError::Encoding(format!("wrapping script bytes: {e:?}")))?;
    Ok(out)
}

/// Every (form, version) interpretation of `bytes`, with the address each implies.
pub fn probe_candidates(bytes: &[u8], network: Network) -> VaultResult<Vec<ScriptCandidate>> {
    let mut forms = vec![(ScriptForm::AsCompiled, bytes.to_vec())];
    if let Some(inner) = unwrap_cbor_bytes(bytes) {
        forms.push((ScriptForm::Unwrapped, inner));
    }
    forms.push((ScriptForm::Wrapped, wrap_cbor_bytes(bytes)?));

    let mut out = Vec::with_capacity(forms.len() * PlutusVersion::ALL.len());
    for (form, candidate) in forms {
        for (version, hash) in probe_all_versions(&candidate) {
            out.push(ScriptCandidate {
                version,
                form,
                hash,
                address: derive_address(&hash, network)?,
                bytes: candidate.clone(),
            });
        }
    }
    Ok(out)
}

/// First interpretation of `bytes` that reproduces `target_address`, if any.
pub fn find_match(bytes: &[u8], target_address: &str) -> VaultResult<Option<ScriptCandidate>> {
    let network = decode_address(target_address)?.network;
    Ok(probe_candidates(bytes, network)?
        .into_iter()
        .find(|c| c.address == target_address))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &[u8] = &[0x4e, 0x4d, 0x01, 0x00, 0x00, 0x33, 0x22, 0x22, 0x20, 0x05, 0x12];

    #[test]
    fn versions_hash_differently() {
        let probed = probe_all_versions(SCRIPT);
        assert_eq!(probed.len(), 3);
        assert_ne!(probed[&PlutusVersion::V1], probed[&PlutusVersion::V2]);
        assert_ne!(probed[&PlutusVersion::V2], probed[&PlutusVersion::V3]);
        assert_eq!(probed[&PlutusVersion::V2], hash_script(SCRIPT, PlutusVersion::V2));
    }

    #[test]
    fn verify_match_detects_tampering() {
        let hash = hash_script(SCRIPT, PlutusVersion::V2);
        let addr = derive_address(&hash, Network::Testnet).unwrap();
        assert!(verify_match(&addr, SCRIPT, PlutusVersion::V2).unwrap());
        assert!(!verify_match(&addr, SCRIPT, PlutusVersion::V3).unwrap());

        let mut tampered = SCRIPT.to_vec();
        tampered[3] ^= 0xff;
        assert!(!verify_match(&addr, &tampered, PlutusVersion::V2).unwrap());
    }

    #[test]
    fn find_match_recovers_version_and_wrapping() {
        let inner = SCRIPT.to_vec();
        let wrapped = wrap_cbor_bytes(&inner).unwrap();
        assert_eq!(unwrap_cbor_bytes(&wrapped), Some(inner.clone()));

        // Address was derived from the unwrapped bytes under V3, registry holds wrapped bytes.
        let addr = derive_address(&hash_script(&inner, PlutusVersion::V3), Network::Mainnet).unwrap();
        let found = find_match(&wrapped, &addr).unwrap().unwrap();
        assert_eq!(found.version, PlutusVersion::V3);
        assert_eq!(found.form, ScriptForm::Unwrapped);
        assert_eq!(found.bytes, inner);
    }

    #[test]
    fn find_match_reports_none_for_unrelated_address() {
        let other = derive_address(&ScriptHash([0x42; 28]), Network::Testnet).unwrap();
        assert!(find_match(SCRIPT, &other).unwrap().is_none());
    }
}
