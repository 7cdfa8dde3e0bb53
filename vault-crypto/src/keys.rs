pub use ed25519_dalek::VerifyingKey;
use vault_types::hash::blake2b_224;
use vault_types::{KeyHash, VaultError, VaultResult};

/// Payment credential of an ed25519 verification key. Rejects bytes that are
/// not a valid curve point so a typo cannot become an unspendable owner.
pub fn key_hash(vkey: &[u8]) -> VaultResult<KeyHash> {
    let raw: &[u8; 32] = vkey
        .try_into()
        .map_err(|_| VaultError::Decoding(format!("verification key must be 32 bytes, got {}", vkey.len())))?;
    let key = VerifyingKey::from_bytes(raw)
        .map_err(|_| VaultError::Decoding("invalid ed25519 verification key".into()))?;
    Ok(KeyHash(blake2b_224(key.as_bytes())))
}

pub fn key_hash_hex(vkey_hex: &str) -> VaultResult<KeyHash> {
    let bytes = hex::decode(vkey_hex.trim_start_matches("0x"))
        .map_err(|e| VaultError::Decoding(format!("verification key hex: {e}")))?;
    key_hash(&bytes)
}
