use blake2::digest::consts::{U28, U32};
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::VaultError;

type Blake2b224 = Blake2b<U28>;
type Blake2b256 = Blake2b<U32>;

pub fn blake2b_224(data: &[u8]) -> [u8; 28] {
    Blake2b224::digest(data).into()
}

/// blake2b-224 of `prefix || data`, the shape of every script hash.
pub fn blake2b_224_prefixed(prefix: u8, data: &[u8]) -> [u8; 28] {
    let mut hasher = Blake2b224::new();
    hasher.update([prefix]);
    hasher.update(data);
    hasher.finalize().into()
}

pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    Blake2b256::digest(data).into()
}

macro_rules! fixed_hash {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            pub fn from_slice(bytes: &[u8]) -> Result<Self, VaultError> {
                let arr: [u8; $len] = bytes.try_into().map_err(|_| {
                    VaultError::Decoding(format!(
                        "{} must be {} bytes, got {}",
                        stringify!($name),
                        $len,
                        bytes.len()
                    ))
                })?;
                Ok(Self(arr))
            }
        }

        impl FromStr for $name {
            type Err = VaultError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let bytes = hex::decode(s.trim_start_matches("0x")).map_err(|e| {
                    VaultError::Decoding(format!("{} is not hex: {}", stringify!($name), e))
                })?;
                Self::from_slice(&bytes)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

fixed_hash!(
    /// blake2b-224 of a language-tagged Plutus script.
    ScriptHash,
    28
);
fixed_hash!(
    /// blake2b-224 of an ed25519 verification key (payment credential).
    KeyHash,
    28
);
fixed_hash!(TxHash, 32);
fixed_hash!(DataHash, 32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blake2b_224_of_empty_input() {
        assert_eq!(
            hex::encode(blake2b_224(b"")),
            "836cc68931c2e4e3e838602eca1902591d216837bafddfe6f0c8cb07"
        );
    }

    #[test]
    fn prefixed_hash_is_hash_of_concatenation() {
        assert_eq!(blake2b_224_prefixed(0x02, b"cd"), blake2b_224(b"\x02cd"));
    }

    #[test]
    fn hex_round_trip_and_length_check() {
        let hash = KeyHash([7u8; 28]);
        let parsed: KeyHash = hash.to_hex().parse().unwrap();
        assert_eq!(parsed, hash);
        assert!("abcd".parse::<KeyHash>().is_err());
        assert_eq!(serde_json::to_string(&hash).unwrap(), format!("\"{}\"", hash));
    }
}
