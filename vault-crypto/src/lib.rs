pub mod address;
pub mod keys;
pub mod script;

pub use address::{decode_address, derive_address, Credential, ShelleyAddress};
pub use keys::key_hash;
pub use script::{find_match, hash_script, probe_all_versions, verify_match, ScriptCandidate};
