//! Durable contract registry: a flat JSON array of `ContractRegistryEntry`
//! rows, rewritten atomically on every mutation.

use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};
use vault_crypto::script::{find_match, hash_script, probe_candidates, ScriptCandidate};
use vault_crypto::{decode_address, verify_match};
use vault_types::registry::EntryMetadata;
use vault_types::{
    now_secs, ContractRegistryEntry, ContractStatus, NewContract, PlutusVersion, VaultError,
    VaultResult,
};

pub trait ContractStore: Send + Sync {
    /// Returns the id of the live entry when one already exists at the address.
    fn register(&self, contract: NewContract) -> VaultResult<String>;
    fn get(&self, id: &str) -> VaultResult<Option<ContractRegistryEntry>>;
    fn get_by_address(&self, address: &str) -> VaultResult<Option<ContractRegistryEntry>>;
    fn update_status(
        &self,
        id: &str,
        status: ContractStatus,
        note: &str,
    ) -> VaultResult<ContractRegistryEntry>;
    /// Newest first.
    fn list(&self) -> VaultResult<Vec<ContractRegistryEntry>>;
    /// Swap in recovered script bytes and reset the entry to `status`.
    fn replace_script(
        &self,
        id: &str,
        candidate: &ScriptCandidate,
        status: ContractStatus,
        note: &str,
    ) -> VaultResult<ContractRegistryEntry>;

    /// Recompute the entry's hash and address. A mismatch flips it to `stuck`.
    fn verify_entry(&self, id: &str) -> VaultResult<bool> {
        let entry = self.get(id)?.ok_or_else(|| not_found(id))?;
        let consistent = entry_is_consistent(&entry)?;
        if !consistent && entry.status != ContractStatus::Stuck {
            warn!(id, address = %entry.contract_address, "registered script does not hash to its address");
            self.update_status(
                id,
                ContractStatus::Stuck,
                &format!(
                    "verification failed: {} script bytes do not derive {}",
                    entry.plutus_version, entry.contract_address
                ),
            )?;
        }
        Ok(consistent)
    }

    /// Try every version and wrapping of the stored bytes for one that
    /// reproduces the entry's address. Consistent entries that are not
    /// stuck are left untouched.
    fn attempt_recovery(&self, id: &str) -> VaultResult<RecoveryOutcome> {
        let entry = self.get(id)?.ok_or_else(|| not_found(id))?;
        if entry.status != ContractStatus::Stuck && entry_is_consistent(&entry)? {
            debug!(id, status = %entry.status, "recovery skipped, entry is consistent");
            return Ok(RecoveryOutcome::Consistent {
                status: entry.status,
            });
        }
        let bytes = entry.script_bytes()?;
        if let Some(found) = find_match(&bytes, &entry.contract_address)? {
            info!(id, version = %found.version, form = ?found.form, "recovered script for stuck contract");
            let note = format!(
                "recovered: bytes {:?} under {} reproduce {}",
                found.form, found.version, entry.contract_address
            );
            self.replace_script(id, &found, ContractStatus::Testing, &note)?;
            return Ok(RecoveryOutcome::Recovered { candidate: found });
        }

        let network = decode_address(&entry.contract_address)?.network;
        let probed = probe_candidates(&bytes, network)?;
        let listing = probed
            .iter()
            .map(|c| format!("{}/{:?}={}", c.version, c.form, c.hash))
            .collect::<Vec<_>>()
            .join(", ");
        warn!(id, candidates = probed.len(), "no script interpretation matches address");
        self.update_status(
            id,
            ContractStatus::Stuck,
            &format!("recovery failed, probed {listing}"),
        )?;
        Ok(RecoveryOutcome::Unrecoverable { probed })
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum RecoveryOutcome {
    Consistent { status: ContractStatus },
    Recovered { candidate: ScriptCandidate },
    Unrecoverable { probed: Vec<ScriptCandidate> },
}

fn not_found(id: &str) -> VaultError {
    VaultError::NotFound(format!("no registry entry with id {id}"))
}

fn entry_is_consistent(entry: &ContractRegistryEntry) -> VaultResult<bool> {
    let bytes = entry.script_bytes()?;
    let recomputed = hash_script(&bytes, entry.plutus_version);
    Ok(recomputed.to_hex() == entry.script_hash.to_lowercase()
        && verify_match(&entry.contract_address, &bytes, entry.plutus_version)?)
}

/// JSON-file registry. `in_memory` skips persistence for tests and dry runs.
pub struct ContractRegistry {
    path: Option<PathBuf>,
    entries: RwLock<Vec<ContractRegistryEntry>>,
    seq: AtomicU64,
}

impl ContractRegistry {
    pub fn open(path: impl AsRef<Path>) -> VaultResult<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let raw = fs::read(&path)?;
            if raw.iter().all(u8::is_ascii_whitespace) {
                Vec::new()
            } else {
                serde_json::from_slice::<Vec<ContractRegistryEntry>>(&raw).map_err(|e| {
                    VaultError::Storage(format!("registry {} is corrupt: {e}", path.display()))
                })?
            }
        } else {
            Vec::new()
        };
        debug!(path = %path.display(), entries = entries.len(), "opened contract registry");
        Ok(Self {
            path: Some(path),
            entries: RwLock::new(entries),
            seq: AtomicU64::new(0),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: RwLock::new(Vec::new()),
            seq: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn next_id(&self, address: &str, script_hash: &str) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let mut hasher = blake3::Hasher::new();
        hasher.update(address.as_bytes());
        hasher.update(script_hash.as_bytes());
        hasher.update(&nanos.to_le_bytes());
        hasher.update(&seq.to_le_bytes());
        let digest = hasher.finalize();
        format!("contract_{}", &hex::encode(digest.as_bytes())[..16])
    }

    fn read(&self) -> VaultResult<std::sync::RwLockReadGuard<'_, Vec<ContractRegistryEntry>>> {
        self.entries
            .read()
            .map_err(|_| VaultError::Storage("registry lock poisoned".into()))
    }

    /// Apply `f` to a copy of the table, persist it, then publish it. Readers
    /// see either the old table or the new one.
    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Vec<ContractRegistryEntry>) -> VaultResult<T>,
    ) -> VaultResult<T> {
        let mut guard = self
            .entries
            .write()
            .map_err(|_| VaultError::Storage("registry lock poisoned".into()))?;
        let mut next = guard.clone();
        let out = f(&mut next)?;
        if let Some(path) = &self.path {
            persist(path, &next)?;
        }
        *guard = next;
        Ok(out)
    }
}

fn persist(path: &Path, entries: &[ContractRegistryEntry]) -> VaultResult<()> {
    let json = serde_json::to_vec_pretty(entries)
        .map_err(|e| VaultError::Storage(format!("serializing registry: {e}")))?;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);
    {
        let mut file = File::create(&tmp)?;
        file.write_all(&json)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if let Ok(dir) = File::open(dir) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}

impl ContractStore for ContractRegistry {
    fn register(&self, contract: NewContract) -> VaultResult<String> {
        let decoded = decode_address(&contract.contract_address)?;
        let recomputed = hash_script(&contract.script_bytes, contract.plutus_version);
        let hash_ok = recomputed.to_hex() == contract.script_hash.to_lowercase();
        let address_ok = decoded.script_hash() == Some(recomputed);
        let id = self.next_id(&contract.contract_address, &contract.script_hash);
        let now = now_secs();

        self.mutate(|entries| {
            if let Some(live) = entries.iter().find(|e| {
                e.contract_address == contract.contract_address
                    && e.status == ContractStatus::Active
            }) {
                info!(id = %live.id, address = %live.contract_address, "address already has an active entry");
                return Ok(live.id.clone());
            }

            let mut metadata = EntryMetadata::default();
            let status = if hash_ok && address_ok {
                metadata.push_note(now, "registered");
                ContractStatus::Testing
            } else {
                let mut text = format!(
                    "registered stuck: {} hash of script bytes is {}",
                    contract.plutus_version, recomputed
                );
                if !hash_ok {
                    text.push_str(&format!(", submitted {}", contract.script_hash));
                }
                if !address_ok {
                    text.push_str(", does not derive the contract address");
                }
                metadata.push_note(now, text);
                ContractStatus::Stuck
            };

            let entry = ContractRegistryEntry {
                id: id.clone(),
                contract_address: contract.contract_address.clone(),
                script_hash: contract.script_hash.to_lowercase(),
                script_cbor: hex::encode(&contract.script_bytes),
                plutus_version: contract.plutus_version,
                status,
                purpose: contract.purpose.clone(),
                deployed_at: now,
                metadata,
            };
            if status == ContractStatus::Stuck {
                warn!(id = %id, address = %entry.contract_address, "registered contract is stuck");
            } else {
                info!(id = %id, address = %entry.contract_address, "registered contract");
            }
            entries.push(entry);
            Ok(id.clone())
        })
    }

    fn get(&self, id: &str) -> VaultResult<Option<ContractRegistryEntry>> {
        Ok(self.read()?.iter().find(|e| e.id == id).cloned())
    }

    /// The active entry at `address` if there is one, otherwise the newest.
    fn get_by_address(&self, address: &str) -> VaultResult<Option<ContractRegistryEntry>> {
        let entries = self.read()?;
        let mut at_address = entries
            .iter()
            .rev()
            .filter(|e| e.contract_address == address);
        let newest = at_address.clone().next();
        Ok(at_address
            .find(|e| e.status == ContractStatus::Active)
            .or(newest)
            .cloned())
    }

    fn update_status(
        &self,
        id: &str,
        status: ContractStatus,
        note: &str,
    ) -> VaultResult<ContractRegistryEntry> {
        let now = now_secs();
        self.mutate(|entries| {
            let entry = entries
                .iter_mut()
                .find(|e| e.id == id)
                .ok_or_else(|| not_found(id))?;
            let from = entry.status;
            entry.status = status;
            let text = if note.is_empty() {
                format!("{from} -> {status}")
            } else {
                format!("{from} -> {status}: {note}")
            };
            entry.metadata.push_note(now, text);
            info!(id, %from, to = %status, "contract status updated");
            Ok(entry.clone())
        })
    }

    fn list(&self) -> VaultResult<Vec<ContractRegistryEntry>> {
        let mut out: Vec<_> = self.read()?.iter().rev().cloned().collect();
        out.sort_by(|a, b| b.deployed_at.cmp(&a.deployed_at));
        Ok(out)
    }

    fn replace_script(
        &self,
        id: &str,
        candidate: &ScriptCandidate,
        status: ContractStatus,
        note: &str,
    ) -> VaultResult<ContractRegistryEntry> {
        let now = now_secs();
        self.mutate(|entries| {
            let entry = entries
                .iter_mut()
                .find(|e| e.id == id)
                .ok_or_else(|| not_found(id))?;
            entry.script_cbor = hex::encode(&candidate.bytes);
            entry.script_hash = candidate.hash.to_hex();
            entry.plutus_version = candidate.version;
            entry.status = status;
            entry.metadata.push_note(now, note);
            Ok(entry.clone())
        })
    }
}

/// Registration request for bytes whose hash is computed here rather than
/// supplied by the caller.
pub fn new_contract(
    address: impl Into<String>,
    script_bytes: Vec<u8>,
    version: PlutusVersion,
    purpose: impl Into<String>,
) -> NewContract {
    NewContract {
        contract_address: address.into(),
        script_hash: hash_script(&script_bytes, version).to_hex(),
        script_bytes,
        plutus_version: version,
        purpose: purpose.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vault_crypto::script::{wrap_cbor_bytes, ScriptForm};
    use vault_crypto::derive_address;
    use vault_types::Network;

    const SCRIPT: &[u8] = &[0x4e, 0x4d, 0x01, 0x00, 0x00, 0x33, 0x22, 0x22, 0x20, 0x05, 0x12];

    fn vault_address(bytes: &[u8], version: PlutusVersion) -> String {
        derive_address(&hash_script(bytes, version), Network::Testnet).unwrap()
    }

    #[test]
    fn register_then_activate() {
        let registry = ContractRegistry::in_memory();
        let addr = vault_address(SCRIPT, PlutusVersion::V2);
        let id = registry
            .register(new_contract(&addr, SCRIPT.to_vec(), PlutusVersion::V2, "agent vault"))
            .unwrap();
        assert_eq!(registry.get(&id).unwrap().unwrap().status, ContractStatus::Testing);

        registry
            .update_status(&id, ContractStatus::Active, "verified")
            .unwrap();
        let entry = registry.get_by_address(&addr).unwrap().unwrap();
        assert_eq!(entry.status, ContractStatus::Active);
        assert!(entry.metadata.mentions("verified"));
        assert!(entry.metadata.mentions("registered"));
    }

    #[test]
    fn registering_over_active_entry_returns_existing_id() {
        let registry = ContractRegistry::in_memory();
        let addr = vault_address(SCRIPT, PlutusVersion::V2);
        let contract = new_contract(&addr, SCRIPT.to_vec(), PlutusVersion::V2, "agent vault");
        let first = registry.register(contract.clone()).unwrap();
        registry
            .update_status(&first, ContractStatus::Active, "live")
            .unwrap();

        let second = registry.register(contract).unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.list().unwrap().len(), 1);
    }

    #[test]
    fn tampered_bytes_register_as_stuck() {
        let registry = ContractRegistry::in_memory();
        let addr = vault_address(SCRIPT, PlutusVersion::V2);
        let mut tampered = SCRIPT.to_vec();
        tampered[4] ^= 0x01;
        let id = registry
            .register(new_contract(&addr, tampered, PlutusVersion::V2, "agent vault"))
            .unwrap();
        let entry = registry.get(&id).unwrap().unwrap();
        assert_eq!(entry.status, ContractStatus::Stuck);
        assert!(entry.metadata.mentions("does not derive"));
    }

    #[test]
    fn update_unknown_id_is_not_found() {
        let registry = ContractRegistry::in_memory();
        let err = registry
            .update_status("contract_missing", ContractStatus::Active, "")
            .unwrap_err();
        assert!(matches!(err, VaultError::NotFound(_)));
    }

    #[test]
    fn verify_entry_flips_inconsistent_entry_to_stuck() {
        let registry = ContractRegistry::in_memory();
        let addr = vault_address(SCRIPT, PlutusVersion::V2);
        let id = registry
            .register(new_contract(&addr, SCRIPT.to_vec(), PlutusVersion::V2, ""))
            .unwrap();
        assert!(registry.verify_entry(&id).unwrap());

        // Simulate a registry row edited by hand with the wrong language tag.
        let wrong = probe_candidates(SCRIPT, Network::Testnet)
            .unwrap()
            .into_iter()
            .find(|c| c.version == PlutusVersion::V3 && c.form == ScriptForm::AsCompiled)
            .unwrap();
        registry
            .replace_script(&id, &wrong, ContractStatus::Active, "edited")
            .unwrap();

        assert!(!registry.verify_entry(&id).unwrap());
        assert_eq!(registry.get(&id).unwrap().unwrap().status, ContractStatus::Stuck);
    }

    #[test]
    fn recovery_finds_unwrapped_v3_bytes() {
        let registry = ContractRegistry::in_memory();
        // On-chain address came from the raw bytes under V3, but the deploy
        // tool recorded the CBOR-wrapped bytes and labelled them V2.
        let addr = vault_address(SCRIPT, PlutusVersion::V3);
        let wrapped = wrap_cbor_bytes(SCRIPT).unwrap();
        let id = registry
            .register(new_contract(&addr, wrapped, PlutusVersion::V2, "agent vault"))
            .unwrap();
        assert_eq!(registry.get(&id).unwrap().unwrap().status, ContractStatus::Stuck);

        match registry.attempt_recovery(&id).unwrap() {
            RecoveryOutcome::Recovered { candidate } => {
                assert_eq!(candidate.version, PlutusVersion::V3);
                assert_eq!(candidate.form, ScriptForm::Unwrapped);
            }
            other => panic!("expected recovery, got {other:?}"),
        }
        let entry = registry.get(&id).unwrap().unwrap();
        assert_eq!(entry.status, ContractStatus::Testing);
        assert_eq!(entry.plutus_version, PlutusVersion::V3);
        assert_eq!(entry.script_bytes().unwrap(), SCRIPT);
        assert!(registry.verify_entry(&id).unwrap());
    }

    #[test]
    fn recovery_leaves_consistent_active_entry_alone() {
        let registry = ContractRegistry::in_memory();
        let addr = vault_address(SCRIPT, PlutusVersion::V2);
        let contract = new_contract(&addr, SCRIPT.to_vec(), PlutusVersion::V2, "agent vault");
        let id = registry.register(contract.clone()).unwrap();
        registry
            .update_status(&id, ContractStatus::Active, "live")
            .unwrap();
        let before = registry.get(&id).unwrap().unwrap();

        let outcome = registry.attempt_recovery(&id).unwrap();
        assert_eq!(
            outcome,
            RecoveryOutcome::Consistent {
                status: ContractStatus::Active
            }
        );
        assert_eq!(registry.get(&id).unwrap().unwrap(), before);

        // Still the live entry, so a second registration is a no-op.
        assert_eq!(registry.register(contract).unwrap(), id);
        assert_eq!(registry.list().unwrap().len(), 1);
    }

    #[test]
    fn unrecoverable_entry_stays_stuck_with_candidate_notes() {
        let registry = ContractRegistry::in_memory();
        let unrelated = derive_address(&vault_types::ScriptHash([9; 28]), Network::Testnet).unwrap();
        let id = registry
            .register(new_contract(&unrelated, SCRIPT.to_vec(), PlutusVersion::V2, ""))
            .unwrap();

        let outcome = registry.attempt_recovery(&id).unwrap();
        assert!(matches!(outcome, RecoveryOutcome::Unrecoverable { ref probed } if probed.len() >= 6));
        let entry = registry.get(&id).unwrap().unwrap();
        assert_eq!(entry.status, ContractStatus::Stuck);
        assert!(entry.metadata.mentions("recovery failed"));
    }

    #[test]
    fn entries_survive_reopen_and_keep_foreign_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        let addr = vault_address(SCRIPT, PlutusVersion::V2);

        let id = {
            let registry = ContractRegistry::open(&path).unwrap();
            registry
                .register(new_contract(&addr, SCRIPT.to_vec(), PlutusVersion::V2, "agent vault"))
                .unwrap()
        };

        // Another tool annotates the file between runs.
        let mut raw: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        raw[0]["metadata"]["deployTx"] = serde_json::json!("feedbeef");
        fs::write(&path, serde_json::to_vec(&raw).unwrap()).unwrap();

        let registry = ContractRegistry::open(&path).unwrap();
        registry
            .update_status(&id, ContractStatus::Active, "verified")
            .unwrap();
        drop(registry);

        let reopened = ContractRegistry::open(&path).unwrap();
        let entry = reopened.get_by_address(&addr).unwrap().unwrap();
        assert_eq!(entry.id, id);
        assert_eq!(entry.status, ContractStatus::Active);
        assert_eq!(entry.metadata.extra["deployTx"], "feedbeef");
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn list_is_newest_first() {
        let registry = ContractRegistry::in_memory();
        let a = registry
            .register(new_contract(
                vault_address(SCRIPT, PlutusVersion::V1),
                SCRIPT.to_vec(),
                PlutusVersion::V1,
                "a",
            ))
            .unwrap();
        let b = registry
            .register(new_contract(
                vault_address(SCRIPT, PlutusVersion::V2),
                SCRIPT.to_vec(),
                PlutusVersion::V2,
                "b",
            ))
            .unwrap();
        let ids: Vec<_> = registry.list().unwrap().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![b, a]);
    }

    #[test]
    fn corrupt_file_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        fs::write(&path, b"{not json").unwrap();
        assert!(matches!(
            ContractRegistry::open(&path),
            Err(VaultError::Storage(_))
        ));
    }
}
