//! Transaction Builder.
//!
//! Every build runs `select inputs -> outputs -> datum/redeemer -> script ->
//! script data hash -> serialize`, then re-checks its own output before
//! handing it back. Spends against one vault address are serialized through
//! [`InFlight`] and the inputs they consume are reserved until the caller
//! releases them or the reservation lapses.

use serde::{Serialize, Serializer};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use vault_crypto::address::{decode_address, derive_address, enterprise_key_address, Credential, ShelleyAddress};
use vault_crypto::script::{hash_script, verify_match};
use vault_storage::{new_contract, ContractStore};
use vault_types::codec::{datum_to_data, decode_datum, encode_datum};
use vault_types::transaction::{AttachedScript, ExUnits, TxOutput, TxRedeemer};
use vault_types::{
    ContractRegistryEntry, ContractStatus, KeyHash, Network, OutputRef, PlutusVersion, ScriptHash,
    TradeSide, TxHash, UnsignedTransaction, Utxo, VaultBalanceSnapshot, VaultDatum, VaultError,
    VaultRedeemer, VaultResult,
};

use crate::balance::BalanceManager;
use crate::config::{AdminPolicy, EngineConfig, ProtocolParams};
use crate::locks::{InFlight, Reservations};

const MAX_FEE_ROUNDS: usize = 8;
/// Bytes one vkey witness adds once the external signer attaches it.
const VKEY_WITNESS_BYTES: usize = 102;

fn as_hex<T: AsRef<[u8]>, S: Serializer>(bytes: T, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&hex::encode(bytes.as_ref()))
}

/// Unsigned, internally consistent transaction ready for an external signer.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BuiltTransaction {
    pub tx_id: TxHash,
    #[serde(rename = "cborHex", serialize_with = "as_hex")]
    pub cbor: Vec<u8>,
    pub fee: u64,
    /// Lovelace paid to the recipient.
    pub amount: u64,
    pub spent: Vec<OutputRef>,
    pub required_signers: Vec<KeyHash>,
    #[serde(skip)]
    pub tx: UnsignedTransaction,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub id: String,
    pub address: String,
    pub script_hash: ScriptHash,
    pub status: ContractStatus,
}

/// The vault outputs one spend consumes. They all carry the same datum.
struct VaultInputs {
    utxos: Vec<Utxo>,
    datum: VaultDatum,
    total: u64,
}

#[derive(Clone, Copy)]
enum RedeemerKind {
    User,
    Admin,
    Agent(TradeSide),
}

impl RedeemerKind {
    fn with_amount(self, amount: u64) -> VaultRedeemer {
        match self {
            RedeemerKind::User => VaultRedeemer::UserWithdraw { amount },
            RedeemerKind::Admin => VaultRedeemer::AdminWithdraw { amount },
            RedeemerKind::Agent(side) => VaultRedeemer::AgentTrade { amount, side },
        }
    }
}

struct Payee {
    address: String,
    bytes: Vec<u8>,
}

struct SpendPlan {
    kind: RedeemerKind,
    payee: Option<Payee>,
    amount: u64,
    /// When set, the payout may shrink to cover the fee, but not below this.
    shrink_floor: Option<u64>,
    continuing_datum: VaultDatum,
    /// The spend exists to write `continuing_datum`; dust is not acceptable.
    require_continuing: bool,
    signers: Vec<KeyHash>,
}

pub struct TransactionBuilder {
    network: Network,
    params: ProtocolParams,
    admin: AdminPolicy,
    agent: Option<KeyHash>,
    floor: u64,
    registry: Arc<dyn ContractStore>,
    balance: Arc<BalanceManager>,
    in_flight: InFlight,
    reservations: Reservations,
    collateral: Vec<OutputRef>,
}

impl TransactionBuilder {
    pub fn new(
        config: &EngineConfig,
        registry: Arc<dyn ContractStore>,
        balance: Arc<BalanceManager>,
    ) -> Self {
        Self {
            network: config.network,
            params: config.protocol.clone(),
            admin: config.admin.clone(),
            agent: config.agent_key_hash,
            floor: config.min_trade_floor,
            registry,
            balance,
            in_flight: InFlight::default(),
            reservations: Reservations::new(config.reservation_ttl()),
            collateral: Vec::new(),
        }
    }

    pub fn with_collateral(mut self, collateral: Vec<OutputRef>) -> Self {
        self.collateral = collateral;
        self
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn balance(&self) -> &BalanceManager {
        &self.balance
    }

    pub fn registry(&self) -> &dyn ContractStore {
        self.registry.as_ref()
    }

    /// Derive the vault address for `script_bytes` and register it at `testing`.
    pub fn deploy_vault(
        &self,
        script_bytes: &[u8],
        version: PlutusVersion,
        network: Network,
        purpose: &str,
    ) -> VaultResult<Deployment> {
        let script_hash = hash_script(script_bytes, version);
        let address = derive_address(&script_hash, network)?;
        let id = self.registry.register(new_contract(
            &address,
            script_bytes.to_vec(),
            version,
            purpose,
        ))?;
        let status = self
            .registry
            .get(&id)?
            .map_or(ContractStatus::Testing, |e| e.status);
        info!(%id, %address, %version, "vault deployed");
        Ok(Deployment {
            id,
            address,
            script_hash,
            status,
        })
    }

    /// Forget the reservations taken by `tx_id`, e.g. after the signer gave up.
    pub fn release(&self, tx_id: &TxHash) -> usize {
        let n = self.reservations.release(tx_id);
        debug!(tx = %tx_id, released = n, "released reservations");
        n
    }

    pub fn build_deposit(
        &self,
        from_address: &str,
        funding: &[Utxo],
        vault_address: &str,
        amount: u64,
        datum: &VaultDatum,
    ) -> VaultResult<BuiltTransaction> {
        let from = self.decode_on_network(from_address)?;
        self.spendable_entry(vault_address)?;
        let vault = self.decode_on_network(vault_address)?;
        encode_datum(datum)?;
        if amount < self.params.min_utxo_lovelace {
            return Err(VaultError::InvalidAmount(format!(
                "deposit of {amount} is below the {} minimum output",
                self.params.min_utxo_lovelace
            )));
        }

        let mut seen = BTreeSet::new();
        let mut candidates: Vec<&Utxo> = funding
            .iter()
            .filter(|u| seen.insert(u.out_ref))
            .filter(|u| {
                if u.holds_assets() {
                    debug!(utxo = %u.out_ref, "skipping funding output with native assets");
                }
                !u.holds_assets()
            })
            .collect();
        candidates.sort_by(|a, b| b.lovelace.cmp(&a.lovelace));
        let available = candidates.iter().fold(0u64, |acc, u| acc.saturating_add(u.lovelace));
        let min_utxo = self.params.min_utxo_lovelace;

        for take in 1..=candidates.len() {
            let selected = &candidates[..take];
            let sum = selected.iter().fold(0u64, |acc, u| acc.saturating_add(u.lovelace));
            if sum < amount {
                continue;
            }
            let mut tx = UnsignedTransaction::new(self.network);
            tx.inputs = selected.iter().map(|u| u.out_ref).collect();
            tx.normalize();
            let witnesses = selected
                .iter()
                .map(|u| u.address.as_str())
                .collect::<BTreeSet<_>>()
                .len();

            let settled = self.settle_fee(&mut tx, witnesses, |tx, fee| {
                let change = sum
                    .checked_sub(amount)
                    .and_then(|rest| rest.checked_sub(fee))
                    .ok_or_else(|| {
                        VaultError::InsufficientInput(format!(
                            "{sum} lovelace cannot cover {amount} plus fee {fee}"
                        ))
                    })?;
                tx.outputs = vec![output(&vault, vault_address, amount, Some(datum))];
                if change >= min_utxo {
                    tx.outputs.push(output(&from, from_address, change, None));
                    Ok((amount, 0))
                } else {
                    Ok((amount, change))
                }
            });
            match settled {
                Ok(paid) => {
                    self.check_consistency(&tx, None)?;
                    let built = finish(tx, paid)?;
                    info!(tx = %built.tx_id, vault = vault_address, amount, fee = built.fee, "deposit built");
                    return Ok(built);
                }
                Err(VaultError::InsufficientInput(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(VaultError::InsufficientInput(format!(
            "{available} lovelace across {} asset-free inputs cannot cover {amount} plus fee",
            candidates.len()
        )))
    }

    pub async fn build_user_withdraw(
        &self,
        vault_address: &str,
        owner_address: &str,
        amount: u64,
    ) -> VaultResult<BuiltTransaction> {
        let owner = self.decode_on_network(owner_address)?;
        let owner_key = match owner.payment {
            Credential::Key(k) => k,
            Credential::Script(_) => {
                return Err(VaultError::Unauthorized(format!(
                    "{owner_address} has no key credential to sign a withdrawal"
                )))
            }
        };
        if amount == 0 {
            return Err(VaultError::InvalidAmount("withdrawal amount must be positive".into()));
        }
        let (built, entry) = self
            .spend(vault_address, Some(owner_key), |_, _, inputs| {
                if inputs.datum.owner != owner_key {
                    return Err(VaultError::Unauthorized(format!(
                        "{owner_address} is not the vault owner {}",
                        inputs.datum.owner
                    )));
                }
                Ok(SpendPlan {
                    kind: RedeemerKind::User,
                    payee: Some(Payee {
                        address: owner_address.to_string(),
                        bytes: owner.bytes.clone(),
                    }),
                    amount,
                    shrink_floor: None,
                    continuing_datum: inputs.datum.clone(),
                    require_continuing: false,
                    signers: vec![inputs.datum.owner],
                })
            })
            .await?;

        if entry.status == ContractStatus::Testing && built.amount > 0 {
            self.registry.update_status(
                &entry.id,
                ContractStatus::Active,
                &format!("withdrawal {} built", built.tx_id),
            )?;
        }
        info!(tx = %built.tx_id, vault = vault_address, amount = built.amount, fee = built.fee, "user withdrawal built");
        Ok(built)
    }

    /// Evaluates feasibility against the same snapshot it spends from.
    pub async fn build_agent_trade(
        &self,
        vault_address: &str,
        amount: u64,
        side: TradeSide,
    ) -> VaultResult<BuiltTransaction> {
        let agent = self
            .agent
            .ok_or_else(|| VaultError::Unauthorized("no agent key is configured".into()))?;
        let agent_address = enterprise_key_address(&agent, self.network)?;
        let agent_bytes = decode_address(&agent_address)?.bytes;
        if amount == 0 {
            return Err(VaultError::InvalidAmount("trade amount must be positive".into()));
        }
        let floor = self.floor;

        let (built, _) = self
            .spend(vault_address, None, |entry, snapshot, inputs| {
                if entry.status == ContractStatus::Deprecated {
                    return Err(VaultError::TradingDisabled(format!(
                        "{vault_address} (contract {} is deprecated)",
                        entry.id
                    )));
                }
                if !inputs.datum.trading_enabled {
                    return Err(VaultError::TradingDisabled(vault_address.to_string()));
                }
                let spendable = VaultBalanceSnapshot::from_utxos(
                    vault_address,
                    inputs.utxos.clone(),
                    snapshot.queried_at,
                );
                let verdict = self.balance.evaluate_snapshot(&spendable, amount, floor);
                if !verdict.can_execute {
                    return Err(VaultError::InsufficientBalance(verdict.reason));
                }
                let cap = inputs.datum.max_trade_amount;
                if cap < floor {
                    return Err(VaultError::InsufficientBalance(format!(
                        "max trade amount {cap} is below the {floor} minimum"
                    )));
                }
                let sized = verdict.actual_amount.min(cap);
                debug!(requested = amount, sized, reason = %verdict.reason, "trade sized");
                Ok(SpendPlan {
                    kind: RedeemerKind::Agent(side),
                    payee: Some(Payee {
                        address: agent_address.clone(),
                        bytes: agent_bytes.clone(),
                    }),
                    amount: sized,
                    shrink_floor: Some(floor.min(sized)),
                    continuing_datum: inputs.datum.clone(),
                    require_continuing: false,
                    signers: vec![agent],
                })
            })
            .await?;
        info!(tx = %built.tx_id, vault = vault_address, requested = amount, amount = built.amount, ?side, "agent trade built");
        Ok(built)
    }

    pub async fn build_admin_withdraw(
        &self,
        vault_address: &str,
        recipient_address: &str,
        amount: u64,
        signers: &[KeyHash],
    ) -> VaultResult<BuiltTransaction> {
        let signers = self.admin.authorize(signers)?;
        let recipient = self.decode_on_network(recipient_address)?;
        if amount == 0 {
            return Err(VaultError::InvalidAmount("withdrawal amount must be positive".into()));
        }
        let (built, _) = self
            .spend(vault_address, None, |_, _, inputs| {
                Ok(SpendPlan {
                    kind: RedeemerKind::Admin,
                    payee: Some(Payee {
                        address: recipient_address.to_string(),
                        bytes: recipient.bytes.clone(),
                    }),
                    amount,
                    shrink_floor: None,
                    continuing_datum: inputs.datum.clone(),
                    require_continuing: false,
                    signers: signers.clone(),
                })
            })
            .await?;
        warn!(tx = %built.tx_id, vault = vault_address, amount, signers = signers.len(), "admin withdrawal built");
        Ok(built)
    }

    /// Rewrite the vault datum's trading flag. `false` is the emergency stop.
    pub async fn build_set_trading(
        &self,
        vault_address: &str,
        enabled: bool,
        signers: &[KeyHash],
    ) -> VaultResult<BuiltTransaction> {
        let signers = self.admin.authorize(signers)?;
        let (built, _) = self
            .spend(vault_address, None, |_, _, inputs| {
                Ok(SpendPlan {
                    kind: RedeemerKind::Admin,
                    payee: None,
                    amount: 0,
                    shrink_floor: None,
                    continuing_datum: VaultDatum {
                        trading_enabled: enabled,
                        ..inputs.datum.clone()
                    },
                    require_continuing: true,
                    signers: signers.clone(),
                })
            })
            .await?;
        warn!(tx = %built.tx_id, vault = vault_address, enabled, "trading flag update built");
        Ok(built)
    }

    fn decode_on_network(&self, address: &str) -> VaultResult<ShelleyAddress> {
        let decoded = decode_address(address)?;
        if decoded.network != self.network {
            return Err(VaultError::invalid_address(
                address,
                format!("address is on {}, builder targets {}", decoded.network, self.network),
            ));
        }
        Ok(decoded)
    }

    /// Registry entry for a vault about to receive or release funds. Stored
    /// bytes that do not reproduce the address flip the entry to stuck.
    fn spendable_entry(&self, address: &str) -> VaultResult<ContractRegistryEntry> {
        let decoded = self.decode_on_network(address)?;
        if decoded.script_hash().is_none() {
            return Err(VaultError::invalid_address(address, "not a script address"));
        }
        let entry = self
            .registry
            .get_by_address(address)?
            .ok_or_else(|| VaultError::ContractNotRegistered(address.to_string()))?;
        if entry.status == ContractStatus::Stuck {
            return Err(VaultError::ScriptMismatch {
                address: address.to_string(),
                reason: format!("contract {} is marked stuck", entry.id),
            });
        }

        let bytes = entry.script_bytes()?;
        let hash_ok =
            hash_script(&bytes, entry.plutus_version).to_hex() == entry.script_hash.to_lowercase();
        if !hash_ok || !verify_match(address, &bytes, entry.plutus_version)? {
            warn!(id = %entry.id, address, "registered script does not hash to vault address");
            self.registry.update_status(
                &entry.id,
                ContractStatus::Stuck,
                &format!(
                    "spend refused: {} script bytes do not derive {address}",
                    entry.plutus_version
                ),
            )?;
            return Err(VaultError::ScriptMismatch {
                address: address.to_string(),
                reason: format!(
                    "{} script bytes of contract {} do not hash to this address",
                    entry.plutus_version, entry.id
                ),
            });
        }
        Ok(entry)
    }

    /// Outputs sharing one datum: the datum of the largest free output, or of
    /// the largest one owned by `owner` when given.
    fn select_vault_inputs(
        &self,
        snapshot: &VaultBalanceSnapshot,
        owner: Option<KeyHash>,
    ) -> VaultResult<VaultInputs> {
        let address = &snapshot.address;
        if snapshot.utxos.is_empty() {
            return Err(VaultError::VaultUtxoNotFound {
                address: address.clone(),
                reason: "address holds no outputs".into(),
            });
        }

        let mut free: Vec<(&Utxo, VaultDatum)> = Vec::new();
        let mut reserved = 0usize;
        let mut foreign = 0usize;
        let mut with_assets = 0usize;
        let mut not_owned = 0usize;
        for utxo in &snapshot.utxos {
            if self.reservations.is_reserved(&utxo.out_ref) {
                reserved += 1;
                continue;
            }
            if utxo.holds_assets() {
                with_assets += 1;
                warn!(utxo = %utxo.out_ref, "skipping vault output holding native assets");
                continue;
            }
            match utxo.inline_datum.as_deref().map(decode_datum) {
                Some(Ok(datum)) if owner.is_some_and(|o| o != datum.owner) => not_owned += 1,
                Some(Ok(datum)) => free.push((utxo, datum)),
                Some(Err(e)) => {
                    foreign += 1;
                    warn!(utxo = %utxo.out_ref, error = %e, "skipping output with a foreign datum");
                }
                None => foreign += 1,
            }
        }
        free.sort_by(|a, b| b.0.lovelace.cmp(&a.0.lovelace));

        let datum = match free.first() {
            Some((_, datum)) => datum.clone(),
            None => {
                return Err(VaultError::VaultUtxoNotFound {
                    address: address.clone(),
                    reason: format!(
                        "{} outputs: {reserved} reserved by in-flight transactions, {foreign} without a vault datum, \
                         {with_assets} holding native assets, {not_owned} owned by someone else",
                        snapshot.utxos.len()
                    ),
                })
            }
        };
        let utxos: Vec<Utxo> = free
            .into_iter()
            .filter(|(_, d)| *d == datum)
            .map(|(u, _)| u.clone())
            .collect();
        let total = utxos.iter().fold(0u64, |acc, u| acc.saturating_add(u.lovelace));
        Ok(VaultInputs {
            utxos,
            datum,
            total,
        })
    }

    /// Shared spend path: verify, lock, snapshot, plan, assemble.
    async fn spend<F>(
        &self,
        vault_address: &str,
        owner: Option<KeyHash>,
        plan_for: F,
    ) -> VaultResult<(BuiltTransaction, ContractRegistryEntry)>
    where
        F: FnOnce(&ContractRegistryEntry, &VaultBalanceSnapshot, &VaultInputs) -> VaultResult<SpendPlan>,
    {
        let entry = self.spendable_entry(vault_address)?;
        let _guard = self.in_flight.try_acquire(vault_address)?;
        let snapshot = self.balance.get_balance(vault_address).await?;
        let inputs = self.select_vault_inputs(&snapshot, owner)?;
        let plan = plan_for(&entry, &snapshot, &inputs)?;
        let built = self.assemble(vault_address, &entry, &inputs, plan)?;
        self.reservations.reserve(built.tx_id, &built.spent);
        Ok((built, entry))
    }

    fn assemble(
        &self,
        vault_address: &str,
        entry: &ContractRegistryEntry,
        inputs: &VaultInputs,
        plan: SpendPlan,
    ) -> VaultResult<BuiltTransaction> {
        let vault = self.decode_on_network(vault_address)?;
        let script_hash = vault
            .script_hash()
            .ok_or_else(|| VaultError::invalid_address(vault_address, "not a script address"))?;
        let min_utxo = self.params.min_utxo_lovelace;
        let spendable = inputs.total;
        let ex_units = self.params.default_ex_units;

        let mut tx = UnsignedTransaction::new(self.network);
        tx.inputs = inputs.utxos.iter().map(|u| u.out_ref).collect();
        tx.collateral = self.collateral.clone();
        tx.required_signers = plan.signers.clone();
        tx.scripts.push(AttachedScript {
            version: entry.plutus_version,
            bytes: entry.script_bytes()?,
        });
        tx.normalize();
        let witnesses = tx.required_signers.len() + 1;

        let paid = self.settle_fee(&mut tx, witnesses, |tx, fee| {
            let mut amount = plan.amount;
            if amount.saturating_add(fee) > spendable {
                let room = spendable.saturating_sub(fee);
                amount = match plan.shrink_floor {
                    Some(floor) if room >= floor && room > 0 => room,
                    Some(floor) => {
                        return Err(VaultError::InsufficientBalance(format!(
                            "after a {fee} fee only {room} of {spendable} remains, below {floor}"
                        )))
                    }
                    None => {
                        return Err(VaultError::InvalidAmount(format!(
                            "{amount} plus a {fee} fee exceeds the {spendable} held by the vault"
                        )))
                    }
                };
            }
            if plan.payee.is_some() && amount > 0 && amount < min_utxo {
                return Err(VaultError::InvalidAmount(format!(
                    "payout of {amount} is below the {min_utxo} minimum output"
                )));
            }
            let change = spendable - amount - fee;

            tx.outputs.clear();
            if let Some(payee) = &plan.payee {
                tx.outputs.push(TxOutput {
                    address: payee.address.clone(),
                    address_bytes: payee.bytes.clone(),
                    lovelace: amount,
                    inline_datum: None,
                });
            }
            let dust = if change >= min_utxo {
                tx.outputs.push(output(
                    &vault,
                    vault_address,
                    change,
                    Some(&plan.continuing_datum),
                ));
                0
            } else if plan.require_continuing {
                return Err(VaultError::InsufficientBalance(format!(
                    "{change} left after fees cannot carry the updated datum"
                )));
            } else {
                change
            };

            let redeemer = plan.kind.with_amount(amount);
            tx.redeemers = tx
                .inputs
                .iter()
                .map(|input| TxRedeemer {
                    input: *input,
                    redeemer,
                    ex_units,
                })
                .collect();
            Ok((amount, dust))
        })?;

        self.check_consistency(&tx, Some(&script_hash))?;
        let built = finish(tx, paid)?;
        debug!(tx = %built.tx_id, inputs = built.spent.len(), size = built.cbor.len(), "spend assembled");
        Ok(built)
    }

    /// Grow the fee until it covers the serialized size plus execution
    /// units. `layout` writes outputs and redeemers for a candidate fee and
    /// returns `(payout, dust)`; dust is added to the fee.
    fn settle_fee<L>(
        &self,
        tx: &mut UnsignedTransaction,
        witnesses: usize,
        mut layout: L,
    ) -> VaultResult<u64>
    where
        L: FnMut(&mut UnsignedTransaction, u64) -> VaultResult<(u64, u64)>,
    {
        let mut fee = self.params.min_fee_b;
        for _ in 0..MAX_FEE_ROUNDS {
            let (paid, dust) = layout(tx, fee)?;
            tx.fee = fee.saturating_add(dust);
            tx.script_data_hash = tx.compute_script_data_hash(&self.params.cost_models)?;
            let size = tx.to_cbor()?.len() + witnesses * VKEY_WITNESS_BYTES;
            let budget = tx.redeemers.iter().fold(ExUnits { mem: 0, steps: 0 }, |acc, r| ExUnits {
                mem: acc.mem.saturating_add(r.ex_units.mem),
                steps: acc.steps.saturating_add(r.ex_units.steps),
            });
            let needed = self.params.min_fee(size, budget);
            if needed <= fee {
                return Ok(paid);
            }
            fee = needed;
        }
        Err(VaultError::Encoding(format!(
            "fee did not settle after {MAX_FEE_ROUNDS} rounds"
        )))
    }

    /// Refuse to hand out a transaction that fails our own checks.
    fn check_consistency(
        &self,
        tx: &UnsignedTransaction,
        spent_script: Option<&ScriptHash>,
    ) -> VaultResult<()> {
        if tx.compute_script_data_hash(&self.params.cost_models)? != tx.script_data_hash {
            return Err(VaultError::Encoding(
                "script data hash does not cover the attached redeemers".into(),
            ));
        }
        if let Some(expected) = spent_script {
            for script in &tx.scripts {
                if hash_script(&script.bytes, script.version) != *expected {
                    return Err(VaultError::ScriptMismatch {
                        address: expected.to_hex(),
                        reason: "attached script does not hash to the spent address".into(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn output(address: &ShelleyAddress, bech32: &str, lovelace: u64, datum: Option<&VaultDatum>) -> TxOutput {
    TxOutput {
        address: bech32.to_string(),
        address_bytes: address.bytes.clone(),
        lovelace,
        inline_datum: datum.map(datum_to_data),
    }
}

fn finish(tx: UnsignedTransaction, amount: u64) -> VaultResult<BuiltTransaction> {
    Ok(BuiltTransaction {
        tx_id: tx.id()?,
        cbor: tx.to_cbor()?,
        fee: tx.fee,
        amount,
        spent: tx.inputs.clone(),
        required_signers: tx.required_signers.clone(),
        tx,
    })
}
