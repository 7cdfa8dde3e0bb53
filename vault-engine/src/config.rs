use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use vault_indexer::IndexerConfig;
use vault_types::transaction::{CostModels, ExUnits};
use vault_types::{KeyHash, Network, VaultError, VaultResult, LOVELACE_PER_ADA};

const MAX_RESERVATION_TTL_SECS: u64 = 24 * 60 * 60;
const MAX_INDEXER_TIMEOUT_SECS: u64 = 600;
const MAX_INDEXER_ATTEMPTS: u32 = 20;

/// `numerator / denominator`, kept exact so fee arithmetic never touches floats.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rational {
    pub numerator: u64,
    pub denominator: u64,
}

impl Rational {
    pub const fn new(numerator: u64, denominator: u64) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// `ceil(n * self)`, saturating.
    pub fn mul_ceil(&self, n: u64) -> u64 {
        if self.denominator == 0 {
            return u64::MAX;
        }
        let num = u128::from(n) * u128::from(self.numerator);
        let den = u128::from(self.denominator);
        u64::try_from(num.div_ceil(den)).unwrap_or(u64::MAX)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ProtocolParams {
    /// Lovelace per byte.
    pub min_fee_a: u64,
    pub min_fee_b: u64,
    pub min_utxo_lovelace: u64,
    pub price_mem: Rational,
    pub price_steps: Rational,
    /// Budget attached to every redeemer.
    pub default_ex_units: ExUnits,
    /// Copied from the network's protocol parameters. Script spends fail
    /// with an encoding error until the attached language has an entry.
    pub cost_models: CostModels,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            min_fee_a: 44,
            min_fee_b: 155_381,
            min_utxo_lovelace: LOVELACE_PER_ADA,
            price_mem: Rational::new(577, 10_000),
            price_steps: Rational::new(721, 10_000_000),
            default_ex_units: ExUnits {
                mem: 1_400_000,
                steps: 500_000_000,
            },
            cost_models: CostModels::new(),
        }
    }
}

impl ProtocolParams {
    pub fn min_fee(&self, tx_size: usize, ex_units: ExUnits) -> u64 {
        let size_fee = self
            .min_fee_a
            .saturating_mul(tx_size as u64)
            .saturating_add(self.min_fee_b);
        size_fee
            .saturating_add(self.price_mem.mul_ceil(ex_units.mem))
            .saturating_add(self.price_steps.mul_ceil(ex_units.steps))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct AdminPolicy {
    pub key_hashes: Vec<KeyHash>,
    pub threshold: usize,
}

impl Default for AdminPolicy {
    fn default() -> Self {
        Self {
            key_hashes: Vec::new(),
            threshold: 1,
        }
    }
}

impl AdminPolicy {
    pub fn authorize(&self, signers: &[KeyHash]) -> VaultResult<Vec<KeyHash>> {
        if self.key_hashes.is_empty() {
            return Err(VaultError::Unauthorized("no admin keys are configured".into()));
        }
        let distinct: BTreeSet<KeyHash> = signers.iter().copied().collect();
        if let Some(stranger) = distinct.iter().find(|k| !self.key_hashes.contains(k)) {
            return Err(VaultError::Unauthorized(format!(
                "{stranger} is not an admin key"
            )));
        }
        if distinct.len() < self.threshold {
            return Err(VaultError::Unauthorized(format!(
                "{} of {} admin signatures required, got {}",
                self.threshold,
                self.key_hashes.len(),
                distinct.len()
            )));
        }
        Ok(distinct.into_iter().collect())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub network: Network,
    pub indexer: IndexerConfig,
    pub registry_path: PathBuf,
    /// Left in the vault for fees when a trade is scaled down.
    pub reserve_lovelace: u64,
    /// Smallest position the venue accepts.
    pub min_trade_floor: u64,
    pub reservation_ttl_secs: u64,
    pub protocol: ProtocolParams,
    pub agent_key_hash: Option<KeyHash>,
    pub admin: AdminPolicy,
    pub venue_url: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            network: Network::Testnet,
            indexer: IndexerConfig::default(),
            registry_path: PathBuf::from("vault-registry.json"),
            reserve_lovelace: 2 * LOVELACE_PER_ADA,
            min_trade_floor: 40 * LOVELACE_PER_ADA,
            reservation_ttl_secs: 180,
            protocol: ProtocolParams::default(),
            agent_key_hash: None,
            admin: AdminPolicy::default(),
            venue_url: "https://app.strikefinance.org".into(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> VaultResult<Self> {
        let raw = std::fs::read(path)?;
        let config: EngineConfig = serde_json::from_slice(&raw).map_err(|e| {
            VaultError::Decoding(format!("config {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> VaultResult<()> {
        let p = &self.protocol;
        if p.price_mem.denominator == 0 || p.price_steps.denominator == 0 {
            return Err(VaultError::InvalidAmount(
                "execution unit prices need a non-zero denominator".into(),
            ));
        }
        if self.admin.threshold == 0 {
            return Err(VaultError::Unauthorized("admin threshold must be at least 1".into()));
        }
        if !self.admin.key_hashes.is_empty() && self.admin.threshold > self.admin.key_hashes.len()
        {
            return Err(VaultError::Unauthorized(format!(
                "admin threshold {} exceeds {} configured keys",
                self.admin.threshold,
                self.admin.key_hashes.len()
            )));
        }
        if self.reservation_ttl_secs > MAX_RESERVATION_TTL_SECS {
            return Err(VaultError::InvalidAmount(format!(
                "reservation ttl {}s exceeds {MAX_RESERVATION_TTL_SECS}s",
                self.reservation_ttl_secs
            )));
        }
        if self.indexer.timeout_secs > MAX_INDEXER_TIMEOUT_SECS
            || self.indexer.max_attempts > MAX_INDEXER_ATTEMPTS
        {
            return Err(VaultError::InvalidAmount(format!(
                "indexer limits out of range: {}s x {} attempts (max {MAX_INDEXER_TIMEOUT_SECS}s x {MAX_INDEXER_ATTEMPTS})",
                self.indexer.timeout_secs, self.indexer.max_attempts
            )));
        }
        Ok(())
    }

    /// Upper bound on one balance query, retries included. Saturates.
    pub fn query_timeout(&self) -> Duration {
        let attempts = self.indexer.max_attempts.max(1);
        let per_request = Duration::from_secs(self.indexer.timeout_secs.max(1));
        let retries = attempts.saturating_sub(1);
        let step = |i: u32| self.indexer.backoff_ms.saturating_mul(1u64 << i.min(10));
        // Delays stop doubling after ten retries.
        let backoff = (0..retries.min(10))
            .map(step)
            .fold(0u64, u64::saturating_add)
            .saturating_add(step(10).saturating_mul(u64::from(retries.saturating_sub(10))));
        per_request
            .saturating_mul(attempts)
            .saturating_add(Duration::from_millis(backoff))
    }

    pub fn reservation_ttl(&self) -> Duration {
        Duration::from_secs(self.reservation_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_uses_exact_rationals() {
        let params = ProtocolParams::default();
        assert_eq!(params.min_fee(300, ExUnits { mem: 0, steps: 0 }), 44 * 300 + 155_381);
        // 577/10000 * 10_001 = 577.0577 -> 578
        assert_eq!(params.price_mem.mul_ceil(10_001), 578);
        assert_eq!(Rational::new(1, 0).mul_ceil(5), u64::MAX);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let cfg: EngineConfig = serde_json::from_str(
            r#"{ "network": "mainnet", "reserve_lovelace": 3000000, "protocol": { "min_fee_a": 45 } }"#,
        )
        .unwrap();
        assert_eq!(cfg.network, Network::Mainnet);
        assert_eq!(cfg.reserve_lovelace, 3_000_000);
        assert_eq!(cfg.min_trade_floor, 40 * LOVELACE_PER_ADA);
        assert_eq!(cfg.protocol.min_fee_a, 45);
        assert_eq!(cfg.protocol.min_fee_b, 155_381);
        cfg.validate().unwrap();
    }

    #[test]
    fn admin_policy_enforces_threshold_and_membership() {
        let a = KeyHash([1; 28]);
        let b = KeyHash([2; 28]);
        let policy = AdminPolicy {
            key_hashes: vec![a, b, KeyHash([3; 28])],
            threshold: 2,
        };
        assert_eq!(policy.authorize(&[b, a]).unwrap(), vec![a, b]);
        assert!(matches!(policy.authorize(&[a, a]), Err(VaultError::Unauthorized(_))));
        assert!(matches!(
            policy.authorize(&[a, KeyHash([9; 28])]),
            Err(VaultError::Unauthorized(_))
        ));
        assert!(AdminPolicy::default().authorize(&[a]).is_err());
    }

    #[test]
    fn threshold_above_key_count_is_rejected() {
        let cfg = EngineConfig {
            admin: AdminPolicy {
                key_hashes: vec![KeyHash([1; 28])],
                threshold: 2,
            },
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn extreme_timeouts_saturate_and_fail_validation() {
        let cfg = EngineConfig {
            reservation_ttl_secs: u64::MAX,
            indexer: IndexerConfig {
                timeout_secs: u64::MAX,
                max_attempts: u32::MAX,
                backoff_ms: u64::MAX,
                ..IndexerConfig::default()
            },
            ..EngineConfig::default()
        };
        assert_eq!(cfg.query_timeout(), Duration::MAX);
        assert!(matches!(cfg.validate(), Err(VaultError::InvalidAmount(_))));

        let cfg = EngineConfig {
            reservation_ttl_secs: u64::MAX,
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_err());

        let defaults = EngineConfig::default();
        defaults.validate().unwrap();
        assert_eq!(
            defaults.query_timeout(),
            Duration::from_secs(30) + Duration::from_millis(750)
        );
    }
}
