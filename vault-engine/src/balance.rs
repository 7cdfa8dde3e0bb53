//! Balance Manager: fresh chain reads and trade-feasibility arithmetic.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use vault_indexer::ChainIndexer;
use vault_types::codec::decode_datum;
use vault_types::{now_secs, VaultBalanceSnapshot, VaultDatum, VaultError, VaultResult};

use crate::config::EngineConfig;

pub const BELOW_FLOOR: &str = "below minimum tradable balance";

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TradeFeasibility {
    pub can_execute: bool,
    pub actual_amount: u64,
    pub reason: String,
}

/// Feasibility of trading `requested` out of `total`.
///
/// Never returns an amount above `total`, and never allows execution when
/// `total` is under `floor`. Requests above the balance are scaled down to
/// what remains after `reserve`, but not below `floor`.
pub fn evaluate(total: u64, requested: u64, floor: u64, reserve: u64) -> TradeFeasibility {
    if total < floor {
        return TradeFeasibility {
            can_execute: false,
            actual_amount: 0,
            reason: BELOW_FLOOR.to_string(),
        };
    }
    if requested <= total {
        return TradeFeasibility {
            can_execute: true,
            actual_amount: requested,
            reason: format!("requested {requested} is fully funded"),
        };
    }
    let actual = floor.max(total.saturating_sub(reserve)).min(total);
    TradeFeasibility {
        can_execute: true,
        actual_amount: actual,
        reason: format!("requested {requested}, only {actual} available after reserve"),
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TradingRecommendation {
    pub can_trade: bool,
    pub recommended_size: u64,
    /// `recommended_size / total`, in basis points.
    pub utilization_bps: u64,
    pub total_lovelace: u64,
    pub max_trade_amount: Option<u64>,
    pub trading_enabled: Option<bool>,
}

/// Datum of the largest output carrying one that decodes.
pub fn vault_datum(snapshot: &VaultBalanceSnapshot) -> Option<VaultDatum> {
    let mut utxos: Vec<_> = snapshot.utxos.iter().collect();
    utxos.sort_by(|a, b| b.lovelace.cmp(&a.lovelace));
    utxos
        .into_iter()
        .find_map(|u| u.inline_datum.as_deref().and_then(|d| decode_datum(d).ok()))
}

pub fn recommend(snapshot: &VaultBalanceSnapshot, floor: u64, reserve: u64) -> TradingRecommendation {
    let total = snapshot.total_lovelace;
    let datum = vault_datum(snapshot);
    let cap = datum.as_ref().map_or(u64::MAX, |d| d.max_trade_amount);
    let recommended = cap.min(total / 2).min(total.saturating_sub(reserve));
    let utilization_bps = if total == 0 {
        0
    } else {
        u64::try_from(u128::from(recommended) * 10_000 / u128::from(total)).unwrap_or(10_000)
    };
    let enabled = datum.as_ref().map(|d| d.trading_enabled);
    TradingRecommendation {
        can_trade: recommended >= floor && enabled != Some(false),
        recommended_size: recommended,
        utilization_bps,
        total_lovelace: total,
        max_trade_amount: datum.as_ref().map(|d| d.max_trade_amount),
        trading_enabled: enabled,
    }
}

pub struct BalanceManager {
    indexer: Arc<dyn ChainIndexer>,
    timeout: Duration,
    reserve: u64,
    floor: u64,
}

impl BalanceManager {
    pub fn new(indexer: Arc<dyn ChainIndexer>, timeout: Duration, reserve: u64, floor: u64) -> Self {
        Self {
            indexer,
            timeout,
            reserve,
            floor,
        }
    }

    pub fn from_config(indexer: Arc<dyn ChainIndexer>, config: &EngineConfig) -> Self {
        Self::new(
            indexer,
            config.query_timeout(),
            config.reserve_lovelace,
            config.min_trade_floor,
        )
    }

    pub fn reserve(&self) -> u64 {
        self.reserve
    }

    pub fn floor(&self) -> u64 {
        self.floor
    }

    /// Queries the indexer on every call.
    pub async fn get_balance(&self, address: &str) -> VaultResult<VaultBalanceSnapshot> {
        let state = tokio::time::timeout(self.timeout, self.indexer.query_address(address))
            .await
            .map_err(|_| {
                warn!(address, timeout_ms = self.timeout.as_millis() as u64, "balance query timed out");
                VaultError::IndexerUnavailable(format!(
                    "balance query for {address} timed out after {:?}",
                    self.timeout
                ))
            })??;
        let snapshot = VaultBalanceSnapshot::from_utxos(address, state.utxos, now_secs());
        debug!(address, total = snapshot.total_lovelace, utxos = snapshot.utxos.len(), "balance snapshot");
        Ok(snapshot)
    }

    pub async fn evaluate_trade_execution(
        &self,
        address: &str,
        requested: u64,
        min_trade_floor: u64,
    ) -> VaultResult<TradeFeasibility> {
        let snapshot = self.get_balance(address).await?;
        Ok(self.evaluate_snapshot(&snapshot, requested, min_trade_floor))
    }

    /// Same decision against a snapshot the caller already holds.
    pub fn evaluate_snapshot(
        &self,
        snapshot: &VaultBalanceSnapshot,
        requested: u64,
        min_trade_floor: u64,
    ) -> TradeFeasibility {
        evaluate(snapshot.total_lovelace, requested, min_trade_floor, self.reserve)
    }

    pub async fn get_trading_recommendations(
        &self,
        address: &str,
    ) -> VaultResult<TradingRecommendation> {
        let snapshot = self.get_balance(address).await?;
        Ok(recommend(&snapshot, self.floor, self.reserve))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaled_down_to_balance_minus_reserve() {
        let r = evaluate(100, 150, 40, 2);
        assert!(r.can_execute);
        assert_eq!(r.actual_amount, 98);
        assert!(r.reason.contains("only 98 available"));
    }

    #[test]
    fn below_floor_never_executes() {
        let r = evaluate(10, 150, 40, 2);
        assert!(!r.can_execute);
        assert_eq!(r.reason, BELOW_FLOOR);
        assert!(!evaluate(39, 1, 40, 0).can_execute);
    }

    #[test]
    fn funded_request_passes_through() {
        assert_eq!(evaluate(100, 60, 40, 2).actual_amount, 60);
        assert_eq!(evaluate(100, 100, 40, 2).actual_amount, 100);
    }

    #[test]
    fn floor_wins_over_large_reserve_but_not_over_balance() {
        assert_eq!(evaluate(50, 80, 40, 30).actual_amount, 40);
        assert_eq!(evaluate(40, 80, 40, 100).actual_amount, 40);
    }

    #[test]
    fn never_exceeds_balance() {
        for total in [0u64, 1, 39, 40, 41, 99, 100, 1_000, u64::MAX] {
            for requested in [0u64, 1, 40, 98, 100, 150, u64::MAX] {
                for reserve in [0u64, 2, 50, u64::MAX] {
                    let r = evaluate(total, requested, 40, reserve);
                    assert!(r.actual_amount <= total, "{total} {requested} {reserve}");
                    if total < 40 {
                        assert!(!r.can_execute);
                    }
                }
            }
        }
    }

    #[test]
    fn recommendation_without_datum_uses_half_balance() {
        let snapshot = VaultBalanceSnapshot::from_utxos("addr", Vec::new(), 0);
        let rec = recommend(&snapshot, 40, 2);
        assert!(!rec.can_trade);
        assert_eq!(rec.utilization_bps, 0);
    }
}
