use serde::{Deserialize, Serialize};

use crate::hash::KeyHash;

/// Inline datum on every vault output.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VaultDatum {
    pub owner: KeyHash,
    pub trading_enabled: bool,
    /// Lovelace.
    pub max_trade_amount: u64,
    pub leverage: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Long,
    Short,
}

impl TradeSide {
    pub fn constr_tag(&self) -> u64 {
        match self {
            TradeSide::Long => 0,
            TradeSide::Short => 1,
        }
    }
}

impl std::str::FromStr for TradeSide {
    type Err = crate::error::VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "long" | "buy" => Ok(TradeSide::Long),
            "short" | "sell" => Ok(TradeSide::Short),
            other => Err(crate::error::VaultError::Decoding(format!(
                "unknown trade side {other:?}"
            ))),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum VaultRedeemer {
    UserWithdraw { amount: u64 },
    AdminWithdraw { amount: u64 },
    AgentTrade { amount: u64, side: TradeSide },
}

impl VaultRedeemer {
    pub fn constr_tag(&self) -> u64 {
        match self {
            VaultRedeemer::UserWithdraw { .. } => 0,
            VaultRedeemer::AdminWithdraw { .. } => 1,
            VaultRedeemer::AgentTrade { .. } => 2,
        }
    }

    pub fn amount(&self) -> u64 {
        match self {
            VaultRedeemer::UserWithdraw { amount }
            | VaultRedeemer::AdminWithdraw { amount }
            | VaultRedeemer::AgentTrade { amount, .. } => *amount,
        }
    }
}
