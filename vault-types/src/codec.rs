//! Vault datum / redeemer <-> Plutus data CBOR.
//!
//! Decoding is strict: constructor tag, arity and every field kind must match
//! the validator's shape exactly. A structurally different datum that happens
//! to parse is still rejected.

use crate::datum::{TradeSide, VaultDatum, VaultRedeemer};
use crate::error::{VaultError, VaultResult};
use crate::hash::KeyHash;
use crate::plutus::PlutusData;

pub fn datum_to_data(datum: &VaultDatum) -> PlutusData {
    PlutusData::constr(
        0,
        vec![
            PlutusData::Bytes(datum.owner.as_bytes().to_vec()),
            PlutusData::bool(datum.trading_enabled),
            PlutusData::Int(i128::from(datum.max_trade_amount)),
            PlutusData::Int(i128::from(datum.leverage)),
        ],
    )
}

pub fn encode_datum(datum: &VaultDatum) -> VaultResult<Vec<u8>> {
    datum_to_data(datum).to_cbor()
}

pub fn decode_datum(bytes: &[u8]) -> VaultResult<VaultDatum> {
    datum_from_data(&PlutusData::from_cbor(bytes)?)
}

pub fn datum_from_data(data: &PlutusData) -> VaultResult<VaultDatum> {
    let fields = expect_constr(data, 0, 4, "VaultDatum")?;

    let owner = match &fields[0] {
        PlutusData::Bytes(bytes) => KeyHash::from_slice(bytes)?,
        _ => return Err(field_error("VaultDatum.owner", "byte string")),
    };
    let trading_enabled = fields[1]
        .as_bool()
        .ok_or_else(|| field_error("VaultDatum.tradingEnabled", "Bool constructor"))?;
    let max_trade_amount = expect_amount(&fields[2], "VaultDatum.maxTradeAmount")?;
    let leverage = expect_amount(&fields[3], "VaultDatum.leverage")?;

    Ok(VaultDatum {
        owner,
        trading_enabled,
        max_trade_amount,
        leverage,
    })
}

pub fn redeemer_to_data(redeemer: &VaultRedeemer) -> PlutusData {
    let tag = redeemer.constr_tag();
    match redeemer {
        VaultRedeemer::UserWithdraw { amount } | VaultRedeemer::AdminWithdraw { amount } => {
            PlutusData::constr(tag, vec![PlutusData::Int(i128::from(*amount))])
        }
        VaultRedeemer::AgentTrade { amount, side } => PlutusData::constr(
            tag,
            vec![
                PlutusData::Int(i128::from(*amount)),
                PlutusData::constr(side.constr_tag(), Vec::new()),
            ],
        ),
    }
}

pub fn encode_redeemer(redeemer: &VaultRedeemer) -> VaultResult<Vec<u8>> {
    redeemer_to_data(redeemer).to_cbor()
}

pub fn decode_redeemer(bytes: &[u8]) -> VaultResult<VaultRedeemer> {
    let data = PlutusData::from_cbor(bytes)?;
    let tag = match &data {
        PlutusData::Constr { tag, .. } => *tag,
        _ => return Err(VaultError::Decoding("VaultRedeemer is not a constructor".into())),
    };
    match tag {
        0 => {
            let fields = expect_constr(&data, 0, 1, "UserWithdraw")?;
            Ok(VaultRedeemer::UserWithdraw {
                amount: expect_amount(&fields[0], "UserWithdraw.amount")?,
            })
        }
        1 => {
            let fields = expect_constr(&data, 1, 1, "AdminWithdraw")?;
            Ok(VaultRedeemer::AdminWithdraw {
                amount: expect_amount(&fields[0], "AdminWithdraw.amount")?,
            })
        }
        2 => {
            let fields = expect_constr(&data, 2, 2, "AgentTrade")?;
            let side = match &fields[1] {
                PlutusData::Constr { tag: 0, fields } if fields.is_empty() => TradeSide::Long,
                PlutusData::Constr { tag: 1, fields } if fields.is_empty() => TradeSide::Short,
                _ => return Err(field_error("AgentTrade.side", "Long | Short constructor")),
            };
            Ok(VaultRedeemer::AgentTrade {
                amount: expect_amount(&fields[0], "AgentTrade.amount")?,
                side,
            })
        }
        other => Err(VaultError::Decoding(format!(
            "unknown VaultRedeemer constructor {other}"
        ))),
    }
}

fn expect_constr<'a>(
    data: &'a PlutusData,
    tag: u64,
    arity: usize,
    what: &str,
) -> VaultResult<&'a [PlutusData]> {
    match data {
        PlutusData::Constr { tag: t, fields } if *t == tag && fields.len() == arity => {
            Ok(fields.as_slice())
        }
        PlutusData::Constr { tag: t, fields } => Err(VaultError::Decoding(format!(
            "{what}: expected constructor {tag} with {arity} fields, got constructor {t} with {}",
            fields.len()
        ))),
        _ => Err(VaultError::Decoding(format!("{what}: expected a constructor"))),
    }
}

fn expect_amount(data: &PlutusData, what: &str) -> VaultResult<u64> {
    match data {
        PlutusData::Int(n) => u64::try_from(*n)
            .ok()
            .filter(|v| i64::try_from(*v).is_ok())
            .ok_or_else(|| VaultError::Decoding(format!("{what}: {n} is out of range"))),
        _ => Err(field_error(what, "integer")),
    }
}

fn field_error(what: &str, expected: &str) -> VaultError {
    VaultError::Decoding(format!("{what}: expected {expected}"))
}
