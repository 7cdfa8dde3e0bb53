use ciborium::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::codec::redeemer_to_data;
use crate::datum::VaultRedeemer;
use crate::error::{VaultError, VaultResult};
use crate::hash::{blake2b_256, DataHash, KeyHash, TxHash};
use crate::network::{Network, PlutusVersion};
use crate::plutus::{encode_value, uint, PlutusData};
use crate::utxo::OutputRef;

pub type CostModels = BTreeMap<PlutusVersion, Vec<i64>>;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExUnits {
    pub mem: u64,
    pub steps: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TxOutput {
    pub address: String,
    /// Raw Shelley address bytes (header + credentials).
    pub address_bytes: Vec<u8>,
    pub lovelace: u64,
    pub inline_datum: Option<PlutusData>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TxRedeemer {
    pub input: OutputRef,
    pub redeemer: VaultRedeemer,
    pub ex_units: ExUnits,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedScript {
    pub version: PlutusVersion,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnsignedTransaction {
    pub network: Network,
    pub inputs: Vec<OutputRef>,
    pub collateral: Vec<OutputRef>,
    pub outputs: Vec<TxOutput>,
    pub fee: u64,
    pub required_signers: Vec<KeyHash>,
    pub redeemers: Vec<TxRedeemer>,
    pub scripts: Vec<AttachedScript>,
    pub script_data_hash: Option<DataHash>,
}

impl UnsignedTransaction {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            inputs: Vec::new(),
            collateral: Vec::new(),
            outputs: Vec::new(),
            fee: 0,
            required_signers: Vec::new(),
            redeemers: Vec::new(),
            scripts: Vec::new(),
            script_data_hash: None,
        }
    }

    /// The ledger orders inputs lexicographically; redeemer indices refer to that order.
    pub fn normalize(&mut self) {
        self.inputs.sort();
        self.inputs.dedup();
        self.collateral.sort();
        self.collateral.dedup();
        self.required_signers.sort();
        self.required_signers.dedup();
    }

    pub fn redeemer_index(&self, input: &OutputRef) -> Option<u64> {
        self.inputs
            .iter()
            .position(|i| i == input)
            .map(|p| p as u64)
    }

    fn redeemers_value(&self) -> VaultResult<Value> {
        let mut items = Vec::with_capacity(self.redeemers.len());
        for r in &self.redeemers {
            let index = self.redeemer_index(&r.input).ok_or_else(|| {
                VaultError::Encoding(format!("redeemer targets {} which is not an input", r.input))
            })?;
            items.push(Value::Array(vec![
                uint(0),
                uint(index),
                redeemer_to_data(&r.redeemer).to_cbor_value()?,
                Value::Array(vec![uint(r.ex_units.mem), uint(r.ex_units.steps)]),
            ]));
        }
        Ok(Value::Array(items))
    }

    fn languages(&self) -> Vec<PlutusVersion> {
        let mut langs: Vec<PlutusVersion> = self.scripts.iter().map(|s| s.version).collect();
        langs.sort();
        langs.dedup();
        langs
    }

    /// Canonical CBOR map of the cost models for every attached language.
    /// PlutusV1 keeps the legacy form: a byte-string key holding the encoded
    /// language id, and the parameters as an indefinite array inside a byte string.
    fn language_views(&self, cost_models: &CostModels) -> VaultResult<Vec<u8>> {
        let mut entries = Vec::new();
        for lang in self.languages() {
            let params = cost_models
                .get(&lang)
                .filter(|ps| !ps.is_empty())
                .ok_or_else(|| VaultError::Encoding(format!("no cost model configured for {lang}")))?;
            let ints = params.iter().map(|p| Value::Integer((*p).into()));
            let id = uint(u64::from(lang.language_id()));
            let (key, view) = match lang {
                PlutusVersion::V1 => {
                    let mut legacy = vec![0x9f];
                    for int in ints {
                        legacy.extend_from_slice(&encode_value(&int)?);
                    }
                    legacy.push(0xff);
                    (Value::Bytes(encode_value(&id)?), Value::Bytes(legacy))
                }
                PlutusVersion::V2 | PlutusVersion::V3 => (id, Value::Array(ints.collect())),
            };
            entries.push((encode_value(&key)?, key, view));
        }
        // Shorter encoded keys first, then bytewise.
        entries.sort_by(|a, b| a.0.len().cmp(&b.0.len()).then_with(|| a.0.cmp(&b.0)));
        encode_value(&Value::Map(entries.into_iter().map(|(_, k, v)| (k, v)).collect()))
    }

    /// blake2b-256 over redeemers and language views; `None` when nothing is redeemed.
    pub fn compute_script_data_hash(&self, cost_models: &CostModels) -> VaultResult<Option<DataHash>> {
        if self.redeemers.is_empty() {
            return Ok(None);
        }
        let mut preimage = encode_value(&self.redeemers_value()?)?;
        preimage.extend_from_slice(&self.language_views(cost_models)?);
        Ok(Some(DataHash(blake2b_256(&preimage))))
    }

    fn body_value(&self) -> VaultResult<Value> {
        let mut body: Vec<(Value, Value)> = Vec::new();
        body.push((uint(0), refs_value(&self.inputs)));

        let mut outputs = Vec::with_capacity(self.outputs.len());
        for out in &self.outputs {
            let mut fields = vec![
                (uint(0), Value::Bytes(out.address_bytes.clone())),
                (uint(1), uint(out.lovelace)),
            ];
            if let Some(datum) = &out.inline_datum {
                fields.push((
                    uint(2),
                    Value::Array(vec![
                        uint(1),
                        Value::Tag(24, Box::new(Value::Bytes(datum.to_cbor()?))),
                    ]),
                ));
            }
            outputs.push(Value::Map(fields));
        }
        body.push((uint(1), Value::Array(outputs)));
        body.push((uint(2), uint(self.fee)));

        if let Some(hash) = &self.script_data_hash {
            body.push((uint(11), Value::Bytes(hash.as_bytes().to_vec())));
        }
        if !self.collateral.is_empty() {
            body.push((uint(13), refs_value(&self.collateral)));
        }
        if !self.required_signers.is_empty() {
            body.push((
                uint(14),
                Value::Array(
                    self.required_signers
                        .iter()
                        .map(|k| Value::Bytes(k.as_bytes().to_vec()))
                        .collect(),
                ),
            ));
        }
        body.push((uint(15), uint(u64::from(self.network.network_id()))));
        Ok(Value::Map(body))
    }

    fn witness_value(&self) -> VaultResult<Value> {
        let mut witness: Vec<(Value, Value)> = Vec::new();
        for lang in self.languages() {
            let scripts = self
                .scripts
                .iter()
                .filter(|s| s.version == lang)
                .map(|s| Value::Bytes(s.bytes.clone()))
                .collect();
            witness.push((uint(lang.witness_key()), Value::Array(scripts)));
        }
        if !self.redeemers.is_empty() {
            witness.push((uint(5), self.redeemers_value()?));
        }
        witness.sort_by_key(|(k, _)| match k {
            Value::Integer(i) => u64::try_from(*i).unwrap_or(u64::MAX),
            _ => u64::MAX,
        });
        Ok(Value::Map(witness))
    }

    pub fn body_cbor(&self) -> VaultResult<Vec<u8>> {
        encode_value(&self.body_value()?)
    }

    pub fn id(&self) -> VaultResult<TxHash> {
        Ok(TxHash(blake2b_256(&self.body_cbor()?)))
    }

    /// Full `[body, witness_set, is_valid, auxiliary_data]` bytes, unsigned.
    pub fn to_cbor(&self) -> VaultResult<Vec<u8>> {
        encode_value(&Value::Array(vec![
            self.body_value()?,
            self.witness_value()?,
            Value::Bool(true),
            Value::Null,
        ]))
    }
}

fn refs_value(refs: &[OutputRef]) -> Value {
    Value::Array(
        refs.iter()
            .map(|r| {
                Value::Array(vec![
                    Value::Bytes(r.tx_hash.as_bytes().to_vec()),
                    uint(u64::from(r.index)),
                ])
            })
            .collect(),
    )
}
