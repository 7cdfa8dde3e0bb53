//! Plutus `Data` and its CBOR form.

use ciborium::value::{Integer, Value};

use crate::error::{VaultError, VaultResult};

/// Longest byte string the ledger accepts as a single chunk.
pub const MAX_BYTES_CHUNK: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlutusData {
    Constr { tag: u64, fields: Vec<PlutusData> },
    Map(Vec<(PlutusData, PlutusData)>),
    List(Vec<PlutusData>),
    Int(i128),
    Bytes(Vec<u8>),
}

impl PlutusData {
    pub fn constr(tag: u64, fields: Vec<PlutusData>) -> Self {
        PlutusData::Constr { tag, fields }
    }

    pub fn bool(value: bool) -> Self {
        PlutusData::constr(u64::from(value), Vec::new())
    }

    pub fn to_cbor_value(&self) -> VaultResult<Value> {
        Ok(match self {
            PlutusData::Constr { tag, fields } => {
                let fields = Value::Array(
                    fields
                        .iter()
                        .map(PlutusData::to_cbor_value)
                        .collect::<VaultResult<Vec<_>>>()?,
                );
                match *tag {
                    0..=6 => Value::Tag(121 + tag, Box::new(fields)),
                    7..=127 => Value::Tag(1280 + tag - 7, Box::new(fields)),
                    _ => Value::Tag(
                        102,
                        Box::new(Value::Array(vec![Value::Integer((*tag).into()), fields])),
                    ),
                }
            }
            PlutusData::Map(entries) => Value::Map(
                entries
                    .iter()
                    .map(|(k, v)| Ok((k.to_cbor_value()?, v.to_cbor_value()?)))
                    .collect::<VaultResult<Vec<_>>>()?,
            ),
            PlutusData::List(items) => Value::Array(
                items
                    .iter()
                    .map(PlutusData::to_cbor_value)
                    .collect::<VaultResult<Vec<_>>>()?,
            ),
            PlutusData::Int(n) => {
                let int = i64::try_from(*n).map_err(|_| {
                    VaultError::Encoding(format!("integer {n} does not fit a signed 64-bit field"))
                })?;
                Value::Integer(int.into())
            }
            PlutusData::Bytes(bytes) => {
                if bytes.len() > MAX_BYTES_CHUNK {
                    return Err(VaultError::Encoding(format!(
                        "byte string of {} bytes exceeds the {MAX_BYTES_CHUNK}-byte chunk limit",
                        bytes.len()
                    )));
                }
                Value::Bytes(bytes.clone())
            }
        })
    }

    pub fn from_cbor_value(value: &Value) -> VaultResult<Self> {
        match value {
            Value::Tag(tag @ 121..=127, inner) => {
                Ok(PlutusData::constr(tag - 121, decode_fields(inner)?))
            }
            Value::Tag(tag @ 1280..=1400, inner) => {
                Ok(PlutusData::constr(tag - 1280 + 7, decode_fields(inner)?))
            }
            Value::Tag(102, inner) => match inner.as_ref() {
                Value::Array(parts) if parts.len() == 2 => {
                    let tag = match &parts[0] {
                        Value::Integer(i) => u64::try_from(*i).map_err(|_| {
                            VaultError::Decoding("general constructor tag out of range".into())
                        })?,
                        _ => {
                            return Err(VaultError::Decoding(
                                "general constructor tag is not an integer".into(),
                            ))
                        }
                    };
                    Ok(PlutusData::constr(tag, decode_fields(&parts[1])?))
                }
                _ => Err(VaultError::Decoding(
                    "general constructor must be a [tag, fields] pair".into(),
                )),
            },
            Value::Tag(other, _) => Err(VaultError::Decoding(format!(
                "unsupported CBOR tag {other} in Plutus data"
            ))),
            Value::Map(entries) => Ok(PlutusData::Map(
                entries
                    .iter()
                    .map(|(k, v)| Ok((Self::from_cbor_value(k)?, Self::from_cbor_value(v)?)))
                    .collect::<VaultResult<Vec<_>>>()?,
            )),
            Value::Array(items) => Ok(PlutusData::List(
                items
                    .iter()
                    .map(Self::from_cbor_value)
                    .collect::<VaultResult<Vec<_>>>()?,
            )),
            Value::Integer(i) => Ok(PlutusData::Int(i128::from(*i))),
            Value::Bytes(bytes) => Ok(PlutusData::Bytes(bytes.clone())),
            other => Err(VaultError::Decoding(format!(
                "CBOR item {other:?} is not Plutus data"
            ))),
        }
    }

    pub fn to_cbor(&self) -> VaultResult<Vec<u8>> {
        encode_value(&self.to_cbor_value()?)
    }

    /// Decodes exactly one data item; trailing bytes are an error.
    pub fn from_cbor(bytes: &[u8]) -> VaultResult<Self> {
        let value = decode_value(bytes)?;
        Self::from_cbor_value(&value)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PlutusData::Constr { tag: 0, fields } if fields.is_empty() => Some(false),
            PlutusData::Constr { tag: 1, fields } if fields.is_empty() => Some(true),
            _ => None,
        }
    }
}

fn decode_fields(value: &Value) -> VaultResult<Vec<PlutusData>> {
    match value {
        Value::Array(items) => items.iter().map(PlutusData::from_cbor_value).collect(),
        _ => Err(VaultError::Decoding(
            "constructor fields must be a CBOR array".into(),
        )),
    }
}

pub fn encode_value(value: &Value) -> VaultResult<Vec<u8>> {
    let mut out = Vec::new();
    ciborium::ser::into_writer(value, &mut out)
        .map_err(|e| VaultError::Encoding(format!("CBOR serialization: {e:?}")))?;
    Ok(out)
}

pub fn decode_value(bytes: &[u8]) -> VaultResult<Value> {
    let mut cursor = bytes;
    let value: Value = ciborium::de::from_reader(&mut cursor)
        .map_err(|e| VaultError::Decoding(format!("malformed CBOR: {e:?}")))?;
    if !cursor.is_empty() {
        return Err(VaultError::Decoding(format!(
            "{} trailing bytes after CBOR item",
            cursor.len()
        )));
    }
    Ok(value)
}

pub fn uint(n: u64) -> Value {
    Value::Integer(Integer::from(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_constructors_use_compact_tags() {
        let bytes = PlutusData::constr(0, vec![]).to_cbor().unwrap();
        assert_eq!(bytes, vec![0xd8, 0x79, 0x80]);

        let eight = PlutusData::constr(8, vec![PlutusData::Int(1)]);
        let decoded = PlutusData::from_cbor(&eight.to_cbor().unwrap()).unwrap();
        assert_eq!(decoded, eight);
    }

    #[test]
    fn general_constructor_form_for_large_tags() {
        let big = PlutusData::constr(500, vec![PlutusData::Bytes(vec![1, 2])]);
        let value = big.to_cbor_value().unwrap();
        assert!(matches!(value, Value::Tag(102, _)));
        assert_eq!(PlutusData::from_cbor_value(&value).unwrap(), big);
    }

    #[test]
    fn oversized_values_fail_to_encode() {
        assert!(PlutusData::Int(i128::from(i64::MAX) + 1).to_cbor().is_err());
        assert!(PlutusData::Bytes(vec![0u8; 65]).to_cbor().is_err());
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = PlutusData::Int(5).to_cbor().unwrap();
        bytes.push(0x00);
        assert!(matches!(
            PlutusData::from_cbor(&bytes),
            Err(VaultError::Decoding(_))
        ));
    }

    #[test]
    fn text_is_not_plutus_data() {
        let bytes = encode_value(&Value::Text("hi".into())).unwrap();
        assert!(PlutusData::from_cbor(&bytes).is_err());
    }
}
