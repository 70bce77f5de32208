//! Transaction model: inputs, outputs, coinbase identity, and the
//! canonical signing/hashing payload.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::crypto::sha256_hex;

pub const COINBASE_OUTPUT_INDEX: i64 = -1;

pub fn zero_hash() -> String {
    "0".repeat(64)
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TransactionOutput {
    pub amount: f64,
    pub lock_script: String,
}

impl TransactionOutput {
    pub fn new(amount: f64, lock_script: String) -> Self {
        assert!(amount >= 0.0, "output amount must be non-negative");
        TransactionOutput { amount, lock_script }
    }
}

/// The `unlock_script` carried by a transaction input.
///
/// Regular inputs unlock by proving ownership of the referenced output's
/// address; a coinbase input carries an arbitrary tag instead. Both shapes
/// serialize as a plain JSON object so the wire format in the spec (one
/// open-ended `unlock_script` field) is preserved.
#[derive(Debug, Clone, PartialEq)]
pub enum UnlockScript {
    Signature { signature: String, public_key: String },
    Data { data: String },
}

impl Serialize for UnlockScript {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = Map::new();
        match self {
            UnlockScript::Signature { signature, public_key } => {
                map.insert("signature".into(), Value::String(signature.clone()));
                map.insert("public_key".into(), Value::String(public_key.clone()));
            }
            UnlockScript::Data { data } => {
                map.insert("data".into(), Value::String(data.clone()));
            }
        }
        Value::Object(map).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for UnlockScript {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let obj = value.as_object().ok_or_else(|| serde::de::Error::custom("unlock_script must be an object"))?;
        if let (Some(Value::String(sig)), Some(Value::String(pk))) =
            (obj.get("signature"), obj.get("public_key"))
        {
            Ok(UnlockScript::Signature { signature: sig.clone(), public_key: pk.clone() })
        } else if let Some(Value::String(data)) = obj.get("data") {
            Ok(UnlockScript::Data { data: data.clone() })
        } else {
            Ok(UnlockScript::Data { data: String::new() })
        }
    }
}

impl UnlockScript {
    pub fn empty() -> Self {
        UnlockScript::Signature { signature: String::new(), public_key: String::new() }
    }

    pub fn as_signature(&self) -> Option<(&str, &str)> {
        match self {
            UnlockScript::Signature { signature, public_key } => Some((signature, public_key)),
            UnlockScript::Data { .. } => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TransactionInput {
    pub transaction_id: String,
    pub output_index: i64,
    pub unlock_script: UnlockScript,
}

impl TransactionInput {
    pub fn coinbase(tag: String) -> Self {
        TransactionInput {
            transaction_id: zero_hash(),
            output_index: COINBASE_OUTPUT_INDEX,
            unlock_script: UnlockScript::Data { data: tag },
        }
    }

    pub fn is_coinbase_input(&self) -> bool {
        self.transaction_id == zero_hash() && self.output_index == COINBASE_OUTPUT_INDEX
    }

    pub fn utxo_key(&self) -> (String, i64) {
        (self.transaction_id.clone(), self.output_index)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Transaction {
    pub transaction_id: String,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
}

impl Transaction {
    /// Builds a transaction and computes its id, enforcing the
    /// construction-time preconditions that are programmer errors rather
    /// than admission-time rejections.
    pub fn new(inputs: Vec<TransactionInput>, outputs: Vec<TransactionOutput>) -> Self {
        assert!(!inputs.is_empty(), "transaction must have at least one input");
        assert!(!outputs.is_empty(), "transaction must have at least one output");
        let mut tx = Transaction { transaction_id: String::new(), inputs, outputs };
        tx.transaction_id = tx.compute_id();
        tx
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].is_coinbase_input()
    }

    /// The canonical JSON payload that gets hashed for `transaction_id` and
    /// signed by every input. Regular transactions exclude `unlock_script`
    /// so the id is fixed before any signature exists; coinbase
    /// transactions include it so distinct block-reward tags produce
    /// distinct ids.
    pub fn get_data_to_sign(&self) -> String {
        let inputs: Vec<Value> = self
            .inputs
            .iter()
            .map(|i| {
                let mut m = Map::new();
                m.insert("transaction_id".into(), Value::String(i.transaction_id.clone()));
                m.insert("output_index".into(), Value::from(i.output_index));
                m
            })
            .map(Value::Object)
            .collect();
        let outputs: Vec<Value> = self
            .outputs
            .iter()
            .map(|o| {
                let mut m = Map::new();
                m.insert("amount".into(), serde_json::Number::from_f64(o.amount).map(Value::Number).unwrap_or(Value::Null));
                m.insert("lock_script".into(), Value::String(o.lock_script.clone()));
                m
            })
            .map(Value::Object)
            .collect();

        let mut payload = Map::new();
        payload.insert("inputs".into(), Value::Array(inputs));
        payload.insert("outputs".into(), Value::Array(outputs));
        canonical_json(&Value::Object(payload))
    }

    fn compute_id(&self) -> String {
        if self.is_coinbase() {
            let inputs: Vec<Value> = self
                .inputs
                .iter()
                .map(|i| {
                    let mut m = Map::new();
                    m.insert("transaction_id".into(), Value::String(i.transaction_id.clone()));
                    m.insert("output_index".into(), Value::from(i.output_index));
                    m.insert("unlock_script".into(), serde_json::to_value(&i.unlock_script).unwrap());
                    m
                })
                .map(Value::Object)
                .collect();
            let outputs: Vec<Value> = self
                .outputs
                .iter()
                .map(|o| {
                    let mut m = Map::new();
                    m.insert("amount".into(), serde_json::Number::from_f64(o.amount).map(Value::Number).unwrap_or(Value::Null));
                    m.insert("lock_script".into(), Value::String(o.lock_script.clone()));
                    m
                })
                .map(Value::Object)
                .collect();
            let mut payload = Map::new();
            payload.insert("inputs".into(), Value::Array(inputs));
            payload.insert("outputs".into(), Value::Array(outputs));
            sha256_hex(canonical_json(&Value::Object(payload)).as_bytes())
        } else {
            sha256_hex(self.get_data_to_sign().as_bytes())
        }
    }
}

/// Serializes a `serde_json::Value` with sorted object keys and no
/// whitespace, matching the reference's `json.dumps(..., sort_keys=True,
/// separators=(',', ':'))`.
pub fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let parts: Vec<String> = keys
                .iter()
                .map(|k| format!("{}:{}", serde_json::to_string(k).unwrap(), canonical_json(&map[*k])))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", parts.join(","))
        }
        other => serde_json::to_string(other).unwrap(),
    }
}
