//! ABI-bound contract handles that run read-only methods through `eth_call`.
//!
//! Arguments arrive as JSON and are coerced to the ABI parameter types:
//! strings go through alloy's type-directed parser (`"0xd8dA…"` for an
//! `address`, `"1000"` or `"0x3e8"` for a `uint256`), numbers and booleans are
//! taken as written, and JSON arrays map onto array and tuple parameters.
//! Return values come back as JSON with integers rendered as decimal strings
//! and byte strings as `0x` hex.

use std::sync::Arc;

use alloy_dyn_abi::{DynSolType, DynSolValue, FunctionExt, JsonAbiExt, Specifier};
use alloy_json_abi::{Function, JsonAbi};
use alloy_primitives::Address;
use async_trait::async_trait;
use serde_json::{Map, Value};

use chainbalance_core::{ContractInterface, PreparedCall, TransportError};

use crate::transport::RpcTransport;

/// A deployed contract: address plus ABI, bound to one node's transport.
#[derive(Clone)]
pub struct Contract {
    address: Address,
    abi: Arc<JsonAbi>,
    transport: Arc<dyn RpcTransport>,
}

impl Contract {
    pub fn new(address: Address, abi: Arc<JsonAbi>, transport: Arc<dyn RpcTransport>) -> Self {
        Self {
            address,
            abi,
            transport,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn abi(&self) -> &JsonAbi {
        &self.abi
    }

    /// URL of the node this handle is bound to.
    pub fn node_url(&self) -> &str {
        self.transport.url()
    }

    /// Run `eth_call` with raw calldata and return the raw return bytes.
    pub async fn call_raw(
        &self,
        calldata: &[u8],
        call_args: Option<&Value>,
    ) -> Result<Vec<u8>, TransportError> {
        let (tx, block) = call_object(self.address, calldata, call_args);
        let result = self.transport.request("eth_call", vec![tx, block]).await?;
        let hex_str = result.as_str().ok_or_else(|| {
            TransportError::Opaque(format!("eth_call returned non-string result: {result}"))
        })?;
        hex::decode(hex_str.trim_start_matches("0x"))
            .map_err(|e| TransportError::Abi(format!("invalid return data hex: {e}")))
    }
}

impl std::fmt::Debug for Contract {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Contract")
            .field("address", &self.address)
            .field("node", &self.transport.url())
            .field("functions", &self.abi.functions().count())
            .finish()
    }
}

impl ContractInterface for Contract {
    type Call = EthCall;

    fn method(&self, name: &str, args: &[Value]) -> Result<Option<EthCall>, TransportError> {
        let Some(overloads) = self.abi.function(name) else {
            return Ok(None);
        };
        let function = overloads
            .iter()
            .find(|f| f.inputs.len() == args.len())
            .ok_or_else(|| {
                TransportError::Abi(format!(
                    "{name}: no overload takes {} argument(s)",
                    args.len()
                ))
            })?;

        let calldata = encode_input(function, args)?;
        Ok(Some(EthCall {
            contract: self.clone(),
            function: function.clone(),
            calldata,
        }))
    }
}

/// A read-only method call with encoded calldata.
#[derive(Debug, Clone)]
pub struct EthCall {
    contract: Contract,
    function: Function,
    calldata: Vec<u8>,
}

impl EthCall {
    pub fn calldata(&self) -> &[u8] {
        &self.calldata
    }
}

#[async_trait]
impl PreparedCall for EthCall {
    async fn execute(self, call_args: Option<&Value>) -> Result<Value, TransportError> {
        let data = self.contract.call_raw(&self.calldata, call_args).await?;
        let outputs = self
            .function
            .abi_decode_output(&data, true)
            .map_err(|e| TransportError::Abi(format!("{}: {e}", self.function.name)))?;

        Ok(match outputs.len() {
            0 => Value::Null,
            1 => to_json(&outputs[0]),
            _ => Value::Array(outputs.iter().map(to_json).collect()),
        })
    }
}

/// Build the `eth_call` transaction object and block tag.
///
/// `call_args` may carry any transaction field (`from`, `gas`, `value`, …)
/// plus an optional `block` tag; `to` and `data` are always ours.
fn call_object(address: Address, calldata: &[u8], call_args: Option<&Value>) -> (Value, Value) {
    let mut tx = Map::new();
    let mut block = Value::from("latest");

    if let Some(Value::Object(extra)) = call_args {
        for (key, value) in extra {
            if key == "block" || key == "blockTag" {
                block = value.clone();
            } else {
                tx.insert(key.clone(), value.clone());
            }
        }
    }
    tx.insert("to".into(), Value::from(address.to_checksum(None)));
    tx.insert("data".into(), Value::from(format!("0x{}", hex::encode(calldata))));
    (Value::Object(tx), block)
}

fn encode_input(function: &Function, args: &[Value]) -> Result<Vec<u8>, TransportError> {
    let mut values = Vec::with_capacity(args.len());
    for (param, arg) in function.inputs.iter().zip(args) {
        let ty = param
            .resolve()
            .map_err(|e| TransportError::Abi(format!("param '{}': {e}", param.name)))?;
        let value = coerce(&ty, arg)
            .map_err(|e| TransportError::Abi(format!("param '{}': {e}", param.name)))?;
        values.push(value);
    }
    function
        .abi_encode_input(&values)
        .map_err(|e| TransportError::Abi(format!("{}: {e}", function.name)))
}

/// Coerce a JSON argument into a value of `ty`.
fn coerce(ty: &DynSolType, arg: &Value) -> Result<DynSolValue, String> {
    match (ty, arg) {
        (DynSolType::Array(inner), Value::Array(items)) => items
            .iter()
            .map(|item| coerce(inner, item))
            .collect::<Result<Vec<_>, _>>()
            .map(DynSolValue::Array),
        (DynSolType::FixedArray(inner, len), Value::Array(items)) => {
            if items.len() != *len {
                return Err(format!("expected {len} elements, got {}", items.len()));
            }
            items
                .iter()
                .map(|item| coerce(inner, item))
                .collect::<Result<Vec<_>, _>>()
                .map(DynSolValue::FixedArray)
        }
        (DynSolType::Tuple(types), Value::Array(items)) => {
            if items.len() != types.len() {
                return Err(format!(
                    "expected tuple of {}, got {} elements",
                    types.len(),
                    items.len()
                ));
            }
            types
                .iter()
                .zip(items)
                .map(|(t, item)| coerce(t, item))
                .collect::<Result<Vec<_>, _>>()
                .map(DynSolValue::Tuple)
        }
        (_, Value::String(s)) => ty.coerce_str(s).map_err(|e| e.to_string()),
        (_, Value::Number(n)) => ty.coerce_str(&n.to_string()).map_err(|e| e.to_string()),
        (_, Value::Bool(b)) => ty
            .coerce_str(if *b { "true" } else { "false" })
            .map_err(|e| e.to_string()),
        (_, other) => Err(format!("cannot coerce {other} to {ty}")),
    }
}

/// Render a decoded ABI value as JSON.
fn to_json(value: &DynSolValue) -> Value {
    match value {
        DynSolValue::Bool(b) => Value::Bool(*b),
        DynSolValue::Int(i, _) => Value::String(i.to_string()),
        DynSolValue::Uint(u, _) => Value::String(u.to_string()),
        DynSolValue::FixedBytes(word, size) => {
            Value::String(format!("0x{}", hex::encode(&word[..*size])))
        }
        DynSolValue::Address(a) => Value::String(a.to_checksum(None)),
        DynSolValue::Function(f) => Value::String(format!("0x{}", hex::encode(f.as_slice()))),
        DynSolValue::Bytes(b) => Value::String(format!("0x{}", hex::encode(b))),
        DynSolValue::String(s) => Value::String(s.clone()),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) | DynSolValue::Tuple(items) => {
            Value::Array(items.iter().map(to_json).collect())
        }
        #[allow(unreachable_patterns)]
        other => Value::String(format!("{other:?}")),
    }
}
