//! Endpoint handles and the named-method contract capability.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TransportError;

/// One upstream node: its client handle and the contracts bound to it.
///
/// `C` and `K` are cloned out for each call, so they should be cheap to clone
/// (an `Arc` or a small struct around one).
#[derive(Debug, Clone)]
pub struct EndpointHandle<C, K> {
    pub id: String,
    pub client: C,
    pub contracts: HashMap<String, K>,
}

impl<C, K> EndpointHandle<C, K> {
    pub fn new(id: impl Into<String>, client: C) -> Self {
        Self {
            id: id.into(),
            client,
            contracts: HashMap::new(),
        }
    }

    /// Bind `contract` under `name`.
    pub fn with_contract(mut self, name: impl Into<String>, contract: K) -> Self {
        self.contracts.insert(name.into(), contract);
        self
    }

    pub fn contract(&self, name: &str) -> Option<&K> {
        self.contracts.get(name)
    }
}

/// A contract handle that can look up methods by name.
pub trait ContractInterface: Send + Sync {
    type Call: PreparedCall;

    /// Bind `args` to the method called `name`.
    ///
    /// Returns `Ok(None)` when the contract has no such method, which the
    /// dispatcher treats as a no-op. Arguments the method cannot accept are an
    /// error.
    fn method(&self, name: &str, args: &[Value]) -> Result<Option<Self::Call>, TransportError>;
}

/// A method call with its arguments bound, ready to run against a node.
#[async_trait]
pub trait PreparedCall: Send {
    /// Run the call. `call_args` carries per-call options such as `from`.
    async fn execute(self, call_args: Option<&Value>) -> Result<Value, TransportError>;
}
