//! Endpoint pool construction: one HTTP client per node URL, every named
//! contract bound on every node.

use std::collections::HashMap;
use std::sync::Arc;

use alloy_json_abi::JsonAbi;
use alloy_primitives::Address;
use serde::Deserialize;
use serde_json::Value;

use chainbalance_core::{EndpointHandle, TransportError};

use crate::client::{HttpClientConfig, HttpRpcClient};
use crate::contract::Contract;
use crate::transport::RpcTransport;

/// The endpoint type produced by [`build_endpoints`].
pub type HttpEndpoint = EndpointHandle<Arc<HttpRpcClient>, Contract>;

/// Where a contract lives and what it looks like.
#[derive(Debug, Clone, Deserialize)]
pub struct ContractInfo {
    /// Standard JSON ABI: an array of items, or a single item.
    pub abi: Value,
    /// Hex contract address.
    pub address: String,
}

impl ContractInfo {
    pub fn new(abi: Value, address: impl Into<String>) -> Self {
        Self {
            abi,
            address: address.into(),
        }
    }

    fn parse(&self, name: &str) -> Result<(Arc<JsonAbi>, Address), TransportError> {
        let items = match &self.abi {
            Value::Object(_) => Value::Array(vec![self.abi.clone()]),
            other => other.clone(),
        };
        let abi: JsonAbi = serde_json::from_value(items)
            .map_err(|e| TransportError::Abi(format!("contract '{name}': invalid ABI: {e}")))?;
        let address: Address = self.address.parse().map_err(|e| {
            TransportError::Abi(format!(
                "contract '{name}': invalid address {:?}: {e}",
                self.address
            ))
        })?;
        Ok((Arc::new(abi), address))
    }
}

/// Build one endpoint per URL, in order, each carrying every contract in
/// `contracts` bound to that endpoint's client.
pub fn build_endpoints(
    urls: &[String],
    contracts: &HashMap<String, ContractInfo>,
    config: &HttpClientConfig,
) -> Result<Vec<HttpEndpoint>, TransportError> {
    let parsed = contracts
        .iter()
        .map(|(name, info)| info.parse(name).map(|p| (name.clone(), p)))
        .collect::<Result<Vec<_>, _>>()?;

    let endpoints = urls
        .iter()
        .map(|url| {
            let client = Arc::new(HttpRpcClient::new(url.clone(), config.clone())?);
            let transport: Arc<dyn RpcTransport> = client.clone();
            let endpoint = parsed.iter().fold(
                EndpointHandle::new(url.clone(), client),
                |endpoint, (name, (abi, address))| {
                    endpoint.with_contract(
                        name.clone(),
                        Contract::new(*address, abi.clone(), transport.clone()),
                    )
                },
            );
            Ok::<_, TransportError>(endpoint)
        })
        .collect::<Result<Vec<_>, TransportError>>()?;

    tracing::info!(
        endpoints = endpoints.len(),
        contracts = parsed.len(),
        "endpoint pool built"
    );
    Ok(endpoints)
}
