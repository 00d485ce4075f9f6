//! chainbalance-http — HTTP endpoints for the ChainBalance dispatcher.
//!
//! # Features
//! - [`HttpRpcClient`] — single-request JSON-RPC client over `reqwest`
//! - [`Contract`] — ABI-bound contract handle running methods via `eth_call`
//! - [`build_endpoints`] — turns node URLs and contract descriptors into an
//!   endpoint pool for [`chainbalance_core::Dispatcher`]
//!
//! # Usage
//! ```rust,no_run
//! use std::collections::HashMap;
//! use chainbalance_core::{Dispatcher, DispatcherConfig, InvokeOptions};
//! use chainbalance_http::{build_endpoints, ContractInfo, HttpClientConfig};
//!
//! # async fn run() -> Result<(), chainbalance_core::TransportError> {
//! let urls = vec!["https://rpc.ankr.com/eth".to_string(), "https://eth.llamarpc.com".to_string()];
//! let abi = serde_json::json!([{
//!     "name": "totalSupply", "type": "function", "inputs": [],
//!     "outputs": [{"name": "", "type": "uint256"}], "stateMutability": "view"
//! }]);
//! let contracts = HashMap::from([(
//!     "dai".to_string(),
//!     ContractInfo::new(abi, "0x6B175474E89094C44Da98b954EedeAC495271d0F"),
//! )]);
//!
//! let pool = build_endpoints(&urls, &contracts, &HttpClientConfig::default())?;
//! let dispatcher = Dispatcher::new(pool, DispatcherConfig::default())?;
//! let supply = dispatcher
//!     .invoke_method("dai", "totalSupply", None, None, InvokeOptions::default())
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod contract;
pub mod factory;
pub mod request;
pub mod transport;

pub use client::{HttpClientConfig, HttpRpcClient};
pub use contract::{Contract, EthCall};
pub use factory::{build_endpoints, ContractInfo, HttpEndpoint};
pub use request::{JsonRpcRequest, JsonRpcResponse, RpcId};
pub use transport::RpcTransport;
