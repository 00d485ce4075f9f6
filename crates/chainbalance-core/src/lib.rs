//! chainbalance-core — load-balanced dispatch of read-only RPC calls.
//!
//! # Overview
//!
//! A [`Dispatcher`] spreads calls over a fixed pool of equivalent endpoints in
//! round-robin order, keeping each endpoint under a fixed-window request quota.
//! The core crate defines:
//!
//! - [`Dispatcher`] — the executor with its three call shapes
//! - [`EndpointHandle`] — one node's client and bound contracts
//! - [`ContractInterface`] / [`PreparedCall`] — the named-method capability
//! - [`DispatcherConfig`] — tunables, loadable from JSON
//! - [`policy`] module — rate windows and retry policy
//! - [`TransportError`] — structured error type
//!
//! # Quick start
//! ```rust,no_run
//! use chainbalance_core::{Dispatcher, DispatcherConfig, EndpointHandle, InvokeOptions, TransportError};
//!
//! # async fn run() -> Result<(), TransportError> {
//! let pool: Vec<EndpointHandle<String, ()>> = vec![
//!     EndpointHandle::new("a", "https://a.example".to_string()),
//!     EndpointHandle::new("b", "https://b.example".to_string()),
//! ];
//! let dispatcher = Dispatcher::new(pool, DispatcherConfig::default())?;
//! let url = dispatcher
//!     .invoke_client(|url| async move { Ok::<_, TransportError>(url) }, InvokeOptions::default())
//!     .await?;
//! assert_eq!(url, "https://a.example");
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod endpoint;
pub mod error;
pub mod policy;
pub mod scheduler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::DispatcherConfig;
pub use dispatcher::{Dispatcher, InvokeOptions};
pub use endpoint::{ContractInterface, EndpointHandle, PreparedCall};
pub use error::{JsonRpcError, TransportError};
pub use policy::{RateState, RetryPolicy};
