//! The `RpcTransport` trait: what a contract handle needs from a node client.

use async_trait::async_trait;
use serde_json::Value;

use chainbalance_core::TransportError;

use crate::request::{JsonRpcRequest, JsonRpcResponse};

/// An async JSON-RPC client for one node.
///
/// Implementations must be `Send + Sync` and are shared as
/// `Arc<dyn RpcTransport>` between the endpoint handle and its contracts.
#[async_trait]
pub trait RpcTransport: Send + Sync + 'static {
    /// Send a single JSON-RPC request and return the response.
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError>;

    /// Return the node's identifier (URL).
    fn url(&self) -> &str;

    /// Allocate a request id.
    fn next_id(&self) -> u64;

    /// Call `method` and return the raw `result` value.
    async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value, TransportError> {
        let req = JsonRpcRequest::new(self.next_id(), method, params);
        let resp = self.send(req).await?;
        resp.into_result().map_err(TransportError::Rpc)
    }
}
