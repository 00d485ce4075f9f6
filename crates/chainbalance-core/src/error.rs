//! Transport-level error types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A JSON-RPC 2.0 error object as returned by a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

/// Errors that can occur while dispatching or executing an RPC call.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed (connection refused, non-2xx status, etc.).
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON-RPC protocol-level error returned by the node.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// Request timed out after the configured duration.
    #[error("Request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// Response could not be deserialized.
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// Call data could not be encoded, or return data decoded, against the ABI.
    #[error("ABI error: {0}")]
    Abi(String),

    /// The endpoint carries no contract handle under this name.
    #[error("Unknown contract: {name}")]
    UnknownContract { name: String },

    /// The upstream rejected the call without a structured error.
    #[error("Opaque upstream rejection: {0}")]
    Opaque(String),

    /// Invalid dispatcher configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl TransportError {
    /// Returns `true` for errors that carry a structured cause.
    ///
    /// Named-method invocations with retries disabled surface recognised
    /// errors to the caller and keep retrying anything else.
    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Opaque(_))
    }
}
