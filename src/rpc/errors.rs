use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_rpc_client_api::request::RpcError as RequestError;
use thiserror::Error;

use crate::retry::Transient;

/// Errors raised at the RPC boundary
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    /// Transport-level errors (network, connection)
    #[error("Transport error: {message} (endpoint: {endpoint})")]
    Transport { endpoint: String, message: String },

    /// Timeout errors
    #[error("Timeout after {timeout_ms}ms (endpoint: {endpoint})")]
    Timeout { endpoint: String, timeout_ms: u64 },

    /// RPC response errors (from the RPC server)
    #[error("RPC response error: {message} (endpoint: {endpoint}, code: {code:?})")]
    RpcResponse {
        endpoint: String,
        message: String,
        code: Option<i64>,
    },

    /// Rate limit exceeded
    #[error("Rate limit exceeded (endpoint: {endpoint})")]
    RateLimitExceeded { endpoint: String },

    #[error("Blockhash not found (endpoint: {endpoint})")]
    BlockhashNotFound { endpoint: String },

    #[error("Account not found: {account} (endpoint: {endpoint})")]
    AccountNotFound { account: String, endpoint: String },

    /// The node answered but the payload could not be interpreted
    #[error("Decode error: {0}")]
    Decode(String),
}

impl RpcError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            RpcError::Transport { .. } => true,
            RpcError::Timeout { .. } => true,
            RpcError::RateLimitExceeded { .. } => true,
            RpcError::BlockhashNotFound { .. } => true,

            RpcError::AccountNotFound { .. } => false,
            RpcError::Decode(_) => false,

            RpcError::RpcResponse { code, .. } => match code {
                // HTTP 5xx and JSON-RPC server-defined errors (node behind, slot skipped...)
                Some(c) => (500..600).contains(c) || (-32099..=-32000).contains(c),
                None => false,
            },
        }
    }

    /// Get the endpoint associated with this error, if any
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            RpcError::Transport { endpoint, .. } => Some(endpoint),
            RpcError::Timeout { endpoint, .. } => Some(endpoint),
            RpcError::RpcResponse { endpoint, .. } => Some(endpoint),
            RpcError::RateLimitExceeded { endpoint } => Some(endpoint),
            RpcError::BlockhashNotFound { endpoint } => Some(endpoint),
            RpcError::AccountNotFound { endpoint, .. } => Some(endpoint),
            RpcError::Decode(_) => None,
        }
    }

    /// Create from ClientError with context
    pub fn from_client_error(err: ClientError, endpoint: &str) -> Self {
        if let ClientErrorKind::RpcError(RequestError::RpcResponseError { code, message, .. }) =
            err.kind()
        {
            return RpcError::RpcResponse {
                endpoint: endpoint.to_string(),
                message: message.clone(),
                code: Some(*code),
            };
        }

        let err_str = err.to_string().to_lowercase();

        // Classify based on error message
        if err_str.contains("blockhash not found") {
            RpcError::BlockhashNotFound {
                endpoint: endpoint.to_string(),
            }
        } else if err_str.contains("timed out") || err_str.contains("timeout") {
            RpcError::Timeout {
                endpoint: endpoint.to_string(),
                timeout_ms: 0,
            }
        } else if err_str.contains("429") || err_str.contains("too many requests") {
            RpcError::RateLimitExceeded {
                endpoint: endpoint.to_string(),
            }
        } else if err_str.contains("could not find account")
            || err_str.contains("accountnotfound")
        {
            RpcError::AccountNotFound {
                account: String::new(),
                endpoint: endpoint.to_string(),
            }
        } else if matches!(err.kind(), ClientErrorKind::SerdeJson(_)) {
            RpcError::Decode(err.to_string())
        } else {
            RpcError::Transport {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            }
        }
    }
}

impl Transient for RpcError {
    fn is_transient(&self) -> bool {
        self.is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(code: Option<i64>) -> RpcError {
        RpcError::RpcResponse {
            endpoint: "http://localhost:8899".to_string(),
            message: "boom".to_string(),
            code,
        }
    }

    #[test]
    fn test_retryability() {
        assert!(RpcError::Transport {
            endpoint: "e".into(),
            message: "reset".into()
        }
        .is_retryable());
        assert!(RpcError::Timeout {
            endpoint: "e".into(),
            timeout_ms: 30_000
        }
        .is_retryable());
        assert!(response(Some(503)).is_retryable());
        assert!(response(Some(-32005)).is_retryable());

        assert!(!response(Some(-32602)).is_retryable());
        assert!(!response(None).is_retryable());
        assert!(!RpcError::Decode("bad".into()).is_retryable());
        assert!(!RpcError::AccountNotFound {
            account: "x".into(),
            endpoint: "e".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_endpoint_accessor() {
        assert_eq!(response(None).endpoint(), Some("http://localhost:8899"));
        assert_eq!(RpcError::Decode("x".into()).endpoint(), None);
    }

    #[test]
    fn test_display() {
        let err = RpcError::RateLimitExceeded {
            endpoint: "https://rpc".into(),
        };
        assert_eq!(err.to_string(), "Rate limit exceeded (endpoint: https://rpc)");
    }
}
