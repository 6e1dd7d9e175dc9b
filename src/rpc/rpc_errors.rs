use solana_client::client_error::ClientError;
use thiserror::Error;

/// Errors surfaced by the blockchain client collaborator
#[derive(Debug, Clone, Error)]
pub enum ChainError {
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

    #[error("Blockhash not found (endpoint: {endpoint})")]
    BlockhashNotFound { endpoint: String },

    #[error("Transaction expired (endpoint: {endpoint})")]
    TransactionExpired { endpoint: String },

    /// The transaction landed but the runtime reported an error
    #[error("Transaction {signature} failed: {error}")]
    TransactionFailed { signature: String, error: String },

    #[error("Account not found: {account} (endpoint: {endpoint})")]
    AccountNotFound { account: String, endpoint: String },

    /// Account exists but its data does not unpack as the expected state
    #[error("Invalid account data for {account}: {reason}")]
    InvalidAccountData { account: String, reason: String },

    /// The node could not quote a fee for the message (usually an unknown blockhash)
    #[error("Fee unavailable for message (endpoint: {endpoint})")]
    FeeUnavailable { endpoint: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChainError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            ChainError::Transport { .. } => true,
            ChainError::Timeout { .. } => true,
            ChainError::BlockhashNotFound { .. } => true,

            ChainError::TransactionExpired { .. } => false,
            ChainError::TransactionFailed { .. } => false,
            ChainError::AccountNotFound { .. } => false,
            ChainError::InvalidAccountData { .. } => false,
            ChainError::FeeUnavailable { .. } => false,
            ChainError::Internal(_) => false,

            // Retry on server errors (5xx)
            ChainError::RpcResponse { code, .. } => {
                matches!(code, Some(c) if (500..600).contains(c))
            }
        }
    }

    /// Get the endpoint associated with this error, if any
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            ChainError::Transport { endpoint, .. } => Some(endpoint),
            ChainError::Timeout { endpoint, .. } => Some(endpoint),
            ChainError::RpcResponse { endpoint, .. } => Some(endpoint),
            ChainError::BlockhashNotFound { endpoint } => Some(endpoint),
            ChainError::TransactionExpired { endpoint } => Some(endpoint),
            ChainError::AccountNotFound { endpoint, .. } => Some(endpoint),
            ChainError::FeeUnavailable { endpoint } => Some(endpoint),
            _ => None,
        }
    }

    /// Create from ClientError with context
    pub fn from_client_error(err: ClientError, endpoint: &str) -> Self {
        let err_str = err.to_string().to_lowercase();

        // Classify based on error message
        if err_str.contains("blockhash not found") {
            ChainError::BlockhashNotFound {
                endpoint: endpoint.to_string(),
            }
        } else if err_str.contains("transaction expired")
            || err_str.contains("block height exceeded")
        {
            ChainError::TransactionExpired {
                endpoint: endpoint.to_string(),
            }
        } else if err_str.contains("account not found")
            || err_str.contains("accountnotfound")
        {
            ChainError::AccountNotFound {
                account: "unknown".to_string(),
                endpoint: endpoint.to_string(),
            }
        } else if err_str.contains("timeout") || err_str.contains("timed out") {
            ChainError::Timeout {
                endpoint: endpoint.to_string(),
                timeout_ms: 0,
            }
        } else if err_str.contains("connection") || err_str.contains("error sending request") {
            ChainError::Transport {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            }
        } else {
            // Extract error code if available
            let code = err_str
                .split("code:")
                .nth(1)
                .and_then(|s| s.split_whitespace().next())
                .and_then(|s| s.trim_end_matches(',').parse::<i64>().ok());

            ChainError::RpcResponse {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
                code,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_retryable() {
        assert!(ChainError::Transport {
            endpoint: "test".to_string(),
            message: "connection failed".to_string(),
        }
        .is_retryable());

        assert!(ChainError::Timeout {
            endpoint: "test".to_string(),
            timeout_ms: 5000,
        }
        .is_retryable());

        assert!(!ChainError::Internal("test".to_string()).is_retryable());
        assert!(!ChainError::TransactionExpired {
            endpoint: "test".to_string(),
        }
        .is_retryable());
    }

    #[test]
    fn test_rpc_response_retry_depends_on_code() {
        let server = ChainError::RpcResponse {
            endpoint: "test".to_string(),
            message: "bad gateway".to_string(),
            code: Some(502),
        };
        assert!(server.is_retryable());

        let client = ChainError::RpcResponse {
            endpoint: "test".to_string(),
            message: "invalid params".to_string(),
            code: Some(-32602),
        };
        assert!(!client.is_retryable());
    }

    #[test]
    fn test_error_endpoint() {
        let err = ChainError::Timeout {
            endpoint: "https://test.com".to_string(),
            timeout_ms: 5000,
        };
        assert_eq!(err.endpoint(), Some("https://test.com"));

        let internal = ChainError::Internal("test".to_string());
        assert_eq!(internal.endpoint(), None);
    }
}
