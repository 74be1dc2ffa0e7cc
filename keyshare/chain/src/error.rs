use std::fmt::Display;

/// Errors reported by a chain client or event source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    RpcError(String),
    BroadcastError(String),
    TxNotFound(String),
    SubscriptionError(String),
    InvalidEvent(String),
}

impl Display for ChainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RpcError(e) => write!(f, "RPC error: {}", e),
            Self::BroadcastError(e) => write!(f, "Broadcast failed: {}", e),
            Self::TxNotFound(e) => write!(f, "Transaction not found: {}", e),
            Self::SubscriptionError(e) => write!(f, "Subscription failed: {}", e),
            Self::InvalidEvent(e) => write!(f, "Invalid event: {}", e),
        }
    }
}

impl std::error::Error for ChainError {}

/// Errors reported by the share distribution service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareSourceError {
    Request(String),
    Decryption(String),
    InvalidShare(String),
}

impl Display for ShareSourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Request(e) => write!(f, "Share request failed: {}", e),
            Self::Decryption(e) => write!(f, "Unable to decrypt share: {}", e),
            Self::InvalidShare(e) => write!(f, "Invalid share: {}", e),
        }
    }
}

impl std::error::Error for ShareSourceError {}

impl From<keyshare_types::KeyShareError> for ShareSourceError {
    fn from(error: keyshare_types::KeyShareError) -> Self {
        ShareSourceError::InvalidShare(error.to_string())
    }
}
