use derive_more::{Deref, Display, From};
use serde::{Deserialize, Serialize};

/// Transactions the daemon sends to the keyshare module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    RegisterValidator {
        creator: String,
    },
    /// The partial decryption key of `creator` for `block_height`.
    SendKeyshare {
        creator: String,
        /// Hex encoded extracted key
        message: String,
        key_share_index: u32,
        block_height: u64,
        /// Hex encoded commitment to the share, if published
        commitment: Option<String>,
    },
    /// Only ever sent by the manager after the threshold setup.
    CreateLatestPubKey {
        creator: String,
        public_key: String,
    },
}

impl Message {
    pub fn name(&self) -> &'static str {
        match self {
            Message::RegisterValidator { .. } => "register_validator",
            Message::SendKeyshare { .. } => "send_keyshare",
            Message::CreateLatestPubKey { .. } => "create_latest_pub_key",
        }
    }
}

#[derive(Debug, Clone, Default, Display, PartialEq, Eq, Hash, From, Deref, Serialize, Deserialize)]
pub struct TxHash(pub String);

/// Outcome of an included transaction. A non-zero code means the transaction failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResult {
    pub code: u32,
    pub raw_log: String,
}

impl TxResult {
    pub fn is_success(&self) -> bool {
        self.code == 0
    }
}
