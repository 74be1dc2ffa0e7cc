//! Capabilities the daemon consumes from the outside world: the share distribution service, the
//! chain's transaction client and the chain's event subscriptions.
//!
//! Concrete implementations live with the process bootstrap, the daemon only ever sees these
//! traits.

pub use error::{ChainError, ShareSourceError};
pub use events::{ChainAction, NewBlockHeader, TxEvent, QUEUED_PUBKEY_EXPIRY_KEY, QUEUED_PUBKEY_KEY};
mod error;
mod events;
#[cfg(any(test, feature = "testing"))]
pub mod mock;

use async_trait::async_trait;
use futures::stream::BoxStream;
use keyshare_types::{ActivePubKeys, KeyShare, Message, TxHash, TxResult};
use std::time::Duration;

/// Error text the chain returns when `RegisterValidator` is sent by an account that already is a
/// validator.
pub const ALREADY_REGISTERED: &str = "validator already registered";

/// Fetches (and locally decrypts) shares from the share distribution service.
#[async_trait]
pub trait ShareSource: Send + Sync {
    /// The share for the latest epoch. `nonce` guards the signed request against replay.
    async fn get_share(&self, nonce: &str) -> Result<KeyShare, ShareSourceError>;

    /// The share of the previous epoch, if the service still has one.
    async fn get_last_share(&self, nonce: &str) -> Result<Option<KeyShare>, ShareSourceError>;

    /// Base64 encoded master public key.
    async fn get_master_public_key(&self) -> Result<String, ShareSourceError>;

    /// Runs the one-time threshold setup. Manager only. Returns the base64 master public key.
    async fn setup(
        &self,
        total_validators: u64,
        threshold: u64,
        public_keys: Vec<String>,
    ) -> Result<String, ShareSourceError>;
}

/// Signs, broadcasts and tracks transactions for a single validator account.
#[async_trait]
pub trait ChainClient: Send + Sync {
    fn address(&self) -> &str;

    async fn balance(&self, denom: &str) -> Result<u128, ChainError>;

    async fn active_pub_key(&self) -> Result<ActivePubKeys, ChainError>;

    async fn broadcast_tx(
        &self,
        message: Message,
        wait_for_inclusion: bool,
    ) -> Result<TxHash, ChainError>;

    /// Polls every `poll_interval` until the transaction is found. Callers bound the total wait.
    async fn wait_for_tx(
        &self,
        tx_hash: &TxHash,
        poll_interval: Duration,
    ) -> Result<TxResult, ChainError>;
}

/// Live chain notifications.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn subscribe_new_blocks(&self) -> Result<BoxStream<'static, NewBlockHeader>, ChainError>;

    async fn subscribe_txs(&self) -> Result<BoxStream<'static, TxEvent>, ChainError>;
}
