use crate::error::ChainError;
use std::collections::HashMap;

/// Event attribute carrying the newly queued master public key
pub const QUEUED_PUBKEY_KEY: &str = "queued-pubkey-created.queued-pubkey-created-pubkey";
/// Event attribute carrying the height at which the queued key becomes active
pub const QUEUED_PUBKEY_EXPIRY_KEY: &str =
    "queued-pubkey-created.queued-pubkey-created-expiry-height";

/// Notification for a newly committed block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewBlockHeader {
    pub height: u64,
}

/// Result of an executed transaction, with its events flattened into `type.attribute` keys
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxEvent {
    pub events: HashMap<String, Vec<String>>,
}

impl TxEvent {
    fn first(&self, key: &str) -> Option<Option<&String>> {
        self.events.get(key).map(|values| values.first())
    }
}

/// Actions the daemon has to take in response to a transaction event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainAction {
    /// A new master public key was queued, shares for it become authoritative at `expiry_height`
    QueuedPubKeyCreated { pubkey: String, expiry_height: u64 },
    NoOp,
}

/// Parse a transaction event into an action to be executed
impl TryFrom<&TxEvent> for ChainAction {
    type Error = ChainError;
    fn try_from(source: &TxEvent) -> Result<ChainAction, Self::Error> {
        let Some(pubkey) = source.first(QUEUED_PUBKEY_KEY) else {
            return Ok(ChainAction::NoOp);
        };
        let pubkey = pubkey
            .ok_or_else(|| ChainError::InvalidEvent("Queued pubkey attribute is empty".into()))?;

        let expiry = source
            .first(QUEUED_PUBKEY_EXPIRY_KEY)
            .flatten()
            .ok_or_else(|| {
                ChainError::InvalidEvent("Queued pubkey event without expiry height".into())
            })?;
        let expiry_height = expiry.parse::<u64>().map_err(|e| {
            ChainError::InvalidEvent(format!("Failed to parse expiry height {expiry}: {e}"))
        })?;

        Ok(ChainAction::QueuedPubKeyCreated {
            pubkey: pubkey.clone(),
            expiry_height,
        })
    }
}
