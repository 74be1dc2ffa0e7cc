use serde::{Deserialize, Serialize};

/// A master public key together with the height at which it stops being valid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubKeyEntry {
    pub public_key: String,
    pub expiry: u64,
}

/// The public keys currently known to the chain: the active one and, if an epoch change has been
/// announced, the queued one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivePubKeys {
    pub active_pub_key: PubKeyEntry,
    pub queued_pub_key: PubKeyEntry,
}

impl ActivePubKeys {
    /// Whether the chain already announced the next epoch. An unset queued key is reported by the
    /// chain as an empty (or single character) string with a zero expiry.
    pub fn has_queued(&self) -> bool {
        self.queued_pub_key.public_key.len() > 1 && self.queued_pub_key.expiry > 0
    }
}

#[cfg(test)]
mod pubkey_tests {
    use super::*;

    #[test]
    fn queued_detection() {
        let mut keys = ActivePubKeys {
            active_pub_key: PubKeyEntry {
                public_key: "a1b2".to_string(),
                expiry: 500,
            },
            queued_pub_key: PubKeyEntry::default(),
        };
        assert!(!keys.has_queued());

        keys.queued_pub_key.public_key = "c3d4".to_string();
        assert!(!keys.has_queued());

        keys.queued_pub_key.expiry = 800;
        assert!(keys.has_queued());
    }
}
