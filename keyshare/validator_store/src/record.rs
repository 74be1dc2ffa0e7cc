use keyshare_types::KeyShare;

/// The share bookkeeping of one validator. Always accessed through the validator's lock, so a
/// share and its expiry are never observed out of sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareRecord {
    /// Share used for derivation at the present height
    pub current_share: KeyShare,
    /// Share already fetched for the next epoch
    pub pending_share: Option<KeyShare>,
    /// Height at or after which `current_share` must no longer be used. 0 if unknown.
    pub current_share_expiry_block: u64,
    /// Height at which `pending_share` becomes authoritative
    pub pending_share_expiry_block: u64,
}

/// What the rotation check decided for an observed height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    /// The current share is still valid
    NotDue,
    /// The pending share replaced the expired current share
    Activated { expired_at: u64, new_expiry: u64 },
    /// The current share expired but nothing is queued, the expired share stays in use
    MissingPending { expired_at: u64 },
}

impl ShareRecord {
    pub fn new(current_share: KeyShare) -> Self {
        Self {
            current_share,
            pending_share: None,
            current_share_expiry_block: 0,
            pending_share_expiry_block: 0,
        }
    }

    pub fn is_expired_at(&self, height: u64) -> bool {
        self.current_share_expiry_block != 0 && self.current_share_expiry_block <= height
    }

    /// Promotes the pending share. Returns `false` and leaves the record untouched if there is
    /// no pending share.
    pub fn activate_pending_share(&mut self) -> bool {
        let Some(pending) = self.pending_share.take() else {
            return false;
        };
        self.current_share = pending;
        self.current_share_expiry_block = self.pending_share_expiry_block;
        self.pending_share_expiry_block = 0;
        true
    }

    /// Runs the rotation trigger for a newly observed block height.
    pub fn rotate_for_height(&mut self, height: u64) -> Rotation {
        if !self.is_expired_at(height) {
            return Rotation::NotDue;
        }
        let expired_at = self.current_share_expiry_block;
        if self.activate_pending_share() {
            Rotation::Activated {
                expired_at,
                new_expiry: self.current_share_expiry_block,
            }
        } else {
            Rotation::MissingPending { expired_at }
        }
    }
}
