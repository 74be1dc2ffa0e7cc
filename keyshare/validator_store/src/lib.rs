//! Per-validator key share state.
//!
//! Each managed validator owns its capability handles and a [`ShareRecord`] behind a single lock.
//! The block listener and the rotation listener both mutate the record, so every transition is
//! a single short critical section and none of them performs I/O while locked.

mod record;

pub use record::{Rotation, ShareRecord};

use chain::{ChainClient, ShareSource};
use keyshare_types::KeyShare;
use parking_lot::Mutex;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationError {
    /// The announced epoch does not end after the current one
    StaleEpoch { expiry: u64, current_expiry: u64 },
    /// A later epoch is already pending
    OutOfOrder { expiry: u64, pending_expiry: u64 },
}

impl std::error::Error for RotationError {}

impl std::fmt::Display for RotationError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::StaleEpoch {
                expiry,
                current_expiry,
            } => write!(
                f,
                "Pending share expiry {} is not after current share expiry {}",
                expiry, current_expiry
            ),
            Self::OutOfOrder {
                expiry,
                pending_expiry,
            } => write!(
                f,
                "Pending share expiry {} is before already pending expiry {}",
                expiry, pending_expiry
            ),
        }
    }
}

pub struct ValidatorState {
    /// Position of this validator in the daemon's configuration, used to label logs
    index: usize,
    chain_client: Arc<dyn ChainClient>,
    share_source: Arc<dyn ShareSource>,
    record: Mutex<ShareRecord>,
}

impl Debug for ValidatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatorState")
            .field("index", &self.index)
            .field("address", &self.address())
            .field("record", &*self.record.lock())
            .finish()
    }
}

impl ValidatorState {
    pub fn new(
        index: usize,
        chain_client: Arc<dyn ChainClient>,
        share_source: Arc<dyn ShareSource>,
        current_share: KeyShare,
    ) -> Self {
        Self {
            index,
            chain_client,
            share_source,
            record: Mutex::new(ShareRecord::new(current_share)),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn address(&self) -> &str {
        self.chain_client.address()
    }

    pub fn chain_client(&self) -> &Arc<dyn ChainClient> {
        &self.chain_client
    }

    pub fn share_source(&self) -> &Arc<dyn ShareSource> {
        &self.share_source
    }

    /// A copy of the full record, taken atomically.
    pub fn snapshot(&self) -> ShareRecord {
        self.record.lock().clone()
    }

    pub fn current_share(&self) -> KeyShare {
        self.record.lock().current_share.clone()
    }

    pub fn set_current_share(&self, share: KeyShare) {
        self.record.lock().current_share = share;
    }

    pub fn set_pending_share(&self, share: KeyShare) {
        self.record.lock().pending_share = Some(share);
    }

    pub fn set_current_share_expiry_block(&self, height: u64) {
        self.record.lock().current_share_expiry_block = height;
    }

    pub fn set_pending_share_expiry_block(&self, height: u64) {
        self.record.lock().pending_share_expiry_block = height;
    }

    /// Promotes the pending share to current. Returns `false` if there was nothing to promote.
    pub fn activate_pending_share(&self) -> bool {
        self.record.lock().activate_pending_share()
    }

    /// Installs the share of an announced epoch together with its activation height.
    ///
    /// Re-installing the same epoch overwrites the pending share, so a duplicated announcement
    /// converges to the same state. Announcements that would move epochs backwards are rejected.
    pub fn install_pending_share(&self, share: KeyShare, expiry: u64) -> Result<(), RotationError> {
        let mut record = self.record.lock();
        let current_expiry = record.current_share_expiry_block;
        if current_expiry != 0 && expiry <= current_expiry {
            return Err(RotationError::StaleEpoch {
                expiry,
                current_expiry,
            });
        }
        if record.pending_share.is_some() && expiry < record.pending_share_expiry_block {
            return Err(RotationError::OutOfOrder {
                expiry,
                pending_expiry: record.pending_share_expiry_block,
            });
        }
        record.pending_share = Some(share);
        record.pending_share_expiry_block = expiry;
        debug!(validator = self.index, expiry, "Installed pending share");
        Ok(())
    }

    /// Runs the rotation check against `observed_height` and returns the share that is
    /// authoritative afterwards. Both happen under one lock acquisition, so a rotation landing
    /// later cannot change the share handed out here.
    pub fn share_for_height(&self, observed_height: u64) -> (KeyShare, Rotation) {
        let mut record = self.record.lock();
        let rotation = record.rotate_for_height(observed_height);
        (record.current_share.clone(), rotation)
    }
}
