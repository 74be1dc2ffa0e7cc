//! Block driven keyshare pipeline.
//!
//! The service runs two listeners for the lifetime of the process:
//!
//! - the block listener, which for every new block height `H` derives each validator's partial
//!   decryption key for `H + 1` and submits it on-chain, and
//! - the rotation listener, which reacts to a newly queued master public key by fetching every
//!   validator's share for the upcoming epoch and installing it as pending.
//!
//! All per-validator work goes through the processor, so a slow or failing validator never holds
//! up the others, and a slow confirmation never holds up the next height.

mod metrics;
mod submission;

pub use submission::{broadcast_and_confirm, SubmissionError};

use chain::{ChainAction, ChainError, EventSource, NewBlockHeader, TxEvent};
use futures::stream::BoxStream;
use futures::StreamExt;
use ibe::IbeSuite;
use keyshare_types::{nonce_now, KeyShare, Message};
use processor::Senders;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use task_executor::TaskExecutor;
use tracing::{debug, error, info, warn};
use validator_store::{Rotation, ValidatorState};

const BLOCK_LISTENER_NAME: &str = "block_listener";
const ROTATION_LISTENER_NAME: &str = "rotation_listener";
const DERIVATION_NAME: &str = "keyshare_derivation";
const SUBMISSION_NAME: &str = "keyshare_submission";
const SHARE_FETCH_NAME: &str = "pending_share_fetch";

/// The chain streams both listeners consume. Opened before any share state is read from the
/// chain, so that nothing announced in between is missed.
pub struct Subscriptions {
    blocks: BoxStream<'static, NewBlockHeader>,
    txs: BoxStream<'static, TxEvent>,
}

impl Subscriptions {
    pub async fn open(events: &dyn EventSource) -> Result<Self, ChainError> {
        Ok(Self {
            blocks: events.subscribe_new_blocks().await?,
            txs: events.subscribe_txs().await?,
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Upper bound on how long a submission waits for its transaction to be included
    pub confirmation_timeout: Duration,
    /// How often the chain client polls for an inclusion
    pub tx_poll_interval: Duration,
    /// Whether submissions carry the share commitment
    pub submit_commitment: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            confirmation_timeout: Duration::from_secs(30),
            tx_poll_interval: Duration::from_secs(1),
            submit_commitment: true,
        }
    }
}

pub struct KeyshareService {
    validators: Arc<[Arc<ValidatorState>]>,
    suite: Arc<IbeSuite>,
    processor: Senders,
    config: Config,
}

impl KeyshareService {
    pub fn new(
        validators: Vec<Arc<ValidatorState>>,
        suite: Arc<IbeSuite>,
        processor: Senders,
        config: Config,
    ) -> Arc<Self> {
        Arc::new(Self {
            validators: validators.into(),
            suite,
            processor,
            config,
        })
    }

    pub fn validators(&self) -> &[Arc<ValidatorState>] {
        &self.validators
    }

    /// Spawns both listeners on already opened subscriptions.
    pub fn start(self: &Arc<Self>, subscriptions: Subscriptions, executor: &TaskExecutor) {
        let Subscriptions { blocks, txs } = subscriptions;
        executor.spawn(self.clone().block_listener(blocks), BLOCK_LISTENER_NAME);
        executor.spawn(self.clone().rotation_listener(txs), ROTATION_LISTENER_NAME);
        info!(
            validators = self.validators.len(),
            "Listening for new blocks and queued public keys"
        );
    }

    async fn block_listener(self: Arc<Self>, mut blocks: BoxStream<'static, NewBlockHeader>) {
        while let Some(header) = blocks.next().await {
            self.on_new_block(header.height);
        }
        error!("New block subscription ended");
    }

    async fn rotation_listener(self: Arc<Self>, mut txs: BoxStream<'static, TxEvent>) {
        while let Some(event) = txs.next().await {
            match ChainAction::try_from(&event) {
                Ok(ChainAction::QueuedPubKeyCreated {
                    pubkey,
                    expiry_height,
                }) => {
                    info!(%pubkey, expiry_height, "New public key queued");
                    self.on_queued_pub_key(expiry_height);
                }
                Ok(ChainAction::NoOp) => {}
                Err(e) => {
                    warn!(error = %e, "Skipping malformed transaction event");
                    metrics::inc_counter_vec(&metrics::KEYSHARE_ROTATIONS_TOTAL, &["malformed"]);
                }
            }
        }
        error!("Transaction subscription ended");
    }

    /// Fans out the derivation for `observed_height + 1` to every validator.
    pub fn on_new_block(self: &Arc<Self>, observed_height: u64) {
        let process_height = observed_height.saturating_add(1);
        metrics::set_gauge(
            &metrics::KEYSHARE_LATEST_OBSERVED_HEIGHT,
            observed_height as i64,
        );
        info!(
            latest_height = observed_height,
            process_height, "Deriving keyshares"
        );

        for validator in self.validators.iter() {
            // rotate here, in delivery order, so a derivation for a later height can never
            // change the share of an earlier one
            let (share, rotation) = validator.share_for_height(observed_height);
            log_rotation(validator, rotation);

            let service = self.clone();
            let validator_index = validator.index();
            let validator = validator.clone();
            if let Err(e) = self.processor.key_derivation.send_blocking(
                move || service.derive_and_submit(validator, share, process_height),
                DERIVATION_NAME,
            ) {
                error!(
                    validator = validator_index,
                    height = process_height,
                    error = %e,
                    "Unable to queue keyshare derivation"
                );
                metrics::inc_counter_vec(&metrics::KEYSHARE_SUBMISSIONS_TOTAL, &["not_queued"]);
            }
        }
    }

    /// Fetches every validator's share for the epoch starting at `expiry_height`.
    pub fn on_queued_pub_key(self: &Arc<Self>, expiry_height: u64) {
        for validator in self.validators.iter() {
            if let Err(e) = self.processor.permitless.send_async(
                fetch_pending_share(validator.clone(), expiry_height),
                SHARE_FETCH_NAME,
            ) {
                error!(
                    validator = validator.index(),
                    expiry_height,
                    error = %e,
                    "Unable to queue share fetch"
                );
                metrics::inc_counter_vec(&metrics::KEYSHARE_ROTATIONS_TOTAL, &["not_queued"]);
            }
        }
    }

    fn derive_and_submit(
        &self,
        validator: Arc<ValidatorState>,
        share: KeyShare,
        process_height: u64,
    ) {
        let timer = metrics::start_timer(&metrics::KEYSHARE_DERIVATION_SECONDS);
        let derived = match self.suite.derive(&share, process_height) {
            Ok(derived) => derived,
            Err(e) => {
                error!(
                    validator = validator.index(),
                    height = process_height,
                    error = %e,
                    "Unable to derive keyshare"
                );
                metrics::inc_counter_vec(
                    &metrics::KEYSHARE_SUBMISSIONS_TOTAL,
                    &["derivation_failed"],
                );
                return;
            }
        };
        drop(timer);

        let message = Message::SendKeyshare {
            creator: validator.address().to_string(),
            message: derived.key_hex,
            key_share_index: *derived.index,
            block_height: process_height,
            commitment: self
                .config
                .submit_commitment
                .then_some(derived.commitment_hex),
        };
        let validator_index = validator.index();
        if let Err(e) = self.processor.permitless.send_async(
            submit_keyshare(
                validator,
                message,
                process_height,
                self.config.confirmation_timeout,
                self.config.tx_poll_interval,
            ),
            SUBMISSION_NAME,
        ) {
            error!(
                validator = validator_index,
                height = process_height,
                error = %e,
                "Unable to queue keyshare submission"
            );
            metrics::inc_counter_vec(&metrics::KEYSHARE_SUBMISSIONS_TOTAL, &["not_queued"]);
        }
    }
}

fn log_rotation(validator: &ValidatorState, rotation: Rotation) {
    match rotation {
        Rotation::NotDue => {}
        Rotation::Activated {
            expired_at,
            new_expiry,
        } => {
            info!(
                validator = validator.index(),
                expired_at, new_expiry, "Current share expired, switched to the queued share"
            );
            metrics::inc_counter_vec(&metrics::KEYSHARE_ROTATIONS_TOTAL, &["activated"]);
        }
        Rotation::MissingPending { expired_at } => {
            warn!(
                validator = validator.index(),
                expired_at, "Current share expired but no pending share found, keeping it"
            );
            metrics::inc_counter_vec(&metrics::KEYSHARE_ROTATIONS_TOTAL, &["missing_pending"]);
        }
    }
}

async fn submit_keyshare(
    validator: Arc<ValidatorState>,
    message: Message,
    height: u64,
    confirmation_timeout: Duration,
    poll_interval: Duration,
) {
    match broadcast_and_confirm(&validator, message, confirmation_timeout, poll_interval).await {
        Ok(_) => {
            info!(
                validator = validator.index(),
                height, "Submitted keyshare confirmed"
            );
            metrics::inc_counter_vec(&metrics::KEYSHARE_SUBMISSIONS_TOTAL, &["confirmed"]);
        }
        Err(e) => {
            error!(
                validator = validator.index(),
                address = validator.address(),
                height,
                error = %e,
                "Keyshare submission failed"
            );
            metrics::inc_counter_vec(&metrics::KEYSHARE_SUBMISSIONS_TOTAL, &[e.outcome()]);
        }
    }
}

async fn fetch_pending_share(validator: Arc<ValidatorState>, expiry_height: u64) {
    let share = match validator.share_source().get_share(&nonce_now()).await {
        Ok(share) => share,
        Err(e) => {
            error!(
                validator = validator.index(),
                expiry_height,
                error = %e,
                "Unable to fetch share for the queued public key"
            );
            metrics::inc_counter_vec(&metrics::KEYSHARE_ROTATIONS_TOTAL, &["fetch_failed"]);
            return;
        }
    };

    let index = share.index();
    match validator.install_pending_share(share, expiry_height) {
        Ok(()) => {
            info!(
                validator = validator.index(),
                share_index = *index,
                expiry_height,
                "Installed share for the next epoch"
            );
            metrics::inc_counter_vec(&metrics::KEYSHARE_ROTATIONS_TOTAL, &["installed"]);
        }
        Err(e) => {
            warn!(
                validator = validator.index(),
                error = %e,
                "Rejected share for the queued public key"
            );
            metrics::inc_counter_vec(&metrics::KEYSHARE_ROTATIONS_TOTAL, &["rejected"]);
        }
    }
    debug!(validator = validator.index(), record = ?validator.snapshot(), "Share state");
}
