mod cli;
pub mod config;

pub use cli::Keyshare;
pub use config::{Config, ManagerConfig};

use base64::prelude::{Engine as _, BASE64_STANDARD};
use chain::{ChainClient, EventSource, ShareSource, ALREADY_REGISTERED};
use ibe::IbeSuite;
use keyshare_service::{broadcast_and_confirm, KeyshareService, Subscriptions};
use keyshare_types::{nonce_now, Message};
use std::sync::Arc;
use task_executor::TaskExecutor;
use tracing::{debug, info, warn};
use validator_store::ValidatorState;

/// The connections of one validator account operated by this daemon.
#[derive(Clone)]
pub struct ValidatorClients {
    pub chain_client: Arc<dyn ChainClient>,
    pub share_source: Arc<dyn ShareSource>,
}

pub struct Client {}

impl Client {
    /// Runs the keyshare client: bootstraps the master public key, loads the share state of every
    /// validator, registers them on-chain and starts the block and rotation listeners.
    ///
    /// Any failure before the listeners run is fatal and returned as an error.
    pub async fn run(
        executor: TaskExecutor,
        config: Config,
        validators: Vec<ValidatorClients>,
        events: &dyn EventSource,
    ) -> Result<Arc<KeyshareService>, String> {
        info!(
            version = %version::version_with_platform(),
            validators = validators.len(),
            denom = %config.denom,
            manager = config.manager.is_some(),
            "Starting the keyshare client"
        );

        let first = validators
            .first()
            .ok_or_else(|| "No validators configured".to_string())?;

        let master_public_key = match &config.manager {
            Some(manager) => {
                let total = manager.public_keys.len() as u64;
                let threshold = manager_threshold(total);
                info!(total, threshold, "Running the threshold setup");
                first
                    .share_source
                    .setup(total, threshold, manager.public_keys.clone())
                    .await
                    .map_err(|e| format!("Threshold setup failed: {}", e))?
            }
            None => first
                .share_source
                .get_master_public_key()
                .await
                .map_err(|e| format!("Unable to fetch the master public key: {}", e))?,
        };
        let master_public_key = master_public_key_hex(&master_public_key)?;
        info!(%master_public_key, "Got the master public key");

        // subscribe before any public key is read, announcements made during the rest of the
        // startup are then delivered once the listeners run
        let subscriptions = Subscriptions::open(events)
            .await
            .map_err(|e| format!("Unable to subscribe to chain events: {}", e))?;

        let mut states = Vec::with_capacity(validators.len());
        for (index, clients) in validators.into_iter().enumerate() {
            states.push(Arc::new(
                initialize_validator(index, clients, &config.denom).await?,
            ));
        }

        for state in &states {
            register_validator(state, &config.service).await?;
        }

        if config.manager.is_some() {
            // `states` holds at least the validator behind `first`
            let manager = &states[0];
            let message = Message::CreateLatestPubKey {
                creator: manager.address().to_string(),
                public_key: master_public_key,
            };
            broadcast_and_confirm(
                manager,
                message,
                config.service.confirmation_timeout,
                config.service.tx_poll_interval,
            )
            .await
            .map_err(|e| format!("Unable to publish the master public key: {}", e))?;
            info!(address = manager.address(), "Manager submitted the latest public key");
        }

        let processor_senders = processor::spawn(config.processor, executor.clone());
        let service = KeyshareService::new(
            states,
            Arc::new(IbeSuite::default()),
            processor_senders,
            config.service,
        );
        service.start(subscriptions, &executor);

        Ok(service)
    }
}

/// Number of shares needed to reconstruct a key: two thirds of the validators, rounded up.
pub fn manager_threshold(total_validators: u64) -> u64 {
    (2 * total_validators).div_ceil(3)
}

/// The share service hands the master public key out in base64, the chain expects hex.
pub fn master_public_key_hex(base64_key: &str) -> Result<String, String> {
    BASE64_STANDARD
        .decode(base64_key)
        .map(hex::encode)
        .map_err(|e| format!("Invalid master public key: {}", e))
}

/// Loads the share state of one validator.
///
/// The freshly fetched share is the current one, unless the chain already queued the next epoch.
/// In that case the share service has moved on: the previous share stays current until the
/// active key expires and the fetched share waits as pending. A queued key that does not expire
/// after the active one is rejected.
pub async fn initialize_validator(
    index: usize,
    clients: ValidatorClients,
    denom: &str,
) -> Result<ValidatorState, String> {
    let ValidatorClients {
        chain_client,
        share_source,
    } = clients;
    let address = chain_client.address().to_string();

    let share = share_source
        .get_share(&nonce_now())
        .await
        .map_err(|e| format!("Unable to fetch the share of {}: {}", address, e))?;

    let balance = chain_client
        .balance(denom)
        .await
        .map_err(|e| format!("Unable to fetch the balance of {}: {}", address, e))?;
    info!(
        validator = index,
        %address,
        %balance,
        denom,
        share_index = *share.index(),
        "Loaded validator"
    );

    let pub_keys = chain_client
        .active_pub_key()
        .await
        .map_err(|e| format!("Unable to fetch the active public keys: {}", e))?;
    debug!(
        active = %pub_keys.active_pub_key.public_key,
        active_expiry = pub_keys.active_pub_key.expiry,
        queued = %pub_keys.queued_pub_key.public_key,
        queued_expiry = pub_keys.queued_pub_key.expiry,
        "Active public keys"
    );

    let state = ValidatorState::new(index, chain_client, share_source, share.clone());
    state.set_current_share_expiry_block(pub_keys.active_pub_key.expiry);

    if pub_keys.has_queued() {
        let previous = state
            .share_source()
            .get_last_share(&nonce_now())
            .await
            .map_err(|e| format!("Unable to fetch the previous share of {}: {}", address, e))?;
        match previous {
            Some(previous) => {
                state
                    .install_pending_share(share, pub_keys.queued_pub_key.expiry)
                    .map_err(|e| {
                        format!("Inconsistent public keys on chain for {}: {}", address, e)
                    })?;
                state.set_current_share(previous);
                info!(
                    validator = index,
                    current_expiry = pub_keys.active_pub_key.expiry,
                    pending_expiry = pub_keys.queued_pub_key.expiry,
                    "Next epoch already queued, holding its share as pending"
                );
            }
            None => warn!(
                validator = index,
                "Next epoch queued but no previous share available, using the latest share"
            ),
        }
    }

    Ok(state)
}

/// Registers the validator on-chain. An account that is already registered is not an error.
pub async fn register_validator(
    state: &Arc<ValidatorState>,
    config: &keyshare_service::Config,
) -> Result<(), String> {
    let message = Message::RegisterValidator {
        creator: state.address().to_string(),
    };
    match broadcast_and_confirm(
        state,
        message,
        config.confirmation_timeout,
        config.tx_poll_interval,
    )
    .await
    {
        Ok(_) => info!(
            validator = state.index(),
            address = state.address(),
            "Registered as validator"
        ),
        Err(e) if e.to_string().contains(ALREADY_REGISTERED) => info!(
            validator = state.index(),
            address = state.address(),
            "Already registered as validator"
        ),
        Err(e) => {
            return Err(format!(
                "Unable to register {} as validator: {}",
                state.address(),
                e
            ))
        }
    }
    Ok(())
}
