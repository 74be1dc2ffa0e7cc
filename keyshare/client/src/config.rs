use crate::cli::Keyshare;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

const PEM_HEADER: &str = "-----BEGIN";

/// Inputs of the one-time threshold setup.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// PEM encoded public keys of every participating validator, in share index order
    pub public_keys: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub denom: String,
    /// Set if this daemon bootstraps the master public key
    pub manager: Option<ManagerConfig>,
    pub processor: processor::Config,
    pub service: keyshare_service::Config,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            denom: "ufairy".to_string(),
            manager: None,
            processor: processor::Config::default(),
            service: keyshare_service::Config::default(),
        }
    }
}

impl Config {
    /// Builds the client configuration from the parsed command line, reading any public key
    /// files it points to.
    pub fn from_cli(cli: &Keyshare) -> Result<Self, String> {
        let mut config = Config::default();

        if cli.denom.trim().is_empty() {
            return Err("--denom must not be empty".to_string());
        }
        config.denom = cli.denom.clone();

        config.manager = match (cli.manager, cli.manager_pubkey_files.is_empty()) {
            (true, true) => {
                return Err("--manager requires at least one --manager-pubkey-file".to_string())
            }
            (true, false) => Some(ManagerConfig {
                public_keys: cli
                    .manager_pubkey_files
                    .iter()
                    .map(read_pem_file)
                    .collect::<Result<_, _>>()?,
            }),
            (false, true) => None,
            (false, false) => {
                return Err("--manager-pubkey-file is only used together with --manager".to_string())
            }
        };

        if let Some(max_workers) = cli.max_workers {
            if max_workers == 0 {
                return Err("--max-workers must be at least 1".to_string());
            }
            config.processor.max_workers = max_workers;
        }

        if cli.confirmation_timeout == 0 {
            return Err("--confirmation-timeout must be at least one second".to_string());
        }
        config.service.confirmation_timeout = Duration::from_secs(cli.confirmation_timeout);
        config.service.tx_poll_interval = Duration::from_millis(cli.tx_poll_interval.max(1));
        config.service.submit_commitment = !cli.no_commitment;

        Ok(config)
    }
}

pub fn read_pem_file<P: AsRef<Path>>(path: P) -> Result<String, String> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .map_err(|e| format!("Unable to read public key file {}: {}", path.display(), e))?;
    if !contents.trim_start().starts_with(PEM_HEADER) {
        return Err(format!("{} is not a PEM file", path.display()));
    }
    Ok(contents)
}
