use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Clone, Debug)]
#[command(
    name = "keyshare",
    about = "Derives and submits threshold decryption keyshares for every new block",
    version = version::VERSION,
    long_about = None
)]
pub struct Keyshare {
    /// Denomination used when reporting validator balances
    #[arg(long, value_name = "DENOM", default_value = "ufairy")]
    pub denom: String,

    /// Run the one-time threshold setup and publish the resulting master public key
    #[arg(long)]
    pub manager: bool,

    /// PEM encoded public key of a participating validator. Repeat once per validator, in share
    /// index order. Only used with --manager.
    #[arg(long = "manager-pubkey-file", value_name = "FILE")]
    pub manager_pubkey_files: Vec<PathBuf>,

    /// Maximum number of concurrent key derivations. Defaults to the number of logical CPUs.
    #[arg(long, value_name = "N")]
    pub max_workers: Option<usize>,

    /// Seconds a submission waits for its transaction to be included
    #[arg(long, value_name = "SECONDS", default_value_t = 30)]
    pub confirmation_timeout: u64,

    /// Milliseconds between inclusion checks of a submitted transaction
    #[arg(long, value_name = "MILLIS", default_value_t = 1000)]
    pub tx_poll_interval: u64,

    /// Submit keyshares without the share commitment
    #[arg(long)]
    pub no_commitment: bool,
}
