use chain::ChainError;
use keyshare_types::{Message, TxResult};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use validator_store::ValidatorState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionError {
    Broadcast(ChainError),
    Confirmation(ChainError),
    ConfirmationTimeout(Duration),
    /// The transaction was included but failed
    Rejected { code: u32, raw_log: String },
}

impl SubmissionError {
    /// Label used for the submission metrics
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Broadcast(_) => "broadcast_failed",
            Self::Confirmation(_) => "confirmation_failed",
            Self::ConfirmationTimeout(_) => "confirmation_timeout",
            Self::Rejected { .. } => "rejected",
        }
    }
}

impl Display for SubmissionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Broadcast(e) => write!(f, "{}", e),
            Self::Confirmation(e) => write!(f, "{}", e),
            Self::ConfirmationTimeout(d) => {
                write!(f, "Not confirmed after {} ms", d.as_millis())
            }
            Self::Rejected { code, raw_log } => write!(f, "Code {}: {}", code, raw_log),
        }
    }
}

/// Broadcasts `message` from `validator`'s account and waits, at most `confirmation_timeout`,
/// for it to be included successfully.
pub async fn broadcast_and_confirm(
    validator: &Arc<ValidatorState>,
    message: Message,
    confirmation_timeout: Duration,
    poll_interval: Duration,
) -> Result<TxResult, SubmissionError> {
    let chain_client = validator.chain_client();
    let tx_hash = chain_client
        .broadcast_tx(message, true)
        .await
        .map_err(SubmissionError::Broadcast)?;

    let result = timeout(
        confirmation_timeout,
        chain_client.wait_for_tx(&tx_hash, poll_interval),
    )
    .await
    .map_err(|_| SubmissionError::ConfirmationTimeout(confirmation_timeout))?
    .map_err(SubmissionError::Confirmation)?;

    if !result.is_success() {
        return Err(SubmissionError::Rejected {
            code: result.code,
            raw_log: result.raw_log,
        });
    }
    Ok(result)
}
