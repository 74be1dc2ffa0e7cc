use std::time::{SystemTime, UNIX_EPOCH};

/// Freshness token handed to the share source so that a signed request cannot be replayed.
pub fn nonce_now() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
        .to_string()
}
