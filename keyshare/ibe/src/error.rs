/// Failures of a single derivation. They only ever end the task that ran the derivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DerivationError {
    /// The extracted key is the point at infinity, which only happens for a zero share
    IdentityKey { height: u64 },
    /// A hex encoded point could not be decoded
    Decode(String),
}

impl std::error::Error for DerivationError {}

impl std::fmt::Display for DerivationError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::IdentityKey { height } => {
                write!(f, "Extracted key for height {} is the identity point", height)
            }
            Self::Decode(e) => write!(f, "Unable to decode point: {}", e),
        }
    }
}
