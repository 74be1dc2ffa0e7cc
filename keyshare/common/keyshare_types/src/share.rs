use blstrs::Scalar;
use derive_more::{Deref, Display, From};
use std::fmt::{Debug, Formatter};

/// Position of a share within the threshold scheme. Indices start at 1.
#[derive(Clone, Copy, Debug, Display, Default, Eq, PartialEq, Hash, From, Deref)]
pub struct ShareIndex(pub u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyShareError {
    /// Share indices are 1-based, index 0 is never issued
    ZeroIndex,
    /// The share value could not be decoded into a scalar
    InvalidValue(String),
}

impl std::error::Error for KeyShareError {}

impl std::fmt::Display for KeyShareError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::ZeroIndex => write!(f, "Share index must be positive"),
            Self::InvalidValue(e) => write!(f, "Invalid share value: {}", e),
        }
    }
}

/// A validator's share of the epoch secret.
///
/// Shares are never mutated: a new epoch always comes with a new `KeyShare`.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyShare {
    value: Scalar,
    index: ShareIndex,
}

impl KeyShare {
    pub fn new(value: Scalar, index: ShareIndex) -> Result<Self, KeyShareError> {
        if *index == 0 {
            return Err(KeyShareError::ZeroIndex);
        }
        Ok(Self { value, index })
    }

    /// Builds a share from the hex encoding of its 32-byte big-endian scalar, which is the form a
    /// share source hands out after decryption.
    pub fn from_hex(value: &str, index: ShareIndex) -> Result<Self, KeyShareError> {
        let bytes = hex::decode(value.trim_start_matches("0x"))
            .map_err(|e| KeyShareError::InvalidValue(e.to_string()))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| KeyShareError::InvalidValue(format!("{} bytes", b.len())))?;
        let value = Option::<Scalar>::from(Scalar::from_bytes_be(&bytes))
            .ok_or_else(|| KeyShareError::InvalidValue("not a canonical scalar".to_string()))?;
        Self::new(value, index)
    }

    pub fn value(&self) -> &Scalar {
        &self.value
    }

    pub fn index(&self) -> ShareIndex {
        self.index
    }
}

// The scalar is secret material, keep it out of the logs.
impl Debug for KeyShare {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyShare")
            .field("value", &"<redacted>")
            .field("index", &self.index)
            .finish()
    }
}
