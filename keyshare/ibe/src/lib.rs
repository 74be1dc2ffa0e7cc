//! Threshold identity based key extraction over BLS12-381.
//!
//! Every validator holds a share `s_i` of the epoch master secret. For an identity `ID` (here the
//! decimal string of a block height) the validator's partial decryption key is `s_i * H(ID)`,
//! where `H` hashes onto G2. Aggregators combine enough partial keys with Lagrange coefficients
//! for the share indices into the full decryption key of that height.
//!
//! Alongside the key, a validator publishes `s_i * G1` so that anyone holding the commitments can
//! check a partial key with a pairing, without learning the share.

mod error;

pub use error::DerivationError;

use blstrs::{G1Affine, G1Projective, G2Affine, G2Projective};
use group::{Curve, Group};
use keyshare_types::{KeyShare, ShareIndex};

/// Hash-to-curve domain separation tag for G2, matching the chain's aggregation code.
pub const G2_HASH_DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_NUL_";

/// Length of a compressed G2 point, the size of an extracted key on the wire
pub const EXTRACTED_KEY_LEN: usize = 96;

/// Partial decryption key for one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedKey {
    pub sk: G2Projective,
    pub index: ShareIndex,
}

impl ExtractedKey {
    /// Compressed encoding of the key point.
    pub fn to_bytes(&self) -> [u8; EXTRACTED_KEY_LEN] {
        self.sk.to_affine().to_compressed()
    }
}

/// Everything a validator submits for one height.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedKeyShare {
    pub height: u64,
    pub index: ShareIndex,
    /// Hex of the compressed extracted key
    pub key_hex: String,
    /// Hex of the compressed share commitment
    pub commitment_hex: String,
}

/// The curve suite all derivations run against. Immutable, so one instance is shared by every
/// concurrent task.
#[derive(Debug, Clone)]
pub struct IbeSuite {
    dst: Vec<u8>,
}

impl Default for IbeSuite {
    fn default() -> Self {
        Self {
            dst: G2_HASH_DST.to_vec(),
        }
    }
}

impl IbeSuite {
    pub fn with_dst(dst: &[u8]) -> Self {
        Self { dst: dst.to_vec() }
    }

    /// Hashes an identity onto G2.
    pub fn hash_identity(&self, identity: &[u8]) -> G2Projective {
        G2Projective::hash_to_curve(identity, &self.dst, &[])
    }

    /// Extracts the partial key of `share` for an arbitrary identity.
    pub fn extract(&self, share: &KeyShare, identity: &[u8]) -> ExtractedKey {
        ExtractedKey {
            sk: self.hash_identity(identity) * share.value(),
            index: share.index(),
        }
    }

    /// The public commitment `value * G1` of a share.
    pub fn commitment(&self, share: &KeyShare) -> G1Affine {
        (G1Projective::generator() * share.value()).to_affine()
    }

    /// Derives the key a validator submits for `height`. The identity is the height's decimal
    /// representation.
    pub fn derive(&self, share: &KeyShare, height: u64) -> Result<DerivedKeyShare, DerivationError> {
        let extracted = self.extract(share, height_identity(height).as_bytes());
        if bool::from(extracted.sk.is_identity()) {
            return Err(DerivationError::IdentityKey { height });
        }
        Ok(DerivedKeyShare {
            height,
            index: extracted.index,
            key_hex: hex::encode(extracted.to_bytes()),
            commitment_hex: hex::encode(self.commitment(share).to_compressed()),
        })
    }
}

/// Identity bytes used for `height`.
pub fn height_identity(height: u64) -> String {
    height.to_string()
}

/// Parses a submitted key back into its curve point.
pub fn decode_extracted_key(key_hex: &str) -> Result<G2Affine, DerivationError> {
    let bytes = hex::decode(key_hex).map_err(|e| DerivationError::Decode(e.to_string()))?;
    let bytes: [u8; EXTRACTED_KEY_LEN] = bytes.try_into().map_err(|b: Vec<u8>| {
        DerivationError::Decode(format!("expected {EXTRACTED_KEY_LEN} bytes, got {}", b.len()))
    })?;
    Option::from(G2Affine::from_compressed(&bytes))
        .ok_or_else(|| DerivationError::Decode("not a valid G2 point".to_string()))
}

/// Parses a submitted commitment back into its curve point.
pub fn decode_commitment(commitment_hex: &str) -> Result<G1Affine, DerivationError> {
    let bytes = hex::decode(commitment_hex).map_err(|e| DerivationError::Decode(e.to_string()))?;
    let bytes: [u8; 48] = bytes.try_into().map_err(|b: Vec<u8>| {
        DerivationError::Decode(format!("expected 48 bytes, got {}", b.len()))
    })?;
    Option::from(G1Affine::from_compressed(&bytes))
        .ok_or_else(|| DerivationError::Decode("not a valid G1 point".to_string()))
}

#[cfg(test)]
mod tests;
