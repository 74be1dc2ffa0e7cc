pub use message::{Message, TxHash, TxResult};
pub use pubkey::{ActivePubKeys, PubKeyEntry};
pub use share::{KeyShare, KeyShareError, ShareIndex};
pub use util::nonce_now;
mod message;
mod pubkey;
mod share;
mod util;
