//! UTXO chain primitives shared by Bitcoin, ZCash and Bitcoin Cash.
//!
//! Provides network parameters, amounts, address encoding, UTXO and
//! recipient types, unsigned transaction construction, per-chain signature
//! hashes and pre-broadcast script verification. Nothing here performs I/O.

pub mod address;
pub mod amount;
pub mod error;
pub mod hash;
pub mod network;
pub mod sighash;
pub mod transaction;
pub mod utxo;
pub mod verify;
pub mod zcash;

pub use address::{Address, AddressKind, Payload};
pub use amount::Amount;
pub use error::CoreError;
pub use network::{Chain, Network, NetworkParams, ScriptRules, Variant, DUST};
pub use transaction::{build, estimate_size, SignedTx, Unlock, UnsignedTx};
pub use utxo::{OutPoint, Recipient, TxHash, Utxo, UtxoSet};
pub use verify::verify;
