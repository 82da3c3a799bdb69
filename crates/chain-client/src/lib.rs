//! One client per `(chain, variant)` for Bitcoin, ZCash and Bitcoin Cash.
//!
//! [`ChainClient`] ties the pure transaction machinery in `utxo_core` to the
//! gateway and fee oracle in `gateway`. Transactions are verified locally
//! before every broadcast.

pub mod client;
pub mod error;

pub use client::ChainClient;
pub use error::ClientError;
